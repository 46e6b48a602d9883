//! Drops messages that a previous run already handled.
//!
//! The platform returns a rolling window of recent activity, so messages
//! deleted in an earlier run show up again until they age out.

use std::collections::HashSet;

use tracing::debug;

use crate::pipeline::types::InboundMessage;

/// Return the messages whose key is not in `handled`, in original order.
pub fn filter_handled(
    messages: &[InboundMessage],
    handled: &HashSet<String>,
) -> Vec<InboundMessage> {
    if handled.is_empty() {
        return messages.to_vec();
    }

    messages
        .iter()
        .filter(|message| {
            let key = message.dedup_key();
            let seen = handled.contains(key.as_str());
            if seen {
                debug!(key = %key, "Skipping previously handled message");
            }
            !seen
        })
        .cloned()
        .collect()
}
