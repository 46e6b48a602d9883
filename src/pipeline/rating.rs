//! Rating parser.
//!
//! The model is instructed to answer `(A)(B):(X)(Y)`, where A is the scam
//! score, B the inappropriateness score, and X/Y short justifications for
//! each. Groups are assigned by position only.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ScoreRange;
use crate::error::MalformedRating;

static GROUP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((.*?)\)").unwrap());

/// Number of parenthesized groups a well-formed rating carries.
const EXPECTED_GROUPS: usize = 4;

/// A parsed rating for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub scam_score: i32,
    pub inappropriate_score: i32,
    pub scam_reason: String,
    pub inappropriate_reason: String,
}

impl Rating {
    /// Both scores must fall inside `range`.
    pub fn check_range(&self, range: ScoreRange) -> Result<(), MalformedRating> {
        for (field, score) in [
            ("scam", self.scam_score),
            ("inappropriate", self.inappropriate_score),
        ] {
            if !range.contains(score) {
                return Err(MalformedRating::ScoreOutOfRange {
                    field,
                    score,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(())
    }
}

/// Parse a raw rating response into a [`Rating`].
///
/// Extra groups after the fourth are ignored.
pub fn parse_rating(raw: &str) -> Result<Rating, MalformedRating> {
    let groups: Vec<&str> = GROUP_RE
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .take(EXPECTED_GROUPS)
        .collect();

    if groups.len() < EXPECTED_GROUPS {
        return Err(MalformedRating::TooFewGroups {
            found: groups.len(),
        });
    }

    Ok(Rating {
        scam_score: parse_score("scam", groups[0])?,
        inappropriate_score: parse_score("inappropriate", groups[1])?,
        scam_reason: groups[2].to_string(),
        inappropriate_reason: groups[3].to_string(),
    })
}

fn parse_score(field: &'static str, value: &str) -> Result<i32, MalformedRating> {
    value
        .parse::<i32>()
        .map_err(|_| MalformedRating::NonNumericScore {
            field,
            value: value.to_string(),
        })
}
