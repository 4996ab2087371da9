//! Community feed structures: submints, posts, comments, upvotes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseError;

/// A named category partitioning the feed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Submint {
    #[default]
    DailyMints,
    Discuss,
    Showcase,
    Introductions,
    Feedback,
}

impl Submint {
    pub const ALL: [Submint; 5] = [
        Submint::DailyMints,
        Submint::Discuss,
        Submint::Showcase,
        Submint::Introductions,
        Submint::Feedback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Submint::DailyMints => "daily-mints",
            Submint::Discuss => "discuss",
            Submint::Showcase => "showcase",
            Submint::Introductions => "introductions",
            Submint::Feedback => "feedback",
        }
    }

    /// Title-cased name, e.g. "Daily Mints".
    pub fn display_name(&self) -> String {
        self.as_str()
            .split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Submint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Submint {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Submint::ALL
            .into_iter()
            .find(|submint| submint.as_str() == s)
            .ok_or_else(|| ParseError::Submint(s.to_string()))
    }
}

/// A feed entry, optionally linked to one NFT record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub agent_id: String,
    pub nft_id: Option<String>,
    pub submint: Submint,
    pub title: Option<String>,
    pub content: Option<String>,
    pub upvotes: u64,
    pub comment_count: u64,
    pub created_at: u64,
}

/// A comment on a post, optionally replying to another comment of the same post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub agent_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub upvotes: u64,
    pub created_at: u64,
}

/// What an upvote points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum UpvoteTarget {
    Post(String),
    Comment(String),
}

impl UpvoteTarget {
    pub fn id(&self) -> &str {
        match self {
            UpvoteTarget::Post(id) | UpvoteTarget::Comment(id) => id,
        }
    }
}

/// Result of a toggle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpvoteAction {
    Added,
    Removed,
}

impl UpvoteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpvoteAction::Added => "added",
            UpvoteAction::Removed => "removed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submint_parse() {
        assert_eq!("showcase".parse::<Submint>().expect("parse"), Submint::Showcase);
        assert!("random".parse::<Submint>().is_err());
        assert_eq!(Submint::default(), Submint::DailyMints);
    }

    #[test]
    fn test_submint_display_name() {
        assert_eq!(Submint::DailyMints.display_name(), "Daily Mints");
        assert_eq!(Submint::Feedback.display_name(), "Feedback");
    }

    #[test]
    fn test_upvote_action_serde() {
        let json = serde_json::to_string(&UpvoteAction::Removed).expect("serialize");
        assert_eq!(json, "\"removed\"");
    }
}
