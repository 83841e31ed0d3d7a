// coordnet/src/events.rs
//
// Shared domain types flowing through coordnet.

use serde::{Deserialize, Serialize};

/// One timestamped interaction extracted from an input record.
///
/// `target` is the value binding potentially-coordinating actors — a hashtag,
/// an expanded URL, a retweeted post id, free text. The detector never
/// interprets targets; it only compares them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    /// Id of the post the interaction was extracted from.
    pub post_id: String,
    /// Epoch seconds. The input stream must be non-decreasing in this field.
    pub ts: i64,
    /// The account that performed the interaction.
    pub actor: String,
    /// The comparison subject binding coordinating actors together.
    pub target: String,
}

/// What to pull out of raw tweet objects (one tweet may yield several
/// interactions, e.g. one per hashtag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExtractKind {
    Hashtags,
    Urls,
    Domains,
    Retweets,
    Quotes,
    Replies,
    Mentions,
    Text,
}

impl std::fmt::Display for ExtractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hashtags => write!(f, "HASHTAGS"),
            Self::Urls => write!(f, "URLS"),
            Self::Domains => write!(f, "DOMAINS"),
            Self::Retweets => write!(f, "RETWEETS"),
            Self::Quotes => write!(f, "QUOTES"),
            Self::Replies => write!(f, "REPLIES"),
            Self::Mentions => write!(f, "MENTIONS"),
            Self::Text => write!(f, "TEXT"),
        }
    }
}
