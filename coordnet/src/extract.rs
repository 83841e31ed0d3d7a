// coordnet/src/extract.rs
//
// Record → interaction extraction.
//
// Two front ends feed the detector: pre-extracted interaction CSVs (one row
// = at most one event, column names configurable) and raw tweet JSONL (one
// tweet = zero or more events depending on the extraction kind). Malformed
// records are skipped with a warning — extraction failures are local, never
// stream failures.

use chrono::DateTime;
use serde_json::Value;
use tracing::warn;

use crate::events::{ExtractKind, Interaction};

// ── CSV interactions ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CsvColumns {
    pub id: String,
    pub ts: String,
    pub src: String,
    pub tgt: String,
}

pub struct CsvExtractor {
    id_ix: usize,
    ts_ix: usize,
    src_ix: usize,
    tgt_ix: usize,
    interaction_ix: Option<usize>,
    exclude: Vec<String>,
}

impl CsvExtractor {
    /// Resolve the configured column names against the file's header row.
    /// A missing column is a configuration error, fatal before processing.
    pub fn bind(
        cols: &CsvColumns,
        headers: &csv::StringRecord,
        exclude: Vec<String>,
    ) -> anyhow::Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| anyhow::anyhow!("column '{name}' not found in CSV header"))
        };
        Ok(Self {
            id_ix: find(&cols.id)?,
            ts_ix: find(&cols.ts)?,
            src_ix: find(&cols.src)?,
            tgt_ix: find(&cols.tgt)?,
            interaction_ix: headers.iter().position(|h| h == "interaction"),
            exclude,
        })
    }

    pub fn extract(&self, record: &csv::StringRecord) -> Option<Interaction> {
        let target = record.get(self.tgt_ix)?;
        if self.exclude.iter().any(|x| x == &target.to_lowercase()) {
            return None;
        }
        let ts_raw = record.get(self.ts_ix)?;
        let ts: i64 = match ts_raw.parse() {
            Ok(ts) => ts,
            Err(_) => {
                warn!("skipping row with unparsable timestamp '{ts_raw}'");
                return None;
            }
        };
        Some(Interaction {
            post_id: record.get(self.id_ix)?.to_string(),
            ts,
            actor: record.get(self.src_ix)?.to_string(),
            target: target.to_string(),
        })
    }

    /// Value of the row's `interaction` column, when the file has one — used
    /// to tag output files when no explicit extraction kind was given.
    pub fn interaction_tag<'r>(&self, record: &'r csv::StringRecord) -> Option<&'r str> {
        self.interaction_ix.and_then(|ix| record.get(ix)).filter(|v| !v.is_empty())
    }
}

// ── Raw tweets ────────────────────────────────────────────────────────────────

pub struct TweetExtractor {
    kind: ExtractKind,
    exclude: Vec<String>,
}

impl TweetExtractor {
    pub fn new(kind: ExtractKind, exclude: Vec<String>) -> Self {
        Self { kind, exclude }
    }

    /// May yield several interactions from one tweet (one per hashtag, URL,
    /// mention…). A tweet without the relevant field yields nothing.
    pub fn extract(&self, line: &str) -> Vec<Interaction> {
        let tweet: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!("skipping unparsable tweet: {e}");
                return Vec::new();
            }
        };

        let (Some(ts), Some(actor), Some(post_id)) = (
            tweet
                .get("created_at")
                .and_then(Value::as_str)
                .and_then(parse_twitter_ts),
            tweet.pointer("/user/id_str").and_then(Value::as_str),
            tweet.get("id_str").and_then(Value::as_str),
        ) else {
            warn!("skipping tweet without created_at/user/id_str");
            return Vec::new();
        };

        let make = |target: String| Interaction {
            post_id: post_id.to_string(),
            ts,
            actor: actor.to_string(),
            target,
        };
        let excluded = |v: &str| self.exclude.iter().any(|x| x == &v.to_lowercase());

        match self.kind {
            ExtractKind::Retweets => tweet
                .pointer("/retweeted_status/id_str")
                .and_then(Value::as_str)
                .map(|id| vec![make(id.to_string())])
                .unwrap_or_default(),

            ExtractKind::Quotes => tweet
                .pointer("/quoted_status/id_str")
                .and_then(Value::as_str)
                .map(|id| vec![make(id.to_string())])
                .unwrap_or_default(),

            ExtractKind::Replies => tweet
                .get("in_reply_to_user_id_str")
                .and_then(Value::as_str)
                .map(|id| vec![make(id.to_string())])
                .unwrap_or_default(),

            ExtractKind::Text => {
                if is_retweet(&tweet) {
                    Vec::new() // retweet text is the original's text
                } else {
                    vec![make(extract_text(&tweet))]
                }
            }

            ExtractKind::Hashtags => hashtags_from(&tweet, true)
                .into_iter()
                .filter(|ht| !excluded(ht))
                .map(make)
                .collect(),

            ExtractKind::Urls => expanded_urls_from(&tweet, true)
                .into_iter()
                .filter(|url| !is_tweet_url(url) && !excluded(url))
                .map(make)
                .collect(),

            ExtractKind::Domains => expanded_urls_from(&tweet, true)
                .iter()
                .filter_map(|url| domain_of(url))
                .filter(|d| d != "twitter.com" && !excluded(d))
                .map(make)
                .collect(),

            ExtractKind::Mentions => {
                // for retweets, take the original's mentions — avoids the
                // implicit mention of the retweeted account
                let subject = tweet.get("retweeted_status").filter(|v| !v.is_null()).unwrap_or(&tweet);
                mentioned_ids_from(subject)
                    .into_iter()
                    .filter(|m| !excluded(m))
                    .map(make)
                    .collect()
            }
        }
    }
}

// e.g. "Tue Dec 31 06:15:21 +0000 2019"
const TWITTER_TS_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

pub fn parse_twitter_ts(s: &str) -> Option<i64> {
    DateTime::parse_from_str(s, TWITTER_TS_FORMAT)
        .ok()
        .map(|dt| dt.timestamp())
}

fn is_retweet(tweet: &Value) -> bool {
    tweet.get("retweeted_status").map(|v| !v.is_null()).unwrap_or(false)
}

/// Entity container: extended tweets carry the full entity set under
/// `extended_tweet`.
fn entities<'a>(tweet: &'a Value, kind: &str) -> Option<&'a Vec<Value>> {
    tweet
        .pointer(&format!("/extended_tweet/entities/{kind}"))
        .or_else(|| tweet.pointer(&format!("/entities/{kind}")))
        .and_then(Value::as_array)
}

/// Full text of a tweet, composing retweets and quotes the way the platform
/// renders them.
fn extract_text(tweet: &Value) -> String {
    if let Some(rt) = tweet.get("retweeted_status").filter(|v| !v.is_null()) {
        let screen_name = rt
            .pointer("/user/screen_name")
            .and_then(Value::as_str)
            .unwrap_or("");
        return format!("RT @{screen_name}: {}", extract_text(rt));
    }
    if let Some(qt) = tweet.get("quoted_status").filter(|v| !v.is_null()) {
        return format!("{} --> {}", available_text(tweet), extract_text(qt));
    }
    available_text(tweet)
}

fn available_text(tweet: &Value) -> String {
    let truncated = tweet.get("truncated").and_then(Value::as_bool).unwrap_or(false);
    if truncated {
        if let Some(full) = tweet.pointer("/extended_tweet/full_text").and_then(Value::as_str) {
            return full.to_string();
        }
    }
    tweet
        .get("full_text")
        .or_else(|| tweet.get("text"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn hashtags_from(tweet: &Value, include_retweet: bool) -> Vec<String> {
    let mut tags: Vec<String> = entities(tweet, "hashtags")
        .map(|hts| {
            hts.iter()
                .filter_map(|ht| ht.get("text").and_then(Value::as_str))
                .map(|t| t.to_lowercase())
                .collect()
        })
        .unwrap_or_default();
    if include_retweet {
        if let Some(rt) = tweet.get("retweeted_status").filter(|v| !v.is_null()) {
            tags.extend(hashtags_from(rt, false));
        }
    }
    tags
}

fn expanded_urls_from(tweet: &Value, include_retweet: bool) -> Vec<String> {
    let mut urls: Vec<String> = entities(tweet, "urls")
        .map(|us| {
            us.iter()
                .filter_map(|u| u.get("expanded_url").and_then(Value::as_str))
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if include_retweet {
        if let Some(rt) = tweet.get("retweeted_status").filter(|v| !v.is_null()) {
            urls.extend(expanded_urls_from(rt, false));
        }
    }
    urls
}

fn mentioned_ids_from(tweet: &Value) -> Vec<String> {
    entities(tweet, "user_mentions")
        .map(|ms| {
            ms.iter()
                .filter_map(|m| m.get("id_str").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn is_tweet_url(url: &str) -> bool {
    url.starts_with("https://twitter.com/") && url.contains("/status/")
}

/// Host part of a URL, lower-cased; ports and paths stripped.
fn domain_of(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.split('@').next_back()?; // drop userinfo if present
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATED_AT: &str = "Tue Dec 31 06:15:21 +0000 2019";

    fn base_tweet() -> serde_json::Value {
        serde_json::json!({
            "id_str": "t1",
            "created_at": CREATED_AT,
            "user": { "id_str": "u1", "screen_name": "alice" },
            "text": "morning #AusPol crowd",
            "truncated": false,
            "entities": {
                "hashtags": [{ "text": "AusPol" }, { "text": "QandA" }],
                "urls": [{ "expanded_url": "https://example.org/a?x=1" }],
                "user_mentions": [{ "id_str": "m1", "screen_name": "bob" }]
            }
        })
    }

    #[test]
    fn twitter_timestamps_parse_to_epoch_seconds() {
        let ts = parse_twitter_ts(CREATED_AT).unwrap();
        assert_eq!(ts, 1_577_772_921);
        assert!(parse_twitter_ts("not a date").is_none());
    }

    #[test]
    fn hashtags_are_lowered_and_excludable() {
        let x = TweetExtractor::new(ExtractKind::Hashtags, vec!["qanda".into()]);
        let events = x.extract(&base_tweet().to_string());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, "auspol");
        assert_eq!(events[0].actor, "u1");
        assert_eq!(events[0].post_id, "t1");
    }

    #[test]
    fn retweet_extraction_targets_the_original_post() {
        let mut t = base_tweet();
        t["retweeted_status"] = serde_json::json!({
            "id_str": "orig9",
            "user": { "id_str": "u2", "screen_name": "carol" },
            "text": "original",
            "entities": { "hashtags": [{ "text": "Deeper" }], "urls": [], "user_mentions": [] }
        });

        let x = TweetExtractor::new(ExtractKind::Retweets, vec![]);
        let events = x.extract(&t.to_string());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, "orig9");

        // retweet hashtag entities are included for the hashtags kind
        let x = TweetExtractor::new(ExtractKind::Hashtags, vec![]);
        let tags: Vec<String> = x.extract(&t.to_string()).into_iter().map(|e| e.target).collect();
        assert!(tags.contains(&"deeper".to_string()));

        // but retweets yield no text event
        let x = TweetExtractor::new(ExtractKind::Text, vec![]);
        assert!(x.extract(&t.to_string()).is_empty());
    }

    #[test]
    fn mentions_of_a_retweet_come_from_the_original() {
        let mut t = base_tweet();
        t["retweeted_status"] = serde_json::json!({
            "id_str": "orig9",
            "user": { "id_str": "u2", "screen_name": "carol" },
            "text": "original",
            "entities": { "hashtags": [], "urls": [],
                          "user_mentions": [{ "id_str": "m42" }] }
        });

        let x = TweetExtractor::new(ExtractKind::Mentions, vec![]);
        let events = x.extract(&t.to_string());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, "m42");
    }

    #[test]
    fn tweet_status_urls_are_skipped() {
        let mut t = base_tweet();
        t["entities"]["urls"] = serde_json::json!([
            { "expanded_url": "https://twitter.com/alice/status/123" },
            { "expanded_url": "https://example.org/page" }
        ]);

        let x = TweetExtractor::new(ExtractKind::Urls, vec![]);
        let events = x.extract(&t.to_string());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, "https://example.org/page");
    }

    #[test]
    fn domains_strip_paths_and_skip_twitter() {
        let mut t = base_tweet();
        t["entities"]["urls"] = serde_json::json!([
            { "expanded_url": "https://Example.ORG/a/b?q=1" },
            { "expanded_url": "https://twitter.com/other" }
        ]);

        let x = TweetExtractor::new(ExtractKind::Domains, vec![]);
        let events = x.extract(&t.to_string());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, "example.org");
    }

    #[test]
    fn truncated_tweets_use_the_extended_text() {
        let mut t = base_tweet();
        t["truncated"] = serde_json::json!(true);
        t["extended_tweet"] = serde_json::json!({
            "full_text": "the whole long thing",
            "entities": { "hashtags": [{ "text": "Long" }], "urls": [], "user_mentions": [] }
        });

        let x = TweetExtractor::new(ExtractKind::Text, vec![]);
        let events = x.extract(&t.to_string());
        assert_eq!(events[0].target, "the whole long thing");

        // extended entities take precedence too
        let x = TweetExtractor::new(ExtractKind::Hashtags, vec![]);
        let tags: Vec<String> = x.extract(&t.to_string()).into_iter().map(|e| e.target).collect();
        assert_eq!(tags, vec!["long"]);
    }

    #[test]
    fn garbage_lines_yield_nothing() {
        let x = TweetExtractor::new(ExtractKind::Hashtags, vec![]);
        assert!(x.extract("{ not json").is_empty());
        assert!(x.extract(r#"{"id_str":"t","text":"no user"}"#).is_empty());
    }

    #[test]
    fn csv_rows_map_through_configured_columns() {
        let cols = CsvColumns {
            id: "t_id".into(),
            ts: "timestamp".into(),
            src: "source".into(),
            tgt: "target".into(),
        };
        let headers = csv::StringRecord::from(vec!["timestamp", "source", "target", "t_id", "interaction"]);
        let x = CsvExtractor::bind(&cols, &headers, vec!["spam".into()]).unwrap();

        let row = csv::StringRecord::from(vec!["1000", "alice", "#tag", "p1", "HASHTAGS"]);
        let ev = x.extract(&row).expect("event");
        assert_eq!(ev.ts, 1000);
        assert_eq!(ev.actor, "alice");
        assert_eq!(ev.target, "#tag");
        assert_eq!(ev.post_id, "p1");
        assert_eq!(x.interaction_tag(&row), Some("HASHTAGS"));

        let excluded = csv::StringRecord::from(vec!["1001", "bob", "SPAM", "p2", "HASHTAGS"]);
        assert!(x.extract(&excluded).is_none());

        let bad_ts = csv::StringRecord::from(vec!["soon", "bob", "#tag", "p3", "HASHTAGS"]);
        assert!(x.extract(&bad_ts).is_none());
    }

    #[test]
    fn missing_csv_column_is_a_bind_error() {
        let cols = CsvColumns {
            id: "t_id".into(),
            ts: "timestamp".into(),
            src: "source".into(),
            tgt: "target".into(),
        };
        let headers = csv::StringRecord::from(vec!["timestamp", "source"]);
        assert!(CsvExtractor::bind(&cols, &headers, vec![]).is_err());
    }
}
