// coordnet/src/compare.rs
//
// Pairwise target comparison strategies.
//
// A comparator is pure and total: every call returns a strength in [0, 1],
// where 0 means "no match" (no edge effect) and anything positive contributes
// to edge weight. The token-similarity variant rounds sub-threshold overlap
// down to 0 rather than letting weak matches accumulate into edges.

use std::collections::HashSet;

/// Strategy tag, fixed at configuration time. An unknown strategy is a CLI
/// parse error, never a runtime one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ComparisonStrategy {
    ExactMatch,
    CaseInsensitive,
    TextSimilarity,
}

impl std::fmt::Display for ComparisonStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactMatch => write!(f, "EXACT_MATCH"),
            Self::CaseInsensitive => write!(f, "CASE_INSENSITIVE"),
            Self::TextSimilarity => write!(f, "TEXT_SIMILARITY"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Comparator {
    Exact,
    CaseInsensitive,
    /// Jaccard index over lower-cased word sets, with a hard threshold and a
    /// minimum-token guard against spurious matches on short strings.
    TokenSimilarity { threshold: f64, min_tokens: usize },
}

impl Comparator {
    pub fn new(strategy: ComparisonStrategy, threshold: f64, min_tokens: usize) -> Self {
        match strategy {
            ComparisonStrategy::ExactMatch => Self::Exact,
            ComparisonStrategy::CaseInsensitive => Self::CaseInsensitive,
            ComparisonStrategy::TextSimilarity => Self::TokenSimilarity { threshold, min_tokens },
        }
    }

    /// Similarity strength between two target values, in [0, 1].
    pub fn compare(&self, a: &str, b: &str) -> f64 {
        match self {
            Self::Exact => {
                if a == b { 1.0 } else { 0.0 }
            }
            Self::CaseInsensitive => {
                if a.to_lowercase() == b.to_lowercase() { 1.0 } else { 0.0 }
            }
            Self::TokenSimilarity { threshold, min_tokens } => {
                let set_a = token_set(a);
                if set_a.len() < *min_tokens { return 0.0; }
                let set_b = token_set(b);
                if set_b.len() < *min_tokens { return 0.0; }

                let intersection = set_a.intersection(&set_b).count();
                let union = set_a.len() + set_b.len() - intersection;
                let jaccard = intersection as f64 / union as f64;
                // sub-threshold overlap is treated as entirely dissimilar
                if jaccard > *threshold { jaccard } else { 0.0 }
            }
        }
    }
}

/// Lower-cased, de-duplicated word set: split on whitespace, strip
/// leading/trailing punctuation from each token.
fn token_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_binary() {
        let c = Comparator::Exact;
        assert_eq!(c.compare("#auspol", "#auspol"), 1.0);
        assert_eq!(c.compare("#auspol", "#AusPol"), 0.0);
        assert_eq!(c.compare("", ""), 1.0);
    }

    #[test]
    fn case_insensitive_folds_before_comparing() {
        let c = Comparator::CaseInsensitive;
        assert_eq!(c.compare("#AusPol", "#auspol"), 1.0);
        assert_eq!(c.compare("#auspol", "#qanda"), 0.0);
    }

    #[test]
    fn identical_values_score_the_strategy_maximum() {
        for c in [Comparator::Exact, Comparator::CaseInsensitive] {
            assert_eq!(c.compare("same value", "same value"), 1.0);
        }
    }

    #[test]
    fn sub_threshold_overlap_rounds_down_to_zero() {
        // 4 shared tokens of 6 distinct -> Jaccard ~0.67, below 0.9
        let c = Comparator::TokenSimilarity { threshold: 0.9, min_tokens: 5 };
        assert_eq!(c.compare("a b c d e", "a b c d f"), 0.0);
    }

    #[test]
    fn above_threshold_overlap_returns_the_index() {
        let c = Comparator::TokenSimilarity { threshold: 0.5, min_tokens: 5 };
        let s = c.compare("a b c d e f", "a b c d e g");
        assert!((s - 5.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn min_token_guard_short_circuits() {
        let c = Comparator::TokenSimilarity { threshold: 0.1, min_tokens: 5 };
        // identical, but too short to be meaningful
        assert_eq!(c.compare("a b c", "a b c"), 0.0);
    }

    #[test]
    fn results_stay_in_unit_interval() {
        let c = Comparator::TokenSimilarity { threshold: 0.0, min_tokens: 1 };
        for (a, b) in [("x", "y"), ("x y z", "x y z"), ("one two", "two three")] {
            let s = c.compare(a, b);
            assert!((0.0..=1.0).contains(&s), "{a} vs {b} gave {s}");
        }
    }

    #[test]
    fn tokeniser_strips_punctuation_and_dedups() {
        let toks = token_set("Vote! vote, VOTE. #now");
        assert_eq!(toks.len(), 2);
        assert!(toks.contains("vote"));
        assert!(toks.contains("now"));
    }
}
