//! Deterministic fallbacks for the importance and tagging predictors.

/// Upper bound on tags produced by [`fallback_tags`].
pub const MAX_FALLBACK_TAGS: usize = 5;

/// `0.5 + min(0.3, len/1000) + 0.05·metadata_len`, capped at `1.0`.
///
/// `len` counts Unicode scalar values.
pub fn fallback_importance(content: &str, metadata_len: usize) -> f64 {
    let length_bonus = (content.chars().count() as f64 / 1000.0).min(0.3);
    let metadata_bonus = 0.05 * metadata_len as f64;
    (0.5 + length_bonus + metadata_bonus).min(1.0)
}

/// Lower-case `content`, split it on non-word characters, keep tokens longer
/// than three characters, and return up to [`MAX_FALLBACK_TAGS`] distinct
/// tokens in first-seen order.
///
/// Word characters are alphanumerics and `_`.
pub fn fallback_tags(content: &str) -> Vec<String> {
    let lowered = content.to_lowercase();
    let mut tags: Vec<String> = Vec::with_capacity(MAX_FALLBACK_TAGS);
    for token in lowered.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if tags.len() == MAX_FALLBACK_TAGS {
            break;
        }
        if token.chars().count() > 3 && !tags.iter().any(|t| t == token) {
            tags.push(token.to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── fallback_importance ──────────────────────────────────────────────────

    #[test]
    fn importance_of_short_content_without_metadata() {
        // 10 chars -> 0.5 + 0.01
        assert!((fallback_importance("0123456789", 0) - 0.51).abs() < 1e-12);
    }

    #[test]
    fn importance_length_bonus_is_capped() {
        let long = "x".repeat(5000);
        assert!((fallback_importance(&long, 0) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn importance_counts_metadata_and_caps_at_one() {
        assert!((fallback_importance("", 2) - 0.6).abs() < 1e-12);
        let long = "x".repeat(400);
        assert_eq!(fallback_importance(&long, 10), 1.0);
    }

    // ── fallback_tags ────────────────────────────────────────────────────────

    #[test]
    fn tags_are_lowercased_and_short_tokens_dropped() {
        let tags = fallback_tags("The Quick brown FOX jumps");
        assert_eq!(tags, vec!["quick", "brown", "jumps"]);
    }

    #[test]
    fn tags_are_deduplicated_in_first_seen_order() {
        let tags = fallback_tags("Rust rust RUST memory, memory; graph");
        assert_eq!(tags, vec!["rust", "memory", "graph"]);
    }

    #[test]
    fn tags_are_capped_at_five() {
        let tags = fallback_tags("alpha bravo charlie delta echo foxtrot golf hotel");
        assert_eq!(tags.len(), MAX_FALLBACK_TAGS);
        assert_eq!(tags, vec!["alpha", "bravo", "charlie", "delta", "echo"]);
    }

    #[test]
    fn tags_split_on_punctuation_but_keep_underscores() {
        let tags = fallback_tags("node-graph: snake_case/kebab-case");
        assert_eq!(tags, vec!["node", "graph", "snake_case", "kebab", "case"]);
    }

    #[test]
    fn tags_of_empty_content_are_empty() {
        assert!(fallback_tags("").is_empty());
        assert!(fallback_tags("a an the").is_empty());
    }
}
