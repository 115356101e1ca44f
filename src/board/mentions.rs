//! Parse `@username` mentions from comment and chat text.
//!
//! A mention is `@` at line start or after a non-word character, followed
//! by ASCII alphanumerics, `_`, `-` or `.`. A trailing `.` belongs to the
//! sentence, not the name. Fenced code blocks and inline code are skipped.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^A-Za-z0-9_])@([A-Za-z0-9_][A-Za-z0-9_.\-]*)").unwrap());

/// Extract unique mentioned usernames, lower-cased and sorted.
pub fn parse_mentions(text: &str) -> Vec<String> {
    let mut names = BTreeSet::new();
    let mut in_fenced_block = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fenced_block = !in_fenced_block;
            continue;
        }
        if in_fenced_block {
            continue;
        }

        // Even segments are outside backtick spans; an unclosed span runs to
        // the end of the line.
        for segment in line.split('`').step_by(2) {
            for cap in MENTION_REGEX.captures_iter(segment) {
                let name = cap[1].trim_end_matches('.');
                if !name.is_empty() {
                    names.insert(name.to_ascii_lowercase());
                }
            }
        }
    }

    names.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_mentions() {
        assert_eq!(
            parse_mentions("@alice can you review? cc @bob_smith"),
            vec!["alice", "bob_smith"]
        );
    }

    #[test]
    fn test_dedupes_and_lowercases() {
        assert_eq!(parse_mentions("@Alice @alice @ALICE"), vec!["alice"]);
    }

    #[test]
    fn test_trailing_period_is_trimmed() {
        assert_eq!(parse_mentions("Thanks @carol."), vec!["carol"]);
        assert_eq!(parse_mentions("ping @j.doe, please"), vec!["j.doe"]);
    }

    #[test]
    fn test_email_addresses_are_not_mentions() {
        assert!(parse_mentions("mail bob@example.com").is_empty());
    }

    #[test]
    fn test_adjacent_punctuation() {
        assert_eq!(parse_mentions("(@dave),@erin"), vec!["dave", "erin"]);
    }

    #[test]
    fn test_skips_inline_code() {
        assert_eq!(parse_mentions("use `@decorator` like @frank"), vec!["frank"]);
        assert!(parse_mentions("unclosed `@ghost").is_empty());
    }

    #[test]
    fn test_skips_fenced_code_blocks() {
        let text = "before @amy\n```\n@inside\n```\nafter @ben";
        assert_eq!(parse_mentions(text), vec!["amy", "ben"]);
    }

    #[test]
    fn test_bare_at_sign() {
        assert!(parse_mentions("meet @ 5pm").is_empty());
        assert!(parse_mentions("").is_empty());
    }
}
