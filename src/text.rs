//! Plain-text helpers shared by every importer.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

pub const WORDS_PER_MINUTE: usize = 200;

/// Extracted text longer than this is treated as the full post rather than an excerpt.
pub const FULL_TEXT_THRESHOLD: usize = 500;

static FOOTNOTE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\d+\]:\s").expect("valid footnote regex"));

static ARCHIVE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://web\.archive\.org/web/\d+[a-z_]*/(.+)$").expect("valid archive regex")
});

/// Convert HTML to readable plain text, one paragraph per line.
pub fn strip_html(html: &str) -> String {
    if !html.contains('<') {
        return collapse_lines(html);
    }

    match html2text::from_read(html.as_bytes(), 10_000) {
        Ok(text) => {
            let kept: Vec<&str> = text
                .lines()
                .filter(|l| !FOOTNOTE_LINE.is_match(l.trim_start()))
                .collect();
            collapse_lines(&kept.join("\n"))
        }
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            String::new()
        }
    }
}

fn collapse_lines(text: &str) -> String {
    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Minutes needed to read `words`, rounded up. Zero words read in zero minutes.
pub fn reading_time_minutes(words: usize) -> usize {
    words.div_ceil(WORDS_PER_MINUTE)
}

pub fn is_full_text(text: &str) -> bool {
    text.chars().count() > FULL_TEXT_THRESHOLD
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Give a user-typed URL a scheme, upgrading plain http to https.
pub fn normalize_feed_url(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("https://{}", rest)
    } else if trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed.trim_start_matches('/'))
    }
}

/// The user's own URL when it explicitly asked for plain http.
pub fn plain_http(input: &str) -> Option<String> {
    let trimmed = input.trim();
    trimmed.starts_with("http://").then(|| trimmed.to_string())
}

/// Comparison key for "is this the same blog": case-insensitive, scheme and
/// trailing slashes removed.
pub fn source_key(url: &str) -> String {
    let lower = url.trim().to_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    without_scheme.trim_end_matches('/').to_string()
}

/// Undo the archive's link rewriting so a post found in a snapshot keys the
/// same as its live-feed twin.
pub fn unwrap_archive_link(link: &str) -> String {
    let link = link.trim();
    match ARCHIVE_LINK.captures(link) {
        Some(caps) => caps[1].to_string(),
        None => link.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_to_paragraphs() {
        let text = strip_html("<p>Hello <b>world</b></p><p>Second   paragraph</p>");
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
        assert!(text.contains("Second paragraph"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn plain_input_is_only_whitespace_collapsed() {
        assert_eq!(strip_html("  one   two \n\n three "), "one two\nthree");
    }

    #[test]
    fn counts_and_reading_time() {
        assert_eq!(word_count("a b  c\nd"), 4);
        assert_eq!(reading_time_minutes(0), 0);
        assert_eq!(reading_time_minutes(1), 1);
        assert_eq!(reading_time_minutes(200), 1);
        assert_eq!(reading_time_minutes(201), 2);
    }

    #[test]
    fn full_text_threshold() {
        assert!(!is_full_text(&"x".repeat(FULL_TEXT_THRESHOLD)));
        assert!(is_full_text(&"x".repeat(FULL_TEXT_THRESHOLD + 1)));
    }

    #[test]
    fn feed_urls_get_secure_scheme() {
        assert_eq!(normalize_feed_url("example.com/feed"), "https://example.com/feed");
        assert_eq!(normalize_feed_url("http://example.com/feed"), "https://example.com/feed");
        assert_eq!(normalize_feed_url(" https://example.com/ "), "https://example.com/");
        assert_eq!(plain_http(" http://example.com/feed").as_deref(), Some("http://example.com/feed"));
        assert_eq!(plain_http("example.com/feed"), None);
    }

    #[test]
    fn source_keys_ignore_scheme_case_and_slash() {
        assert_eq!(source_key("https://Example.com/Feed/"), "example.com/feed");
        assert_eq!(source_key("http://example.com/feed"), "example.com/feed");
        assert_eq!(source_key("example.com/feed//"), "example.com/feed");
    }

    #[test]
    fn archive_links_are_unwrapped() {
        assert_eq!(
            unwrap_archive_link("https://web.archive.org/web/20150101000000/https://blog.example/post"),
            "https://blog.example/post"
        );
        assert_eq!(
            unwrap_archive_link("http://web.archive.org/web/20150101000000id_/http://blog.example/p"),
            "http://blog.example/p"
        );
        assert_eq!(unwrap_archive_link(" https://blog.example/p "), "https://blog.example/p");
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
