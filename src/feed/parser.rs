use feed_rs::model::Entry;
use feed_rs::parser;

use crate::error::Result;
use crate::models::DiscoveredPost;
use crate::text;

/// Feed-level metadata plus the posts found in one feed document.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_url: Option<String>,
    pub generator: Option<String>,
    pub posts: Vec<DiscoveredPost>,
}

/// Cheap check that a body is an XML feed and not an HTML error or
/// redirect page, done before handing it to the real parser.
pub fn looks_like_feed(body: &[u8]) -> bool {
    let head = &body[..body.len().min(1024)];
    let head = String::from_utf8_lossy(head);
    let head = head.trim_start_matches('\u{feff}').trim_start().to_lowercase();

    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        return false;
    }
    head.starts_with("<?xml")
        || head.starts_with("<rss")
        || head.starts_with("<feed")
        || head.starts_with("<rdf:rdf")
        || (head.starts_with("<!--") && (head.contains("<rss") || head.contains("<feed")))
}

pub fn parse_feed(body: &[u8]) -> Result<ParsedFeed> {
    let feed = parser::parse(body)?;

    let site_url = feed
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| feed.links.iter().find(|l| l.rel.as_deref() != Some("self")))
        .map(|l| l.href.clone());

    let generator = feed.generator.map(|g| match g.uri {
        Some(uri) => format!("{} {}", g.content, uri),
        None => g.content,
    });

    let posts = feed.entries.into_iter().filter_map(entry_to_post).collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content.trim().to_string()).filter(|t| !t.is_empty()),
        description: feed.description.map(|d| d.content),
        site_url,
        generator,
        posts,
    })
}

fn entry_to_post(entry: Entry) -> Option<DiscoveredPost> {
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone())
        .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;
    let link = text::unwrap_archive_link(&link);
    if link.is_empty() {
        return None;
    }

    // Try content first, then fall back to summary
    let content = entry
        .content
        .and_then(|c| c.body)
        .or_else(|| entry.summary.map(|s| s.content));

    let categories = entry
        .categories
        .into_iter()
        .map(|c| c.label.unwrap_or(c.term))
        .collect();

    Some(DiscoveredPost {
        title: entry.title.map(|t| t.content).unwrap_or_default(),
        link,
        published_at: entry.published.or(entry.updated),
        author: entry.authors.first().map(|a| a.name.clone()),
        categories,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <link>https://blog.example</link>
    <description>Notes</description>
    <generator>https://wordpress.org/?v=6.4</generator>
    <item>
      <title>First</title>
      <link>https://blog.example/first</link>
      <pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>
      <category>rust</category>
      <description>&lt;p&gt;Hello&lt;/p&gt;</description>
    </item>
    <item>
      <title>Archived</title>
      <link>https://web.archive.org/web/20200101000000/https://blog.example/old</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn sniffs_xml_and_rejects_html() {
        assert!(looks_like_feed(RSS.as_bytes()));
        assert!(looks_like_feed(b"\xef\xbb\xbf  <feed xmlns=\"http://www.w3.org/2005/Atom\">"));
        assert!(!looks_like_feed(b"<!DOCTYPE html><html><body>moved</body></html>"));
        assert!(!looks_like_feed(b"<html><head>"));
        assert!(!looks_like_feed(b"{\"error\": true}"));
        assert!(!looks_like_feed(b""));
    }

    #[test]
    fn parses_metadata_and_posts() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Example Blog"));
        assert!(feed.generator.as_deref().unwrap().contains("wordpress.org"));
        assert_eq!(feed.posts.len(), 2);

        let first = &feed.posts[0];
        assert_eq!(first.link, "https://blog.example/first");
        assert_eq!(first.categories, vec!["rust"]);
        assert!(first.published_at.is_some());
        assert!(first.content.as_deref().unwrap().contains("Hello"));

        assert_eq!(feed.posts[1].link, "https://blog.example/old");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_feed(b"<?xml version=\"1.0\"?><nothing/>").is_err());
    }
}
