use url::Url;

/// Blog platforms whose feeds can be walked past the first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPlatform {
    WordPress,
    Blogger,
    Ghost,
}

const BLOGGER_PAGE_SIZE: u32 = 25;

impl FeedPlatform {
    /// Detect pagination support from the URL shape first, then from
    /// platform markers in the raw body.
    pub fn detect(feed_url: &str, body: &[u8]) -> Option<Self> {
        Self::from_url(feed_url).or_else(|| Self::from_body(body))
    }

    fn from_url(feed_url: &str) -> Option<Self> {
        let url = Url::parse(feed_url).ok()?;
        let host = url.host_str().unwrap_or_default();
        let path = url.path().trim_end_matches('/');

        if host.ends_with(".blogspot.com") || path.contains("/feeds/posts/") {
            Some(FeedPlatform::Blogger)
        } else if host.ends_with(".wordpress.com") || path.ends_with("/feed") {
            Some(FeedPlatform::WordPress)
        } else {
            None
        }
    }

    fn from_body(body: &[u8]) -> Option<Self> {
        let head = &body[..body.len().min(4096)];
        let head = String::from_utf8_lossy(head).to_lowercase();

        if head.contains("wordpress.org") || head.contains("wordpress.com") {
            Some(FeedPlatform::WordPress)
        } else if head.contains("blogger.com") || head.contains("<generator>blogger") {
            Some(FeedPlatform::Blogger)
        } else if head.contains("<generator>ghost") {
            Some(FeedPlatform::Ghost)
        } else {
            None
        }
    }

    /// URL of page `page` (2 and up; page 1 is the feed URL itself).
    pub fn page_url(&self, feed_url: &str, page: u32) -> Option<String> {
        let mut url = Url::parse(feed_url).ok()?;
        match self {
            FeedPlatform::WordPress => {
                set_query_param(&mut url, "paged", &page.to_string());
            }
            FeedPlatform::Blogger => {
                let start = (page - 1) * BLOGGER_PAGE_SIZE + 1;
                set_query_param(&mut url, "start-index", &start.to_string());
                set_query_param(&mut url, "max-results", &BLOGGER_PAGE_SIZE.to_string());
            }
            FeedPlatform::Ghost => {
                let base = url.path().trim_end_matches('/').to_string();
                url.set_path(&format!("{}/{}/", base, page));
            }
        }
        Some(url.to_string())
    }
}

fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &kept {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(key, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_platform_from_url() {
        assert_eq!(
            FeedPlatform::detect("https://blog.example/feed/", b""),
            Some(FeedPlatform::WordPress)
        );
        assert_eq!(
            FeedPlatform::detect("https://x.blogspot.com/feeds/posts/default", b""),
            Some(FeedPlatform::Blogger)
        );
    }

    #[test]
    fn falls_back_to_body_markers() {
        let ghost = b"<?xml version=\"1.0\"?><rss><channel><generator>Ghost 5.70</generator>";
        assert_eq!(
            FeedPlatform::detect("https://blog.example/rss/", ghost),
            Some(FeedPlatform::Ghost)
        );
        let wp = b"<rss><channel><generator>https://wordpress.org/?v=6.4</generator>";
        assert_eq!(
            FeedPlatform::detect("https://blog.example/index.xml", wp),
            Some(FeedPlatform::WordPress)
        );
        assert_eq!(FeedPlatform::detect("https://blog.example/index.xml", b"<rss>"), None);
    }

    #[test]
    fn builds_page_urls() {
        assert_eq!(
            FeedPlatform::WordPress.page_url("https://blog.example/feed/", 3).unwrap(),
            "https://blog.example/feed/?paged=3"
        );
        assert_eq!(
            FeedPlatform::WordPress.page_url("https://blog.example/feed/?paged=2", 3).unwrap(),
            "https://blog.example/feed/?paged=3"
        );
        assert_eq!(
            FeedPlatform::Blogger
                .page_url("https://x.blogspot.com/feeds/posts/default", 2)
                .unwrap(),
            "https://x.blogspot.com/feeds/posts/default?start-index=26&max-results=25"
        );
        assert_eq!(
            FeedPlatform::Ghost.page_url("https://blog.example/rss/", 2).unwrap(),
            "https://blog.example/rss/2/"
        );
    }
}
