pub mod archive;
mod fetcher;
mod pagination;
mod parser;

pub use fetcher::{FeedFetcher, FetchedBody, HttpTransport, FEED_ACCEPT, JSON_ACCEPT};
pub use pagination::FeedPlatform;
pub use parser::{looks_like_feed, parse_feed, ParsedFeed};
