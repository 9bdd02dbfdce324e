//! In-process stand-in for the network, used by importer and job tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::feed::{FetchedBody, HttpTransport};

#[derive(Debug, Clone)]
enum Reply {
    Body(u16, Vec<u8>),
    Unreachable,
}

/// Replies are scripted per exact URL and consumed in order; the last reply
/// for a URL repeats. Unscripted URLs answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.push(url, Reply::Body(status, body.into()));
        self
    }

    pub fn unreachable(self, url: &str) -> Self {
        self.push(url, Reply::Unreachable);
        self
    }

    fn push(&self, url: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str, _accept: &str) -> Result<FetchedBody> {
        self.requests.lock().unwrap().push(url.to_string());

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        // Yield like a real request would.
        tokio::task::yield_now().await;

        match reply {
            Some(Reply::Body(status, body)) => Ok(FetchedBody {
                status,
                url: url.to_string(),
                body,
            }),
            Some(Reply::Unreachable) => Err(AppError::Unreachable {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
            None => Ok(FetchedBody {
                status: 404,
                url: url.to_string(),
                body: b"not found".to_vec(),
            }),
        }
    }
}

/// A small RSS document with one item per `(title, link)` pair.
pub fn rss(title: &str, items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(t, l)| {
            format!(
                "<item><title>{}</title><link>{}</link><pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate>\
                 <category>notes</category><description>&lt;p&gt;{} has a few words of body text.&lt;/p&gt;</description></item>",
                t, l, t
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><rss version=\"2.0\"><channel>\
         <title>{}</title><link>https://blog.example</link><description>test</description>{}</channel></rss>",
        title, items
    )
}
