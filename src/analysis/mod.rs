//! Text analysis over stored posts: TextRank summaries and lexical or
//! embedding similarity.

mod backlog;
pub mod similarity;
mod stopwords;
pub mod textrank;

pub use backlog::{summarize_backlog, BacklogReport};
pub use similarity::{similar_posts, SimilarPost};
