mod blog;
mod job;
mod post;

pub use blog::{Blog, NewBlog};
pub use job::{ImportJob, ImportProgress, JobStatus, SourceKind};
pub use post::{DiscoveredPost, NewPost, Post};
