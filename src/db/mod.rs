mod repository;
mod schema;

pub use repository::{BatchOutcome, Repository, SearchHit};
