//! Git working copies: cloning, caching, committing and pushing.

pub mod auth;
pub mod cache;
pub mod parse;
pub mod repository;
pub mod types;
pub mod writer;

pub use cache::{RepositoryCache, RepositoryHandle};
pub use repository::GitRepository;
pub use types::*;
pub use writer::GitWriter;
