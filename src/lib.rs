//! Conservator: local working copies of remote media-annotation datasets
//!
//! Two halves share one connection layer. The query side shapes GraphQL
//! requests from field include/exclude rules, populates typed proxies lazily
//! and pages through search results. The dataset side mirrors a dataset into a
//! local working copy with a content-addressed index and a linear commit chain
//! that is pushed to and pulled from the server.

pub mod cli;
pub mod config;
pub mod connection;
pub mod conservator;
pub mod dataset;
pub mod error;
pub mod fields;
pub mod logging;
pub mod manager;
pub mod paginated;
pub mod pool;
pub mod processing;
pub mod proxy;
pub mod query;
pub mod remote;
pub mod schema;
pub mod transport;
pub mod types;

pub use conservator::Conservator;
pub use error::{ApiError, StorageError};
