//! Recoverable errors from the public API. Fatal conditions (platform
//! mapping failure, oversized family registration, double free) are
//! programming errors, not recoverable results: they are logged via
//! `log::error!` and abort the process instead of appearing here.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocError {
    #[error("no family registered under the name {0:?}")]
    UnknownFamily(String),

    #[error("requested {requested} bytes exceeds the per-page payload capacity of {capacity} bytes")]
    RequestTooLarge { requested: usize, capacity: usize },
}
