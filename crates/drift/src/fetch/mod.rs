//! Upstream record fetching.
//!
//! A [`RecordFetcher`] turns one category and poll window into a lazy stream
//! of records. The HTTP implementation pages through the Admin Reports API via
//! [`paginate`]; tests substitute in-memory fetchers.

mod auth;
mod paginate;
mod reports;

pub use auth::{DEFAULT_TOKEN_URL, REPORTS_SCOPES, ServiceAccount, TokenSource};
pub use paginate::{
    MAX_RESULTS_PER_PAGE, Page, PageRequest, PageSource, PaginatedFetcher, paginate,
};
pub use reports::ReportsClient;

use futures::stream::BoxStream;
use std::fmt;

use crate::category::Category;
use crate::error::FetchError;
use crate::scheduler::PollWindow;

/// One upstream event, already serialized as a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record(String);

impl Record {
    pub fn new(line: impl Into<String>) -> Self {
        Self(line.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for Record {
    fn from(line: String) -> Self {
        Self(line)
    }
}

impl From<&str> for Record {
    fn from(line: &str) -> Self {
        Self(line.to_string())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lazy stream of records for one category.
///
/// An error item ends the stream.
pub type RecordStream<'a> = BoxStream<'a, Result<Record, FetchError>>;

/// Source of records for a category within a poll window.
pub trait RecordFetcher: Send + Sync {
    fn fetch(&self, category: Category, window: PollWindow) -> RecordStream<'_>;
}

impl<F: RecordFetcher + ?Sized> RecordFetcher for std::sync::Arc<F> {
    fn fetch(&self, category: Category, window: PollWindow) -> RecordStream<'_> {
        (**self).fetch(category, window)
    }
}
