//! Lazy pagination over a page-at-a-time source.

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use snafu::prelude::*;

use drift_core::emit;

use super::{Record, RecordFetcher, RecordStream};
use crate::category::Category;
use crate::error::{FetchError, RepeatedPageTokenSnafu};
use crate::metrics::events::PageFetched;
use crate::scheduler::PollWindow;

/// Upper bound on results requested per page.
pub const MAX_RESULTS_PER_PAGE: usize = 1000;

/// Parameters for one page request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub category: Category,
    pub window: PollWindow,
    pub page_token: Option<&'a str>,
    pub max_results: usize,
}

/// One page of upstream results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// Absent or empty on the last page.
    pub next_page_token: Option<String>,
}

/// Fetches a single page per call.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, FetchError>;
}

enum Cursor {
    First,
    Next(String),
    Done,
}

/// Stream every record of every page for `category`, requesting the next
/// page only once the previous one has been consumed.
pub fn paginate<'a, S>(
    source: &'a S,
    category: Category,
    window: PollWindow,
) -> impl Stream<Item = Result<Record, FetchError>> + Send + 'a
where
    S: PageSource + ?Sized,
{
    stream::try_unfold(Cursor::First, move |cursor| {
        next_page(source, category, window, cursor)
    })
    .map_ok(|records| stream::iter(records.into_iter().map(Ok::<Record, FetchError>)))
    .try_flatten()
}

async fn next_page<S>(
    source: &S,
    category: Category,
    window: PollWindow,
    cursor: Cursor,
) -> Result<Option<(Vec<Record>, Cursor)>, FetchError>
where
    S: PageSource + ?Sized,
{
    let token = match cursor {
        Cursor::Done => return Ok(None),
        Cursor::First => None,
        Cursor::Next(token) => Some(token),
    };

    let page = source
        .fetch_page(PageRequest {
            category,
            window,
            page_token: token.as_deref(),
            max_results: MAX_RESULTS_PER_PAGE,
        })
        .await?;

    emit!(PageFetched {
        category,
        records: page.records.len(),
    });

    let next = match page.next_page_token {
        Some(next) if next.is_empty() => Cursor::Done,
        Some(next) => {
            ensure!(
                token.as_deref() != Some(next.as_str()),
                RepeatedPageTokenSnafu { category }
            );
            Cursor::Next(next)
        }
        None => Cursor::Done,
    };

    Ok(Some((page.records, next)))
}

/// [`RecordFetcher`] over any [`PageSource`].
#[derive(Debug, Clone)]
pub struct PaginatedFetcher<S> {
    source: S,
}

impl<S: PageSource> PaginatedFetcher<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: PageSource> RecordFetcher for PaginatedFetcher<S> {
    fn fetch(&self, category: Category, window: PollWindow) -> RecordStream<'_> {
        paginate(&self.source, category, window).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    use crate::error::UpstreamSnafu;

    fn window() -> PollWindow {
        PollWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap(),
        )
    }

    /// Serves scripted pages and records the tokens it was asked for.
    struct ScriptedSource {
        pages: Vec<Result<Page, String>>,
        requested: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<Page, String>>) -> Self {
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<Option<String>> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, FetchError> {
            assert_eq!(request.max_results, MAX_RESULTS_PER_PAGE);
            let index = {
                let mut requested = self.requested.lock().unwrap();
                requested.push(request.page_token.map(str::to_string));
                requested.len() - 1
            };
            match &self.pages[index] {
                Ok(page) => Ok(page.clone()),
                Err(message) => UpstreamSnafu {
                    category: request.category,
                    message: message.clone(),
                }
                .fail(),
            }
        }
    }

    fn page(records: &[&str], next: Option<&str>) -> Page {
        Page {
            records: records.iter().map(|r| Record::from(*r)).collect(),
            next_page_token: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_follows_page_tokens_in_order() {
        let source = ScriptedSource::new(vec![
            Ok(page(&["a", "b"], Some("t1"))),
            Ok(page(&["c"], Some("t2"))),
            Ok(page(&["d"], None)),
        ]);

        let records: Vec<Record> = paginate(&source, Category::Drive, window())
            .try_collect()
            .await
            .unwrap();

        let lines: Vec<&str> = records.iter().map(Record::as_str).collect();
        assert_eq!(lines, vec!["a", "b", "c", "d"]);
        assert_eq!(
            source.requested(),
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_token_ends_stream() {
        let source = ScriptedSource::new(vec![Ok(page(&["a"], Some("")))]);

        let records: Vec<Record> = paginate(&source, Category::Login, window())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(source.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_page_with_token_continues() {
        let source = ScriptedSource::new(vec![Ok(page(&[], Some("t1"))), Ok(page(&["a"], None))]);

        let records: Vec<Record> = paginate(&source, Category::Login, window())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(records, vec![Record::from("a")]);
    }

    #[tokio::test]
    async fn test_page_error_ends_stream_after_earlier_records() {
        let source = ScriptedSource::new(vec![
            Ok(page(&["a", "b"], Some("t1"))),
            Err("503 backend unavailable".to_string()),
        ]);

        let items: Vec<Result<Record, FetchError>> =
            paginate(&source, Category::Admin, window()).collect().await;

        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        assert!(matches!(items[2], Err(FetchError::Upstream { .. })));
    }

    #[tokio::test]
    async fn test_pages_requested_lazily() {
        let source = ScriptedSource::new(vec![
            Ok(page(&["a"], Some("t1"))),
            Ok(page(&["b"], None)),
        ]);

        let mut stream = paginate(&source, Category::Drive, window()).boxed();
        let first = stream.try_next().await.unwrap();
        assert_eq!(first, Some(Record::from("a")));
        assert_eq!(source.requested().len(), 1);

        drop(stream);
        assert_eq!(source.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_token_is_error() {
        let source = ScriptedSource::new(vec![
            Ok(page(&["a"], Some("t1"))),
            Ok(page(&["b"], Some("t1"))),
        ]);

        let result: Result<Vec<Record>, FetchError> = paginate(&source, Category::Drive, window())
            .try_collect()
            .await;

        assert!(matches!(result, Err(FetchError::RepeatedPageToken { .. })));
    }

    #[tokio::test]
    async fn test_paginated_fetcher_boxes_stream() {
        let fetcher = PaginatedFetcher::new(ScriptedSource::new(vec![Ok(page(&["x"], None))]));

        let records: Vec<Record> = fetcher
            .fetch(Category::Meet, window())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(records, vec![Record::from("x")]);
    }
}
