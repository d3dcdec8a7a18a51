use crate::api::transport::sleep_or_cancel;
use crate::api::{CrmClient, Page, RetryOutcome, RetryPolicy, SearchFilter, SearchRequest};
use crate::error::{EngineError, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Where pages come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    /// Unfiltered listing of every record
    List,
    /// Search with all filters ANDed together
    Search(Vec<SearchFilter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Exhausted,
    Aborted,
}

/// Forward-only cursor walk over one object type.
///
/// Each call to [`Paginator::next_page`] issues one request carrying the
/// cursor from the previous response. The walk ends when a response has no
/// records or no cursor. A request that still fails after its retries ends
/// the walk with an error; `last_cursor` then names the page to resume from.
pub struct Paginator<'a> {
    client: &'a CrmClient,
    object: String,
    properties: Vec<String>,
    source: PageSource,
    page_size: usize,
    delay: Duration,
    policy: RetryPolicy,
    cancel: CancellationToken,
    cursor: Option<String>,
    state: State,
    pages: usize,
}

impl<'a> Paginator<'a> {
    #[must_use]
    pub fn new(
        client: &'a CrmClient,
        object: impl Into<String>,
        properties: Vec<String>,
        source: PageSource,
    ) -> Self {
        Self {
            client,
            object: object.into(),
            properties,
            source,
            page_size: crate::config::MAX_PAGE_SIZE,
            delay: Duration::from_millis(100),
            policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            cursor: None,
            state: State::Ready,
            pages: 0,
        }
    }

    #[must_use]
    pub const fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Pause inserted before every request except the first
    #[must_use]
    pub const fn throttle(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub const fn retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resumes a previous walk from a saved cursor
    #[must_use]
    pub fn start_after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Cursor the next request will carry
    #[must_use]
    pub fn last_cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    #[must_use]
    pub const fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// `true` once the server reported the end of the result set
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state == State::Exhausted
    }

    /// Fetches the next page, or `None` at the end of the stream.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Transport`] when a request fails after every retry
    /// - [`EngineError::Cancelled`] when the token fires between pages
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.state != State::Ready {
            return Ok(None);
        }

        if self.pages > 0 && !sleep_or_cancel(self.delay, &self.cancel).await {
            return Err(self.abort(EngineError::Cancelled));
        }
        if self.cancel.is_cancelled() {
            return Err(self.abort(EngineError::Cancelled));
        }

        let fetched = match &self.source {
            PageSource::List => {
                self.client
                    .list_records_retrying(
                        &self.object,
                        &self.properties,
                        self.page_size,
                        self.cursor.as_deref(),
                        &self.policy,
                        &self.cancel,
                    )
                    .await
            }
            PageSource::Search(filters) => {
                let request = SearchRequest {
                    filters: filters.clone(),
                    properties: self.properties.clone(),
                    limit: self.page_size,
                    after: self.cursor.clone(),
                };
                self.client
                    .search_records_retrying(&self.object, &request, &self.policy, &self.cancel)
                    .await
            }
        };

        let page = match fetched {
            Ok(page) => page,
            Err(RetryOutcome::Cancelled) => return Err(self.abort(EngineError::Cancelled)),
            Err(RetryOutcome::Failed(err)) => return Err(self.abort(EngineError::Transport(err))),
        };

        self.pages += 1;
        debug!(
            object = %self.object,
            page = self.pages,
            records = page.results.len(),
            has_next = page.next_after.is_some(),
            "Fetched page"
        );

        if page.results.is_empty() {
            self.cursor = None;
            self.state = State::Exhausted;
            return Ok(None);
        }
        self.cursor.clone_from(&page.next_after);
        if self.cursor.is_none() {
            info!(object = %self.object, pages = self.pages, "Reached end of results");
            self.state = State::Exhausted;
        }
        Ok(Some(page))
    }

    fn abort(&mut self, err: EngineError) -> EngineError {
        self.state = State::Aborted;
        err
    }
}
