//! Page-by-page traversal of a remote collection.
//!
//! A [`PageCursor`] owns the filter set of one walk and rewrites its
//! `next`/`prev` tokens as pages come in, so after the walk the filters
//! describe where a follow-up request should resume. Tokens are read from
//! the links the endpoint puts on each page; the walker never builds them.

use std::time::Duration;

use fedi_protocol::Filters;
use fedi_types::{Hash, WireItem, WireObject};
use tokio::time::timeout;
use tracing::{debug, trace};
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteTransport;

/// Upper bound on a single page fetch.
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// What the accumulator wants the walker to do after a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

#[derive(Clone, Debug)]
pub struct PageCursor {
    iri: String,
    filters: Filters,
    processed: usize,
    pages: usize,
    page_timeout: Duration,
}

impl PageCursor {
    pub fn new(iri: impl Into<String>, filters: Filters) -> Self {
        Self {
            iri: iri.into(),
            filters,
            processed: 0,
            pages: 0,
            page_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }

    pub fn with_page_timeout(mut self, page_timeout: Duration) -> Self {
        self.page_timeout = page_timeout;
        self
    }

    pub fn iri(&self) -> &str {
        &self.iri
    }

    /// The filter set, carrying the tokens of the last page seen.
    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    /// Members seen so far.
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Pages fetched so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Fetch pages and feed them to `accumulate` until it says stop, the
    /// collection runs out, or the declared total has been seen.
    ///
    /// The accumulator keeps its own results: when a fetch fails or times
    /// out, the error is returned and whatever was accumulated stays where
    /// the accumulator put it.
    pub async fn walk<F>(&mut self, transport: &dyn RemoteTransport, mut accumulate: F) -> SyncResult<()>
    where
        F: FnMut(&WireObject) -> SyncResult<Step>,
    {
        loop {
            let page = match timeout(self.page_timeout, transport.collection(&self.iri, &self.filters)).await {
                Ok(page) => page?,
                Err(_) => {
                    return Err(SyncError::Timeout {
                        iri: self.iri.clone(),
                        after_ms: u64::try_from(self.page_timeout.as_millis()).unwrap_or(u64::MAX),
                    })
                }
            };
            self.pages += 1;

            let count = page.members().len();
            if count == 0 && self.pages > 1 {
                trace!(iri = %self.iri, "empty trailing page");
                self.filters.next = None;
                break;
            }

            let step = accumulate(&page)?;

            let (prev, next) = page_tokens(&page);
            if self.processed == 0 {
                self.filters.prev = prev;
            }
            self.filters.next = next;
            self.processed += count;

            let total = page.total_items.and_then(|t| usize::try_from(t).ok());
            let exhausted = total.is_some_and(|t| self.processed >= t);
            if step == Step::Stop || self.filters.next.is_none() || exhausted || count == 0 {
                break;
            }
        }
        debug!(
            iri = %self.iri,
            pages = self.pages,
            processed = self.processed,
            "collection walk finished"
        );
        Ok(())
    }
}

/// Previous and next page tokens advertised by a page.
///
/// Pages link to their neighbours; a bare collection only links to its
/// first page, and when it does not, the last member stands in as the
/// resume point.
pub fn page_tokens(page: &WireObject) -> (Option<String>, Option<String>) {
    if page.kind.is_page() {
        (
            query_token(page.prev.as_ref(), "before"),
            query_token(page.next.as_ref(), "after"),
        )
    } else if page.kind.is_collection() {
        let next = query_token(page.first.as_ref(), "after").or_else(|| {
            page.members()
                .last()
                .map(|member| Hash::from_iri(member.link()))
                .filter(|hash| !hash.is_empty())
                .map(|hash| hash.as_str().to_string())
        });
        (None, next)
    } else {
        (None, None)
    }
}

fn query_token(link: Option<&WireItem>, key: &str) -> Option<String> {
    let url = Url::parse(link?.link()).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}
