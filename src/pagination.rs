//! # Pagination Cursor Validator
//!
//! Walks a collection page by page through any [`ProtocolAdapter`] and checks
//! the cursor contract: the walk ends exactly when `nextPageToken` is empty,
//! yields `totalSize` distinct resources, and never repeats an ID.
//!
//! The walk is a lazy stream: a page is fetched only when the consumer asks
//! for the next element, and every call to [`CursorValidator::walk`] starts
//! over from the first page.

use std::collections::HashSet;

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{ConformanceError, ConformanceResult};
use crate::models::{CollectionScope, ListQuery, Page, Resource};
use crate::transport::{ProtocolAdapter, StatusClass};

/// Upper bound on pages fetched by one walk
pub const DEFAULT_MAX_PAGES: usize = 1000;

const RUNAWAY_FIELD: &str = "nextPageToken";

/// A broken cursor-contract rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum CursorViolation {
    #[error("walk yielded {actual} resources but totalSize was {expected}")]
    CountMismatch { expected: u64, actual: u64 },

    #[error("resource '{id}' repeated on page {page}")]
    DuplicateId { id: String, page: usize },

    #[error("walk took {actual} pages, expected {expected}")]
    PageCount { expected: usize, actual: usize },

    #[error("page {page} has {len} resources, more than page size {page_size}")]
    PageOverflow { page: usize, len: usize, page_size: u32 },

    #[error("page {page} reported totalSize {actual}, first page reported {expected}")]
    TotalSizeDrift { page: usize, expected: u64, actual: u64 },

    #[error("nextPageToken still non-empty after {pages} pages")]
    RunawayWalk { pages: usize },

    #[error("page {page} was rejected with {status}")]
    PageRejected { page: usize, status: StatusClass },

    #[error("re-fetching token '{token}' returned a different page")]
    TokenNotIdempotent { token: String },
}

/// One fetched page, reduced to what the checks need
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub ids: Vec<String>,
    pub next_page_token: String,
    pub total_size: u64,
}

impl From<&Page> for PageSummary {
    fn from(page: &Page) -> Self {
        Self {
            ids: page.ids(),
            next_page_token: page.next_page_token.clone(),
            total_size: page.total_size,
        }
    }
}

/// Outcome of a full validated walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkReport {
    pub pages: Vec<PageSummary>,
    /// Every ID in walk order
    pub ids: Vec<String>,
    /// `totalSize` of the first page
    pub total_size: u64,
    pub violations: Vec<CursorViolation>,
}

impl WalkReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Tokens that led to pages after the first
    pub fn tokens(&self) -> Vec<String> {
        self.pages
            .iter()
            .map(|p| p.next_page_token.clone())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Default)]
struct WalkState {
    token: Option<String>,
    fetched: usize,
}

/// Walks and validates one list query
pub struct CursorValidator<'a> {
    adapter: &'a dyn ProtocolAdapter,
    scope: CollectionScope,
    query: ListQuery,
    page_size: u32,
    max_pages: usize,
}

impl<'a> CursorValidator<'a> {
    /// `default_page_size` applies when `query` carries no page size or 0,
    /// which asks the service for its default
    pub fn new(
        adapter: &'a dyn ProtocolAdapter,
        scope: CollectionScope,
        query: ListQuery,
        default_page_size: u32,
    ) -> Self {
        let page_size = query.page_size.filter(|&n| n > 0).unwrap_or(default_page_size);
        Self {
            adapter,
            scope,
            query: query.at_token(""),
            page_size,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    async fn fetch(&self, token: Option<&str>) -> ConformanceResult<Page> {
        let query = self.query.at_token(token.unwrap_or_default());
        let envelope = self.adapter.list(&self.scope, &query).await?;
        if !envelope.is_ok() {
            return Err(ConformanceError::unexpected_status(
                format!("list {}", self.scope),
                envelope.status,
            ));
        }
        envelope
            .into_page()
            .ok_or_else(|| ConformanceError::invalid_response("page", "successful list without a page body"))
    }

    /// Lazy stream of pages; ends after the page with an empty token
    pub fn pages(&self) -> impl Stream<Item = ConformanceResult<Page>> + '_ {
        stream::try_unfold(Some(WalkState::default()), move |state| async move {
            let Some(state) = state else {
                return Ok(None);
            };
            if state.fetched >= self.max_pages {
                return Err(ConformanceError::invalid_response(
                    RUNAWAY_FIELD,
                    format!("still non-empty after {} pages", self.max_pages),
                ));
            }

            let page = self.fetch(state.token.as_deref()).await?;
            debug!(
                scope = %self.scope,
                page = state.fetched + 1,
                items = page.len(),
                last = page.is_last(),
                "Fetched page"
            );

            let next = (!page.is_last()).then(|| WalkState {
                token: Some(page.next_page_token.clone()),
                fetched: state.fetched + 1,
            });
            Ok(Some((page, next)))
        })
    }

    /// Lazy stream of resources across all pages
    pub fn walk(&self) -> impl Stream<Item = ConformanceResult<Resource>> + '_ {
        self.pages()
            .map_ok(|page| stream::iter(page.items.into_iter().map(Ok)))
            .try_flatten()
    }

    /// Walk to the end and check every cursor rule
    pub async fn validate(&self) -> ConformanceResult<WalkReport> {
        let mut report = WalkReport::default();
        let mut seen = HashSet::new();
        let pages = self.pages();
        futures::pin_mut!(pages);

        while let Some(result) = pages.next().await {
            let page_number = report.pages.len() + 1;
            let page = match result {
                Ok(page) => page,
                Err(ConformanceError::UnexpectedStatus { status, .. }) => {
                    report.violations.push(CursorViolation::PageRejected {
                        page: page_number,
                        status,
                    });
                    return Ok(report);
                }
                Err(ConformanceError::InvalidResponse { field, .. }) if field == RUNAWAY_FIELD => {
                    report.violations.push(CursorViolation::RunawayWalk {
                        pages: report.pages.len(),
                    });
                    return Ok(report);
                }
                Err(e) => return Err(e),
            };

            if page_number == 1 {
                report.total_size = page.total_size;
            } else if page.total_size != report.total_size {
                report.violations.push(CursorViolation::TotalSizeDrift {
                    page: page_number,
                    expected: report.total_size,
                    actual: page.total_size,
                });
            }

            if page.len() > self.page_size as usize {
                report.violations.push(CursorViolation::PageOverflow {
                    page: page_number,
                    len: page.len(),
                    page_size: self.page_size,
                });
            }

            for id in page.ids() {
                if !seen.insert(id.clone()) {
                    report.violations.push(CursorViolation::DuplicateId {
                        id: id.clone(),
                        page: page_number,
                    });
                }
                report.ids.push(id);
            }
            report.pages.push(PageSummary::from(&page));
        }

        let count = report.ids.len() as u64;
        if count != report.total_size {
            report.violations.push(CursorViolation::CountMismatch {
                expected: report.total_size,
                actual: count,
            });
        }

        let expected_pages = report.ids.len().div_ceil(self.page_size.max(1) as usize).max(1);
        if report.pages.len() != expected_pages {
            report.violations.push(CursorViolation::PageCount {
                expected: expected_pages,
                actual: report.pages.len(),
            });
        }

        if !report.is_clean() {
            warn!(scope = %self.scope, violations = report.violations.len(), "Cursor contract violated");
        }
        Ok(report)
    }

    /// Fetch the page behind `token` twice and compare.
    ///
    /// Only meaningful while nothing else mutates the collection; concurrent
    /// writers make this check racy.
    pub async fn check_token_idempotence(&self, token: &str) -> ConformanceResult<Option<CursorViolation>> {
        let first = self.fetch(Some(token)).await?;
        let second = self.fetch(Some(token)).await?;
        if PageSummary::from(&first) == PageSummary::from(&second) {
            Ok(None)
        } else {
            Ok(Some(CursorViolation::TokenNotIdempotent {
                token: token.to_string(),
            }))
        }
    }
}
