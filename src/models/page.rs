//! List requests and the pages they return.

use serde::{Deserialize, Serialize};

use super::resource::{Resource, View};

/// Parameters of a list request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Raw filter string; empty means no filter
    #[serde(default)]
    pub filter: String,
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
    pub view: Option<View>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_page_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.page_token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn with_view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }

    /// The same query positioned at another page
    pub fn at_token(&self, token: &str) -> Self {
        self.clone().with_page_token(token)
    }
}

/// One page of a list response
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Resource>,
    /// Empty if and only if this is the last page
    pub next_page_token: String,
    pub total_size: u64,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.next_page_token.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|r| r.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
