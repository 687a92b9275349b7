use serde::{Deserialize, Serialize};

// ============================================================================
// Shared Validation & Pagination
// ============================================================================

/// Malformed administrative input, rejected before any state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}: {}", details.join("; "))]
pub struct ValidationError {
    pub message: String,
    pub details: Vec<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            message: message.into(),
            details,
        }
    }

    pub fn single(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(message, vec![detail.into()])
    }
}

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Raw `?page=&limit=` query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// A resolved page: `page` starts at 1, `limit` is capped at [`MAX_PAGE_LIMIT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    /// Missing, unparsable or non-positive values fall back to the defaults.
    pub fn from_request(request: &PageRequest) -> Self {
        let parse = |raw: &Option<String>| {
            raw.as_deref()
                .and_then(|value| value.trim().parse::<u32>().ok())
                .filter(|value| *value > 0)
        };

        Self {
            page: parse(&request.page).unwrap_or(1),
            limit: parse(&request.limit)
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .min(MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

/// One page of items plus the pagination summary
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, page: Page, total: i64) -> Self {
        let limit = i64::from(page.limit);
        let total_pages = if total <= 0 { 0 } else { (total + limit - 1) / limit };

        Self {
            items,
            pagination: Pagination {
                page: page.page,
                limit: page.limit,
                total,
                total_pages,
            },
        }
    }
}
