use serde::{Deserialize, Serialize};

const MAX_LIMIT: i64 = 100;

/// `?page=&limit=` query parameters, 1-based.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl Pagination {
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        let limit = self.limit();
        PageMeta {
            total_pages: (total + limit - 1) / limit,
            current_page: self.page(),
            total,
        }
    }
}

/// Paging fields flattened into list responses.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total_pages: i64,
    pub current_page: i64,
    pub total: i64,
}
