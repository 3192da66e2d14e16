//! # Search and Pagination

use crate::model::{Package, PackageVersion};

/// Page size used when the client gives none, zero, or garbage.
pub const DEFAULT_PAGE_SIZE: usize = 10;
/// Upper bound on page size.
pub const MAX_PAGE_SIZE: usize = 100;

/// A normalized, 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    page: usize,
    per_page: usize,
}

impl Paginator {
    /// Normalize raw client values: `page < 1` becomes 1, `per_page < 1`
    /// becomes [`DEFAULT_PAGE_SIZE`], `per_page` above [`MAX_PAGE_SIZE`] is clamped.
    pub fn new(page: i64, per_page: i64) -> Self {
        let page = if page < 1 { 1 } else { page as usize };
        let per_page = if per_page < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            (per_page as usize).min(MAX_PAGE_SIZE)
        };
        Self { page, per_page }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.per_page)
    }

    /// Whether items remain after this page out of `total`.
    pub fn has_next(&self, total: usize) -> bool {
        self.offset().saturating_add(self.per_page) < total
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE as i64)
    }
}

/// Package search filter.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Case-insensitive substring of the package name. Empty matches all.
    pub query: String,
    /// `(key, value)` that at least one version's properties must carry.
    pub property: Option<(String, String)>,
}

/// One search hit.
#[derive(Debug, Clone)]
pub struct PackageSummary {
    pub package: Package,
    /// Most recently created version.
    pub latest: PackageVersion,
    /// Downloads summed over all versions.
    pub downloads: u64,
}

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage {
    /// Matches across all pages.
    pub total: usize,
    pub packages: Vec<PackageSummary>,
    pub paginator: Paginator,
}

impl SearchPage {
    pub fn has_next(&self) -> bool {
        self.paginator.has_next(self.total)
    }
}
