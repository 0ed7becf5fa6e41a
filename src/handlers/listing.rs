// src/handlers/listing.rs

//! Paging helpers shared by the list screens.

use crate::api::Subscription;

/// Paging state of a server-paged list (`$skip/$top/$count`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerPaging {
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

impl ServerPaging {
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            total: 0,
        }
    }

    pub fn page_count(&self) -> u32 {
        let pages = self.total.div_ceil(u64::from(self.page_size));
        u32::try_from(pages).unwrap_or(u32::MAX).max(1)
    }

    /// Rejects pages past the last known one.
    pub fn set_page(&mut self, page: u32) -> bool {
        if page == 0 || page > self.page_count() {
            return false;
        }
        self.page = page;
        true
    }

    pub fn reset(&mut self) {
        self.page = 1;
    }
}

/// Client-side filter over fetched rows.
pub trait RowFilter<T> {
    fn matches(&self, row: &T) -> bool;
}

/// Rows fetched in full, then filtered and paged locally.
///
/// Changing the filter resets to the first page. The subscription marks the
/// table stale when its collection is invalidated.
#[derive(Debug)]
pub struct ClientTable<T, F> {
    rows: Vec<T>,
    filter: F,
    page: usize,
    page_size: usize,
    subscription: Subscription,
}

impl<T, F: RowFilter<T>> ClientTable<T, F> {
    pub fn new(filter: F, page_size: usize, subscription: Subscription) -> Self {
        Self {
            rows: Vec::new(),
            filter,
            page: 1,
            page_size: page_size.max(1),
            subscription,
        }
    }

    pub fn set_rows(&mut self, rows: Vec<T>) {
        self.rows = rows;
        if self.page > self.page_count() {
            self.page = self.page_count();
        }
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: F) {
        self.filter = filter;
        self.page = 1;
    }

    /// Mutable access to the filter; resets to the first page.
    pub fn filter_mut(&mut self) -> &mut F {
        self.page = 1;
        &mut self.filter
    }

    pub fn filtered(&self) -> Vec<&T> {
        self.rows.iter().filter(|r| self.filter.matches(r)).collect()
    }

    pub fn total_filtered(&self) -> usize {
        self.rows.iter().filter(|r| self.filter.matches(r)).count()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.total_filtered().div_ceil(self.page_size).max(1)
    }

    pub fn set_page(&mut self, page: usize) -> bool {
        if page == 0 || page > self.page_count() {
            return false;
        }
        self.page = page;
        true
    }

    /// Rows of the current page, after filtering.
    pub fn page_rows(&self) -> Vec<&T> {
        self.filtered()
            .into_iter()
            .skip((self.page - 1) * self.page_size)
            .take(self.page_size)
            .collect()
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        self.rows.iter().find(|r| pred(r))
    }

    /// Whether the collection changed since the last check.
    pub fn is_stale(&mut self) -> bool {
        self.subscription.take_stale()
    }
}

/// Case-insensitive substring test; an empty needle matches everything.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim();
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}
