//! Page-number pagination for list views.
//!
//! List pages take a `?page=N` query parameter. A missing or malformed value
//! means page 1; a page past the end is an error the handlers turn into 404.
//! Page 1 always exists, even for an empty list.

use serde::Serialize;

/// Requested page number and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    number: u32,
    per_page: u32,
}

/// The requested page lies beyond the last page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("page {requested} is out of range (last page is {last})")]
pub struct PageOutOfRange {
    pub requested: u32,
    pub last: u32,
}

impl PageRequest {
    /// Parse the raw `page` query value. Anything that is not a positive
    /// integer falls back to page 1.
    #[must_use]
    pub fn parse(raw: Option<&str>, per_page: u32) -> Self {
        let number = raw
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|n| *n >= 1)
            .unwrap_or(1);
        Self {
            number,
            per_page: per_page.max(1),
        }
    }

    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }

    /// `LIMIT` for the page query.
    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    /// `OFFSET` for the page query.
    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.number - 1) * i64::from(self.per_page)
    }

    /// Check the request against the total number of rows.
    ///
    /// # Errors
    ///
    /// Returns [`PageOutOfRange`] when the page is past the last page.
    pub fn check(&self, total_items: i64) -> Result<(), PageOutOfRange> {
        let last = num_pages(total_items, self.per_page);
        if self.number > last {
            return Err(PageOutOfRange {
                requested: self.number,
                last,
            });
        }
        Ok(())
    }

    /// Wrap fetched rows into a [`Page`].
    #[must_use]
    pub fn page<T>(&self, items: Vec<T>, total_items: i64) -> Page<T> {
        Page {
            items,
            number: self.number,
            per_page: self.per_page,
            total_items: total_items.max(0),
            num_pages: num_pages(total_items, self.per_page),
        }
    }
}

fn num_pages(total_items: i64, per_page: u32) -> u32 {
    let per_page = i64::from(per_page.max(1));
    let pages = (total_items.max(0) + per_page - 1) / per_page;
    u32::try_from(pages).unwrap_or(u32::MAX).max(1)
}

/// One page of results plus the numbers templates need for navigation.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub per_page: u32,
    pub total_items: i64,
    pub num_pages: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.number > 1
    }

    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    #[must_use]
    pub const fn previous_number(&self) -> u32 {
        self.number.saturating_sub(1)
    }

    #[must_use]
    pub const fn next_number(&self) -> u32 {
        self.number + 1
    }

    #[must_use]
    pub const fn is_paginated(&self) -> bool {
        self.num_pages > 1
    }

    /// Convert the items, keeping the page numbers.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            per_page: self.per_page,
            total_items: self.total_items,
            num_pages: self.num_pages,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_to_first_page() {
        assert_eq!(PageRequest::parse(None, 12).number(), 1);
        assert_eq!(PageRequest::parse(Some("abc"), 12).number(), 1);
        assert_eq!(PageRequest::parse(Some("0"), 12).number(), 1);
        assert_eq!(PageRequest::parse(Some("-3"), 12).number(), 1);
        assert_eq!(PageRequest::parse(Some(" 4 "), 12).number(), 4);
    }

    #[test]
    fn test_offset_and_limit() {
        let req = PageRequest::parse(Some("3"), 12);
        assert_eq!(req.limit(), 12);
        assert_eq!(req.offset(), 24);
    }

    #[test]
    fn test_empty_list_has_one_page() {
        let req = PageRequest::parse(None, 10);
        assert!(req.check(0).is_ok());
        let page = req.page(Vec::<i32>::new(), 0);
        assert_eq!(page.num_pages, 1);
        assert!(!page.has_next());
        assert!(!page.has_previous());
    }

    #[test]
    fn test_out_of_range_page() {
        let req = PageRequest::parse(Some("3"), 10);
        assert!(req.check(20).is_err());
        assert!(req.check(21).is_ok());
        assert_eq!(
            req.check(5).unwrap_err(),
            PageOutOfRange {
                requested: 3,
                last: 1
            }
        );
    }

    #[test]
    fn test_navigation_numbers() {
        let req = PageRequest::parse(Some("2"), 10);
        let page = req.page(vec![1, 2, 3], 25);
        assert_eq!(page.num_pages, 3);
        assert!(page.has_previous());
        assert!(page.has_next());
        assert_eq!(page.previous_number(), 1);
        assert_eq!(page.next_number(), 3);
        assert!(page.is_paginated());
    }

    #[test]
    fn test_map_keeps_numbers() {
        let page = PageRequest::parse(Some("2"), 2).page(vec![3, 4], 5);
        let mapped = page.map(|n| n * 10);
        assert_eq!(mapped.items, vec![30, 40]);
        assert_eq!(mapped.number, 2);
        assert_eq!(mapped.num_pages, 3);
    }
}
