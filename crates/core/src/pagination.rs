use serde::Serialize;
use thiserror::Error;

/// Errors raised while shaping a page.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PaginationError {
    #[error("page size must be greater than zero")]
    ZeroPageSize,
}

/// Derived, read-only view over a bounded slice of a larger result set.
///
/// Never persisted; recomputed for every query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: usize,
    pub total_pages: usize,
    pub page_number: usize,
    pub page_size: usize,
    pub first: bool,
    pub last: bool,
}

/// Shapes an already materialized, already filtered/sorted sequence into a
/// page descriptor.
///
/// A page index beyond the end clamps to the last existing page (or page 0
/// when there are no pages at all) instead of failing or reporting an
/// out-of-range index. A `page_size` of zero is rejected.
pub fn paginate<T>(
    items: Vec<T>,
    page_number: usize,
    page_size: usize,
) -> Result<Page<T>, PaginationError> {
    if page_size == 0 {
        return Err(PaginationError::ZeroPageSize);
    }

    let total_elements = items.len();
    let total_pages = total_elements.div_ceil(page_size);
    let effective = page_number.min(total_pages.saturating_sub(1));
    let content: Vec<T> = items
        .into_iter()
        .skip(effective * page_size)
        .take(page_size)
        .collect();

    Ok(Page {
        content,
        total_elements,
        total_pages,
        page_number: effective,
        page_size,
        first: effective == 0,
        last: effective + 1 >= total_pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_never_exceeds_page_size() {
        for size in 1..=7 {
            let page = paginate((0..23).collect::<Vec<_>>(), 2, size).expect("page");
            assert!(page.content.len() <= size);
            assert_eq!(page.page_size, size);
        }
    }

    #[test]
    fn computes_totals_and_flags() {
        let page = paginate((0..10).collect::<Vec<_>>(), 0, 4).expect("page");
        assert_eq!(page.total_elements, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.content, vec![0, 1, 2, 3]);
        assert!(page.first);
        assert!(!page.last);

        let page = paginate((0..10).collect::<Vec<_>>(), 2, 4).expect("page");
        assert_eq!(page.content, vec![8, 9]);
        assert!(!page.first);
        assert!(page.last);
    }

    #[test]
    fn out_of_range_index_clamps_to_last_page() {
        let last = paginate((0..10).collect::<Vec<_>>(), 2, 4).expect("page");
        let clamped = paginate((0..10).collect::<Vec<_>>(), 9999, 4).expect("page");
        assert_eq!(clamped, last);
        assert_eq!(clamped.page_number, 2);
        assert!(clamped.last);
    }

    #[test]
    fn empty_input_yields_empty_first_and_last_page() {
        let page = paginate(Vec::<u8>::new(), 3, 5).expect("page");
        assert_eq!(page.total_elements, 0);
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.page_number, 0);
        assert!(page.content.is_empty());
        assert!(page.first);
        assert!(page.last);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = paginate(vec![1, 2, 3], 0, 0).expect_err("zero size");
        assert_eq!(err, PaginationError::ZeroPageSize);
    }

    #[test]
    fn exact_multiple_has_no_trailing_page() {
        let page = paginate((0..8).collect::<Vec<_>>(), 1, 4).expect("page");
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.content, vec![4, 5, 6, 7]);
        assert!(page.last);
    }
}
