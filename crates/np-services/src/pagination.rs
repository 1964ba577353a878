//! Slicing of list results via `?skip=&limit=`.

use serde::Deserialize;

/// Requested window over a collection. Both bounds are optional; the
/// default window is the whole collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Page {
    pub fn new(skip: usize, limit: Option<usize>) -> Self {
        Self { skip, limit }
    }

    /// Keeps the records inside the window, preserving order.
    pub fn apply<T>(&self, records: Vec<T>) -> Vec<T> {
        let take = self.limit.unwrap_or(usize::MAX);
        records.into_iter().skip(self.skip).take(take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page_is_everything() {
        assert_eq!(Page::default().apply(vec![1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn skip_and_limit() {
        let items: Vec<u32> = (1..=10).collect();
        assert_eq!(Page::new(2, Some(3)).apply(items.clone()), vec![3, 4, 5]);
        assert_eq!(Page::new(8, Some(5)).apply(items.clone()), vec![9, 10]);
        assert_eq!(Page::new(0, Some(0)).apply(items.clone()), Vec::<u32>::new());
    }

    #[test]
    fn skip_past_the_end_is_empty() {
        assert!(Page::new(50, None).apply(vec!["a", "b"]).is_empty());
    }
}
