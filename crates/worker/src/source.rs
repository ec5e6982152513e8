use async_trait::async_trait;

use accord_core::Item;

/// Items per page requested from a source.
pub const PAGE_SIZE: u64 = 200;

/// A tag-filtered feed of items.
///
/// Both calls degrade instead of failing: an unreachable or misbehaving
/// source looks exactly like a source with nothing new.
#[async_trait]
pub trait Source: Send + Sync {
    /// Number of items matching `tags`, 0 on failure.
    async fn count(&self, tags: &[String]) -> u64;

    /// Page `page` (1 based) of at most [`PAGE_SIZE`] items, empty on failure.
    async fn fetch_page(&self, tags: &[String], page: u64) -> Vec<Item>;
}

/// Pages needed to cover `count` items.
pub fn page_count(count: u64) -> u64 {
    count.div_ceil(PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0), 0);
        assert_eq!(page_count(1), 1);
        assert_eq!(page_count(200), 1);
        assert_eq!(page_count(201), 2);
        assert_eq!(page_count(450), 3);
    }
}
