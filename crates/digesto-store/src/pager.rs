//! Continuation-cursor pagination for folder listings.

use std::future::Future;

use crate::{ListEntry, StoreError};

/// One page of a paginated listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub entries: Vec<ListEntry>,
    pub cursor: Option<String>,
    pub has_more: bool,
}

/// Drain a paginated listing: start from `first`, then call `next(cursor)`
/// while the last page reports `has_more`, and return every entry in order.
pub async fn collect_pages<F, Fut>(first: ListPage, mut next: F) -> Result<Vec<ListEntry>, StoreError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<ListPage, StoreError>>,
{
    let mut entries = first.entries;
    let mut has_more = first.has_more;
    let mut cursor = first.cursor;

    while has_more {
        let token = cursor.take().ok_or(StoreError::MissingCursor)?;
        let page = next(token).await?;
        entries.extend(page.entries);
        has_more = page.has_more;
        cursor = page.cursor;
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn page(start: usize, len: usize, next_cursor: Option<&str>) -> ListPage {
        ListPage {
            entries: (start..start + len)
                .map(|i| ListEntry::file(format!("{i}.json")))
                .collect(),
            cursor: next_cursor.map(str::to_string),
            has_more: next_cursor.is_some(),
        }
    }

    #[tokio::test]
    async fn follows_cursor_across_three_pages() {
        let requested = RefCell::new(Vec::new());
        let entries = collect_pages(page(0, 10, Some("c1")), |cursor| {
            requested.borrow_mut().push(cursor.clone());
            let next = match cursor.as_str() {
                "c1" => page(10, 10, Some("c2")),
                "c2" => page(20, 10, None),
                other => panic!("unexpected cursor {other}"),
            };
            async move { Ok(next) }
        })
        .await
        .unwrap();

        assert_eq!(entries.len(), 30);
        assert_eq!(entries[0].name, "0.json");
        assert_eq!(entries[29].name, "29.json");
        assert_eq!(*requested.borrow(), vec!["c1".to_string(), "c2".to_string()]);
    }

    #[tokio::test]
    async fn single_page_makes_no_continuation_call() {
        let entries = collect_pages(page(0, 3, None), |_| async {
            Err(StoreError::Other("no continuation expected".into()))
        })
        .await
        .unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[tokio::test]
    async fn has_more_without_cursor_is_an_error() {
        let first = ListPage {
            entries: vec![],
            cursor: None,
            has_more: true,
        };
        let err = collect_pages(first, |_| async { Ok(ListPage::default()) })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingCursor));
    }

    #[tokio::test]
    async fn continuation_error_propagates() {
        let err = collect_pages(page(0, 1, Some("c1")), |_| async {
            Err(StoreError::Server {
                status: 500,
                body: "boom".into(),
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Server { status: 500, .. }));
    }
}
