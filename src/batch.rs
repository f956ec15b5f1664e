use std::future::Future;

use tracing::warn;

use crate::error::ServiceError;

pub const MAX_BATCH: usize = 10;

pub fn validate_count(count: usize) -> Result<(), ServiceError> {
    if (1..=MAX_BATCH).contains(&count) {
        Ok(())
    } else {
        Err(ServiceError::BadRequest(format!(
            "count must be between 1 and {MAX_BATCH}, got {count}"
        )))
    }
}

/// Runs `item` `count` times in sequence. Failed iterations are logged and
/// dropped; only a batch with no successes is an error.
pub async fn collect<T, F, Fut>(count: usize, mut item: F) -> Result<Vec<T>, ServiceError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    validate_count(count)?;

    let mut items = Vec::with_capacity(count);
    for index in 0..count {
        match item(index).await {
            Ok(value) => items.push(value),
            Err(err) => warn!(index, error = %err, "dropping failed batch item"),
        }
    }

    if items.is_empty() {
        return Err(ServiceError::NoResults);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_items_are_dropped() {
        let items = collect(5, |index| async move {
            if index % 2 == 0 {
                Ok(index)
            } else {
                Err(ServiceError::Generation("out of memory".into()))
            }
        })
        .await
        .unwrap();
        assert_eq!(items, vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn all_failed_is_no_results() {
        let err = collect(3, |_| async { Err::<(), _>(ServiceError::Generation("boom".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoResults));
    }

    #[tokio::test]
    async fn runs_each_item_once_in_order() {
        let mut seen = Vec::new();
        let items = collect(MAX_BATCH, |index| {
            seen.push(index);
            async move { Ok::<_, ServiceError>(index * 10) }
        })
        .await
        .unwrap();
        assert_eq!(items.len(), MAX_BATCH);
        assert_eq!(seen, (0..MAX_BATCH).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn count_outside_range_is_rejected() {
        for count in [0, MAX_BATCH + 1] {
            let err = collect(count, |_| async { Ok::<_, ServiceError>(()) })
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::BadRequest(_)));
        }
    }
}
