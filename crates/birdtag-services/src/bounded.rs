use birdtag_core::AppError;
use std::future::Future;
use std::time::Duration;

/// Run a store or network call under a timeout.
///
/// Exceeding the limit yields `AppError::Timeout` naming the operation.
pub async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout {
            operation: operation.to_string(),
            after_ms: limit.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_call_times_out() {
        let result: Result<(), AppError> = bounded("catalog.get", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(AppError::Timeout { ref operation, after_ms: 10 }) if operation == "catalog.get"
        ));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let value = bounded("x", Duration::from_secs(1), async { Ok::<_, AppError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
