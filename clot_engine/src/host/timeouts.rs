//! Timeout helpers for match-host calls.
//!
//! Every host call is bounded; an expired call becomes `HostError::Timeout`
//! and only affects the item being processed.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use super::errors::{HostError, HostResult};

/// Default bound for a host call (10 seconds)
pub const DEFAULT_HOST_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute a host call with timeout
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Host call to execute
///
/// # Returns
///
/// * `HostResult<T>` - Result of the call or `HostError::Timeout`
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> HostResult<T>
where
    F: Future<Output = HostResult<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(HostError::Timeout(duration)),
    }
}

/// Execute a host call with the default timeout
pub async fn with_default_timeout<F, T>(future: F) -> HostResult<T>
where
    F: Future<Output = HostResult<T>>,
{
    with_timeout(DEFAULT_HOST_TIMEOUT, future).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, HostError>(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, HostError>(42)
        })
        .await;
        assert_eq!(result, Err(HostError::Timeout(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_errors_through() {
        let result: HostResult<()> =
            with_default_timeout(async { Err(HostError::rejected("ServerBusy")) }).await;
        assert_eq!(result, Err(HostError::rejected("ServerBusy")));
    }
}
