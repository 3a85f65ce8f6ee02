// Cancellation and deadlines for the session's suspension points

use crate::error::{MoodDetectorError, Result};
use crate::session::Stage;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

/// Token for cancelling an in-flight detection
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Create a new cancellation token
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            cancelled: Arc::new(sender),
        }
    }

    /// Cancel every operation observing this token
    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut receiver = self.cancelled.subscribe();
        // The sender lives in `self`, so `wait_for` can only fail if it is dropped
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `operation` for `stage`, failing with `Timeout` after `limit` or
/// `Cancelled` when `token` fires first.
pub async fn bounded<T, F>(
    stage: Stage,
    limit: Duration,
    token: &CancellationToken,
    operation: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(MoodDetectorError::Cancelled { stage });
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => {
            warn!("{} cancelled", stage);
            Err(MoodDetectorError::Cancelled { stage })
        }
        outcome = tokio::time::timeout(limit, operation) => match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!("{} exceeded {:?}", stage, limit);
                Err(MoodDetectorError::Timeout { stage })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_completed_operation() {
        let token = CancellationToken::new();
        let value = bounded(Stage::Inference, Duration::from_secs(1), &token, async {
            Ok(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_operation_times_out() {
        let token = CancellationToken::new();
        let result: Result<()> = bounded(
            Stage::MoodReport,
            Duration::from_secs(5),
            &token,
            std::future::pending(),
        )
        .await;
        assert!(matches!(
            result,
            Err(MoodDetectorError::Timeout {
                stage: Stage::MoodReport
            })
        ));
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_operation() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            canceller.cancel();
        });

        let result: Result<()> = bounded(
            Stage::CameraAccess,
            Duration::from_secs(60),
            &token,
            std::future::pending(),
        )
        .await;
        assert!(matches!(
            result,
            Err(MoodDetectorError::Cancelled {
                stage: Stage::CameraAccess
            })
        ));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_operation() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<()> = bounded(Stage::ModelLoad, Duration::from_secs(1), &token, async {
            Err(MoodDetectorError::Inference("operation must not run".to_string()))
        })
        .await;
        assert!(matches!(result, Err(MoodDetectorError::Cancelled { .. })));
    }
}
