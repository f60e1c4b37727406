use crate::client::GraphTransaction;
use crate::core::{GraphError, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Call context threaded explicitly through every operation.
///
/// Carries at most one ambient transaction and an optional deadline.
/// Deriving a child never mutates the parent, so a context can be cloned
/// freely across nested calls.
#[derive(Clone, Default)]
pub struct Context {
    transaction: Option<Arc<dyn GraphTransaction>>,
    deadline: Option<Instant>,
}

impl Context {
    /// The root context: no transaction, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// The ambient transaction, if one is open.
    pub fn transaction(&self) -> Option<&Arc<dyn GraphTransaction>> {
        self.transaction.as_ref()
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Derives a context carrying `transaction`. Replaces, never stacks.
    pub fn with_transaction(&self, transaction: Arc<dyn GraphTransaction>) -> Self {
        Self {
            transaction: Some(transaction),
            deadline: self.deadline,
        }
    }

    /// Derives a context with a deadline. The earlier of the two deadlines wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            transaction: self.transaction.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Runs one blocking call under this context's deadline.
    pub async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .map_err(|_| GraphError::DeadlineExceeded)?,
            None => call.await,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("transaction", &self.transaction.as_ref().map(|tx| tx.id()))
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_root() {
        let ctx = Context::background();
        assert!(!ctx.has_transaction());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn test_earlier_deadline_wins() {
        let now = Instant::now();
        let parent = Context::background().with_deadline(now + Duration::from_secs(1));
        let child = parent.with_deadline(now + Duration::from_secs(10));
        assert_eq!(child.deadline(), Some(now + Duration::from_secs(1)));

        let tighter = parent.with_deadline(now + Duration::from_millis(10));
        assert_eq!(tighter.deadline(), Some(now + Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn test_bounded_call_times_out() {
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let result: Result<()> = ctx
            .bounded(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(GraphError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_bounded_call_without_deadline() {
        let ctx = Context::background();
        let value = ctx.bounded(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
