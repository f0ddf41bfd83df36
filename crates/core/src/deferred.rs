//! Single-settlement deferred values
//!
//! A [`Deferred`] is an eventual value (or failure) that some producer settles
//! at an arbitrary later point and any number of observers await. Construction
//! hands out two separate capabilities: the [`Settler`], held exclusively by
//! the producer, and the [`Deferred`] itself, which observers clone freely.
//!
//! The first settlement wins. Later calls to [`Settler::resolve`] or
//! [`Settler::reject`] are ignored and report `false`, so every observer sees
//! the same terminal outcome no matter when it asks.
//!
//! ```
//! # tokio_test::block_on(async {
//! use actverify_core::deferred::{deferred, Abandoned};
//!
//! let (settler, value) = deferred::<u32, Abandoned>();
//! assert!(settler.resolve(7));
//! assert!(!settler.resolve(8));
//! assert_eq!(value.wait().await.unwrap(), 7);
//! # });
//! ```

use std::fmt;
use tokio::sync::watch;

/// Failure reported to observers whose producer was dropped before settling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned;

impl fmt::Display for Abandoned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("producer dropped without settling its value")
    }
}

impl std::error::Error for Abandoned {}

type Slot<T, E> = Option<Result<T, E>>;

/// Create a pending deferred value and the capability to settle it
pub fn deferred<T, E>() -> (Settler<T, E>, Deferred<T, E>) {
    let (tx, rx) = watch::channel(None);
    (Settler { tx }, Deferred { rx })
}

/// Producer side of a deferred value
pub struct Settler<T, E> {
    tx: watch::Sender<Slot<T, E>>,
}

impl<T, E> Settler<T, E> {
    /// Settle with a value. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with a failure. Returns `false` if already settled.
    pub fn reject(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    /// Settle with an outcome. Returns `false` if already settled.
    pub fn settle(&self, outcome: Result<T, E>) -> bool {
        let mut outcome = Some(outcome);
        // send_if_modified stores the slot even with no receivers left
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        })
    }

    /// Whether the value has been settled
    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl<T, E> fmt::Debug for Settler<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settler")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Observer side of a deferred value
pub struct Deferred<T, E> {
    rx: watch::Receiver<Slot<T, E>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone,
    E: Clone + From<Abandoned>,
{
    /// Suspend until settled, then return the shared outcome.
    ///
    /// If the [`Settler`] is dropped while still pending, resolves with
    /// `E::from(Abandoned)`.
    pub async fn wait(&self) -> Result<T, E> {
        let mut rx = self.rx.clone();
        // The guard borrows `rx`; clone the outcome out before `rx` drops
        let settled = match rx.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone(),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| Err(Abandoned.into()))
    }

    /// The outcome if already settled, without suspending
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.rx.borrow().clone()
    }
}

impl<T, E> Deferred<T, E> {
    /// Whether the value has been settled
    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Failed(&'static str),
        Abandoned,
    }

    impl From<Abandoned> for TestError {
        fn from(_: Abandoned) -> Self {
            TestError::Abandoned
        }
    }

    #[tokio::test]
    async fn test_first_resolution_wins() {
        let (settler, value) = deferred::<&str, TestError>();

        assert!(settler.resolve("first"));
        assert!(!settler.resolve("second"));
        assert!(!settler.reject(TestError::Failed("late")));

        assert_eq!(value.wait().await, Ok("first"));
        assert_eq!(value.clone().wait().await, Ok("first"));
    }

    #[tokio::test]
    async fn test_first_rejection_wins() {
        let (settler, value) = deferred::<&str, TestError>();

        assert!(settler.reject(TestError::Failed("boom")));
        assert!(!settler.resolve("ignored"));

        assert_eq!(value.wait().await, Err(TestError::Failed("boom")));
        assert_eq!(value.peek(), Some(Err(TestError::Failed("boom"))));
    }

    #[tokio::test]
    async fn test_observers_before_and_after_settlement_agree() {
        let (settler, value) = deferred::<u32, TestError>();

        let early_a = value.clone();
        let early_b = value.clone();
        let waiters = tokio::spawn(async move {
            let (a, b) = tokio::join!(early_a.wait(), early_b.wait());
            (a, b)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiters.is_finished());
        assert!(value.peek().is_none());

        settler.resolve(42);
        settler.resolve(43);

        let (a, b) = waiters.await.unwrap();
        assert_eq!(a, Ok(42));
        assert_eq!(b, Ok(42));
        assert_eq!(value.wait().await, Ok(42));
    }

    #[tokio::test]
    async fn test_observer_suspends_until_settled() {
        let (settler, value) = deferred::<u32, TestError>();

        let pending = tokio::time::timeout(Duration::from_millis(20), value.wait()).await;
        assert!(pending.is_err(), "wait should not complete while pending");

        settler.resolve(1);
        let settled = tokio::time::timeout(Duration::from_millis(200), value.wait()).await;
        assert_eq!(settled.unwrap(), Ok(1));
    }

    #[tokio::test]
    async fn test_outcome_outlives_observer_handle() {
        async fn observe(value: Deferred<String, TestError>) -> Result<String, TestError> {
            value.wait().await
        }

        let (settler, value) = deferred::<String, TestError>();
        settler.resolve("owned".to_string());

        let outcome = observe(value.clone()).await;
        drop(value);
        drop(settler);
        assert_eq!(outcome, Ok("owned".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_settler_abandons_observers() {
        let (settler, value) = deferred::<u32, TestError>();
        drop(settler);

        assert_eq!(value.wait().await, Err(TestError::Abandoned));
    }

    #[tokio::test]
    async fn test_settled_value_survives_settler_drop() {
        let (settler, value) = deferred::<u32, TestError>();
        settler.resolve(5);
        drop(settler);

        assert_eq!(value.wait().await, Ok(5));
    }

    #[tokio::test]
    async fn test_settling_without_observers_is_retained() {
        let (settler, value) = deferred::<u32, TestError>();
        let observer = value.clone();
        drop(value);

        assert!(settler.resolve(9));
        assert!(settler.is_settled());
        assert_eq!(observer.wait().await, Ok(9));
    }
}
