use crate::error::CollectError;
use tokio::sync::watch;

/// Sender half of the run-wide cancel signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Receiver half, cloned into every collector and command.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelToken {
    /// A token that never fires.
    pub fn never() -> Self {
        let (_, token) = cancel_pair();
        token
    }

    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn check(&self) -> Result<(), CollectError> {
        if self.is_canceled() {
            Err(CollectError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancel is signaled. Pends forever if the handle is gone.
    pub async fn canceled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (handle, token) = cancel_pair();
        assert!(token.check().is_ok());

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.canceled().await })
        };
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter task");
        assert_eq!(token.check(), Err(CollectError::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn never_token_does_not_fire() {
        let token = CancelToken::never();
        let fired = tokio::time::timeout(Duration::from_secs(5), token.canceled()).await;
        assert!(fired.is_err());
        assert!(!token.is_canceled());
    }
}
