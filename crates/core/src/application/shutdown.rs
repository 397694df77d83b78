// Shutdown Token

use tokio::sync::watch;

/// Shutdown signal observed by pool supervisors and background loops
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal.
    ///
    /// Returns immediately if shutdown was already requested, including
    /// before this token was cloned. Also returns if the sender is gone.
    pub async fn wait(&mut self) {
        if *self.rx.borrow_and_update() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow_and_update() {
                return;
            }
        }
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// New token for a task started after the channel was created
    pub fn subscribe(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_late_subscriber_sees_earlier_shutdown() {
        let (tx, token) = shutdown_channel();
        assert!(!token.is_shutdown());

        tx.shutdown();
        let mut late = tx.subscribe();
        assert!(late.is_shutdown());

        tokio::time::timeout(Duration::from_millis(100), late.wait())
            .await
            .expect("wait should return at once");
    }

    #[tokio::test]
    async fn test_wait_wakes_on_shutdown() {
        let (tx, mut token) = shutdown_channel();
        let waiter = tokio::spawn(async move {
            token.wait().await;
            token.is_shutdown()
        });

        tokio::task::yield_now().await;
        tx.shutdown();
        assert!(waiter.await.unwrap());
    }
}
