use tokio::sync::watch;

/// Transmitter side of the pause gate.
///
/// While the gate is closed the buffer worker does not deliver items. Enqueueing is never
/// affected by the gate.
#[derive(Debug, Clone)]
pub struct PauseTx(watch::Sender<bool>);

impl PauseTx {
    /// Wraps a watch sender into a [`PauseTx`].
    pub fn new(tx: watch::Sender<bool>) -> Self {
        Self(tx)
    }

    /// Closes the gate.
    ///
    /// Returns the previous state, `true` meaning the gate was already closed.
    pub fn pause(&self) -> bool {
        // Infallible so the gate can be closed before the worker subscribes.
        self.0.send_replace(true)
    }

    /// Opens the gate.
    ///
    /// Returns the previous state, `true` meaning the gate was closed.
    pub fn resume(&self) -> bool {
        self.0.send_replace(false)
    }

    /// Returns whether the gate is currently closed.
    pub fn is_paused(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new pause receiver subscription.
    pub fn subscribe(&self) -> PauseRx {
        self.0.subscribe()
    }
}

/// Receiver side of the pause gate.
pub type PauseRx = watch::Receiver<bool>;

/// Creates a new pause gate, initially open.
pub fn create_pause_channel() -> (PauseTx, PauseRx) {
    let (tx, rx) = watch::channel(false);
    (PauseTx::new(tx), rx)
}

/// Waits until the gate is open.
///
/// Returns `false` when the sender was dropped while the gate was closed.
pub async fn wait_until_resumed(rx: &mut PauseRx) -> bool {
    rx.wait_for(|paused| !*paused).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (tx, mut rx) = create_pause_channel();
        assert!(!tx.is_paused());

        assert!(!tx.pause());
        assert!(tx.pause());
        assert!(tx.is_paused());

        let waiter = tokio::spawn(async move { wait_until_resumed(&mut rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        assert!(tx.resume());
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_open_gate_does_not_wait() {
        let (tx, _rx) = create_pause_channel();
        let mut rx = tx.subscribe();
        assert!(wait_until_resumed(&mut rx).await);
    }
}
