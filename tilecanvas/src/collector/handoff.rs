//! Zero-buffer handoff between the kernel and the workers.
//!
//! tokio has no rendezvous channel, so idle workers advertise themselves by
//! queueing a one-shot slot and the kernel fills the first live one. A send
//! therefore only completes once a worker is actually waiting for the value,
//! which is what makes the kernel feel backpressure when every worker is busy.

use tokio::sync::{mpsc, oneshot};

/// Create a handoff serving at most `receivers` concurrent waiters.
pub(crate) fn rendezvous<T>(receivers: usize) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (ready_tx, ready_rx) = mpsc::channel(receivers.max(1));
    (HandoffSender { ready_rx }, HandoffReceiver { ready_tx })
}

/// Sending half, owned by the kernel.
pub(crate) struct HandoffSender<T> {
    ready_rx: mpsc::Receiver<oneshot::Sender<T>>,
}

impl<T> HandoffSender<T> {
    /// Hand `value` to a waiting receiver, suspending until one is ready.
    ///
    /// Returns the value back if every receiver is gone.
    pub(crate) async fn send(&mut self, mut value: T) -> Result<(), T> {
        loop {
            let Some(slot) = self.ready_rx.recv().await else {
                return Err(value);
            };
            match slot.send(value) {
                Ok(()) => return Ok(()),
                // The waiter gave up (cancelled); try the next one
                Err(returned) => value = returned,
            }
        }
    }
}

/// Receiving half, cloned into every worker.
pub(crate) struct HandoffReceiver<T> {
    ready_tx: mpsc::Sender<oneshot::Sender<T>>,
}

impl<T> Clone for HandoffReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            ready_tx: self.ready_tx.clone(),
        }
    }
}

impl<T> HandoffReceiver<T> {
    /// Wait for the next value. Returns `None` once the sender is gone.
    pub(crate) async fn recv(&self) -> Option<T> {
        let (slot_tx, slot_rx) = oneshot::channel();
        self.ready_tx.send(slot_tx).await.ok()?;
        slot_rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_reaches_waiting_receiver() {
        let (mut tx, rx) = rendezvous::<u32>(1);
        let waiter = tokio::spawn(async move { rx.recv().await });

        tx.send(7).await.unwrap();
        assert_eq!(waiter.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_send_blocks_without_receiver() {
        let (mut tx, rx) = rendezvous::<u32>(1);
        let result = tokio::time::timeout(Duration::from_millis(50), tx.send(1)).await;
        assert!(result.is_err(), "send must suspend until a receiver waits");
        drop(rx);
    }

    #[tokio::test]
    async fn test_send_fails_when_receivers_dropped() {
        let (mut tx, rx) = rendezvous::<u32>(1);
        drop(rx);
        assert_eq!(tx.send(3).await, Err(3));
    }

    #[tokio::test]
    async fn test_cancelled_waiter_is_skipped() {
        let (mut tx, rx) = rendezvous::<u32>(2);

        // A waiter registers and then gives up
        let abandoned = rx.clone();
        let _ = tokio::time::timeout(Duration::from_millis(10), abandoned.recv()).await;

        let waiter = tokio::spawn(async move { rx.recv().await });
        tx.send(9).await.unwrap();
        assert_eq!(waiter.await.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn test_recv_returns_none_after_sender_dropped() {
        let (tx, rx) = rendezvous::<u32>(1);
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
