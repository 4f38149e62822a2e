//! Host platform signals.
//!
//! The client has no compiled-in dependency on any host's globals. Embedders
//! that can observe page visibility or network reachability feed those
//! signals through the channel returned by [`platform_channel`]; the driver
//! pauses heartbeats while hidden and retries immediately when connectivity
//! returns. Embedders without such signals simply never send any.

use tokio::sync::mpsc;

/// A host-environment signal relevant to connection upkeep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformSignal {
    /// The hosting surface became visible (`true`) or hidden (`false`).
    Visibility(bool),
    /// Network reachability came back (`true`) or was lost (`false`).
    Connectivity(bool),
}

/// Sender half handed to the embedder.
#[derive(Clone, Debug)]
pub struct PlatformHandle {
    tx: mpsc::UnboundedSender<PlatformSignal>,
}

impl PlatformHandle {
    /// Report a visibility change.
    pub fn notify_visibility(&self, visible: bool) {
        let _ = self.tx.send(PlatformSignal::Visibility(visible));
    }

    /// Report a connectivity change.
    pub fn notify_connectivity(&self, online: bool) {
        let _ = self.tx.send(PlatformSignal::Connectivity(online));
    }
}

/// Receiver half consumed by the client driver.
pub type PlatformReceiver = mpsc::UnboundedReceiver<PlatformSignal>;

/// Create the handle/receiver pair wiring an embedder to a client.
#[must_use]
pub fn platform_channel() -> (PlatformHandle, PlatformReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PlatformHandle { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signals_arrive_in_order() {
        let (handle, mut rx) = platform_channel();
        handle.notify_visibility(false);
        handle.notify_connectivity(true);

        assert_eq!(rx.recv().await, Some(PlatformSignal::Visibility(false)));
        assert_eq!(rx.recv().await, Some(PlatformSignal::Connectivity(true)));
    }

    #[tokio::test]
    async fn notify_after_receiver_drop_is_harmless() {
        let (handle, rx) = platform_channel();
        drop(rx);
        handle.notify_visibility(true);
        handle.notify_connectivity(false);
    }
}
