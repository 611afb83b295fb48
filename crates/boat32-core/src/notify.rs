//! Single-slot mailboxes between tasks
//!
//! Every receiving task owns one [`Notifier`] carrying a message type specific
//! to that task. Sending never blocks and overwrites any message the receiver
//! has not consumed yet; only the most recent value is ever delivered.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, with_timeout};

use crate::acquisition::auxiliary::AuxiliaryCommand;
use crate::acquisition::position::GpsVerbosity;
use crate::acquisition::temperature::TemperatureCommand;
use crate::connectivity::NetworkEvent;
use crate::request::HttpRequest;
use crate::status::StatusInbox;

pub struct Notifier<T> {
    slot: Signal<CriticalSectionRawMutex, T>,
}

impl<T: Send> Default for Notifier<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Notifier<T> {
    pub const fn new() -> Self {
        Self {
            slot: Signal::new(),
        }
    }

    /// Replace whatever is pending with `message`.
    pub fn send(&self, message: T) {
        self.slot.signal(message);
    }

    /// Wait up to `timeout` for a message, clearing the slot.
    pub async fn receive(&self, timeout: Duration) -> Option<T> {
        with_timeout(timeout, self.slot.wait()).await.ok()
    }

    /// Wait without a bound. Only used for one-shot gates.
    pub async fn wait(&self) -> T {
        self.slot.wait().await
    }

    pub fn try_receive(&self) -> Option<T> {
        self.slot.try_take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.signaled()
    }
}

/// Every mailbox in the system, one per receiving task.
pub struct Mailboxes {
    pub status: StatusInbox,
    pub temperature: Notifier<TemperatureCommand>,
    pub position: Notifier<GpsVerbosity>,
    pub auxiliary: Notifier<AuxiliaryCommand>,
    pub requests: Notifier<HttpRequest>,
    /// Released once when the link first comes up; gates the overlay bootstrap.
    pub overlay_gate: Notifier<NetworkEvent>,
    /// Released once when the link first comes up; gates the status server.
    pub server_gate: Notifier<NetworkEvent>,
    /// Released once when the link first comes up; gates the request forwarder.
    pub request_gate: Notifier<NetworkEvent>,
}

impl Default for Mailboxes {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailboxes {
    pub const fn new() -> Self {
        Self {
            status: StatusInbox::new(),
            temperature: Notifier::new(),
            position: Notifier::new(),
            auxiliary: Notifier::new(),
            requests: Notifier::new(),
            overlay_gate: Notifier::new(),
            server_gate: Notifier::new(),
            request_gate: Notifier::new(),
        }
    }

    /// Gates released by the connectivity manager on first connection.
    pub fn network_gates(&self) -> [&Notifier<NetworkEvent>; 3] {
        [&self.overlay_gate, &self.server_gate, &self.request_gate]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_receive_returns_only_latest_send() {
        let notifier = Notifier::<u32>::new();
        notifier.send(1);
        notifier.send(2);
        notifier.send(3);

        let received = block_on(notifier.receive(Duration::from_millis(10)));
        assert_eq!(received, Some(3));
        assert_eq!(notifier.try_receive(), None);
    }

    #[test]
    fn test_receive_times_out_when_empty() {
        let notifier = Notifier::<u32>::new();
        let received = block_on(notifier.receive(Duration::from_millis(20)));
        assert_eq!(received, None);
    }

    #[test]
    fn test_receive_clears_slot() {
        let notifier = Notifier::<u32>::new();
        notifier.send(7);
        assert!(notifier.is_pending());
        assert_eq!(block_on(notifier.receive(Duration::from_millis(10))), Some(7));
        assert!(!notifier.is_pending());
    }
}
