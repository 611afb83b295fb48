//! Wi-Fi link management
//!
//! The manager walks the credential table in order until one associates, and
//! re-checks the link once per cool-down period afterwards. The first time
//! the link comes up it releases every network gate exactly once, so the
//! overlay bootstrap, the status server and the request forwarder start
//! only after connectivity exists.

pub mod overlay;

use embassy_time::Timer;
use log::{info, warn};
use thiserror_no_std::Error;

use crate::app_state::{LinkState, LinkWriter};
use crate::config::{ConnectivityConfig, Credential, CredentialTable};
use crate::notify::Notifier;
use crate::registry::Heartbeat;
use crate::status::{BlinkRate, StatusInbox, StatusSignal};

/// Released on the network gates when the link first comes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Connected,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    #[error("radio driver error")]
    Driver,
    #[error("association rejected")]
    Rejected,
}

/// Station-mode radio.
pub trait WifiLink {
    /// Start associating with `credential`. Returns once the request is
    /// issued; completion is observed through [`WifiLink::is_connected`].
    fn begin(&mut self, credential: &Credential) -> impl Future<Output = Result<(), LinkError>>;

    fn is_connected(&mut self) -> impl Future<Output = bool>;
}

impl<T: WifiLink> WifiLink for &mut T {
    async fn begin(&mut self, credential: &Credential) -> Result<(), LinkError> {
        (**self).begin(credential).await
    }

    async fn is_connected(&mut self) -> bool {
        (**self).is_connected().await
    }
}

pub struct ConnectivityManager<'a, L> {
    link: L,
    credentials: &'a CredentialTable,
    config: ConnectivityConfig,
    status: &'a StatusInbox,
    dependents: &'a [&'a Notifier<NetworkEvent>],
    writer: LinkWriter<'a>,
    state: LinkState,
    announced: bool,
}

impl<'a, L: WifiLink> ConnectivityManager<'a, L> {
    pub fn new(
        link: L,
        credentials: &'a CredentialTable,
        config: ConnectivityConfig,
        status: &'a StatusInbox,
        dependents: &'a [&'a Notifier<NetworkEvent>],
        writer: LinkWriter<'a>,
    ) -> Self {
        Self {
            link,
            credentials,
            config,
            status,
            dependents,
            writer,
            state: LinkState::Disconnected,
            announced: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    fn set_state(&mut self, state: LinkState) {
        self.state = state;
        self.writer.publish(state);
    }

    /// Associate with one credential, polling at most `max_polls` times.
    pub async fn try_credential(&mut self, index: usize, credential: &Credential) -> bool {
        self.set_state(LinkState::Connecting(index));
        info!(target: "wifi", "Connecting to {}", credential.ssid);

        if let Err(e) = self.link.begin(credential).await {
            warn!(target: "wifi", "Could not start association with {}: {}", credential.ssid, e);
            return false;
        }

        for _ in 0..self.config.max_polls {
            Timer::after(self.config.poll_interval()).await;
            if self.link.is_connected().await {
                return true;
            }
        }

        warn!(target: "wifi", "Failed to connect to {}", credential.ssid);
        false
    }

    /// One pass over the whole table. Returns `true` once associated.
    pub async fn connect_cycle(&mut self) -> bool {
        self.set_state(LinkState::Disconnected);
        self.status.send(StatusSignal::Cadence(BlinkRate::Fast));

        let credentials = self.credentials;
        for (index, credential) in credentials.iter().enumerate() {
            if self.try_credential(index, credential).await {
                self.on_connected(index, credential);
                return true;
            }
        }

        self.set_state(LinkState::Disconnected);
        warn!(target: "wifi", "No network available, retrying");
        false
    }

    fn on_connected(&mut self, index: usize, credential: &Credential) {
        self.set_state(LinkState::Connected(index));
        info!(target: "wifi", "Connected to {}", credential.ssid);
        self.status.send(StatusSignal::Cadence(BlinkRate::Slow));

        if !self.announced {
            self.announced = true;
            for gate in self.dependents {
                gate.send(NetworkEvent::Connected);
            }
        }
    }

    /// Check the link and reconnect if it is down.
    pub async fn step(&mut self) {
        if self.state.is_connected() {
            if self.link.is_connected().await {
                return;
            }
            warn!(target: "wifi", "Link lost");
        }
        self.connect_cycle().await;
    }

    pub async fn run(mut self, heartbeat: Heartbeat<'_>) -> ! {
        loop {
            self.step().await;
            heartbeat.beat();
            Timer::after(self.config.cooldown()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::TelemetryStore;
    use embassy_futures::block_on;

    /// Associates only with `accept`, after `polls_needed` status checks.
    struct ScriptedLink {
        accept: Option<&'static str>,
        polls_needed: usize,
        current: Option<heapless::String<32>>,
        polls: usize,
        attempts: std::vec::Vec<std::string::String>,
        polls_per_attempt: std::vec::Vec<usize>,
    }

    impl ScriptedLink {
        fn new(accept: Option<&'static str>, polls_needed: usize) -> Self {
            Self {
                accept,
                polls_needed,
                current: None,
                polls: 0,
                attempts: std::vec::Vec::new(),
                polls_per_attempt: std::vec::Vec::new(),
            }
        }
    }

    impl WifiLink for ScriptedLink {
        async fn begin(&mut self, credential: &Credential) -> Result<(), LinkError> {
            if !self.attempts.is_empty() {
                self.polls_per_attempt.push(self.polls);
            }
            self.attempts.push(credential.ssid.as_str().into());
            self.current = Some(credential.ssid.clone());
            self.polls = 0;
            Ok(())
        }

        async fn is_connected(&mut self) -> bool {
            self.polls += 1;
            self.current.as_deref() == self.accept && self.polls >= self.polls_needed
        }
    }

    fn fast_config() -> ConnectivityConfig {
        ConnectivityConfig {
            poll_interval_ms: 1,
            max_polls: 6,
            cooldown_ms: 1,
        }
    }

    #[test]
    fn test_credentials_tried_in_order_with_bounded_polls() {
        let store = TelemetryStore::new();
        let writers = store.writers().unwrap();
        let credentials = CredentialTable::parse("harbour:a;marina:b;hotspot:c").unwrap();
        let status = StatusInbox::new();
        let gate = Notifier::new();
        let gates = [&gate];
        let mut link = ScriptedLink::new(Some("hotspot"), 2);

        {
            let mut manager = ConnectivityManager::new(
                &mut link,
                &credentials,
                fast_config(),
                &status,
                &gates,
                writers.link,
            );
            assert!(block_on(manager.connect_cycle()));
            assert_eq!(manager.state(), LinkState::Connected(2));
        }

        assert_eq!(link.attempts, ["harbour", "marina", "hotspot"]);
        assert_eq!(link.polls_per_attempt, [6, 6]);
        assert_eq!(store.reader().link(), LinkState::Connected(2));
        assert_eq!(
            status.try_receive(),
            Some(StatusSignal::Cadence(BlinkRate::Slow))
        );
        assert_eq!(gate.try_receive(), Some(NetworkEvent::Connected));
    }

    #[test]
    fn test_exhausted_table_is_retried() {
        let store = TelemetryStore::new();
        let writers = store.writers().unwrap();
        let credentials = CredentialTable::parse("harbour:a").unwrap();
        let status = StatusInbox::new();
        let gates = [];
        let mut link = ScriptedLink::new(None, 1);

        {
            let mut manager = ConnectivityManager::new(
                &mut link,
                &credentials,
                fast_config(),
                &status,
                &gates,
                writers.link,
            );
            assert!(!block_on(manager.connect_cycle()));
            block_on(manager.step());
            assert_eq!(manager.state(), LinkState::Disconnected);
        }

        assert_eq!(link.attempts, ["harbour", "harbour"]);
        assert_eq!(
            status.try_receive(),
            Some(StatusSignal::Cadence(BlinkRate::Fast))
        );
    }

    #[test]
    fn test_dependents_released_once() {
        let store = TelemetryStore::new();
        let writers = store.writers().unwrap();
        let credentials = CredentialTable::parse("harbour:a").unwrap();
        let status = StatusInbox::new();
        let gate = Notifier::new();
        let gates = [&gate];
        let mut link = ScriptedLink::new(Some("harbour"), 1);

        let mut manager = ConnectivityManager::new(
            &mut link,
            &credentials,
            fast_config(),
            &status,
            &gates,
            writers.link,
        );
        assert!(block_on(manager.connect_cycle()));
        assert_eq!(gate.try_receive(), Some(NetworkEvent::Connected));

        // A reconnect does not release the gate again.
        assert!(block_on(manager.connect_cycle()));
        assert_eq!(gate.try_receive(), None);
    }
}
