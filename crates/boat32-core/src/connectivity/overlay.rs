//! Overlay VPN bootstrap
//!
//! A one-time initialization step: wait for the first connection, then set
//! up, join and start the overlay, retrying the join until it succeeds.
//! Once started the overlay runs inside the network stack; nothing here
//! supervises it afterwards.

use embassy_time::Timer;
use log::{info, warn};
use thiserror_no_std::Error;

use super::NetworkEvent;
use crate::config::OverlayConfig;
use crate::notify::Notifier;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayError {
    #[error("overlay support not available")]
    Unavailable,
    #[error("join rejected")]
    JoinRejected,
    #[error("overlay failed to start")]
    Start,
}

pub trait OverlayNetwork {
    /// Point the overlay at its management dashboard.
    fn setup(&mut self, dashboard: &str) -> impl Future<Output = Result<(), OverlayError>>;

    fn join(
        &mut self,
        join_code: &str,
        hostname: &str,
    ) -> impl Future<Output = Result<(), OverlayError>>;

    fn start(&mut self) -> impl Future<Output = Result<(), OverlayError>>;
}

/// Stands in for builds without overlay support; every attempt fails.
pub struct DisabledOverlay;

impl OverlayNetwork for DisabledOverlay {
    async fn setup(&mut self, _dashboard: &str) -> Result<(), OverlayError> {
        Err(OverlayError::Unavailable)
    }

    async fn join(&mut self, _join_code: &str, _hostname: &str) -> Result<(), OverlayError> {
        Err(OverlayError::Unavailable)
    }

    async fn start(&mut self) -> Result<(), OverlayError> {
        Err(OverlayError::Unavailable)
    }
}

async fn join_once<O: OverlayNetwork>(
    overlay: &mut O,
    config: &OverlayConfig,
) -> Result<(), OverlayError> {
    overlay.setup(&config.dashboard).await?;
    overlay.join(&config.join_code, &config.hostname).await?;
    overlay.start().await
}

/// Wait for the link, then bring the overlay up. Returns once it is
/// running, or immediately after the first attempt if the build has no
/// overlay support.
pub async fn bootstrap<O: OverlayNetwork>(
    gate: &Notifier<NetworkEvent>,
    overlay: &mut O,
    config: &OverlayConfig,
) -> Result<(), OverlayError> {
    gate.wait().await;
    info!(target: "vpn", "Joining overlay network as {}", config.hostname);

    loop {
        match join_once(overlay, config).await {
            Ok(()) => {
                info!(target: "vpn", "Overlay network started");
                return Ok(());
            }
            Err(OverlayError::Unavailable) => {
                warn!(target: "vpn", "Overlay network disabled in this build");
                return Err(OverlayError::Unavailable);
            }
            Err(e) => {
                warn!(target: "vpn", "Overlay join failed: {}, retrying", e);
                Timer::after(config.retry()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    struct Flaky {
        failures_left: usize,
        joins: usize,
        started: bool,
    }

    impl OverlayNetwork for Flaky {
        async fn setup(&mut self, dashboard: &str) -> Result<(), OverlayError> {
            assert_eq!(dashboard, "https://dashboard.example");
            Ok(())
        }

        async fn join(&mut self, _join_code: &str, hostname: &str) -> Result<(), OverlayError> {
            assert_eq!(hostname, "boat32");
            self.joins += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(OverlayError::JoinRejected);
            }
            Ok(())
        }

        async fn start(&mut self) -> Result<(), OverlayError> {
            self.started = true;
            Ok(())
        }
    }

    fn config() -> OverlayConfig {
        let mut config =
            OverlayConfig::new("boat32", "fc94:b01d:1803::/join", "https://dashboard.example")
                .unwrap();
        config.retry_ms = 1;
        config
    }

    #[test]
    fn test_join_retried_until_started() {
        let gate = Notifier::new();
        gate.send(NetworkEvent::Connected);
        let mut overlay = Flaky {
            failures_left: 2,
            joins: 0,
            started: false,
        };

        assert_eq!(block_on(bootstrap(&gate, &mut overlay, &config())), Ok(()));
        assert_eq!(overlay.joins, 3);
        assert!(overlay.started);
    }

    #[test]
    fn test_disabled_overlay_gives_up() {
        let gate = Notifier::new();
        gate.send(NetworkEvent::Connected);
        assert_eq!(
            block_on(bootstrap(&gate, &mut DisabledOverlay, &config())),
            Err(OverlayError::Unavailable)
        );
    }
}
