//! mDNS responder answering for [`LOCAL_HOSTNAME`] on the station network

use core::net::{Ipv4Addr, Ipv6Addr};

use edge_mdns::buf::VecBufAccess;
use edge_mdns::domain::base::Ttl;
use edge_mdns::host::Host;
use edge_mdns::io::{self, DEFAULT_SOCKET};
use edge_mdns::HostAnswersMdnsHandler;
use edge_nal::UdpSplit;
use edge_nal_embassy::{Udp, UdpBuffers};
use embassy_net::Stack;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use esp_hal::rng::Rng;
use log::{info, warn};

use boat32_core::config::LOCAL_HOSTNAME;

const MDNS_BUFFER: usize = 1500;
const HOST_TTL: Ttl = Ttl::from_secs(60);
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Answer hostname queries for as long as the link stays up. A failed bind
/// or socket error is retried after [`RETRY_DELAY`].
pub async fn advertise(stack: Stack<'static>) -> ! {
    let buffers = UdpBuffers::<1, MDNS_BUFFER, MDNS_BUFFER, 2>::new();
    let udp = Udp::new(stack, &buffers);
    let recv_buf = VecBufAccess::<NoopRawMutex, MDNS_BUFFER>::new();
    let send_buf = VecBufAccess::<NoopRawMutex, MDNS_BUFFER>::new();
    let rng = Rng::new();

    loop {
        stack.wait_config_up().await;
        let Some(address) = stack.config_v4().map(|config| config.address.address()) else {
            continue;
        };

        let host = Host {
            hostname: LOCAL_HOSTNAME,
            ipv4: address,
            ipv6: Ipv6Addr::UNSPECIFIED,
            ttl: HOST_TTL,
        };

        match io::bind(&udp, DEFAULT_SOCKET, Some(Ipv4Addr::UNSPECIFIED), None).await {
            Ok(mut socket) => {
                info!(target: "mdns", "Advertising {}.local at {}", LOCAL_HOSTNAME, address);
                let (recv, send) = socket.split();
                let signal = Signal::new();
                let mdns = io::Mdns::<NoopRawMutex, _, _, _, _>::new(
                    Some(Ipv4Addr::UNSPECIFIED),
                    None,
                    recv,
                    send,
                    &recv_buf,
                    &send_buf,
                    |buf: &mut [u8]| fill_random(&rng, buf),
                    &signal,
                );
                if let Err(e) = mdns.run(HostAnswersMdnsHandler::new(&host)).await {
                    warn!(target: "mdns", "Responder stopped: {:?}", e);
                }
            }
            Err(e) => warn!(target: "mdns", "Bind failed: {:?}", e),
        }

        Timer::after(RETRY_DELAY).await;
    }
}

fn fill_random(rng: &Rng, buf: &mut [u8]) {
    for chunk in buf.chunks_mut(4) {
        let bytes = rng.random().to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
}
