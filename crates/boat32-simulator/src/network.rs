//! Host networking stand-ins
//!
//! The Wi-Fi link and the overlay are simulated; HTTP requests and the
//! status pages use the host's real TCP stack.

use std::io::{Read as _, Write as _};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{info, warn};

use boat32_core::app_state::{LinkState, TelemetryReader};
use boat32_core::config::{Credential, CredentialTable};
use boat32_core::connectivity::overlay::{OverlayError, OverlayNetwork};
use boat32_core::connectivity::{LinkError, WifiLink};
use boat32_core::registry::Heartbeat;
use boat32_core::request::{
    HttpClient, HttpError, HttpResponse, MAX_BODY, Url, body_text, parse_response_head,
};
use boat32_core::status_pages::{NetworkInfo, respond};

/// Status polls before a reachable network reports associated.
const POLLS_TO_ASSOCIATE: usize = 2;
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// Radio that can only see one network.
pub struct SimulatedLink {
    reachable: String,
    current: Option<String>,
    polls: usize,
}

impl SimulatedLink {
    pub fn new(reachable: impl Into<String>) -> Self {
        Self {
            reachable: reachable.into(),
            current: None,
            polls: 0,
        }
    }
}

impl WifiLink for SimulatedLink {
    async fn begin(&mut self, credential: &Credential) -> Result<(), LinkError> {
        self.current = Some(credential.ssid.as_str().into());
        self.polls = 0;
        Ok(())
    }

    async fn is_connected(&mut self) -> bool {
        self.polls += 1;
        self.current.as_deref() == Some(self.reachable.as_str()) && self.polls >= POLLS_TO_ASSOCIATE
    }
}

/// Overlay that accepts every join and only logs what it was asked to do.
pub struct SimulatedOverlay;

impl OverlayNetwork for SimulatedOverlay {
    async fn setup(&mut self, dashboard: &str) -> Result<(), OverlayError> {
        info!(target: "vpn", "Dashboard set to {}", dashboard);
        Ok(())
    }

    async fn join(&mut self, _join_code: &str, hostname: &str) -> Result<(), OverlayError> {
        info!(target: "vpn", "Joined as {}", hostname);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), OverlayError> {
        Ok(())
    }
}

/// Blocking GET over the host TCP stack.
pub struct HostHttpClient;

impl HttpClient for HostHttpClient {
    async fn get(&mut self, url: &Url<'_>) -> Result<HttpResponse, HttpError> {
        let address = (url.host, url.port)
            .to_socket_addrs()
            .map_err(|_| HttpError::Dns)?
            .next()
            .ok_or(HttpError::Dns)?;
        let mut stream =
            TcpStream::connect_timeout(&address, SOCKET_TIMEOUT).map_err(|_| HttpError::Connect)?;
        stream
            .set_read_timeout(Some(SOCKET_TIMEOUT))
            .map_err(|_| HttpError::Io)?;

        let head = url.request_head::<256>()?;
        stream
            .write_all(head.as_bytes())
            .map_err(|_| HttpError::Io)?;

        let mut raw = Vec::new();
        stream
            .take((MAX_BODY * 4) as u64)
            .read_to_end(&mut raw)
            .map_err(|_| HttpError::Io)?;

        let response = parse_response_head(&raw)?;
        Ok(HttpResponse {
            status: response.status,
            body: body_text(&raw[response.body_start..]),
        })
    }
}

/// Serve the status pages on `address` from a blocking thread.
pub fn spawn_status_server(
    address: String,
    reader: TelemetryReader<'static>,
    credentials: &'static CredentialTable,
    heartbeat: Heartbeat<'static>,
) {
    std::thread::spawn(move || {
        let listener = match TcpListener::bind(&address) {
            Ok(listener) => listener,
            Err(e) => {
                warn!(target: "server", "Could not bind {}: {}", address, e);
                return;
            }
        };
        info!(target: "server", "Status pages at http://{}/", address);

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(e) = serve(stream, reader, credentials, &address) {
                        warn!(target: "server", "Client dropped: {}", e);
                    }
                }
                Err(e) => warn!(target: "server", "Accept failed: {}", e),
            }
            heartbeat.beat();
        }
    });
}

fn serve(
    mut stream: TcpStream,
    reader: TelemetryReader<'static>,
    credentials: &CredentialTable,
    address: &str,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(SOCKET_TIMEOUT))?;
    let mut request = [0u8; 1024];
    let count = stream.read(&mut request)?;

    let ssid = match reader.link() {
        LinkState::Connected(index) => credentials
            .get(index)
            .map(|credential| credential.ssid.as_str())
            .unwrap_or_default(),
        _ => "",
    };
    let network = NetworkInfo { ssid, address };

    let response = respond(&request[..count], &reader.snapshot(), &network);
    let head = response
        .head()
        .map_err(|_| std::io::Error::other("response head too long"))?;
    stream.write_all(head.as_bytes())?;
    stream.write_all(response.body.as_bytes())?;

    if response.restart {
        warn!(target: "server", "Restart requested; the simulator keeps running");
    }
    Ok(())
}
