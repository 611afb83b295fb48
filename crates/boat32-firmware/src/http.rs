//! HTTP over embassy-net
//!
//! [`NetHttpClient`] performs the forwarded GET requests; [`serve_status_pages`]
//! answers the browser on port 80 until a reset page asks for a restart.

use core::fmt::Write as _;

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::{Error as TcpError, TcpSocket};
use embassy_net::Stack;
use embassy_time::{Duration, Timer};
use heapless::String;
use log::{info, warn};

use boat32_core::app_state::{LinkState, TelemetryReader};
use boat32_core::config::CredentialTable;
use boat32_core::registry::Heartbeat;
use boat32_core::request::{
    HttpClient, HttpError, HttpResponse, MAX_BODY, Url, body_text, parse_response_head,
};
use boat32_core::status_pages::{NetworkInfo, respond};

const SOCKET_BUFFER: usize = 1024;
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);
const STATUS_PORT: u16 = 80;
/// Lets the reset page reach the browser before the chip restarts.
const RESTART_GRACE: Duration = Duration::from_millis(500);

async fn write_all(socket: &mut TcpSocket<'_>, mut bytes: &[u8]) -> Result<(), TcpError> {
    while !bytes.is_empty() {
        let written = socket.write(bytes).await?;
        bytes = &bytes[written..];
    }
    Ok(())
}

/// Read until the peer closes or `buffer` is full, returning the bytes used.
async fn read_to_end(socket: &mut TcpSocket<'_>, buffer: &mut [u8]) -> Result<usize, TcpError> {
    let mut used = 0;
    while used < buffer.len() {
        match socket.read(&mut buffer[used..]).await? {
            0 => break,
            count => used += count,
        }
    }
    Ok(used)
}

pub struct NetHttpClient {
    stack: Stack<'static>,
}

impl NetHttpClient {
    pub fn new(stack: Stack<'static>) -> Self {
        Self { stack }
    }
}

impl HttpClient for NetHttpClient {
    async fn get(&mut self, url: &Url<'_>) -> Result<HttpResponse, HttpError> {
        self.stack.wait_config_up().await;

        let address = self
            .stack
            .dns_query(url.host, DnsQueryType::A)
            .await
            .map_err(|_| HttpError::Dns)?
            .first()
            .copied()
            .ok_or(HttpError::Dns)?;

        let mut rx_buffer = [0u8; SOCKET_BUFFER];
        let mut tx_buffer = [0u8; SOCKET_BUFFER];
        let mut socket = TcpSocket::new(self.stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(SOCKET_TIMEOUT));
        socket
            .connect((address, url.port))
            .await
            .map_err(|_| HttpError::Connect)?;

        let head = url.request_head::<256>()?;
        write_all(&mut socket, head.as_bytes())
            .await
            .map_err(|_| HttpError::Io)?;
        socket.flush().await.map_err(|_| HttpError::Io)?;

        let mut raw = [0u8; MAX_BODY * 2];
        let used = read_to_end(&mut socket, &mut raw)
            .await
            .map_err(|_| HttpError::Io)?;
        socket.close();

        let response = parse_response_head(&raw[..used])?;
        Ok(HttpResponse {
            status: response.status,
            body: body_text(&raw[response.body_start..used]),
        })
    }
}

fn local_address(stack: Stack<'_>) -> String<16> {
    let mut address = String::new();
    if let Some(config) = stack.config_v4() {
        // Dotted quads always fit.
        let _ = write!(address, "{}", config.address.address());
    }
    address
}

/// Serve one client. Returns whether the page asked for a restart.
async fn serve(
    socket: &mut TcpSocket<'_>,
    stack: Stack<'_>,
    reader: TelemetryReader<'_>,
    credentials: &CredentialTable,
) -> Result<bool, TcpError> {
    let mut request = [0u8; SOCKET_BUFFER];
    let count = socket.read(&mut request).await?;

    let ssid = match reader.link() {
        LinkState::Connected(index) => credentials
            .get(index)
            .map(|credential| credential.ssid.as_str())
            .unwrap_or_default(),
        _ => "",
    };
    let address = local_address(stack);
    let network = NetworkInfo {
        ssid,
        address: &address,
    };

    let response = respond(&request[..count], &reader.snapshot(), &network);
    match response.head() {
        Ok(head) => write_all(socket, head.as_bytes()).await?,
        Err(_) => warn!(target: "server", "Response head too long for {}", response.status),
    }
    write_all(socket, response.body.as_bytes()).await?;
    socket.flush().await?;
    Ok(response.restart)
}

/// Accept loop for the status pages. Restarts the chip when the reset page
/// is requested.
pub async fn serve_status_pages(
    stack: Stack<'static>,
    reader: TelemetryReader<'static>,
    credentials: &'static CredentialTable,
    heartbeat: Heartbeat<'_>,
) -> ! {
    let mut rx_buffer = [0u8; SOCKET_BUFFER];
    let mut tx_buffer = [0u8; SOCKET_BUFFER];

    stack.wait_config_up().await;
    info!(target: "server", "Status pages at http://{}/", local_address(stack));

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(SOCKET_TIMEOUT));

        match socket.accept(STATUS_PORT).await {
            Ok(()) => match serve(&mut socket, stack, reader, credentials).await {
                Ok(true) => {
                    info!(target: "server", "Restart requested");
                    socket.close();
                    Timer::after(RESTART_GRACE).await;
                    esp_hal::system::software_reset();
                }
                Ok(false) => socket.close(),
                Err(e) => warn!(target: "server", "Client dropped: {:?}", e),
            },
            Err(e) => warn!(target: "server", "Accept failed: {:?}", e),
        }

        socket.abort();
        heartbeat.beat();
    }
}
