//! Operator-triggered HTTP GET
//!
//! `R<url>` queues a request; the forwarder waits until the link first comes
//! up, then performs each request through an [`HttpClient`] and logs the
//! status and body. Only plain `http://` is supported.

use core::fmt::Write as _;
use core::str::FromStr;

use heapless::String;
use log::{info, warn};
use thiserror_no_std::Error;

use crate::connectivity::NetworkEvent;
use crate::notify::Notifier;
use crate::registry::Heartbeat;

pub const MAX_URL: usize = 31;
/// Bytes of response body kept for the log.
pub const MAX_BODY: usize = 512;
pub const DEFAULT_PORT: u16 = 80;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    #[error("URL too long")]
    UrlTooLong,
    #[error("only http:// URLs are supported")]
    UnsupportedScheme,
    #[error("URL has no host")]
    MissingHost,
    #[error("invalid port")]
    InvalidPort,
    #[error("DNS lookup failed")]
    Dns,
    #[error("connection failed")]
    Connect,
    #[error("I/O error")]
    Io,
    #[error("malformed response")]
    MalformedResponse,
    #[error("malformed request")]
    MalformedRequest,
    #[error("request line too long")]
    RequestTooLong,
}

/// One pending GET, as typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    url: String<MAX_URL>,
}

impl HttpRequest {
    pub fn new(url: &str) -> Result<Self, HttpError> {
        Ok(Self {
            url: String::from_str(url).map_err(|_| HttpError::UrlTooLong)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Url<'a> {
    pub host: &'a str,
    pub port: u16,
    /// Always starts with `/`
    pub path: &'a str,
}

impl<'a> Url<'a> {
    pub fn parse(url: &'a str) -> Result<Self, HttpError> {
        let rest = url
            .strip_prefix("http://")
            .ok_or(HttpError::UnsupportedScheme)?;
        let (authority, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, "/"),
        };

        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>().map_err(|_| HttpError::InvalidPort)?,
            ),
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(HttpError::MissingHost);
        }

        Ok(Self { host, port, path })
    }

    /// The request head sent on the wire.
    pub fn request_head<const N: usize>(&self) -> Result<String<N>, HttpError> {
        let mut head = String::new();
        write!(
            head,
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.path, self.host
        )
        .map_err(|_| HttpError::RequestTooLong)?;
        Ok(head)
    }
}

/// Status code and body boundaries of a raw HTTP/1.x response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    /// Offset of the first body byte
    pub body_start: usize,
}

pub fn parse_response_head(response: &[u8]) -> Result<ResponseHead, HttpError> {
    let header_end = response
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .ok_or(HttpError::MalformedResponse)?;
    let head =
        core::str::from_utf8(&response[..header_end]).map_err(|_| HttpError::MalformedResponse)?;

    let status_line = head.lines().next().ok_or(HttpError::MalformedResponse)?;
    let mut parts = status_line.split(' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::MalformedResponse);
    }
    let status = parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or(HttpError::MalformedResponse)?;

    Ok(ResponseHead {
        status,
        body_start: header_end + 4,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Body, cut at [`MAX_BODY`] bytes
    pub body: String<MAX_BODY>,
}

pub trait HttpClient {
    fn get(&mut self, url: &Url<'_>) -> impl Future<Output = Result<HttpResponse, HttpError>>;
}

impl<T: HttpClient> HttpClient for &mut T {
    async fn get(&mut self, url: &Url<'_>) -> Result<HttpResponse, HttpError> {
        (**self).get(url).await
    }
}

/// Keep the printable prefix of a response body.
pub fn body_text(bytes: &[u8]) -> String<MAX_BODY> {
    let valid = match core::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            // The prefix up to the first invalid byte is valid UTF-8.
            core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default()
        }
    };

    let mut body = String::new();
    for ch in valid.chars() {
        if body.push(ch).is_err() {
            break;
        }
    }
    body
}

pub struct RequestForwarder<'a, C> {
    client: C,
    gate: &'a Notifier<NetworkEvent>,
    inbox: &'a Notifier<HttpRequest>,
}

impl<'a, C: HttpClient> RequestForwarder<'a, C> {
    pub fn new(
        client: C,
        gate: &'a Notifier<NetworkEvent>,
        inbox: &'a Notifier<HttpRequest>,
    ) -> Self {
        Self {
            client,
            gate,
            inbox,
        }
    }

    pub async fn forward(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let url = Url::parse(request.url())?;
        self.client.get(&url).await
    }

    pub async fn step(&mut self) {
        let request = self.inbox.wait().await;
        match self.forward(&request).await {
            Ok(response) => {
                info!(target: "wifi", "HTTP response code: {}", response.status);
                info!(target: "wifi", "{}", response.body);
            }
            Err(e) => warn!(target: "wifi", "GET {} failed: {}", request.url(), e),
        }
    }

    pub async fn run(mut self, heartbeat: Heartbeat<'_>) -> ! {
        self.gate.wait().await;
        info!(target: "wifi", "Request forwarder ready");
        loop {
            self.step().await;
            heartbeat.beat();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_url_parse() {
        assert_eq!(
            Url::parse("http://example.com:8080/status?x=1"),
            Ok(Url {
                host: "example.com",
                port: 8080,
                path: "/status?x=1"
            })
        );
        assert_eq!(
            Url::parse("http://10.0.0.7"),
            Ok(Url {
                host: "10.0.0.7",
                port: 80,
                path: "/"
            })
        );
        assert_eq!(
            Url::parse("https://example.com/"),
            Err(HttpError::UnsupportedScheme)
        );
        assert_eq!(Url::parse("http://:80/"), Err(HttpError::MissingHost));
        assert_eq!(Url::parse("http://a:99999/"), Err(HttpError::InvalidPort));
    }

    #[test]
    fn test_request_head() {
        let url = Url::parse("http://example.com/a").unwrap();
        let head: String<128> = url.request_head().unwrap();
        assert_eq!(
            head.as_str(),
            "GET /a HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n"
        );
        assert_eq!(url.request_head::<8>(), Err(HttpError::RequestTooLong));
    }

    #[test]
    fn test_response_head() {
        let raw = b"HTTP/1.1 404 Not Found\r\nContent-Length: 3\r\n\r\nnope";
        let head = parse_response_head(raw).unwrap();
        assert_eq!(head.status, 404);
        assert_eq!(&raw[head.body_start..], b"nope");
        assert_eq!(
            parse_response_head(b"garbage"),
            Err(HttpError::MalformedResponse)
        );
    }

    #[test]
    fn test_body_text_stops_at_invalid_utf8() {
        assert_eq!(body_text(b"ok\xffrest").as_str(), "ok");
    }

    #[test]
    fn test_long_url_rejected() {
        assert_eq!(
            HttpRequest::new("http://a-very-long-host-name.example.com/"),
            Err(HttpError::UrlTooLong)
        );
    }

    struct Canned {
        requested: std::vec::Vec<std::string::String>,
    }

    impl HttpClient for Canned {
        async fn get(&mut self, url: &Url<'_>) -> Result<HttpResponse, HttpError> {
            self.requested
                .push(std::format!("{}:{}{}", url.host, url.port, url.path));
            Ok(HttpResponse {
                status: 200,
                body: String::from_str("hello").unwrap(),
            })
        }
    }

    #[test]
    fn test_forwarder_resolves_url() {
        let gate = Notifier::new();
        let inbox = Notifier::new();
        let mut forwarder = RequestForwarder::new(
            Canned {
                requested: std::vec::Vec::new(),
            },
            &gate,
            &inbox,
        );

        inbox.send(HttpRequest::new("http://boat.local/gps").unwrap());
        block_on(forwarder.step());
        assert_eq!(forwarder.client.requested, ["boat.local:80/gps"]);

        let bad = HttpRequest::new("ftp://boat.local/").unwrap();
        assert_eq!(
            block_on(forwarder.forward(&bad)),
            Err(HttpError::UnsupportedScheme)
        );
    }
}
