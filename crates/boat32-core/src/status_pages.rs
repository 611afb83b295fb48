//! Read-only HTML status pages
//!
//! The server glue lives with the network stack; this module turns a raw
//! request into a complete response rendered from a store snapshot.

use core::fmt::{self, Write as _};

use heapless::String;

use crate::app_state::TelemetrySnapshot;
use crate::request::HttpError;

pub const PAGE_CAPACITY: usize = 512;
pub const HEAD_CAPACITY: usize = 128;

pub type Page = String<PAGE_CAPACITY>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    Instrumentation,
    Gps,
    Temperatures,
    ControlSystem,
    /// Answer, then restart the device
    Reset,
    NotFound,
}

impl Route {
    pub fn from_path(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        match path {
            "/" => Self::Index,
            "/instrumentation" => Self::Instrumentation,
            "/gps" => Self::Gps,
            "/temperatures" => Self::Temperatures,
            "/control-system" => Self::ControlSystem,
            "/reset" => Self::Reset,
            _ => Self::NotFound,
        }
    }
}

/// Link details shown on the index page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkInfo<'a> {
    pub ssid: &'a str,
    pub address: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Page,
    /// The caller restarts the device once the response is sent
    pub restart: bool,
}

impl Response {
    pub fn head(&self) -> Result<String<HEAD_CAPACITY>, fmt::Error> {
        let reason = match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Error",
        };
        let mut head = String::new();
        write!(
            head,
            "HTTP/1.1 {} {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            reason,
            self.body.len()
        )?;
        Ok(head)
    }
}

/// Method and path of the request line.
pub fn parse_request_line(request: &[u8]) -> Result<(&str, &str), HttpError> {
    let line_end = request
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(request.len());
    let line =
        core::str::from_utf8(&request[..line_end]).map_err(|_| HttpError::MalformedRequest)?;

    let mut parts = line.split(' ');
    match (parts.next(), parts.next()) {
        (Some(method), Some(path)) if !method.is_empty() && path.starts_with('/') => {
            Ok((method, path))
        }
        _ => Err(HttpError::MalformedRequest),
    }
}

pub fn render(
    route: Route,
    snapshot: &TelemetrySnapshot,
    network: &NetworkInfo<'_>,
) -> Result<Page, fmt::Error> {
    let mut page = Page::new();
    page.push_str("<h1>Boat32</h1>").map_err(|_| fmt::Error)?;

    match route {
        Route::Index => write!(
            page,
            "<p>WiFi connected: {}</p><p>IP address: {}</p>",
            network.ssid, network.address
        )?,
        Route::Instrumentation => {
            let readings = &snapshot.instrumentation;
            write!(
                page,
                "<p>Current motor: {:.2}</p><p>Current battery: {:.2}</p>\
                 <p>Current MPPT: {:.2}</p><p>Voltage battery: {:.2}</p>",
                readings.current_motor,
                readings.current_battery,
                readings.current_mppt,
                readings.voltage_battery
            )?
        }
        Route::Gps => {
            let position = &snapshot.position;
            write!(
                page,
                "<p>Latitude: {:.6}</p><p>Longitude: {:.6}</p><p>Satellites: {}</p>",
                position.wire_latitude(),
                position.wire_longitude(),
                position.satellites
            )?
        }
        Route::Temperatures => {
            let temperatures = &snapshot.temperatures;
            page.push_str("<p>Motor: ").map_err(|_| fmt::Error)?;
            write_temperature(&mut page, temperatures.motor.celsius())?;
            page.push_str("</p><p>Secondary: ").map_err(|_| fmt::Error)?;
            write_temperature(&mut page, temperatures.secondary.celsius())?;
            page.push_str("</p>").map_err(|_| fmt::Error)?;
        }
        Route::ControlSystem => write!(
            page,
            "<p>Pump mask: {}</p><p>DAC output: {:.2}</p>",
            snapshot.control.pump_mask, snapshot.control.commanded_output
        )?,
        Route::Reset => page.push_str("<p>Resetting...</p>").map_err(|_| fmt::Error)?,
        Route::NotFound => page.push_str("<p>Not found</p>").map_err(|_| fmt::Error)?,
    }
    Ok(page)
}

fn write_temperature(page: &mut Page, celsius: Option<f32>) -> fmt::Result {
    match celsius {
        Some(value) => write!(page, "{:.2} C", value),
        None => page.push_str("disconnected").map_err(|_| fmt::Error),
    }
}

/// Build the full response for a raw request.
pub fn respond(
    request: &[u8],
    snapshot: &TelemetrySnapshot,
    network: &NetworkInfo<'_>,
) -> Response {
    let (status, route) = match parse_request_line(request) {
        Ok(("GET", path)) => match Route::from_path(path) {
            Route::NotFound => (404, Route::NotFound),
            route => (200, route),
        },
        Ok(_) => (405, Route::NotFound),
        Err(_) => (400, Route::NotFound),
    };

    // Every page fits the buffer; an overflow only cuts the body.
    let body = render(route, snapshot, network).unwrap_or_default();
    Response {
        status,
        body,
        restart: route == Route::Reset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::{Instrumentation, TemperatureReading, Temperatures};

    fn network() -> NetworkInfo<'static> {
        NetworkInfo {
            ssid: "harbour",
            address: "192.168.4.20",
        }
    }

    #[test]
    fn test_routes() {
        assert_eq!(Route::from_path("/"), Route::Index);
        assert_eq!(Route::from_path("/gps?refresh=1"), Route::Gps);
        assert_eq!(Route::from_path("/control-system"), Route::ControlSystem);
        assert_eq!(Route::from_path("/update"), Route::NotFound);
    }

    #[test]
    fn test_instrumentation_page() {
        let snapshot = TelemetrySnapshot {
            instrumentation: Instrumentation {
                current_motor: 12.5,
                current_battery: 3.0,
                current_mppt: 7.25,
                voltage_battery: 51.2,
            },
            ..Default::default()
        };
        let response = respond(b"GET /instrumentation HTTP/1.1\r\n\r\n", &snapshot, &network());
        assert_eq!(response.status, 200);
        assert!(response.body.contains("Current motor: 12.50"));
        assert!(response.body.contains("Voltage battery: 51.20"));
        assert!(!response.restart);
    }

    #[test]
    fn test_disconnected_probe_shown_as_such() {
        let snapshot = TelemetrySnapshot {
            temperatures: Temperatures {
                motor: TemperatureReading::Celsius(40.0),
                secondary: TemperatureReading::Disconnected,
            },
            ..Default::default()
        };
        let page = render(Route::Temperatures, &snapshot, &network()).unwrap();
        assert!(page.contains("Motor: 40.00 C"));
        assert!(page.contains("Secondary: disconnected"));
    }

    #[test]
    fn test_reset_requests_restart() {
        let response = respond(b"GET /reset HTTP/1.1\r\n", &TelemetrySnapshot::default(), &network());
        assert!(response.restart);
        assert!(response.body.contains("Resetting"));
    }

    #[test]
    fn test_bad_requests() {
        let snapshot = TelemetrySnapshot::default();
        assert_eq!(respond(b"POST / HTTP/1.1\r\n", &snapshot, &network()).status, 405);
        assert_eq!(respond(b"\xff\xfe", &snapshot, &network()).status, 400);
        assert_eq!(respond(b"GET /nope HTTP/1.1\r\n", &snapshot, &network()).status, 404);
    }

    #[test]
    fn test_head_matches_body_length() {
        let response = respond(b"GET / HTTP/1.1\r\n", &TelemetrySnapshot::default(), &network());
        let head = response.head().unwrap();
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        let expected = std::format!("Content-Length: {}\r\n", response.body.len());
        assert!(head.contains(expected.as_str()));
    }
}
