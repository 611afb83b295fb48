//! Terminal stand-in for the serial port
//!
//! Operator commands are typed on stdin, one per line. Outbound lines are
//! printed as-is; telemetry frames are decoded and printed in readable form.

use std::io::BufRead;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embedded_io_async::{ErrorType, Read, Write};
use log::{trace, warn};

use boat32_core::status::StatusOutput;
use boat32_core::transport::frame::{self, FRAME_START};

static STDIN: Pipe<CriticalSectionRawMutex, 256> = Pipe::new();

/// Forward stdin into the command pipe from a blocking thread.
pub fn spawn_stdin_reader() {
    std::thread::spawn(|| {
        for line in std::io::stdin().lock().lines() {
            let Ok(mut line) = line else {
                warn!("stdin closed");
                break;
            };
            line.push('\n');

            let mut bytes = line.as_bytes();
            while !bytes.is_empty() {
                match STDIN.try_write(bytes) {
                    Ok(written) => bytes = &bytes[written..],
                    Err(_) => std::thread::sleep(std::time::Duration::from_millis(10)),
                }
            }
        }
    });
}

pub struct ConsoleInput;

impl ErrorType for ConsoleInput {
    type Error = core::convert::Infallible;
}

impl Read for ConsoleInput {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(STDIN.read(buf).await)
    }
}

/// Collects one outbound item per flush and prints it.
#[derive(Default)]
pub struct ConsoleOutput {
    pending: Vec<u8>,
}

impl ConsoleOutput {
    fn render(&self) {
        if self.pending.first() != Some(&FRAME_START) {
            print!("{}", String::from_utf8_lossy(&self.pending));
            return;
        }

        match frame::decode(&self.pending) {
            Ok((envelope, _)) => println!(
                "<frame {}/{} #{}> {:?}",
                envelope.system_id, envelope.component_id, envelope.sequence, envelope.message
            ),
            Err(e) => println!("<bad frame: {}>", e),
        }
    }
}

impl ErrorType for ConsoleOutput {
    type Error = core::convert::Infallible;
}

impl Write for ConsoleOutput {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.render();
        self.pending.clear();
        Ok(())
    }
}

/// LED and buzzer, traced rather than shown.
pub struct ConsoleIndicator;

impl StatusOutput for ConsoleIndicator {
    fn set_led(&mut self, on: bool) {
        trace!(target: "status", "LED {}", if on { "on" } else { "off" });
    }

    fn set_buzzer(&mut self, on: bool) {
        trace!(target: "status", "Buzzer {}", if on { "on" } else { "off" });
    }
}
