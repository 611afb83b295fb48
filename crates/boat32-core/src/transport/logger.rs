use core::fmt::Write as _;

use heapless::String;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use super::{MAX_LINE, SerialOutbox};

/// `log` backend that queues each record as one `[LEVEL][target] message`
/// line on the serial uplink.
pub struct SerialLogger {
    outbox: &'static SerialOutbox,
    level: LevelFilter,
}

impl SerialLogger {
    pub const fn new(outbox: &'static SerialOutbox, level: LevelFilter) -> Self {
        Self { outbox, level }
    }

    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.level);
        Ok(())
    }
}

/// Render a record the way it appears on the uplink. Overlong messages are cut.
pub fn format_line(record: &Record<'_>) -> String<MAX_LINE> {
    let mut line = String::new();
    // A full buffer only truncates the line.
    let _ = write!(
        line,
        "[{}][{}] {}",
        record.level(),
        record.target(),
        record.args()
    );
    line
}

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            self.outbox.try_line(&format_line(record));
        }
    }

    fn flush(&self) {}
}
