//! Application-wide telemetry state for boat32
//!
//! The store keeps only the latest value of every channel. Each field group
//! has exactly one writer: [`TelemetryStore::writers`] hands out the writer
//! handles once, and each handle is moved into the task that owns the field.
//! Readers are freely copyable. Every field sits in its own short critical
//! section, so a read never observes a half-written value, but there is no
//! atomicity across field groups.

mod debug;
mod snapshot;

pub use debug::*;
pub use snapshot::*;

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

type Slot<T> = Mutex<CriticalSectionRawMutex, Cell<T>>;

const fn slot<T>(value: T) -> Slot<T> {
    Mutex::new(Cell::new(value))
}

const EMPTY_POSITION: Position = Position {
    latitude: 0.0,
    longitude: 0.0,
    speed_kmh: 0.0,
    course_deg: 0.0,
    satellites: 0,
    validity: FixValidity::empty(),
};

const EMPTY_INSTRUMENTATION: Instrumentation = Instrumentation {
    current_motor: 0.0,
    current_battery: 0.0,
    current_mppt: 0.0,
    voltage_battery: 0.0,
};

/// Process-wide store of the latest measurement of each channel
pub struct TelemetryStore {
    instrumentation: Slot<Instrumentation>,
    position: Slot<Position>,
    temperatures: Slot<Temperatures>,
    pump_mask: Slot<u8>,
    commanded_output: Slot<f32>,
    auxiliary: Slot<AuxiliaryReadings>,
    link: Slot<LinkState>,
    debug: DebugSwitch,
    writers_taken: AtomicBool,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryStore {
    pub const fn new() -> Self {
        Self {
            instrumentation: slot(EMPTY_INSTRUMENTATION),
            position: slot(EMPTY_POSITION),
            temperatures: slot(Temperatures {
                motor: TemperatureReading::Disconnected,
                secondary: TemperatureReading::Disconnected,
            }),
            pump_mask: slot(0),
            commanded_output: slot(0.0),
            auxiliary: slot(AuxiliaryReadings {
                battery_voltage: 0.0,
                battery_current: 0.0,
            }),
            link: slot(LinkState::Disconnected),
            debug: DebugSwitch::new(DebugFlags::all()),
            writers_taken: AtomicBool::new(false),
        }
    }

    /// Hand out the unique writer for every field group.
    ///
    /// Returns `None` on every call after the first.
    pub fn writers(&self) -> Option<StoreWriters<'_>> {
        if self.writers_taken.swap(true, Ordering::AcqRel) {
            return None;
        }

        Some(StoreWriters {
            instrumentation: InstrumentationWriter { store: self },
            position: PositionWriter { store: self },
            temperatures: TemperatureWriter { store: self },
            auxiliary: AuxiliaryWriter { store: self },
            control: ControlWriter { store: self },
            link: LinkWriter { store: self },
        })
    }

    pub fn reader(&self) -> TelemetryReader<'_> {
        TelemetryReader { store: self }
    }

    pub fn debug(&self) -> &DebugSwitch {
        &self.debug
    }
}

/// One writer per field group, each meant to be moved into its owning task.
pub struct StoreWriters<'a> {
    pub instrumentation: InstrumentationWriter<'a>,
    pub position: PositionWriter<'a>,
    pub temperatures: TemperatureWriter<'a>,
    pub auxiliary: AuxiliaryWriter<'a>,
    pub control: ControlWriter<'a>,
    pub link: LinkWriter<'a>,
}

pub struct InstrumentationWriter<'a> {
    store: &'a TelemetryStore,
}

impl InstrumentationWriter<'_> {
    pub fn publish(&mut self, value: Instrumentation) {
        self.store.instrumentation.lock(|cell| cell.set(value));
    }
}

pub struct PositionWriter<'a> {
    store: &'a TelemetryStore,
}

impl PositionWriter<'_> {
    pub fn publish(&mut self, value: Position) {
        self.store.position.lock(|cell| cell.set(value));
    }
}

pub struct TemperatureWriter<'a> {
    store: &'a TelemetryStore,
}

impl TemperatureWriter<'_> {
    pub fn publish(&mut self, value: Temperatures) {
        self.store.temperatures.lock(|cell| cell.set(value));
    }
}

/// Owned by the auxiliary task: battery readings and pump sensing.
pub struct AuxiliaryWriter<'a> {
    store: &'a TelemetryStore,
}

impl AuxiliaryWriter<'_> {
    pub fn publish(&mut self, value: AuxiliaryReadings) {
        self.store.auxiliary.lock(|cell| cell.set(value));
    }

    pub fn set_pump_mask(&mut self, mask: u8) {
        self.store.pump_mask.lock(|cell| cell.set(mask & 0b11));
    }
}

/// Owned by the control-input task.
pub struct ControlWriter<'a> {
    store: &'a TelemetryStore,
}

impl ControlWriter<'_> {
    pub fn set_commanded_output(&mut self, millivolts: f32) {
        self.store.commanded_output.lock(|cell| cell.set(millivolts));
    }
}

/// Owned by the connectivity manager.
pub struct LinkWriter<'a> {
    store: &'a TelemetryStore,
}

impl LinkWriter<'_> {
    pub fn publish(&mut self, state: LinkState) {
        self.store.link.lock(|cell| cell.set(state));
    }
}

#[derive(Clone, Copy)]
pub struct TelemetryReader<'a> {
    store: &'a TelemetryStore,
}

impl TelemetryReader<'_> {
    pub fn instrumentation(&self) -> Instrumentation {
        self.store.instrumentation.lock(Cell::get)
    }

    pub fn position(&self) -> Position {
        self.store.position.lock(Cell::get)
    }

    pub fn temperatures(&self) -> Temperatures {
        self.store.temperatures.lock(Cell::get)
    }

    pub fn control(&self) -> ControlState {
        ControlState {
            pump_mask: self.store.pump_mask.lock(Cell::get),
            commanded_output: self.store.commanded_output.lock(Cell::get),
        }
    }

    pub fn auxiliary(&self) -> AuxiliaryReadings {
        self.store.auxiliary.lock(Cell::get)
    }

    pub fn link(&self) -> LinkState {
        self.store.link.lock(Cell::get)
    }

    pub fn debug(&self) -> DebugFlags {
        self.store.debug.get()
    }

    /// Read every field group. Groups are read one after another.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            instrumentation: self.instrumentation(),
            position: self.position(),
            temperatures: self.temperatures(),
            control: self.control(),
            auxiliary: self.auxiliary(),
            link: self.link(),
        }
    }
}
