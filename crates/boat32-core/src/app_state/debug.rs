use core::sync::atomic::{AtomicU16, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Subsystems whose verbose output is currently enabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DebugFlags: u16 {
        const WIFI = 1 << 0;
        const SERVER = 1 << 1;
        const VPN = 1 << 2;
        const SERIAL = 1 << 3;
        const TEMPERATURE = 1 << 4;
        const GPS = 1 << 5;
        const INSTRUMENTATION = 1 << 6;
        const AUXILIARY = 1 << 7;
        const ENCODER = 1 << 8;
        const HIGH_WATER = 1 << 9;
    }
}

impl Default for DebugFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// Runtime debug mask shared by every task.
pub struct DebugSwitch {
    bits: AtomicU16,
}

impl DebugSwitch {
    pub const fn new(flags: DebugFlags) -> Self {
        Self {
            bits: AtomicU16::new(flags.bits()),
        }
    }

    pub fn get(&self) -> DebugFlags {
        DebugFlags::from_bits_truncate(self.bits.load(Ordering::Relaxed))
    }

    pub fn enabled(&self, flag: DebugFlags) -> bool {
        self.get().contains(flag)
    }

    /// Replace the mask, returning the previous one so it can be restored.
    pub fn replace(&self, flags: DebugFlags) -> DebugFlags {
        DebugFlags::from_bits_truncate(self.bits.swap(flags.bits(), Ordering::Relaxed))
    }
}
