//! GGA/RMC merging on top of the `nmea0183` parser
//!
//! Sentence framing, checksums and field decoding are the parser's job.
//! [`PositionTracker`] only folds the two fix-carrying sentences into the
//! latest [`Position`].

use nmea0183::{GGA, ParseResult, RMC};

use crate::app_state::{FixValidity, Position};

/// Longest sentence the standard allows, including `$` and `*hh`.
pub const MAX_SENTENCE: usize = 82;

const KNOTS_TO_KMH: f32 = 1.852;

/// Merges GGA and RMC sentences into the latest [`Position`].
#[derive(Default)]
pub struct PositionTracker {
    position: Position,
    updated: bool,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one parser result in. Returns whether it carried fix data.
    pub fn apply(&mut self, result: &ParseResult) -> bool {
        match result {
            ParseResult::GGA(Some(gga)) => self.apply_gga(gga),
            // A GGA without a fix has no location and no satellites in use.
            ParseResult::GGA(None) => {
                self.position.validity.remove(FixValidity::LOCATION);
                self.position.satellites = 0;
                self.position.validity.insert(FixValidity::SATELLITES);
            }
            ParseResult::RMC(Some(rmc)) => self.apply_rmc(rmc),
            // Void RMC status.
            ParseResult::RMC(None) => {
                self.position
                    .validity
                    .remove(FixValidity::SPEED | FixValidity::COURSE);
            }
            _ => return false,
        }
        self.updated = true;
        true
    }

    fn apply_gga(&mut self, gga: &GGA) {
        self.set_location(gga.latitude.as_f64() as f32, gga.longitude.as_f64() as f32);
        self.position.satellites = gga.sat_in_use;
        self.position.validity.insert(FixValidity::SATELLITES);
    }

    fn apply_rmc(&mut self, rmc: &RMC) {
        self.set_location(rmc.latitude.as_f64() as f32, rmc.longitude.as_f64() as f32);
        self.position.speed_kmh = rmc.speed.as_knots() * KNOTS_TO_KMH;
        self.position.validity.insert(FixValidity::SPEED);

        match &rmc.course {
            Some(course) => {
                self.position.course_deg = course.degrees;
                self.position.validity.insert(FixValidity::COURSE);
            }
            None => self.position.validity.remove(FixValidity::COURSE),
        }
    }

    fn set_location(&mut self, latitude: f32, longitude: f32) {
        self.position.latitude = latitude;
        self.position.longitude = longitude;
        self.position.validity.insert(FixValidity::LOCATION);
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// The merged position if any fix sentence arrived since the last call.
    pub fn take_update(&mut self) -> Option<Position> {
        core::mem::replace(&mut self.updated, false).then_some(self.position)
    }
}
