//! # UI Module
//!
//! Terminal rendering of tuner readings.

pub mod meter;

use tuner_core::{DeviationZone, Reading, tuning};

const LEVEL_WIDTH: usize = 20;
const NEEDLE_WIDTH: usize = 41;

/// One status line for a reading.
pub fn render_line(reading: &Reading) -> String {
    let frequency = reading
        .pitch
        .frequency()
        .map_or_else(|| "    --.-- Hz".to_string(), |f| format!("{f:>9.2} Hz"));
    let cents = reading
        .cents
        .map_or_else(|| "    -- c".to_string(), |c| format!("{c:>+6.1} c"));
    let zone = match reading.zone {
        DeviationZone::Neutral => String::new(),
        zone => zone.to_string(),
    };

    format!(
        "{:<4} {frequency} {cents} {} {} {zone}",
        tuning::note_label(reading.note),
        meter::level_bar(reading.level.level, LEVEL_WIDTH),
        meter::cent_needle(reading.cents, NEEDLE_WIDTH),
    )
}
