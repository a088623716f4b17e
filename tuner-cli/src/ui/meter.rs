//! # Text Meters
//!
//! Fixed-width text renderings of the level meter and the tuning needle.

/// Maximum cent deviation shown on the needle; larger values pin to the edge.
const METER_RANGE: f32 = 50.0;

/// A bar filled in proportion to `level` in [0, 1].
pub fn level_bar(level: f32, width: usize) -> String {
    let filled = ((level.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

/// A needle marking `cents` between -50 and +50, with `|` at the centre.
///
/// `width` is forced odd so the centre falls on a character.
pub fn cent_needle(cents: Option<f32>, width: usize) -> String {
    let width = width.max(3) | 1;
    let centre = width / 2;
    let mut cells = vec!['-'; width];
    cells[centre] = '|';

    if let Some(c) = cents.filter(|c| c.is_finite()) {
        let clamped = c.clamp(-METER_RANGE, METER_RANGE);
        let position = (clamped + METER_RANGE) / (2.0 * METER_RANGE) * (width - 1) as f32;
        cells[(position.round() as usize).min(width - 1)] = '^';
    }
    cells.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_bar_fills_proportionally() {
        assert_eq!(level_bar(0.0, 4), "[....]");
        assert_eq!(level_bar(0.5, 4), "[##..]");
        assert_eq!(level_bar(1.0, 4), "[####]");
        assert_eq!(level_bar(3.0, 4), "[####]");
    }

    #[test]
    fn needle_positions() {
        assert_eq!(cent_needle(None, 5), "--|--");
        assert_eq!(cent_needle(Some(0.0), 5), "--^--");
        assert_eq!(cent_needle(Some(-50.0), 5), "^-|--");
        assert_eq!(cent_needle(Some(500.0), 5), "--|-^");
        assert_eq!(cent_needle(Some(f32::NAN), 5), "--|--");
    }
}
