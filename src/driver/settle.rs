//! Settle-time lookup.

use super::config::SettleEntry;
use crate::internal::fmt::csis_warn;

/// Pick the settle value for `width`x`height`@`framerate`.
///
/// An exact match wins. Otherwise, among rows with the same resolution, the
/// one with the highest frame rate below the request, or failing that the
/// one with the highest frame rate overall. Only when no row has the
/// resolution is the largest settle value in the table used, with a warning.
/// An empty table yields 0.
pub fn lookup_settle(table: &[SettleEntry], width: u32, height: u32, framerate: u32) -> u32 {
    let mut max_settle = 0;
    let mut below: Option<&SettleEntry> = None;
    let mut fastest: Option<&SettleEntry> = None;

    for entry in table {
        max_settle = max_settle.max(entry.settle);

        if entry.width != width || entry.height != height {
            continue;
        }
        if entry.framerate == framerate {
            return entry.settle;
        }
        if entry.framerate < framerate && below.is_none_or(|best| entry.framerate > best.framerate)
        {
            below = Some(entry);
        }
        if fastest.is_none_or(|best| entry.framerate > best.framerate) {
            fastest = Some(entry);
        }
    }

    match below.or(fastest) {
        Some(entry) => entry.settle,
        None => {
            csis_warn!(
                "no settle time for {}x{}@{}fps, using {}",
                width,
                height,
                framerate,
                max_settle
            );
            max_settle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: [SettleEntry; 4] = [
        SettleEntry::new(640, 480, 30, 10),
        SettleEntry::new(640, 480, 60, 20),
        SettleEntry::new(1920, 1080, 30, 15),
        SettleEntry::new(1920, 1080, 60, 18),
    ];

    #[test]
    fn exact_match() {
        assert_eq!(lookup_settle(&TABLE, 640, 480, 60), 20);
        assert_eq!(lookup_settle(&TABLE, 1920, 1080, 30), 15);
        assert_eq!(lookup_settle(&TABLE, 1920, 1080, 60), 18);
    }

    #[test]
    fn nearest_lower_framerate() {
        assert_eq!(lookup_settle(&TABLE, 640, 480, 45), 10);
        assert_eq!(lookup_settle(&TABLE, 640, 480, 120), 20);
    }

    #[test]
    fn unknown_resolution_falls_back_to_max() {
        assert_eq!(lookup_settle(&TABLE, 800, 600, 30), 20);
    }

    #[test]
    fn all_rates_above_request_use_fastest_same_resolution() {
        assert_eq!(lookup_settle(&TABLE, 1920, 1080, 15), 18);

        let single = [
            SettleEntry::new(640, 480, 60, 20),
            SettleEntry::new(1920, 1080, 30, 15),
        ];
        assert_eq!(lookup_settle(&single, 1920, 1080, 15), 15);
    }

    #[test]
    fn empty_table() {
        assert_eq!(lookup_settle(&[], 640, 480, 30), 0);
    }
}
