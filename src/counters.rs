//! Decoder for the fixed-width Dragon front-end counters blob attached to
//! every event (`RawEvent::dragon_counters`), one fixed-size record per
//! module, little-endian.
//!
//! The wire-format reader hands this blob through untouched; only this
//! module knows its internal layout. The time-lapse correction needs just
//! `local_clock_counter[module]`, but the record is decoded in full so the
//! other counters are available to a caller that wants them.
use crate::constants::N_MODULES;

/// One module's worth of Dragon front-end counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ModuleCounters {
    pub pps_counter: u16,
    pub ten_mhz_counter: u32,
    pub event_counter: u32,
    pub trigger_counter: u32,
    pub local_clock_counter: u64,
}

/// Byte size of one module's counters record: `u16 + u32 + u32 + u32 + u64`,
/// packed with no padding.
const RECORD_SIZE: usize = 2 + 4 + 4 + 4 + 8;

/// Decodes every module's counters record out of the raw blob.
///
/// A blob shorter than `N_MODULES * RECORD_SIZE` (as in a synthetic event
/// with no counters attached) decodes to all-default records rather than
/// erroring — the time-lapse correction then sees an all-zero clock, which
/// is harmless since every `last_readout` entry starts at zero too.
pub fn decode_module_counters(blob: &[u8]) -> [ModuleCounters; N_MODULES] {
    let mut counters = [ModuleCounters::default(); N_MODULES];
    if blob.len() < N_MODULES * RECORD_SIZE {
        return counters;
    }
    for (module, record) in blob.chunks_exact(RECORD_SIZE).take(N_MODULES).enumerate() {
        counters[module] = ModuleCounters {
            pps_counter: u16::from_le_bytes(record[0..2].try_into().unwrap()),
            ten_mhz_counter: u32::from_le_bytes(record[2..6].try_into().unwrap()),
            event_counter: u32::from_le_bytes(record[6..10].try_into().unwrap()),
            trigger_counter: u32::from_le_bytes(record[10..14].try_into().unwrap()),
            local_clock_counter: u64::from_le_bytes(record[14..22].try_into().unwrap()),
        };
    }
    counters
}

/// Convenience wrapper over [`decode_module_counters`] for the one field the
/// time-lapse correction actually needs.
pub fn decode_module_clock_counters(blob: &[u8]) -> [u64; N_MODULES] {
    let mut clocks = [0u64; N_MODULES];
    for (module, counters) in decode_module_counters(blob).iter().enumerate() {
        clocks[module] = counters.local_clock_counter;
    }
    clocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_blob_decodes_to_all_zero_clocks() {
        let clocks = decode_module_clock_counters(&[]);
        assert!(clocks.iter().all(|&c| c == 0));
    }

    #[test]
    fn decodes_local_clock_counter_per_module() {
        let mut blob = vec![0u8; N_MODULES * RECORD_SIZE];
        blob[14..22].copy_from_slice(&42u64.to_le_bytes());
        blob[RECORD_SIZE + 14..RECORD_SIZE + 22].copy_from_slice(&99u64.to_le_bytes());
        let clocks = decode_module_clock_counters(&blob);
        assert_eq!(clocks[0], 42);
        assert_eq!(clocks[1], 99);
        assert_eq!(clocks[2], 0);
    }
}
