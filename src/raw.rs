//! Contract between this crate and the wire-format reader that decodes the
//! zfits/protobuf event stream.
//!
//! Parsing the on-disk format is explicitly out of scope; a caller hands us
//! something that implements [`RawEventSource`] and everything else in the
//! crate runs against these plain-data shapes instead of a specific decoder.
use std::path::PathBuf;

/// The single camera configuration record expected once per run.
#[derive(Clone, Debug, PartialEq)]
pub struct RawCameraConfig {
    pub configuration_id: u64,
    pub run_id: u32,
    pub num_modules: usize,
    pub expected_pixels_id: Vec<u32>,
    pub idaq_version: u32,
    pub data_model_version: String,
}

impl RawCameraConfig {
    /// A zeroed config, useful as a base for test fixtures.
    pub fn empty() -> Self {
        RawCameraConfig {
            configuration_id: 0,
            run_id: 0,
            num_modules: 0,
            expected_pixels_id: Vec::new(),
            idaq_version: 0,
            data_model_version: String::new(),
        }
    }
}

/// UCTS ("UnifieD Central Timing System") timestamp and status record, laid
/// out differently depending on `idaq_version` (see
/// [`RawUctsRecord::is_modern`]).
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RawUctsRecord {
    pub timestamp: u64,
    pub address: u32,
    pub event_counter: u32,
    pub busy_counter: u32,
    pub pps_counter: u32,
    pub clock_counter: u32,
    pub trigger_type: u8,
    pub white_rabbit_status: u8,
    pub stereo_pattern: u8,
    pub num_in_bunch: u8,
    pub cdts_version: u32,
}

/// TIB ("Trigger Interface Board") record.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct RawTibRecord {
    pub event_counter: u32,
    pub pps_counter: u16,
    pub tenMHz_counter: u32,
    pub stereo_pattern: u8,
    pub mask_hits: u8,
    pub trigger_type: u8,
}

/// SWAT ("Slow control Waveform Acquisition Trigger") record.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct RawSwatRecord {
    pub assigned_event_id: u64,
    pub trigger_request_time: u64,
    pub trigger_type: u8,
}

/// One raw event as handed to us by the wire-format reader, already
/// decoded out of protobuf but still in hardware pixel/module order.
#[derive(Clone, Debug)]
pub struct RawEvent {
    pub event_id: u64,
    pub run_id: u32,
    pub tel_event_id: u64,
    pub trigger_type: u16,
    pub local_run_id: u32,

    /// Hardware-order waveform samples, high gain then low gain.
    pub waveform: Vec<u16>,
    /// Hardware-order `first_capacitor_id`, one per module channel.
    pub first_capacitor_id: Vec<u16>,
    /// Hardware-order per-pixel status byte.
    pub pixel_status: Vec<u8>,
    /// Raw Dragon front-end counters blob, passed through untouched.
    pub dragon_counters: Vec<u8>,
    pub drs_tag_status: Vec<u8>,
    pub chips_flags: Vec<u8>,

    pub extdevices_presence: u8,
    pub tib: Option<RawTibRecord>,
    pub ucts: Option<RawUctsRecord>,
    pub swat: Option<RawSwatRecord>,

    pub configuration_id: u64,
    pub ped_id: u64,
}

impl RawEvent {
    /// A zeroed event with empty buffers, useful as a base for test
    /// fixtures (`RawEvent { event_id: 7, ..RawEvent::empty() }`).
    pub fn empty() -> Self {
        RawEvent {
            event_id: 0,
            run_id: 0,
            tel_event_id: 0,
            trigger_type: 0,
            local_run_id: 0,
            waveform: Vec::new(),
            first_capacitor_id: Vec::new(),
            pixel_status: Vec::new(),
            dragon_counters: Vec::new(),
            drs_tag_status: Vec::new(),
            chips_flags: Vec::new(),
            extdevices_presence: 0,
            tib: None,
            ucts: None,
            swat: None,
            configuration_id: 0,
            ped_id: 0,
        }
    }
}

/// A single open input file (or equivalent handle) feeding the
/// [`crate::multistream::MultiStream`] merger.
///
/// Implemented by the wire-format reader this crate consumes; this crate
/// never parses the zfits/protobuf container itself.
pub trait RawEventSource {
    /// Returns the camera configuration record, if this input carries one.
    /// Most implementations only find it on the very first call.
    fn camera_config(&mut self) -> Option<RawCameraConfig>;
    /// Pulls the next event from this input in on-disk order, or `None`
    /// once exhausted.
    fn next_event(&mut self) -> Option<RawEvent>;
    /// Resets this input back to its first event.
    fn rewind(&mut self);
    /// Total number of events in this input.
    fn len(&self) -> usize;
    /// `true` if this input has no events at all.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Discovers every subrun file belonging to a run from a representative
/// path, following the `<stream>Run<run>.<subrun>.fits.fz` naming
/// convention.
///
/// This crate does not open these files itself — it only knows the naming
/// scheme used to find them, so a caller can hand the resulting paths to
/// whatever `RawEventSource` implementation backs the wire format.
pub fn discover_subrun_paths(first_path: &std::path::Path) -> Vec<PathBuf> {
    let Some(file_name) = first_path.file_name().and_then(|n| n.to_str()) else {
        return vec![first_path.to_path_buf()];
    };
    let Some(run_marker) = file_name.find("Run") else {
        return vec![first_path.to_path_buf()];
    };
    let prefix = &file_name[..run_marker + 3];
    let Some(dot_after_run) = file_name[run_marker + 3..].find('.') else {
        return vec![first_path.to_path_buf()];
    };
    let run_number = &file_name[run_marker + 3..run_marker + 3 + dot_after_run];
    let pattern_prefix = format!("{}{}.", prefix, run_number);

    let dir = first_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let mut matches: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&pattern_prefix) && n.ends_with(".fits.fz"))
                    .unwrap_or(false)
            })
            .collect(),
        Err(_) => vec![first_path.to_path_buf()],
    };
    matches.sort();
    if matches.is_empty() {
        vec![first_path.to_path_buf()]
    } else {
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_event_has_empty_buffers() {
        let event = RawEvent::empty();
        assert!(event.waveform.is_empty());
        assert_eq!(event.event_id, 0);
    }

    #[test]
    fn discover_subrun_paths_falls_back_to_single_file_without_run_marker() {
        let path = PathBuf::from("/tmp/not_a_run_file.fits.fz");
        let found = discover_subrun_paths(&path);
        assert_eq!(found, vec![path]);
    }
}
