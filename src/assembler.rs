//! Turns a [`RawEvent`] into camera-pixel-ordered R0 waveforms plus decoded
//! external-device (TIB/UCTS/SWAT) records.
use crate::constants::{HIGH_GAIN, LOW_GAIN, N_GAINS, N_MODULES, N_PIXELS, N_SAMPLES};
use crate::counters::decode_module_clock_counters;
use crate::geometry::{expand_first_capacitors, reorder_to_logical_pixels};
use crate::raw::{RawCameraConfig, RawEvent, RawSwatRecord, RawTibRecord, RawUctsRecord};
use crate::trigger::PixelStatus;

/// `idaq_version` values above this boundary use the 11-field UCTS layout
/// instead of the legacy 7-field one.
const UCTS_MODERN_IDAQ_VERSION: u32 = 37201;

/// Bits of `extdevices_presence` that mark which external-device records
/// are attached to an event.
mod presence_bits {
    pub const TIB: u8 = 0b001;
    pub const UCTS: u8 = 0b010;
    pub const SWAT: u8 = 0b100;
}

/// Decoded external device records attached to an event, each `None` if its
/// presence bit was not set.
#[derive(Clone, Debug, Default)]
pub struct ExternalDevices {
    pub tib: Option<RawTibRecord>,
    pub ucts: Option<RawUctsRecord>,
    pub swat: Option<RawSwatRecord>,
}

/// Per-gain camera-ordered waveform, plus the gain-selection bookkeeping
/// needed by the corrector.
#[derive(Clone, Debug)]
pub struct Waveform {
    /// `[gain][pixel][sample]`, flattened as `gain * N_PIXELS * N_SAMPLES +
    /// pixel * N_SAMPLES + sample`. Always both-gains-shaped even for a
    /// gain-selected event; [`Waveform::selected_gain`] says which gain is
    /// meaningful per pixel in that case.
    pub samples: Vec<f32>,
    pub n_samples: usize,
    /// Set when the hardware has already chosen one gain per pixel rather
    /// than sending both. Entries are `0` (high), `1` (low) or `-1`
    /// (neither gain stored — a broken pixel).
    pub selected_gain: Option<Vec<i8>>,
}

impl Waveform {
    pub fn new_both_gains(samples: Vec<f32>, n_samples: usize) -> Self {
        Waveform { samples, n_samples, selected_gain: None }
    }

    pub fn sample(&self, gain: usize, pixel: usize, sample: usize) -> f32 {
        self.samples[(gain * N_PIXELS + pixel) * self.n_samples + sample]
    }

    pub fn sample_mut(&mut self, gain: usize, pixel: usize, sample: usize) -> &mut f32 {
        &mut self.samples[(gain * N_PIXELS + pixel) * self.n_samples + sample]
    }
}

/// A raw event reordered into logical camera-pixel order, with decoded
/// metadata. This is what the DRS4 corrector and the event-type classifier
/// operate on.
#[derive(Clone, Debug)]
pub struct AssembledEvent {
    pub event_id: u64,
    pub run_id: u32,
    pub tel_event_id: u64,
    /// Per-module hardware clock, decoded from the event's Dragon counters
    /// blob, used by the time-lapse correction's `t_now = local_clock_counter[m]`.
    pub module_clock_counter: [u64; N_MODULES],
    pub trigger_type: u16,

    pub waveform: Waveform,
    /// Per-gain, per-pixel first DRS4 capacitor, in logical pixel order.
    pub first_capacitor: [[u16; N_PIXELS]; N_GAINS],
    /// Per-pixel status byte, in logical pixel order.
    pub pixel_status: Vec<PixelStatus>,
    /// Logical pixel indices absent from `expected_pixels_id` for this
    /// event's modules.
    pub hardware_failing_pixels: Vec<usize>,

    pub extdevices: ExternalDevices,
    pub ped_id: u64,
}

/// Reorders `event`'s hardware-order buffers into logical pixel order using
/// `config.expected_pixels_id`, and decodes its external-device records.
///
/// Gain selection is detected the way the original fill routine does it:
/// if the stored sample count per pixel only covers one gain's worth of
/// bytes, we treat this as a "has high xor has low" per-pixel situation via
/// `pixel_status`, rather than the full `(2, N_PIXELS, N_SAMPLES)` both-gain
/// shape.
pub fn assemble(event: &RawEvent, config: &RawCameraConfig) -> AssembledEvent {
    let expected_pixels_id = &config.expected_pixels_id;
    let n_hw_pixels = expected_pixels_id.len();

    let (pixel_status, hardware_failing_pixels) = reorder_to_logical_pixels(
        &event.pixel_status,
        expected_pixels_id,
        0u8,
    );
    let pixel_status: Vec<PixelStatus> =
        pixel_status.into_iter().map(PixelStatus::from_bits_truncate).collect();

    let gain_selected = pixel_status
        .iter()
        .any(|status| status.has_high_gain_stored() != status.has_low_gain_stored());

    let waveform = if gain_selected {
        assemble_gain_selected_waveform(event, expected_pixels_id, &pixel_status)
    } else {
        assemble_both_gains_waveform(event, expected_pixels_id, n_hw_pixels)
    };

    let first_capacitor = expand_first_capacitors(&event.first_capacitor_id);

    let extdevices = decode_external_devices(event, config.idaq_version);

    AssembledEvent {
        event_id: event.event_id,
        run_id: event.run_id,
        tel_event_id: event.tel_event_id,
        module_clock_counter: decode_module_clock_counters(&event.dragon_counters),
        trigger_type: event.trigger_type,
        waveform,
        first_capacitor,
        pixel_status,
        hardware_failing_pixels,
        extdevices,
        ped_id: event.ped_id,
    }
}

fn assemble_both_gains_waveform(
    event: &RawEvent,
    expected_pixels_id: &[u32],
    n_hw_pixels: usize,
) -> Waveform {
    let n_samples = if n_hw_pixels == 0 {
        N_SAMPLES
    } else {
        event.waveform.len() / (N_GAINS * n_hw_pixels)
    };

    let mut samples = vec![0.0f32; N_GAINS * N_PIXELS * n_samples];
    for gain in 0..N_GAINS {
        let gain_slice = &event.waveform
            [gain * n_hw_pixels * n_samples..(gain + 1) * n_hw_pixels * n_samples];
        for (hw_pixel, &logical_pixel) in expected_pixels_id.iter().enumerate() {
            let logical_pixel = logical_pixel as usize;
            for sample in 0..n_samples {
                samples[(gain * N_PIXELS + logical_pixel) * n_samples + sample] =
                    gain_slice[hw_pixel * n_samples + sample] as f32;
            }
        }
    }
    Waveform::new_both_gains(samples, n_samples)
}

fn assemble_gain_selected_waveform(
    event: &RawEvent,
    expected_pixels_id: &[u32],
    pixel_status: &[PixelStatus],
) -> Waveform {
    let n_hw_pixels = expected_pixels_id.len();
    let n_samples = if n_hw_pixels == 0 { N_SAMPLES } else { event.waveform.len() / n_hw_pixels.max(1) };

    let mut samples = vec![0.0f32; N_GAINS * N_PIXELS * n_samples];
    let mut selected_gain = vec![-1i8; N_PIXELS];

    for (hw_pixel, &logical_pixel) in expected_pixels_id.iter().enumerate() {
        let logical_pixel = logical_pixel as usize;
        let status = pixel_status[logical_pixel];
        let gain = if status.has_high_gain_stored() {
            HIGH_GAIN
        } else if status.has_low_gain_stored() {
            LOW_GAIN
        } else {
            continue;
        };
        selected_gain[logical_pixel] = gain as i8;
        for sample in 0..n_samples {
            samples[(gain * N_PIXELS + logical_pixel) * n_samples + sample] =
                event.waveform[hw_pixel * n_samples + sample] as f32;
        }
    }

    Waveform { samples, n_samples, selected_gain: Some(selected_gain) }
}

fn decode_external_devices(event: &RawEvent, idaq_version: u32) -> ExternalDevices {
    let mut devices = ExternalDevices::default();
    if event.extdevices_presence & presence_bits::TIB != 0 {
        devices.tib = event.tib;
    }
    if event.extdevices_presence & presence_bits::UCTS != 0 {
        devices.ucts = event.ucts.clone().map(|ucts| normalize_ucts(ucts, idaq_version));
    }
    if event.extdevices_presence & presence_bits::SWAT != 0 {
        devices.swat = event.swat;
    }
    devices
}

/// The wire-format reader already fills in every field of `RawUctsRecord`
/// regardless of layout; this only drops fields that do not exist in the
/// legacy (pre-37201) 7-field layout, so downstream code can tell whether
/// `white_rabbit_status`/`stereo_pattern`/`num_in_bunch`/`cdts_version` are
/// meaningful.
fn normalize_ucts(mut ucts: RawUctsRecord, idaq_version: u32) -> RawUctsRecord {
    if idaq_version <= UCTS_MODERN_IDAQ_VERSION {
        ucts.white_rabbit_status = 0;
        ucts.stereo_pattern = 0;
        ucts.num_in_bunch = 0;
        ucts.cdts_version = 0;
    }
    ucts
}

/// `true` if the event's `idaq_version` uses the modern 11-field UCTS
/// layout.
pub fn is_modern_ucts_layout(idaq_version: u32) -> bool {
    idaq_version > UCTS_MODERN_IDAQ_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_pixels(n: u32) -> RawCameraConfig {
        RawCameraConfig {
            expected_pixels_id: (0..n).collect(),
            idaq_version: 40000,
            ..RawCameraConfig::empty()
        }
    }

    #[test]
    fn both_gains_event_reorders_into_logical_pixels() {
        let n_hw_pixels = 3u32;
        let n_samples = 2;
        let config = config_with_pixels(n_hw_pixels);
        let mut waveform = vec![0u16; 2 * n_hw_pixels as usize * n_samples];
        // high gain, hw pixel 0, sample 0
        waveform[0] = 111;
        let event = RawEvent {
            waveform,
            pixel_status: vec![PixelStatus::BOTH_GAINS_STORED.bits(); n_hw_pixels as usize],
            first_capacitor_id: vec![0u16; crate::constants::N_MODULES * crate::constants::N_CHANNELS_MODULE],
            ..RawEvent::empty()
        };
        let assembled = assemble(&event, &config);
        assert_eq!(assembled.waveform.sample(HIGH_GAIN, 0, 0), 111.0);
        assert!(assembled.hardware_failing_pixels.len() > 0);
    }

    #[test]
    fn gain_selected_detected_when_hi_xor_lo() {
        let n_hw_pixels = 1u32;
        let config = config_with_pixels(n_hw_pixels);
        let event = RawEvent {
            waveform: vec![50u16; 40],
            pixel_status: vec![PixelStatus::HIGH_GAIN_STORED.bits()],
            first_capacitor_id: vec![0u16; crate::constants::N_MODULES * crate::constants::N_CHANNELS_MODULE],
            ..RawEvent::empty()
        };
        let assembled = assemble(&event, &config);
        assert!(assembled.waveform.selected_gain.is_some());
        let selected = assembled.waveform.selected_gain.unwrap();
        assert_eq!(selected[0], HIGH_GAIN as i8);
    }

    #[test]
    fn legacy_idaq_version_is_not_modern_ucts() {
        assert!(!is_modern_ucts_layout(30000));
        assert!(is_modern_ucts_layout(40000));
    }
}
