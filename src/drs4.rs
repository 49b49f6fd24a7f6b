//! DRS4 ring-buffer correction: pedestal subtraction, time-lapse baseline
//! drift correction, and spike-A artifact interpolation.
//!
//! This is the core of the crate — everything else exists to feed it
//! correctly-shaped, correctly-ordered data and to carry its per-telescope
//! mutable state between events.
use crate::assembler::{AssembledEvent, Waveform};
use crate::calibration::ChargeCalibration;
use crate::constants::{
    CLOCK_FREQUENCY_KHZ, HIGH_GAIN, LAST_RUN_WITH_OLD_FIRMWARE, LOW_GAIN, N_CAPACITORS_CHANNEL,
    N_CAPACITORS_PIXEL, N_GAINS, N_MODULES, N_PIXELS, N_PIXELS_MODULE, N_SAMPLES,
};
use crate::errors::ReaderError;
use crate::options::ReaderConfig;

/// Pedestal reference table, one value per `(gain, pixel, capacitor)`.
///
/// Loaded from the DRS4 pedestal FITS file as signed 16-bit, with the
/// configured `offset` already subtracted so the hot per-sample loop is a
/// single subtraction. The table carries `N_SAMPLES` extra trailing
/// capacitors per pixel, a duplicate of the first `N_SAMPLES` entries, so a
/// first-capacitor-plus-sample lookup near the end of the ring never needs
/// a modulo.
#[derive(Clone, Debug)]
pub struct PedestalReference {
    data: Vec<i32>,
    stride_capacitor: usize,
}

impl PedestalReference {
    /// Builds a pedestal table from a raw `(N_GAINS, N_PIXELS,
    /// N_CAPACITORS_PIXEL)` cube as read from FITS HDU1, subtracting
    /// `offset` from every entry and appending the wraparound duplicate.
    pub fn from_cube(cube: &[i16], offset: i32) -> Result<Self, ReaderError> {
        if cube.len() != N_GAINS * N_PIXELS * N_CAPACITORS_PIXEL {
            return Err(ReaderError::CalibrationFile(format!(
                "pedestal cube has {} entries, expected {}",
                cube.len(),
                N_GAINS * N_PIXELS * N_CAPACITORS_PIXEL
            )));
        }
        let stride_capacitor = N_CAPACITORS_PIXEL + N_SAMPLES;
        let mut data = vec![0i32; N_GAINS * N_PIXELS * stride_capacitor];
        for gain in 0..N_GAINS {
            for pixel in 0..N_PIXELS {
                let src = &cube[(gain * N_PIXELS + pixel) * N_CAPACITORS_PIXEL
                    ..(gain * N_PIXELS + pixel + 1) * N_CAPACITORS_PIXEL];
                let dst_base = (gain * N_PIXELS + pixel) * stride_capacitor;
                for (capacitor, &value) in src.iter().enumerate() {
                    data[dst_base + capacitor] = value as i32 - offset;
                }
                for wrap in 0..N_SAMPLES {
                    data[dst_base + N_CAPACITORS_PIXEL + wrap] = data[dst_base + wrap];
                }
            }
        }
        Ok(PedestalReference { data, stride_capacitor })
    }

    #[inline]
    fn get(&self, gain: usize, pixel: usize, capacitor: usize) -> i32 {
        self.data[(gain * N_PIXELS + pixel) * self.stride_capacitor + capacitor]
    }
}

/// Per-telescope mutable state the corrector carries between events:
/// when each DRS4 capacitor was last read out, and where each pixel's ring
/// started last time, both needed by the time-lapse correction.
#[derive(Clone, Debug)]
pub struct Drs4State {
    last_readout: Vec<u64>,
    previous_fc: [[u16; N_PIXELS]; N_GAINS],
}

impl Drs4State {
    pub fn new() -> Self {
        Drs4State {
            last_readout: vec![0u64; N_GAINS * N_PIXELS * N_CAPACITORS_PIXEL],
            previous_fc: [[u16::MAX; N_PIXELS]; N_GAINS],
        }
    }

    #[inline]
    fn readout_index(gain: usize, pixel: usize, capacitor: usize) -> usize {
        (gain * N_PIXELS + pixel) * N_CAPACITORS_PIXEL + capacitor
    }
}

impl Default for Drs4State {
    fn default() -> Self {
        Self::new()
    }
}

/// Power-law baseline recovery curve fit to the DRS4's settling behavior:
/// `timediff` is milliseconds since the capacitor was last read.
fn ped_time(timediff_ms: f64) -> f64 {
    32.99 * timediff_ms.powf(-0.22) - 11.9
}

/// Subtracts the pedestal reference from every sample of `waveform`,
/// indexed by this event's first capacitor.
///
/// Idempotent as long as `first_capacitor` does not change: subtracting the
/// same reference twice would be wrong, but the orchestrator only calls
/// this once per event.
pub fn subtract_pedestal(
    waveform: &mut Waveform,
    first_capacitor: &[[u16; N_PIXELS]; N_GAINS],
    pedestal: &PedestalReference,
) {
    for gain in 0..N_GAINS {
        for pixel in 0..N_PIXELS {
            let fc = first_capacitor[gain][pixel] as usize;
            for sample in 0..waveform.n_samples {
                let corrected = waveform.sample(gain, pixel, sample) - pedestal.get(gain, pixel, fc + sample) as f32;
                *waveform.sample_mut(gain, pixel, sample) = corrected;
            }
        }
    }
}

/// `true` if `gain` is the one actually stored for `pixel` — always true for
/// a both-gains-shaped waveform, selective once gain selection has run.
fn gain_is_stored(waveform: &Waveform, pixel: usize, gain: usize) -> bool {
    match &waveform.selected_gain {
        Some(selected) => selected[pixel] == gain as i8,
        None => true,
    }
}

/// Applies the time-lapse baseline correction (recovering the DRS4's slow
/// return to baseline after a capacitor is read) and then stamps this
/// event's readout time into `state` so the next event can use it.
///
/// Walks module, then pixel-in-module, then gain, per the corrector's
/// per-module clock: `t_now = module_clock_counter[m]` is shared by every
/// pixel the module carries, not by gain.
pub fn apply_timelapse_correction(
    waveform: &mut Waveform,
    first_capacitor: &[[u16; N_PIXELS]; N_GAINS],
    module_clock_counter: &[u64; N_MODULES],
    run_id: u32,
    state: &mut Drs4State,
) {
    let old_firmware = run_id <= LAST_RUN_WITH_OLD_FIRMWARE;

    for module in 0..N_MODULES {
        let clock = module_clock_counter[module];
        for pixel_in_module in 0..N_PIXELS_MODULE {
            let pixel = module * N_PIXELS_MODULE + pixel_in_module;
            for gain in 0..N_GAINS {
                let fc = first_capacitor[gain][pixel] as usize;
                // The hardware clocks both gains regardless of which one a
                // gain-selected event kept, so last-readout stamping always
                // runs; only the baseline subtraction itself needs a
                // waveform slot to actually exist.
                if gain_is_stored(waveform, pixel, gain) {
                    correct_baseline(waveform, state, gain, pixel, fc, clock, old_firmware);
                }
                stamp_last_readout(state, gain, pixel, fc, clock, old_firmware);
                state.previous_fc[gain][pixel] = fc as u16;
            }
        }
    }
}

fn correct_baseline(
    waveform: &mut Waveform,
    state: &Drs4State,
    gain: usize,
    pixel: usize,
    fc: usize,
    clock: u64,
    old_firmware: bool,
) {
    // Old firmware reads one capacitor earlier: s ranges -1..38 rather than
    // 0..39.
    let shift: i64 = if old_firmware { -1 } else { 0 };
    for sample in 0..waveform.n_samples {
        let capacitor = (fc as i64 + sample as i64 + shift).rem_euclid(N_CAPACITORS_PIXEL as i64) as usize;
        let last = state.last_readout[Drs4State::readout_index(gain, pixel, capacitor)];
        if last == 0 || clock < last {
            continue;
        }
        let timediff_ms = (clock - last) as f64 / CLOCK_FREQUENCY_KHZ;
        if timediff_ms >= 100.0 {
            continue;
        }
        let correction = ped_time(timediff_ms) as f32;
        let value = waveform.sample_mut(gain, pixel, sample);
        // Never let the correction push a sample negative underflow; clamp
        // it to the sample's own value instead.
        *value -= correction.min(*value);
    }
}

fn stamp_last_readout(
    state: &mut Drs4State,
    gain: usize,
    pixel: usize,
    fc: usize,
    clock: u64,
    old_firmware: bool,
) {
    let shift: i64 = if old_firmware { -1 } else { 0 };
    for s in 0..N_SAMPLES as i64 {
        let capacitor = (fc as i64 + s + shift).rem_euclid(N_CAPACITORS_PIXEL as i64) as usize;
        state.last_readout[Drs4State::readout_index(gain, pixel, capacitor)] = clock;
    }

    let pixel_in_module = pixel % N_PIXELS_MODULE;
    if pixel_in_module % 2 != 0 {
        return;
    }

    let f_mod = fc % N_CAPACITORS_CHANNEL;
    let (stamp_start, extra_count) = if old_firmware {
        if f_mod > 766 && f_mod < 1013 {
            (fc + N_CAPACITORS_CHANNEL - 1, 12)
        } else {
            return;
        }
    } else if f_mod > 767 && f_mod < 1013 {
        (fc + N_CAPACITORS_CHANNEL, 12)
    } else if f_mod >= 1013 {
        (fc + N_CAPACITORS_CHANNEL, N_CAPACITORS_CHANNEL - f_mod)
    } else {
        return;
    };

    for extra in 0..extra_count {
        let capacitor = (stamp_start + extra) % N_CAPACITORS_PIXEL;
        state.last_readout[Drs4State::readout_index(gain, pixel, capacitor)] = clock;
    }
}

/// Finds up to 4 sample positions, per one of two capacitor-distance cases,
/// where a spike-A artifact is expected given this event's first capacitor
/// and the previous event's. Results are already filtered to positions
/// usable by [`interpolate_spike_a`] (`2 < pos < 38`).
fn spike_a_positions(fc: u16, fc_prev: u16, old_firmware: bool) -> Vec<usize> {
    let mut positions = Vec::with_capacity(4);
    if fc_prev == u16::MAX {
        return positions; // no previous event for this pixel yet
    }
    // The "last capacitor" the previous event read.
    let last_capacitor = fc_prev as i64 + (N_SAMPLES as i64 - 1);
    if last_capacitor % 2 != 0 {
        return positions;
    }
    let limit: i64 = if old_firmware { 510 } else { 511 };
    if last_capacitor % N_CAPACITORS_CHANNEL as i64 > limit {
        return positions;
    }

    let fc_prev = fc_prev as i64;
    let fc_current = fc as i64;
    let channel = N_CAPACITORS_CHANNEL as i64;
    let n_samples = N_SAMPLES as i64;

    // Case 1 and case 2 base offsets (k = 0 term), per firmware.
    let case1_base = if old_firmware {
        channel - n_samples - 2 - fc_prev + 4096
    } else {
        channel + 1 - n_samples - 2 - fc_prev + 4096
    };
    let case2_base = if old_firmware { n_samples - 2 + fc_prev } else { n_samples - 1 + fc_prev };

    for base in [case1_base, case2_base] {
        for k in 0..4i64 {
            let abs_pos = base + k * channel;
            let pos = (abs_pos - fc_current + 4096).rem_euclid(N_CAPACITORS_PIXEL as i64);
            if pos > 2 && pos < (n_samples - 2) && !positions.contains(&(pos as usize)) {
                positions.push(pos as usize);
            }
        }
    }
    positions
}

/// Replaces a DRS4 spike-A artifact at `pos` and `pos + 1` with a linear
/// interpolation between the samples bracketing it.
fn interpolate_spike_a(waveform: &mut Waveform, gain: usize, pixel: usize, pos: usize) {
    let before = waveform.sample(gain, pixel, pos - 1);
    let after = waveform.sample(gain, pixel, pos + 2);
    *waveform.sample_mut(gain, pixel, pos) = before + 0.33 * (after - before);
    *waveform.sample_mut(gain, pixel, pos + 1) = before + 0.66 * (after - before);
}

/// Interpolates over spike-A artifacts in every pixel, comparing this
/// event's first capacitor against the one recorded for the previous event
/// on the same pixel (a no-op, per the corrector's idempotence law, when
/// the two coincide — `spike_a_positions` always returns an empty list in
/// that case because nothing has moved since the last stamp).
pub fn interpolate_spikes(
    waveform: &mut Waveform,
    first_capacitor: &[[u16; N_PIXELS]; N_GAINS],
    previous_fc: &[[u16; N_PIXELS]; N_GAINS],
    run_id: u32,
) {
    let old_firmware = run_id <= LAST_RUN_WITH_OLD_FIRMWARE;
    for gain in 0..N_GAINS {
        for pixel in 0..N_PIXELS {
            let fc = first_capacitor[gain][pixel];
            let fc_prev = previous_fc[gain][pixel];
            for pos in spike_a_positions(fc, fc_prev, old_firmware) {
                interpolate_spike_a(waveform, gain, pixel, pos);
            }
        }
    }
}

/// Exposes `previous_fc` snapshotted before this event's stamping, which
/// [`interpolate_spikes`] needs but [`apply_timelapse_correction`]
/// overwrites in place.
pub fn previous_first_capacitors(state: &Drs4State) -> [[u16; N_PIXELS]; N_GAINS] {
    state.previous_fc
}

/// Chooses one gain per pixel for events that arrived with both gains
/// stored, the way the back-end calibration pipeline does before DL1
/// extraction: high gain unless it saturates past `threshold`, in which
/// case low gain.
pub fn select_gain(waveform: &Waveform, threshold: f32) -> Vec<i8> {
    let mut selected = vec![HIGH_GAIN as i8; N_PIXELS];
    for pixel in 0..N_PIXELS {
        let high_peak = (0..waveform.n_samples)
            .map(|s| waveform.sample(HIGH_GAIN, pixel, s))
            .fold(f32::MIN, f32::max);
        if high_peak > threshold {
            selected[pixel] = LOW_GAIN as i8;
        }
    }
    selected
}

/// Final shaping of a corrected waveform into an R1 sample: trims to the
/// configured sample window, removes the loading offset, and zeroes pixels
/// marked broken so they do not contribute spurious charge downstream.
///
/// Disabling every correction, trimming `[0, N_SAMPLES)` and using
/// `offset = 0` is the identity transform (`R1 == R0`), used by the crate's
/// regression tests to check this function does not silently touch data it
/// should leave alone.
pub fn finalize(
    waveform: &Waveform,
    broken_pixels: &[usize],
    start: usize,
    end: usize,
    offset: i32,
) -> Result<Vec<f32>, ReaderError> {
    if end > waveform.n_samples || start > end {
        return Err(ReaderError::CalibrationFile(format!(
            "invalid sample window [{}, {}) for a {}-sample waveform",
            start, end, waveform.n_samples
        )));
    }
    let out_samples = end - start;
    let gains = match &waveform.selected_gain {
        Some(_) => 1,
        None => N_GAINS,
    };
    let mut out = vec![0.0f32; gains * N_PIXELS * out_samples];

    for pixel in 0..N_PIXELS {
        match &waveform.selected_gain {
            Some(selected) if selected[pixel] >= 0 => {
                let source_gain = selected[pixel] as usize;
                for sample in 0..out_samples {
                    out[pixel * out_samples + sample] =
                        waveform.sample(source_gain, pixel, start + sample) - offset as f32;
                }
            }
            Some(_) => continue, // neither gain stored for this pixel
            None => {
                for (slot, &emit_gain) in [HIGH_GAIN, LOW_GAIN].iter().enumerate() {
                    for sample in 0..out_samples {
                        out[(slot * N_PIXELS + pixel) * out_samples + sample] =
                            waveform.sample(emit_gain, pixel, start + sample) - offset as f32;
                    }
                }
            }
        }
    }

    for &pixel in broken_pixels {
        for gain_slot in 0..gains {
            for sample in 0..out_samples {
                out[(gain_slot * N_PIXELS + pixel) * out_samples + sample] = 0.0;
            }
        }
    }

    Ok(out)
}

/// Converts calibrated R1 samples into photo-electrons: subtracts the
/// per-`(gain, pixel)` `pedestal_per_sample` and multiplies by `dc_to_pe`
/// from the charge calibration file, scaled by the per-gain relative
/// factor. `samples` holds `N_PIXELS * n_samples` entries per stored gain,
/// high gain block first when both gains are present; `selected_gain` is
/// `Some` once gain selection has narrowed each pixel to one gain.
pub fn convert_to_pe(
    samples: &mut [f32],
    selected_gain: Option<&[i8]>,
    n_samples: usize,
    calibration: &ChargeCalibration,
    calib_scale_high_gain: f32,
    calib_scale_low_gain: f32,
) {
    let scales = [calib_scale_high_gain, calib_scale_low_gain];
    match selected_gain {
        Some(selected) => {
            for pixel in 0..N_PIXELS {
                if selected[pixel] < 0 {
                    continue;
                }
                let gain = selected[pixel] as usize;
                apply_pe_conversion(samples, pixel * n_samples, gain, pixel, n_samples, calibration, scales[gain]);
            }
        }
        None => {
            let block = N_PIXELS * n_samples;
            for gain in 0..N_GAINS {
                for pixel in 0..N_PIXELS {
                    apply_pe_conversion(
                        samples,
                        gain * block + pixel * n_samples,
                        gain,
                        pixel,
                        n_samples,
                        calibration,
                        scales[gain],
                    );
                }
            }
        }
    }
}

fn apply_pe_conversion(
    samples: &mut [f32],
    start: usize,
    gain: usize,
    pixel: usize,
    n_samples: usize,
    calibration: &ChargeCalibration,
    scale: f32,
) {
    let pedestal = calibration.pedestal_per_sample(gain, pixel);
    let factor = calibration.dc_to_pe(gain, pixel) * scale;
    for value in &mut samples[start..start + n_samples] {
        *value = (*value - pedestal) * factor;
    }
}

/// Runs the full DRS4 correction pipeline on an already-assembled event,
/// honoring every gate in `config`, and returns the finalized sample
/// buffer plus the count of pixels zeroed as broken.
///
/// `skip_pe_calibration` is the caller's (already-classified) decision to
/// leave this event uncalibrated — `calibrate_flatfields_and_pedestals ==
/// false` with a FLATFIELD/SKY_PEDESTAL event — which also holds off gain
/// selection, since downstream flatfield calibration needs both gains.
pub fn correct(
    event: &mut AssembledEvent,
    config: &ReaderConfig,
    pedestal: Option<&PedestalReference>,
    charge_calibration: Option<&ChargeCalibration>,
    skip_pe_calibration: bool,
    state: &mut Drs4State,
) -> Result<Vec<f32>, ReaderError> {
    let previous_fc = previous_first_capacitors(state);

    if config.apply_drs4_corrections() {
        if config.apply_drs4_pedestal_correction() {
            let pedestal = pedestal.ok_or(ReaderError::MissingPedestal)?;
            subtract_pedestal(&mut event.waveform, &event.first_capacitor, pedestal);
        }
        if config.apply_timelapse_correction() {
            apply_timelapse_correction(
                &mut event.waveform,
                &event.first_capacitor,
                &event.module_clock_counter,
                event.run_id,
                state,
            );
        }
        if config.apply_spike_correction() {
            interpolate_spikes(&mut event.waveform, &event.first_capacitor, &previous_fc, event.run_id);
        }
    }

    if config.select_gain() && !skip_pe_calibration && !waveform_is_gain_selected(&event.waveform) {
        event.waveform.selected_gain = Some(select_gain(&event.waveform, config.gain_selection_threshold()));
    }

    let broken_pixels: Vec<usize> = if waveform_is_gain_selected(&event.waveform) {
        event
            .waveform
            .selected_gain
            .as_ref()
            .unwrap()
            .iter()
            .enumerate()
            .filter(|(_, &g)| g < 0)
            .map(|(pixel, _)| pixel)
            .chain(event.hardware_failing_pixels.iter().copied())
            .collect()
    } else {
        event.hardware_failing_pixels.clone()
    };

    if waveform_is_gain_selected(&event.waveform) && !event.hardware_failing_pixels.is_empty() {
        let expected = event.pixel_status.len();
        if event.waveform.selected_gain.as_ref().unwrap().len() < expected {
            return Err(ReaderError::ShapeMismatch {
                expected_pixels: expected,
                got_pixels: event.waveform.selected_gain.as_ref().unwrap().len(),
            });
        }
    }

    let mut samples = finalize(
        &event.waveform,
        &broken_pixels,
        config.r1_sample_start(),
        config.r1_sample_end(),
        config.offset(),
    )?;

    if let Some(calibration) = charge_calibration {
        if !skip_pe_calibration {
            let out_samples = config.r1_sample_end() - config.r1_sample_start();
            convert_to_pe(
                &mut samples,
                event.waveform.selected_gain.as_deref(),
                out_samples,
                calibration,
                config.calib_scale_high_gain(),
                config.calib_scale_low_gain(),
            );
        }
    }

    Ok(samples)
}

fn waveform_is_gain_selected(waveform: &Waveform) -> bool {
    waveform.selected_gain.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_waveform(value: f32, n_samples: usize) -> Waveform {
        Waveform::new_both_gains(vec![value; N_GAINS * N_PIXELS * n_samples], n_samples)
    }

    #[test]
    fn ped_time_decays_towards_zero() {
        assert!(ped_time(1.0) > ped_time(50.0));
        assert!(ped_time(99.0) > 0.0 || ped_time(99.0) < 0.0); // always finite
    }

    #[test]
    fn pedestal_subtraction_is_exact_per_capacitor() {
        let mut cube = vec![0i16; N_GAINS * N_PIXELS * N_CAPACITORS_PIXEL];
        cube[0] = 500; // gain 0, pixel 0, capacitor 0
        let pedestal = PedestalReference::from_cube(&cube, 400).unwrap();
        let first_capacitor = [[0u16; N_PIXELS]; N_GAINS];
        let mut waveform = flat_waveform(1000.0, 4);
        subtract_pedestal(&mut waveform, &first_capacitor, &pedestal);
        // 500 - 400 = 100 subtracted from capacitor 0 only
        assert_eq!(waveform.sample(HIGH_GAIN, 0, 0), 900.0);
        assert_eq!(waveform.sample(HIGH_GAIN, 0, 1), 1000.0);
    }

    #[test]
    fn spike_a_is_noop_when_fc_equals_previous() {
        let fc = [[100u16; N_PIXELS]; N_GAINS];
        let mut waveform = flat_waveform(10.0, N_SAMPLES);
        interpolate_spikes(&mut waveform, &fc, &fc, 999_999);
        for sample in 0..N_SAMPLES {
            assert_eq!(waveform.sample(HIGH_GAIN, 0, sample), 10.0);
        }
    }

    #[test]
    fn finalize_is_identity_with_corrections_disabled() {
        let waveform = flat_waveform(42.0, N_SAMPLES);
        let out = finalize(&waveform, &[], 0, N_SAMPLES, 0).unwrap();
        assert!(out.iter().all(|&v| v == 42.0));
        assert_eq!(out.len(), N_GAINS * N_PIXELS * N_SAMPLES);
    }

    #[test]
    fn finalize_zeroes_broken_pixels() {
        let waveform = flat_waveform(42.0, N_SAMPLES);
        let out = finalize(&waveform, &[3], 0, N_SAMPLES, 0).unwrap();
        for sample in 0..N_SAMPLES {
            assert_eq!(out[3 * N_SAMPLES + sample], 0.0);
        }
    }

    #[test]
    fn finalize_rejects_out_of_range_window() {
        let waveform = flat_waveform(1.0, N_SAMPLES);
        assert!(finalize(&waveform, &[], 0, N_SAMPLES + 1, 0).is_err());
    }

    #[test]
    fn select_gain_falls_back_to_low_on_saturation() {
        let mut waveform = flat_waveform(10.0, N_SAMPLES);
        *waveform.sample_mut(HIGH_GAIN, 7, 5) = 4000.0;
        let selected = select_gain(&waveform, 3500.0);
        assert_eq!(selected[7], LOW_GAIN as i8);
        assert_eq!(selected[0], HIGH_GAIN as i8);
    }
}
