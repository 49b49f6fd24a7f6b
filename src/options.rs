//! Runtime configuration for the reader, with a builder-style API.
//!
//! Mirrors the knobs exposed by the original event source's constructor
//! keyword arguments. Every field has a default matching the original's
//! behavior; callers only need to touch the ones they want to change.
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_GAIN_SELECTION_THRESHOLD, DEFAULT_MAX_FLATFIELD_ADC, DEFAULT_MIN_FLATFIELD_ADC,
    DEFAULT_MIN_FLATFIELD_PIXEL_FRACTION, DEFAULT_OFFSET, DEFAULT_R1_SAMPLE_END,
    DEFAULT_R1_SAMPLE_START,
};
use crate::trigger::TriggerType;

/// Configuration controlling how raw events are turned into calibrated
/// waveforms.
///
/// Construct with [`ReaderConfig::new`] and adjust fields with the `set_*`
/// methods, which take `&mut self` and return it for chaining.
#[derive(Clone, Debug)]
pub struct ReaderConfig {
    apply_drs4_corrections: bool,
    apply_drs4_pedestal_correction: bool,
    apply_timelapse_correction: bool,
    apply_spike_correction: bool,
    offset: i32,
    r1_sample_start: usize,
    r1_sample_end: usize,
    select_gain: bool,
    gain_selection_threshold: f32,
    calib_scale_high_gain: f32,
    calib_scale_low_gain: f32,
    calibration_path: Option<PathBuf>,
    drs4_pedestal_path: Option<PathBuf>,
    drs4_time_calibration_path: Option<PathBuf>,
    default_trigger_type: TriggerType,
    use_flatfield_heuristic: bool,
    pedestal_ids_path: Option<PathBuf>,
    min_flatfield_adc: f32,
    max_flatfield_adc: f32,
    min_flatfield_pixel_fraction: f32,
    add_calibration_timeshift: bool,
    calibrate_flatfields_and_pedestals: bool,
    trigger_information: bool,
    pointing_information: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            apply_drs4_corrections: true,
            apply_drs4_pedestal_correction: true,
            apply_timelapse_correction: true,
            apply_spike_correction: true,
            offset: DEFAULT_OFFSET,
            r1_sample_start: DEFAULT_R1_SAMPLE_START,
            r1_sample_end: DEFAULT_R1_SAMPLE_END,
            select_gain: true,
            gain_selection_threshold: DEFAULT_GAIN_SELECTION_THRESHOLD,
            calib_scale_high_gain: 1.0,
            calib_scale_low_gain: 1.0,
            calibration_path: None,
            drs4_pedestal_path: None,
            drs4_time_calibration_path: None,
            default_trigger_type: TriggerType::UNKNOWN,
            use_flatfield_heuristic: true,
            pedestal_ids_path: None,
            min_flatfield_adc: DEFAULT_MIN_FLATFIELD_ADC,
            max_flatfield_adc: DEFAULT_MAX_FLATFIELD_ADC,
            min_flatfield_pixel_fraction: DEFAULT_MIN_FLATFIELD_PIXEL_FRACTION,
            add_calibration_timeshift: true,
            calibrate_flatfields_and_pedestals: true,
            trigger_information: true,
            pointing_information: true,
        }
    }
}

impl ReaderConfig {
    /// Returns a config with every field at its default value.
    pub fn new() -> ReaderConfig {
        ReaderConfig::default()
    }

    pub fn set_apply_drs4_corrections(&mut self, value: bool) -> &mut Self {
        self.apply_drs4_corrections = value;
        self
    }

    pub fn set_apply_drs4_pedestal_correction(&mut self, value: bool) -> &mut Self {
        self.apply_drs4_pedestal_correction = value;
        self
    }

    pub fn set_apply_timelapse_correction(&mut self, value: bool) -> &mut Self {
        self.apply_timelapse_correction = value;
        self
    }

    pub fn set_apply_spike_correction(&mut self, value: bool) -> &mut Self {
        self.apply_spike_correction = value;
        self
    }

    pub fn set_offset(&mut self, value: i32) -> &mut Self {
        self.offset = value;
        self
    }

    pub fn set_r1_sample_window(&mut self, start: usize, end: usize) -> &mut Self {
        self.r1_sample_start = start;
        self.r1_sample_end = end;
        self
    }

    pub fn set_select_gain(&mut self, value: bool) -> &mut Self {
        self.select_gain = value;
        self
    }

    pub fn set_gain_selection_threshold(&mut self, value: f32) -> &mut Self {
        self.gain_selection_threshold = value;
        self
    }

    pub fn set_calib_scale_high_gain(&mut self, value: f32) -> &mut Self {
        self.calib_scale_high_gain = value;
        self
    }

    pub fn set_calib_scale_low_gain(&mut self, value: f32) -> &mut Self {
        self.calib_scale_low_gain = value;
        self
    }

    pub fn set_calibration_path<P: Into<PathBuf>>(&mut self, path: P) -> &mut Self {
        self.calibration_path = Some(path.into());
        self
    }

    pub fn set_drs4_pedestal_path<P: Into<PathBuf>>(&mut self, path: P) -> &mut Self {
        self.drs4_pedestal_path = Some(path.into());
        self
    }

    pub fn set_drs4_time_calibration_path<P: Into<PathBuf>>(&mut self, path: P) -> &mut Self {
        self.drs4_time_calibration_path = Some(path.into());
        self
    }

    pub fn set_default_trigger_type(&mut self, value: TriggerType) -> &mut Self {
        self.default_trigger_type = value;
        self
    }

    pub fn set_use_flatfield_heuristic(&mut self, value: bool) -> &mut Self {
        self.use_flatfield_heuristic = value;
        self
    }

    pub fn set_pedestal_ids_path<P: Into<PathBuf>>(&mut self, path: P) -> &mut Self {
        self.pedestal_ids_path = Some(path.into());
        self
    }

    pub fn set_flatfield_adc_range(&mut self, min: f32, max: f32) -> &mut Self {
        self.min_flatfield_adc = min;
        self.max_flatfield_adc = max;
        self
    }

    pub fn set_min_flatfield_pixel_fraction(&mut self, value: f32) -> &mut Self {
        self.min_flatfield_pixel_fraction = value;
        self
    }

    pub fn set_add_calibration_timeshift(&mut self, value: bool) -> &mut Self {
        self.add_calibration_timeshift = value;
        self
    }

    pub fn set_calibrate_flatfields_and_pedestals(&mut self, value: bool) -> &mut Self {
        self.calibrate_flatfields_and_pedestals = value;
        self
    }

    pub fn set_trigger_information(&mut self, value: bool) -> &mut Self {
        self.trigger_information = value;
        self
    }

    pub fn set_pointing_information(&mut self, value: bool) -> &mut Self {
        self.pointing_information = value;
        self
    }

    pub fn apply_drs4_corrections(&self) -> bool {
        self.apply_drs4_corrections
    }

    pub fn apply_drs4_pedestal_correction(&self) -> bool {
        self.apply_drs4_pedestal_correction
    }

    pub fn apply_timelapse_correction(&self) -> bool {
        self.apply_timelapse_correction
    }

    pub fn apply_spike_correction(&self) -> bool {
        self.apply_spike_correction
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn r1_sample_start(&self) -> usize {
        self.r1_sample_start
    }

    pub fn r1_sample_end(&self) -> usize {
        self.r1_sample_end
    }

    pub fn select_gain(&self) -> bool {
        self.select_gain
    }

    pub fn gain_selection_threshold(&self) -> f32 {
        self.gain_selection_threshold
    }

    pub fn calib_scale_high_gain(&self) -> f32 {
        self.calib_scale_high_gain
    }

    pub fn calib_scale_low_gain(&self) -> f32 {
        self.calib_scale_low_gain
    }

    pub fn calibration_path(&self) -> Option<&PathBuf> {
        self.calibration_path.as_ref()
    }

    pub fn drs4_pedestal_path(&self) -> Option<&PathBuf> {
        self.drs4_pedestal_path.as_ref()
    }

    pub fn drs4_time_calibration_path(&self) -> Option<&PathBuf> {
        self.drs4_time_calibration_path.as_ref()
    }

    pub fn default_trigger_type(&self) -> TriggerType {
        self.default_trigger_type
    }

    pub fn use_flatfield_heuristic(&self) -> bool {
        self.use_flatfield_heuristic
    }

    pub fn pedestal_ids_path(&self) -> Option<&PathBuf> {
        self.pedestal_ids_path.as_ref()
    }

    pub fn min_flatfield_adc(&self) -> f32 {
        self.min_flatfield_adc
    }

    pub fn max_flatfield_adc(&self) -> f32 {
        self.max_flatfield_adc
    }

    pub fn min_flatfield_pixel_fraction(&self) -> f32 {
        self.min_flatfield_pixel_fraction
    }

    pub fn add_calibration_timeshift(&self) -> bool {
        self.add_calibration_timeshift
    }

    pub fn calibrate_flatfields_and_pedestals(&self) -> bool {
        self.calibrate_flatfields_and_pedestals
    }

    pub fn trigger_information(&self) -> bool {
        self.trigger_information
    }

    pub fn pointing_information(&self) -> bool {
        self.pointing_information
    }
}
