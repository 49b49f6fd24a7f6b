//! Fixed detector geometry for the LST camera.
//!
//! These numbers describe the physical layout of the DRS4 readout chain and
//! never change at runtime; they are compiled in rather than read from a
//! configuration file, matching how the original event source hard-codes
//! them.

/// Number of gain channels per pixel (high, low).
pub const N_GAINS: usize = 2;
/// Number of Dragon front-end modules in the camera.
pub const N_MODULES: usize = 265;
/// Number of pixels wired to a single module.
pub const N_PIXELS_MODULE: usize = 7;
/// Total number of camera pixels.
pub const N_PIXELS: usize = N_MODULES * N_PIXELS_MODULE;
/// Samples captured per event, per pixel, per gain.
pub const N_SAMPLES: usize = 40;
/// DRS4 capacitors in a single channel.
pub const N_CAPACITORS_CHANNEL: usize = 1024;
/// DRS4 capacitors behind one pixel (four channels cascaded).
pub const N_CAPACITORS_PIXEL: usize = 4 * N_CAPACITORS_CHANNEL;
/// A module exposes 8 hardware channels, only 7 of which are wired to pixels.
pub const N_CHANNELS_MODULE: usize = 8;

/// Gain channel index constants, used instead of a bare `0`/`1` at call
/// sites that index a `[N_GAINS; ..]` array.
pub const HIGH_GAIN: usize = 0;
pub const LOW_GAIN: usize = 1;

/// DRS4 readout clock frequency, in kHz, used to turn
/// `local_clock_counter` tick differences into milliseconds.
pub const CLOCK_FREQUENCY_KHZ: f64 = 133e3;

/// Last run number produced by the pre-2019-11-05 firmware. Runs at or
/// below this boundary need the shifted time-lapse/spike-A kernels.
pub const LAST_RUN_WITH_OLD_FIRMWARE: u32 = 1573;

/// Per-module-local pixel-in-module index (0..7) to hardware channel for
/// the high-gain readout. Dragon v5 board data format.
pub const CHANNEL_ORDER_HIGH_GAIN: [usize; N_PIXELS_MODULE] = [0, 0, 1, 1, 2, 2, 3];
/// Same, for the low-gain readout.
pub const CHANNEL_ORDER_LOW_GAIN: [usize; N_PIXELS_MODULE] = [4, 4, 5, 5, 6, 6, 7];

/// Default values for `ReaderConfig`, collected here so the corrector and
/// the config module agree on a single source of truth.
pub const DEFAULT_OFFSET: i32 = 400;
pub const DEFAULT_R1_SAMPLE_START: usize = 3;
pub const DEFAULT_R1_SAMPLE_END: usize = 39;
pub const DEFAULT_GAIN_SELECTION_THRESHOLD: f32 = 3500.0;
pub const DEFAULT_MIN_FLATFIELD_ADC: f32 = 3000.0;
pub const DEFAULT_MAX_FLATFIELD_ADC: f32 = 12000.0;
pub const DEFAULT_MIN_FLATFIELD_PIXEL_FRACTION: f32 = 0.8;
