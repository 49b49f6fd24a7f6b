//! Fatal errors the reader can surface.
//!
//! Per-event problems that do not interrupt the stream (`UcUnreliable`,
//! `UnknownEventType`, `EmptyEvent`) are not represented here — they are
//! `log::warn!` calls at the point they occur, or a silent skip for
//! `EmptyEvent`. Only conditions that abort construction or terminate
//! iteration get a `ReaderError` variant.
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Errors produced by the reader, at construction time or while streaming.
#[allow(clippy::module_name_repetitions)]
pub enum ReaderError {
    /// No `CameraConfig` record was found in any input file.
    NoConfig,
    /// Inputs disagree on `configuration_id`.
    ConfigMismatch { first: u64, other: u64 },
    /// `apply_drs4_pedestal_correction` is set but no pedestal path was
    /// configured.
    MissingPedestal,
    /// A gain-selected event marks broken pixels in `pixel_status` but its
    /// waveform buffer is too short to contain them.
    ShapeMismatch { expected_pixels: usize, got_pixels: usize },
    /// Propagated from the `fitsio`/`hdf5` readers when a configured file
    /// cannot be opened or does not have the expected shape.
    CalibrationFile(String),
    /// The input stream yielded no usable events at all (zero input handles).
    NoInputs,
}

impl Debug for ReaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoConfig => write!(f, "no CameraConfig record found in any input file"),
            Self::ConfigMismatch { first, other } => write!(
                f,
                "inputs disagree on configuration_id: first saw {}, then {}",
                first, other
            ),
            Self::MissingPedestal => write!(
                f,
                "DRS4 pedestal correction requested but no drs4_pedestal_path was configured"
            ),
            Self::ShapeMismatch { expected_pixels, got_pixels } => write!(
                f,
                "broken pixels marked in pixel_status but waveform only has {} of {} expected pixels",
                got_pixels, expected_pixels
            ),
            Self::CalibrationFile(reason) => write!(f, "calibration file error: {}", reason),
            Self::NoInputs => write!(f, "MultiStream merger constructed with zero input handles"),
        }
    }
}

impl Display for ReaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl Error for ReaderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_debug() {
        let err = ReaderError::NoConfig;
        assert_eq!(format!("{}", err), format!("{:?}", err));
    }
}
