//! Loaders for the auxiliary calibration files the corrector depends on:
//! the DRS4 pedestal reference (FITS), the DRS4 time-calibration
//! coefficients and the known-pedestal-event-id table (both HDF5).
use fitsio::FitsFile;
use hdf5::File as Hdf5File;

use crate::constants::{N_CAPACITORS_PIXEL, N_GAINS, N_PIXELS};
use crate::drs4::PedestalReference;
use crate::errors::ReaderError;

/// Reads the DRS4 pedestal reference cube from HDU1 of a FITS file and
/// turns it into a [`PedestalReference`] with `offset` already applied.
///
/// The file stores a signed 16-bit `(N_GAINS, N_PIXELS, N_CAPACITORS_PIXEL)`
/// cube; anything else is a [`ReaderError::CalibrationFile`].
pub fn load_drs4_pedestal(path: &std::path::Path, offset: i32) -> Result<PedestalReference, ReaderError> {
    let mut fptr = FitsFile::open(path)
        .map_err(|e| ReaderError::CalibrationFile(format!("opening {}: {}", path.display(), e)))?;
    let hdu = fptr
        .hdu(1)
        .map_err(|e| ReaderError::CalibrationFile(format!("reading HDU1 of {}: {}", path.display(), e)))?;
    let data: Vec<i16> = hdu
        .read_image(&mut fptr)
        .map_err(|e| ReaderError::CalibrationFile(format!("reading pedestal cube: {}", e)))?;

    if data.len() != N_GAINS * N_PIXELS * N_CAPACITORS_PIXEL {
        return Err(ReaderError::CalibrationFile(format!(
            "pedestal cube in {} has {} samples, expected {}",
            path.display(),
            data.len(),
            N_GAINS * N_PIXELS * N_CAPACITORS_PIXEL
        )));
    }
    PedestalReference::from_cube(&data, offset)
}

/// Fourier-series time-calibration coefficients: `fan`/`fbn` are the cosine
/// and sine coefficients of a per-`(gain, pixel)` harmonic series over
/// capacitor position, used to shift each pixel's effective sample time.
#[derive(Clone, Debug)]
pub struct TimeCalibration {
    fan: Vec<f32>,
    fbn: Vec<f32>,
    n_harmonics: usize,
}

impl TimeCalibration {
    /// Evaluates the time-shift correction, in nanoseconds, for a pixel
    /// whose first capacitor is `fc`.
    pub fn time_shift(&self, gain: usize, pixel: usize, fc: u16) -> f32 {
        let base = (gain * N_PIXELS + pixel) * self.n_harmonics;
        let phase = (fc as f32) * std::f32::consts::TAU / N_CAPACITORS_PIXEL as f32;
        let mut shift = 0.0f32;
        for harmonic in 0..self.n_harmonics {
            let n = (harmonic + 1) as f32;
            shift += self.fan[base + harmonic] * (n * phase).cos();
            shift += self.fbn[base + harmonic] * (n * phase).sin();
        }
        shift
    }
}

/// Loads the `fan`/`fbn` datasets (each shaped `(N_GAINS, N_PIXELS,
/// n_harmonics)`, `f32`) from the time-calibration HDF5 file.
pub fn load_time_calibration(path: &std::path::Path) -> Result<TimeCalibration, ReaderError> {
    let file = Hdf5File::open(path)
        .map_err(|e| ReaderError::CalibrationFile(format!("opening {}: {}", path.display(), e)))?;

    let fan_ds = file
        .dataset("fan")
        .map_err(|e| ReaderError::CalibrationFile(format!("reading fan dataset: {}", e)))?;
    let fbn_ds = file
        .dataset("fbn")
        .map_err(|e| ReaderError::CalibrationFile(format!("reading fbn dataset: {}", e)))?;

    let fan: ndarray::Array3<f32> = fan_ds
        .read()
        .map_err(|e| ReaderError::CalibrationFile(format!("fan has unexpected shape: {}", e)))?;
    let fbn: ndarray::Array3<f32> = fbn_ds
        .read()
        .map_err(|e| ReaderError::CalibrationFile(format!("fbn has unexpected shape: {}", e)))?;

    let shape = fan.shape();
    if shape[0] != N_GAINS || shape[1] != N_PIXELS || fbn.shape() != shape {
        return Err(ReaderError::CalibrationFile(format!(
            "time calibration arrays have shape {:?}, expected ({}, {}, _)",
            shape, N_GAINS, N_PIXELS
        )));
    }
    let n_harmonics = shape[2];

    Ok(TimeCalibration {
        fan: fan.iter().copied().collect(),
        fbn: fbn.iter().copied().collect(),
        n_harmonics,
    })
}

/// Per-`(gain, pixel)` charge calibration coefficients: `dc_to_pe` and
/// `pedestal_per_sample` feed [`crate::drs4::convert_to_pe`]; `time_correction`
/// feeds the `dl1_time_shift` output alongside [`TimeCalibration::time_shift`].
#[derive(Clone, Debug)]
pub struct ChargeCalibration {
    dc_to_pe: Vec<f32>,
    pedestal_per_sample: Vec<f32>,
    time_correction: Vec<f32>,
}

impl ChargeCalibration {
    #[inline]
    fn index(gain: usize, pixel: usize) -> usize {
        gain * N_PIXELS + pixel
    }

    pub fn dc_to_pe(&self, gain: usize, pixel: usize) -> f32 {
        self.dc_to_pe[Self::index(gain, pixel)]
    }

    pub fn pedestal_per_sample(&self, gain: usize, pixel: usize) -> f32 {
        self.pedestal_per_sample[Self::index(gain, pixel)]
    }

    pub fn time_correction(&self, gain: usize, pixel: usize) -> f32 {
        self.time_correction[Self::index(gain, pixel)]
    }
}

/// Loads the `dc_to_pe`/`pedestal_per_sample`/`time_correction` datasets
/// (each shaped `(N_GAINS, N_PIXELS)`, `f32`) from the charge calibration
/// HDF5 file.
pub fn load_charge_calibration(path: &std::path::Path) -> Result<ChargeCalibration, ReaderError> {
    let file = Hdf5File::open(path)
        .map_err(|e| ReaderError::CalibrationFile(format!("opening {}: {}", path.display(), e)))?;

    let read_table = |name: &str| -> Result<Vec<f32>, ReaderError> {
        let dataset = file
            .dataset(name)
            .map_err(|e| ReaderError::CalibrationFile(format!("reading {} dataset: {}", name, e)))?;
        let table: ndarray::Array2<f32> = dataset
            .read()
            .map_err(|e| ReaderError::CalibrationFile(format!("{} has unexpected shape: {}", name, e)))?;
        let shape = table.shape();
        if shape[0] != N_GAINS || shape[1] != N_PIXELS {
            return Err(ReaderError::CalibrationFile(format!(
                "{} has shape {:?}, expected ({}, {})",
                name, shape, N_GAINS, N_PIXELS
            )));
        }
        Ok(table.iter().copied().collect())
    };

    Ok(ChargeCalibration {
        dc_to_pe: read_table("dc_to_pe")?,
        pedestal_per_sample: read_table("pedestal_per_sample")?,
        time_correction: read_table("time_correction")?,
    })
}

/// Loads the set of event ids the online system already flagged as
/// interleaved pedestal events, from the `/interleaved_pedestal_ids` table
/// of an HDF5 file.
pub fn load_known_pedestal_ids(path: &std::path::Path) -> Result<std::collections::HashSet<u64>, ReaderError> {
    let file = Hdf5File::open(path)
        .map_err(|e| ReaderError::CalibrationFile(format!("opening {}: {}", path.display(), e)))?;
    let dataset = file
        .dataset("interleaved_pedestal_ids")
        .map_err(|e| ReaderError::CalibrationFile(format!("reading interleaved_pedestal_ids: {}", e)))?;
    let ids: Vec<u64> = dataset
        .read_raw()
        .map_err(|e| ReaderError::CalibrationFile(format!("decoding interleaved_pedestal_ids: {}", e)))?;
    Ok(ids.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_shift_is_zero_with_no_harmonics() {
        let calibration = TimeCalibration { fan: vec![], fbn: vec![], n_harmonics: 0 };
        assert_eq!(calibration.time_shift(0, 0, 100), 0.0);
    }
}
