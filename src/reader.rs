//! The top-level `Reader`, wiring the merger, the event assembler, the DRS4
//! corrector and the event-type classifier into one lazy, ordered stream of
//! calibrated events.
use std::collections::HashSet;

use log::warn;

use crate::assembler::{self, AssembledEvent};
use crate::calibration::{
    load_charge_calibration, load_drs4_pedestal, load_known_pedestal_ids, load_time_calibration, ChargeCalibration,
    TimeCalibration,
};
use crate::collaborators::{EventTimeCalculator, NoEventTime, NoPointing, Pointing, PointingSource};
use crate::drs4::{self, Drs4State, PedestalReference};
use crate::errors::ReaderError;
use crate::multistream::MultiStream;
use crate::options::ReaderConfig;
use crate::raw::{RawCameraConfig, RawEventSource};
use crate::trigger::{classify_trigger_bits, looks_like_flatfield, TriggerBits, TriggerType};

/// A single fully-processed event: calibrated waveform plus everything
/// decoded about it along the way.
#[derive(Clone, Debug)]
pub struct CalibratedEvent {
    pub event_id: u64,
    pub run_id: u32,
    pub tel_event_id: u64,
    pub trigger_type: TriggerType,
    pub is_interleaved_pedestal: bool,
    pub waveform: Vec<f32>,
    pub pointing: Option<Pointing>,
    pub event_time: Option<f64>,
    pub hardware_failing_pixels: usize,
    /// Per-pixel Fourier time-shift combined with the charge calibration
    /// file's `time_correction`, `None` unless both are available and
    /// `add_calibration_timeshift` is set.
    pub dl1_time_shift: Option<Vec<f32>>,
}

/// Drives the full pipeline: merge, assemble, correct, classify.
///
/// Implements [`Iterator`] rather than exposing its own `next()`, so the
/// usual adapters (`take`, `filter`, `for` loops) work directly against a
/// run. Construction opens and validates every input; iteration never
/// panics on bad event data, it yields an `Err` and the caller decides
/// whether to keep going.
#[derive(Debug)]
pub struct Reader<T: RawEventSource, Time: EventTimeCalculator = NoEventTime, Point: PointingSource = NoPointing> {
    merger: MultiStream<T>,
    config: ReaderConfig,
    camera_config: RawCameraConfig,
    pedestal: Option<PedestalReference>,
    time_calibration: Option<TimeCalibration>,
    charge_calibration: Option<ChargeCalibration>,
    known_pedestal_ids: HashSet<u64>,
    state: Drs4State,
    time_calculator: Time,
    pointing_source: Point,
    run_started_before_2022: bool,
}

impl<T: RawEventSource> Reader<T, NoEventTime, NoPointing> {
    /// Builds a reader with no time-calculator or pointing-source
    /// collaborator, loading whatever calibration files `config` names.
    pub fn new(sources: Vec<T>, config: ReaderConfig) -> Result<Self, ReaderError> {
        Self::with_collaborators(sources, config, NoEventTime, NoPointing)
    }
}

impl<T: RawEventSource, Time: EventTimeCalculator, Point: PointingSource> Reader<T, Time, Point> {
    /// Builds a reader with explicit time/pointing collaborators.
    pub fn with_collaborators(
        sources: Vec<T>,
        config: ReaderConfig,
        time_calculator: Time,
        pointing_source: Point,
    ) -> Result<Self, ReaderError> {
        let merger = MultiStream::new(sources)?;
        let camera_config = merger.camera_config().clone();

        let pedestal = match config.drs4_pedestal_path() {
            Some(path) => Some(load_drs4_pedestal(path, config.offset())?),
            None if config.apply_drs4_pedestal_correction() && config.apply_drs4_corrections() => {
                return Err(ReaderError::MissingPedestal)
            }
            None => None,
        };

        let time_calibration = match config.drs4_time_calibration_path() {
            Some(path) => Some(load_time_calibration(path)?),
            None => None,
        };

        let known_pedestal_ids = match config.pedestal_ids_path() {
            Some(path) => load_known_pedestal_ids(path)?,
            None => HashSet::new(),
        };

        let charge_calibration = match config.calibration_path() {
            Some(path) => Some(load_charge_calibration(path)?),
            None => None,
        };

        Ok(Reader {
            merger,
            config,
            camera_config,
            pedestal,
            time_calibration,
            charge_calibration,
            known_pedestal_ids,
            state: Drs4State::new(),
            time_calculator,
            pointing_source,
            run_started_before_2022: true,
        })
    }

    /// Total number of events across all inputs.
    pub fn len(&self) -> usize {
        self.merger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merger.is_empty()
    }

    /// Rewinds the underlying merger so the run can be replayed.
    pub fn rewind(&mut self) {
        self.merger.rewind();
        self.state = Drs4State::new();
    }

    /// Disables the flatfield-ADC-heuristic override regardless of the
    /// configured run date; runs from 2022 onward never need it, per the
    /// original event source's cutoff.
    pub fn set_run_started_before_2022(&mut self, value: bool) -> &mut Self {
        self.run_started_before_2022 = value;
        self
    }

    /// Decodes and classifies an event's trigger type, or returns the
    /// configured default untouched when `trigger_information` is off —
    /// matching `fill_trigger_info` being skippable for sources with no
    /// TIB/UCTS wired up.
    fn classify(&self, event: &AssembledEvent) -> TriggerType {
        if !self.config.trigger_information() {
            return self.config.default_trigger_type();
        }
        let bits = TriggerBits::from_bits_truncate(event.trigger_type);
        if let Some(ucts) = &event.extdevices.ucts {
            if ucts.trigger_type == 42 {
                warn!(
                    "event {}: UCTS trigger_type is the known-unreliable sentinel value 42",
                    event.event_id
                );
            }
        }
        let mut kind = classify_trigger_bits(bits);
        if kind == TriggerType::Unknown {
            warn!("event {}: unknown trigger bit pattern {:08b}", event.event_id, bits.bits());
            kind = self.config.default_trigger_type();
        }
        kind
    }

    fn refine_with_flatfield_heuristic(&self, kind: TriggerType, event: &AssembledEvent) -> TriggerType {
        if !self.config.use_flatfield_heuristic() || !self.run_started_before_2022 {
            return kind;
        }
        if kind != TriggerType::Subarray {
            return kind;
        }
        // The R1 image: sum over samples of the high-gain channel, per pixel.
        let amplitudes: Vec<f32> = (0..crate::constants::N_PIXELS)
            .map(|pixel| {
                (0..event.waveform.n_samples)
                    .map(|s| event.waveform.sample(crate::constants::HIGH_GAIN, pixel, s))
                    .sum()
            })
            .collect();
        if looks_like_flatfield(
            &amplitudes,
            self.config.min_flatfield_adc(),
            self.config.max_flatfield_adc(),
            self.config.min_flatfield_pixel_fraction(),
        ) {
            TriggerType::Flatfield
        } else {
            kind
        }
    }

    /// Combines the charge calibration file's per-pixel `time_correction`
    /// with the DRS4 Fourier time-shift into one `dl1_time_shift` output,
    /// `None` unless both calibration files are loaded and the option is set.
    fn dl1_time_shift(&self, event: &AssembledEvent) -> Option<Vec<f32>> {
        if !self.config.add_calibration_timeshift() {
            return None;
        }
        let time_calibration = self.time_calibration.as_ref()?;
        let charge_calibration = self.charge_calibration.as_ref()?;

        let shifts = (0..crate::constants::N_PIXELS)
            .map(|pixel| {
                let gain = match &event.waveform.selected_gain {
                    Some(selected) if selected[pixel] >= 0 => selected[pixel] as usize,
                    Some(_) => return 0.0,
                    None => crate::constants::HIGH_GAIN,
                };
                let fc = event.first_capacitor[gain][pixel];
                charge_calibration.time_correction(gain, pixel) + time_calibration.time_shift(gain, pixel, fc)
            })
            .collect();
        Some(shifts)
    }
}

impl<T: RawEventSource, Time: EventTimeCalculator, Point: PointingSource> Iterator for Reader<T, Time, Point> {
    type Item = Result<CalibratedEvent, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw_event = self.merger.next()?;
            if raw_event.event_id == 0 {
                continue; // sentinel, not a real event
            }

            let mut assembled = assembler::assemble(&raw_event, &self.camera_config);

            let mut kind = self.classify(&assembled);
            kind = self.refine_with_flatfield_heuristic(kind, &assembled);
            if self.known_pedestal_ids.contains(&assembled.event_id) {
                kind = TriggerType::SkyPedestal;
            }
            let is_interleaved_pedestal = kind == TriggerType::SkyPedestal;

            let skip_pe_calibration = self.charge_calibration.is_some()
                && !self.config.calibrate_flatfields_and_pedestals()
                && matches!(kind, TriggerType::Flatfield | TriggerType::SkyPedestal);

            let waveform = match drs4::correct(
                &mut assembled,
                &self.config,
                self.pedestal.as_ref(),
                self.charge_calibration.as_ref(),
                skip_pe_calibration,
                &mut self.state,
            ) {
                Ok(w) => w,
                Err(err) => return Some(Err(err)),
            };
            let dl1_time_shift = self.dl1_time_shift(&assembled);

            let pointing = if self.config.pointing_information() {
                self.pointing_source.pointing(&assembled)
            } else {
                None
            };
            let event_time = self.time_calculator.event_time(&assembled);

            return Some(Ok(CalibratedEvent {
                event_id: assembled.event_id,
                run_id: assembled.run_id,
                tel_event_id: assembled.tel_event_id,
                trigger_type: kind,
                is_interleaved_pedestal,
                waveform,
                pointing,
                event_time,
                hardware_failing_pixels: assembled.hardware_failing_pixels.len(),
                dl1_time_shift,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{RawCameraConfig, RawEvent};
    use crate::trigger::PixelStatus;
    use std::collections::VecDeque;

    #[derive(Clone)]
    struct FakeSource {
        config: Option<RawCameraConfig>,
        events: VecDeque<RawEvent>,
        original: Vec<RawEvent>,
    }

    fn make_event(event_id: u64, n_hw_pixels: usize) -> RawEvent {
        RawEvent {
            event_id,
            run_id: 1,
            waveform: vec![100u16; 2 * n_hw_pixels * crate::constants::N_SAMPLES],
            pixel_status: vec![PixelStatus::BOTH_GAINS_STORED.bits(); n_hw_pixels],
            first_capacitor_id: vec![0u16; crate::constants::N_MODULES * crate::constants::N_CHANNELS_MODULE],
            ..RawEvent::empty()
        }
    }

    impl FakeSource {
        fn new(ids: &[u64], n_hw_pixels: usize) -> Self {
            let events: Vec<_> = ids.iter().map(|&id| make_event(id, n_hw_pixels)).collect();
            FakeSource {
                config: Some(RawCameraConfig {
                    configuration_id: 1,
                    expected_pixels_id: (0..n_hw_pixels as u32).collect(),
                    ..RawCameraConfig::empty()
                }),
                events: events.clone().into(),
                original: events,
            }
        }
    }

    impl RawEventSource for FakeSource {
        fn camera_config(&mut self) -> Option<RawCameraConfig> {
            self.config.take()
        }
        fn next_event(&mut self) -> Option<RawEvent> {
            self.events.pop_front()
        }
        fn rewind(&mut self) {
            self.events = self.original.clone().into();
        }
        fn len(&self) -> usize {
            self.original.len()
        }
    }

    #[test]
    fn drops_sentinel_event_id_zero() {
        let source = FakeSource::new(&[0, 1, 2], 4);
        let mut config = ReaderConfig::new();
        config.set_apply_drs4_corrections(false);
        let reader = Reader::new(vec![source], config).unwrap();
        let ids: Vec<u64> = reader.map(|r| r.unwrap().event_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn identity_roundtrip_with_corrections_disabled() {
        let source = FakeSource::new(&[1], 4);
        let mut config = ReaderConfig::new();
        config
            .set_apply_drs4_corrections(false)
            .set_select_gain(false)
            .set_offset(0)
            .set_r1_sample_window(0, crate::constants::N_SAMPLES)
            .set_add_calibration_timeshift(false);
        let mut reader = Reader::new(vec![source], config).unwrap();
        let event = reader.next().unwrap().unwrap();
        assert!(event.waveform.iter().all(|&v| v == 100.0));
        assert_eq!(event.waveform.len(), 2 * crate::constants::N_PIXELS * crate::constants::N_SAMPLES);
    }
}
