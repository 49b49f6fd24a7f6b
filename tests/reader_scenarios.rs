//! Integration tests driving the full `Reader` against synthetic,
//! in-memory event sources, covering the scenarios the corrector is meant
//! to handle end to end rather than one kernel at a time.
use std::collections::VecDeque;

use lstcam_r1::constants::{N_CHANNELS_MODULE, N_MODULES, N_SAMPLES};
use lstcam_r1::raw::{RawCameraConfig, RawEvent, RawEventSource};
use lstcam_r1::trigger::{PixelStatus, TriggerBits};
use lstcam_r1::{ReaderConfig, Reader};

#[derive(Clone, Debug)]
struct FakeSource
{
    config: Option<RawCameraConfig>,
    events: VecDeque<RawEvent>,
    original: Vec<RawEvent>,
}

fn base_event(event_id: u64, n_hw_pixels: usize) -> RawEvent
{
    RawEvent {
        event_id,
        run_id: 1,
        waveform: vec![200u16; 2 * n_hw_pixels * N_SAMPLES],
        pixel_status: vec![PixelStatus::BOTH_GAINS_STORED.bits(); n_hw_pixels],
        first_capacitor_id: vec![0u16; N_MODULES * N_CHANNELS_MODULE],
        ..RawEvent::empty()
    }
}

impl FakeSource
{
    fn new(events: Vec<RawEvent>, n_hw_pixels: usize) -> Self
    {
        FakeSource {
            config: Some(RawCameraConfig {
                configuration_id: 7,
                run_id: 1,
                expected_pixels_id: (0..n_hw_pixels as u32).collect(),
                idaq_version: 40000,
                ..RawCameraConfig::empty()
            }),
            events: events.clone().into(),
            original: events,
        }
    }
}

impl RawEventSource for FakeSource
{
    fn camera_config(&mut self) -> Option<RawCameraConfig>
    {
        self.config.take()
    }
    fn next_event(&mut self) -> Option<RawEvent>
    {
        self.events.pop_front()
    }
    fn rewind(&mut self)
    {
        self.events = self.original.clone().into();
    }
    fn len(&self) -> usize
    {
        self.original.len()
    }
}

#[test]
fn two_subrun_files_merge_in_event_id_order()
{
    let n_hw_pixels = 4;
    let first = FakeSource::new(vec![base_event(1, n_hw_pixels), base_event(4, n_hw_pixels)], n_hw_pixels);
    let mut second_events = vec![base_event(2, n_hw_pixels), base_event(3, n_hw_pixels)];
    second_events[0].event_id = 2;
    let second = FakeSource::new(second_events, n_hw_pixels);

    let mut config = ReaderConfig::new();
    config.set_apply_drs4_corrections(false).set_select_gain(false);
    let reader = Reader::new(vec![first, second], config).unwrap();
    let ids: Vec<u64> = reader.map(|e| e.unwrap().event_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn mono_trigger_classifies_as_subarray()
{
    let n_hw_pixels = 4;
    let mut event = base_event(1, n_hw_pixels);
    event.trigger_type = TriggerBits::MONO.bits();
    let source = FakeSource::new(vec![event], n_hw_pixels);

    let mut config = ReaderConfig::new();
    config.set_apply_drs4_corrections(false).set_select_gain(false).set_use_flatfield_heuristic(false);
    let mut reader = Reader::new(vec![source], config).unwrap();
    let calibrated = reader.next().unwrap().unwrap();
    assert_eq!(calibrated.trigger_type, lstcam_r1::trigger::TriggerType::Subarray);
}

#[test]
fn calibration_trigger_classifies_as_flatfield()
{
    let n_hw_pixels = 4;
    let mut event = base_event(1, n_hw_pixels);
    event.trigger_type = TriggerBits::CALIBRATION.bits();
    let source = FakeSource::new(vec![event], n_hw_pixels);

    let mut config = ReaderConfig::new();
    config.set_apply_drs4_corrections(false).set_select_gain(false);
    let mut reader = Reader::new(vec![source], config).unwrap();
    let calibrated = reader.next().unwrap().unwrap();
    assert_eq!(calibrated.trigger_type, lstcam_r1::trigger::TriggerType::Flatfield);
}

#[test]
fn missing_module_is_recorded_as_hardware_failing()
{
    // only 1 of 2 module's worth of pixels present in expected_pixels_id
    let n_hw_pixels = 7;
    let event = base_event(1, n_hw_pixels);
    let source = FakeSource::new(vec![event], n_hw_pixels);

    let mut config = ReaderConfig::new();
    config.set_apply_drs4_corrections(false).set_select_gain(false);
    let mut reader = Reader::new(vec![source], config).unwrap();
    let calibrated = reader.next().unwrap().unwrap();
    assert_eq!(calibrated.hardware_failing_pixels, lstcam_r1::constants::N_PIXELS - n_hw_pixels);
}

#[test]
fn event_id_zero_is_silently_dropped()
{
    let n_hw_pixels = 4;
    let events = vec![base_event(0, n_hw_pixels), base_event(5, n_hw_pixels)];
    let source = FakeSource::new(events, n_hw_pixels);

    let mut config = ReaderConfig::new();
    config.set_apply_drs4_corrections(false).set_select_gain(false);
    let reader = Reader::new(vec![source], config).unwrap();
    let ids: Vec<u64> = reader.map(|e| e.unwrap().event_id).collect();
    assert_eq!(ids, vec![5]);
}

#[test]
fn construction_fails_without_any_camera_config()
{
    let mut source = FakeSource::new(vec![base_event(1, 4)], 4);
    source.config = None;
    let config = ReaderConfig::new();
    let err = Reader::new(vec![source], config).unwrap_err();
    assert!(matches!(err, lstcam_r1::ReaderError::NoConfig));
}

#[test]
fn rewind_replays_the_whole_run()
{
    let n_hw_pixels = 4;
    let source = FakeSource::new(vec![base_event(1, n_hw_pixels), base_event(2, n_hw_pixels)], n_hw_pixels);
    let mut config = ReaderConfig::new();
    config.set_apply_drs4_corrections(false).set_select_gain(false);
    let mut reader = Reader::new(vec![source], config).unwrap();

    let first_pass: Vec<u64> = (&mut reader).map(|e| e.unwrap().event_id).collect();
    reader.rewind();
    let second_pass: Vec<u64> = (&mut reader).map(|e| e.unwrap().event_id).collect();
    assert_eq!(first_pass, second_pass);
}
