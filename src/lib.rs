#![allow(
    clippy::needless_return,
    clippy::similar_names,
    clippy::inline_always,
    clippy::too_many_arguments
)]
#![warn(clippy::correctness, clippy::perf, clippy::pedantic, clippy::inline_always)]
//! Streaming DRS4 calibration core for the LST camera event reader.
//!
//! Turns raw, multi-file camera events into calibrated per-pixel
//! waveforms: merges subrun files into one ascending-`event_id` stream,
//! reorders hardware pixels into logical camera order, runs the DRS4
//! pedestal/time-lapse/spike-A correction pipeline, and classifies each
//! event's trigger type. Decoding the zfits/protobuf wire format itself,
//! pointing reconstruction and DL1 feature extraction are out of scope —
//! see [`raw::RawEventSource`] and [`collaborators`] for the seams where
//! callers plug those in.
#[macro_use]
extern crate log;

pub mod assembler;
pub mod calibration;
pub mod collaborators;
pub mod constants;
pub mod counters;
pub mod drs4;
pub mod errors;
pub mod geometry;
pub mod multistream;
pub mod options;
pub mod raw;
pub mod reader;
pub mod trigger;

pub use crate::assembler::AssembledEvent;
pub use crate::errors::ReaderError;
pub use crate::options::ReaderConfig;
pub use crate::raw::{RawCameraConfig, RawEvent, RawEventSource};
pub use crate::reader::{CalibratedEvent, Reader};
