//! Trigger bit flags and the event-type classifier.
use bitflags::bitflags;

bitflags! {
    /// Raw hardware trigger bits, as stored in `trigger_type`.
    ///
    /// These combine (a physics event can be simultaneously `MONO` and
    /// `CALIBRATION`, for instance), which is why this is a bitflag set
    /// rather than an enum.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TriggerBits: u16 {
        const MONO = 0b0000_0001;
        const STEREO = 0b0000_0010;
        const CALIBRATION = 0b0000_0100;
        const SINGLE_PE = 0b0000_1000;
        const SOFTWARE = 0b0001_0000;
        const PEDESTAL = 0b0010_0000;
        const SLOW_CONTROL = 0b0100_0000;

        const PHYSICS = Self::MONO.bits() | Self::STEREO.bits();
        const OTHER = Self::CALIBRATION.bits()
            | Self::SINGLE_PE.bits()
            | Self::SOFTWARE.bits()
            | Self::PEDESTAL.bits()
            | Self::SLOW_CONTROL.bits();
    }
}

bitflags! {
    /// Per-pixel health/readout bits, as stored in `pixel_status`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PixelStatus: u8 {
        const RESERVED_0 = 0b0000_0001;
        const RESERVED_1 = 0b0000_0010;
        const HIGH_GAIN_STORED = 0b0000_0100;
        const LOW_GAIN_STORED = 0b0000_1000;
        const SATURATED = 0b0001_0000;
        const PIXEL_TRIGGER_1 = 0b0010_0000;
        const PIXEL_TRIGGER_2 = 0b0100_0000;
        const PIXEL_TRIGGER_3 = 0b1000_0000;

        const BOTH_GAINS_STORED = Self::HIGH_GAIN_STORED.bits() | Self::LOW_GAIN_STORED.bits();
    }
}

impl PixelStatus {
    /// Extracts the 2-bit "which gains were stored" field: bit 2 is
    /// high-gain-stored, bit 3 is low-gain-stored.
    pub fn channel_info(self) -> u8 {
        (self.bits() & 0b0000_1100) >> 2
    }

    pub fn has_high_gain_stored(self) -> bool {
        self.contains(PixelStatus::HIGH_GAIN_STORED)
    }

    pub fn has_low_gain_stored(self) -> bool {
        self.contains(PixelStatus::LOW_GAIN_STORED)
    }
}

/// Coarse classification of an event, derived from its trigger bits (and
/// optionally refined by the flatfield ADC heuristic).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TriggerType {
    Subarray,
    Flatfield,
    SkyPedestal,
    SinglePe,
    Unknown,
}

#[allow(non_upper_case_globals)]
impl TriggerType {
    pub const UNKNOWN: TriggerType = TriggerType::Unknown;
}

/// Classifies an event from its raw trigger bits.
///
/// Grounded directly on the original source's `_event_type_from_trigger_bits`:
/// a physics-only pattern (`MONO`/`STEREO` with nothing else set) is
/// `SUBARRAY`; `CALIBRATION` alone is `FLATFIELD`; `PEDESTAL` alone is
/// `SKY_PEDESTAL`; `SINGLE_PE` alone is `SINGLE_PE`; anything else is
/// `UNKNOWN` and logged as a warning by the caller.
pub fn classify_trigger_bits(bits: TriggerBits) -> TriggerType {
    if bits.intersects(TriggerBits::PHYSICS) && !bits.intersects(TriggerBits::OTHER) {
        TriggerType::Subarray
    } else if bits == TriggerBits::CALIBRATION {
        TriggerType::Flatfield
    } else if bits == TriggerBits::PEDESTAL {
        TriggerType::SkyPedestal
    } else if bits == TriggerBits::SINGLE_PE {
        TriggerType::SinglePe
    } else {
        TriggerType::Unknown
    }
}

/// Flatfield-heuristic override: some runs mislabel flatfield events as
/// `SUBARRAY` in the trigger word, so for old enough data we recognize them
/// by the shape of the waveform instead.
///
/// An event looks like a flatfield event if at least `min_pixel_fraction` of
/// pixels have a high-gain peak-to-peak amplitude inside
/// `[min_adc, max_adc]`.
pub fn looks_like_flatfield(
    amplitudes: &[f32],
    min_adc: f32,
    max_adc: f32,
    min_pixel_fraction: f32,
) -> bool {
    if amplitudes.is_empty() {
        return false;
    }
    let in_range = amplitudes
        .iter()
        .filter(|&&amp| amp >= min_adc && amp <= max_adc)
        .count();
    (in_range as f32) / (amplitudes.len() as f32) >= min_pixel_fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_alone_is_subarray() {
        assert_eq!(classify_trigger_bits(TriggerBits::MONO), TriggerType::Subarray);
    }

    #[test]
    fn stereo_alone_is_subarray() {
        assert_eq!(classify_trigger_bits(TriggerBits::STEREO), TriggerType::Subarray);
    }

    #[test]
    fn calibration_alone_is_flatfield() {
        assert_eq!(classify_trigger_bits(TriggerBits::CALIBRATION), TriggerType::Flatfield);
    }

    #[test]
    fn pedestal_alone_is_sky_pedestal() {
        assert_eq!(classify_trigger_bits(TriggerBits::PEDESTAL), TriggerType::SkyPedestal);
    }

    #[test]
    fn single_pe_alone_is_single_pe() {
        assert_eq!(classify_trigger_bits(TriggerBits::SINGLE_PE), TriggerType::SinglePe);
    }

    #[test]
    fn mono_plus_calibration_is_unknown() {
        let bits = TriggerBits::MONO | TriggerBits::CALIBRATION;
        assert_eq!(classify_trigger_bits(bits), TriggerType::Unknown);
    }

    #[test]
    fn empty_bits_are_unknown() {
        assert_eq!(classify_trigger_bits(TriggerBits::empty()), TriggerType::Unknown);
    }

    #[test]
    fn channel_info_extracts_gain_bits() {
        let status = PixelStatus::HIGH_GAIN_STORED;
        assert_eq!(status.channel_info(), 0b01);
        let status = PixelStatus::LOW_GAIN_STORED;
        assert_eq!(status.channel_info(), 0b10);
        let status = PixelStatus::BOTH_GAINS_STORED;
        assert_eq!(status.channel_info(), 0b11);
    }

    #[test]
    fn flatfield_heuristic_respects_threshold() {
        let amps = vec![5000.0; 90].into_iter().chain(vec![0.0; 10]).collect::<Vec<_>>();
        assert!(looks_like_flatfield(&amps, 3000.0, 12000.0, 0.8));
        assert!(!looks_like_flatfield(&amps, 3000.0, 12000.0, 0.95));
    }
}
