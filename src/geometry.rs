//! Pixel mapping and DRS4 first-capacitor bookkeeping.
//!
//! The camera hardware reads out pixels in module order, not logical camera
//! order, and the DRS4 ring buffers start each event at a different
//! capacitor ("first capacitor"). Both facts are per-event metadata that
//! everything downstream needs in logical-pixel order, which is what this
//! module produces.
use crate::constants::{
    CHANNEL_ORDER_HIGH_GAIN, CHANNEL_ORDER_LOW_GAIN, HIGH_GAIN, LOW_GAIN, N_CAPACITORS_CHANNEL,
    N_CHANNELS_MODULE, N_GAINS, N_MODULES, N_PIXELS, N_PIXELS_MODULE,
};

/// Expands the hardware `first_capacitor_id` array (one entry per module
/// channel, `N_MODULES * N_CHANNELS_MODULE` long) into a per-pixel,
/// per-gain first-capacitor table.
///
/// Each module wires 7 pixels across its 8 channels two-at-a-time per the
/// `CHANNEL_ORDER_*` tables (a pixel's high gain and low gain come from
/// different channels of the same module).
pub fn expand_first_capacitors(first_capacitor_id: &[u16]) -> [[u16; N_PIXELS]; N_GAINS] {
    assert_eq!(
        first_capacitor_id.len(),
        N_MODULES * N_CHANNELS_MODULE,
        "first_capacitor_id must have one entry per module channel"
    );

    let mut fc = [[0u16; N_PIXELS]; N_GAINS];
    for module in 0..N_MODULES {
        let channels = &first_capacitor_id[module * N_CHANNELS_MODULE..(module + 1) * N_CHANNELS_MODULE];
        for pixel_in_module in 0..N_PIXELS_MODULE {
            let pixel = module * N_PIXELS_MODULE + pixel_in_module;
            fc[HIGH_GAIN][pixel] = channels[CHANNEL_ORDER_HIGH_GAIN[pixel_in_module]];
            fc[LOW_GAIN][pixel] = channels[CHANNEL_ORDER_LOW_GAIN[pixel_in_module]];
        }
    }
    fc
}

/// `true` if `capacitor` is a legal DRS4 ring position.
pub fn is_valid_capacitor(capacitor: u16) -> bool {
    (capacitor as usize) < N_CAPACITORS_CHANNEL * 4
}

/// Reorders a hardware-ordered flat buffer (`expected_pixels_id[i]` gives
/// the logical pixel index that hardware slot `i` belongs to) into logical
/// pixel order, filling any module absent from `expected_pixels_id` with
/// `fill`.
///
/// Returns the reordered buffer plus the logical indices of pixels that
/// were never written (the "hardware failing" pixels for this event).
pub fn reorder_to_logical_pixels<T: Copy>(
    hardware_order: &[T],
    expected_pixels_id: &[u32],
    fill: T,
) -> (Vec<T>, Vec<usize>) {
    assert_eq!(hardware_order.len(), expected_pixels_id.len());

    let mut logical = vec![fill; N_PIXELS];
    let mut written = vec![false; N_PIXELS];
    for (hw_slot, &logical_pixel) in expected_pixels_id.iter().enumerate() {
        let logical_pixel = logical_pixel as usize;
        logical[logical_pixel] = hardware_order[hw_slot];
        written[logical_pixel] = true;
    }
    let missing = written
        .iter()
        .enumerate()
        .filter(|(_, &w)| !w)
        .map(|(pixel, _)| pixel)
        .collect();
    (logical, missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_first_capacitors_uses_channel_order_tables() {
        let mut ids = vec![0u16; N_MODULES * N_CHANNELS_MODULE];
        // module 0's channels are 0..8
        for (channel, id) in ids.iter_mut().take(N_CHANNELS_MODULE).enumerate() {
            *id = channel as u16 * 100;
        }
        let fc = expand_first_capacitors(&ids);
        // pixel 0 (pixel_in_module 0) -> high gain channel 0, low gain channel 4
        assert_eq!(fc[HIGH_GAIN][0], 0);
        assert_eq!(fc[LOW_GAIN][0], 400);
        // pixel 1 (pixel_in_module 1) -> high gain channel 0, low gain channel 4
        assert_eq!(fc[HIGH_GAIN][1], 0);
        assert_eq!(fc[LOW_GAIN][1], 400);
        // pixel 3 (pixel_in_module 3) -> high gain channel 1
        assert_eq!(fc[HIGH_GAIN][3], 100);
        // pixel 6 (pixel_in_module 6) -> high gain channel 3, low gain channel 7
        assert_eq!(fc[HIGH_GAIN][6], 300);
        assert_eq!(fc[LOW_GAIN][6], 700);
    }

    #[test]
    fn reorder_fills_missing_modules() {
        let hardware_order = vec![10u16, 20u16];
        let expected_pixels_id = vec![5u32, 9u32];
        let (logical, missing) = reorder_to_logical_pixels(&hardware_order, &expected_pixels_id, u16::MAX);
        assert_eq!(logical[5], 10);
        assert_eq!(logical[9], 20);
        assert_eq!(logical[0], u16::MAX);
        assert!(missing.contains(&0));
        assert!(!missing.contains(&5));
    }
}
