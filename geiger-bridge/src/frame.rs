//! Wire protocol of the Geiger counter's heartbeat mode.
//!
//! In heartbeat mode the device emits one 2-byte frame per second: a
//! big-endian `u16` whose top two bits are reserved flag bits. The event
//! count is the low 14 bits.

/// Strips the reserved flag bits from a decoded frame.
pub(crate) const HEARTBEAT_MASK: u16 = 0x3FFF;

/// Size in bytes of an event frame.
pub(crate) const FRAME_SIZE: usize = 2;

/// Command that puts the device into heartbeat mode.
pub(crate) const HEARTBEAT_ENABLE: &[u8] = b"<HEARTBEAT1>>";

/// Command that takes the device out of heartbeat mode.
pub(crate) const HEARTBEAT_DISABLE: &[u8] = b"<HEARTBEAT0>>";

/// Decodes an event frame into the number of detector pulses reported for
/// the device's most recent reporting sub-interval.
pub(crate) fn decode_frame(frame: [u8; FRAME_SIZE]) -> u16 {
    u16::from_be_bytes(frame) & HEARTBEAT_MASK
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_masks_top_two_bits_for_all_inputs() {
        for raw in 0..=u16::MAX {
            let count = decode_frame(raw.to_be_bytes());
            assert_eq!(count, raw & 0x3FFF);
            assert_eq!(count & 0xC000, 0);
        }
    }

    #[test]
    fn decode_is_big_endian() {
        assert_eq!(decode_frame([0x01, 0x02]), 0x0102);
        assert_eq!(decode_frame([0x00, 0x2A]), 42);
    }

    #[test]
    fn flag_bits_alone_decode_to_zero() {
        assert_eq!(decode_frame([0x80, 0x00]), 0);
        assert_eq!(decode_frame([0x40, 0x00]), 0);
        assert_eq!(decode_frame([0xC0, 0x00]), 0);
    }

    #[test]
    fn all_ones_decode_to_mask() {
        assert_eq!(decode_frame([0xFF, 0xFF]), 0x3FFF);
    }
}
