//! MSB-first bit field access for plaintext CIDs.
//!
//! Values are exchanged as right-aligned big-endian byte strings of
//! `bit_len.div_ceil(8)` bytes.

#[inline]
fn get_bit(buf: &[u8], pos: usize) -> bool {
    (buf[pos / 8] >> (7 - pos % 8)) & 1 == 1
}

#[inline]
fn set_bit(buf: &mut [u8], pos: usize, value: bool) {
    let mask = 1u8 << (7 - pos % 8);
    if value {
        buf[pos / 8] |= mask;
    } else {
        buf[pos / 8] &= !mask;
    }
}

/// Copy `bit_len` bits starting at `bit_offset` of `src` into `out`,
/// right-aligned. `out` must be exactly `bit_len.div_ceil(8)` bytes and `src`
/// must hold `bit_offset + bit_len` bits.
pub(crate) fn read_bits(src: &[u8], bit_offset: usize, bit_len: usize, out: &mut [u8]) {
    debug_assert_eq!(out.len(), bit_len.div_ceil(8));
    debug_assert!(src.len() * 8 >= bit_offset + bit_len);

    out.fill(0);
    let skip = out.len() * 8 - bit_len;
    for i in 0..bit_len {
        if get_bit(src, bit_offset + i) {
            set_bit(out, skip + i, true);
        }
    }
}

/// Write the low `bit_len` bits of the right-aligned `value` into `dst`
/// starting at `bit_offset`.
pub(crate) fn write_bits(dst: &mut [u8], bit_offset: usize, bit_len: usize, value: &[u8]) {
    debug_assert_eq!(value.len(), bit_len.div_ceil(8));
    debug_assert!(dst.len() * 8 >= bit_offset + bit_len);

    let skip = value.len() * 8 - bit_len;
    for i in 0..bit_len {
        set_bit(dst, bit_offset + i, get_bit(value, skip + i));
    }
}

/// Whether a right-aligned value has no bits set above `bit_len`.
pub(crate) fn fits(value: &[u8], bit_len: usize) -> bool {
    if value.len() != bit_len.div_ceil(8) {
        return false;
    }
    let spare = value.len() * 8 - bit_len;
    spare == 0 || value[0] >> (8 - spare) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_whole_bytes() {
        let src = [0x40, 0x05, 0xAA];
        let mut out = [0u8; 1];
        read_bits(&src, 8, 8, &mut out);
        assert_eq!(out, [0x05]);
    }

    #[test]
    fn test_read_unaligned_field() {
        // bits 2..14 of 0b0011_1111 0b1111_1100 -> twelve ones
        let src = [0x3F, 0xFC];
        let mut out = [0u8; 2];
        read_bits(&src, 2, 12, &mut out);
        assert_eq!(out, [0x0F, 0xFF]);
    }

    #[test]
    fn test_write_then_read_unaligned() {
        let mut buf = [0xFFu8; 4];
        write_bits(&mut buf, 5, 11, &[0x02, 0x01]);
        let mut out = [0u8; 2];
        read_bits(&buf, 5, 11, &mut out);
        assert_eq!(out, [0x02, 0x01]);
        // Bits outside the field are untouched
        assert_eq!(buf[0] & 0xF8, 0xF8);
        assert_eq!(buf[2], 0xFF);
    }

    #[test]
    fn test_fits() {
        assert!(fits(&[0x0F], 4));
        assert!(!fits(&[0x1F], 4));
        assert!(fits(&[0xFF], 8));
        assert!(!fits(&[0x01, 0x00], 8));
    }
}
