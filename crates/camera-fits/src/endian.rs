//! Big-endian conversions for FITS data.
//!
//! FITS stores all binary data most-significant byte first. Amplifier pixel
//! planes are 32-bit signed integers; tile descriptors are pairs of 32-bit
//! unsigned integers.

/// Read a big-endian `i32` from the first 4 bytes of the slice.
#[inline]
pub fn read_i32_be(buf: &[u8]) -> i32 {
    i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Read a big-endian `u32` from the first 4 bytes of the slice.
#[inline]
pub fn read_u32_be(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Decode a packed big-endian `i32` array. Trailing bytes that do not form a
/// whole value are ignored.
pub fn decode_i32_be(buf: &[u8]) -> Vec<i32> {
    buf.chunks_exact(4).map(read_i32_be).collect()
}

/// Encode `values` as a packed big-endian `i32` array.
pub fn encode_i32_be(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Encode `values` as packed big-endian 64-bit integers, the on-disk layout
/// of a `.counts` histogram file.
pub fn encode_u64_be(values: &[u64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_single_values() {
        assert_eq!(read_i32_be(&[0xFF, 0xFF, 0xFF, 0xFE]), -2);
        assert_eq!(read_u32_be(&[0x00, 0x00, 0x01, 0x00, 0xAA]), 256);
    }

    #[test]
    fn decode_packed() {
        let bytes = [0, 0, 0, 100, 0, 0, 0x4E, 0x20, 0x80, 0, 0, 0, 9];
        assert_eq!(decode_i32_be(&bytes), vec![100, 20000, i32::MIN]);
    }

    #[test]
    fn encode_matches_decode() {
        let values = [0, -1, 22000, i32::MAX];
        assert_eq!(decode_i32_be(&encode_i32_be(&values)), values);
    }

    #[test]
    fn encode_counts() {
        assert_eq!(encode_u64_be(&[1, 256]), vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 1, 0]);
    }
}
