/// FITS block size in bytes (each logical record is one block).
pub const BLOCK_SIZE: usize = 2880;

/// FITS card (keyword record) size in bytes.
pub const CARD_SIZE: usize = 80;

/// Number of cards that fit in a single block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// Padding byte used for header blocks (ASCII space).
pub const HEADER_PAD_BYTE: u8 = 0x20;

/// Returns the number of FITS blocks required to hold `num_bytes` bytes.
pub const fn blocks_needed(num_bytes: u64) -> u64 {
    num_bytes.div_ceil(BLOCK_SIZE as u64)
}

/// Returns the total byte length (in whole blocks) required to hold `num_bytes`.
///
/// Segment walking uses this to skip from the end of one HDU's data to the
/// start of the next header.
pub const fn padded_byte_len(num_bytes: u64) -> u64 {
    blocks_needed(num_bytes) * BLOCK_SIZE as u64
}

/// Pads `data` with zero bytes up to the next block boundary.
pub fn pad_to_block(data: &mut Vec<u8>) {
    let padded = padded_byte_len(data.len() as u64) as usize;
    data.resize(padded, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants() {
        assert_eq!(BLOCK_SIZE, 2880);
        assert_eq!(CARD_SIZE, 80);
        assert_eq!(CARDS_PER_BLOCK, 36);
    }

    #[test]
    fn blocks_needed_boundaries() {
        assert_eq!(blocks_needed(0), 0);
        assert_eq!(blocks_needed(1), 1);
        assert_eq!(blocks_needed(2880), 1);
        assert_eq!(blocks_needed(2881), 2);
        assert_eq!(blocks_needed(4 * 512 * 2002), 1424);
    }

    #[test]
    fn padded_len() {
        assert_eq!(padded_byte_len(0), 0);
        assert_eq!(padded_byte_len(100), 2880);
        assert_eq!(padded_byte_len(5760), 5760);
    }

    #[test]
    fn pad_vec() {
        let mut v = vec![7u8; 10];
        pad_to_block(&mut v);
        assert_eq!(v.len(), BLOCK_SIZE);
        assert_eq!(v[9], 7);
        assert!(v[10..].iter().all(|&b| b == 0));

        let mut empty = Vec::new();
        pad_to_block(&mut empty);
        assert!(empty.is_empty());
    }
}
