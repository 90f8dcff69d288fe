//! 32-bit Fletcher-style checksum used for dictionary blobs and block payloads.
//!
//! Byte-oriented variant: both running sums start at `0xffff` and are folded
//! back to 16 bits every 360 bytes, which keeps them from overflowing `u32`.

/// Bytes summed between two folds.
const FOLD_INTERVAL: usize = 360;

/// Compute the checksum of `data`.
pub fn fletcher32(data: &[u8]) -> u32 {
    let mut sum1: u32 = 0xffff;
    let mut sum2: u32 = 0xffff;

    for chunk in data.chunks(FOLD_INTERVAL) {
        for &b in chunk {
            sum1 = sum1.wrapping_add(b as u32);
            sum2 = sum2.wrapping_add(sum1);
        }
        sum1 = (sum1 & 0xffff) + (sum1 >> 16);
        sum2 = (sum2 & 0xffff) + (sum2 >> 16);
    }
    sum1 = (sum1 & 0xffff) + (sum1 >> 16);
    sum2 = (sum2 & 0xffff) + (sum2 >> 16);

    (sum2 << 16) | sum1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_values() {
        assert_eq!(fletcher32(&[]), 0xffff_ffff);
        assert_eq!(fletcher32(&[1, 2, 3]), 0x000a_0006);
        assert_eq!(fletcher32(b"abcde"), 0x05c3_01ef);
        assert_eq!(fletcher32(&[0xff; 1000]), 0x7887_e41b);
    }

    #[test]
    fn detects_single_byte_flip() {
        let mut data: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();
        let before = fletcher32(&data);
        data[2048] ^= 0x40;
        assert_ne!(before, fletcher32(&data));
    }

    proptest! {
        #[test]
        fn deterministic(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            prop_assert_eq!(fletcher32(&data), fletcher32(&data.clone()));
        }
    }
}
