//! Seven-round XOR/rotate byte transform.
//!
//! Forward round `r` (client side), for every byte position `i`:
//! `b = rotl(b ^ key[i % len], (r + i) % 8) ^ (r * 13)`, then the whole buffer
//! is reversed. The inverse runs rounds 6..=0, reversing first and undoing the
//! per-byte steps in the opposite order.
//!
//! This is obfuscation, not encryption. There is no integrity tag and no IV;
//! anyone holding the served key can read and forge payloads.

use super::key_manager::DerivedKey;
use super::types::{ROUNDS, ROUND_CONSTANT};

fn round_mask(round: usize) -> u8 {
    (round as u8).wrapping_mul(ROUND_CONSTANT)
}

fn shift_for(round: usize, index: usize) -> u32 {
    ((round + index) % 8) as u32
}

/// Apply the forward transform in place.
pub fn obfuscate(bytes: &mut [u8], key: &DerivedKey) {
    let key = key.as_bytes();
    for round in 0..ROUNDS {
        let mask = round_mask(round);
        for (i, byte) in bytes.iter_mut().enumerate() {
            let mixed = *byte ^ key[i % key.len()];
            *byte = mixed.rotate_left(shift_for(round, i)) ^ mask;
        }
        bytes.reverse();
    }
}

/// Undo [`obfuscate`] in place.
pub fn deobfuscate(bytes: &mut [u8], key: &DerivedKey) {
    let key = key.as_bytes();
    for round in (0..ROUNDS).rev() {
        bytes.reverse();
        let mask = round_mask(round);
        for (i, byte) in bytes.iter_mut().enumerate() {
            let unmasked = *byte ^ mask;
            *byte = unmasked.rotate_right(shift_for(round, i)) ^ key[i % key.len()];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_manager::derive_key;

    fn key() -> DerivedKey {
        derive_key("AAAA", "device-1", 42)
    }

    #[test]
    fn inverse_restores_input() {
        let original = b"1735689600|device-1|42|{\"email\":\"a@example.com\"}".to_vec();
        let mut bytes = original.clone();
        obfuscate(&mut bytes, &key());
        assert_ne!(bytes, original);
        deobfuscate(&mut bytes, &key());
        assert_eq!(bytes, original);
    }

    #[test]
    fn empty_input_is_untouched() {
        let mut bytes: Vec<u8> = Vec::new();
        obfuscate(&mut bytes, &key());
        assert!(bytes.is_empty());
        deobfuscate(&mut bytes, &key());
        assert!(bytes.is_empty());
    }

    #[test]
    fn single_byte_matches_hand_computation() {
        // One byte, so reversal is a no-op and i == 0 every round.
        let key = key();
        let k = key.as_bytes()[0];
        let mut expected = b'x';
        for round in 0..7usize {
            expected = (expected ^ k).rotate_left((round % 8) as u32) ^ (round as u8 * 13);
        }
        let mut bytes = vec![b'x'];
        obfuscate(&mut bytes, &key);
        assert_eq!(bytes, vec![expected]);
    }

    #[test]
    fn wrong_key_does_not_restore_input() {
        let original = b"1735689600|device-1|42|{}".to_vec();
        let mut bytes = original.clone();
        obfuscate(&mut bytes, &key());
        let other = derive_key("zzzz", "device-1", 42);
        assert_ne!(other, key());
        deobfuscate(&mut bytes, &other);
        assert_ne!(bytes, original);
    }

    #[test]
    fn round_masks() {
        let masks: Vec<u8> = (0..ROUNDS).map(round_mask).collect();
        assert_eq!(masks, vec![0, 13, 26, 39, 52, 65, 78]);
    }
}
