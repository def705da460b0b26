//! Reversible obfuscation used by some archive formats.

/// Byte passed through untouched by the TXB cipher in both directions
const TXB_NEWLINE: u8 = 0x0A;
const TXB_KEY: u8 = 0xA7;

/// Longest prefix of an RFF entry covered by per-entry encryption
pub const BLOOD_ENTRY_LIMIT: usize = 256;

/// Decode Descent `.txb`/`.ctb` text in place
///
/// Each byte is rotated left by two bits and xored with `0xA7`. Newlines are stored
/// in the clear, so plain `0x8F` (the decoding of a stored newline) cannot round trip.
pub fn txb_decode(data: &mut [u8]) {
    for byte in data.iter_mut().filter(|b| **b != TXB_NEWLINE) {
        *byte = byte.rotate_left(2) ^ TXB_KEY;
    }
}

/// Encode text into Descent `.txb`/`.ctb` form in place, the inverse of [`txb_decode`]
pub fn txb_encode(data: &mut [u8]) {
    for byte in data.iter_mut().filter(|b| **b != TXB_NEWLINE) {
        *byte = (*byte ^ TXB_KEY).rotate_right(2);
    }
}

/// Apply the Blood xor keystream to `data` in place
///
/// Byte `i` is xored with `key + i / 2` (truncated to a byte). The transform is its own inverse.
pub fn blood_crypt(data: &mut [u8], key: u32) {
    let key = key as u8;
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key.wrapping_add((i >> 1) as u8);
    }
}

/// Apply RFF per-entry encryption, which covers at most the first 256 bytes with key 0
pub fn blood_crypt_entry(data: &mut [u8]) {
    let len = data.len().min(BLOOD_ENTRY_LIMIT);
    blood_crypt(&mut data[..len], 0);
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn txb_round_trip_all_bytes() {
        let plain: Vec<u8> = (0..=255u8).filter(|b| *b != 0x8F).collect();

        let mut data = plain.clone();
        txb_encode(&mut data);
        assert_ne!(data, plain);
        txb_decode(&mut data);

        assert_eq!(data, plain);
    }

    #[test]
    fn txb_newline_is_clear() {
        let mut data = vec![b'\n', b'\n'];
        txb_encode(&mut data);
        assert_eq!(data, vec![0x0A, 0x0A]);
        txb_decode(&mut data);
        assert_eq!(data, vec![0x0A, 0x0A]);
    }

    #[test]
    fn txb_excluded_byte_does_not_round_trip() {
        let mut data = vec![0x8F];
        txb_encode(&mut data);
        assert_eq!(data, vec![0x0A]);
        txb_decode(&mut data);
        assert_eq!(data, vec![0x0A]);
    }

    #[test]
    fn txb_known_value() {
        // 'A' (0x41) ^ 0xA7 = 0xE6, rotated right twice = 0xB9
        let mut data = vec![b'A'];
        txb_encode(&mut data);
        assert_eq!(data, vec![0xB9]);
    }

    #[test]
    fn blood_is_involution() {
        let plain: Vec<u8> = (0..600).map(|i| (i * 7) as u8).collect();
        let mut data = plain.clone();

        blood_crypt(&mut data, 0x1234);
        assert_ne!(data, plain);
        blood_crypt(&mut data, 0x1234);

        assert_eq!(data, plain);
    }

    #[test]
    fn blood_keystream() {
        let mut data = vec![0u8; 6];
        blood_crypt(&mut data, 0x1FE);
        assert_eq!(data, vec![0xFE, 0xFE, 0xFF, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn blood_entry_prefix_only() {
        let plain = vec![0u8; 300];
        let mut data = plain.clone();

        blood_crypt_entry(&mut data);

        for (i, byte) in data.iter().enumerate() {
            let expected = if i < BLOOD_ENTRY_LIMIT { (i >> 1) as u8 } else { 0 };
            assert_eq!(*byte, expected, "byte {i}");
        }
    }
}
