/// Running XOR checksum used by command packets and express capsules.
#[derive(Debug, Default)]
pub struct Checksum {
    current: u8,
}

impl Checksum {
    #[inline]
    pub fn new() -> Checksum {
        Checksum { current: 0 }
    }

    #[inline]
    pub fn push_slice(&mut self, data: &[u8]) {
        for d in data {
            self.current ^= d;
        }
    }

    #[inline]
    pub fn checksum(&self) -> u8 {
        self.current
    }
}

/// XOR of every byte in `data`.
pub fn xor_checksum(data: &[u8]) -> u8 {
    let mut checksum = Checksum::new();
    checksum.push_slice(data);
    checksum.checksum()
}

/// CRC32 as computed by the device firmware for HQ capsules.
///
/// The firmware pads its input with zero bytes up to a multiple of four before
/// finishing the CRC, so the padding has to be fed here as well.
pub fn device_crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    let remainder = data.len() % 4;
    if remainder != 0 {
        hasher.update(&[0u8; 4][..4 - remainder]);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_of_bytes() {
        assert_eq!(xor_checksum(&[0xA5, 0x82, 0x05, 0, 0, 0, 0, 0]), 0x22);
        assert_eq!(xor_checksum(&[]), 0);
    }

    #[test]
    fn crc_pads_to_word_boundary() {
        assert_eq!(device_crc32(&[1, 2, 3, 4]), crc32fast::hash(&[1, 2, 3, 4]));
        assert_eq!(device_crc32(&[1, 2, 3]), crc32fast::hash(&[1, 2, 3, 0]));
        assert_eq!(device_crc32(&[9]), crc32fast::hash(&[9, 0, 0, 0]));
    }
}
