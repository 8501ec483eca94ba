use crc32fast::Hasher;

use crate::error::{GCodeError, Result};

/// Running CRC-32 over raw bytes passed through a channel while it is in
/// binary mode. The bytes themselves go to a sink owned by the caller.
#[derive(Debug, Default, Clone)]
pub struct BinaryTransfer {
    writing: bool,
    hasher: Hasher,
    expected: Option<u32>,
    bytes: u64,
}

impl BinaryTransfer {
    pub fn is_writing(&self) -> bool {
        self.writing
    }

    /// Entering binary mode restarts the accumulator.
    pub fn set_writing(&mut self, writing: bool) {
        if writing && !self.writing {
            self.hasher = Hasher::new();
            self.expected = None;
            self.bytes = 0;
        }
        self.writing = writing;
    }

    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        if !self.writing {
            return Err(GCodeError::NotWritingBinary);
        }
        self.hasher.update(data);
        self.bytes += data.len() as u64;
        Ok(())
    }

    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes
    }

    pub fn expected_crc32(&self) -> Option<u32> {
        self.expected
    }

    pub fn set_expected_crc32(&mut self, crc: u32) {
        self.expected = Some(crc);
    }

    /// Leave binary mode and check the accumulated CRC against the declared
    /// one. Without a declared value the computed CRC is just returned.
    pub fn finish(&mut self) -> Result<u32> {
        if !self.writing {
            return Err(GCodeError::NotWritingBinary);
        }
        self.writing = false;
        let computed = self.crc32();
        match self.expected {
            Some(expected) if expected != computed => {
                console_log!("binary transfer CRC mismatch: expected {:08x}, got {:08x}", expected, computed);
                Err(GCodeError::CrcMismatch { expected, computed })
            }
            _ => Ok(computed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_matches_declared_value() {
        let mut transfer = BinaryTransfer::default();
        transfer.set_writing(true);
        transfer.update(b"1234").unwrap();
        transfer.update(b"56789").unwrap();
        assert_eq!(transfer.bytes_received(), 9);
        // CRC-32/IEEE check value
        transfer.set_expected_crc32(0xcbf4_3926);
        assert_eq!(transfer.finish(), Ok(0xcbf4_3926));
        assert!(!transfer.is_writing());
    }

    #[test]
    fn crc_mismatch_is_reported() {
        let mut transfer = BinaryTransfer::default();
        transfer.set_writing(true);
        transfer.update(b"123456789").unwrap();
        transfer.set_expected_crc32(1);
        assert_eq!(
            transfer.finish(),
            Err(GCodeError::CrcMismatch { expected: 1, computed: 0xcbf4_3926 })
        );
    }

    #[test]
    fn update_outside_binary_mode_fails() {
        let mut transfer = BinaryTransfer::default();
        assert_eq!(transfer.update(b"x"), Err(GCodeError::NotWritingBinary));
        assert_eq!(transfer.finish(), Err(GCodeError::NotWritingBinary));
    }

    #[test]
    fn restarting_clears_the_accumulator() {
        let mut transfer = BinaryTransfer::default();
        transfer.set_writing(true);
        transfer.update(b"garbage").unwrap();
        transfer.set_writing(false);
        transfer.set_writing(true);
        transfer.update(b"123456789").unwrap();
        assert_eq!(transfer.crc32(), 0xcbf4_3926);
    }
}
