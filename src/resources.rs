use serde::{Deserialize, Serialize};

use crate::error::{GCodeError, Result};

/// Identifier of one shared hardware resource (an axis group, a heater...).
pub type Resource = u8;

/// One bit per resource held by a machine state.
///
/// Only stores ownership. Arbitration between channels (check the other
/// channels' bitmaps, then set) belongs to the caller.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResourceBitmap(u32);

impl ResourceBitmap {
    pub const CAPACITY: u8 = u32::BITS as u8;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    fn mask(r: Resource) -> Result<u32> {
        1u32.checked_shl(u32::from(r)).ok_or(GCodeError::ResourceOutOfRange(r))
    }

    /// Out-of-range resources are never held.
    pub fn is_set(self, r: Resource) -> bool {
        Self::mask(r).is_ok_and(|m| self.0 & m != 0)
    }

    pub fn set(&mut self, r: Resource) -> Result<()> {
        self.0 |= Self::mask(r)?;
        Ok(())
    }

    pub fn clear(&mut self, r: Resource) -> Result<()> {
        self.0 &= !Self::mask(r)?;
        Ok(())
    }

    pub fn clear_all(&mut self) {
        self.0 = 0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// True if any resource is held in both bitmaps.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = Resource> {
        (0..Self::CAPACITY).filter(move |r| self.is_set(*r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_test_clear() {
        let mut locks = ResourceBitmap::empty();
        assert!(locks.is_empty());
        locks.set(0).unwrap();
        locks.set(31).unwrap();
        assert!(locks.is_set(0));
        assert!(locks.is_set(31));
        assert!(!locks.is_set(5));
        assert_eq!(locks.count(), 2);
        assert_eq!(locks.iter().collect::<Vec<_>>(), vec![0, 31]);

        locks.clear(0).unwrap();
        assert!(!locks.is_set(0));
        assert_eq!(locks.bits(), 1 << 31);
        locks.clear_all();
        assert!(locks.is_empty());
    }

    #[test]
    fn intersection_detects_contention() {
        let mut a = ResourceBitmap::empty();
        let mut b = ResourceBitmap::empty();
        a.set(2).unwrap();
        b.set(3).unwrap();
        assert!(!a.intersects(b));
        b.set(2).unwrap();
        assert!(a.intersects(b));
        assert_eq!(a.union(b).bits(), 0b1100);
    }

    #[test]
    fn out_of_range_resource_is_rejected() {
        let mut locks = ResourceBitmap::empty();
        locks.set(5).unwrap();
        assert_eq!(locks.set(32), Err(GCodeError::ResourceOutOfRange(32)));
        assert_eq!(locks.set(40), Err(GCodeError::ResourceOutOfRange(40)));
        assert_eq!(locks.clear(255), Err(GCodeError::ResourceOutOfRange(255)));
        assert!(!locks.is_set(40));
        assert_eq!(locks.bits(), 1 << 5);
    }
}
