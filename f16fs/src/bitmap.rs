/// A packed bit vector laid over memory owned by someone else.
///
/// Bit `i` lives in byte `i / 8`, at position `i % 8` counted from the least
/// significant bit. The view never outlives the bytes it borrows.
pub struct Bitmap<'a> {
    bits: usize,
    data: &'a mut [u8],
}

impl<'a> Bitmap<'a> {
    /// Overlay `bits` bits onto `data`. Returns `None` if `data` is too short.
    pub fn overlay(bits: usize, data: &'a mut [u8]) -> Option<Self> {
        if bits == 0 || data.len() < (bits + 7) / 8 {
            return None;
        }
        Some(Self { bits, data })
    }

    /// Overlay every bit of `data`.
    pub fn over(data: &'a mut [u8]) -> Self {
        Self {
            bits: data.len() * 8,
            data,
        }
    }

    pub fn bit_count(&self) -> usize {
        self.bits
    }

    pub fn set(&mut self, bit: usize) {
        if bit < self.bits {
            self.data[bit / 8] |= 1 << (bit % 8);
        }
    }

    pub fn reset(&mut self, bit: usize) {
        if bit < self.bits {
            self.data[bit / 8] &= !(1 << (bit % 8));
        }
    }

    pub fn flip(&mut self, bit: usize) {
        if bit < self.bits {
            self.data[bit / 8] ^= 1 << (bit % 8);
        }
    }

    /// Out of range bits read as unset.
    pub fn test(&self, bit: usize) -> bool {
        bit < self.bits && self.data[bit / 8] & (1 << (bit % 8)) != 0
    }

    /// First zero bit.
    pub fn ffz(&self) -> Option<usize> {
        self.ffz_from(0)
    }

    /// First zero bit in the byte holding `from` or after it.
    pub fn ffz_from(&self, from: usize) -> Option<usize> {
        self.scan(from / 8, |byte| byte != u8::MAX, |byte| byte.trailing_ones())
    }

    /// First set bit.
    pub fn ffs(&self) -> Option<usize> {
        self.scan(0, |byte| byte != 0, |byte| byte.trailing_zeros())
    }

    fn scan<P, F>(&self, start: usize, interesting: P, inner: F) -> Option<usize>
    where
        P: Fn(u8) -> bool,
        F: Fn(u8) -> u32,
    {
        let used = (self.bits + 7) / 8;
        self.data[..used]
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, &byte)| interesting(byte))
            .map(|(pos, &byte)| pos * 8 + inner(byte) as usize)
            .filter(|&bit| bit < self.bits)
    }

    pub fn total_set(&self) -> usize {
        (0..self.bits).filter(|&bit| self.test(bit)).count()
    }

    /// Fill every byte of the map with `pattern`.
    pub fn format(&mut self, pattern: u8) {
        let used = (self.bits + 7) / 8;
        self.data[..used].fill(pattern);
        let tail = self.bits % 8;
        if tail != 0 {
            self.data[used - 1] &= (1u8 << tail) - 1;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..(self.bits + 7) / 8]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_rejects_short_memory() {
        let mut data = [0u8; 2];
        assert!(Bitmap::overlay(17, &mut data).is_none());
        assert!(Bitmap::overlay(0, &mut data).is_none());
        assert!(Bitmap::overlay(16, &mut data).is_some());
    }

    #[test]
    fn writes_land_in_borrowed_bytes() {
        let mut data = [0u8; 4];
        {
            let mut map = Bitmap::overlay(32, &mut data).unwrap();
            map.set(0);
            map.set(9);
            map.flip(31);
            map.flip(9);
        }
        assert_eq!(data, [0x01, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn first_free_and_first_set() {
        let mut data = [0xFFu8, 0x07, 0, 0];
        let mut map = Bitmap::overlay(32, &mut data).unwrap();
        assert_eq!(map.ffz(), Some(11));
        assert_eq!(map.ffs(), Some(0));
        map.format(0);
        assert_eq!(map.ffs(), None);
        assert_eq!(map.ffz(), Some(0));
        map.set(20);
        assert_eq!(map.ffs(), Some(20));
        map.format(0xFF);
        map.reset(3);
        map.reset(25);
        assert_eq!(map.ffz_from(8), Some(25));
        assert_eq!(map.ffz_from(0), Some(3));
    }

    #[test]
    fn ffz_respects_bit_count() {
        let mut data = [0xFFu8, 0x0F];
        let map = Bitmap::overlay(12, &mut data).unwrap();
        assert_eq!(map.ffz(), None);
        assert_eq!(map.total_set(), 12);
    }

    #[test]
    fn format_clears_unused_tail() {
        let mut data = [0u8; 2];
        let mut map = Bitmap::overlay(10, &mut data).unwrap();
        map.format(0xFF);
        assert_eq!(map.total_set(), 10);
        assert_eq!(map.as_bytes(), &[0xFF, 0x03]);
        map.reset(3);
        assert!(!map.test(3));
        assert!(!map.test(10));
    }
}
