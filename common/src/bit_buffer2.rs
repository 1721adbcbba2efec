//! Bit-packed 2D buffer for boolean masks.
//!
//! Uses 1 bit per element, stored row-major in `u64` words.

/// Number of bits per storage word.
const BITS_PER_WORD: usize = 64;

/// A 2D buffer storing boolean values packed as bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBuffer2 {
    words: Vec<u64>,
    width: usize,
    height: usize,
    /// Total number of bits (width * height).
    len: usize,
}

impl BitBuffer2 {
    /// Create a new bit buffer filled with the given value.
    pub fn new_filled(width: usize, height: usize, value: bool) -> Self {
        let len = width * height;
        let mut buf = Self {
            words: vec![0; len.div_ceil(BITS_PER_WORD)],
            width,
            height,
            len,
        };
        if value {
            buf.fill(true);
        }
        buf
    }

    #[inline]
    pub fn new_default(width: usize, height: usize) -> Self {
        Self::new_filled(width, height, false)
    }

    /// Build a mask by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut buf = Self::new_default(width, height);
        for y in 0..height {
            for x in 0..width {
                if f(x, y) {
                    buf.set_xy(x, y, true);
                }
            }
        }
        buf
    }

    /// Create a new bit buffer from a slice of booleans.
    pub fn from_slice(width: usize, height: usize, data: &[bool]) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length {} does not match dimensions {}x{}",
            data.len(),
            width,
            height
        );
        let mut buf = Self::new_default(width, height);
        for (i, &value) in data.iter().enumerate() {
            if value {
                buf.set(i, true);
            }
        }
        buf
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        debug_assert!(idx < self.len);
        (self.words[idx / BITS_PER_WORD] >> (idx % BITS_PER_WORD)) & 1 != 0
    }

    #[inline]
    pub fn set(&mut self, idx: usize, value: bool) {
        debug_assert!(idx < self.len);
        let word = &mut self.words[idx / BITS_PER_WORD];
        let bit = 1u64 << (idx % BITS_PER_WORD);
        if value {
            *word |= bit;
        } else {
            *word &= !bit;
        }
    }

    #[inline]
    pub fn get_xy(&self, x: usize, y: usize) -> bool {
        debug_assert!(x < self.width && y < self.height);
        self.get(y * self.width + x)
    }

    #[inline]
    pub fn set_xy(&mut self, x: usize, y: usize, value: bool) {
        debug_assert!(x < self.width && y < self.height);
        self.set(y * self.width + x, value);
    }

    /// Fill all bits with the given value. Padding bits past `len` stay clear.
    pub fn fill(&mut self, value: bool) {
        let fill = if value { !0u64 } else { 0u64 };
        self.words.fill(fill);
        let tail = self.len % BITS_PER_WORD;
        if value && tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
    }

    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Number of set bits.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Linear indices of all set bits, in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_idx, &word)| {
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let offset = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some(word_idx * BITS_PER_WORD + offset)
                })
            })
    }

    /// Iterate over all bit values.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_filled() {
        let buf = BitBuffer2::new_filled(10, 7, true);
        assert_eq!(buf.len(), 70);
        assert_eq!(buf.count_ones(), 70);

        let buf = BitBuffer2::new_filled(10, 7, false);
        assert_eq!(buf.count_ones(), 0);
    }

    #[test]
    fn test_set_get_across_word_boundary() {
        let mut buf = BitBuffer2::new_default(64, 3);
        for idx in [0, 63, 64, 127, 191] {
            buf.set(idx, true);
        }
        assert!(buf.get(63));
        assert!(buf.get(64));
        assert!(!buf.get(62));
        assert!(!buf.get(65));

        buf.set(64, false);
        assert!(!buf.get(64));
        assert_eq!(buf.count_ones(), 4);
    }

    #[test]
    fn test_xy_access() {
        let mut buf = BitBuffer2::new_default(100, 100);
        buf.set_xy(50, 50, true);
        assert!(buf.get_xy(50, 50));
        assert!(!buf.get_xy(50, 51));
        assert!(buf.get(50 * 100 + 50));
    }

    #[test]
    fn test_from_fn_and_iter_ones() {
        let buf = BitBuffer2::from_fn(5, 4, |x, y| x == y);
        let ones: Vec<usize> = buf.iter_ones().collect();
        assert_eq!(ones, vec![0, 6, 12, 18]);
    }

    #[test]
    fn test_from_slice() {
        let data = vec![true, false, true, false, false, true];
        let buf = BitBuffer2::from_slice(3, 2, &data);
        let values: Vec<bool> = buf.iter().collect();
        assert_eq!(values, data);
    }
}
