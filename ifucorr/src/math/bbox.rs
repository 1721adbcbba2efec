//! Integer pixel bounding box.

/// Axis-aligned box with inclusive bounds. An empty box has `min > max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aabb {
    pub min_x: usize,
    pub max_x: usize,
    pub min_y: usize,
    pub max_y: usize,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    #[inline]
    pub const fn empty() -> Self {
        Self {
            min_x: usize::MAX,
            max_x: 0,
            min_y: usize::MAX,
            max_y: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Grow to include the pixel `(x, y)`.
    #[inline]
    pub fn include(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    #[inline]
    pub fn width(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.max_x - self.min_x + 1
        }
    }

    #[inline]
    pub fn height(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.max_y - self.min_y + 1
        }
    }

    /// Box of all pixels accepted by `pred`, `None` if there are none.
    pub fn of_pixels(
        width: usize,
        height: usize,
        mut pred: impl FnMut(usize, usize) -> bool,
    ) -> Option<Self> {
        let mut bbox = Self::empty();
        for y in 0..height {
            for x in 0..width {
                if pred(x, y) {
                    bbox.include(x, y);
                }
            }
        }
        (!bbox.is_empty()).then_some(bbox)
    }
}
