//! Audio frame type.

/// A stereo audio frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0.0, right: 0.0 }
    }

    /// Create a mono frame (same value for both channels).
    pub const fn mono(value: f32) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Mix another frame into this one. No clamping; headroom is the caller's.
    #[inline]
    pub fn mix(&mut self, other: Frame) {
        self.left += other.left;
        self.right += other.right;
    }

    /// Scale both channels.
    #[inline]
    pub fn scale(self, gain: f32) -> Frame {
        Frame {
            left: self.left * gain,
            right: self.right * gain,
        }
    }

    /// Apply mid/side stereo separation (1.0 = unchanged, 0.0 = mono).
    #[inline]
    pub fn separate(self, separation: f32) -> Frame {
        let mid = (self.left + self.right) * 0.5;
        let side = (self.left - self.right) * 0.5 * separation;
        Frame {
            left: mid + side,
            right: mid - side,
        }
    }
}
