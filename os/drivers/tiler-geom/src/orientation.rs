use bitfield_struct::bitfield;

/// View transform of a block.
///
/// Each flag maps to the bit of the same name in a [`TilerAddress`](crate::TilerAddress).
/// The inversions always refer to the *natural* axes, i.e. they are applied
/// before the axes are swapped.
#[bitfield(u8)]
#[derive(PartialEq, Eq, Hash)]
pub struct Orientation {
    /// Mirror the natural x axis.
    pub x_invert: bool,
    /// Mirror the natural y axis.
    pub y_invert: bool,
    /// Swap the natural axes.
    pub xy_flip: bool,
    #[bits(5, default = 0)]
    _reserved: u8,
}

impl Orientation {
    pub const NATURAL: Self = Self::new();
    /// Clockwise rotation by 90°.
    pub const ROTATE_90: Self = Self::new().with_xy_flip(true).with_y_invert(true);
    pub const ROTATE_180: Self = Self::new().with_x_invert(true).with_y_invert(true);
    pub const ROTATE_270: Self = Self::new().with_xy_flip(true).with_x_invert(true);

    /// Build the orientation for a clockwise rotation in degrees, optionally
    /// followed by a horizontal mirror of the rotated view.
    ///
    /// Returns `None` for angles that are not multiples of 90°.
    #[must_use]
    pub fn from_rotation(degrees: i32, mirror: bool) -> Option<Self> {
        let degrees = degrees.rem_euclid(360);
        if degrees % 90 != 0 {
            return None;
        }

        let rotated = match degrees / 90 {
            0 => Self::NATURAL,
            1 => Self::ROTATE_90,
            2 => Self::ROTATE_180,
            _ => Self::ROTATE_270,
        };

        if !mirror {
            return Some(rotated);
        }

        // The view's horizontal axis is natural y once the axes are swapped.
        Some(if rotated.xy_flip() {
            rotated.with_y_invert(!rotated.y_invert())
        } else {
            rotated.with_x_invert(!rotated.x_invert())
        })
    }

    #[inline]
    #[must_use]
    pub const fn is_natural(self) -> bool {
        !self.x_invert() && !self.y_invert() && !self.xy_flip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotations() {
        assert_eq!(Orientation::from_rotation(0, false), Some(Orientation::NATURAL));
        assert_eq!(Orientation::from_rotation(90, false), Some(Orientation::ROTATE_90));
        assert_eq!(Orientation::from_rotation(-90, false), Some(Orientation::ROTATE_270));
        assert_eq!(Orientation::from_rotation(540, false), Some(Orientation::ROTATE_180));
        assert_eq!(Orientation::from_rotation(45, false), None);
    }

    #[test]
    fn mirroring_follows_the_view_axis() {
        let m0 = Orientation::from_rotation(0, true).unwrap();
        assert!(m0.x_invert() && !m0.y_invert() && !m0.xy_flip());

        let m90 = Orientation::from_rotation(90, true).unwrap();
        assert!(m90.xy_flip() && !m90.y_invert() && !m90.x_invert());

        let m180 = Orientation::from_rotation(180, true).unwrap();
        assert!(!m180.x_invert() && m180.y_invert());
    }
}
