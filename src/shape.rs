//! Buffer shapes.

use crate::error::{Error, Result};
use std::fmt;

/// The extents of a `D`-dimensional buffer.
///
/// Every extent is positive and the product of all extents fits in a
/// `usize`; both are checked by [`Shape::new`].
///
/// # Example
///
/// ```rust
/// use hetbuf::Shape;
///
/// let shape = Shape::new([4, 8]).unwrap();
/// assert_eq!(shape.count(), 32);
/// assert_eq!(shape.extent(1), 8);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape<const D: usize> {
    extents: [usize; D],
}

impl<const D: usize> Shape<D> {
    /// Create a shape from its extents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if any extent is zero, if `D` is zero,
    /// or if the element count overflows.
    pub fn new(extents: [usize; D]) -> Result<Self> {
        if D == 0 {
            return Err(Error::InvalidShape("a shape needs at least one dimension".into()));
        }
        if let Some(axis) = extents.iter().position(|&e| e == 0) {
            return Err(Error::InvalidShape(format!("extent {} is zero", axis)));
        }
        extents
            .iter()
            .try_fold(1usize, |acc, &e| acc.checked_mul(e))
            .ok_or_else(|| Error::InvalidShape(format!("element count of {:?} overflows", extents)))?;

        Ok(Self { extents })
    }

    /// The extents, one per dimension.
    #[inline]
    pub fn extents(&self) -> &[usize; D] {
        &self.extents
    }

    /// The extent along `axis`.
    ///
    /// # Panics
    ///
    /// Panics if `axis >= D`.
    #[inline]
    pub fn extent(&self, axis: usize) -> usize {
        self.extents[axis]
    }

    /// Number of dimensions.
    #[inline]
    pub const fn dimensions(&self) -> usize {
        D
    }

    /// Total number of elements (the product of all extents).
    #[inline]
    pub fn count(&self) -> usize {
        // Overflow was ruled out in `new`.
        self.extents.iter().product()
    }
}

impl Shape<1> {
    /// One-dimensional shape of `len` elements.
    pub fn linear(len: usize) -> Result<Self> {
        Self::new([len])
    }
}

impl<const D: usize> TryFrom<[usize; D]> for Shape<D> {
    type Error = Error;

    fn try_from(extents: [usize; D]) -> Result<Self> {
        Self::new(extents)
    }
}

impl<const D: usize> fmt::Debug for Shape<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape{:?}", self.extents)
    }
}

impl<const D: usize> fmt::Display for Shape<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for extent in &self.extents {
            if !first {
                f.write_str("x")?;
            }
            write!(f, "{}", extent)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_count_is_product() {
        assert_eq!(Shape::new([4]).unwrap().count(), 4);
        assert_eq!(Shape::new([2, 3]).unwrap().count(), 6);
        assert_eq!(Shape::new([2, 3, 5]).unwrap().count(), 30);
    }

    #[test]
    fn test_shape_rejects_zero_extent() {
        assert!(matches!(Shape::new([3, 0]), Err(Error::InvalidShape(_))));
    }

    #[test]
    fn test_shape_rejects_overflow() {
        assert!(matches!(
            Shape::new([usize::MAX, 2]),
            Err(Error::InvalidShape(_))
        ));
    }

    #[test]
    fn test_shape_rejects_zero_dimensions() {
        assert!(Shape::<0>::new([]).is_err());
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(Shape::new([2, 3, 4]).unwrap().to_string(), "2x3x4");
        assert_eq!(Shape::linear(7).unwrap().to_string(), "7");
    }
}
