//! Current and maximum array extents.

use std::fmt;

use smallvec::{smallvec, SmallVec};

use super::{Error, Result};

/// Extent of every dimension; rank 0 holds a single element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn d1(len: usize) -> Self {
        Self { dims: smallvec![len] }
    }

    pub fn d2(rows: usize, cols: usize) -> Self {
        Self { dims: smallvec![rows, cols] }
    }

    pub fn d3(a: usize, b: usize, c: usize) -> Self {
        Self { dims: smallvec![a, b, c] }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Self { dims: dims.into() }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn size(&self, dim: usize) -> Option<usize> {
        self.dims.get(dim).copied()
    }

    pub fn sizes(&self) -> &[usize] {
        &self.dims
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Element count over all dimensions.
    pub fn num_points(&self) -> usize {
        self.dims.iter().product()
    }

    /// `None` when the element count does not fit in `usize`.
    pub fn checked_num_points(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Bytes taken by every element at `size` bytes each.
    pub fn checked_bytes(&self, size: usize) -> Option<usize> {
        self.checked_num_points()?.checked_mul(size)
    }

    /// Bytes of one row slab at `size` bytes per element.
    pub fn checked_row_bytes(&self, size: usize) -> Option<usize> {
        self.dims.iter().skip(1).try_fold(size, |acc, &d| acc.checked_mul(d))
    }

    /// Length of dimension 0, or 1 for a scalar.
    pub fn rows(&self) -> usize {
        self.dims.first().map_or(1, |&d| d)
    }

    /// Elements in one row slab (every dimension after the first).
    pub fn row_len(&self) -> usize {
        self.dims.iter().skip(1).product()
    }

    /// Ignored when `dim` is out of range.
    pub fn set_size(&mut self, dim: usize, len: usize) {
        if let Some(d) = self.dims.get_mut(dim) {
            *d = len;
        }
    }
}

impl From<usize> for Shape {
    fn from(len: usize) -> Self {
        Self::d1(len)
    }
}

impl From<(usize, usize)> for Shape {
    fn from((rows, cols): (usize, usize)) -> Self {
        Self::d2(rows, cols)
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((a, b, c): (usize, usize, usize)) -> Self {
        Self::d3(a, b, c)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self { dims: dims.into() }
    }
}

fn write_dims<T>(f: &mut fmt::Formatter<'_>, dims: &[T], one: impl Fn(&T) -> String) -> fmt::Result {
    let parts: Vec<String> = dims.iter().map(one).collect();
    write!(f, "[{}]", parts.join(" x "))
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_dims(f, &self.dims, usize::to_string)
    }
}

/// Growth limit per dimension; `None` is unlimited.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MaxShape {
    dims: SmallVec<[Option<usize>; 4]>,
}

impl MaxShape {
    /// Pinned to the current extents.
    pub fn fixed(shape: &Shape) -> Self {
        Self { dims: shape.sizes().iter().copied().map(Some).collect() }
    }

    /// Dimension 0 unlimited, the others pinned.
    pub fn unlimited_rows(shape: &Shape) -> Self {
        let mut max = Self::fixed(shape);
        if let Some(first) = max.dims.first_mut() {
            *first = None;
        }
        max
    }

    pub fn from_slice(dims: &[Option<usize>]) -> Self {
        Self { dims: dims.into() }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn sizes(&self) -> &[Option<usize>] {
        &self.dims
    }

    pub fn is_resizable(&self) -> bool {
        self.dims.contains(&None)
    }

    /// Ok when `shape` has the same rank and stays within every bound.
    pub fn admits(&self, shape: &Shape) -> Result<()> {
        if shape.rank() != self.rank() {
            return Err(Error::ShapeMismatch(format!(
                "rank {} against maximum of rank {}",
                shape.rank(),
                self.rank()
            )));
        }
        let over = shape
            .sizes()
            .iter()
            .zip(&self.dims)
            .enumerate()
            .find_map(|(dim, (&cur, max))| max.filter(|&m| cur > m).map(|m| (dim, cur, m)));
        match over {
            Some((dim, cur, max)) => {
                Err(Error::ShapeMismatch(format!("dimension {dim} is {cur}, limit {max}")))
            }
            None => Ok(()),
        }
    }
}

impl fmt::Display for MaxShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_dims(f, &self.dims, |d| d.map_or_else(|| "unlimited".to_string(), |d| d.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar() {
        let s = Shape::scalar();
        assert!(s.is_scalar());
        assert_eq!((s.rank(), s.num_points(), s.rows()), (0, 1, 1));
    }

    #[test]
    fn test_row_slab() {
        let s = Shape::d3(10, 20, 2);
        assert_eq!(s.num_points(), 400);
        assert_eq!(s.row_len(), 40);
        assert_eq!(s.to_string(), "[10 x 20 x 2]");
    }

    #[test]
    fn test_checked_extents() {
        let s = Shape::d3(3, 4, 5);
        assert_eq!(s.checked_num_points(), Some(60));
        assert_eq!(s.checked_bytes(8), Some(480));
        assert_eq!(s.checked_row_bytes(8), Some(160));
        assert_eq!(Shape::scalar().checked_bytes(4), Some(4));

        let huge = Shape::d2(1 << 62, 7);
        assert_eq!(huge.checked_num_points(), None);
        assert_eq!(huge.checked_row_bytes(8), Some(56));
        assert_eq!(Shape::d1(usize::MAX).checked_bytes(2), None);
    }

    #[test]
    fn test_max_shape_admits() {
        let max = MaxShape::unlimited_rows(&Shape::d1(100));
        assert!(max.is_resizable());
        assert!(max.admits(&Shape::d1(120)).is_ok());
        assert_eq!(max.to_string(), "[unlimited]");

        let fixed = MaxShape::fixed(&Shape::d2(6, 3));
        assert!(!fixed.is_resizable());
        assert!(matches!(fixed.admits(&Shape::d2(7, 3)), Err(Error::ShapeMismatch(_))));
        assert!(fixed.admits(&Shape::d1(6)).is_err());
        assert_eq!(fixed.to_string(), "[6 x 3]");
    }
}
