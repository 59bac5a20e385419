use std::{fmt::Debug, ops::Range};

use num_traits::{Float, PrimInt};

use crate::helpers::rearrange;

/// A regularly spaced floating point coordinate, such as latitude or longitude.
///
/// `step` may be negative, as it is for grids stored north to south.
///
#[derive(Clone, Debug, PartialEq)]
pub struct FloatRange<N>
where
    N: Float + Debug + Send + Sync + 'static,
{
    pub start: N,
    pub step: N,
    pub steps: usize,
}

impl<N> FloatRange<N>
where
    N: Float + Debug + Send + Sync + 'static,
{
    pub fn new(start: N, step: N, steps: usize) -> Self {
        Self { start, step, steps }
    }

    /// Value at `index`. Panics if `index` is out of bounds.
    pub fn get(&self, index: usize) -> N {
        self.check_bounds(index);
        N::from(index).unwrap_or_else(N::nan) * self.step + self.start
    }

    pub fn values(&self) -> Vec<N> {
        (0..self.steps).map(|index| self.get(index)).collect()
    }

    pub fn len(&self) -> usize {
        self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }

    /// Indexes of the values that fall within `[lower, upper]`, in either order.
    ///
    /// Returns an empty range if no value falls within the bounds.
    ///
    pub fn index_range(&self, lower: N, upper: N) -> Range<usize> {
        let (lower, upper) = rearrange(lower, upper);
        index_range_of(self.values().into_iter(), |value| {
            lower <= value && value <= upper
        })
    }

    fn check_bounds(&self, index: usize) {
        if index >= self.steps {
            panic!(
                "Out of bounds: index {index} is out of bounds for coordinate with length {}",
                self.steps
            );
        }
    }
}

/// A regularly spaced integer coordinate, such as ensemble member number.
///
#[derive(Clone, Debug, PartialEq)]
pub struct IntRange<N>
where
    N: PrimInt + Debug + Send + Sync + 'static,
{
    pub start: N,
    pub step: N,
    pub steps: usize,
}

impl<N> IntRange<N>
where
    N: PrimInt + Debug + Send + Sync + 'static,
{
    pub fn new(start: N, step: N, steps: usize) -> Self {
        Self { start, step, steps }
    }

    /// Value at `index`. Panics if `index` is out of bounds or the value doesn't fit in `N`.
    pub fn get(&self, index: usize) -> N {
        if index >= self.steps {
            panic!(
                "Out of bounds: index {index} is out of bounds for coordinate with length {}",
                self.steps
            );
        }
        let index = N::from(index).expect("index fits coordinate type");

        self.start + index * self.step
    }

    pub fn values(&self) -> Vec<N> {
        (0..self.steps).map(|index| self.get(index)).collect()
    }

    pub fn len(&self) -> usize {
        self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }
}

/// Find the contiguous span of positions whose values satisfy `within`.
///
/// Coordinates are monotonic, so the matching values are contiguous. The span runs from the first
/// match to the last.
///
pub(crate) fn index_range_of<T, I, F>(values: I, within: F) -> Range<usize>
where
    I: Iterator<Item = T>,
    F: Fn(T) -> bool,
{
    let mut first = None;
    let mut last = 0;
    for (index, value) in values.enumerate() {
        if within(value) {
            first.get_or_insert(index);
            last = index;
        }
    }

    match first {
        Some(first) => first..last + 1,
        None => 0..0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get() {
        let lat = FloatRange::new(29.5, 0.125, 16);
        assert_eq!(lat.get(0), 29.5);
        assert_eq!(lat.get(4), 30.0);
        assert_eq!(lat.values().len(), 16);
    }

    #[test]
    #[should_panic]
    fn test_get_out_of_bounds() {
        let lat = FloatRange::new(29.5, 0.125, 16);
        lat.get(16);
    }

    #[test]
    fn test_index_range() {
        let lon = FloatRange::new(-98.5, 0.25, 8);
        assert_eq!(lon.index_range(-98.0, -97.5), 2..5);
        assert_eq!(lon.index_range(-97.5, -98.0), 2..5);
        assert_eq!(lon.index_range(-97.6, -97.4), 4..5);
        assert_eq!(lon.index_range(-90.0, -80.0), 0..0);
    }

    #[test]
    fn test_index_range_descending() {
        let lat = FloatRange::new(31.0, -0.5, 6);
        assert_eq!(lat.values(), vec![31.0, 30.5, 30.0, 29.5, 29.0, 28.5]);
        assert_eq!(lat.index_range(29.2, 30.6), 1..4);
    }

    #[test]
    fn test_int_range() {
        let members = IntRange::new(1_i64, 1, 25);
        assert_eq!(members.get(0), 1);
        assert_eq!(members.get(24), 25);
        assert_eq!(members.values(), (1..=25).collect::<Vec<i64>>());
    }
}
