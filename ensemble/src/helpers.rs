use num_traits::Num;
use std::fmt::Debug;

use crate::errors::{Error, Result};

/// Make sure bounds are ordered correctly, eg north is above south, east is to the right of west.
///
pub fn rearrange<N>(lower: N, upper: N) -> (N, N)
where
    N: Num + Debug + PartialOrd,
{
    if lower > upper {
        (upper, lower)
    } else {
        (lower, upper)
    }
}

/// Iterate over every index in the cartesian product of `ranges`, last axis varying fastest.
///
pub(crate) fn cartesian(ranges: &[std::ops::Range<usize>]) -> Vec<Vec<usize>> {
    let mut product = vec![vec![]];
    for range in ranges {
        let mut next = Vec::with_capacity(product.len() * range.len());
        for prefix in &product {
            for i in range.clone() {
                let mut index = prefix.clone();
                index.push(i);
                next.push(index);
            }
        }
        product = next;
    }

    product
}

/// Narrow a count to the width it is stored with
///
pub(crate) fn narrow<T: TryFrom<usize>>(value: usize, what: &str) -> Result<T> {
    T::try_from(value).map_err(|_| Error::Format(format!("{what} too large to store: {value}")))
}
