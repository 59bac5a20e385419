//! The numerical work behind each kind of array operation.
//!
//! Kernels are synchronous and operate on whole in-memory arrays. The executor runs them on the
//! worker pool's blocking threads.
//!
use std::ops::Range;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Slice, Zip};

use crate::{
    coords::Coord,
    errors::{Error, Result},
};

/// How to combine several values into one. Missing (NaN) values are skipped.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregator {
    Mean,
    Min,
    Max,

    /// Sum of the values present. Zero if every value is missing.
    Sum,
}

impl Aggregator {
    pub fn apply(&self, values: &[f64]) -> f64 {
        let mut present = values.iter().copied().filter(|value| !value.is_nan());
        match self {
            Aggregator::Sum => present.sum(),
            Aggregator::Mean => {
                let (sum, count) = present.fold((0.0, 0_usize), |(sum, count), value| {
                    (sum + value, count + 1)
                });
                if count == 0 {
                    f64::NAN
                } else {
                    sum / count as f64
                }
            }
            Aggregator::Min => present.reduce(f64::min).unwrap_or(f64::NAN),
            Aggregator::Max => present.reduce(f64::max).unwrap_or(f64::NAN),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aggregator::Mean => "mean",
            Aggregator::Min => "min",
            Aggregator::Max => "max",
            Aggregator::Sum => "sum",
        }
    }
}

/// Comparison of each value against a scalar threshold
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    /// Missing values never satisfy a comparison.
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Lt => value < threshold,
            Comparison::Le => value <= threshold,
            Comparison::Gt => value > threshold,
            Comparison::Ge => value >= threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Sub,
    Mul,
    Div,
}

impl Arithmetic {
    pub fn apply(&self, left: f64, right: f64) -> f64 {
        match self {
            Arithmetic::Add => left + right,
            Arithmetic::Sub => left - right,
            Arithmetic::Mul => left * right,
            Arithmetic::Div => left / right,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Arithmetic::Add => "+",
            Arithmetic::Sub => "-",
            Arithmetic::Mul => "*",
            Arithmetic::Div => "/",
        }
    }
}

fn shape_error(err: ndarray::ShapeError) -> Error {
    Error::Shape(err.to_string())
}

/// Collapse `axes` with `agg`.
///
/// Values are visited in index order, so results don't depend on how the work was scheduled.
///
pub(crate) fn reduce(
    input: ArrayViewD<'_, f64>,
    axes: &[usize],
    agg: Aggregator,
) -> Result<ArrayD<f64>> {
    let kept: Vec<usize> = (0..input.ndim()).filter(|axis| !axes.contains(axis)).collect();
    let shape: Vec<usize> = kept.iter().map(|&axis| input.shape()[axis]).collect();
    let lane: usize = axes.iter().map(|&axis| input.shape()[axis]).product();

    let order: Vec<usize> = kept.iter().chain(axes).copied().collect();
    let values: Vec<f64> = input.permuted_axes(order).iter().copied().collect();
    let reduced = if lane == 0 {
        vec![agg.apply(&[]); shape.iter().product()]
    } else {
        values.chunks(lane).map(|lane| agg.apply(lane)).collect()
    };

    ArrayD::from_shape_vec(IxDyn(&shape), reduced).map_err(shape_error)
}

/// Replace `axis` with one entry per group, each aggregating the group's members along `axis`.
///
pub(crate) fn aggregate(
    input: ArrayViewD<'_, f64>,
    axis: usize,
    groups: &[Vec<usize>],
    agg: Aggregator,
) -> Result<ArrayD<f64>> {
    let mut shape = input.shape().to_vec();
    shape[axis] = groups.len();
    let mut output = ArrayD::from_elem(IxDyn(&shape), f64::NAN);
    for (position, group) in groups.iter().enumerate() {
        let mut slot = output.index_axis_mut(Axis(axis), position);
        if group.is_empty() {
            slot.fill(agg.apply(&[]));
        } else {
            let members = input.select(Axis(axis), group);
            slot.assign(&reduce(members.view(), &[axis], agg)?);
        }
    }

    Ok(output)
}

/// 1.0 where the comparison holds, 0.0 elsewhere
pub(crate) fn compare(input: ArrayViewD<'_, f64>, cmp: Comparison, threshold: f64) -> ArrayD<f64> {
    input.mapv(|value| {
        if cmp.holds(value, threshold) {
            1.0
        } else {
            0.0
        }
    })
}

pub(crate) fn scalar(input: ArrayViewD<'_, f64>, op: Arithmetic, value: f64) -> ArrayD<f64> {
    input.mapv(|element| op.apply(element, value))
}

/// Lay an array with coordinates `from` out along coordinates `to`, repeating it along any
/// dimension it doesn't have.
///
/// Every dimension of `from` must appear in `to` with identical coordinate values.
///
pub(crate) fn broadcast(
    input: ArrayViewD<'_, f64>,
    from: &[Coord],
    to: &[Coord],
) -> Result<ArrayD<f64>> {
    let mut placed = Vec::with_capacity(from.len());
    for (axis, coord) in from.iter().enumerate() {
        let target = to
            .iter()
            .position(|candidate| candidate.name == coord.name)
            .ok_or_else(|| {
                Error::Shape(format!(
                    "can't broadcast dimension {} onto ({})",
                    coord.name,
                    names(to)
                ))
            })?;
        if to[target] != *coord {
            return Err(Error::Shape(format!(
                "coordinates for dimension {} don't line up ({} vs {} values)",
                coord.name,
                coord.len(),
                to[target].len()
            )));
        }
        placed.push((target, axis));
    }
    placed.sort_unstable();

    let order: Vec<usize> = placed.iter().map(|&(_, axis)| axis).collect();
    let mut view = input.permuted_axes(order);
    for target in 0..to.len() {
        if !placed.iter().any(|&(placed, _)| placed == target) {
            view = view.insert_axis(Axis(target));
        }
    }

    let shape: Vec<usize> = to.iter().map(Coord::len).collect();
    let view = view.broadcast(IxDyn(&shape)).ok_or_else(|| {
        Error::Shape(format!("can't broadcast ({}) onto ({})", names(from), names(to)))
    })?;

    Ok(view.to_owned())
}

fn names(coords: &[Coord]) -> String {
    coords
        .iter()
        .map(|coord| coord.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Keep values where `mask` is set, NaN elsewhere
pub(crate) fn where_(
    input: ArrayViewD<'_, f64>,
    coords: &[Coord],
    mask: ArrayViewD<'_, f64>,
    mask_coords: &[Coord],
) -> Result<ArrayD<f64>> {
    let mask = broadcast(mask, mask_coords, coords)?;

    Ok(Zip::from(&input).and(&mask).map_collect(|&value, &keep| {
        if keep != 0.0 && !keep.is_nan() {
            value
        } else {
            f64::NAN
        }
    }))
}

pub(crate) fn binary(
    left: (ArrayViewD<'_, f64>, &[Coord]),
    right: (ArrayViewD<'_, f64>, &[Coord]),
    op: Arithmetic,
    coords: &[Coord],
) -> Result<ArrayD<f64>> {
    let left = broadcast(left.0, left.1, coords)?;
    let right = broadcast(right.0, right.1, coords)?;

    Ok(Zip::from(&left)
        .and(&right)
        .map_collect(|&left, &right| op.apply(left, right)))
}

pub(crate) fn select(input: ArrayViewD<'_, f64>, axis: usize, range: Range<usize>) -> ArrayD<f64> {
    input.slice_axis(Axis(axis), Slice::from(range)).to_owned()
}

/// Rearrange `axis` so entry `i` of the output is entry `positions[i]` of the input, or NaN for
/// `None`.
///
pub(crate) fn reindex(
    input: ArrayViewD<'_, f64>,
    axis: usize,
    positions: &[Option<usize>],
) -> ArrayD<f64> {
    let mut shape = input.shape().to_vec();
    shape[axis] = positions.len();
    let mut output = ArrayD::from_elem(IxDyn(&shape), f64::NAN);
    for (index, position) in positions.iter().enumerate() {
        if let Some(position) = position {
            output
                .index_axis_mut(Axis(axis), index)
                .assign(&input.index_axis(Axis(axis), *position));
        }
    }

    output
}
