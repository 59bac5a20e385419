//! Lazily evaluated, labeled arrays.
//!
//! A `DataArray` is a node in a graph of deferred operations. Building one works out the result's
//! dimensions, coordinates and attributes but never touches the chunk store. Use
//! `Cluster::compute` to materialize it.
//!
use std::{
    fmt,
    ops::Range,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::NaiveDate;
use cid::Cid;
use tracing::debug;

use crate::{
    calendar::{Frequency, TimeAttribute},
    coords::{Coord, CoordValues},
    dataset::Variable,
    errors::{Error, Result},
    geom::BoundingBox,
    helpers::{cartesian, rearrange},
    kernels::{Aggregator, Arithmetic, Comparison},
    range::index_range_of,
    resolver::Resolver,
    time,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A labeled array whose values are computed on demand.
///
/// Cloning a `DataArray` is cheap and yields a handle to the same node.
///
#[derive(Clone)]
pub struct DataArray {
    expr: Arc<Expr>,
}

pub(crate) struct Expr {
    /// Unique per node, used to evaluate shared subexpressions only once
    pub(crate) id: u64,
    pub(crate) op: Op,
    pub(crate) meta: Meta,
}

#[derive(Clone, Debug)]
pub(crate) struct Meta {
    pub(crate) name: String,
    pub(crate) long_name: String,
    pub(crate) units: String,

    /// One coordinate per dimension, in axis order
    pub(crate) coords: Vec<Coord>,
}

impl Meta {
    fn with_coords(&self, coords: Vec<Coord>) -> Self {
        Self {
            name: self.name.clone(),
            long_name: self.long_name.clone(),
            units: self.units.clone(),
            coords,
        }
    }

    pub(crate) fn shape(&self) -> Vec<usize> {
        self.coords.iter().map(Coord::len).collect()
    }
}

#[derive(Clone)]
pub(crate) enum Op {
    Source(Source),
    Reduce {
        input: DataArray,
        axes: Vec<usize>,
        agg: Aggregator,
    },
    Compare {
        input: DataArray,
        cmp: Comparison,
        threshold: f64,
    },
    Where {
        input: DataArray,
        mask: DataArray,
    },
    Binary {
        left: DataArray,
        right: DataArray,
        op: Arithmetic,
    },
    Scalar {
        input: DataArray,
        op: Arithmetic,
        value: f64,
    },
    Select {
        input: DataArray,
        axis: usize,
        range: Range<usize>,
    },

    /// Resampling and grouping: replace `axis` with one entry per group
    Aggregate {
        input: DataArray,
        axis: usize,
        groups: Vec<Vec<usize>>,
        agg: Aggregator,
    },
    Reindex {
        input: DataArray,
        axis: usize,
        positions: Vec<Option<usize>>,
    },
}

impl Op {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Op::Source(_) => "source",
            Op::Reduce { .. } => "reduce",
            Op::Compare { .. } => "compare",
            Op::Where { .. } => "where",
            Op::Binary { .. } => "binary",
            Op::Scalar { .. } => "scalar",
            Op::Select { .. } => "select",
            Op::Aggregate { .. } => "aggregate",
            Op::Reindex { .. } => "reindex",
        }
    }

    pub(crate) fn inputs(&self) -> Vec<&DataArray> {
        match self {
            Op::Source(_) => vec![],
            Op::Reduce { input, .. }
            | Op::Compare { input, .. }
            | Op::Scalar { input, .. }
            | Op::Select { input, .. }
            | Op::Aggregate { input, .. }
            | Op::Reindex { input, .. } => vec![input],
            Op::Where { input, mask } => vec![input, mask],
            Op::Binary { left, right, .. } => vec![left, right],
        }
    }
}

/// A window onto a stored variable
///
#[derive(Clone)]
pub(crate) struct Source {
    pub(crate) variable: Variable,

    /// Shape of the whole variable
    pub(crate) shape: Vec<usize>,

    /// The part of the variable to read, per axis
    pub(crate) window: Vec<Range<usize>>,

    pub(crate) resolver: Arc<Resolver>,
}

/// One chunk that intersects a source window
pub(crate) struct ChunkRead {
    pub(crate) cid: Cid,

    /// Index of the chunk's first element within the whole variable
    pub(crate) origin: Vec<usize>,
}

impl Source {
    /// The chunks needed to fill the window, in row major order of the chunk grid.
    pub(crate) fn chunk_reads(&self) -> Result<Vec<ChunkRead>> {
        let variable = &self.variable;
        let grid = variable.grid(&self.shape);
        let expected: usize = grid.iter().product();
        if variable.chunks.len() != expected {
            return Err(Error::Format(format!(
                "{} has {} chunks, expected {expected}",
                variable.name,
                variable.chunks.len()
            )));
        }

        let ranges: Vec<Range<usize>> = self
            .window
            .iter()
            .zip(&variable.chunk_shape)
            .map(|(window, &chunk)| {
                if window.is_empty() {
                    0..0
                } else {
                    window.start / chunk..window.end.div_ceil(chunk)
                }
            })
            .collect();

        let reads = cartesian(&ranges)
            .into_iter()
            .map(|index| {
                let linear = index
                    .iter()
                    .zip(&grid)
                    .fold(0, |linear, (&i, &n)| linear * n + i);
                let origin = index
                    .iter()
                    .zip(&variable.chunk_shape)
                    .map(|(&i, &chunk)| i * chunk)
                    .collect();

                ChunkRead {
                    cid: variable.chunks[linear],
                    origin,
                }
            })
            .collect();

        Ok(reads)
    }
}

impl DataArray {
    fn new(op: Op, meta: Meta) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(id, op = op.name(), array = %meta.name, shape = ?meta.shape(), "deferred");

        Self {
            expr: Arc::new(Expr { id, op, meta }),
        }
    }

    pub(crate) fn source(variable: Variable, coords: Vec<Coord>, resolver: Arc<Resolver>) -> Self {
        let meta = Meta {
            name: variable.name.clone(),
            long_name: variable.long_name.clone(),
            units: variable.units.clone(),
            coords,
        };
        let shape = meta.shape();
        let window = shape.iter().map(|&len| 0..len).collect();

        Self::new(
            Op::Source(Source {
                variable,
                shape,
                window,
                resolver,
            }),
            meta,
        )
    }

    pub(crate) fn id(&self) -> u64 {
        self.expr.id
    }

    pub(crate) fn op(&self) -> &Op {
        &self.expr.op
    }

    pub(crate) fn meta(&self) -> &Meta {
        &self.expr.meta
    }

    pub fn name(&self) -> &str {
        &self.expr.meta.name
    }

    pub fn long_name(&self) -> &str {
        &self.expr.meta.long_name
    }

    pub fn units(&self) -> &str {
        &self.expr.meta.units
    }

    pub fn dims(&self) -> Vec<&str> {
        self.coords().iter().map(|coord| coord.name.as_str()).collect()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.expr.meta.shape()
    }

    pub fn coords(&self) -> &[Coord] {
        &self.expr.meta.coords
    }

    pub fn axis(&self, dim: &str) -> Result<usize> {
        self.coords()
            .iter()
            .position(|coord| coord.name == dim)
            .ok_or_else(|| Error::BadDimension(dim.to_string()))
    }

    pub fn coord(&self, dim: &str) -> Result<&Coord> {
        Ok(&self.coords()[self.axis(dim)?])
    }

    fn with_meta(&self, meta: Meta) -> Self {
        Self::new(self.expr.op.clone(), meta)
    }

    pub fn with_name<S: Into<String>>(&self, name: S) -> Self {
        let mut meta = self.expr.meta.clone();
        meta.name = name.into();
        self.with_meta(meta)
    }

    pub fn with_long_name<S: Into<String>>(&self, long_name: S) -> Self {
        let mut meta = self.expr.meta.clone();
        meta.long_name = long_name.into();
        self.with_meta(meta)
    }

    pub fn with_units<S: Into<String>>(&self, units: S) -> Self {
        let mut meta = self.expr.meta.clone();
        meta.units = units.into();
        self.with_meta(meta)
    }

    /// Collapse the named dimensions with `agg`
    pub fn reduce(&self, dims: &[&str], agg: Aggregator) -> Result<Self> {
        let mut axes = dims
            .iter()
            .map(|dim| self.axis(dim))
            .collect::<Result<Vec<_>>>()?;
        axes.sort_unstable();
        axes.dedup();

        let coords = self
            .coords()
            .iter()
            .enumerate()
            .filter(|(axis, _)| !axes.contains(axis))
            .map(|(_, coord)| coord.clone())
            .collect();
        let meta = self.expr.meta.with_coords(coords);

        Ok(Self::new(
            Op::Reduce {
                input: self.clone(),
                axes,
                agg,
            },
            meta,
        ))
    }

    pub fn mean(&self, dims: &[&str]) -> Result<Self> {
        self.reduce(dims, Aggregator::Mean)
    }

    pub fn min(&self, dims: &[&str]) -> Result<Self> {
        self.reduce(dims, Aggregator::Min)
    }

    pub fn max(&self, dims: &[&str]) -> Result<Self> {
        self.reduce(dims, Aggregator::Max)
    }

    pub fn sum(&self, dims: &[&str]) -> Result<Self> {
        self.reduce(dims, Aggregator::Sum)
    }

    /// A boolean mask, 1.0 where the comparison holds and 0.0 elsewhere
    pub fn compare(&self, cmp: Comparison, threshold: f64) -> Self {
        let mut meta = self.expr.meta.clone();
        meta.long_name = format!("{} {} {threshold}", self.name(), cmp.symbol());
        meta.units = String::new();

        Self::new(
            Op::Compare {
                input: self.clone(),
                cmp,
                threshold,
            },
            meta,
        )
    }

    pub fn lt(&self, threshold: f64) -> Self {
        self.compare(Comparison::Lt, threshold)
    }

    pub fn le(&self, threshold: f64) -> Self {
        self.compare(Comparison::Le, threshold)
    }

    pub fn gt(&self, threshold: f64) -> Self {
        self.compare(Comparison::Gt, threshold)
    }

    pub fn ge(&self, threshold: f64) -> Self {
        self.compare(Comparison::Ge, threshold)
    }

    /// Keep values where `mask` holds, NaN elsewhere.
    ///
    /// The mask's dimensions must be a subset of this array's, with matching coordinates. A
    /// mismatch is reported when the array is computed.
    ///
    pub fn where_(&self, mask: &DataArray) -> Self {
        Self::new(
            Op::Where {
                input: self.clone(),
                mask: mask.clone(),
            },
            self.expr.meta.clone(),
        )
    }

    /// Element-wise arithmetic, broadcasting dimensions by name.
    ///
    /// The result has this array's dimensions followed by any of `other`'s that this array
    /// lacks. Shared dimensions must have matching coordinates, which is checked when the array
    /// is computed.
    ///
    pub fn binary(&self, other: &DataArray, op: Arithmetic) -> Self {
        let mut coords = self.coords().to_vec();
        for coord in other.coords() {
            if !coords.iter().any(|existing| existing.name == coord.name) {
                coords.push(coord.clone());
            }
        }
        let mut meta = self.expr.meta.with_coords(coords);
        meta.long_name = format!("{} {} {}", self.name(), op.symbol(), other.name());

        Self::new(
            Op::Binary {
                left: self.clone(),
                right: other.clone(),
                op,
            },
            meta,
        )
    }

    pub fn add(&self, other: &DataArray) -> Self {
        self.binary(other, Arithmetic::Add)
    }

    pub fn sub(&self, other: &DataArray) -> Self {
        self.binary(other, Arithmetic::Sub)
    }

    pub fn mul(&self, other: &DataArray) -> Self {
        self.binary(other, Arithmetic::Mul)
    }

    pub fn div(&self, other: &DataArray) -> Self {
        self.binary(other, Arithmetic::Div)
    }

    /// Combine every element with a scalar: `element op value`
    pub fn scalar(&self, op: Arithmetic, value: f64) -> Self {
        Self::new(
            Op::Scalar {
                input: self.clone(),
                op,
                value,
            },
            self.expr.meta.clone(),
        )
    }

    pub fn add_scalar(&self, value: f64) -> Self {
        self.scalar(Arithmetic::Add, value)
    }

    pub fn sub_scalar(&self, value: f64) -> Self {
        self.scalar(Arithmetic::Sub, value)
    }

    pub fn mul_scalar(&self, value: f64) -> Self {
        self.scalar(Arithmetic::Mul, value)
    }

    pub fn div_scalar(&self, value: f64) -> Self {
        self.scalar(Arithmetic::Div, value)
    }

    /// Select positions `range` along `dim`. The range is clipped to the dimension's length.
    pub fn isel(&self, dim: &str, range: Range<usize>) -> Result<Self> {
        let axis = self.axis(dim)?;
        let len = self.coords()[axis].len();
        let end = range.end.min(len);
        let start = range.start.min(end);

        Ok(self.select(axis, start..end))
    }

    /// Select the values of `dim` whose coordinates fall within `[lower, upper]`, in either
    /// order. Works on numeric and time coordinates; time coordinates are in epoch seconds.
    ///
    pub fn sel(&self, dim: &str, lower: f64, upper: f64) -> Result<Self> {
        let axis = self.axis(dim)?;
        let (lower, upper) = rearrange(lower, upper);
        let within = |value: f64| lower <= value && value <= upper;
        let range = match &self.coords()[axis].values {
            CoordValues::Label(_) => {
                return Err(Error::BadDimension(format!(
                    "{dim} has categorical labels and can't be selected by value"
                )))
            }
            values => index_range_of(values.positions().into_iter(), within),
        };

        Ok(self.select(axis, range))
    }

    /// Select every time step falling on a day from `first` through `last`, inclusive.
    pub fn sel_time(&self, first: NaiveDate, last: NaiveDate) -> Result<Self> {
        let axis = self.axis("time")?;
        match &self.coords()[axis].values {
            CoordValues::Time(stamps) => {
                let range = time::date_index_range(stamps, first, last);
                Ok(self.select(axis, range))
            }
            _ => Err(Error::BadDimension(String::from("time is not a time coordinate"))),
        }
    }

    /// Select the grid cells inside `bbox`
    pub fn sel_bbox(&self, bbox: &BoundingBox) -> Result<Self> {
        self.sel("lat", bbox.south, bbox.north)?
            .sel("lon", bbox.west, bbox.east)
    }

    fn select(&self, axis: usize, range: Range<usize>) -> Self {
        let mut coords = self.coords().to_vec();
        coords[axis] = coords[axis].slice(range.clone());
        let meta = self.expr.meta.with_coords(coords);

        // Selections on a stored variable narrow the read instead of adding a node
        match &self.expr.op {
            Op::Source(source) => {
                let mut source = source.clone();
                let offset = source.window[axis].start;
                source.window[axis] = offset + range.start..offset + range.end;
                Self::new(Op::Source(source), meta)
            }
            _ => Self::new(
                Op::Select {
                    input: self.clone(),
                    axis,
                    range,
                },
                meta,
            ),
        }
    }

    fn timestamps(&self) -> Result<(usize, &[i64])> {
        let axis = self.axis("time")?;
        match &self.coords()[axis].values {
            CoordValues::Time(stamps) => Ok((axis, stamps)),
            _ => Err(Error::BadDimension(String::from("time is not a time coordinate"))),
        }
    }

    /// Regroup the time dimension into calendar periods. Time labels become period starts.
    pub fn resample(&self, freq: Frequency, agg: Aggregator) -> Result<Self> {
        let (axis, stamps) = self.timestamps()?;
        let (starts, groups) = freq.bins(stamps)?;
        let mut coords = self.coords().to_vec();
        coords[axis] = Coord::new("time", CoordValues::Time(starts));
        let meta = self.expr.meta.with_coords(coords);

        Ok(Self::new(
            Op::Aggregate {
                input: self.clone(),
                axis,
                groups,
                agg,
            },
            meta,
        ))
    }

    /// Group the time dimension by a calendar attribute, which replaces it as a dimension.
    ///
    /// Groups come out in sorted label order. Seasons, for instance, come out as DJF, JJA, MAM,
    /// SON; use `reindex` for another order.
    ///
    pub fn groupby(&self, attribute: TimeAttribute, agg: Aggregator) -> Result<Self> {
        let (axis, stamps) = self.timestamps()?;
        let (labels, groups): (Vec<String>, Vec<Vec<usize>>) =
            attribute.groups(stamps)?.into_iter().unzip();
        let mut coords = self.coords().to_vec();
        coords[axis] = Coord::new(attribute.name(), CoordValues::Label(labels));
        let meta = self.expr.meta.with_coords(coords);

        Ok(Self::new(
            Op::Aggregate {
                input: self.clone(),
                axis,
                groups,
                agg,
            },
            meta,
        ))
    }

    /// Put a categorical dimension's entries in the order given by `labels`. Labels not present
    /// get NaN.
    ///
    pub fn reindex(&self, dim: &str, labels: &[String]) -> Result<Self> {
        let axis = self.axis(dim)?;
        let existing = self.coords()[axis].values.labels().ok_or_else(|| {
            Error::BadDimension(format!("{dim} is not a categorical dimension"))
        })?;
        let positions = labels
            .iter()
            .map(|label| existing.iter().position(|candidate| candidate == label))
            .collect();

        let mut coords = self.coords().to_vec();
        coords[axis] = Coord::new(dim, CoordValues::Label(labels.to_vec()));
        let meta = self.expr.meta.with_coords(coords);

        Ok(Self::new(
            Op::Reindex {
                input: self.clone(),
                axis,
                positions,
            },
            meta,
        ))
    }
}

impl fmt::Display for DataArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self
            .coords()
            .iter()
            .map(|coord| format!("{}: {}", coord.name, coord.len()))
            .collect();
        write!(f, "<DataArray '{}' ({})>", self.name(), dims.join(", "))?;
        if !self.units().is_empty() {
            write!(f, " [{}]", self.units())?;
        }

        Ok(())
    }
}

impl fmt::Debug for DataArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self} #{} {}", self.id(), self.op().name())
    }
}
