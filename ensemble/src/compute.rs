//! Materialization of deferred array graphs.
//!
use std::{
    collections::{HashMap, HashSet},
    ops::Range,
    sync::Arc,
};

use async_recursion::async_recursion;
use futures::stream::{self, StreamExt};
use ndarray::{ArrayD, IxDyn, Slice};
use parking_lot::Mutex;
use tokio::task;
use tracing::debug;

use crate::{
    array::{DataArray, Op, Source},
    chunk::Chunk,
    coords::Coord,
    errors::{Error, Result},
    kernels,
    materialized::Materialized,
    progress::Progress,
};

/// Evaluates one graph.
///
/// Chunk reads are spawned as tasks on the current runtime, at most `workers` at a time. Array
/// operations run on the runtime's blocking threads. Each node is evaluated once no matter how
/// many nodes depend on it.
///
pub(crate) struct Executor<'a> {
    workers: usize,
    progress: &'a dyn Progress,
    memo: Mutex<HashMap<u64, Arc<ArrayD<f64>>>>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(workers: usize, progress: &'a dyn Progress) -> Self {
        Self {
            workers: workers.max(1),
            progress,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn run(&self, array: &DataArray) -> Result<Materialized> {
        let tasks = plan(array)?;
        debug!(array = %array.name(), tasks, "computing");
        self.progress.start(tasks);
        let values = self.evaluate(array).await;
        self.memo.lock().clear();
        let values = match values {
            Ok(values) => values,
            Err(err) => {
                self.progress.abandon();
                return Err(err);
            }
        };
        self.progress.finish();

        let values = Arc::try_unwrap(values).unwrap_or_else(|shared| (*shared).clone());
        let meta = array.meta();

        Ok(Materialized {
            name: meta.name.clone(),
            long_name: meta.long_name.clone(),
            units: meta.units.clone(),
            title: None,
            coords: meta.coords.clone(),
            values,
        })
    }

    #[async_recursion]
    async fn evaluate(&self, array: &DataArray) -> Result<Arc<ArrayD<f64>>> {
        let cached = self.memo.lock().get(&array.id()).cloned();
        if let Some(values) = cached {
            return Ok(values);
        }

        let values = match array.op() {
            Op::Source(source) => self.read(source).await?,
            op => {
                let mut inputs = vec![];
                for input in op.inputs() {
                    inputs.push(self.evaluate(input).await?);
                }
                let values = self.apply(array, inputs).await?;
                debug!(id = array.id(), op = op.name(), array = %array.name(), "evaluated");
                self.progress.advance(1);

                values
            }
        };

        let values = Arc::new(values);
        self.memo.lock().insert(array.id(), Arc::clone(&values));

        Ok(values)
    }

    async fn read(&self, source: &Source) -> Result<ArrayD<f64>> {
        let reads = source.chunk_reads()?;
        let shape: Vec<usize> = source.window.iter().map(|window| window.len()).collect();
        let mut output = ArrayD::from_elem(IxDyn(&shape), f64::NAN);
        debug!(variable = %source.variable.name, chunks = reads.len(), "reading chunks");

        let mut chunks = stream::iter(reads.into_iter().map(|read| {
            let resolver = Arc::clone(&source.resolver);
            task::spawn(async move {
                let chunk = resolver.get_chunk(&read.cid).await?;
                Ok::<_, Error>((read.origin, chunk))
            })
        }))
        .buffer_unordered(self.workers);

        // Completion order varies, placement by origin doesn't
        while let Some(joined) = chunks.next().await {
            let (origin, chunk) = joined.map_err(|err| Error::Task(err.to_string()))??;
            place(&mut output, &source.window, &origin, &chunk)?;
            self.progress.advance(1);
        }

        Ok(output)
    }

    async fn apply(&self, array: &DataArray, inputs: Vec<Arc<ArrayD<f64>>>) -> Result<ArrayD<f64>> {
        let op = array.op().clone();
        let coords = array.coords().to_vec();
        let input_coords: Vec<Vec<Coord>> = op
            .inputs()
            .iter()
            .map(|input| input.coords().to_vec())
            .collect();

        task::spawn_blocking(move || apply_op(&op, &coords, &input_coords, &inputs))
            .await
            .map_err(|err| Error::Task(err.to_string()))?
    }
}

/// Count the tasks needed to compute `array`, checking that nothing in the graph is empty.
///
fn plan(array: &DataArray) -> Result<u64> {
    let mut seen = HashSet::new();
    let mut stack = vec![array];
    let mut tasks = 0;
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id()) {
            continue;
        }
        if let Some(coord) = node.coords().iter().find(|coord| coord.is_empty()) {
            return Err(Error::EmptySelection(format!(
                "{} has no values along {}",
                node.name(),
                coord.name
            )));
        }

        match node.op() {
            Op::Source(source) => tasks += source.chunk_reads()?.len() as u64,
            op => {
                tasks += 1;
                stack.extend(op.inputs());
            }
        }
    }

    Ok(tasks)
}

fn apply_op(
    op: &Op,
    coords: &[Coord],
    input_coords: &[Vec<Coord>],
    inputs: &[Arc<ArrayD<f64>>],
) -> Result<ArrayD<f64>> {
    let input = inputs
        .first()
        .map(|input| input.view())
        .ok_or_else(|| Error::Task(format!("{} has no inputs", op.name())))?;

    match op {
        Op::Source(_) => Err(Error::Task(String::from(
            "stored variables are read, not computed",
        ))),
        Op::Reduce { axes, agg, .. } => kernels::reduce(input, axes, *agg),
        Op::Compare { cmp, threshold, .. } => Ok(kernels::compare(input, *cmp, *threshold)),
        Op::Where { .. } => kernels::where_(input, coords, inputs[1].view(), &input_coords[1]),
        Op::Binary { op, .. } => kernels::binary(
            (input, &input_coords[0]),
            (inputs[1].view(), &input_coords[1]),
            *op,
            coords,
        ),
        Op::Scalar { op, value, .. } => Ok(kernels::scalar(input, *op, *value)),
        Op::Select { axis, range, .. } => Ok(kernels::select(input, *axis, range.clone())),
        Op::Aggregate {
            axis, groups, agg, ..
        } => kernels::aggregate(input, *axis, groups, *agg),
        Op::Reindex {
            axis, positions, ..
        } => Ok(kernels::reindex(input, *axis, positions)),
    }
}

/// Copy the part of a chunk that falls inside `window` into `output`, which covers `window`.
///
fn place(
    output: &mut ArrayD<f64>,
    window: &[Range<usize>],
    origin: &[usize],
    chunk: &Chunk,
) -> Result<()> {
    let values = chunk.view()?;
    if values.ndim() != window.len() {
        return Err(Error::Format(format!(
            "chunk has {} dimensions, expected {}",
            values.ndim(),
            window.len()
        )));
    }

    let mut from = Vec::with_capacity(window.len());
    let mut to = Vec::with_capacity(window.len());
    for (axis, window) in window.iter().enumerate() {
        let start = window.start.max(origin[axis]);
        let end = window.end.min(origin[axis] + values.shape()[axis]);
        if start >= end {
            return Ok(());
        }
        from.push(start - origin[axis]..end - origin[axis]);
        to.push(start - window.start..end - window.start);
    }

    let part = values.slice_each_axis(|ax| Slice::from(from[ax.axis.index()].clone()));
    output
        .slice_each_axis_mut(|ax| Slice::from(to[ax.axis.index()].clone()))
        .zip_mut_with(&part, |slot, &value| *slot = value as f64);

    Ok(())
}
