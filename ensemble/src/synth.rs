//! Synthetic ensemble datasets, for offline runs and tests.
//!
use std::{f64::consts::PI, sync::Arc};

use chrono::{Datelike, NaiveDate};
use ndarray::{Array2, Array4};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::info;

use crate::{
    dataset::{Dataset, Dim},
    errors::{Error, Result},
    range::{FloatRange, IntRange},
    resolver::Resolver,
    time::{self, TimeRange},
};

/// Shape and contents of a synthetic dataset.
///
/// The default grid covers Austin, TX at 1/8 degree resolution for two years of daily data.
///
#[derive(Clone, Debug)]
pub struct SynthConfig {
    pub title: String,
    pub start: NaiveDate,
    pub days: usize,
    pub members: usize,
    pub lat_start: f64,
    pub lon_start: f64,
    pub resolution: f64,
    pub rows: usize,
    pub cols: usize,

    /// Chunk shape for the (member, time, lat, lon) variables
    pub chunk_shape: [usize; 4],

    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            title: String::from("Synthetic daily ensemble"),
            start: NaiveDate::from_ymd_opt(1980, 1, 1).unwrap_or_default(),
            days: 730,
            members: 3,
            lat_start: 29.9,
            lon_start: -98.1,
            resolution: 0.125,
            rows: 8,
            cols: 8,
            chunk_shape: [1, 100, 4, 4],
            seed: 42,
        }
    }
}

/// Generate a dataset with `elevation`, `mask`, `t_mean` and `pcp` and commit it.
///
/// Temperatures follow a seasonal cycle that dips below freezing in winter. Precipitation falls on
/// roughly a third of days, and a few values are missing. The same seed always produces the same
/// dataset.
///
pub async fn synthesize(resolver: &Arc<Resolver>, config: &SynthConfig) -> Result<Dataset> {
    if config.days == 0 || config.members == 0 || config.rows == 0 || config.cols == 0 {
        return Err(Error::Shape(String::from(
            "synthetic dataset needs at least one member, day and grid cell",
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let time = TimeRange::daily(config.start, config.days);
    let lat = FloatRange::new(config.lat_start, config.resolution, config.rows);
    let lon = FloatRange::new(config.lon_start, config.resolution, config.cols);
    let member = IntRange::new(1, 1, config.members);
    let dataset = Dataset::new(
        config.title.clone(),
        time.clone(),
        lat.clone(),
        lon.clone(),
        member,
        Arc::clone(resolver),
    );

    let grid = [config.rows.min(64), config.cols.min(64)];
    let elevation = Array2::from_shape_fn((config.rows, config.cols), |(row, col)| {
        (150.0 + 60.0 * (lat.get(row) - config.lat_start) - 80.0 * (lon.get(col) - config.lon_start))
            as f32
    });
    let dataset = dataset
        .add_variable(
            "elevation",
            "Surface elevation",
            "m",
            &[Dim::Lat, Dim::Lon],
            &grid,
            elevation.view().into_dyn(),
        )
        .await?;

    let mask = Array2::<f32>::ones((config.rows, config.cols));
    let dataset = dataset
        .add_variable(
            "mask",
            "Land mask",
            "1",
            &[Dim::Lat, Dim::Lon],
            &grid,
            mask.view().into_dyn(),
        )
        .await?;

    let shape = (config.members, config.days, config.rows, config.cols);
    let day_of_year: Vec<f64> = time
        .values()
        .into_iter()
        .map(|stamp| time::date(stamp).map(|date| date.ordinal0() as f64))
        .collect::<Result<_>>()?;
    let offsets: Vec<f64> = (0..config.members)
        .map(|_| rng.gen_range(-1.5..1.5))
        .collect();

    let mut t_mean = Array4::<f32>::zeros(shape);
    for ((member, day, row, _), value) in t_mean.indexed_iter_mut() {
        let cycle = -(2.0 * PI * (day_of_year[day] - 15.0) / 365.25).cos();
        let noise: f64 = rng.gen_range(-4.0..4.0);
        *value = (13.0 + 14.0 * cycle + offsets[member] - 0.3 * row as f64 + noise) as f32;
    }

    let mut pcp = Array4::<f32>::zeros(shape);
    for value in pcp.iter_mut() {
        let roll: f64 = rng.gen();
        *value = if roll < 0.002 {
            f32::NAN
        } else if roll < 0.33 {
            let depth: f64 = rng.gen();
            (-(1.0 - depth).ln() * 7.5) as f32
        } else {
            0.0
        };
    }

    let chunk_shape = config.chunk_shape;
    let dims = [Dim::Member, Dim::Time, Dim::Lat, Dim::Lon];
    let dataset = dataset
        .add_variable(
            "t_mean",
            "Daily mean temperature",
            "degC",
            &dims,
            &chunk_shape,
            t_mean.view().into_dyn(),
        )
        .await?;
    let mut dataset = dataset
        .add_variable(
            "pcp",
            "Daily precipitation",
            "mm/day",
            &dims,
            &chunk_shape,
            pcp.view().into_dyn(),
        )
        .await?;

    let cid = dataset.commit().await?;
    dataset.cid = Some(cid);
    info!(%cid, title = %dataset.title, "synthesized dataset");

    Ok(dataset)
}
