//! The ensemble analyses: elevation, ensemble spread, seasonal snowfall and precipitation, and
//! regional annual maxima.
//!
//! Each function only builds the deferred graph. Compute the result with a `Cluster`.
//!
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::{
    array::DataArray,
    calendar::{Frequency, Season, TimeAttribute},
    dataset::Dataset,
    errors::Result,
    geom::BoundingBox,
    kernels::Aggregator,
};

/// Austin, TX
pub const DEFAULT_CENTER: (f64, f64) = (30.2672, -97.7431);

pub const DEFAULT_HALF_WIDTH: f64 = 0.25;

/// Settings for the notebook's analyses
///
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisConfig {
    /// Center of the region of interest, as (lat, lon)
    pub center: (f64, f64),

    /// Half the width of the region of interest, in degrees
    pub half_width: f64,

    /// First day to analyze. Defaults to the start of the dataset.
    pub start: Option<NaiveDate>,

    /// Last day to analyze, inclusive. Defaults to the end of the dataset.
    pub end: Option<NaiveDate>,

    /// Where figures are written
    pub out_dir: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            half_width: DEFAULT_HALF_WIDTH,
            start: None,
            end: None,
            out_dir: PathBuf::from("figures"),
        }
    }
}

impl AnalysisConfig {
    pub fn region(&self) -> BoundingBox {
        BoundingBox::around(self.center.0, self.center.1, self.half_width)
    }

    /// The configured time range, with open ends filled in from `dataset`
    pub fn period(&self, dataset: &Dataset) -> Result<Option<(NaiveDate, NaiveDate)>> {
        if self.start.is_none() && self.end.is_none() {
            return Ok(None);
        }
        let first = match self.start {
            Some(start) => start,
            None => crate::time::date(dataset.time.start)?,
        };
        let last = match self.end {
            Some(end) => end,
            None => crate::time::date(dataset.time.get(dataset.time.len().saturating_sub(1)))?,
        };

        Ok(Some((first, last)))
    }
}

fn within(array: DataArray, period: Option<(NaiveDate, NaiveDate)>) -> Result<DataArray> {
    match period {
        Some((first, last)) => array.sel_time(first, last),
        None => Ok(array),
    }
}

pub fn elevation_map(dataset: &Dataset) -> Result<DataArray> {
    Ok(dataset
        .variable("elevation")?
        .with_long_name("Surface elevation"))
}

/// Difference between the largest and smallest value across ensemble members.
///
pub fn ensemble_spread(array: &DataArray) -> Result<DataArray> {
    let spread = array.max(&["member"])?.sub(&array.min(&["member"])?);

    Ok(spread
        .with_name(format!("{}_spread", array.name()))
        .with_long_name(format!("Ensemble spread of {}", describe(array))))
}

fn describe(array: &DataArray) -> String {
    if array.long_name().is_empty() {
        array.name().to_string()
    } else {
        array.long_name().to_lowercase()
    }
}

/// Sum over meteorological seasons, then average each season across years, in canonical season
/// order.
///
fn seasonal_mean_of_sums(array: &DataArray) -> Result<DataArray> {
    let quarterly = array.resample(Frequency::QuarterStart { anchor: 12 }, Aggregator::Sum)?;
    let seasonal = quarterly.groupby(TimeAttribute::Season, Aggregator::Mean)?;

    // Grouping sorts labels, which puts summer before spring
    seasonal.reindex("season", &Season::canonical_labels())
}

/// Mean seasonal precipitation on days with mean temperature below freezing.
///
/// Dimensions are (member, season, lat, lon).
///
pub fn seasonal_snowfall(
    dataset: &Dataset,
    period: Option<(NaiveDate, NaiveDate)>,
) -> Result<DataArray> {
    let pcp = within(dataset.variable("pcp")?, period)?;
    let t_mean = within(dataset.variable("t_mean")?, period)?;
    let snow = pcp.where_(&t_mean.lt(0.0));

    Ok(seasonal_mean_of_sums(&snow)?
        .with_name("snowfall")
        .with_long_name("Mean seasonal snowfall"))
}

/// Mean seasonal precipitation, for comparison with `seasonal_snowfall`.
///
pub fn seasonal_precipitation(
    dataset: &Dataset,
    period: Option<(NaiveDate, NaiveDate)>,
) -> Result<DataArray> {
    let pcp = within(dataset.variable("pcp")?, period)?;

    Ok(seasonal_mean_of_sums(&pcp)?.with_long_name("Mean seasonal precipitation"))
}

/// Largest daily precipitation each year anywhere within `region`.
///
/// Dimensions are (member, time), with one time step per year.
///
pub fn regional_annual_max(
    dataset: &Dataset,
    region: &BoundingBox,
    period: Option<(NaiveDate, NaiveDate)>,
) -> Result<DataArray> {
    let pcp = within(dataset.variable("pcp")?, period)?.sel_bbox(region)?;
    let annual = pcp.resample(Frequency::YearStart { anchor: 1 }, Aggregator::Max)?;

    Ok(annual
        .max(&["lat", "lon"])?
        .with_long_name("Regional annual maximum daily precipitation"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::Axis;

    use crate::{
        cluster::{Cluster, ClusterConfig},
        coords::CoordValues,
        errors::Error,
        materialized::Materialized,
        store::MemoryMapper,
        testing,
    };

    fn setup() -> Result<(Cluster, Dataset)> {
        let cluster = Cluster::provision(ClusterConfig {
            workers: 3,
            cache_bytes: 1 << 24,
        })?;
        let resolver = cluster.connect(Box::new(MemoryMapper::new()));
        let dataset = cluster.block_on(testing::dataset(&resolver))?;

        Ok((cluster, dataset))
    }

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_seasons_in_canonical_order() -> Result<()> {
        let (cluster, dataset) = setup()?;
        let snowfall = cluster.compute(&seasonal_snowfall(&dataset, None)?)?;

        assert_eq!(snowfall.dims(), vec!["member", "season", "lat", "lon"]);
        let labels = snowfall.coord("season").and_then(|coord| coord.values.labels());
        assert_eq!(
            labels,
            Some(&["DJF", "MAM", "JJA", "SON"].map(String::from)[..])
        );

        Ok(())
    }

    #[test]
    fn test_reindex_moves_values() -> Result<()> {
        let (cluster, dataset) = setup()?;
        let pcp = dataset.variable("pcp")?;
        let sorted = pcp
            .resample(Frequency::QuarterStart { anchor: 12 }, Aggregator::Sum)?
            .groupby(TimeAttribute::Season, Aggregator::Mean)?;
        let sorted = cluster.compute(&sorted)?;
        let canonical = cluster.compute(&seasonal_precipitation(&dataset, None)?)?;

        // Sorted order is DJF, JJA, MAM, SON; canonical is DJF, MAM, JJA, SON
        for (canonical_index, sorted_index) in [(0, 0), (1, 2), (2, 1), (3, 3)] {
            let expected = sorted.values.index_axis(Axis(1), sorted_index);
            let actual = canonical.values.index_axis(Axis(1), canonical_index);
            assert_eq!(expected, actual);
        }

        Ok(())
    }

    #[test]
    fn test_ensemble_spread() -> Result<()> {
        let (cluster, dataset) = setup()?;
        let t_mean = dataset.variable("t_mean")?.isel("time", 0..120)?;
        let spread = cluster.compute(&ensemble_spread(&t_mean)?)?;
        let values = cluster.compute(&t_mean)?;

        assert_eq!(spread.name, "t_mean_spread");
        assert_eq!(spread.dims(), vec!["time", "lat", "lon"]);
        let high = values.values.map_axis(Axis(0), |lane| {
            lane.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        });
        let low = values.values.map_axis(Axis(0), |lane| {
            lane.iter().copied().fold(f64::INFINITY, f64::min)
        });
        for ((spread, high), low) in spread.values.iter().zip(high.iter()).zip(low.iter()) {
            assert_eq!(*spread, high - low);
            assert!(*spread >= 0.0);
        }

        Ok(())
    }

    #[test]
    fn test_region_selection_inside_box() -> Result<()> {
        let (cluster, dataset) = setup()?;
        let region = AnalysisConfig::default().region();
        let pcp = dataset.variable("pcp")?.sel_bbox(&region)?.isel("time", 0..3)?;
        let result = cluster.compute(&pcp)?;

        let check = |dim: &str, lower: f64, upper: f64| match result.coord(dim) {
            Some(coord) => {
                assert!(!coord.is_empty());
                for value in coord.values.positions() {
                    assert!(lower <= value && value <= upper, "{dim} {value} outside box");
                }
            }
            None => panic!("no {dim} coordinate"),
        };
        check("lat", 30.0172, 30.5172);
        check("lon", -97.9931, -97.4931);

        Ok(())
    }

    #[test]
    fn test_regional_max_bounds_every_cell() -> Result<()> {
        let (cluster, dataset) = setup()?;
        let region = AnalysisConfig::default().region();
        let regional = cluster.compute(&regional_annual_max(&dataset, &region, None)?)?;
        let cells = dataset
            .variable("pcp")?
            .sel_bbox(&region)?
            .resample(Frequency::YearStart { anchor: 1 }, Aggregator::Max)?;
        let cells = cluster.compute(&cells)?;

        assert_eq!(regional.dims(), vec!["member", "time"]);
        assert_eq!(regional.shape(), &[3, 2]);
        for ((member, year, _, _), &cell) in cells
            .values
            .view()
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|err| Error::Shape(err.to_string()))?
            .indexed_iter()
        {
            if !cell.is_nan() {
                assert!(regional.values[[member, year]] >= cell);
            }
        }

        Ok(())
    }

    #[test]
    fn test_snowfall_never_exceeds_precipitation() -> Result<()> {
        let (cluster, dataset) = setup()?;
        let period = Some((ymd(1980, 1, 1), ymd(1980, 12, 31)));
        let snowfall = cluster.compute(&seasonal_snowfall(&dataset, period)?)?;
        let precipitation = cluster.compute(&seasonal_precipitation(&dataset, period)?)?;

        assert_eq!(snowfall.shape(), precipitation.shape());
        for (snow, rain) in snowfall.values.iter().zip(precipitation.values.iter()) {
            if !snow.is_nan() {
                assert!(snow <= rain);
            }
        }
        // Winter in the synthetic climate does freeze
        assert!(snowfall.finite_range().map(|(_, high)| high > 0.0).unwrap_or(false));

        Ok(())
    }

    #[test]
    fn test_repeated_materialization_is_bit_identical() -> Result<()> {
        let (cluster, dataset) = setup()?;
        let snowfall = seasonal_snowfall(&dataset, None)?;
        let first = cluster.compute(&snowfall)?;
        let second = cluster.compute(&snowfall)?;

        let bits = |result: &Materialized| -> Vec<u64> {
            result.values.iter().map(|value| value.to_bits()).collect()
        };
        assert_eq!(bits(&first), bits(&second));

        Ok(())
    }

    #[test]
    fn test_elevation_map() -> Result<()> {
        let (cluster, dataset) = setup()?;
        let elevation = cluster.compute(&elevation_map(&dataset)?)?;
        assert_eq!(elevation.dims(), vec!["lat", "lon"]);
        assert_eq!(elevation.units, "m");
        assert_eq!(elevation.display_title(), "Surface elevation");

        Ok(())
    }

    #[test]
    fn test_period() -> Result<()> {
        let (_cluster, dataset) = setup()?;
        let config = AnalysisConfig {
            end: Some(ymd(1980, 6, 30)),
            ..AnalysisConfig::default()
        };
        assert_eq!(
            config.period(&dataset)?,
            Some((ymd(1980, 1, 1), ymd(1980, 6, 30)))
        );
        assert_eq!(AnalysisConfig::default().period(&dataset)?, None);

        let annual = regional_annual_max(&dataset, &config.region(), config.period(&dataset)?)?;
        match &annual.coord("time")?.values {
            CoordValues::Time(stamps) => assert_eq!(stamps.len(), 1),
            _ => panic!("expected time stamps"),
        }

        Ok(())
    }
}
