//! SVG figures for computed results.
//!
//! The kind of figure follows from the result's dimensions: a time series becomes a line plot, a
//! lat/lon grid becomes a raster map, and a lat/lon grid with extra dimensions becomes a faceted
//! grid of maps sharing one color scale.
//!
mod canvas;
mod color;
mod facet;
mod line;
mod raster;

use std::{fs, io, path::Path};

use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};
use thiserror::Error;
use tracing::info;

use crate::materialized::Materialized;

pub use color::{Color, Colormap};

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("{0} has no data")]
    NoData(String),

    #[error("{0} has no values to plot, everything is missing")]
    AllMissing(String),

    #[error("don't know how to plot {name} with dimensions ({dims})")]
    Unsupported { name: String, dims: String },

    #[error(transparent)]
    IO(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PlotError>;

/// Overrides for what a figure would otherwise take from the result's metadata
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlotOptions {
    pub title: Option<String>,
    pub units: Option<String>,
    pub colormap: Option<Colormap>,

    /// Facet dimension laid out down the rows of a faceted figure
    pub rows: Option<String>,

    /// Facet dimension laid out across the columns of a faceted figure
    pub cols: Option<String>,

    /// Fixed color scale, instead of the range of the data
    pub range: Option<(f64, f64)>,
}

impl PlotOptions {
    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_units<S: Into<String>>(mut self, units: S) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_colormap(mut self, colormap: Colormap) -> Self {
        self.colormap = Some(colormap);
        self
    }

    pub fn with_facets<S: Into<String>>(mut self, rows: S, cols: S) -> Self {
        self.rows = Some(rows.into());
        self.cols = Some(cols.into());
        self
    }

    pub(crate) fn title_for<'a>(&'a self, result: &'a Materialized) -> &'a str {
        self.title.as_deref().unwrap_or_else(|| result.display_title())
    }

    pub(crate) fn units_for<'a>(&'a self, result: &'a Materialized) -> &'a str {
        self.units.as_deref().unwrap_or(&result.units)
    }

    pub(crate) fn colormap_for(&self, result: &Materialized) -> Colormap {
        self.colormap
            .unwrap_or_else(|| Colormap::for_units(self.units_for(result)))
    }
}

/// A rendered figure
///
#[derive(Clone, Debug)]
pub struct Figure {
    title: String,
    svg: String,
}

impl Figure {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn svg(&self) -> &str {
        &self.svg
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, &self.svg)?;
        info!(title = %self.title, path = %path.display(), "wrote figure");

        Ok(())
    }
}

/// Render a computed result, choosing the kind of figure from its dimensions
///
pub fn render(result: &Materialized, options: &PlotOptions) -> Result<Figure> {
    if result.values.is_empty() {
        return Err(PlotError::NoData(result.name.clone()));
    }
    if result.finite_range().is_none() {
        return Err(PlotError::AllMissing(result.name.clone()));
    }

    let dims = result.dims();
    let has_time = result
        .coord("time")
        .is_some_and(|coord| coord.values.is_time());
    let spatial = dims.contains(&"lat") && dims.contains(&"lon");
    let canvas = match (dims.len(), has_time, spatial) {
        (1, true, _) | (2, true, false) => line::draw(result, options)?,
        (2, _, true) => raster::draw(result, options)?,
        (3 | 4, _, true) => facet::draw(result, options)?,
        _ => return Err(unsupported(result)),
    };

    Ok(Figure {
        title: options.title_for(result).to_string(),
        svg: canvas.to_svg(),
    })
}

pub(crate) fn unsupported(result: &Materialized) -> PlotError {
    PlotError::Unsupported {
        name: result.name.clone(),
        dims: result.dims().join(", "),
    }
}

/// A rectangular plotting area on a canvas
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Frame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Frame {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Horizontal position of `value` on a scale running from `low` at the left edge to `high` at
    /// the right
    pub fn scale_x(&self, value: f64, (low, high): (f64, f64)) -> f64 {
        self.x + self.width * fraction(value, low, high)
    }

    /// Vertical position of `value`, `low` at the bottom edge
    pub fn scale_y(&self, value: f64, (low, high): (f64, f64)) -> f64 {
        self.y + self.height * (1.0 - fraction(value, low, high))
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Where `value` falls between `low` and `high`, 0 to 1. A degenerate scale puts everything in the
/// middle.
pub(crate) fn fraction(value: f64, low: f64, high: f64) -> f64 {
    if high > low {
        (value - low) / (high - low)
    } else {
        0.5
    }
}

/// Evenly spaced round numbers covering `low` to `high`, about `target` of them
///
pub(crate) fn ticks(low: f64, high: f64, target: usize) -> Vec<f64> {
    if !(low.is_finite() && high.is_finite()) || high <= low {
        return vec![low];
    }
    let raw = (high - low) / target.max(1) as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 2.5, 5.0, 10.0]
        .iter()
        .map(|multiple| multiple * magnitude)
        .find(|step| *step >= raw)
        .unwrap_or(10.0 * magnitude);

    let first = (low / step).ceil() as i64;
    let last = (high / step + 1e-9).floor() as i64;

    (first..=last).map(|i| i as f64 * step).collect()
}

/// Compact tick label
pub(crate) fn tick_label(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 100.0 || value.fract() == 0.0 {
        format!("{value:.0}")
    } else if magnitude >= 10.0 {
        format!("{value:.1}")
    } else {
        format!("{value:.2}")
    }
}

/// A lat/lon slice of `values` as (lat, lon), whatever order the two dimensions are stored in
///
pub(crate) fn lat_lon<'a>(values: ArrayViewD<'a, f64>, dims: &[&str]) -> Option<ArrayView2<'a, f64>> {
    let lat = dims.iter().position(|dim| *dim == "lat")?;
    let lon = dims.iter().position(|dim| *dim == "lon")?;
    let view = values.into_dimensionality::<Ix2>().ok()?;

    Some(if lat < lon { view } else { view.reversed_axes() })
}

/// Index a lat/lon grid out of an array with extra dimensions by fixing each of them
///
pub(crate) fn panel<'a>(
    values: ArrayViewD<'a, f64>,
    dims: &[&str],
    fixed: &[(usize, usize)],
) -> Option<ArrayView2<'a, f64>> {
    let mut fixed = fixed.to_vec();
    fixed.sort_unstable_by(|a, b| b.0.cmp(&a.0));

    let mut view = values;
    let mut remaining: Vec<&str> = dims.to_vec();
    for (axis, index) in fixed {
        view = view.index_axis_move(Axis(axis), index);
        remaining.remove(axis);
    }

    lat_lon(view, &remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::{array, Array, IxDyn};

    use crate::{
        coords::{Coord, CoordValues},
        time,
    };

    fn days(n: usize) -> CoordValues {
        let start = time::timestamp(chrono::NaiveDate::from_ymd_opt(1980, 1, 1).unwrap());
        CoordValues::Time((0..n as i64).map(|i| start + i * 86_400).collect())
    }

    fn floats(start: f64, n: usize) -> CoordValues {
        CoordValues::Float((0..n).map(|i| start + i as f64 * 0.125).collect())
    }

    fn labels(labels: &[&str]) -> CoordValues {
        CoordValues::Label(labels.iter().map(|label| label.to_string()).collect())
    }

    pub(super) fn result(coords: Vec<Coord>) -> Materialized {
        let shape: Vec<usize> = coords.iter().map(Coord::len).collect();
        let count = shape.iter().product::<usize>();
        let values = Array::from_shape_vec(
            IxDyn(&shape),
            (0..count).map(|i| i as f64 / 10.0).collect(),
        )
        .unwrap();

        Materialized {
            name: String::from("pcp"),
            long_name: String::from("Precipitation"),
            units: String::from("mm/day"),
            title: None,
            coords,
            values,
        }
    }

    pub(super) fn map() -> Materialized {
        result(vec![
            Coord::new("lat", floats(30.0, 3)),
            Coord::new("lon", floats(-98.0, 4)),
        ])
    }

    pub(super) fn seasonal() -> Materialized {
        result(vec![
            Coord::new("season", labels(&["DJF", "MAM", "JJA", "SON"])),
            Coord::new("member", CoordValues::Int(vec![1, 2])),
            Coord::new("lat", floats(30.0, 3)),
            Coord::new("lon", floats(-98.0, 4)),
        ])
    }

    pub(super) fn series() -> Materialized {
        result(vec![
            Coord::new("member", CoordValues::Int(vec![1, 2, 3])),
            Coord::new("time", days(5)),
        ])
    }

    #[test]
    fn test_render_kinds() -> Result<()> {
        let figure = render(&map(), &PlotOptions::default())?;
        assert_eq!(figure.title(), "Precipitation");
        assert!(figure.svg().contains("mm/day"));

        let figure = render(&seasonal(), &PlotOptions::default().with_title("Seasonal"))?;
        assert_eq!(figure.title(), "Seasonal");
        assert!(figure.svg().contains("season = SON"));

        let figure = render(&series(), &PlotOptions::default())?;
        assert_eq!(figure.svg().matches("<polyline").count(), 3);

        let single = result(vec![Coord::new("time", days(4))]);
        let figure = render(&single, &PlotOptions::default())?;
        assert_eq!(figure.svg().matches("<polyline").count(), 1);

        Ok(())
    }

    #[test]
    fn test_render_failures() {
        let mut missing = map();
        missing.values.fill(f64::NAN);
        assert!(matches!(
            render(&missing, &PlotOptions::default()),
            Err(PlotError::AllMissing(_))
        ));

        let empty = result(vec![Coord::new("lat", floats(30.0, 0))]);
        assert!(matches!(
            render(&empty, &PlotOptions::default()),
            Err(PlotError::NoData(_))
        ));

        let members = result(vec![Coord::new("member", CoordValues::Int(vec![1, 2]))]);
        match render(&members, &PlotOptions::default()) {
            Err(PlotError::Unsupported { name, dims }) => {
                assert_eq!(name, "pcp");
                assert_eq!(dims, "member");
            }
            other => panic!("expected unsupported, got {other:?}"),
        }
    }

    #[test]
    fn test_save() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("map.svg");
        let figure = render(&map(), &PlotOptions::default())?;
        figure.save(&path)?;
        assert_eq!(fs::read_to_string(&path)?, figure.svg());

        Ok(())
    }

    #[test]
    fn test_ticks() {
        assert_eq!(ticks(0.0, 10.0, 5), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
        assert_eq!(ticks(-3.0, 17.0, 4), vec![0.0, 5.0, 10.0, 15.0]);
        assert_eq!(ticks(5.0, 5.0, 4), vec![5.0]);
        assert_eq!(tick_label(2.0), "2");
        assert_eq!(tick_label(12.34), "12.3");
        assert_eq!(tick_label(0.123), "0.12");
    }

    #[test]
    fn test_frame() {
        let frame = Frame::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(frame.scale_x(5.0, (0.0, 10.0)), 60.0);
        assert_eq!(frame.scale_y(0.0, (0.0, 10.0)), 70.0);
        assert_eq!(frame.scale_y(10.0, (0.0, 10.0)), 20.0);
        assert_eq!(frame.scale_x(3.0, (3.0, 3.0)), 60.0);
    }

    #[test]
    fn test_lat_lon_order() {
        let values = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn();
        let grid = lat_lon(values.view(), &["lon", "lat"]).unwrap();
        assert_eq!(grid.shape(), &[3, 2]);
        assert_eq!(grid[[0, 1]], 4.0);

        let values = Array::from_shape_vec(IxDyn(&[2, 2, 3]), (0..12).map(f64::from).collect())
            .unwrap();
        let grid = panel(values.view(), &["member", "lat", "lon"], &[(0, 1)]).unwrap();
        assert_eq!(grid[[0, 0]], 6.0);
    }
}
