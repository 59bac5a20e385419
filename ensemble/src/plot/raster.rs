use ndarray::ArrayView2;

use super::{
    canvas::{Anchor, Canvas, TextStyle},
    color::{Colormap, BLACK, GRID, MISSING},
    fraction, lat_lon, tick_label, ticks, unsupported, Frame, PlotOptions, Result,
};
use crate::materialized::Materialized;

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 480.0;

/// A single lat/lon map with a color bar
///
pub(super) fn draw(result: &Materialized, options: &PlotOptions) -> Result<Canvas> {
    let dims = result.dims();
    let grid = lat_lon(result.values.view(), &dims).ok_or_else(|| unsupported(result))?;
    let range = color_range(result, options);
    let colormap = options.colormap_for(result);
    let lats = positions(result, "lat");
    let lons = positions(result, "lon");

    let mut canvas = Canvas::new(WIDTH, HEIGHT);
    title(&mut canvas, options.title_for(result));

    let frame = Frame::new(80.0, 50.0, WIDTH - 190.0, HEIGHT - 110.0);
    draw_grid(&mut canvas, frame, grid, north_up(&lats), colormap, range);
    lat_labels(&mut canvas, frame, &lats);
    lon_labels(&mut canvas, frame, &lons);

    let bar = Frame::new(frame.right() + 20.0, frame.y, 16.0, frame.height);
    draw_colorbar(&mut canvas, bar, colormap, range, options.units_for(result));

    Ok(canvas)
}

pub(super) fn title(canvas: &mut Canvas, text: &str) {
    let center = canvas.width / 2.0;
    canvas.text(
        center,
        28.0,
        text,
        TextStyle::new(16.0).anchored(Anchor::Middle).bold(),
    );
}

/// The color scale: fixed by the options or spanning the data
pub(super) fn color_range(result: &Materialized, options: &PlotOptions) -> (f64, f64) {
    options
        .range
        .or_else(|| result.finite_range())
        .unwrap_or((0.0, 1.0))
}

pub(super) fn positions(result: &Materialized, dim: &str) -> Vec<f64> {
    result
        .coord(dim)
        .map(|coord| coord.values.positions())
        .unwrap_or_default()
}

/// Latitudes stored south to north have to be drawn bottom up
pub(super) fn north_up(lats: &[f64]) -> bool {
    matches!((lats.first(), lats.last()), (Some(first), Some(last)) if first < last)
}

/// Fill `frame` with one cell per grid value. Missing values are drawn in a neutral gray.
///
pub(super) fn draw_grid(
    canvas: &mut Canvas,
    frame: Frame,
    grid: ArrayView2<f64>,
    flip: bool,
    colormap: Colormap,
    (low, high): (f64, f64),
) {
    let (rows, cols) = grid.dim();
    let cell_width = frame.width / cols as f64;
    let cell_height = frame.height / rows as f64;
    for ((row, col), &value) in grid.indexed_iter() {
        let row = if flip { rows - 1 - row } else { row };
        let color = if value.is_nan() {
            MISSING
        } else {
            colormap.sample(fraction(value, low, high))
        };
        canvas.fill_rect(
            frame.x + col as f64 * cell_width,
            frame.y + row as f64 * cell_height,
            cell_width,
            cell_height,
            color,
        );
    }
    canvas.outline(frame.x, frame.y, frame.width, frame.height, GRID);
}

pub(super) fn lat_labels(canvas: &mut Canvas, frame: Frame, lats: &[f64]) {
    let style = TextStyle::new(10.0).anchored(Anchor::End);
    let (south, north) = match (lats.first(), lats.last()) {
        (Some(&first), Some(&last)) => (first.min(last), first.max(last)),
        _ => return,
    };
    canvas.text(frame.x - 4.0, frame.y + 10.0, format!("{north:.2}°N"), style);
    canvas.text(frame.x - 4.0, frame.bottom(), format!("{south:.2}°N"), style);
}

pub(super) fn lon_labels(canvas: &mut Canvas, frame: Frame, lons: &[f64]) {
    let (west, east) = match (lons.first(), lons.last()) {
        (Some(&first), Some(&last)) => (first.min(last), first.max(last)),
        _ => return,
    };
    let y = frame.bottom() + 14.0;
    canvas.text(frame.x, y, format!("{west:.2}°E"), TextStyle::new(10.0));
    canvas.text(
        frame.right(),
        y,
        format!("{east:.2}°E"),
        TextStyle::new(10.0).anchored(Anchor::End),
    );
}

/// A vertical color bar, low values at the bottom, with round number ticks and the units
///
pub(super) fn draw_colorbar(
    canvas: &mut Canvas,
    frame: Frame,
    colormap: Colormap,
    range: (f64, f64),
    units: &str,
) {
    const STEPS: usize = 32;
    let step = frame.height / STEPS as f64;
    for i in 0..STEPS {
        let t = (i as f64 + 0.5) / STEPS as f64;
        canvas.fill_rect(
            frame.x,
            frame.bottom() - (i + 1) as f64 * step,
            frame.width,
            step,
            colormap.sample(t),
        );
    }
    canvas.outline(frame.x, frame.y, frame.width, frame.height, BLACK);

    for tick in ticks(range.0, range.1, 5) {
        let y = frame.scale_y(tick, range);
        canvas.line((frame.right(), y), (frame.right() + 4.0, y), BLACK, 1.0);
        canvas.text(frame.right() + 6.0, y + 4.0, tick_label(tick), TextStyle::new(10.0));
    }

    if !units.is_empty() {
        canvas.vertical_text(
            frame.right() + 52.0,
            frame.y + frame.height / 2.0,
            units,
            TextStyle::new(12.0).anchored(Anchor::Middle),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::plot::{tests::map, Color};

    fn cells(svg: &str) -> usize {
        // Grid cells, color bar steps and the white background are all filled rects
        svg.matches("<rect").count()
    }

    #[test]
    fn test_draw() -> Result<()> {
        let result = map();
        let svg = draw(&result, &PlotOptions::default())?.to_svg();
        // background, 12 cells, grid outline, 32 color bar steps, color bar outline
        assert_eq!(cells(&svg), 1 + 12 + 1 + 32 + 1);
        assert!(svg.contains(">Precipitation</text>"));
        assert!(svg.contains(">30.25°N</text>"));
        assert!(svg.contains(">-98.00°E</text>"));

        Ok(())
    }

    #[test]
    fn test_north_up() -> Result<()> {
        assert!(north_up(&[30.0, 30.125]));
        assert!(!north_up(&[30.125, 30.0]));
        assert!(!north_up(&[]));

        // The smallest value sits in the southwest corner, which is the bottom left cell
        let result = map();
        let options = PlotOptions::default().with_colormap(Colormap::Viridis);
        let svg = draw(&result, &options)?.to_svg();
        let lowest = Colormap::Viridis.sample(0.0);
        let bottom_left = format!(
            r#"<rect x="80.00" y="296.67" width="112.50" height="123.33" fill="{lowest}"/>"#
        );
        assert!(svg.contains(&bottom_left), "{svg}");

        Ok(())
    }

    #[test]
    fn test_missing_cells() -> Result<()> {
        let mut result = map();
        result.values[[0, 0]] = f64::NAN;
        let svg = draw(&result, &PlotOptions::default())?.to_svg();
        assert_eq!(svg.matches(&format!(r#"fill="{}""#, MISSING)).count(), 1);
        assert_ne!(MISSING, Color::rgb(255, 255, 255));

        Ok(())
    }
}
