use ndarray::Axis;

use super::{
    canvas::{Anchor, Canvas, TextStyle},
    color::{series_color, BLACK, GRID},
    raster::{positions, title},
    tick_label, ticks, unsupported, Frame, PlotOptions, Result,
};
use crate::materialized::Materialized;

const WIDTH: f64 = 720.0;
const HEIGHT: f64 = 420.0;

/// Series short enough to mark each point
const MARKED: usize = 40;

struct Series {
    label: Option<String>,
    values: Vec<f64>,
}

/// A time series, or one line per value of the other dimension
///
pub(super) fn draw(result: &Materialized, options: &PlotOptions) -> Result<Canvas> {
    let dims = result.dims();
    let time_axis = dims
        .iter()
        .position(|dim| *dim == "time")
        .ok_or_else(|| unsupported(result))?;
    let series = match result.ndim() {
        1 => vec![Series {
            label: None,
            values: result.values.iter().copied().collect(),
        }],
        2 => {
            let axis = 1 - time_axis;
            let coord = &result.coords[axis];
            (0..coord.len())
                .map(|index| Series {
                    label: Some(format!("{} = {}", coord.name, coord.values.label(index))),
                    values: result
                        .values
                        .index_axis(Axis(axis), index)
                        .iter()
                        .copied()
                        .collect(),
                })
                .collect()
        }
        _ => return Err(unsupported(result)),
    };

    let times = positions(result, "time");
    let x_range = match (times.first(), times.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Err(unsupported(result)),
    };
    let y_range = padded(result.finite_range().unwrap_or((0.0, 1.0)));

    let mut canvas = Canvas::new(WIDTH, HEIGHT);
    title(&mut canvas, options.title_for(result));
    let frame = Frame::new(80.0, 50.0, WIDTH - 240.0, HEIGHT - 110.0);
    y_axis(&mut canvas, frame, y_range, options.units_for(result));
    x_axis(&mut canvas, frame, result, x_range);

    for (i, line) in series.iter().enumerate() {
        let color = series_color(i);
        let project = |(x, y): (f64, f64)| (frame.scale_x(x, x_range), frame.scale_y(y, y_range));
        for segment in segments(&times, &line.values) {
            if segment.len() <= MARKED {
                for &point in &segment {
                    let (x, y) = project(point);
                    canvas.fill_rect(x - 1.5, y - 1.5, 3.0, 3.0, color);
                }
            }
            canvas.polyline(segment.into_iter().map(project).collect(), color, 1.5);
        }

        if let Some(label) = &line.label {
            let y = frame.y + 10.0 + i as f64 * 18.0;
            let x = frame.right() + 20.0;
            canvas.line((x, y - 4.0), (x + 20.0, y - 4.0), color, 2.0);
            canvas.text(x + 26.0, y, label, TextStyle::new(11.0));
        }
    }
    canvas.outline(frame.x, frame.y, frame.width, frame.height, BLACK);

    Ok(canvas)
}

/// Pad a value range by a twentieth on each side so lines don't run along the frame
fn padded((low, high): (f64, f64)) -> (f64, f64) {
    let pad = if high > low { (high - low) * 0.05 } else { 1.0 };

    (low - pad, high + pad)
}

/// Runs of consecutive points with values. Missing values break the line.
fn segments(times: &[f64], values: &[f64]) -> Vec<Vec<(f64, f64)>> {
    let mut segments = vec![];
    let mut current = vec![];
    for (&time, &value) in times.iter().zip(values) {
        if value.is_nan() {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
        } else {
            current.push((time, value));
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

fn y_axis(canvas: &mut Canvas, frame: Frame, range: (f64, f64), units: &str) {
    let style = TextStyle::new(10.0).anchored(Anchor::End);
    for tick in ticks(range.0, range.1, 6) {
        let y = frame.scale_y(tick, range);
        canvas.line((frame.x, y), (frame.right(), y), GRID, 1.0);
        canvas.text(frame.x - 6.0, y + 4.0, tick_label(tick), style);
    }
    if !units.is_empty() {
        canvas.vertical_text(
            frame.x - 50.0,
            frame.y + frame.height / 2.0,
            units,
            TextStyle::new(12.0).anchored(Anchor::Middle),
        );
    }
}

/// Dates under the first, middle and last points
fn x_axis(canvas: &mut Canvas, frame: Frame, result: &Materialized, range: (f64, f64)) {
    let Some(time) = result.coord("time") else {
        return;
    };
    let last = time.len().saturating_sub(1);
    let mut indexes = vec![0, last / 2, last];
    indexes.dedup();

    let times = time.values.positions();
    let y = frame.bottom() + 16.0;
    for index in indexes {
        let x = frame.scale_x(times[index], range);
        canvas.line((x, frame.bottom()), (x, frame.bottom() + 4.0), BLACK, 1.0);
        canvas.text(
            x,
            y,
            time.values.label(index),
            TextStyle::new(10.0).anchored(Anchor::Middle),
        );
    }
}
