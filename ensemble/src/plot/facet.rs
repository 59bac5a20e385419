use super::{
    canvas::{Canvas, TextStyle},
    panel,
    raster::{
        color_range, draw_colorbar, draw_grid, lat_labels, lon_labels, north_up, positions, title,
    },
    unsupported, Frame, PlotOptions, Result,
};
use crate::materialized::Materialized;

const PANEL_WIDTH: f64 = 200.0;
const PANEL_HEIGHT: f64 = 160.0;
const GAP: f64 = 20.0;
const LEFT: f64 = 70.0;
const TOP: f64 = 60.0;
const RIGHT: f64 = 90.0;

/// Panels in a row when there's only one facet dimension
const WRAP: usize = 4;

/// One map per combination of the facet dimensions
///
struct Panel {
    label: String,
    fixed: Vec<(usize, usize)>,
}

/// A grid of lat/lon maps, one per value of the other dimensions, all on one color scale
///
pub(super) fn draw(result: &Materialized, options: &PlotOptions) -> Result<Canvas> {
    let dims = result.dims();
    let facets: Vec<usize> = (0..dims.len())
        .filter(|&axis| dims[axis] != "lat" && dims[axis] != "lon")
        .collect();
    let (rows, cols, panels) = match layout(result, options, &facets)? {
        (Some(row_axis), col_axis) => {
            let rows = result.shape()[row_axis];
            let cols = result.shape()[col_axis];
            let mut panels = Vec::with_capacity(rows * cols);
            for row in 0..rows {
                for col in 0..cols {
                    panels.push(Panel {
                        label: format!(
                            "{}, {}",
                            facet_label(result, row_axis, row),
                            facet_label(result, col_axis, col)
                        ),
                        fixed: vec![(row_axis, row), (col_axis, col)],
                    });
                }
            }
            (rows, cols, panels)
        }
        (None, axis) => {
            let count = result.shape()[axis];
            let panels = (0..count)
                .map(|index| Panel {
                    label: facet_label(result, axis, index),
                    fixed: vec![(axis, index)],
                })
                .collect();
            (count.div_ceil(WRAP), count.min(WRAP), panels)
        }
    };

    let width = LEFT + cols as f64 * (PANEL_WIDTH + GAP) + RIGHT;
    let height = TOP + rows as f64 * (PANEL_HEIGHT + GAP + 10.0) + 30.0;
    let mut canvas = Canvas::new(width, height);
    title(&mut canvas, options.title_for(result));

    let range = color_range(result, options);
    let colormap = options.colormap_for(result);
    let lats = positions(result, "lat");
    let lons = positions(result, "lon");
    let flip = north_up(&lats);
    for (i, panel_spec) in panels.iter().enumerate() {
        let (row, col) = (i / cols, i % cols);
        let frame = Frame::new(
            LEFT + col as f64 * (PANEL_WIDTH + GAP),
            TOP + row as f64 * (PANEL_HEIGHT + GAP + 10.0),
            PANEL_WIDTH,
            PANEL_HEIGHT,
        );
        let grid = panel(result.values.view(), &dims, &panel_spec.fixed)
            .ok_or_else(|| unsupported(result))?;

        canvas.text(frame.x, frame.y - 6.0, &panel_spec.label, TextStyle::new(11.0));
        draw_grid(&mut canvas, frame, grid, flip, colormap, range);
        if col == 0 {
            lat_labels(&mut canvas, frame, &lats);
        }
        if i + cols >= panels.len() {
            lon_labels(&mut canvas, frame, &lons);
        }
    }

    let bar = Frame::new(
        width - RIGHT + 4.0,
        TOP,
        16.0,
        rows as f64 * (PANEL_HEIGHT + GAP + 10.0) - GAP - 10.0,
    );
    draw_colorbar(&mut canvas, bar, colormap, range, options.units_for(result));

    Ok(canvas)
}

/// Which facet dimension runs down the rows, if any, and which across the columns.
///
/// With two facet dimensions, members go across unless the options say otherwise.
fn layout(
    result: &Materialized,
    options: &PlotOptions,
    facets: &[usize],
) -> Result<(Option<usize>, usize)> {
    let dims = result.dims();
    let find = |name: &str| facets.iter().copied().find(|&axis| dims[axis] == name);
    let chosen = |name: &Option<String>| {
        name.as_deref()
            .map(|name| find(name).ok_or_else(|| unsupported(result)))
            .transpose()
    };

    match *facets {
        [only] => Ok((None, only)),
        [first, second] => {
            let other = |axis: usize| if axis == first { second } else { first };
            let rows = chosen(&options.rows)?;
            let cols = chosen(&options.cols)?;

            Ok(match (rows, cols) {
                (Some(rows), Some(cols)) if rows != cols => (Some(rows), cols),
                (Some(rows), _) => (Some(rows), other(rows)),
                (None, Some(cols)) => (Some(other(cols)), cols),
                (None, None) => match find("member") {
                    Some(member) => (Some(other(member)), member),
                    None => (Some(first), second),
                },
            })
        }
        _ => Err(unsupported(result)),
    }
}

fn facet_label(result: &Materialized, axis: usize, index: usize) -> String {
    let coord = &result.coords[axis];

    format!("{} = {}", coord.name, coord.values.label(index))
}
