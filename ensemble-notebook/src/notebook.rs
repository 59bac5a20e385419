//! The notebook: open an ensemble dataset, run every analysis on a local worker pool and write a
//! figure for each one.
//!
use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::NaiveDate;
use clap::Args;
use tracing::{info, warn};

use ensemble::{
    plot::{self, PlotOptions},
    AnalysisConfig, Cluster, ClusterConfig, DataArray, Dataset, Materialized, NoProgress,
    Progress, ProgressReporter, DEFAULT_CENTER, DEFAULT_HALF_WIDTH,
};

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// URL or path of the catalog
    #[arg(long)]
    pub catalog: String,

    /// Dotted identifier of the dataset in the catalog
    #[arg(long)]
    pub dataset: String,

    /// Number of workers in the pool
    #[arg(long, default_value_t = ClusterConfig::default().workers)]
    pub workers: usize,

    /// Chunk cache size, in bytes
    #[arg(long, default_value_t = ClusterConfig::default().cache_bytes)]
    pub cache_bytes: u64,

    /// Directory figures are written to
    #[arg(long, default_value = "figures")]
    pub out: PathBuf,

    /// First day to analyze (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day to analyze, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Latitude of the center of the region of interest
    #[arg(long, default_value_t = DEFAULT_CENTER.0, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude of the center of the region of interest
    #[arg(long, default_value_t = DEFAULT_CENTER.1, allow_negative_numbers = true)]
    pub lon: f64,

    /// Half the width of the region of interest, in degrees
    #[arg(long, default_value_t = DEFAULT_HALF_WIDTH)]
    pub half_width: f64,

    /// Show a progress bar for each computation
    #[arg(long)]
    pub progress: bool,
}

impl RunArgs {
    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            workers: self.workers,
            cache_bytes: self.cache_bytes,
        }
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            center: (self.lat, self.lon),
            half_width: self.half_width,
            start: self.start,
            end: self.end,
            out_dir: self.out.clone(),
        }
    }
}

/// One figure's worth of analysis
struct Analysis {
    name: &'static str,
    array: DataArray,
    options: PlotOptions,
}

/// Figures written, and figures that couldn't be drawn along with why
///
#[derive(Debug, Default)]
pub struct Report {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(String, String)>,
}

pub fn run(args: &RunArgs) -> anyhow::Result<Report> {
    let cluster = Cluster::provision(args.cluster_config()).context("provisioning worker pool")?;
    let config = args.analysis_config();

    let catalog = cluster
        .block_on(ensemble_http::open_catalog(&args.catalog))
        .with_context(|| format!("reading catalog {}", args.catalog))?;
    let entry = catalog.resolve(&args.dataset)?;
    let resolver = cluster.connect(ensemble_http::open_store(&entry.store)?);
    let dataset = cluster.block_on(ensemble::open_entry(&entry, &resolver))?;
    println!("{dataset}");

    let analyses = analyses(&dataset, &config).context("building analyses")?;
    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("creating {}", config.out_dir.display()))?;

    let mut report = Report::default();
    for analysis in analyses {
        let result = compute(&cluster, &analysis, args.progress)
            .with_context(|| format!("computing {}", analysis.name))?;
        println!("{result}");

        match write_figure(&result, analysis.name, &analysis.options, &config.out_dir) {
            Ok(path) => report.written.push(path),
            Err(err) => {
                warn!(figure = analysis.name, %err, "skipping figure");
                report
                    .failed
                    .push((analysis.name.to_string(), err.to_string()));
            }
        }
    }
    info!(
        written = report.written.len(),
        failed = report.failed.len(),
        "notebook finished"
    );

    Ok(report)
}

fn analyses(dataset: &Dataset, config: &AnalysisConfig) -> ensemble::Result<Vec<Analysis>> {
    let period = config.period(dataset)?;
    let region = config.region();
    let t_mean = match period {
        Some((first, last)) => dataset.variable("t_mean")?.sel_time(first, last)?,
        None => dataset.variable("t_mean")?,
    };
    let seasonal = PlotOptions::default()
        .with_units("mm")
        .with_facets("season", "member");
    let (lat, lon) = config.center;

    Ok(vec![
        Analysis {
            name: "elevation",
            array: ensemble::elevation_map(dataset)?,
            options: PlotOptions::default(),
        },
        Analysis {
            name: "temperature_spread",
            array: ensemble::ensemble_spread(&t_mean.mean(&["time"])?)?,
            options: PlotOptions::default().with_title("Ensemble spread of mean temperature"),
        },
        Analysis {
            name: "seasonal_snowfall",
            array: ensemble::seasonal_snowfall(dataset, period)?,
            options: seasonal.clone(),
        },
        Analysis {
            name: "seasonal_precipitation",
            array: ensemble::seasonal_precipitation(dataset, period)?,
            options: seasonal,
        },
        Analysis {
            name: "regional_annual_max",
            array: ensemble::regional_annual_max(dataset, &region, period)?,
            options: PlotOptions::default().with_title(format!(
                "Annual maximum daily precipitation within {}° of {lat:.4}, {lon:.4}",
                config.half_width
            )),
        },
    ])
}

fn compute(
    cluster: &Cluster,
    analysis: &Analysis,
    show_progress: bool,
) -> ensemble::Result<Materialized> {
    let progress: Box<dyn Progress> = if show_progress {
        Box::new(ProgressReporter::new(analysis.name))
    } else {
        Box::new(NoProgress)
    };

    cluster.compute_with_progress(&analysis.array, progress.as_ref())
}

/// Render `result` and save it as `{out_dir}/{name}.svg`
///
pub fn write_figure(
    result: &Materialized,
    name: &str,
    options: &PlotOptions,
    out_dir: &Path,
) -> plot::Result<PathBuf> {
    let figure = plot::render(result, options)?;
    let path = out_dir.join(format!("{name}.svg"));
    figure.save(&path)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    use ensemble::{plot::PlotError, Coord, CoordValues};

    use crate::commands::{synth, SynthArgs};

    fn run_args(catalog: &Path, out: &Path) -> RunArgs {
        RunArgs {
            catalog: catalog.to_string_lossy().to_string(),
            dataset: String::from("synthetic"),
            workers: 2,
            cache_bytes: 1 << 26,
            out: out.to_path_buf(),
            start: None,
            end: None,
            lat: DEFAULT_CENTER.0,
            lon: DEFAULT_CENTER.1,
            half_width: DEFAULT_HALF_WIDTH,
            progress: false,
        }
    }

    fn synth_args(out: &Path) -> SynthArgs {
        SynthArgs {
            out: out.to_path_buf(),
            identifier: String::from("synthetic"),
            days: 400,
            members: 2,
            seed: 7,
            start: NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(),
        }
    }

    #[test]
    fn test_run() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = synth(&synth_args(&dir.path().join("data")))?;
        let figures = dir.path().join("figures");
        let report = run(&run_args(&catalog, &figures))?;

        assert!(report.failed.is_empty(), "{:?}", report.failed);
        let names: Vec<String> = report
            .written
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "elevation.svg",
                "temperature_spread.svg",
                "seasonal_snowfall.svg",
                "seasonal_precipitation.svg",
                "regional_annual_max.svg",
            ]
        );
        for path in &report.written {
            assert!(fs::read_to_string(path)?.starts_with("<svg"));
        }

        let snowfall = fs::read_to_string(figures.join("seasonal_snowfall.svg"))?;
        assert!(snowfall.contains(">season = DJF, member = 1</text>"));
        assert!(snowfall.contains(">Mean seasonal snowfall</text>"));

        Ok(())
    }

    #[test]
    fn test_run_with_period() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = synth(&synth_args(&dir.path().join("data")))?;
        let mut args = run_args(&catalog, &dir.path().join("figures"));
        args.start = NaiveDate::from_ymd_opt(1980, 3, 1);
        args.end = NaiveDate::from_ymd_opt(1980, 11, 30);
        let report = run(&args)?;
        assert_eq!(report.written.len(), 5);

        Ok(())
    }

    #[test]
    fn test_region_outside_dataset() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = synth(&synth_args(&dir.path().join("data")))?;
        let mut args = run_args(&catalog, &dir.path().join("figures"));
        args.lat = 45.0;
        args.lon = -120.0;

        let err = run(&args).expect_err("no cells fall in the region");
        assert!(err.to_string().contains("regional_annual_max"), "{err:#}");

        Ok(())
    }

    #[test]
    fn test_unknown_dataset() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = synth(&synth_args(&dir.path().join("data")))?;
        let mut args = run_args(&catalog, &dir.path().join("figures"));
        args.dataset = String::from("observed");

        assert!(run(&args).is_err());

        Ok(())
    }

    #[test]
    fn test_figure_failure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let result = Materialized {
            name: String::from("snowfall"),
            long_name: String::new(),
            units: String::from("mm"),
            title: None,
            coords: vec![Coord::new("lat", CoordValues::Float(vec![30.0, 30.125]))],
            values: ndarray::arr1(&[f64::NAN, f64::NAN]).into_dyn(),
        };

        let err = write_figure(&result, "snowfall", &PlotOptions::default(), dir.path());
        assert!(matches!(err, Err(PlotError::AllMissing(_))));
        assert!(!dir.path().join("snowfall.svg").exists());

        Ok(())
    }
}
