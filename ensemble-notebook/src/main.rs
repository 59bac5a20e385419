mod commands;
mod notebook;

use clap::{Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use commands::SynthArgs;
use notebook::RunArgs;

/// Analyze gridded ensemble climate data and write the figures as SVG
#[derive(Parser)]
#[command(name = "ensemble-notebook", version, long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every analysis and write a figure for each
    Run(RunArgs),

    /// List the datasets in a catalog
    Ls {
        /// URL or path of the catalog
        #[arg(long)]
        catalog: String,
    },

    /// List the stored objects behind a dataset in a catalog
    Inspect {
        /// URL or path of the catalog
        #[arg(long)]
        catalog: String,

        /// Dotted identifier of the dataset in the catalog
        #[arg(long)]
        dataset: String,
    },

    /// Write a synthetic ensemble dataset and a catalog for offline runs
    Synth(SynthArgs),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace,hyper=debug,reqwest=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 2)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    debug!("verbosity level {}", cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => notebook::run(&args).map(|report| {
            for path in &report.written {
                println!("wrote {}", path.display());
            }
            for (figure, reason) in &report.failed {
                eprintln!("skipped {figure}: {reason}");
            }
        }),
        Commands::Ls { catalog } => commands::ls(&catalog).map(|listings| {
            for listing in listings {
                println!(
                    "{:<32} {}",
                    listing.identifier,
                    listing.description.unwrap_or_default()
                );
            }
        }),
        Commands::Inspect { catalog, dataset } => {
            commands::inspect(&catalog, &dataset).map(|entries| {
                for entry in entries {
                    let size = entry.size.map(|size| size.to_string()).unwrap_or_default();
                    println!(
                        "{} {:<24} {:<8} {:>10}",
                        entry.cid,
                        entry.name,
                        entry.node_type.unwrap_or("missing"),
                        size
                    );
                }
            })
        }
        Commands::Synth(args) => commands::synth(&args).map(|catalog| {
            println!("wrote {}", catalog.display());
        }),
    };

    if let Err(err) = result {
        error!("{err:#}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from([
            "ensemble-notebook",
            "run",
            "--catalog",
            "catalog.yaml",
            "--dataset",
            "cmip.daily",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.cluster_config(), ensemble::ClusterConfig::default());
        assert_eq!(args.analysis_config().out_dir, std::path::PathBuf::from("figures"));
        assert_eq!(args.analysis_config().center, ensemble::DEFAULT_CENTER);
        assert!(!args.progress);
    }

    #[test]
    fn test_run_options() {
        let cli = Cli::try_parse_from([
            "ensemble-notebook",
            "run",
            "--catalog",
            "https://example.com/catalog.yaml",
            "--dataset",
            "daily",
            "--workers",
            "8",
            "--start",
            "1990-01-01",
            "--end",
            "1999-12-31",
            "--lon",
            "-100.5",
            "--progress",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.workers, 8);
        assert_eq!(args.lon, -100.5);
        assert_eq!(args.start, chrono::NaiveDate::from_ymd_opt(1990, 1, 1));
        assert!(args.progress);

        assert!(Cli::try_parse_from(["ensemble-notebook", "run", "--dataset", "x"]).is_err());
        assert!(Cli::try_parse_from([
            "ensemble-notebook",
            "run",
            "--catalog",
            "c",
            "--dataset",
            "d",
            "--start",
            "yesterday"
        ])
        .is_err());
    }
}
