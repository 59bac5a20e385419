use std::{fs, path::PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::Args;
use tracing::info;

use ensemble::{
    synthesize, Catalog, CatalogMetadata, Cluster, ClusterConfig, FileMapper, Listing, LsEntry,
    Source, SynthConfig,
};

/// Name of the store directory `synth` writes next to its catalog
const STORE_DIR: &str = "store";

#[derive(Args, Clone, Debug)]
pub struct SynthArgs {
    /// Directory to write the store and `catalog.yaml` into
    #[arg(long)]
    pub out: PathBuf,

    /// Identifier of the dataset in the written catalog
    #[arg(long, default_value = "synthetic")]
    pub identifier: String,

    /// Number of days of data
    #[arg(long, default_value_t = SynthConfig::default().days)]
    pub days: usize,

    /// Number of ensemble members
    #[arg(long, default_value_t = SynthConfig::default().members)]
    pub members: usize,

    /// Seed for the random number generator
    #[arg(long, default_value_t = SynthConfig::default().seed)]
    pub seed: u64,

    /// First day of data (YYYY-MM-DD)
    #[arg(long, default_value = "1980-01-01")]
    pub start: NaiveDate,
}

fn single_worker() -> anyhow::Result<Cluster> {
    Cluster::provision(ClusterConfig {
        workers: 1,
        ..ClusterConfig::default()
    })
    .context("provisioning worker pool")
}

/// Every dataset listed in a catalog
pub fn ls(catalog: &str) -> anyhow::Result<Vec<Listing>> {
    let cluster = single_worker()?;
    let catalog = cluster
        .block_on(ensemble_http::open_catalog(catalog))
        .with_context(|| format!("reading catalog {catalog}"))?;

    Ok(catalog.walk())
}

/// Every object a catalogued dataset refers to, with its type and stored size
pub fn inspect(catalog: &str, identifier: &str) -> anyhow::Result<Vec<LsEntry>> {
    let cluster = single_worker()?;
    let catalog = cluster
        .block_on(ensemble_http::open_catalog(catalog))
        .with_context(|| format!("reading catalog {catalog}"))?;
    let entry = catalog.resolve(identifier)?;
    let resolver = cluster.connect(ensemble_http::open_store(&entry.store)?);
    let ls = cluster
        .block_on(resolver.ls(&entry.cid))
        .with_context(|| format!("listing {identifier}"))?;

    Ok(ls)
}

/// Write a synthetic dataset into a directory store and a catalog pointing at it. Returns the
/// path of the catalog.
///
pub fn synth(args: &SynthArgs) -> anyhow::Result<PathBuf> {
    let cluster = single_worker()?;
    let store = args.out.join(STORE_DIR);
    let resolver = cluster.connect(Box::new(
        FileMapper::new(&store).with_context(|| format!("creating {}", store.display()))?,
    ));

    let config = SynthConfig {
        start: args.start,
        days: args.days,
        members: args.members,
        seed: args.seed,
        ..SynthConfig::default()
    };
    let dataset = cluster.block_on(synthesize(&resolver, &config))?;
    let cid = dataset
        .cid
        .context("synthesized dataset was not committed")?;

    let mut catalog = Catalog::default();
    catalog.metadata = CatalogMetadata {
        title: Some(String::from("Synthetic ensembles")),
        store: Some(String::from(STORE_DIR)),
    };
    catalog.sources.insert(
        args.identifier.clone(),
        Source {
            description: Some(config.title.clone()),
            cid: Some(cid.to_string()),
            ..Source::default()
        },
    );

    let path = args.out.join("catalog.yaml");
    fs::write(&path, catalog.to_yaml()?)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(%cid, catalog = %path.display(), "wrote synthetic dataset");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synth_and_ls() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let args = SynthArgs {
            out: dir.path().to_path_buf(),
            identifier: String::from("scratch"),
            days: 31,
            members: 1,
            seed: 1,
            start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
        };
        let path = synth(&args)?;
        assert_eq!(path, dir.path().join("catalog.yaml"));
        assert!(dir.path().join(STORE_DIR).is_dir());

        let listings = ls(&path.to_string_lossy())?;
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].identifier, "scratch");
        assert_eq!(
            listings[0].description.as_deref(),
            Some("Synthetic daily ensemble")
        );

        Ok(())
    }

    #[test]
    fn test_inspect() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let args = SynthArgs {
            out: dir.path().to_path_buf(),
            identifier: String::from("scratch"),
            days: 31,
            members: 1,
            seed: 1,
            start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
        };
        let path = synth(&args)?;
        let catalog = path.to_string_lossy();

        let ls = inspect(&catalog, "scratch")?;
        assert!(!ls.is_empty());
        assert!(ls.iter().any(|entry| entry.name.starts_with("pcp/")));
        for entry in &ls {
            assert_eq!(entry.node_type, Some("Chunk"));
            assert!(entry.size.unwrap_or(0) > 0);
        }

        assert!(inspect(&catalog, "observed").is_err());

        Ok(())
    }

    #[test]
    fn test_ls_missing_catalog() {
        assert!(ls("/nonexistent/catalog.yaml").is_err());
    }
}
