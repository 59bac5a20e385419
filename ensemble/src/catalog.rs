//! YAML catalogs of stored datasets.
//!
//! ```yaml
//! metadata:
//!   title: Climate datasets
//!   store: https://chunks.example.com
//! sources:
//!   cmip:
//!     description: Downscaled ensembles
//!     sources:
//!       daily:
//!         description: Daily temperature and precipitation
//!         cid: bafkrei...
//! ```
//!
//! Entries are named by dotted paths, `cmip.daily` above. An entry's store is the nearest one
//! given on the entry, its groups, or the catalog metadata.
//!
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use cid::Cid;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub metadata: CatalogMetadata,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, Source>,

    /// Where the catalog was read from. Relative stores are resolved against it.
    #[serde(skip)]
    base: Option<StoreLocation>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

/// A catalog entry: either a dataset (with a `cid`) or a group of entries (with `sources`)
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, Source>,
}

/// A resolved catalog entry
///
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    pub identifier: String,
    pub description: Option<String>,
    pub cid: Cid,
    pub store: StoreLocation,
}

/// A row of `Catalog::walk`
///
#[derive(Clone, Debug, PartialEq)]
pub struct Listing {
    pub identifier: String,
    pub description: Option<String>,
    pub cid: Option<String>,
}

/// Where a chunk store lives
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    Url(String),
    Directory(PathBuf),
}

impl StoreLocation {
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            StoreLocation::Url(location.trim_end_matches('/').to_string())
        } else {
            let path = location.strip_prefix("file://").unwrap_or(location);
            StoreLocation::Directory(PathBuf::from(path))
        }
    }

    /// Resolve `location` relative to this one. Absolute paths and URLs stand on their own.
    pub fn join(&self, location: &str) -> Self {
        match (self, StoreLocation::parse(location)) {
            (_, url @ StoreLocation::Url(_)) => url,
            (_, StoreLocation::Directory(path)) if path.is_absolute() => {
                StoreLocation::Directory(path)
            }
            (StoreLocation::Directory(base), StoreLocation::Directory(path)) => {
                StoreLocation::Directory(base.join(path))
            }
            (StoreLocation::Url(base), StoreLocation::Directory(path)) => {
                let path = path.to_string_lossy();
                let path = path.trim_start_matches("./").trim_end_matches('/');
                StoreLocation::Url(format!("{base}/{path}"))
            }
        }
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Url(url) => f.write_str(url),
            StoreLocation::Directory(path) => write!(f, "{}", path.display()),
        }
    }
}

impl Catalog {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|err| Error::Catalog(err.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|err| Error::Catalog(err.to_string()))
    }

    /// Read a catalog from a local file. Relative stores resolve against the file's directory.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| Error::Catalog(format!("can't read {}: {err}", path.display())))?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        debug!(path = %path.display(), "read catalog");

        Ok(Self::from_yaml(&text)?.with_base(StoreLocation::Directory(base)))
    }

    /// Set the location relative stores are resolved against
    pub fn with_base(mut self, base: StoreLocation) -> Self {
        self.base = Some(base);
        self
    }

    pub fn base(&self) -> Option<&StoreLocation> {
        self.base.as_ref()
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.title.as_deref()
    }

    /// Look up a dataset by dotted identifier, e.g. `cmip.daily`
    ///
    pub fn resolve(&self, identifier: &str) -> Result<CatalogEntry> {
        let lookup = || Error::Lookup(identifier.to_string());
        let mut sources = &self.sources;
        let mut store = self.metadata.store.as_deref();
        let mut entry = None;
        for name in identifier.split('.') {
            let source = sources.get(name).ok_or_else(lookup)?;
            store = source.store.as_deref().or(store);
            sources = &source.sources;
            entry = Some(source);
        }

        let source = entry.ok_or_else(lookup)?;
        let cid = source.cid.as_deref().ok_or_else(lookup)?;
        let cid = Cid::try_from(cid)?;
        let store = store.ok_or_else(|| {
            Error::Catalog(format!("no store given for {identifier} or its catalog"))
        })?;
        let store = match &self.base {
            Some(base) => base.join(store),
            None => StoreLocation::parse(store),
        };

        Ok(CatalogEntry {
            identifier: identifier.to_string(),
            description: source.description.clone(),
            cid,
            store,
        })
    }

    /// Every dataset in the catalog, by identifier
    pub fn walk(&self) -> Vec<Listing> {
        let mut listings = vec![];
        walk_sources(&self.sources, "", &mut listings);

        listings
    }
}

fn walk_sources(sources: &BTreeMap<String, Source>, prefix: &str, listings: &mut Vec<Listing>) {
    for (name, source) in sources {
        let identifier = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        if source.cid.is_some() {
            listings.push(Listing {
                identifier: identifier.clone(),
                description: source.description.clone(),
                cid: source.cid.clone(),
            });
        }
        walk_sources(&source.sources, &identifier, listings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::cid_for;

    fn catalog_yaml(cid: &Cid) -> String {
        format!(
            r#"
metadata:
  title: Test catalog
  store: chunks
sources:
  cmip:
    description: Downscaled ensembles
    sources:
      daily:
        description: Daily ensemble
        cid: {cid}
      remote:
        description: Same thing, elsewhere
        cid: {cid}
        store: https://chunks.example.com/
  broken:
    description: Missing its CID
"#
        )
    }

    #[test]
    fn test_resolve() -> Result<()> {
        let cid = cid_for(b"dataset")?;
        let catalog = Catalog::from_yaml(&catalog_yaml(&cid))?
            .with_base(StoreLocation::Directory(PathBuf::from("/data/catalogs")));
        assert_eq!(catalog.title(), Some("Test catalog"));

        let entry = catalog.resolve("cmip.daily")?;
        assert_eq!(entry.cid, cid);
        assert_eq!(entry.description.as_deref(), Some("Daily ensemble"));
        assert_eq!(
            entry.store,
            StoreLocation::Directory(PathBuf::from("/data/catalogs/chunks"))
        );

        let entry = catalog.resolve("cmip.remote")?;
        assert_eq!(
            entry.store,
            StoreLocation::Url(String::from("https://chunks.example.com"))
        );

        Ok(())
    }

    #[test]
    fn test_resolve_failures() -> Result<()> {
        let cid = cid_for(b"dataset")?;
        let catalog = Catalog::from_yaml(&catalog_yaml(&cid))?;
        for identifier in ["cmip.hourly", "cmip", "broken", "", "cmip.daily.more"] {
            assert!(
                matches!(catalog.resolve(identifier), Err(Error::Lookup(_))),
                "{identifier} should not resolve"
            );
        }

        Ok(())
    }

    #[test]
    fn test_bad_yaml() {
        assert!(matches!(
            Catalog::from_yaml("sources: [1, 2"),
            Err(Error::Catalog(_))
        ));
    }

    #[test]
    fn test_bad_cid() {
        let catalog = Catalog::from_yaml("metadata: {store: x}\nsources: {a: {cid: nope}}");
        assert!(matches!(
            catalog.and_then(|catalog| catalog.resolve("a")),
            Err(Error::Cid(_))
        ));
    }

    #[test]
    fn test_walk() -> Result<()> {
        let cid = cid_for(b"dataset")?;
        let catalog = Catalog::from_yaml(&catalog_yaml(&cid))?;
        let identifiers: Vec<String> = catalog
            .walk()
            .into_iter()
            .map(|listing| listing.identifier)
            .collect();
        assert_eq!(identifiers, vec!["cmip.daily", "cmip.remote"]);

        Ok(())
    }

    #[test]
    fn test_yaml_round_trip() -> Result<()> {
        let cid = cid_for(b"dataset")?;
        let catalog = Catalog::from_yaml(&catalog_yaml(&cid))?;
        let reread = Catalog::from_yaml(&catalog.to_yaml()?)?;
        assert_eq!(reread, catalog);

        Ok(())
    }

    #[test]
    fn test_store_location_join() {
        let base = StoreLocation::parse("https://example.com/catalogs/");
        assert_eq!(
            base.join("./chunks"),
            StoreLocation::Url(String::from("https://example.com/catalogs/chunks"))
        );
        assert_eq!(
            base.join("/var/chunks"),
            StoreLocation::Directory(PathBuf::from("/var/chunks"))
        );

        let base = StoreLocation::parse("file:///data");
        assert_eq!(
            base.join("chunks"),
            StoreLocation::Directory(PathBuf::from("/data/chunks"))
        );
    }

    #[tokio::test]
    async fn test_open() -> Result<()> {
        let cid = cid_for(b"dataset")?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("catalog.yaml");
        tokio::fs::write(&path, catalog_yaml(&cid)).await?;

        let catalog = Catalog::open(&path).await?;
        let entry = catalog.resolve("cmip.daily")?;
        assert_eq!(entry.store, StoreLocation::Directory(dir.path().join("chunks")));

        assert!(matches!(
            Catalog::open(dir.path().join("nope.yaml")).await,
            Err(Error::Catalog(_))
        ));

        Ok(())
    }
}
