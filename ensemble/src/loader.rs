use std::sync::Arc;

use tracing::info;

use crate::{
    catalog::{Catalog, CatalogEntry, StoreLocation},
    dataset::Dataset,
    errors::{Error, Result},
    mapper::Mapper,
    resolver::Resolver,
    store::FileMapper,
};

/// Open the dataset a catalog lists under `identifier`.
///
/// Only the dataset node is read: coordinates, variables and chunk layout. Chunks are read when
/// an array over them is computed.
///
pub async fn open_dataset(
    catalog: &Catalog,
    identifier: &str,
    resolver: &Arc<Resolver>,
) -> Result<Arc<Dataset>> {
    let entry = catalog.resolve(identifier)?;

    open_entry(&entry, resolver).await
}

/// Open the dataset behind an already resolved catalog entry
pub async fn open_entry(entry: &CatalogEntry, resolver: &Arc<Resolver>) -> Result<Arc<Dataset>> {
    let dataset = match resolver.get_dataset(&entry.cid).await {
        Err(Error::NotFound(cid)) => {
            return Err(Error::Lookup(format!(
                "{}: dataset {cid} is not in {}",
                entry.identifier, entry.store
            )))
        }
        result => result?,
    };
    info!(
        identifier = %entry.identifier,
        cid = %entry.cid,
        title = %dataset.title,
        variables = dataset.variables.len(),
        "opened dataset"
    );

    Ok(dataset)
}

/// A `Mapper` for a store on the local filesystem. Remote stores need a network capable mapper.
///
pub fn open_local_store(location: &StoreLocation) -> Result<Box<dyn Mapper>> {
    match location {
        StoreLocation::Directory(path) => Ok(Box::new(FileMapper::new(path)?)),
        StoreLocation::Url(url) => Err(Error::Catalog(format!(
            "{url} is a remote store, not a local directory"
        ))),
    }
}
