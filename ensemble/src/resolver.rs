use std::sync::Arc;

use cid::Cid;
use futures::{io::AsyncRead, FutureExt};
use tracing::debug;

use crate::{
    cache::{Cache, Cacheable},
    chunk::Chunk,
    dataset::Dataset,
    errors::{Error, Result},
    extio::{ExtendedAsyncRead, ExtendedAsyncWrite},
    mapper::Mapper,
    node::{self, Node},
};

const MAGIC_NUMBER: u16 = 0xE5B1;
const FORMAT_VERSION: u32 = 1;

/// The `Resolver` manages storage and retrieval of dataset nodes from a chunk store.
///
/// To store and load objects, a Resolver must be provided with a concrete `Mapper` implementation.
/// Loaded objects are stored in RAM in an LRU cache up to a specified size limit, for fast
/// re-retrieval of recently used chunks. Concurrent requests for the same chunk share one load.
///
pub struct Resolver {
    mapper: Box<dyn Mapper>,
    cache: Cache<Cid, CacheItem>,
}

enum CacheItem {
    Dataset(Arc<Dataset>),
    Chunk(Arc<Chunk>),
}

impl Cacheable for CacheItem {
    fn size(&self) -> u64 {
        match self {
            CacheItem::Dataset(dataset) => dataset.size(),
            CacheItem::Chunk(chunk) => chunk.size(),
        }
    }
}

impl Resolver {
    pub(crate) const HEADER_SIZE: u64 = 2 + 4 + 1;

    /// Create a new `Resolver`
    ///
    /// # Arguments
    ///
    /// * `mapper` - A boxed implementation of `Mapper`, which handles writing to and reading from
    ///   the underlying chunk store.
    /// * `cache_bytes` - The size limit, in bytes, for the LRU cache of recently used objects.
    ///   Objects report their size as the length of their serialized representation, which is
    ///   close enough to what they take up in RAM.
    ///
    pub fn new(mapper: Box<dyn Mapper>, cache_bytes: u64) -> Self {
        let cache = Cache::new(cache_bytes);
        Self { mapper, cache }
    }

    /// Get a `Dataset` from the chunk store.
    ///
    /// Only the dataset node itself is loaded. Chunks are read when a computation needs them.
    ///
    pub async fn get_dataset(self: &Arc<Resolver>, cid: &Cid) -> Result<Arc<Dataset>> {
        match &*self.check_cache(cid).await? {
            CacheItem::Dataset(dataset) => Ok(Arc::clone(dataset)),
            _ => Err(Error::Format(format!("{cid} is not a dataset"))),
        }
    }

    pub(crate) async fn get_chunk(self: &Arc<Resolver>, cid: &Cid) -> Result<Arc<Chunk>> {
        match &*self.check_cache(cid).await? {
            CacheItem::Chunk(chunk) => Ok(Arc::clone(chunk)),
            _ => Err(Error::Format(format!("{cid} is not a chunk"))),
        }
    }

    async fn check_cache(self: &Arc<Resolver>, cid: &Cid) -> Result<Arc<CacheItem>> {
        let resolver = Arc::clone(self);
        let load = |cid: Cid| async move { resolver.retrieve(cid).await }.boxed();
        self.cache.get(cid, load).await
    }

    /// Store a node
    ///
    pub(crate) async fn save<O>(self: &Arc<Resolver>, node: &O) -> Result<Cid>
    where
        O: Node,
    {
        let mut stream = self.mapper.store().await;
        stream.write_u16(MAGIC_NUMBER).await?;
        stream.write_u32(FORMAT_VERSION).await?;
        stream.write_byte(O::NODE_TYPE).await?;

        node.save_to(&mut stream).await?;

        Ok(stream.finish().await?)
    }

    /// Retrieve a node
    ///
    async fn retrieve(self: &Arc<Resolver>, cid: Cid) -> Result<CacheItem> {
        let mut stream = self.mapper.load(&cid).await?.ok_or(Error::NotFound(cid))?;
        let node_type = read_header(&mut stream).await?;
        debug!(%cid, node_type, "retrieved object");
        let item = match node_type {
            node::NODE_DATASET => {
                let mut dataset = Dataset::load_from(self, &mut stream).await?;
                dataset.cid = Some(cid);
                CacheItem::Dataset(Arc::new(dataset))
            }
            node::NODE_CHUNK => CacheItem::Chunk(Arc::new(Chunk::load_from(self, &mut stream).await?)),
            _ => {
                return Err(Error::Format(format!(
                    "unrecognized node type {node_type} for {cid}"
                )))
            }
        };

        Ok(item)
    }

    /// List the nodes referenced by the node at `cid`.
    ///
    pub async fn ls(self: &Arc<Resolver>, cid: &Cid) -> Result<Vec<LsEntry>> {
        let names = match &*self.check_cache(cid).await? {
            CacheItem::Dataset(dataset) => dataset.ls(),
            CacheItem::Chunk(chunk) => chunk.ls(),
        };

        let mut ls = Vec::with_capacity(names.len());
        for (name, cid) in names {
            let node_type = self.node_type_of(&cid).await?;
            let size = self.mapper.size_of(&cid).await?;
            ls.push(LsEntry {
                cid,
                name,
                node_type,
                size,
            });
        }

        Ok(ls)
    }

    async fn node_type_of(&self, cid: &Cid) -> Result<Option<&'static str>> {
        match self.mapper.load(cid).await? {
            None => Ok(None),
            Some(mut stream) => {
                let code = read_header(&mut stream).await?;
                Ok(node::node_type_name(code))
            }
        }
    }
}

async fn read_header(stream: &mut (impl AsyncRead + Unpin + Send)) -> Result<u8> {
    let magic_number = stream.read_u16().await?;
    if magic_number != MAGIC_NUMBER {
        return Err(Error::Format(String::from("not an ensemble dataset object")));
    }

    let version = stream.read_u32().await?;
    if version != FORMAT_VERSION {
        return Err(Error::Format(format!("unsupported format version {version}")));
    }

    Ok(stream.read_byte().await?)
}

pub struct LsEntry {
    pub cid: Cid,
    pub name: String,
    pub node_type: Option<&'static str>,
    pub size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::AsyncWriteExt;

    use crate::{store::MemoryMapper, testing};

    #[tokio::test]
    async fn test_missing_object() {
        let resolver = testing::resolver();
        let cid = crate::store::cid_for(b"nothing here").unwrap();
        assert!(matches!(
            resolver.get_dataset(&cid).await,
            Err(Error::NotFound(missing)) if missing == cid
        ));
    }

    #[tokio::test]
    async fn test_foreign_object() -> Result<()> {
        let resolver = Arc::new(Resolver::new(Box::new(MemoryMapper::new()), 1 << 20));
        let mut stream = resolver.mapper.store().await;
        stream.write_all(b"not a dataset at all").await?;
        let cid = stream.finish().await?;

        assert!(matches!(
            resolver.get_dataset(&cid).await,
            Err(Error::Format(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_node_type() -> Result<()> {
        let resolver = testing::resolver();
        let dataset = testing::dataset(&resolver).await?;
        let cid = dataset.cid.expect("fixture is committed");

        assert!(matches!(resolver.get_chunk(&cid).await, Err(Error::Format(_))));

        Ok(())
    }

    #[tokio::test]
    async fn test_ls() -> Result<()> {
        let resolver = testing::resolver();
        let dataset = testing::dataset(&resolver).await?;
        let ls = resolver.ls(&dataset.cid.expect("fixture is committed")).await?;

        let pcp = dataset.get_variable("pcp").expect("fixture has pcp");
        let pcp_chunks = ls.iter().filter(|entry| entry.name.starts_with("pcp/")).count();
        assert_eq!(pcp_chunks, pcp.chunks.len());
        for entry in &ls {
            assert_eq!(entry.node_type, Some("Chunk"));
            assert!(entry.size.unwrap_or(0) > 0);
        }

        Ok(())
    }
}
