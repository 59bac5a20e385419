//! Concrete `Mapper` implementations for objects held in RAM or in a local directory.
//!
//! Remote stores live in their own crates and can reuse `BufferedWrite` by implementing
//! `ObjectSink`.
//!
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};

use async_trait::async_trait;
use cid::{multihash::MultihashGeneric, Cid};
use futures::io::{AsyncRead, AsyncWrite, Cursor};
use multihash::{Hasher, Sha2_256};
use parking_lot::Mutex;
use tracing::debug;

use crate::mapper::{Mapper, StoreWrite};

/// The SHA2-256 multihash code
const SHA2_256: u64 = 0x12;

/// The raw binary multicodec code
const RAW: u64 = 0x55;

/// Compute the content identifier for a serialized object.
///
pub fn cid_for(object: &[u8]) -> io::Result<Cid> {
    let mut hash = Sha2_256::default();
    hash.update(object);
    let digest = hash.finalize();
    let hash = MultihashGeneric::wrap(SHA2_256, digest)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;

    Ok(Cid::new_v1(RAW, hash))
}

/// Somewhere finished objects can be put once their CID is known.
///
#[async_trait]
pub trait ObjectSink: Send + Sync {
    async fn put(&self, cid: &Cid, object: Vec<u8>) -> io::Result<()>;
}

/// A `StoreWrite` that accumulates an object in RAM and hands it to an `ObjectSink` when
/// finished.
///
pub struct BufferedWrite<'a, S>
where
    S: ObjectSink + ?Sized,
{
    sink: &'a S,
    buffer: Vec<u8>,
    hash_only: bool,
}

impl<'a, S> BufferedWrite<'a, S>
where
    S: ObjectSink + ?Sized,
{
    pub fn new(sink: &'a S, hash_only: bool) -> Self {
        Self {
            sink,
            buffer: Vec::new(),
            hash_only,
        }
    }
}

impl<'a, S> AsyncWrite for BufferedWrite<'a, S>
where
    S: ObjectSink + ?Sized,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.buffer.extend_from_slice(buf);

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl<'a, S> StoreWrite for BufferedWrite<'a, S>
where
    S: ObjectSink + ?Sized,
{
    async fn finish(self: Box<Self>) -> io::Result<Cid> {
        let this = *self;
        let cid = cid_for(&this.buffer)?;
        if !this.hash_only {
            this.sink.put(&cid, this.buffer).await?;
        }

        Ok(cid)
    }
}

/// A `Mapper` that keeps every object in RAM. Useful for tests and for scratch datasets.
///
#[derive(Default)]
pub struct MemoryMapper {
    objects: Mutex<HashMap<Cid, Vec<u8>>>,
}

impl MemoryMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait]
impl ObjectSink for MemoryMapper {
    async fn put(&self, cid: &Cid, object: Vec<u8>) -> io::Result<()> {
        self.objects.lock().insert(*cid, object);

        Ok(())
    }
}

#[async_trait]
impl Mapper for MemoryMapper {
    async fn store(&self) -> Box<dyn StoreWrite + '_> {
        Box::new(BufferedWrite::new(self, false))
    }

    async fn hash(&self) -> Box<dyn StoreWrite + '_> {
        Box::new(BufferedWrite::new(self, true))
    }

    async fn load(&self, cid: &Cid) -> io::Result<Option<Box<dyn AsyncRead + Unpin + Send + '_>>> {
        let objects = self.objects.lock();
        match objects.get(cid) {
            Some(object) => Ok(Some(Box::new(Cursor::new(object.clone())))),
            None => Ok(None),
        }
    }

    async fn size_of(&self, cid: &Cid) -> io::Result<Option<u64>> {
        Ok(self.objects.lock().get(cid).map(|object| object.len() as u64))
    }
}

/// A `Mapper` that stores each object as a file, named by its CID, in a single directory.
///
pub struct FileMapper {
    root: PathBuf,
}

impl FileMapper {
    /// Open a directory store, creating the directory if needed.
    ///
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, cid: &Cid) -> PathBuf {
        self.root.join(cid.to_string())
    }
}

#[async_trait]
impl ObjectSink for FileMapper {
    async fn put(&self, cid: &Cid, object: Vec<u8>) -> io::Result<()> {
        let path = self.path_for(cid);
        if tokio::fs::try_exists(&path).await? {
            return Ok(());
        }

        // Write to a scratch name first so readers never see a partial object
        let partial = path.with_extension("partial");
        tokio::fs::write(&partial, object).await?;
        tokio::fs::rename(&partial, &path).await?;
        debug!(%cid, path = %path.display(), "stored object");

        Ok(())
    }
}

#[async_trait]
impl Mapper for FileMapper {
    async fn store(&self) -> Box<dyn StoreWrite + '_> {
        Box::new(BufferedWrite::new(self, false))
    }

    async fn hash(&self) -> Box<dyn StoreWrite + '_> {
        Box::new(BufferedWrite::new(self, true))
    }

    async fn load(&self, cid: &Cid) -> io::Result<Option<Box<dyn AsyncRead + Unpin + Send + '_>>> {
        match tokio::fs::read(self.path_for(cid)).await {
            Ok(object) => Ok(Some(Box::new(Cursor::new(object)))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn size_of(&self, cid: &Cid) -> io::Result<Option<u64>> {
        match tokio::fs::metadata(self.path_for(cid)).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::{AsyncReadExt, AsyncWriteExt};

    async fn round_trip(mapper: &dyn Mapper) -> io::Result<()> {
        let mut stream = mapper.store().await;
        stream.write_all(b"daily precipitation").await?;
        let cid = stream.finish().await?;
        assert_eq!(cid, cid_for(b"daily precipitation")?);

        let mut object = Vec::new();
        mapper
            .load(&cid)
            .await?
            .expect("object should be stored")
            .read_to_end(&mut object)
            .await?;
        assert_eq!(object, b"daily precipitation");
        assert_eq!(mapper.size_of(&cid).await?, Some(19));

        let mut stream = mapper.hash().await;
        stream.write_all(b"never stored").await?;
        let cid = stream.finish().await?;
        assert!(mapper.load(&cid).await?.is_none());
        assert_eq!(mapper.size_of(&cid).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_memory_mapper() -> io::Result<()> {
        let mapper = MemoryMapper::new();
        round_trip(&mapper).await?;
        assert_eq!(mapper.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_file_mapper() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let mapper = FileMapper::new(dir.path().join("objects"))?;
        round_trip(&mapper).await?;
        assert_eq!(std::fs::read_dir(mapper.root())?.count(), 1);

        Ok(())
    }

    #[test]
    fn test_cid_is_content_derived() -> io::Result<()> {
        assert_eq!(cid_for(b"t_mean")?, cid_for(b"t_mean")?);
        assert_ne!(cid_for(b"t_mean")?, cid_for(b"pcp")?);

        Ok(())
    }
}
