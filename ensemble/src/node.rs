use std::sync::Arc;

use async_trait::async_trait;
use cid::Cid;
use futures::io::{AsyncRead, AsyncWrite};

use crate::errors::Result;

use super::resolver::Resolver;

pub(crate) const NODE_DATASET: u8 = 1;
pub(crate) const NODE_CHUNK: u8 = 2;

/// Human readable name for a node type code
pub(crate) fn node_type_name(code: u8) -> Option<&'static str> {
    match code {
        NODE_DATASET => Some("Dataset"),
        NODE_CHUNK => Some("Chunk"),
        _ => None,
    }
}

/// A node in the stored dataset graph.
///
#[async_trait]
pub(crate) trait Node: Sized {
    const NODE_TYPE: u8;

    /// Save an object into the store
    ///
    async fn save_to(&self, stream: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()>;

    /// Load an object from a stream
    async fn load_from(
        resolver: &Arc<Resolver>,
        stream: &mut (impl AsyncRead + Unpin + Send),
    ) -> Result<Self>;

    /// List other nodes referenced by this node
    fn ls(&self) -> Vec<(String, Cid)>;
}
