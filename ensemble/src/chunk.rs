use std::sync::Arc;

use async_trait::async_trait;
use cid::Cid;
use futures::io::{AsyncRead, AsyncWrite};
use ndarray::{ArrayViewD, IxDyn};

use crate::{
    cache::Cacheable,
    errors::{Error, Result},
    extio::{ExtendedAsyncRead, ExtendedAsyncWrite},
    helpers::narrow,
    node::{Node, NODE_CHUNK},
    resolver::Resolver,
};

/// One block of a chunked variable.
///
/// Values are stored as big endian `f32` in row major order. NaN marks a missing value.
///
pub(crate) struct Chunk {
    shape: Vec<usize>,
    values: Vec<f32>,
}

impl Chunk {
    pub(crate) fn new(array: ArrayViewD<'_, f32>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            values: array.iter().copied().collect(),
        }
    }

    pub(crate) fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub(crate) fn view(&self) -> Result<ArrayViewD<'_, f32>> {
        ArrayViewD::from_shape(IxDyn(&self.shape), &self.values)
            .map_err(|err| Error::Format(format!("chunk values don't match shape: {err}")))
    }

    #[cfg(test)]
    pub(crate) fn to_array(&self) -> Result<ndarray::ArrayD<f32>> {
        Ok(self.view()?.to_owned())
    }
}

#[async_trait]
impl Node for Chunk {
    const NODE_TYPE: u8 = NODE_CHUNK;

    async fn save_to(&self, stream: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        stream.write_byte(narrow(self.shape.len(), "chunk dimensions")?).await?;
        for &len in &self.shape {
            stream.write_u32(narrow(len, "chunk length")?).await?;
        }
        stream.write_f32s(&self.values).await?;

        Ok(())
    }

    async fn load_from(
        _resolver: &Arc<Resolver>,
        stream: &mut (impl AsyncRead + Unpin + Send),
    ) -> Result<Self> {
        let ndim = stream.read_byte().await? as usize;
        let mut shape = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            shape.push(stream.read_u32().await? as usize);
        }
        let count = shape
            .iter()
            .try_fold(1_usize, |count, &len| count.checked_mul(len))
            .ok_or_else(|| Error::Format(format!("chunk shape {shape:?} is too large")))?;
        let values = stream.read_f32s(count).await?;

        Ok(Self { shape, values })
    }

    fn ls(&self) -> Vec<(String, Cid)> {
        vec![]
    }
}

impl Cacheable for Chunk {
    fn size(&self) -> u64 {
        Resolver::HEADER_SIZE + 1 + 4 * self.shape.len() as u64 + 4 * self.values.len() as u64
    }
}
