//! Big endian binary i/o on top of `futures::io` streams
//!
use std::io;

use async_trait::async_trait;
use cid::Cid;
use futures::{io as aio, AsyncReadExt, AsyncWriteExt};
use unsigned_varint::{
    aio::read_u64 as varint_read_u64,
    encode::{u64 as varint_encode_u64, u64_buffer as varint_u64_buffer},
};

use crate::errors::Result;

#[async_trait]
pub(crate) trait ExtendedAsyncRead: aio::AsyncRead + Unpin + Send {
    async fn read_byte(&mut self) -> io::Result<u8> {
        let mut buffer = [0; 1];
        self.read_exact(&mut buffer).await?;

        Ok(buffer[0])
    }

    async fn read_u16(&mut self) -> io::Result<u16> {
        let mut buffer = [0; 2];
        self.read_exact(&mut buffer).await?;

        Ok(u16::from_be_bytes(buffer))
    }

    async fn read_u32(&mut self) -> io::Result<u32> {
        let mut buffer = [0; 4];
        self.read_exact(&mut buffer).await?;

        Ok(u32::from_be_bytes(buffer))
    }

    async fn read_i64(&mut self) -> io::Result<i64> {
        let mut buffer = [0; 8];
        self.read_exact(&mut buffer).await?;

        Ok(i64::from_be_bytes(buffer))
    }

    async fn read_f64(&mut self) -> io::Result<f64> {
        let mut buffer = [0; 8];
        self.read_exact(&mut buffer).await?;

        Ok(f64::from_be_bytes(buffer))
    }

    /// Read `count` consecutive 32 bit floats. The buffer only grows as far as the stream
    /// actually reaches, so a bogus count fails as a short read.
    async fn read_f32s(&mut self, count: usize) -> io::Result<Vec<f32>> {
        let len = count
            .checked_mul(4)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "too many values"))?;
        let mut buffer = Vec::new();
        let mut limited = (&mut *self).take(len as u64);
        limited.read_to_end(&mut buffer).await?;
        if buffer.len() != len {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        Ok(buffer
            .chunks_exact(4)
            .map(|word| f32::from_be_bytes([word[0], word[1], word[2], word[3]]))
            .collect())
    }

    /// Read a length prefixed UTF-8 string
    async fn read_string(&mut self) -> io::Result<String> {
        let len = self.read_u32().await? as usize;
        let mut buffer = vec![0; len];
        self.read_exact(&mut buffer).await?;

        String::from_utf8(buffer).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    async fn read_cid(&mut self) -> Result<Cid> {
        let mut bytes = vec![];
        let version = varint_read_u64(&mut *self).await?;
        let codec = varint_read_u64(&mut *self).await?;

        // CIDv0 has the fixed `0x12 0x20` prefix
        if [version, codec] == [0x12, 0x20] {
            bytes.push(version as u8);
            bytes.push(codec as u8);
            (&mut *self).take(32).read_to_end(&mut bytes).await?;
        } else {
            let code = varint_read_u64(&mut *self).await?;
            let size = varint_read_u64(&mut *self).await?;
            for word in [version, codec, code, size] {
                let mut varint_buf = varint_u64_buffer();
                bytes.extend_from_slice(varint_encode_u64(word, &mut varint_buf));
            }
            (&mut *self).take(size).read_to_end(&mut bytes).await?;
        }

        Ok(Cid::try_from(bytes)?)
    }
}

impl<R: aio::AsyncRead + Unpin + Send> ExtendedAsyncRead for R {}

#[async_trait]
pub(crate) trait ExtendedAsyncWrite: aio::AsyncWrite + Unpin + Send {
    async fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.write_all(&[byte]).await
    }

    async fn write_u16(&mut self, word: u16) -> io::Result<()> {
        self.write_all(&word.to_be_bytes()).await
    }

    async fn write_u32(&mut self, word: u32) -> io::Result<()> {
        self.write_all(&word.to_be_bytes()).await
    }

    async fn write_i64(&mut self, word: i64) -> io::Result<()> {
        self.write_all(&word.to_be_bytes()).await
    }

    async fn write_f64(&mut self, word: f64) -> io::Result<()> {
        self.write_all(&word.to_be_bytes()).await
    }

    async fn write_f32s(&mut self, words: &[f32]) -> io::Result<()> {
        let buffer: Vec<u8> = words.iter().flat_map(|word| word.to_be_bytes()).collect();
        self.write_all(&buffer).await
    }

    async fn write_string(&mut self, string: &str) -> io::Result<()> {
        self.write_u32(string.len() as u32).await?;
        self.write_all(string.as_bytes()).await
    }

    async fn write_cid(&mut self, cid: &Cid) -> Result<()> {
        self.write_all(&cid.to_bytes()).await?;

        Ok(())
    }
}

impl<W: aio::AsyncWrite + Unpin + Send> ExtendedAsyncWrite for W {}
