use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{protocol::MAX_STRING_SIZE, ClickhouseError, Result};

/// Async side of the wire codec. Blanket-implemented for any `AsyncRead`, so
/// block and message decoders run equally over a socket, a decompressed
/// scratch buffer, or a test cursor.
pub trait ClickhouseRead: AsyncRead + Unpin + Send + Sync {
    fn read_var_uint(&mut self) -> impl std::future::Future<Output = Result<u64>> + Send;

    fn read_string(&mut self) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;

    fn read_utf8_string(&mut self) -> impl std::future::Future<Output = Result<String>> + Send;
}

impl<T: AsyncRead + Unpin + Send + Sync> ClickhouseRead for T {
    async fn read_var_uint(&mut self) -> Result<u64> {
        let mut out = 0u64;
        for i in 0..10u64 {
            let octet = self.read_u8().await?;
            out |= ((octet & 0x7F) as u64) << (7 * i);
            if (octet & 0x80) == 0 {
                break;
            }
        }
        Ok(out)
    }

    async fn read_string(&mut self) -> Result<Vec<u8>> {
        let len = self.read_var_uint().await?;
        if len as usize > MAX_STRING_SIZE {
            return Err(ClickhouseError::ProtocolError(format!(
                "string too large: {} > {}",
                len, MAX_STRING_SIZE
            )));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_exact(&mut buf[..]).await?;
        Ok(buf)
    }

    async fn read_utf8_string(&mut self) -> Result<String> {
        String::from_utf8(self.read_string().await?)
            .map_err(|e| ClickhouseError::ProtocolError(format!("invalid utf-8 string: {e}")))
    }
}

pub trait ClickhouseWrite: AsyncWrite + Unpin + Send + Sync {
    fn write_var_uint(&mut self, value: u64) -> impl std::future::Future<Output = Result<()>> + Send;

    fn write_string(
        &mut self,
        value: impl AsRef<[u8]> + Send,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

impl<T: AsyncWrite + Unpin + Send + Sync> ClickhouseWrite for T {
    async fn write_var_uint(&mut self, mut value: u64) -> Result<()> {
        for _ in 0..10u64 {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.write_u8(byte).await?;
            if value == 0 {
                break;
            }
        }
        Ok(())
    }

    async fn write_string(&mut self, value: impl AsRef<[u8]> + Send) -> Result<()> {
        let value = value.as_ref();
        self.write_var_uint(value.len() as u64).await?;
        self.write_all(value).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn var_uint_roundtrip() {
        for value in [0u64, 1, 127, 128, 300, 0xFFFF, 1 << 35, u64::MAX] {
            let mut buf = Vec::new();
            buf.write_var_uint(value).await.unwrap();
            let mut cursor = &buf[..];
            assert_eq!(cursor.read_var_uint().await.unwrap(), value);
            assert!(cursor.is_empty());
        }
    }

    #[tokio::test]
    async fn string_roundtrip() {
        for value in ["", "a", "hello world", "日本語"] {
            let mut buf = Vec::new();
            buf.write_string(value).await.unwrap();
            let mut cursor = &buf[..];
            assert_eq!(cursor.read_utf8_string().await.unwrap(), value);
        }
    }
}
