use std::io::Write;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::Result;

/// Outbound frame dump target for `CH_WIRE_DUMP=1`, relative to the working
/// directory.
const WIRE_DUMP_PATH: &str = "clickhouse-native.wiredump";

fn wire_dump_file() -> Option<std::fs::File> {
    if std::env::var("CH_WIRE_DUMP").as_deref() != Ok("1") {
        return None;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(WIRE_DUMP_PATH)
        .ok()
}

/// Buffers one outbound client message into contiguous scratch, then flushes
/// it to the socket as a single write.
pub struct WireWriter<W> {
    inner: W,
    scratch: Vec<u8>,
    dump: Option<std::fs::File>,
}

impl<W: AsyncWrite + Unpin + Send + Sync> WireWriter<W> {
    pub fn new(inner: W) -> Self {
        WireWriter {
            inner,
            scratch: Vec::new(),
            dump: wire_dump_file(),
        }
    }

    /// Scratch buffer messages serialize into before `flush`.
    pub fn buffer(&mut self) -> &mut Vec<u8> {
        &mut self.scratch
    }

    pub async fn flush(&mut self) -> Result<()> {
        if let Some(dump) = &mut self.dump {
            // best-effort debug aid, never affects the session
            let mut hex = String::with_capacity(self.scratch.len() * 2);
            for byte in &self.scratch {
                hex.push_str(&format!("{byte:02x}"));
            }
            let _ = writeln!(dump, "len={}\n{}", self.scratch.len(), hex);
        }
        self.inner.write_all(&self.scratch).await?;
        self.inner.flush().await?;
        self.scratch.clear();
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
