//! Async session engine for the ClickHouse native TCP protocol.
//!
//! A [`Session`] owns one connection: it performs the handshake and revision
//! negotiation, streams typed columnar [`Block`]s out of queries, pushes
//! blocks into tables with optional LZ4/Zstd compression, and survives
//! server exceptions and mid-query cancellation without giving up the
//! connection.
//!
//! ```no_run
//! use clickhouse_native::{ConnectionOptions, TcpSession};
//!
//! # async fn example() -> clickhouse_native::Result<()> {
//! let mut session = TcpSession::connect("localhost:9000", ConnectionOptions::default()).await?;
//! let count: u64 = session.query_scalar("SELECT count() FROM system.tables").await?;
//! # Ok(())
//! # }
//! ```

mod block;
mod buffer;
mod client_message;
mod compression;
pub mod errors;
mod insert;
pub mod io;
mod pool;
mod progress;
pub mod protocol;
mod server_message;
mod session;
#[cfg(feature = "tls")]
pub mod tls;
mod types;
mod values;
mod wire;

pub use block::{Block, BlockInfo};
pub use errors::{ClickhouseError, Result, ServerError};
pub use insert::{rows_to_block, ColumnExtractor};
pub use progress::Progress;
pub use protocol::{
    BlockStreamProfileInfo, CompressionMethod, ServerHello, DBMS_TCP_PROTOCOL_VERSION,
};
pub use session::{
    CancelHandle, ConnectionOptions, Insert, QueryEvent, QueryStream, Session, SessionState,
    TcpSession, DEFAULT_PORT, DEFAULT_TLS_PORT,
};
pub use types::Type;
pub use uuid::Uuid;
pub use values::*;
