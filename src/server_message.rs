use std::str::FromStr;

use indexmap::IndexMap;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::{
    buffer::{ScanCursor, ScanError, ScanResult},
    errors::ServerError,
    io::ClickhouseRead,
    progress::Progress,
    protocol::{
        BlockStreamProfileInfo, ServerHello, ServerPacket, ServerPacketId, TableColumns,
        TableStatus, TablesStatusResponse, DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS,
        DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO, DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION,
        DBMS_MIN_REVISION_WITH_SERVER_DISPLAY_NAME,
        DBMS_MIN_REVISION_WITH_SERVER_QUERY_TIME_IN_PROGRESS,
        DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE, DBMS_MIN_REVISION_WITH_VERSION_PATCH,
        MAX_STRING_SIZE,
    },
    types::Type,
    ClickhouseError, Result,
};

/// Result of the scan pass over a buffered server packet.
#[derive(Debug, Clone, Copy)]
pub enum PacketHead {
    /// The entire packet is buffered; `len` bytes cover it.
    Plain { len: usize },
    /// A block-carrying packet. `header_len` covers the packet id and table
    /// name; the block body follows, possibly compressed, and is checked for
    /// completeness separately.
    Block {
        id: ServerPacketId,
        header_len: usize,
    },
}

/// Walk one server packet without consuming, to decide whether it can be
/// parsed. Every non-block packet is walked to its end; block packets are
/// walked through their name header only.
pub fn scan_packet_head(cursor: &mut ScanCursor, revision: u64) -> ScanResult<PacketHead> {
    let id = ServerPacketId::from_u64(cursor.read_var_uint()?).map_err(ScanError::Corrupt)?;
    match id {
        ServerPacketId::Data
        | ServerPacketId::Totals
        | ServerPacketId::Extremes
        | ServerPacketId::Log
        | ServerPacketId::ProfileEvents => {
            cursor.try_skip_string()?;
            Ok(PacketHead::Block {
                id,
                header_len: cursor.consumed(),
            })
        }
        ServerPacketId::Hello => {
            cursor.try_skip_string()?;
            cursor.read_var_uint()?;
            cursor.read_var_uint()?;
            let server_revision = cursor.read_var_uint()?;
            if server_revision >= DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE {
                cursor.try_skip_string()?;
            }
            if server_revision >= DBMS_MIN_REVISION_WITH_SERVER_DISPLAY_NAME {
                cursor.try_skip_string()?;
            }
            if server_revision >= DBMS_MIN_REVISION_WITH_VERSION_PATCH {
                cursor.read_var_uint()?;
            }
            Ok(PacketHead::Plain {
                len: cursor.consumed(),
            })
        }
        ServerPacketId::Exception => {
            loop {
                cursor.skip(4)?;
                cursor.try_skip_string()?;
                cursor.try_skip_string()?;
                cursor.try_skip_string()?;
                if cursor.read_u8()? == 0 {
                    break;
                }
            }
            Ok(PacketHead::Plain {
                len: cursor.consumed(),
            })
        }
        ServerPacketId::Progress => {
            cursor.read_var_uint()?;
            cursor.read_var_uint()?;
            cursor.read_var_uint()?;
            if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS {
                cursor.read_var_uint()?;
            }
            if revision >= DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO {
                cursor.read_var_uint()?;
                cursor.read_var_uint()?;
            }
            if revision >= DBMS_MIN_REVISION_WITH_SERVER_QUERY_TIME_IN_PROGRESS {
                cursor.read_var_uint()?;
            }
            Ok(PacketHead::Plain {
                len: cursor.consumed(),
            })
        }
        ServerPacketId::Pong | ServerPacketId::EndOfStream | ServerPacketId::ReadTaskRequest => {
            Ok(PacketHead::Plain {
                len: cursor.consumed(),
            })
        }
        ServerPacketId::ProfileInfo => {
            cursor.read_var_uint()?;
            cursor.read_var_uint()?;
            cursor.read_var_uint()?;
            cursor.skip(1)?;
            cursor.read_var_uint()?;
            cursor.skip(1)?;
            Ok(PacketHead::Plain {
                len: cursor.consumed(),
            })
        }
        ServerPacketId::TablesStatusResponse => {
            let size = cursor.read_var_uint()?;
            if size as usize > MAX_STRING_SIZE {
                return Err(ScanError::corrupt(format!(
                    "table status response size too large: {size}"
                )));
            }
            for _ in 0..size {
                cursor.try_skip_string()?;
                cursor.try_skip_string()?;
                if cursor.read_u8()? != 0 {
                    cursor.read_var_uint()?;
                }
            }
            Ok(PacketHead::Plain {
                len: cursor.consumed(),
            })
        }
        ServerPacketId::TableColumns => {
            cursor.try_skip_string()?;
            cursor.try_skip_string()?;
            Ok(PacketHead::Plain {
                len: cursor.consumed(),
            })
        }
        ServerPacketId::PartUUIDs => {
            let len = cursor.read_var_uint()?;
            if len as usize > MAX_STRING_SIZE {
                return Err(ScanError::corrupt(format!(
                    "PartUUIDs response size too large: {len}"
                )));
            }
            cursor.skip(len as usize * 16)?;
            Ok(PacketHead::Plain {
                len: cursor.consumed(),
            })
        }
    }
}

/// Walk one uncompressed block without consuming. Column types are parsed
/// from their type strings and dispatched to the per-type skippers, so the
/// walk is linear in wire size and allocation-free apart from the type AST.
pub fn scan_block(cursor: &mut ScanCursor, revision: u64) -> ScanResult<()> {
    if revision > 0 {
        loop {
            match cursor.read_var_uint()? {
                0 => break,
                1 => cursor.skip(1)?,
                2 => cursor.skip(4)?,
                field_num => {
                    return Err(ScanError::corrupt(format!(
                        "unknown block info field number: {field_num}"
                    )))
                }
            }
        }
    }
    let columns = cursor.read_var_uint()?;
    let rows = cursor.read_var_uint()?;
    if columns as usize > MAX_STRING_SIZE || rows as usize > MAX_STRING_SIZE {
        return Err(ScanError::corrupt(format!(
            "block header out of bounds: {columns} columns, {rows} rows"
        )));
    }
    for _ in 0..columns {
        cursor.try_skip_string()?;
        let type_name = cursor.read_utf8()?;
        let type_ = Type::from_str(&type_name).map_err(ScanError::Corrupt)?;
        if revision >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION && cursor.read_u8()? != 0 {
            return Err(ScanError::corrupt(
                "custom serialization of columns is not supported",
            ));
        }
        if rows > 0 {
            type_.skip_prefix(cursor)?;
            type_.skip_column(cursor, rows as usize)?;
        }
    }
    Ok(())
}

async fn read_exception<R: ClickhouseRead>(reader: &mut R) -> Result<ServerError> {
    let code = reader.read_i32_le().await?;
    let name = reader.read_utf8_string().await?;
    let message = reader.read_utf8_string().await?;
    let stack_trace = reader.read_utf8_string().await?;
    let nested = if reader.read_u8().await? != 0 {
        Some(Box::new(Box::pin(read_exception(reader)).await?))
    } else {
        None
    };
    Ok(ServerError {
        code,
        name,
        message,
        stack_trace,
        nested,
    })
}

/// Decode a fully buffered non-block packet. The scan pass has already
/// proven every byte present, so reads here cannot come up short.
pub async fn decode_plain(mut bytes: &[u8], revision: u64) -> Result<ServerPacket> {
    let reader = &mut bytes;
    let id = ServerPacketId::from_u64(reader.read_var_uint().await?)?;
    let packet = match id {
        ServerPacketId::Hello => {
            let server_name = reader.read_utf8_string().await?;
            let major_version = reader.read_var_uint().await?;
            let minor_version = reader.read_var_uint().await?;
            let revision_version = reader.read_var_uint().await?;
            let timezone = if revision_version >= DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE {
                Some(reader.read_utf8_string().await?)
            } else {
                None
            };
            let display_name = if revision_version >= DBMS_MIN_REVISION_WITH_SERVER_DISPLAY_NAME {
                Some(reader.read_utf8_string().await?)
            } else {
                None
            };
            let patch_version = if revision_version >= DBMS_MIN_REVISION_WITH_VERSION_PATCH {
                reader.read_var_uint().await?
            } else {
                revision_version
            };
            ServerPacket::Hello(ServerHello {
                server_name,
                major_version,
                minor_version,
                revision_version,
                timezone,
                display_name,
                patch_version,
            })
        }
        ServerPacketId::Exception => ServerPacket::Exception(read_exception(reader).await?),
        ServerPacketId::Progress => {
            let read_rows = reader.read_var_uint().await?;
            let read_bytes = reader.read_var_uint().await?;
            let total_rows_to_read = reader.read_var_uint().await?;
            let total_bytes_to_read =
                if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_TOTAL_BYTES_IN_PROGRESS {
                    Some(reader.read_var_uint().await?)
                } else {
                    None
                };
            let (written_rows, written_bytes) =
                if revision >= DBMS_MIN_REVISION_WITH_CLIENT_WRITE_INFO {
                    (
                        Some(reader.read_var_uint().await?),
                        Some(reader.read_var_uint().await?),
                    )
                } else {
                    (None, None)
                };
            let elapsed_ns = if revision >= DBMS_MIN_REVISION_WITH_SERVER_QUERY_TIME_IN_PROGRESS {
                Some(reader.read_var_uint().await?)
            } else {
                None
            };
            ServerPacket::Progress(Progress {
                read_rows,
                read_bytes,
                total_rows_to_read,
                total_bytes_to_read,
                written_rows,
                written_bytes,
                elapsed_ns,
            })
        }
        ServerPacketId::Pong => ServerPacket::Pong,
        ServerPacketId::EndOfStream => ServerPacket::EndOfStream,
        ServerPacketId::ProfileInfo => {
            let rows = reader.read_var_uint().await?;
            let blocks = reader.read_var_uint().await?;
            let bytes = reader.read_var_uint().await?;
            let applied_limit = reader.read_u8().await? != 0;
            let rows_before_limit = reader.read_var_uint().await?;
            let calculated_rows_before_limit = reader.read_u8().await? != 0;
            ServerPacket::ProfileInfo(BlockStreamProfileInfo {
                rows,
                blocks,
                bytes,
                applied_limit,
                rows_before_limit,
                calculated_rows_before_limit,
            })
        }
        ServerPacketId::TablesStatusResponse => {
            let mut response = TablesStatusResponse {
                database_tables: IndexMap::new(),
            };
            let size = reader.read_var_uint().await?;
            for _ in 0..size {
                let database_name = reader.read_utf8_string().await?;
                let table_name = reader.read_utf8_string().await?;
                let is_replicated = reader.read_u8().await? != 0;
                let absolute_delay = if is_replicated {
                    reader.read_var_uint().await? as u32
                } else {
                    0
                };
                response
                    .database_tables
                    .entry(database_name)
                    .or_default()
                    .insert(
                        table_name,
                        TableStatus {
                            is_replicated,
                            absolute_delay,
                        },
                    );
            }
            ServerPacket::TablesStatusResponse(response)
        }
        ServerPacketId::TableColumns => {
            let name = reader.read_utf8_string().await?;
            let description = reader.read_utf8_string().await?;
            ServerPacket::TableColumns(TableColumns { name, description })
        }
        ServerPacketId::PartUUIDs => {
            let len = reader.read_var_uint().await?;
            let mut out = Vec::with_capacity(len as usize);
            let mut bytes = [0u8; 16];
            for _ in 0..len {
                reader.read_exact(&mut bytes[..]).await?;
                out.push(Uuid::from_bytes(bytes));
            }
            ServerPacket::PartUUIDs(out)
        }
        ServerPacketId::ReadTaskRequest => ServerPacket::ReadTaskRequest,
        ServerPacketId::Data
        | ServerPacketId::Totals
        | ServerPacketId::Extremes
        | ServerPacketId::Log
        | ServerPacketId::ProfileEvents => {
            return Err(ClickhouseError::ProtocolError(
                "block packets are not decoded by the plain path".to_string(),
            ))
        }
    };
    Ok(packet)
}

/// Decode a block packet header (packet id + table name) out of its scanned
/// bytes.
pub async fn decode_block_header(mut bytes: &[u8]) -> Result<String> {
    let reader = &mut bytes;
    let _id = reader.read_var_uint().await?;
    reader.read_utf8_string().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ScanCursor;
    use crate::io::ClickhouseWrite;

    async fn exception_bytes(nested: bool) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        out.write_var_uint(ServerPacketId::Exception as u64)
            .await
            .unwrap();
        for depth in 0..=nested as usize {
            tokio::io::AsyncWriteExt::write_i32_le(&mut out, 60 + depth as i32)
                .await
                .unwrap();
            out.write_string("DB::Exception").await.unwrap();
            out.write_string("table missing").await.unwrap();
            out.write_string("stack").await.unwrap();
            tokio::io::AsyncWriteExt::write_u8(&mut out, (depth == 0 && nested) as u8)
                .await
                .unwrap();
        }
        out
    }

    #[tokio::test]
    async fn scan_and_decode_exception() {
        for nested in [false, true] {
            let bytes = exception_bytes(nested).await;
            let mut cursor = ScanCursor::over_slice(&bytes);
            match scan_packet_head(&mut cursor, 54465).unwrap() {
                PacketHead::Plain { len } => assert_eq!(len, bytes.len()),
                head => panic!("unexpected head: {head:?}"),
            }
            match decode_plain(&bytes, 54465).await.unwrap() {
                ServerPacket::Exception(e) => {
                    assert_eq!(e.code, 60);
                    assert_eq!(e.nested.is_some(), nested);
                }
                packet => panic!("unexpected packet: {packet:?}"),
            }
        }
    }

    #[tokio::test]
    async fn truncated_exception_is_incomplete() {
        let bytes = exception_bytes(false).await;
        for cut in 1..bytes.len() {
            let mut cursor = ScanCursor::over_slice(&bytes[..cut]);
            assert!(matches!(
                scan_packet_head(&mut cursor, 54465),
                Err(ScanError::Incomplete)
            ));
        }
    }

    #[tokio::test]
    async fn unknown_packet_id_is_corrupt() {
        let bytes = [200u8, 1];
        let mut cursor = ScanCursor::over_slice(&bytes);
        assert!(matches!(
            scan_packet_head(&mut cursor, 54465),
            Err(ScanError::Corrupt(_))
        ));
    }
}
