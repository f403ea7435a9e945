use indexmap::IndexMap;
use tokio::io::AsyncWriteExt;

use crate::{
    block::Block,
    io::ClickhouseWrite,
    protocol::{
        self, CompressionMethod, DBMS_MIN_PROTOCOL_VERSION_WITH_DISTRIBUTED_DEPTH,
        DBMS_MIN_PROTOCOL_VERSION_WITH_PARAMETERS, DBMS_MIN_PROTOCOL_VERSION_WITH_QUOTA_KEY,
        DBMS_MIN_REVISION_WITH_CLIENT_INFO, DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET,
        DBMS_MIN_REVISION_WITH_OPENTELEMETRY, DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO,
        DBMS_MIN_REVISION_WITH_SETTINGS_SERIALIZED_AS_STRINGS, DBMS_MIN_REVISION_WITH_VERSION_PATCH,
    },
    Result,
};

pub const CLIENT_NAME: &str = concat!("clickhouse-native-rust/", env!("CARGO_PKG_VERSION"));

pub const VERSION_MAJOR: u64 = 23;
pub const VERSION_MINOR: u64 = 8;
pub const VERSION_PATCH: u64 = 0;

// flag bits of a settings entry in the strings-with-flags format
const SETTING_FLAG_IMPORTANT: u64 = 0x01;
const SETTING_FLAG_CUSTOM: u64 = 0x02;

pub struct ClientHello<'a> {
    pub default_database: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

pub async fn write_hello<W: ClickhouseWrite>(writer: &mut W, params: ClientHello<'_>) -> Result<()> {
    writer
        .write_var_uint(protocol::ClientPacketId::Hello as u64)
        .await?;
    writer.write_string(CLIENT_NAME).await?;
    writer.write_var_uint(VERSION_MAJOR).await?;
    writer.write_var_uint(VERSION_MINOR).await?;
    writer
        .write_var_uint(protocol::DBMS_TCP_PROTOCOL_VERSION)
        .await?;
    writer.write_string(params.default_database).await?;
    writer.write_string(params.username).await?;
    writer.write_string(params.password).await?;
    Ok(())
}

/// Unnumbered trailer after the handshake, present from `WITH_ADDENDUM` on.
pub async fn write_addendum<W: ClickhouseWrite>(
    writer: &mut W,
    revision: u64,
    quota_key: &str,
) -> Result<()> {
    if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_QUOTA_KEY {
        writer.write_string(quota_key).await?;
    }
    Ok(())
}

#[repr(u8)]
#[derive(PartialEq, Clone, Copy)]
#[allow(unused, clippy::enum_variant_names)]
pub enum QueryKind {
    NoQuery,
    InitialQuery,
    SecondaryQuery,
}

pub struct ClientInfo<'a> {
    pub kind: QueryKind,
    pub initial_user: &'a str,
    pub initial_query_id: &'a str,
    pub initial_address: &'a str,
    // interface = TCP = 1
    pub os_user: &'a str,
    pub client_hostname: &'a str,
    pub client_name: &'a str,
    pub client_version_major: u64,
    pub client_version_minor: u64,
    pub client_tcp_protocol_version: u64,
    // if DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO
    pub quota_key: &'a str,
    // if DBMS_MIN_PROTOCOL_VERSION_WITH_DISTRIBUTED_DEPTH
    pub distributed_depth: u64,
    // if DBMS_MIN_REVISION_WITH_VERSION_PATCH
    pub client_version_patch: u64,
}

impl ClientInfo<'_> {
    pub async fn write<W: ClickhouseWrite>(&self, to: &mut W, revision: u64) -> Result<()> {
        to.write_u8(self.kind as u8).await?;
        if self.kind == QueryKind::NoQuery {
            return Ok(());
        }
        to.write_string(self.initial_user).await?;
        to.write_string(self.initial_query_id).await?;
        to.write_string(self.initial_address).await?;
        to.write_u8(1).await?;
        to.write_string(self.os_user).await?;
        to.write_string(self.client_hostname).await?;
        to.write_string(self.client_name).await?;
        to.write_var_uint(self.client_version_major).await?;
        to.write_var_uint(self.client_version_minor).await?;
        to.write_var_uint(self.client_tcp_protocol_version).await?;
        if revision >= DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO {
            to.write_string(self.quota_key).await?;
        }
        if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_DISTRIBUTED_DEPTH {
            to.write_var_uint(self.distributed_depth).await?;
        }
        if revision >= DBMS_MIN_REVISION_WITH_VERSION_PATCH {
            to.write_var_uint(self.client_version_patch).await?;
        }
        if revision >= DBMS_MIN_REVISION_WITH_OPENTELEMETRY {
            // no trace context attached
            to.write_u8(0).await?;
        }
        Ok(())
    }
}

#[repr(u64)]
#[derive(Clone, Copy, Debug)]
#[allow(unused)]
pub enum QueryProcessingStage {
    FetchColumns,
    WithMergeableState,
    Complete,
    WithMergableStateAfterAggregation,
}

pub struct Query<'a> {
    pub id: &'a str,
    pub info: ClientInfo<'a>,
    pub settings: &'a IndexMap<String, String>,
    pub stage: QueryProcessingStage,
    pub compression: CompressionMethod,
    pub query: &'a str,
    pub parameters: &'a IndexMap<String, String>,
}

async fn write_string_settings<W: ClickhouseWrite>(
    writer: &mut W,
    entries: &IndexMap<String, String>,
    flags: u64,
) -> Result<()> {
    for (name, value) in entries {
        writer.write_string(name).await?;
        writer.write_var_uint(flags).await?;
        writer.write_string(value).await?;
    }
    // terminated by an empty name
    writer.write_string("").await?;
    Ok(())
}

pub async fn write_query<W: ClickhouseWrite>(
    writer: &mut W,
    params: Query<'_>,
    revision: u64,
) -> Result<()> {
    writer
        .write_var_uint(protocol::ClientPacketId::Query as u64)
        .await?;
    writer.write_string(params.id).await?;
    if revision >= DBMS_MIN_REVISION_WITH_CLIENT_INFO {
        params.info.write(writer, revision).await?;
    }
    if revision >= DBMS_MIN_REVISION_WITH_SETTINGS_SERIALIZED_AS_STRINGS {
        write_string_settings(writer, params.settings, SETTING_FLAG_IMPORTANT).await?;
    } else {
        writer.write_string("").await?;
    }
    if revision >= DBMS_MIN_REVISION_WITH_INTERSERVER_SECRET {
        // not a replica peer, no inter-server secret
        writer.write_string("").await?;
    }
    writer.write_var_uint(params.stage as u64).await?;
    writer
        .write_u8(params.compression.is_enabled() as u8)
        .await?;
    writer.write_string(params.query).await?;
    if revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_PARAMETERS {
        write_string_settings(writer, params.parameters, SETTING_FLAG_CUSTOM).await?;
    }
    Ok(())
}

pub async fn write_data<W: ClickhouseWrite>(
    writer: &mut W,
    table_name: &str,
    block: &Block,
    compression: CompressionMethod,
    revision: u64,
) -> Result<()> {
    writer
        .write_var_uint(protocol::ClientPacketId::Data as u64)
        .await?;
    writer.write_string(table_name).await?;
    if compression.is_enabled() {
        #[cfg(feature = "compression")]
        {
            let mut raw = Vec::new();
            block.write(&mut raw, revision).await?;
            let frame = crate::compression::compress_frame(compression, &raw)?;
            writer.write_all(&frame).await?;
        }
        #[cfg(not(feature = "compression"))]
        {
            let _ = (block, revision);
            return Err(crate::ClickhouseError::SerializeError(
                "compression requested but the `compression` feature is disabled".to_string(),
            ));
        }
    } else {
        block.write(writer, revision).await?;
    }
    Ok(())
}

pub async fn write_cancel<W: ClickhouseWrite>(writer: &mut W) -> Result<()> {
    writer
        .write_var_uint(protocol::ClientPacketId::Cancel as u64)
        .await?;
    Ok(())
}

pub async fn write_ping<W: ClickhouseWrite>(writer: &mut W) -> Result<()> {
    writer
        .write_var_uint(protocol::ClientPacketId::Ping as u64)
        .await?;
    Ok(())
}
