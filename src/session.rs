use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, error, trace, warn};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpSocket, TcpStream, ToSocketAddrs};
use tokio::select;
use tokio::sync::Notify;
use tokio::time::{timeout, timeout_at, Instant};
use uuid::Uuid;

use crate::block::Block;
use crate::buffer::{RecvBuffer, ScanCursor, ScanError};
use crate::client_message::{
    self, ClientHello, ClientInfo, Query, QueryKind, QueryProcessingStage, CLIENT_NAME,
    VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH,
};
use crate::insert::{rows_to_block, ColumnExtractor};
use crate::io::{ClickhouseRead, ClickhouseWrite};
use crate::pool::BufferPool;
use crate::progress::Progress;
use crate::protocol::{
    CompressionMethod, ServerData, ServerHello, ServerPacket, ServerPacketId,
    DBMS_MIN_PROTOCOL_VERSION_WITH_ADDENDUM, DBMS_TCP_PROTOCOL_VERSION,
};
use crate::server_message::{
    decode_block_header, decode_plain, scan_block, scan_packet_head, PacketHead,
};
use crate::types::Type;
use crate::values::FromValue;
use crate::wire::WireWriter;
use crate::{ClickhouseError, Result, Value};

pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_TLS_PORT: u16 = 9440;

/// Hard bound on the post-cancellation read loop. Exceeding it leaves the
/// connection unambiguously dead rather than half-drained.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection-level options. No connection-string parsing here; build this
/// directly or from your own configuration layer.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub username: String,
    pub password: String,
    pub default_database: String,
    pub quota_key: String,
    pub compression: CompressionMethod,
    pub connect_timeout: Duration,
    pub tcp_nodelay: bool,
    pub recv_buffer_size: Option<u32>,
    pub send_buffer_size: Option<u32>,
    /// Server settings sent with every query.
    pub settings: IndexMap<String, String>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            username: "default".to_string(),
            password: String::new(),
            default_database: String::new(),
            quota_key: String::new(),
            compression: CompressionMethod::default(),
            connect_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
            recv_buffer_size: None,
            send_buffer_size: None,
            settings: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Connecting,
    HandshakingSend,
    HandshakingRecv,
    Idle,
    QuerySending,
    QueryStreaming,
    Cancelling,
    Draining,
}

struct CancelState {
    requested: AtomicBool,
    notify: Notify,
}

/// Thread-safe cancellation trigger for one query. Cloneable and callable
/// from any thread; delivery to the session happens at its next suspension
/// point, and the Cancel frame is written at most once per query.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
    query_id: Uuid,
    current: Arc<StdMutex<Option<Uuid>>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let current = self.current.lock().unwrap();
        if *current == Some(self.query_id) {
            self.state.requested.store(true, Ordering::SeqCst);
            self.state.notify.notify_one();
        }
    }

    pub fn query_id(&self) -> Uuid {
        self.query_id
    }
}

/// In-flight reassembly state for a block-carrying packet. Lives on the
/// session so that a receive future dropped at a suspension point (e.g. when
/// a cancellation wins a select) resumes without losing consumed frames.
struct PendingBlock {
    id: ServerPacketId,
    table_name: String,
    compressed: Option<bool>,
    accum: Vec<u8>,
}

/// A single Clickhouse native-protocol session.
///
/// The session owns its socket exclusively and is driven by one caller at a
/// time; queries are sequential. After a server exception or a completed
/// cancellation drain the session returns to `Idle` and is fully reusable.
pub struct Session<R: ClickhouseRead, W: ClickhouseWrite> {
    reader: R,
    recv: RecvBuffer,
    writer: WireWriter<W>,
    options: ConnectionOptions,
    server_hello: ServerHello,
    revision: u64,
    state: SessionState,
    current_query: Arc<StdMutex<Option<Uuid>>>,
    cancel: Arc<CancelState>,
    partial: Option<PendingBlock>,
}

impl<R: ClickhouseRead, W: ClickhouseWrite> std::fmt::Debug for Session<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

pub type TcpSession = Session<OwnedReadHalf, OwnedWriteHalf>;

impl Session<OwnedReadHalf, OwnedWriteHalf> {
    /// Connect over plaintext TCP, with the configured connect timeout and
    /// socket options.
    pub async fn connect(
        destination: impl ToSocketAddrs,
        options: ConnectionOptions,
    ) -> Result<Self> {
        let stream = connect_socket(&destination, &options).await?;
        let (read, write) = stream.into_split();
        Self::connect_stream(read, write, options).await
    }
}

pub(crate) async fn connect_socket(
    destination: &impl ToSocketAddrs,
    options: &ConnectionOptions,
) -> Result<TcpStream> {
    let mut last_err: Option<ClickhouseError> = None;
    for addr in lookup_host(destination).await? {
        match timeout(options.connect_timeout, connect_addr(addr, options)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => last_err = Some(e.into()),
            Err(_) => return Err(ClickhouseError::ConnectTimeout),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "destination resolved to no addresses")
            .into()
    }))
}

#[cfg(feature = "compression")]
fn decompress_into(frame: &[u8], out: &mut Vec<u8>) -> Result<()> {
    crate::compression::decompress_frame(frame, out)
}

#[cfg(not(feature = "compression"))]
fn decompress_into(_frame: &[u8], _out: &mut Vec<u8>) -> Result<()> {
    Err(ClickhouseError::ProtocolError(
        "received a compressed block but the `compression` feature is disabled".to_string(),
    ))
}

async fn connect_addr(addr: SocketAddr, options: &ConnectionOptions) -> std::io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    if let Some(size) = options.recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }
    if let Some(size) = options.send_buffer_size {
        socket.set_send_buffer_size(size)?;
    }
    let stream = socket.connect(addr).await?;
    stream.set_nodelay(options.tcp_nodelay)?;
    Ok(stream)
}

impl<R: ClickhouseRead, W: ClickhouseWrite> Session<R, W> {
    /// Open a session over an arbitrary duplex stream (TLS wrappers, tests).
    /// Performs the handshake before returning.
    pub async fn connect_stream(reader: R, writer: W, options: ConnectionOptions) -> Result<Self> {
        let mut session = Session {
            reader,
            recv: RecvBuffer::new(BufferPool::new()),
            writer: WireWriter::new(writer),
            options,
            server_hello: ServerHello::default(),
            revision: 0,
            state: SessionState::Connecting,
            current_query: Arc::new(StdMutex::new(None)),
            cancel: Arc::new(CancelState {
                requested: AtomicBool::new(false),
                notify: Notify::new(),
            }),
            partial: None,
        };
        session.handshake().await?;
        Ok(session)
    }

    async fn handshake(&mut self) -> Result<()> {
        self.state = SessionState::HandshakingSend;
        client_message::write_hello(
            self.writer.buffer(),
            ClientHello {
                default_database: &self.options.default_database,
                username: &self.options.username,
                password: &self.options.password,
            },
        )
        .await?;
        self.writer.flush().await?;

        self.state = SessionState::HandshakingRecv;
        let hello = match self.receive_packet().await {
            Ok(ServerPacket::Hello(hello)) => hello,
            Ok(ServerPacket::Exception(e)) => {
                self.state = SessionState::Closed;
                return Err(e.emit());
            }
            Ok(packet) => {
                self.state = SessionState::Closed;
                return Err(ClickhouseError::ProtocolError(format!(
                    "unexpected packet {packet:?}, expected server hello"
                )));
            }
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(e);
            }
        };
        self.revision = hello.revision_version.min(DBMS_TCP_PROTOCOL_VERSION);
        debug!(
            "connected to {} {}.{}.{} (revision {}, negotiated {})",
            hello.server_name,
            hello.major_version,
            hello.minor_version,
            hello.patch_version,
            hello.revision_version,
            self.revision
        );
        self.server_hello = hello;

        if self.revision >= DBMS_MIN_PROTOCOL_VERSION_WITH_ADDENDUM {
            let quota_key = self.options.quota_key.clone();
            client_message::write_addendum(self.writer.buffer(), self.revision, &quota_key).await?;
            self.writer.flush().await?;
        }
        self.state = SessionState::Idle;
        Ok(())
    }

    pub fn server_hello(&self) -> &ServerHello {
        &self.server_hello
    }

    /// Protocol revision in effect: `min(client, server)`.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of the in-flight query, if any.
    pub fn current_query_id(&self) -> Option<Uuid> {
        *self.current_query.lock().unwrap()
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.requested.load(Ordering::SeqCst)
    }

    fn finish_query(&mut self) {
        let mut current = self.current_query.lock().unwrap();
        *current = None;
        self.cancel.requested.store(false, Ordering::SeqCst);
        self.state = SessionState::Idle;
    }

    fn fail(&mut self) {
        let mut current = self.current_query.lock().unwrap();
        *current = None;
        self.cancel.requested.store(false, Ordering::SeqCst);
        self.state = SessionState::Closed;
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.state {
            SessionState::Idle => Ok(()),
            SessionState::Closed => Err(ClickhouseError::SessionClosed),
            _ => Err(ClickhouseError::SessionBusy("a query is already in flight")),
        }
    }

    /// If the caller abandoned a query stream mid-flight, cancel it and drain
    /// the connection back to `Idle` before starting new work.
    async fn recover(&mut self) -> Result<()> {
        if matches!(
            self.state,
            SessionState::QuerySending
                | SessionState::QueryStreaming
                | SessionState::Cancelling
                | SessionState::Draining
        ) {
            debug!("recovering session from an abandoned query");
            self.write_cancel().await;
            let deadline = Instant::now() + DRAIN_TIMEOUT;
            loop {
                match timeout_at(deadline, self.receive_packet()).await {
                    Err(_) => {
                        self.fail();
                        return Err(ClickhouseError::SessionClosed);
                    }
                    Ok(Err(e)) => {
                        self.fail();
                        return Err(e);
                    }
                    Ok(Ok(ServerPacket::EndOfStream)) | Ok(Ok(ServerPacket::Exception(_))) => {
                        self.finish_query();
                        return Ok(());
                    }
                    Ok(Ok(_)) => continue,
                }
            }
        }
        Ok(())
    }

    /// Best-effort one-shot Cancel frame; write errors are logged, not
    /// surfaced.
    async fn write_cancel(&mut self) {
        self.state = SessionState::Cancelling;
        let result = async {
            client_message::write_cancel(self.writer.buffer()).await?;
            self.writer.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!("failed to write cancel frame: {e}");
        }
        self.state = SessionState::Draining;
    }

    async fn send_query(&mut self, id: Uuid, sql: &str, parameters: &IndexMap<String, String>) -> Result<()> {
        let id_text = id.as_hyphenated().to_string();
        let query = Query {
            id: &id_text,
            info: ClientInfo {
                kind: QueryKind::InitialQuery,
                initial_user: "",
                initial_query_id: "",
                initial_address: "0.0.0.0:0",
                os_user: "",
                client_hostname: "localhost",
                client_name: CLIENT_NAME,
                client_version_major: VERSION_MAJOR,
                client_version_minor: VERSION_MINOR,
                client_tcp_protocol_version: DBMS_TCP_PROTOCOL_VERSION,
                quota_key: &self.options.quota_key,
                distributed_depth: 0,
                client_version_patch: VERSION_PATCH,
            },
            settings: &self.options.settings,
            stage: QueryProcessingStage::Complete,
            compression: self.options.compression,
            query: sql,
            parameters,
        };
        let compression = self.options.compression;
        let revision = self.revision;
        let buffer = self.writer.buffer();
        client_message::write_query(buffer, query, revision).await?;
        // trailing empty block signals "no external data"
        client_message::write_data(buffer, "", &Block::empty(), compression, revision).await?;
        self.writer.flush().await?;
        Ok(())
    }

    fn start_query(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        *self.current_query.lock().unwrap() = Some(id);
        self.cancel.requested.store(false, Ordering::SeqCst);
        self.state = SessionState::QuerySending;
        id
    }

    /// Run a query, returning a lazy single-pass stream of result events.
    pub async fn query(&mut self, sql: impl AsRef<str>) -> Result<QueryStream<'_, R, W>> {
        self.query_with(sql, IndexMap::new()).await
    }

    /// Run a query with bound parameters (`{name:Type}` placeholders; values
    /// are transmitted as typed strings).
    pub async fn query_with(
        &mut self,
        sql: impl AsRef<str>,
        parameters: IndexMap<String, String>,
    ) -> Result<QueryStream<'_, R, W>> {
        self.recover().await?;
        self.ensure_idle()?;
        let id = self.start_query();
        trace!("sending query {id}: {}", sql.as_ref());
        match self.send_query(id, sql.as_ref(), &parameters).await {
            Ok(()) => {}
            Err(e) => {
                self.fail();
                return Err(e);
            }
        }
        self.state = SessionState::QueryStreaming;
        Ok(QueryStream {
            query_id: id,
            session: self,
            done: false,
            cancel_sent: false,
            drain_deadline: None,
        })
    }

    /// Run a query and collect every data block.
    pub async fn query_collect(&mut self, sql: impl AsRef<str>) -> Result<Vec<Block>> {
        let mut stream = self.query(sql).await?;
        let mut blocks = Vec::new();
        while let Some(event) = stream.next().await {
            if let QueryEvent::Block(block) = event? {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }

    /// Run a query and return the first column of the first row.
    pub async fn query_scalar<T: FromValue>(&mut self, sql: impl AsRef<str>) -> Result<T> {
        let mut stream = self.query(sql).await?;
        let mut first: Option<Value> = None;
        while let Some(event) = stream.next().await {
            if let QueryEvent::Block(mut block) = event? {
                if first.is_none() {
                    first = block.take_first_value();
                }
            }
        }
        T::from_value(first.ok_or(ClickhouseError::MissingRow)?)
    }

    /// Run a query and discard all result blocks, surfacing any error.
    pub async fn execute(&mut self, sql: impl AsRef<str>) -> Result<()> {
        let mut stream = self.query(sql).await?;
        while let Some(event) = stream.next().await {
            event?;
        }
        Ok(())
    }

    /// Liveness check: Ping, await Pong.
    pub async fn ping(&mut self) -> Result<()> {
        self.recover().await?;
        self.ensure_idle()?;
        client_message::write_ping(self.writer.buffer()).await?;
        self.writer.flush().await?;
        loop {
            match self.receive_packet().await {
                Ok(ServerPacket::Pong) => return Ok(()),
                // in-flight log spill from a previous query is harmless
                Ok(ServerPacket::Log(_)) | Ok(ServerPacket::ProfileEvents(_)) => continue,
                Ok(packet) => {
                    self.fail();
                    return Err(ClickhouseError::ProtocolError(format!(
                        "unexpected packet {packet:?}, expected pong"
                    )));
                }
                Err(e) => {
                    self.fail();
                    return Err(e);
                }
            }
        }
    }

    /// Begin an INSERT. Sends the query, waits for the server's schema block,
    /// and hands back a sink for pushing data blocks.
    pub async fn insert(&mut self, sql: impl AsRef<str>) -> Result<Insert<'_, R, W>> {
        self.recover().await?;
        self.ensure_idle()?;
        let id = self.start_query();
        trace!("sending insert {id}: {}", sql.as_ref());
        match self.send_query(id, sql.as_ref(), &IndexMap::new()).await {
            Ok(()) => {}
            Err(e) => {
                self.fail();
                return Err(e);
            }
        }
        self.state = SessionState::QueryStreaming;
        // the first data block echoes the target schema with zero rows
        let schema = loop {
            match self.receive_packet().await {
                Ok(ServerPacket::Data(data)) => break data.block.column_types,
                Ok(ServerPacket::Exception(e)) => {
                    self.finish_query();
                    return Err(e.emit());
                }
                Ok(ServerPacket::EndOfStream) => {
                    self.finish_query();
                    return Err(ClickhouseError::ProtocolError(
                        "server ended stream before sending an insert schema".to_string(),
                    ));
                }
                Ok(_) => continue,
                Err(e) => {
                    self.fail();
                    return Err(e);
                }
            }
        };
        Ok(Insert {
            session: self,
            schema,
            done: false,
        })
    }

    /// Idempotent close: flush and shut the socket down, best-effort.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        *self.current_query.lock().unwrap() = None;
        if let Err(e) = self.writer.shutdown().await {
            debug!("error shutting down session socket: {e}");
        }
        Ok(())
    }

    async fn send_data_block(&mut self, block: &Block) -> Result<()> {
        let compression = self.options.compression;
        let revision = self.revision;
        client_message::write_data(self.writer.buffer(), "", block, compression, revision).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive the next server packet, pumping the socket as needed. Block
    /// packets are reassembled (and decompressed) incrementally with all
    /// partial state on the session, so this future can be dropped at any
    /// await point and re-created without corrupting the stream.
    async fn receive_packet(&mut self) -> Result<ServerPacket> {
        loop {
            if self.partial.is_some() {
                if let Some(packet) = self.try_finish_block().await? {
                    trace!("server packet received: {packet:?}");
                    return Ok(packet);
                }
            } else if !self.recv.needs_pump() {
                let mut cursor = self.recv.cursor();
                match scan_packet_head(&mut cursor, self.revision) {
                    Ok(PacketHead::Plain { len }) => {
                        let packet = {
                            let view = self.recv.view(len);
                            decode_plain(view.as_ref(), self.revision).await?
                        };
                        self.recv.advance_to(len, len);
                        trace!("server packet received: {packet:?}");
                        return Ok(packet);
                    }
                    Ok(PacketHead::Block { id, header_len }) => {
                        let table_name = {
                            let view = self.recv.view(header_len);
                            decode_block_header(view.as_ref()).await?
                        };
                        self.recv.advance_to(header_len, header_len);
                        self.partial = Some(PendingBlock {
                            id,
                            table_name,
                            compressed: None,
                            accum: Vec::new(),
                        });
                        continue;
                    }
                    Err(ScanError::Incomplete) => {
                        let examined = self.recv.len();
                        self.recv.advance_to(0, examined);
                    }
                    Err(ScanError::Corrupt(e)) => return Err(e),
                }
            }
            self.recv.pump(&mut self.reader).await?;
        }
    }

    /// Drive the pending block forward with whatever is buffered. Returns
    /// `None` when more socket bytes are needed.
    async fn try_finish_block(&mut self) -> Result<Option<ServerPacket>> {
        loop {
            let partial = self.partial.as_mut().expect("pending block");
            match partial.compressed {
                None => {
                    if !self.options.compression.is_enabled() {
                        partial.compressed = Some(false);
                        continue;
                    }
                    // the algorithm byte sits after the 16-byte checksum
                    match self.recv.cursor().peek_byte(16) {
                        Ok(byte) => {
                            partial.compressed =
                                Some(CompressionMethod::from_byte(byte).is_some());
                            continue;
                        }
                        Err(ScanError::Incomplete) => {
                            // a tiny uncompressed block can be complete in
                            // fewer bytes than a frame header
                            let mut probe = self.recv.cursor();
                            if scan_block(&mut probe, self.revision).is_ok() {
                                partial.compressed = Some(false);
                                continue;
                            }
                            let examined = self.recv.len();
                            self.recv.advance_to(0, examined);
                            return Ok(None);
                        }
                        Err(ScanError::Corrupt(e)) => return Err(e),
                    }
                }
                Some(false) => {
                    let mut cursor = self.recv.cursor();
                    match scan_block(&mut cursor, self.revision) {
                        Ok(()) => {
                            let len = cursor.consumed();
                            let block = {
                                let view = self.recv.view(len);
                                Block::read(&mut view.as_ref(), self.revision).await?
                            };
                            self.recv.advance_to(len, len);
                            return Ok(Some(self.finish_block_packet(block)));
                        }
                        Err(ScanError::Incomplete) => {
                            let examined = self.recv.len();
                            self.recv.advance_to(0, examined);
                            return Ok(None);
                        }
                        Err(ScanError::Corrupt(e)) => return Err(e),
                    }
                }
                Some(true) => {
                    let mut cursor = self.recv.cursor();
                    match crate::compression::scan_frame(&mut cursor) {
                        Ok(frame_len) => {
                            {
                                let view = self.recv.view(frame_len);
                                decompress_into(view.as_ref(), &mut partial.accum)?;
                            }
                            self.recv.advance_to(frame_len, frame_len);
                            let partial = self.partial.as_mut().expect("pending block");
                            let mut block_cursor = ScanCursor::over_slice(&partial.accum);
                            match scan_block(&mut block_cursor, self.revision) {
                                Ok(()) => {
                                    let block =
                                        Block::read(&mut &partial.accum[..], self.revision).await?;
                                    return Ok(Some(self.finish_block_packet(block)));
                                }
                                // block continues in the next frame
                                Err(ScanError::Incomplete) => continue,
                                Err(ScanError::Corrupt(e)) => return Err(e),
                            }
                        }
                        Err(ScanError::Incomplete) => {
                            let examined = self.recv.len();
                            self.recv.advance_to(0, examined);
                            return Ok(None);
                        }
                        Err(ScanError::Corrupt(e)) => return Err(e),
                    }
                }
            }
        }
    }

    fn finish_block_packet(&mut self, block: Block) -> ServerPacket {
        let partial = self.partial.take().expect("pending block");
        let data = ServerData {
            table_name: partial.table_name,
            block,
        };
        match partial.id {
            ServerPacketId::Data => ServerPacket::Data(data),
            ServerPacketId::Totals => ServerPacket::Totals(data),
            ServerPacketId::Extremes => ServerPacket::Extremes(data),
            ServerPacketId::Log => ServerPacket::Log(data),
            _ => ServerPacket::ProfileEvents(data),
        }
    }
}

/// One event yielded while streaming a query's results.
#[derive(Debug, Clone)]
pub enum QueryEvent {
    /// A data block with at least one row.
    Block(Block),
    Progress(Progress),
    Totals(Block),
    Extremes(Block),
}

/// Finite, single-pass stream of server messages for one query. Owned by the
/// session; only the caller may advance it. Dropping it mid-query leaves the
/// session to cancel and drain on its next use.
pub struct QueryStream<'a, R: ClickhouseRead, W: ClickhouseWrite> {
    session: &'a mut Session<R, W>,
    query_id: Uuid,
    done: bool,
    cancel_sent: bool,
    drain_deadline: Option<Instant>,
}

impl<R: ClickhouseRead, W: ClickhouseWrite> QueryStream<'_, R, W> {
    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    /// A handle that cancels this query from any thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: self.session.cancel.clone(),
            query_id: self.query_id,
            current: self.session.current_query.clone(),
        }
    }

    pub async fn next(&mut self) -> Option<Result<QueryEvent>> {
        if self.done {
            return None;
        }
        loop {
            if !self.cancel_sent && self.session.cancel_requested() {
                self.session.write_cancel().await;
                self.cancel_sent = true;
                self.drain_deadline = Some(Instant::now() + DRAIN_TIMEOUT);
            }

            let packet = if let Some(deadline) = self.drain_deadline {
                match timeout_at(deadline, self.session.receive_packet()).await {
                    Ok(packet) => packet,
                    Err(_) => {
                        error!("drain timed out after cancelling query {}", self.query_id);
                        self.session.fail();
                        self.done = true;
                        return Some(Err(ClickhouseError::Cancelled));
                    }
                }
            } else {
                let cancel = self.session.cancel.clone();
                select! {
                    biased;
                    _ = cancel.notify.notified() => continue,
                    packet = self.session.receive_packet() => packet,
                }
            };

            let packet = match packet {
                Ok(packet) => packet,
                Err(e) => {
                    self.session.fail();
                    self.done = true;
                    return Some(Err(e));
                }
            };

            match packet {
                ServerPacket::Data(data) => {
                    if data.block.rows > 0 && !self.cancel_sent {
                        return Some(Ok(QueryEvent::Block(data.block)));
                    }
                }
                ServerPacket::Progress(progress) => {
                    if !self.cancel_sent {
                        return Some(Ok(QueryEvent::Progress(progress)));
                    }
                }
                ServerPacket::Totals(data) => {
                    if !self.cancel_sent {
                        return Some(Ok(QueryEvent::Totals(data.block)));
                    }
                }
                ServerPacket::Extremes(data) => {
                    if !self.cancel_sent {
                        return Some(Ok(QueryEvent::Extremes(data.block)));
                    }
                }
                // consumed silently
                ServerPacket::ProfileInfo(_)
                | ServerPacket::ProfileEvents(_)
                | ServerPacket::Log(_)
                | ServerPacket::TableColumns(_)
                | ServerPacket::Pong => {}
                ServerPacket::EndOfStream => {
                    self.session.finish_query();
                    self.done = true;
                    if self.cancel_sent {
                        return Some(Err(ClickhouseError::Cancelled));
                    }
                    return None;
                }
                // an exception beats a racing cancellation
                ServerPacket::Exception(e) => {
                    self.session.finish_query();
                    self.done = true;
                    return Some(Err(e.emit()));
                }
                packet => {
                    self.session.fail();
                    self.done = true;
                    return Some(Err(ClickhouseError::ProtocolError(format!(
                        "unexpected packet during query: {packet:?}"
                    ))));
                }
            }
        }
    }
}

/// Sink for one INSERT's data blocks. The server's schema block seeds
/// column names and types; blocks pushed here must match it.
pub struct Insert<'a, R: ClickhouseRead, W: ClickhouseWrite> {
    session: &'a mut Session<R, W>,
    schema: IndexMap<String, Type>,
    done: bool,
}

impl<R: ClickhouseRead, W: ClickhouseWrite> Insert<'_, R, W> {
    /// Target column names and types, as declared by the server.
    pub fn schema(&self) -> &IndexMap<String, Type> {
        &self.schema
    }

    /// Push one data block. Row ownership ends here: values are fully
    /// serialised (and possibly compressed) before this returns.
    pub async fn write_block(&mut self, block: Block) -> Result<()> {
        if self.done {
            return Err(ClickhouseError::SessionBusy("insert already finished"));
        }
        if block.column_types.len() != self.schema.len()
            || block
                .column_types
                .iter()
                .zip(self.schema.iter())
                .any(|((n1, t1), (n2, t2))| n1 != n2 || t1 != t2)
        {
            return Err(ClickhouseError::SerializeError(format!(
                "block schema mismatch: expected {:?}",
                self.schema
            )));
        }
        for (name, values) in &block.column_data {
            if let Some(type_) = self.schema.get(name) {
                for value in values {
                    type_.validate_value(value)?;
                }
            }
        }
        match self.session.send_data_block(&block).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.session.fail();
                Err(e)
            }
        }
    }

    /// Extract rows into a block via per-column extractors and push it.
    pub async fn write_rows<T>(
        &mut self,
        rows: &[T],
        extractors: &[ColumnExtractor<T>],
    ) -> Result<()> {
        let block = rows_to_block(&self.schema, rows, extractors)?;
        self.write_block(block).await
    }

    /// Send the trailing empty block and wait for the server to acknowledge
    /// the whole insert.
    pub async fn finish(mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        match self.session.send_data_block(&Block::empty()).await {
            Ok(()) => {}
            Err(e) => {
                self.session.fail();
                return Err(e);
            }
        }
        loop {
            match self.session.receive_packet().await {
                Ok(ServerPacket::EndOfStream) => {
                    self.session.finish_query();
                    return Ok(());
                }
                Ok(ServerPacket::Exception(e)) => {
                    self.session.finish_query();
                    return Err(e.emit());
                }
                Ok(_) => continue,
                Err(e) => {
                    self.session.fail();
                    return Err(e);
                }
            }
        }
    }
}
