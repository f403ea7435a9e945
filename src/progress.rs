/// Incremental execution statistics pushed by the server during a query.
///
/// Fields past `total_rows_to_read` exist only at sufficiently new protocol
/// revisions; decoding gates strictly on the negotiated revision.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub read_rows: u64,
    pub read_bytes: u64,
    pub total_rows_to_read: u64,
    pub total_bytes_to_read: Option<u64>,
    pub written_rows: Option<u64>,
    pub written_bytes: Option<u64>,
    pub elapsed_ns: Option<u64>,
}
