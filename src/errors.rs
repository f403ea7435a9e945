use thiserror::Error;

/// Server-side exception payload, as delivered in an `Exception` message.
///
/// A server exception terminates the running query but not the session.
#[derive(Debug, Clone)]
pub struct ServerError {
    pub code: i32,
    pub name: String,
    pub message: String,
    pub stack_trace: String,
    pub nested: Option<Box<ServerError>>,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.code, self.message)
    }
}

#[derive(Error, Debug)]
pub enum ClickhouseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("unexpected end of stream")]
    UnexpectedEof,
    #[error("protocol error: {0}")]
    ProtocolError(String),
    #[error("failed to parse type: {0}")]
    TypeParseError(String),
    #[error("failed to deserialize column: {0}")]
    DeserializeError(String),
    #[error("failed to serialize column: {0}")]
    SerializeError(String),
    #[error("server exception: {0}")]
    ServerException(ServerError),
    #[error("query cancelled")]
    Cancelled,
    #[error("session is closed")]
    SessionClosed,
    #[error("session is busy: {0}")]
    SessionBusy(&'static str),
    #[error("missing row in response")]
    MissingRow,
    #[error("out of bounds value for conversion: {0}")]
    OutOfBounds(String),
    #[error("unexpected type: {0}")]
    UnexpectedType(crate::types::Type),
}

impl ClickhouseError {
    /// True for errors that leave the connection unusable. Server exceptions
    /// and cancellations are recoverable at session granularity; everything
    /// else closes the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ClickhouseError::ServerException(_)
                | ClickhouseError::Cancelled
                | ClickhouseError::SessionBusy(_)
                | ClickhouseError::MissingRow
                | ClickhouseError::OutOfBounds(_)
                | ClickhouseError::UnexpectedType(_)
                | ClickhouseError::TypeParseError(_)
        )
    }
}

pub type Result<T, E = ClickhouseError> = std::result::Result<T, E>;
