//! Error taxonomy for the aggregation node (spec §7).
//!
//! Each client-facing variant already knows the response line it maps to, so
//! the dispatcher never has to re-derive a status from an error kind.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AggError>;

/// Errors the core can produce.
#[derive(Error, Debug)]
pub enum AggError {
    /// Malformed request, missing required header, or unparseable body.
    #[error("client format error: {0}")]
    ClientFormat(#[from] ClientFormatError),

    /// A GET found no observation satisfying visibility + liveness.
    #[error("no data found")]
    LookupMiss,

    /// I/O error on a connection.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Checkpoint read/write failure.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// The listening port could not be bound.
    #[error("bind error on port {port}: {source}")]
    FatalBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// The sub-taxonomy of malformed-request errors, each carrying its own
/// response reason phrase.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientFormatError {
    #[error("unknown method")]
    UnknownMethod,
    #[error("missing ServerId")]
    NullServerId,
    #[error("missing StationId in body")]
    NullStationId,
    #[error("body is not valid JSON")]
    JsonError,
}

impl AggError {
    /// The single response line this error maps to, per §6.
    pub fn response_line(&self) -> String {
        match self {
            AggError::ClientFormat(ClientFormatError::UnknownMethod) => {
                "400 Bad Request".to_string()
            }
            AggError::ClientFormat(ClientFormatError::NullServerId) => {
                "400 Null ServerId".to_string()
            }
            AggError::ClientFormat(ClientFormatError::NullStationId) => {
                "400 Null StationId".to_string()
            }
            AggError::ClientFormat(ClientFormatError::JsonError) => {
                "400 JSON Error".to_string()
            }
            AggError::LookupMiss => "404 Data Not Found".to_string(),
            // Transport/Checkpoint/FatalBind never reach a connection; they're
            // logged and handled by the caller instead of being written back.
            AggError::Transport(e) => format!("500 {}", e),
            AggError::Checkpoint(e) => format!("500 {}", e),
            AggError::FatalBind { port, source } => {
                format!("500 cannot bind port {}: {}", port, source)
            }
        }
    }
}
