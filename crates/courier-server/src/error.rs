//! Session termination reasons.

/// Why a connection's receive loop ended.
///
/// Every variant is terminal for that connection only.
#[derive(Debug, thiserror::Error)]
pub enum SessionEnd {
    /// The peer sent a close frame.
    #[error("peer closed the connection")]
    ClosedByPeer,

    /// The inbound stream ended without a close frame.
    #[error("transport stream ended")]
    StreamEnded,

    /// Writing to the socket failed.
    #[error("socket write failed")]
    WriteFailed,

    /// The writer task stopped before the read half ended.
    #[error("writer stopped")]
    WriterStopped,

    /// Reading from the socket failed.
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
}
