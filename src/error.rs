#[derive(Debug, thiserror::Error)]
pub enum TapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },

    #[error("Store replied with an error: {0}")]
    ErrorReply(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Source feed closed")]
    SourceClosed,

    #[error("All forwarding workers have stopped")]
    PipelineClosed,

    #[error("No write commands found in the command catalog")]
    EmptyCatalog,

    #[error("Task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}
