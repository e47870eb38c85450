use protocol::msg::RemoteSignerError;
use thiserror::Error;

/// Failures of the validator-side signing path. Remote-reported refusals keep
/// their own variant so callers can tell a lost connection from a signer that
/// answered and said no.
#[derive(Debug, Error)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("not connected to a remote signer")]
    NotConnected,

    #[error("timed out waiting for a remote signer to connect")]
    ConnectionTimeout,

    #[error("timed out waiting for the remote signer response")]
    RequestTimeout,

    #[error("unexpected response variant from the remote signer")]
    UnexpectedResponse,

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    RemoteSigner(#[from] RemoteSignerError),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Connection(err.to_string())
    }
}
