//! Error types shared by the codec, the dispatcher, and the client.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Failures that make a byte stream undecodable. Any of these ends the connection.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame body of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("call frame has no method/argument separator")]
    MissingSeparator,

    #[error("method name is not valid UTF-8")]
    BadMethodName,

    #[error("expected a reply to call {expected}, got frame {got}")]
    SequenceMismatch { expected: u32, got: u32 },

    #[error("expected a reply frame, got a call")]
    UnexpectedCall,
}

/// Errors raised while routing a call. These travel back to the caller in an error frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("rpc: service/method request ill-formed: {0}")]
    IllFormed(String),

    #[error("rpc: can't find service {0}")]
    UnknownService(String),

    #[error("rpc: can't find method {0}")]
    UnknownMethod(String),

    #[error("rpc: invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("rpc: damaged frame: {0}")]
    DamagedFrame(String),
}

/// Errors seen by a client making calls.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("server error: {0}")]
    Remote(String),

    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("terminal error: {0}")]
    Terminal(#[source] io::Error),
}

impl ClientError {
    /// True when the connection is unusable and the client should give up.
    pub fn is_fatal(&self) -> bool {
        match self {
            ClientError::Connect { .. } | ClientError::ConnectionLost(_) => true,
            ClientError::Protocol(ProtocolError::Io(err)) => is_connection_loss(err),
            _ => false,
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(io_err) if is_connection_loss(&io_err) => {
                ClientError::ConnectionLost(io_err.to_string())
            }
            other => ClientError::Protocol(other),
        }
    }
}

/// I/O error kinds that mean the peer is gone.
pub fn is_connection_loss(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
