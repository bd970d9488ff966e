//! Error types for session startup.
//!
//! Everything that can go wrong before the pumps start is fatal and maps to a
//! distinct process exit status. Errors during the message loops never reach
//! this type; the pumps log them and keep going.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    /// The peer address or service could not be resolved.
    #[error("failed to resolve {address}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The listening socket could not be created.
    #[error("failed to open socket")]
    Socket(#[source] io::Error),

    /// Address reuse could not be enabled on the listening socket.
    #[error("failed to set socket options")]
    SocketOption(#[source] io::Error),

    #[error("failed to bind port {port}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept incoming connection")]
    Accept(#[source] io::Error),

    #[error("handshake failed")]
    Handshake(#[from] HandshakeError),

    #[error("invalid username: {0}")]
    InvalidIdentity(String),

    #[error("I/O error")]
    Io(#[from] io::Error),
}

impl ChatError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ChatError::Resolve { .. } => 255,
            ChatError::Socket(_) => 254,
            ChatError::SocketOption(_) => 253,
            ChatError::Bind { .. } => 252,
            ChatError::Accept(_) => 251,
            ChatError::Handshake(_) => 250,
            ChatError::InvalidIdentity(_) => 249,
            ChatError::Io(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("peer closed the connection before sending a username")]
    PeerClosed,

    #[error("peer sent an empty username")]
    EmptyIdentity,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;
