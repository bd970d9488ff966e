use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpSocket, TcpStream},
    sync::Mutex,
};
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};

const LISTEN_BACKLOG: u32 = 1024;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The single duplex connection used for a chat session.
///
/// Each direction sits behind its own lock so the receiver pump can wait for
/// a frame while the sender pump (or the controller) writes.
pub struct Endpoint {
    reader: Mutex<BoxedReader>,
    writer: Mutex<BoxedWriter>,
    peer: String,
}

impl Endpoint {
    pub fn from_stream(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (reader, writer) = stream.into_split();
        Self::from_io(reader, writer, peer)
    }

    /// Wraps an arbitrary reader/writer pair, e.g. an in-memory duplex.
    pub fn from_io<R, W>(reader: R, writer: W, peer: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Mutex::new(Box::new(reader)),
            writer: Mutex::new(Box::new(writer)),
            peer: peer.into(),
        }
    }

    /// Printable address of the remote side.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn send(&self, bytes: &[u8]) -> io::Result<usize> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(bytes.len())
    }

    /// Fills `buf` with exactly one block from the peer.
    ///
    /// Returns `Ok(0)` when the peer closed the stream cleanly before sending
    /// anything; a stream that ends mid-block is `UnexpectedEof`.
    pub async fn receive(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self.reader.lock().await;
        let mut filled = 0;
        while filled < buf.len() {
            let read = reader.read(&mut buf[filled..]).await?;
            if read == 0 {
                if filled == 0 {
                    return Ok(0);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("peer closed mid-frame after {filled} bytes"),
                ));
            }
            filled += read;
        }
        Ok(filled)
    }

    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(error) = writer.shutdown().await {
            debug!(?error, peer = %self.peer, "failed to shut down endpoint writer");
        }
    }
}

/// Dials `address:port` until a connection is accepted.
///
/// Each attempt uses a fresh socket. There is no backoff; only a failed
/// address resolution stops the loop.
pub async fn connect(address: &str, port: u16) -> Result<Endpoint> {
    let target = resolve(address, port).await?;

    let mut attempts: u64 = 0;
    loop {
        attempts += 1;
        match TcpStream::connect(target).await {
            Ok(stream) => {
                info!(peer = %target, attempts, "connected");
                return Ok(Endpoint::from_stream(stream));
            }
            Err(error) => {
                debug!(peer = %target, attempts, ?error, "connection attempt failed; retrying");
                tokio::task::yield_now().await;
            }
        }
    }
}

async fn resolve(address: &str, port: u16) -> Result<SocketAddr> {
    let to_error = |source: io::Error| ChatError::Resolve {
        address: format!("{address}:{port}"),
        source,
    };

    let mut candidates = tokio::net::lookup_host((address, port))
        .await
        .map_err(to_error)?;
    candidates.find(SocketAddr::is_ipv4).ok_or_else(|| {
        to_error(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no IPv4 address found",
        ))
    })
}

/// A listening socket that hands out exactly one connection.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Binds all interfaces on `port` with address reuse enabled.
    pub fn bind(port: u16) -> Result<Self> {
        let socket = TcpSocket::new_v4().map_err(ChatError::Socket)?;
        socket.set_reuseaddr(true).map_err(ChatError::SocketOption)?;

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        socket
            .bind(addr)
            .map_err(|source| ChatError::Bind { port, source })?;
        let inner = socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| ChatError::Bind { port, source })?;

        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accepts one peer and closes the listening socket.
    pub async fn accept_one(self) -> Result<Endpoint> {
        let (stream, peer) = self.inner.accept().await.map_err(|error| {
            warn!(?error, "failed to accept connection");
            ChatError::Accept(error)
        })?;
        info!(peer = %peer, "accepted connection");
        Ok(Endpoint::from_stream(stream))
    }
}

/// Binds `port`, waits for the first peer and stops listening.
pub async fn listen_and_accept(port: u16) -> Result<Endpoint> {
    let listener = Listener::bind(port)?;
    match listener.local_addr() {
        Ok(addr) => info!(%addr, "listening"),
        Err(error) => debug!(?error, "listening address unavailable"),
    }
    listener.accept_one().await
}
