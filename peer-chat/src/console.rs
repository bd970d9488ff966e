use std::io;

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::protocol::{Identity, Message};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Terminal output shared by both pumps and the controller.
///
/// Writes are serialized so a received line never splits the local prompt.
pub struct Console {
    out: Mutex<BoxedWriter>,
    local: Identity,
}

impl Console {
    pub fn new<W>(out: W, local: Identity) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            out: Mutex::new(Box::new(out)),
            local,
        }
    }

    pub fn stdout(local: Identity) -> Self {
        Self::new(tokio::io::stdout(), local)
    }

    pub fn local(&self) -> &Identity {
        &self.local
    }

    pub async fn prompt(&self) -> io::Result<()> {
        self.write(&format!("<{}>: ", self.local)).await
    }

    /// Shows a line from the peer, then redraws the local prompt.
    pub async fn render_remote(&self, remote: &Identity, message: &Message) -> io::Result<()> {
        self.write(&format!("\n<{remote}>: {message}<{}>: ", self.local))
            .await
    }

    pub async fn announce(&self, line: &str) -> io::Result<()> {
        self.write(&format!("{line}\n")).await
    }

    async fn write(&self, text: &str) -> io::Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes()).await?;
        out.flush().await
    }
}
