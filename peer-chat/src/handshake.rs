//! Identity exchange performed once the endpoint is up.
//!
//! The dialing side always speaks first and the listening side always
//! listens first. If both sides waited for the other, neither would ever send.

use tracing::debug;

use crate::{
    endpoint::Endpoint,
    error::HandshakeError,
    protocol::{Identity, MAX_UNAME_SIZE},
};

/// Which end of the connection this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Connecting,
    Listening,
}

pub async fn exchange(
    endpoint: &Endpoint,
    role: Role,
    local: &Identity,
) -> Result<Identity, HandshakeError> {
    let remote = match role {
        Role::Connecting => {
            send_identity(endpoint, local).await?;
            receive_identity(endpoint).await?
        }
        Role::Listening => {
            let remote = receive_identity(endpoint).await?;
            send_identity(endpoint, local).await?;
            remote
        }
    };

    debug!(?role, local = %local, remote = %remote, "handshake complete");
    Ok(remote)
}

async fn send_identity(endpoint: &Endpoint, local: &Identity) -> Result<(), HandshakeError> {
    endpoint.send(&local.to_block()).await?;
    Ok(())
}

async fn receive_identity(endpoint: &Endpoint) -> Result<Identity, HandshakeError> {
    let mut block = [0u8; MAX_UNAME_SIZE];
    let read = endpoint.receive(&mut block).await?;
    if read == 0 {
        return Err(HandshakeError::PeerClosed);
    }
    Identity::from_block(&block[..read]).ok_or(HandshakeError::EmptyIdentity)
}
