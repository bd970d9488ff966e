//! Session lifecycle: handshake, pump supervision and orderly shutdown.
//!
//! A [`Session`] owns the endpoint for its whole life. The sender and receiver
//! pumps share it through [`SessionContext`] and watch the published
//! [`SessionState`]; they stop on their next iteration once it leaves
//! `Active`. Whichever of local quit, remote quit or interrupt happens first
//! decides the [`TerminationReason`]; later triggers are ignored.

use std::{
    future::Future,
    sync::{Arc, OnceLock},
    time::Duration,
};

use tokio::{
    io::AsyncBufRead,
    select,
    sync::{Notify, watch},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    console::Console,
    endpoint::Endpoint,
    error::Result,
    handshake::{self, Role},
    protocol::{Identity, Message},
    pump,
};

/// Longest the controller waits on the peer while shutting down.
const LINGER: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Terminating,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The local user typed the quit command.
    LocalQuit,
    /// The peer sent the quit command or went away.
    RemoteQuit,
    /// The process was interrupted; the peer is told before shutdown.
    Interrupted,
}

impl TerminationReason {
    pub fn farewell(self, remote: &Identity, peer: &str) -> String {
        match self {
            TerminationReason::LocalQuit | TerminationReason::Interrupted => {
                format!("Terminated connection with {remote} ({peer})")
            }
            TerminationReason::RemoteQuit => format!("Terminated connection by {remote} ({peer})"),
        }
    }

    pub fn notifies_peer(self) -> bool {
        matches!(self, TerminationReason::Interrupted)
    }
}

/// Records the first termination request and wakes the controller.
#[derive(Debug, Default)]
pub struct Termination {
    reason: OnceLock<TerminationReason>,
    notify: Notify,
}

impl Termination {
    /// Returns `true` only for the request that actually ends the session.
    pub fn trigger(&self, reason: TerminationReason) -> bool {
        if self.reason.set(reason).is_ok() {
            debug!(?reason, "termination requested");
            self.notify.notify_one();
            true
        } else {
            debug!(?reason, first = ?self.reason(), "session already terminating");
            false
        }
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        self.reason.get().copied()
    }

    pub async fn wait(&self) -> TerminationReason {
        loop {
            if let Some(reason) = self.reason() {
                return reason;
            }
            self.notify.notified().await;
        }
    }
}

/// State shared read-only between the controller and both pumps.
pub struct SessionContext {
    pub(crate) endpoint: Endpoint,
    pub(crate) console: Console,
    pub(crate) remote: Identity,
    pub(crate) termination: Termination,
}

impl SessionContext {
    pub fn new(endpoint: Endpoint, console: Console, remote: Identity) -> Self {
        Self {
            endpoint,
            console,
            remote,
            termination: Termination::default(),
        }
    }

    pub fn termination(&self) -> &Termination {
        &self.termination
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub reason: TerminationReason,
    pub remote: Identity,
}

pub struct Session {
    context: Arc<SessionContext>,
    state: watch::Sender<SessionState>,
}

impl Session {
    /// Performs the handshake on a freshly established endpoint.
    ///
    /// On success the session is `Active` and the connection banner has been
    /// shown. A failed handshake drops the endpoint without starting pumps.
    pub async fn start(endpoint: Endpoint, role: Role, console: Console) -> Result<Self> {
        let (state, _) = watch::channel(SessionState::Connecting);

        let remote = match handshake::exchange(&endpoint, role, console.local()).await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(peer = endpoint.peer(), error = %err, "handshake failed");
                release(&endpoint).await;
                return Err(err.into());
            }
        };

        console
            .announce(&format!(
                "Connection established with {remote} ({})",
                endpoint.peer()
            ))
            .await?;
        info!(peer = endpoint.peer(), remote = %remote, "session active");

        state.send_replace(SessionState::Active);
        Ok(Self {
            context: Arc::new(SessionContext::new(endpoint, console, remote)),
            state,
        })
    }

    pub fn remote(&self) -> &Identity {
        &self.context.remote
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Runs both pumps until a quit command or `interrupt` resolves, then
    /// shuts down and releases the endpoint.
    pub async fn run_until<I, F>(self, input: I, interrupt: F) -> SessionSummary
    where
        I: AsyncBufRead + Send + Unpin + 'static,
        F: Future<Output = ()> + Send,
    {
        let Session { context, state } = self;

        let sender = tokio::spawn(pump::run_sender(
            Arc::clone(&context),
            state.subscribe(),
            input,
        ));
        let receiver = tokio::spawn(pump::run_receiver(
            Arc::clone(&context),
            state.subscribe(),
        ));

        tokio::pin!(interrupt);
        select! {
            _ = context.termination.wait() => {}
            _ = &mut interrupt => {
                context.termination.trigger(TerminationReason::Interrupted);
            }
        }
        let reason = context.termination.wait().await;

        state.send_replace(SessionState::Terminating);
        info!(?reason, remote = %context.remote, "session terminating");

        if reason.notifies_peer() {
            notify_peer(&context).await;
        }
        let farewell = reason.farewell(&context.remote, context.endpoint.peer());
        if let Err(error) = context.console.announce(&format!("\n{farewell}")).await {
            warn!(?error, "failed to print farewell");
        }

        join_pump("sender", sender).await;
        join_pump("receiver", receiver).await;

        release(&context.endpoint).await;
        state.send_replace(SessionState::Closed);
        debug!("session closed");

        SessionSummary {
            reason,
            remote: context.remote.clone(),
        }
    }

    pub async fn run_until_ctrl_c<I>(self, input: I) -> SessionSummary
    where
        I: AsyncBufRead + Send + Unpin + 'static,
    {
        self.run_until(input, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

/// Best-effort quit notice; a peer that stopped reading is not waited on.
async fn notify_peer(context: &SessionContext) {
    let quit = Message::quit().to_frame();
    match timeout(LINGER, context.endpoint.send(&quit)).await {
        Ok(Ok(_)) => {}
        Ok(Err(error)) => warn!(?error, "failed to tell peer about interrupt"),
        Err(_) => warn!("peer did not accept the quit notice in time"),
    }
}

async fn release(endpoint: &Endpoint) {
    if timeout(LINGER, endpoint.shutdown()).await.is_err() {
        debug!(peer = endpoint.peer(), "endpoint shutdown timed out");
    }
}

async fn join_pump(name: &str, handle: JoinHandle<()>) {
    if let Err(error) = handle.await {
        warn!(pump = name, ?error, "pump task did not finish cleanly");
    }
}
