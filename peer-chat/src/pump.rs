//! The two message pumps.
//!
//! Each pump loops while the session is `Active`, waiting on its I/O source
//! and on state changes at the same time so a shutdown is noticed without
//! waiting for more input. Errors inside the loops are logged and never end
//! the session; only the quit command (or a vanished peer) does.

use std::{io, sync::Arc};

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt},
    select,
    sync::watch,
};
use tracing::{debug, info, warn};

use crate::{
    protocol::{Frame, MAX_MSG_SIZE, Message},
    session::{SessionContext, SessionState, TerminationReason},
};

/// Most input bytes read for one message, newline included.
const LINE_LIMIT: usize = MAX_MSG_SIZE - 1;

/// One read from local input.
enum Input {
    Line(String),
    Closed,
}

/// Reads local input lines and forwards them to the peer.
pub async fn run_sender<I>(
    context: Arc<SessionContext>,
    mut state: watch::Receiver<SessionState>,
    mut input: I,
) where
    I: AsyncBufRead + Unpin,
{
    if let Err(error) = context.console.prompt().await {
        warn!(?error, "failed to print prompt");
    }

    let mut buf = Vec::with_capacity(LINE_LIMIT);
    let mut skip_rest = false;
    while *state.borrow() == SessionState::Active {
        let line = select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            read = read_bounded_line(&mut input, &mut buf, &mut skip_rest) => match read {
                Ok(Input::Line(line)) => line,
                Ok(Input::Closed) => {
                    debug!("input closed; leaving chat");
                    Message::quit().to_string()
                }
                Err(error) => {
                    warn!(?error, "failed to read input line");
                    continue;
                }
            },
        };

        if !forward_line(&context, &mut state, &line).await {
            break;
        }
    }

    debug!("sender pump stopped");
}

/// Reads at most [`LINE_LIMIT`] bytes of one line.
///
/// An overlong line is cut and re-terminated; the remainder is dropped in
/// buffer-sized chunks before the next line is read.
async fn read_bounded_line<I>(
    input: &mut I,
    buf: &mut Vec<u8>,
    skip_rest: &mut bool,
) -> io::Result<Input>
where
    I: AsyncBufRead + Unpin,
{
    if *skip_rest {
        discard_line(input).await?;
        *skip_rest = false;
    }

    buf.clear();
    let read = (&mut *input)
        .take(LINE_LIMIT as u64)
        .read_until(b'\n', buf)
        .await?;
    if read == 0 {
        return Ok(Input::Closed);
    }

    let mut line = decode_input(buf);
    if read == LINE_LIMIT && buf.last() != Some(&b'\n') {
        *skip_rest = true;
        line.push('\n');
    }
    Ok(Input::Line(line))
}

async fn discard_line<I>(input: &mut I) -> io::Result<()>
where
    I: AsyncBufRead + Unpin,
{
    loop {
        let chunk = input.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(());
        }
        match chunk.iter().position(|&b| b == b'\n') {
            Some(end) => {
                input.consume(end + 1);
                return Ok(());
            }
            None => {
                let len = chunk.len();
                input.consume(len);
            }
        }
    }
}

/// Decodes input bytes, dropping a multi-byte character cut by the limit.
fn decode_input(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(err) if err.error_len().is_none() => {
            String::from_utf8_lossy(&bytes[..err.valid_up_to()]).into_owned()
        }
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Sends one line; returns `false` once the quit command has gone out or the
/// session stopped while the send was pending.
async fn forward_line(
    context: &SessionContext,
    state: &mut watch::Receiver<SessionState>,
    line: &str,
) -> bool {
    let message = Message::from_line(line);
    let frame = message.to_frame();

    select! {
        sent = context.endpoint.send(&frame) => {
            if let Err(error) = sent {
                warn!(?error, "failed to send message");
            }
        }
        _ = until_inactive(state) => {
            debug!("session stopped while a send was pending");
            return false;
        }
    }

    if message.is_quit() {
        context.termination.trigger(TerminationReason::LocalQuit);
        return false;
    }

    if let Err(error) = context.console.prompt().await {
        warn!(?error, "failed to print prompt");
    }
    true
}

async fn until_inactive(state: &mut watch::Receiver<SessionState>) {
    let _ = state.wait_for(|current| *current != SessionState::Active).await;
}

/// Receives frames from the peer and renders them.
pub async fn run_receiver(context: Arc<SessionContext>, mut state: watch::Receiver<SessionState>) {
    let mut frame: Frame = [0u8; MAX_MSG_SIZE];

    while *state.borrow() == SessionState::Active {
        select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            received = context.endpoint.receive(&mut frame) => {
                if !handle_received(&context, received, &frame).await {
                    break;
                }
            }
        }
        frame.fill(0);
    }

    debug!("receiver pump stopped");
}

/// Handles one receive result; returns `false` when the pump should stop.
async fn handle_received(
    context: &SessionContext,
    received: io::Result<usize>,
    frame: &[u8],
) -> bool {
    match received {
        Ok(0) => {
            info!(peer = context.endpoint.peer(), "peer closed the connection");
            context.termination.trigger(TerminationReason::RemoteQuit);
            false
        }
        Ok(_) => {
            let message = Message::from_frame(frame);
            if message.is_quit() {
                context.termination.trigger(TerminationReason::RemoteQuit);
                return false;
            }
            if let Err(error) = context.console.render_remote(&context.remote, &message).await {
                warn!(?error, "failed to render message");
            }
            true
        }
        Err(error) if peer_gone(&error) => {
            warn!(?error, peer = context.endpoint.peer(), "connection lost");
            context.termination.trigger(TerminationReason::RemoteQuit);
            false
        }
        Err(error) => {
            warn!(?error, "failed to receive message");
            true
        }
    }
}

fn peer_gone(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
