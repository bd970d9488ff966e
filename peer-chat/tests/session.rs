use std::{future::Future, time::Duration};

use anyhow::Result;
use peer_chat::{
    console::Console,
    endpoint::{self, Listener},
    handshake::Role,
    protocol::{Identity, MAX_MSG_SIZE},
    session::{Session, SessionState, SessionSummary, TerminationReason},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream},
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(5);

struct Peer {
    keyboard: DuplexStream,
    screen: DuplexStream,
    session: JoinHandle<SessionSummary>,
}

impl Peer {
    async fn type_line(&mut self, line: &str) -> Result<()> {
        self.keyboard.write_all(line.as_bytes()).await?;
        self.keyboard.flush().await?;
        Ok(())
    }

    /// Reads terminal output until `needle` shows up.
    async fn expect_screen(&mut self, needle: &str) -> Result<String> {
        let mut seen = String::new();
        let mut buf = [0u8; 512];
        while !seen.contains(needle) {
            let read = timeout(WAIT, self.screen.read(&mut buf)).await??;
            anyhow::ensure!(read > 0, "screen closed before {needle:?}; saw {seen:?}");
            seen.push_str(&String::from_utf8_lossy(&buf[..read]));
        }
        Ok(seen)
    }

    async fn finish(self) -> Result<(SessionSummary, String)> {
        let Peer {
            keyboard,
            mut screen,
            session,
        } = self;
        let summary = timeout(WAIT, session).await??;
        drop(keyboard);

        let mut rest = String::new();
        timeout(WAIT, screen.read_to_string(&mut rest)).await??;
        Ok((summary, rest))
    }
}

fn identity(name: &str) -> Identity {
    Identity::new(name).expect("valid identity")
}

fn launch<F>(session: Session, interrupt: F) -> (DuplexStream, JoinHandle<SessionSummary>)
where
    F: Future<Output = ()> + Send + 'static,
{
    let (keyboard, input) = tokio::io::duplex(4096);
    let handle = tokio::spawn(session.run_until(BufReader::new(input), interrupt));
    (keyboard, handle)
}

/// Starts a listening "Bob" and a dialing "Alice" on loopback.
async fn pair<F, G>(bob_interrupt: F, alice_interrupt: G) -> Result<(Peer, Peer)>
where
    F: Future<Output = ()> + Send + 'static,
    G: Future<Output = ()> + Send + 'static,
{
    let listener = Listener::bind(0)?;
    let port = listener.local_addr()?.port();

    let (bob_screen_out, bob_screen) = tokio::io::duplex(64 * 1024);
    let (alice_screen_out, alice_screen) = tokio::io::duplex(64 * 1024);

    let bob = tokio::spawn(async move {
        let endpoint = listener.accept_one().await?;
        Session::start(endpoint, Role::Listening, Console::new(bob_screen_out, identity("Bob"))).await
    });
    let alice = tokio::spawn(async move {
        let endpoint = endpoint::connect("127.0.0.1", port).await?;
        Session::start(
            endpoint,
            Role::Connecting,
            Console::new(alice_screen_out, identity("Alice")),
        )
        .await
    });

    let bob = timeout(WAIT, bob).await???;
    let alice = timeout(WAIT, alice).await???;

    assert_eq!(bob.remote(), &identity("Alice"));
    assert_eq!(alice.remote(), &identity("Bob"));
    assert_eq!(bob.state(), SessionState::Active);
    assert_eq!(alice.state(), SessionState::Active);

    let (bob_keyboard, bob_session) = launch(bob, bob_interrupt);
    let (alice_keyboard, alice_session) = launch(alice, alice_interrupt);

    Ok((
        Peer {
            keyboard: bob_keyboard,
            screen: bob_screen,
            session: bob_session,
        },
        Peer {
            keyboard: alice_keyboard,
            screen: alice_screen,
            session: alice_session,
        },
    ))
}

#[tokio::test]
async fn alice_and_bob_chat_until_bob_quits() -> Result<()> {
    let (mut bob, mut alice) = pair(std::future::pending(), std::future::pending()).await?;

    bob.expect_screen("Connection established with Alice (127.0.0.1)\n")
        .await?;
    alice
        .expect_screen("Connection established with Bob (127.0.0.1)\n")
        .await?;

    alice.type_line("hi\n").await?;
    bob.expect_screen("\n<Alice>: hi\n<Bob>: ").await?;

    bob.type_line("hello alice\n").await?;
    alice.expect_screen("\n<Bob>: hello alice\n<Alice>: ").await?;

    bob.type_line("~quit\n").await?;

    let (bob_summary, bob_rest) = bob.finish().await?;
    let (alice_summary, alice_rest) = alice.finish().await?;

    assert_eq!(bob_summary.reason, TerminationReason::LocalQuit);
    assert_eq!(alice_summary.reason, TerminationReason::RemoteQuit);
    assert!(bob_rest.contains("Terminated connection with Alice (127.0.0.1)"));
    assert!(alice_rest.contains("Terminated connection by Bob (127.0.0.1)"));
    assert!(!alice_rest.contains("~quit"));

    Ok(())
}

#[tokio::test]
async fn interrupt_notifies_the_peer() -> Result<()> {
    let (stop_alice, alice_interrupt) = oneshot::channel::<()>();
    let (bob, alice) = pair(std::future::pending(), async move {
        let _ = alice_interrupt.await;
    })
    .await?;

    let _ = stop_alice.send(());

    let (alice_summary, alice_rest) = alice.finish().await?;
    let (bob_summary, bob_rest) = bob.finish().await?;

    assert_eq!(alice_summary.reason, TerminationReason::Interrupted);
    assert_eq!(bob_summary.reason, TerminationReason::RemoteQuit);
    assert!(alice_rest.contains("Terminated connection with Bob (127.0.0.1)"));
    assert!(bob_rest.contains("Terminated connection by Alice (127.0.0.1)"));

    Ok(())
}

#[tokio::test]
async fn longest_line_arrives_intact_and_longer_lines_are_cut() -> Result<()> {
    let (mut bob, mut alice) = pair(std::future::pending(), std::future::pending()).await?;

    let longest = "x".repeat(MAX_MSG_SIZE - 2);
    alice.type_line(&format!("{longest}\n")).await?;
    bob.expect_screen(&format!("<Alice>: {longest}\n<Bob>: "))
        .await?;

    let overlong = "y".repeat(MAX_MSG_SIZE * 2);
    alice.type_line(&format!("{overlong}\n")).await?;
    let seen = bob
        .expect_screen(&format!("<Alice>: {}\n<Bob>: ", &overlong[..MAX_MSG_SIZE - 2]))
        .await?;
    assert!(!seen.contains(&"y".repeat(MAX_MSG_SIZE - 1)));

    alice.type_line("~quit\n").await?;
    let (alice_summary, _) = alice.finish().await?;
    let (bob_summary, _) = bob.finish().await?;
    assert_eq!(alice_summary.reason, TerminationReason::LocalQuit);
    assert_eq!(bob_summary.reason, TerminationReason::RemoteQuit);

    Ok(())
}

#[tokio::test]
async fn session_reports_closed_after_shutdown() -> Result<()> {
    let listener = Listener::bind(0)?;
    let port = listener.local_addr()?.port();

    let bob = tokio::spawn(async move {
        let endpoint = listener.accept_one().await?;
        Session::start(endpoint, Role::Listening, Console::new(tokio::io::sink(), identity("Bob"))).await
    });
    let alice_endpoint = endpoint::connect("127.0.0.1", port).await?;
    let alice = Session::start(
        alice_endpoint,
        Role::Connecting,
        Console::new(tokio::io::sink(), identity("Alice")),
    )
    .await?;
    let bob = timeout(WAIT, bob).await???;

    let mut alice_state = alice.subscribe();
    let (mut alice_keyboard, alice_session) = launch(alice, std::future::pending());
    let (_bob_keyboard, bob_session) = launch(bob, std::future::pending());

    alice_keyboard.write_all(b"~quit\n").await?;

    let alice_summary = timeout(WAIT, alice_session).await??;
    let bob_summary = timeout(WAIT, bob_session).await??;

    assert_eq!(alice_summary.reason, TerminationReason::LocalQuit);
    assert_eq!(bob_summary.reason, TerminationReason::RemoteQuit);
    assert_eq!(*alice_state.borrow_and_update(), SessionState::Closed);

    Ok(())
}
