//! Point-to-point terminal chat over a single TCP connection.
//!
//! One side listens and accepts exactly one peer, the other dials it. After a
//! username handshake both sides exchange fixed-size line frames until either
//! user types `~quit` or presses Ctrl-C. Each module owns one concern:
//!
//! - [`cli`] parses the `listen` / `connect` command line.
//! - [`endpoint`] wraps the TCP connection: dialing with retry, one-shot
//!   accept, frame send and receive.
//! - [`handshake`] swaps usernames in a fixed order so neither side waits on
//!   the other forever.
//! - [`protocol`] holds the frame format, the reserved quit command and the
//!   bounded [`protocol::Message`] / [`protocol::Identity`] types.
//! - [`console`] draws prompts and received lines on the terminal.
//! - [`pump`] runs the sender and receiver loops.
//! - [`session`] supervises the pumps and performs shutdown.
//! - [`error`] lists the fatal startup errors and their exit statuses.

pub mod cli;
pub mod console;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod pump;
pub mod session;
