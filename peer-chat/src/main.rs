use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use peer_chat::{
    cli::{Cli, Command},
    console::Console,
    endpoint,
    error::ChatError,
    handshake::Role,
    protocol::Identity,
    session::Session,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(cli));
    // A pending stdin read lives on a blocking thread; do not wait for it.
    runtime.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err
                .downcast_ref::<ChatError>()
                .map(ChatError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut input = BufReader::new(tokio::io::stdin());
    let local = resolve_identity(cli.command.name(), &mut input).await?;

    let (endpoint, role) = match cli.command {
        Command::Listen(args) => {
            (endpoint::listen_and_accept(args.port).await?, Role::Listening)
        }
        Command::Connect(args) => {
            let address = args.address.to_string();
            (endpoint::connect(&address, args.port).await?, Role::Connecting)
        }
    };

    let session = Session::start(endpoint, role, Console::stdout(local)).await?;
    let summary = session.run_until_ctrl_c(input).await;
    info!(reason = ?summary.reason, remote = %summary.remote, "chat finished");

    Ok(())
}

async fn resolve_identity<R>(name: Option<&str>, input: &mut R) -> Result<Identity>
where
    R: AsyncBufRead + Unpin,
{
    if let Some(name) = name {
        return Ok(Identity::new(name)?);
    }

    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Please enter a username: ").await?;
    stdout.flush().await?;

    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .await
        .context("failed to read username")?;
    if read == 0 {
        warn!("standard input closed before a username was entered");
    }
    Ok(Identity::new(&line)?)
}
