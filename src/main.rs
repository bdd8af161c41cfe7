//! poolvisor - interactive worker-pool supervisor

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use poolvisor::command::{self, Command, HELP};
use poolvisor::logging::{self, LogConfig};
use poolvisor::{
    CommandLauncher, EventKind, LogWriter, Subscribe, Supervisor, SupervisorError,
    wait_for_shutdown_signal,
};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LogConfig::from_verbosity(cli.verbose).with_env_overrides());

    match &cli.command {
        Some(Commands::Role(args)) => {
            poolvisor::run_role(args.role()).await?;
            Ok(())
        }
        None => cmd_interactive(&cli).await,
    }
}

async fn cmd_interactive(cli: &Cli) -> Result<()> {
    let launcher = match &cli.worker_program {
        Some(program) => CommandLauncher::new(program).args(&cli.worker_args),
        None => CommandLauncher::current_exe().context("cannot locate own executable")?,
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let sup = Supervisor::builder(cli.config())
        .with_launcher(launcher)
        .with_subscribers(subs)
        .build();

    if cli.exit_on_spawn_failure {
        exit_on_spawn_failure(Arc::clone(&sup));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut signal = std::pin::pin!(wait_for_shutdown_signal());

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            received = &mut signal => {
                let name = received.context("failed to install signal handlers")?;
                tracing::info!(signal = name, "shutdown signal received");
                break;
            }
        };
        let Some(line) = line else { break };

        let cmd = match command::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };
        if cmd == Command::Quit {
            break;
        }
        if let Err(e) = execute(&sup, cmd).await {
            eprintln!("error[{}]: {e}", e.as_label());
        }
    }

    sup.shutdown().await?;
    Ok(())
}

async fn execute(sup: &Supervisor, cmd: Command) -> Result<(), SupervisorError> {
    match cmd {
        Command::CreateServer { name, min, max } => {
            let id = sup.create_server(&name, min, max).await?;
            println!("server {id} created");
        }
        Command::CreateWorker { server } => {
            let worker = sup.create_worker(&server).await?;
            println!("worker {worker} created");
        }
        Command::AbortServer { server } => {
            sup.abort_server(&server).await?;
            println!("server {server} aborted");
        }
        Command::AbortWorker { server } => {
            sup.abort_worker(&server).await?;
            println!("worker of {server} aborted");
        }
        Command::Status => println!("{}", sup.status().await),
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

fn exit_on_spawn_failure(sup: Arc<Supervisor>) {
    let mut rx = sup.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) if ev.kind == EventKind::SpawnFailed => {
                    let role = ev.server.as_deref().unwrap_or("?");
                    let reason = ev.reason.as_deref().unwrap_or("unknown error");
                    eprintln!("fatal: spawn failed for {role}: {reason}");
                    // Reap every child before leaving; `exit` skips destructors.
                    if let Err(e) = sup.shutdown().await {
                        eprintln!("error[{}]: {e}", e.as_label());
                    }
                    std::process::exit(1);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });
}
