//! Clinic CLI - live department boards and ticket chat in the terminal

mod render;

use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use clinic_sync::session::Completion;
use clinic_sync::{Input, SyncConfig, SyncSession};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "clinic")]
#[command(about = "Terminal client for hospital queues and support tickets")]
#[command(version)]
struct Cli {
    /// REST base URL (default: http://localhost:3000/api)
    #[arg(long, env = "CLINIC_API_URL")]
    api: Option<String>,

    /// WebSocket URL (default: ws://localhost:3000/ws)
    #[arg(long, env = "CLINIC_WS_URL")]
    ws: Option<String>,

    /// Seconds between department snapshot refreshes
    #[arg(long, env = "CLINIC_REFRESH_SECS")]
    refresh_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow one department's queue live
    Watch {
        /// Department ID
        department: String,
    },

    /// List your ticket threads
    Threads,

    /// Open a ticket thread and chat interactively
    Chat {
        /// Thread ID
        thread: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinic=info,clinic_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    let mut config = SyncConfig::from_env();
    if let Some(api) = cli.api {
        config.api_url = api;
    }
    if let Some(ws) = cli.ws {
        config.ws_url = ws;
    }
    if let Some(secs) = cli.refresh_secs.filter(|secs| *secs > 0) {
        config.refresh_interval = Duration::from_secs(secs);
    }

    match cli.command {
        Commands::Watch { department } => run_watch(&config, &department).await,
        Commands::Threads => run_threads(&config).await,
        Commands::Chat { thread } => run_chat(&config, &thread).await,
    }
}

fn print_notices(session: &mut SyncSession) {
    for notice in session.take_notices() {
        eprintln!("{}", render::notice(&notice));
    }
}

async fn run_watch(config: &SyncConfig, department_id: &str) -> Result<()> {
    let mut session = SyncSession::connect(config);
    session.open_department(department_id);
    tracing::info!(department = department_id, "Watching department");

    let mut refresh = tokio::time::interval(config.refresh_interval);
    refresh.tick().await;

    let mut last_line = String::new();
    loop {
        tokio::select! {
            input = session.next_input() => {
                let Some(input) = input else { break };
                if !session.apply(input) {
                    break;
                }
            }
            _ = refresh.tick() => session.refresh_departments(),
            _ = tokio::signal::ctrl_c() => break,
        }

        print_notices(&mut session);
        if let Some(status) = session.department(department_id) {
            let line = render::department(status);
            if line != last_line {
                println!("{}", line);
                last_line = line;
            }
        }
    }

    Ok(())
}

/// Apply inputs until the thread list request completes
async fn wait_for_threads(session: &mut SyncSession) -> bool {
    session.refresh_threads();
    tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(input) = session.next_input().await {
            let done = matches!(input, Input::Completed(Completion::Threads(_)));
            session.apply(input);
            if done {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false)
}

async fn run_threads(config: &SyncConfig) -> Result<()> {
    let mut session = SyncSession::connect(config);
    let loaded = wait_for_threads(&mut session).await;

    print_notices(&mut session);
    if !loaded {
        bail!("Timed out loading threads");
    }

    let threads = session.threads();
    if threads.is_empty() {
        println!("No threads found.");
    } else {
        println!("Threads:");
        println!("{:─<60}", "");
        for thread in threads {
            println!("  {}", render::thread(thread));
        }
    }
    Ok(())
}

async fn run_chat(config: &SyncConfig, thread_id: &str) -> Result<()> {
    let mut session = SyncSession::connect(config);
    let loaded = wait_for_threads(&mut session).await;
    print_notices(&mut session);
    if !loaded {
        bail!("Timed out loading threads");
    }
    if session.thread(thread_id).is_none() {
        bail!("Unknown thread {}", thread_id);
    }
    session.open_thread(thread_id);

    println!("Chatting in {} (/close to close the ticket, /quit to leave)", thread_id);

    let mut transcript = render::Transcript::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            input = session.next_input() => {
                let Some(input) = input else { break };
                if !session.apply(input) {
                    break;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "/quit" => break,
                    "/close" => {
                        if let Err(e) = session.close(thread_id) {
                            eprintln!("Cannot close: {}", e);
                        }
                    }
                    "/read" => {
                        let ids = transcript.unread_from(session.messages(thread_id), config.local_role);
                        session.mark_read(thread_id, &ids);
                    }
                    "" => {}
                    text => {
                        if let Err(e) = session.send(thread_id, text) {
                            eprintln!("Not sent: {}", e);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }

        print_notices(&mut session);
        transcript.print_new(session.messages(thread_id));
    }

    session.leave_thread();
    Ok(())
}
