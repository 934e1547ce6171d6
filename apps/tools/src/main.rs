//! Local console front end: each stdin line is a chat message from a
//! participant, and every notification the coordinator publishes is printed,
//! including turn expiries that happen while the console is idle.

use std::time::Duration;

use anyhow::{Context, Result};
use chat_api::{parse_command, render, ChatCommand, ChatContext};
use clap::Parser;
use shared::{
    domain::{Participant, ParticipantId, ScopeId},
    protocol::ScopedNotification,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use turns::{CoordinatorConfig, TimerService, TurnCoordinator};

#[derive(Parser, Debug)]
struct Cli {
    /// Scope every message is sent to.
    #[arg(long, default_value_t = 1)]
    scope: i64,
    #[arg(long, default_value_t = 600)]
    turn_seconds: u64,
    #[arg(long)]
    disable_remove: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    anyhow::ensure!(cli.turn_seconds > 0, "--turn-seconds must be positive");

    let (events, mut events_rx) = broadcast::channel(256);
    let coordinator = TurnCoordinator::new(
        CoordinatorConfig {
            turn_duration: Duration::from_secs(cli.turn_seconds),
            remove_enabled: !cli.disable_remove,
        },
        TimerService::current()?,
        events,
    );
    let chat = ChatContext::new(coordinator);
    let scope = ScopeId(cli.scope);

    println!("scope {scope}: enter `<participant_id> <label> <message>`, e.g. `1 alice /join`");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if let Err(err) = handle_line(&chat, scope, &line, &mut events_rx) {
                    println!("! {err}");
                }
            }
            event = events_rx.recv() => match event {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    println!("! {skipped} notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

fn handle_line(
    chat: &ChatContext,
    scope: ScopeId,
    line: &str,
    events_rx: &mut broadcast::Receiver<ScopedNotification>,
) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    let mut parts = line.splitn(3, char::is_whitespace);
    let id = parts
        .next()
        .unwrap_or_default()
        .parse::<i64>()
        .context("participant id must be a number")?;
    let label = parts.next().context("missing label")?;
    let text = parts.next().context("missing message")?;

    let command = parse_command(text)?;
    let reply = chat.execute(
        scope,
        Participant::new(ParticipantId(id), label),
        command,
    );

    // The command's own notifications were published before `execute`
    // returned; print them ahead of the listing.
    while let Ok(event) = events_rx.try_recv() {
        print_event(&event);
    }
    match command {
        ChatCommand::Help => println!("{}", render::help_text(chat.coordinator.remove_enabled())),
        ChatCommand::RemoveUsage => {
            println!("{}", render::remove_usage(chat.coordinator.remove_enabled()))
        }
        _ => {}
    }
    if let Some(listing) = &reply.queue {
        println!("{}", render::render_queue(listing));
    }
    Ok(())
}

fn print_event(event: &ScopedNotification) {
    println!(
        "[{}] {}",
        event.emitted_at.format("%H:%M:%S"),
        render::render_notification(&event.notification)
    );
}
