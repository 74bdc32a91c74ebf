//! Console front end of a loading lobby: ticks the engine each frame and
//! turns typed lines into lobby actions.

use std::time::{Duration, Instant};

use cncnet_loading::{EngineState, GameLoadingSyncEngine, LobbyEvent, LoadingTransport};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::command::Command;

/// Engine tick period.
const FRAME: Duration = Duration::from_millis(16);

/// Forward stdin lines until EOF.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Run the lobby until the session terminates.
pub async fn run<T: LoadingTransport>(
    mut engine: GameLoadingSyncEngine<T>,
    mut input: mpsc::UnboundedReceiver<String>,
) {
    let mut interval = tokio::time::interval(FRAME);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut input_open = true;

    print_players(&engine);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            line = input.recv(), if input_open => match line {
                Some(line) => {
                    if let Some(command) = Command::parse(&line) {
                        execute(&mut engine, command);
                    }
                }
                None => input_open = false,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                engine.leave();
            }
        }

        engine.tick(Instant::now());
        for event in engine.drain_events() {
            report(&engine, event);
        }
        if engine.state() == EngineState::Terminated {
            break;
        }
    }
}

fn execute<T: LoadingTransport>(engine: &mut GameLoadingSyncEngine<T>, command: Command) {
    match command {
        Command::Load => engine.click_load(),
        Command::SelectSave(index) => {
            if let Err(e) = engine.select_save(index) {
                println!("! {e}");
            }
        }
        Command::ListSaves => {
            for (i, save) in engine.saved_games().iter().enumerate() {
                let marker = if i == engine.save_index() { '*' } else { ' ' };
                println!("{marker} {i}: {}", save.file_name);
            }
        }
        Command::Players => print_players(engine),
        Command::Tunnel(tunnel) => {
            if let Err(e) = engine.change_tunnel(&tunnel) {
                println!("! {e}");
            }
        }
        Command::Kick(name) => {
            if let Err(e) = engine.kick_player(&name) {
                println!("! {e}");
            }
        }
        Command::Quit => engine.leave(),
        Command::Chat(text) => engine.send_chat(&text),
        Command::Invalid(usage) => println!("! {usage}"),
    }
}

fn report<T: LoadingTransport>(engine: &GameLoadingSyncEngine<T>, event: LobbyEvent) {
    match event {
        LobbyEvent::StateChanged(state) => tracing::debug!("Lobby state: {state:?}"),
        LobbyEvent::PlayersChanged => print_players(engine),
        LobbyEvent::SaveIndexChanged(index) => {
            if let Some(save) = engine.saved_games().get(index) {
                println!("Saved game: {}", save.file_name);
            }
        }
        LobbyEvent::Notice(text) => println!("* {text}"),
        LobbyEvent::Chat { sender, text, .. } => println!("<{sender}> {text}"),
        LobbyEvent::PlayAttentionSound => print!("\x07"),
        LobbyEvent::FlashWindow => {}
        LobbyEvent::LoadBlocked(reason) => println!("! {reason}"),
        LobbyEvent::LoadUnblocked => println!("* Loading is enabled again."),
        LobbyEvent::GameLaunched => println!("* Game started."),
        LobbyEvent::GameExited { code } => tracing::info!("Game exited with {code:?}"),
        LobbyEvent::Left { reason } => println!("* {reason}"),
    }
}

fn print_players<T: LoadingTransport>(engine: &GameLoadingSyncEngine<T>) {
    let present: Vec<String> = engine
        .players()
        .iter()
        .map(|p| {
            let ready = if p.ready { "ready" } else { "not ready" };
            format!("{} ({ready})", p.name)
        })
        .collect();
    let missing: Vec<&str> = engine
        .roster()
        .iter()
        .filter(|r| !engine.players().iter().any(|p| p.name == r.name))
        .map(|r| r.name.as_str())
        .collect();
    println!("Players: {}", present.join(", "));
    if !missing.is_empty() {
        println!("Waiting for: {}", missing.join(", "));
    }
}
