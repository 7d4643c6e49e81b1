use anyhow::Result;
use colored::Colorize;
use keyparse::prelude::*;
use keyparse::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Colors the command word of each line.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.green()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", "keyshell".cyan().bold());
    println!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "Synthetic key events in, fired rules out.".dimmed());
    println!("{}", "-".repeat(64).dimmed());
}

/// Shared view of the engine, fed by the listener task.
struct ShellState {
    show_cycles: AtomicBool,
    live: AtomicUsize,
    fired: AtomicUsize,
}

fn spawn_event_listener<D: Dispatcher>(engine: &KeyparseEngine<D>, state: Arc<ShellState>) {
    let mut engine_rx = engine.subscribe_engine_events();
    tokio::spawn(async move {
        while let Ok(event) = engine_rx.recv().await {
            match event {
                EngineEvent::RuleFired { fired, at } => {
                    state.fired.fetch_add(1, Ordering::Relaxed);
                    println!(
                        "<-- [FIRED] {} => {} ({})",
                        fired.rule.cyan(),
                        fired.action,
                        at.format("%H:%M:%S%.3f")
                    );
                }
                EngineEvent::CycleCompleted {
                    live,
                    completed,
                    failed,
                } => {
                    state.live.store(live, Ordering::Relaxed);
                    if state.show_cycles.load(Ordering::Relaxed) {
                        println!(
                            "<-- [CYCLE] live={} completed={} failed={}",
                            live, completed, failed
                        );
                    }
                }
                EngineEvent::SourceFaulted { reason } => {
                    println!("<-- [SOURCE] {}", reason.red());
                }
                other => println!("<-- [ENGINE] {:?}", other),
            }
        }
    });
}

fn parse_key(args: &[&str]) -> Option<KeyCode> {
    let name = args.get(1)?;
    match name.parse::<KeyCode>() {
        Ok(code) => Some(code),
        Err(e) => {
            println!("Error: {}", e);
            None
        }
    }
}

async fn send(events: &mpsc::Sender<KeyEvent>, event: KeyEvent) {
    if events.send(event).await.is_err() {
        println!("--> Engine is no longer running.");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = KeyparseConfig::load(config_path.as_deref())?;
    let layout = config.layout()?;
    let rule_lines: Vec<String> = layout
        .rules()
        .iter()
        .map(|rule| format!("{:<20} => {}", rule.name, rule.action))
        .collect();

    let mut engine = KeyparseEngine::new(layout, LogDispatcher, &config.engine);
    let shutdown = engine.shutdown_handle();
    let state = Arc::new(ShellState {
        show_cycles: AtomicBool::new(false),
        live: AtomicUsize::new(0),
        fired: AtomicUsize::new(0),
    });
    spawn_event_listener(&engine, state.clone());

    let (events, source) = ChannelSource::new(config.engine.channel_capacity.max(1));
    info!("Spawning {} in the background...", ENGINE_NAME.cyan());
    tokio::spawn(async move {
        if let Err(e) = engine.run(source).await {
            eprintln!("\nEngine stopped with an error: {}", e);
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter));

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();
                let Some(command) = args.first() else {
                    continue;
                };
                match *command {
                    "down" | "up" | "repeat" => {
                        let edge = match *command {
                            "down" => Edge::Down,
                            "up" => Edge::Up,
                            _ => Edge::Repeat,
                        };
                        match parse_key(&args) {
                            Some(code) => {
                                send(&events, KeyEvent::key(code, edge, chrono::Utc::now())).await
                            }
                            None => println!("Usage: {} <KEY>", command),
                        }
                    }
                    "tap" => match parse_key(&args) {
                        Some(code) => {
                            send(&events, KeyEvent::down(code)).await;
                            send(&events, KeyEvent::up(code)).await;
                        }
                        None => println!("Usage: tap <KEY>"),
                    },
                    "rules" => {
                        println!("Active rules:");
                        for line in &rule_lines {
                            println!("  {}", line);
                        }
                    }
                    "status" => {
                        println!(
                            "--> {} live matchers, {} rules fired so far.",
                            state.live.load(Ordering::Relaxed),
                            state.fired.load(Ordering::Relaxed)
                        );
                    }
                    "start" => {
                        if let Some(&"cycles") = args.get(1) {
                            state.show_cycles.store(true, Ordering::Relaxed);
                            println!("--> Started printing scheduler cycles.");
                        } else {
                            println!("Unknown 'start' command. Try 'start cycles'.");
                        }
                    }
                    "stop" => {
                        if let Some(&"cycles") = args.get(1) {
                            state.show_cycles.store(false, Ordering::Relaxed);
                            println!("--> Stopped printing scheduler cycles.");
                        } else {
                            println!("Unknown 'stop' command. Try 'stop cycles'.");
                        }
                    }
                    "help" => {
                        println!("Available commands:");
                        println!("  down <KEY>     - Sends a key press, e.g. 'down KEY_CAPSLOCK'.");
                        println!("  up <KEY>       - Sends a key release.");
                        println!("  repeat <KEY>   - Sends an autorepeat event.");
                        println!("  tap <KEY>      - Sends a press followed by a release.");
                        println!("  rules          - Lists the loaded rules.");
                        println!("  status         - Shows live matchers and fired count.");
                        println!("  start cycles   - Prints a summary after every event.");
                        println!("  stop cycles    - Stops printing cycle summaries.");
                        println!("  exit           - Quits the shell.");
                    }
                    "exit" => break,
                    _ => println!("Unknown command: '{}'. Type 'help'.", line),
                }
            }
            Err(_) => break,
        }
    }

    println!("Exiting keyshell...");
    shutdown.send(()).ok();
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
