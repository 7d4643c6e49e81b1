use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use keyparse::config::KeyparseConfig;
use keyparse::device::{self, BY_ID_DIR};
use keyparse::dispatch::UinputDispatcher;
use keyparse::prelude::*;
use keyparse::source::EvdevSource;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Remaps keys on one input device by matching patterns in its event stream.
#[derive(Debug, Parser)]
#[command(name = "keyparsed", version, about)]
struct Cli {
    /// Regular expression searched for in input device names.
    /// Defaults to `device.pattern` from the configuration.
    pattern: Option<String>,

    /// Configuration file. Defaults to `keyparse.toml` if present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print every input device and exit.
    #[arg(long)]
    list: bool,

    /// Raise log verbosity (-v debug, -vv trace). `RUST_LOG` wins if set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // 1. Initialize structured logging.
    init_tracing(cli.verbose);

    if cli.list {
        print_devices();
        return Ok(ExitCode::SUCCESS);
    }

    // 2. Load configuration and build the layout.
    let config = KeyparseConfig::load(cli.config.as_deref())?;
    let layout = config.layout()?;
    for rule in layout.rules() {
        info!("Rule {:?} => {}", rule.name, rule.action);
    }

    // 3. Resolve exactly one device.
    let pattern = cli.pattern.unwrap_or_else(|| config.device.pattern.clone());
    let selected = match device::select_device(&pattern) {
        Ok(selected) => selected,
        Err(e) => {
            report_selection_error(&e);
            return Ok(ExitCode::FAILURE);
        }
    };
    info!(
        "Using {} ({})",
        selected.name.cyan(),
        selected.path.display()
    );

    // 4. Wire the source and the dispatcher into the engine.
    let source = EvdevSource::open(selected.device)?;
    let dispatcher = UinputDispatcher::new(&config.device.virtual_name)?;
    let mut engine = KeyparseEngine::new(layout, dispatcher, &config.engine);
    spawn_event_listener(&engine);

    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.send(()).ok();
        }
    });

    // 5. Run until Ctrl+C or until the device goes away.
    match engine.run(source).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(fault) => {
            eprintln!("{} {}", "error:".red().bold(), fault);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Logs every rule that fires.
fn spawn_event_listener<D: Dispatcher>(engine: &KeyparseEngine<D>) {
    let mut engine_rx = engine.subscribe_engine_events();
    tokio::spawn(async move {
        while let Ok(event) = engine_rx.recv().await {
            match event {
                EngineEvent::RuleFired { fired, .. } => {
                    info!("[FIRED] {} => {}", fired.rule, fired.action)
                }
                EngineEvent::SourceFaulted { reason } => warn!("[SOURCE] {}", reason),
                _ => {}
            }
        }
    });
}

fn print_devices() {
    for device in device::list_devices() {
        println!("{}  {}", device.path.display().to_string().dimmed(), device.name);
    }
}

fn report_selection_error(error: &ConfigurationError) {
    eprintln!("{} {}", "error:".red().bold(), error);
    match error {
        ConfigurationError::NoDeviceMatched { available, .. } => {
            eprintln!("Available devices:");
            for name in available {
                eprintln!("  {}", name);
            }
            let by_id = device::by_id_listing(Path::new(BY_ID_DIR));
            if !by_id.is_empty() {
                eprintln!("Check {}:", BY_ID_DIR);
                for line in by_id {
                    eprintln!("  {}", line.dimmed());
                }
            }
        }
        ConfigurationError::AmbiguousDevice { candidates, .. } => {
            eprintln!("Matching devices (narrow the pattern to pick one):");
            for name in candidates {
                eprintln!("  {}", name.yellow());
            }
        }
        _ => {}
    }
}
