//! Autoplay CLI: operate the perceive-decide-act game loop.
//!
//! Talks to the game bridge directly for smoke tests and debug toggles, and
//! runs the loop with file-backed collaborators behind a stdin console.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes
#![allow(clippy::fn_params_excessive_bools)] // CLI flags are naturally bools

use autoplay::agent::{
    AgentContext, AgentController, DryRunActuator, EventDispatch, LoopConfig, ScriptedDecisions,
    StaticCapture,
};
use autoplay::bridge::{BridgeClient, BridgeClientConfig};
use autoplay::config::{load_config, AppConfig};
use autoplay::recorder::{RunPaths, StepRecorder};
use autoplay::{Action, AgentError, AgentResult};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use miette::{IntoDiagnostic, Result};
use serde_json::{Map, Value};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

mod console;

use console::ConsoleCommand;

const CONSOLE_POLL: Duration = Duration::from_millis(200);

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Debug, Parser)]
#[command(name = "autoplay", version, about = "Perceive-decide-act game loop")]
struct Cli {
    /// Control color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ping the bridge, then poll ping/state/events repeatedly
    BridgeTest {
        #[arg(long, help = "Config file (.yaml, .yml or .json)")]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 100)]
        iterations: u32,
        #[arg(long)]
        json: bool,
    },
    /// Toggle the bridge's debug overlay
    SetDebug {
        #[arg(long, help = "Config file (.yaml, .yml or .json)")]
        config: Option<PathBuf>,
        #[arg(long, conflicts_with = "off")]
        on: bool,
        #[arg(long)]
        off: bool,
        #[arg(long)]
        json: bool,
    },
    /// Run the loop with scripted decisions, a static screenshot and a dry-run actuator
    Run {
        #[arg(long, help = "Config file (.yaml, .yml or .json)")]
        config: Option<PathBuf>,
        #[arg(long, help = "NDJSON file with one decision per line")]
        decisions: PathBuf,
        #[arg(long, help = "Image served as every screenshot")]
        screenshot: PathBuf,
        #[arg(long, help = "Replay the decisions file from the top when exhausted")]
        cycle: bool,
        #[arg(long, help = "Start the loop without waiting for a console command")]
        autostart: bool,
    },
    /// Validate an action and print its normalized form
    ValidateAction {
        action: String,
        #[arg(long)]
        json: bool,
    },
    /// Print the default configuration
    ConfigExample {
        #[arg(long, help = "Output as JSON (default: YAML)")]
        json: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        #[arg(value_enum, help = "Shell to generate completions for")]
        shell: Shell,
    },
}

/// Configure color output based on CLI flag and environment
fn configure_colors(mode: ColorMode) -> bool {
    let use_color = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            // Respect NO_COLOR environment variable
            if std::env::var("NO_COLOR").is_ok() {
                false
            } else {
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    };

    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(use_color)
                .unicode(use_color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set

    use_color
}

/// Log to stderr, and to `log_file` without ANSI codes when given.
fn init_logging(verbose: bool, color: bool, log_file: Option<File>) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_ansi(color)
        .with_writer(io::stderr);
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let color = configure_colors(cli.color);
    match cli.command {
        Commands::BridgeTest {
            config,
            iterations,
            json,
        } => {
            init_logging(cli.verbose, color, None);
            cmd_bridge_test(config, iterations, json)
        }
        Commands::SetDebug {
            config,
            on,
            off,
            json,
        } => {
            init_logging(cli.verbose, color, None);
            cmd_set_debug(config, on, off, json)
        }
        Commands::Run {
            config,
            decisions,
            screenshot,
            cycle,
            autostart,
        } => cmd_run(
            config,
            &decisions,
            screenshot,
            cycle,
            autostart,
            cli.verbose,
            color,
        ),
        Commands::ValidateAction { action, json } => cmd_validate_action(&action, json),
        Commands::ConfigExample { json } => cmd_config_example(json),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_bridge_test(config: Option<PathBuf>, iterations: u32, json: bool) -> Result<()> {
    let config = match load_optional_config(config.as_deref()) {
        Ok(config) => config,
        Err(err) => return emit_error(json, &err),
    };
    let client = BridgeClient::new(BridgeClientConfig::from(&config.bridge));
    let started = Instant::now();
    let outcome = exercise_bridge(&client, iterations);
    client.close();
    if let Err(err) = outcome {
        return emit_error(json, &err);
    }

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    if json {
        let summary = serde_json::json!({
            "ok": true,
            "iterations": iterations,
            "elapsed_ms": elapsed_ms,
        });
        println!("{summary}");
    } else {
        eprintln!("bridge ok: {iterations} iterations in {elapsed_ms} ms");
    }
    Ok(())
}

fn exercise_bridge(client: &BridgeClient, iterations: u32) -> AgentResult<()> {
    client.ping()?;
    for _ in 0..iterations {
        client.ping()?;
        client.get_state()?;
        client.get_events()?;
    }
    Ok(())
}

fn cmd_set_debug(config: Option<PathBuf>, on: bool, off: bool, json: bool) -> Result<()> {
    if on == off {
        return emit_cli_error(json, "set-debug requires exactly one of --on or --off");
    }
    let config = match load_optional_config(config.as_deref()) {
        Ok(config) => config,
        Err(err) => return emit_error(json, &err),
    };
    let client = BridgeClient::new(BridgeClientConfig::from(&config.bridge));
    if let Err(err) = client.set_debug(on) {
        return emit_error(json, &err);
    }
    if json {
        println!("{}", serde_json::json!({ "ok": true, "debug": on }));
    } else {
        eprintln!("bridge debug {}", if on { "enabled" } else { "disabled" });
    }
    Ok(())
}

fn cmd_run(
    config: Option<PathBuf>,
    decisions: &Path,
    screenshot: PathBuf,
    cycle: bool,
    autostart: bool,
    verbose: bool,
    color: bool,
) -> Result<()> {
    let (config, paths, decisions) = match prepare_run(config.as_deref(), decisions, cycle) {
        Ok(prepared) => prepared,
        Err(err) => return emit_error(false, &err),
    };

    let log_file = File::create(paths.log_file()).into_diagnostic()?;
    init_logging(verbose, color, Some(log_file));
    tracing::info!(
        run_id = %paths.run_id,
        log_file = %paths.log_file().display(),
        decisions = decisions.len(),
        "run prepared"
    );

    let context = AgentContext {
        bridge: Arc::new(BridgeClient::new(BridgeClientConfig::from(&config.bridge))),
        capture: Arc::new(StaticCapture::new(screenshot)),
        decisions: Arc::new(decisions),
        actuator: Arc::new(DryRunActuator::new()),
        events: Some(log_events()),
        recorder: StepRecorder::new(paths),
        rules_text: config.agent.rules_text.clone(),
    };
    let controller = AgentController::new(context, LoopConfig::from(&config.agent));

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)).into_diagnostic()?;

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || console::pump(io::stdin().lock(), &tx));

    if autostart {
        controller.start()?;
    }
    loop {
        if interrupted.load(Ordering::SeqCst) {
            tracing::info!("interrupted");
            break;
        }
        match rx.recv_timeout(CONSOLE_POLL) {
            Ok(ConsoleCommand::Quit) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(command) => handle_console(&controller, command)?,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    controller.stop();
    tracing::info!("run finished");
    Ok(())
}

fn prepare_run(
    config: Option<&Path>,
    decisions: &Path,
    cycle: bool,
) -> AgentResult<(AppConfig, RunPaths, ScriptedDecisions)> {
    let config = load_optional_config(config)?;
    let decisions = ScriptedDecisions::load(decisions, cycle)?;
    let paths = RunPaths::create(&config.paths.logs_dir, None)?;
    Ok((config, paths, decisions))
}

fn handle_console(controller: &AgentController, command: ConsoleCommand) -> Result<()> {
    match command {
        ConsoleCommand::Start => {
            if let Err(err) = controller.start() {
                eprintln!("error: {err}");
            }
        }
        ConsoleCommand::Pause => controller.pause(),
        ConsoleCommand::Resume => controller.resume(),
        ConsoleCommand::Stop => controller.stop(),
        ConsoleCommand::Status => {
            let payload = serde_json::to_string(&controller.get_status()).into_diagnostic()?;
            println!("{payload}");
        }
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

/// Event handler for the dry run: each event becomes a log line.
fn log_events() -> Arc<dyn EventDispatch> {
    Arc::new(
        |events: &[Map<String, Value>], _: &Map<String, Value>, _: &[u8]| -> AgentResult<()> {
            for event in events {
                let kind = event.get("type").and_then(Value::as_str).unwrap_or("unknown");
                let rendered = Value::Object(event.clone()).to_string();
                tracing::info!(kind, event = %rendered, "game event");
            }
            Ok(())
        },
    )
}

fn cmd_validate_action(action: &str, json: bool) -> Result<()> {
    match Action::from_json_str(action) {
        Ok(action) => {
            let payload = serde_json::to_string(&action).into_diagnostic()?;
            println!("{payload}");
            Ok(())
        }
        Err(err) => emit_error(json, &err),
    }
}

fn cmd_config_example(json: bool) -> Result<()> {
    let config = AppConfig::default();
    if json {
        let payload = serde_json::to_string_pretty(&config).into_diagnostic()?;
        println!("{payload}");
    } else {
        let payload = serde_yml::to_string(&config).into_diagnostic()?;
        print!("{payload}");
    }
    Ok(())
}

fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn load_optional_config(path: Option<&Path>) -> AgentResult<AppConfig> {
    match path {
        Some(path) => load_config(path),
        None => {
            let config = AppConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn emit_error(json: bool, err: &AgentError) -> Result<()> {
    if json {
        let payload = serde_json::to_string(&err.to_error_info()).into_diagnostic()?;
        println!("{payload}");
    } else {
        eprintln!("error: {err}");
        if let Some(context) = err.context.as_ref() {
            eprintln!("  context: {context}");
        }
    }
    std::process::exit(exit_code_for_error(err));
}

fn emit_cli_error(json: bool, message: &str) -> Result<()> {
    emit_error(json, &AgentError::cli_invalid_arg(message))
}

fn exit_code_for_error(err: &AgentError) -> i32 {
    err.exit_code()
}
