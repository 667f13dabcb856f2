use anyhow::Result;
use colored::Colorize;
use metroclock::prelude::*;
use metroclock::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use slotmap::{new_key_type, SlotMap};
use std::borrow::Cow;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

new_key_type! {
    /// Identifies one engine instance owned by the shell.
    struct InstanceId;
}

/// An engine instance and the flag controlling its step indicator.
struct Instance {
    engine: MetroEngine,
    watching: Arc<AtomicBool>,
}

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
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
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-".repeat(64).dimmed());
    println!("{}", version_string);
    println!("{}", "-".repeat(64).dimmed());
}

/// Creates an engine from `config` and spawns its step indicator task.
fn spawn_instance(config: MetroConfig, handle: usize) -> Result<Instance> {
    let engine = MetroEngine::new(config)?;
    let watching = Arc::new(AtomicBool::new(false));

    let mut step_rx = engine.subscribe_steps();
    let flag = watching.clone();
    tokio::spawn(async move {
        while let Ok(event) = step_rx.recv().await {
            if flag.load(Ordering::Relaxed) {
                println!("<-- [#{}] step {}", handle, event.step_index.to_string().green().bold());
            }
        }
    });

    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[#{}] {:?}", handle, event);
        }
    });

    Ok(Instance { engine, watching })
}

/// Renders the pattern as a row of cells, marking the next step to commit.
fn render_pattern(pattern: &PatternState, cursor: &SchedulerCursor) -> String {
    pattern
        .mask()
        .iter()
        .enumerate()
        .map(|(i, &on)| {
            let cell = match (on, pattern.is_accent(i)) {
                (true, true) => "X".red().bold(),
                (true, false) => "x".normal(),
                (false, _) => ".".dimmed(),
            };
            if cursor.running && i == cursor.step_index % pattern.step_count() {
                format!("[{}]", cell)
            } else {
                format!(" {} ", cell)
            }
        })
        .collect()
}

fn print_help() {
    println!("Available commands:");
    println!("  new [BPM]             - Creates an engine instance and selects it.");
    println!("  list                  - Shows instances and their handles.");
    println!("  use <H>               - Selects an instance by handle.");
    println!("  drop <H>              - Stops and removes an instance.");
    println!("  start | stop          - Starts or stops the selected instance.");
    println!("  tempo <BPM>           - Sets the tempo (1-300).");
    println!("  steps <N>             - Sets the number of steps (1-128).");
    println!("  spb <N>               - Sets the steps per beat (1-32).");
    println!("  toggle <I>            - Flips step I on or off.");
    println!("  accent on|off         - Accents the first step.");
    println!("  show                  - Prints the selected instance's pattern.");
    println!("  watch on|off          - Prints each step as it sounds.");
    println!("  exit                  - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let config_path = env::args().nth(1).map(PathBuf::from);
    let base_config = MetroConfig::load(config_path.as_deref()).inspect_err(|e| {
        error!("Failed to load configuration: {:#}", e);
    })?;

    // The shell's state management variables.
    let mut instances: SlotMap<InstanceId, Instance> = SlotMap::with_key();
    let mut handles: HashMap<usize, InstanceId> = HashMap::new();
    let mut next_handle: usize = 0;
    let mut current: Option<usize> = None;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(MyHighlighter {}));

    println!("{} shell is ready. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = match current {
            Some(handle) => format!("{}", format!("#{} >> ", handle).cyan().bold()),
            None => format!("{}", ">> ".cyan().bold()),
        };
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting metroshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(&command) = args.first() else {
            continue;
        };

        match command {
            "new" => {
                let mut config = base_config.clone();
                if let Some(bpm_str) = args.get(1) {
                    match bpm_str.parse::<f64>() {
                        Ok(bpm) => config.tempo = bpm,
                        Err(_) => {
                            println!("Error: '{}' is not a valid tempo.", bpm_str);
                            continue;
                        }
                    }
                }
                let handle = next_handle;
                let instance = match spawn_instance(config, handle) {
                    Ok(instance) => instance,
                    Err(e) => {
                        println!("Error: could not create instance: {:#}", e);
                        continue;
                    }
                };
                let tempo = instance.engine.tempo().await;
                handles.insert(handle, instances.insert(instance));
                next_handle += 1;
                current = Some(handle);
                println!("--> Created instance #{} at {} bpm.", handle, tempo);
            }
            "list" => {
                println!("Instances:");
                let mut sorted: Vec<_> = handles.iter().collect();
                sorted.sort_by_key(|(handle, _)| **handle);
                for (handle, id) in sorted {
                    if let Some(instance) = instances.get(*id) {
                        let state = if instance.engine.is_running().await {
                            "running".green()
                        } else {
                            "idle".dimmed()
                        };
                        let marker = if current == Some(*handle) { "*" } else { " " };
                        println!(
                            " {} #{}: {} bpm, {} steps, {}",
                            marker,
                            handle,
                            instance.engine.tempo().await,
                            instance.engine.pattern().await.step_count(),
                            state
                        );
                    }
                }
            }
            "use" | "drop" => {
                let Some(handle) = args.get(1).and_then(|s| s.parse::<usize>().ok()) else {
                    println!("Usage: {} <HANDLE>", command);
                    continue;
                };
                let Some(id) = handles.get(&handle).copied() else {
                    println!("Error: Invalid handle #{}. Use 'list' to see instances.", handle);
                    continue;
                };
                if command == "use" {
                    current = Some(handle);
                    println!("--> Selected instance #{}.", handle);
                } else {
                    if let Some(instance) = instances.remove(id) {
                        instance.engine.stop().await;
                    }
                    handles.remove(&handle);
                    if current == Some(handle) {
                        current = None;
                    }
                    println!("--> Instance #{} removed.", handle);
                }
            }
            "help" => print_help(),
            "exit" => break,
            _ => {
                let Some(instance) = current
                    .and_then(|handle| handles.get(&handle))
                    .and_then(|id| instances.get(*id))
                else {
                    println!("No instance selected. Use 'new' or 'use <HANDLE>' first.");
                    continue;
                };
                run_instance_command(instance, &args).await;
            }
        }
    }

    for (_, instance) in instances.drain() {
        instance.engine.stop().await;
    }
    Ok(())
}

/// Executes a command that targets the selected instance.
async fn run_instance_command(instance: &Instance, args: &[&str]) {
    let engine = &instance.engine;
    match (args[0], args.get(1).copied()) {
        ("start", _) => {
            engine.start().await;
            println!("--> Started.");
        }
        ("stop", _) => {
            engine.stop().await;
            println!("--> Stopped.");
        }
        ("tempo", Some(value)) => match value.parse::<f64>() {
            Ok(bpm) => {
                engine.set_tempo(bpm).await;
                println!("--> Tempo is now {} bpm.", engine.tempo().await);
            }
            Err(_) => println!("Error: '{}' is not a valid tempo.", value),
        },
        ("steps", Some(value)) => match value.parse::<usize>() {
            Ok(n) => {
                engine.set_step_count(n).await;
                println!("--> Pattern has {} steps.", engine.pattern().await.step_count());
            }
            Err(_) => println!("Error: '{}' is not a valid step count.", value),
        },
        ("spb", Some(value)) => match value.parse::<u32>() {
            Ok(n) => {
                engine.set_steps_per_beat(n).await;
                println!("--> {} steps per beat.", engine.pattern().await.steps_per_beat());
            }
            Err(_) => println!("Error: '{}' is not a valid steps-per-beat value.", value),
        },
        ("toggle", Some(value)) => match value.parse::<usize>() {
            Ok(i) => {
                engine.toggle_step(i).await;
                let cursor = engine.cursor().await;
                println!("{}", render_pattern(&engine.pattern().await, &cursor));
            }
            Err(_) => println!("Error: '{}' is not a valid step index.", value),
        },
        ("accent", Some("on")) => engine.set_accent_first_step(true).await,
        ("accent", Some("off")) => engine.set_accent_first_step(false).await,
        ("watch", Some("on")) => {
            instance.watching.store(true, Ordering::Relaxed);
            println!("--> Watching steps.");
        }
        ("watch", Some("off")) => {
            instance.watching.store(false, Ordering::Relaxed);
            println!("--> Stopped watching steps.");
        }
        ("show", _) => {
            let pattern = engine.pattern().await;
            let cursor = engine.cursor().await;
            println!(
                "{} bpm, {} steps, {} per beat, {}",
                cursor.tempo,
                pattern.step_count(),
                pattern.steps_per_beat(),
                if cursor.running { "running".green() } else { "idle".dimmed() }
            );
            println!("{}", render_pattern(&pattern, &cursor));
        }
        (command, _) => println!("Unknown command or missing argument: '{}'. Type 'help'.", command),
    }
}
