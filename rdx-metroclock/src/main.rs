use anyhow::Result;
use metroclock::prelude::*;
use metroclock::ENGINE_NAME;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging. RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load the configuration: defaults, an optional TOML file, METRO_ overrides.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = MetroConfig::load(config_path.as_deref()).inspect_err(|e| {
        error!("Failed to load configuration: {:#}", e);
    })?;
    info!(
        tempo = config.initial_tempo(),
        steps = config.pattern.step_count,
        "Loaded configuration."
    );

    // 3. Create the engine instance.
    let engine = MetroEngine::new(config)?;

    // 4. Spawn tasks listening to the engine's event streams.
    spawn_event_listeners(&engine);

    // 5. Run until Ctrl+C.
    info!("{} is ticking.", ENGINE_NAME);
    engine.run_until_ctrl_c().await?;

    Ok(())
}

/// Spawns one task per event stream, each logging what it receives.
fn spawn_event_listeners(engine: &MetroEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut commit_rx = engine.subscribe_commits();
    tokio::spawn(async move {
        while let Ok(event) = commit_rx.recv().await {
            if event.should_sound {
                let mark = if event.is_accent { "ACCENT" } else { "click" };
                info!("[COMMIT] => step {} {} at {:.4}s", event.step_index, mark, event.due_time);
            }
        }
    });

    let engine_clock = engine.clone();
    let mut step_rx = engine.subscribe_steps();
    tokio::spawn(async move {
        while let Ok(event) = step_rx.recv().await {
            info!(
                "[STEP] => step {} observed at {:.4}s",
                event.step_index,
                engine_clock.now()
            );
        }
    });
}
