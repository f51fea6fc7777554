//! Controller loop driving one demo session

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use colored::Colorize;
use simrelay_core::{Controller, Frontend, RelayConfig, RelayContext, StatusChange};
use tracing::info;

use crate::cli::Cli;
use crate::demo::{self, DemoEngine};

/// How long one dispatch pass waits for the worker
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What to run and when to stop it
#[derive(Debug, Clone)]
pub struct Session {
    pub engine: DemoEngine,
    pub stop_after: Option<Duration>,
}

impl Session {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            engine: DemoEngine {
                ticks: cli.ticks,
                panic_at: cli.panic_at,
                ask_at: cli.ask_at,
                tick: Duration::from_millis(cli.tick_ms),
            },
            stop_after: cli.stop_after_ms.map(Duration::from_millis),
        }
    }
}

/// Run a session with a context built from `config`
pub fn run(config: RelayConfig, session: Session, frontend: impl Frontend + 'static) -> anyhow::Result<i32> {
    run_with_context(RelayContext::new(config), session, frontend)
}

/// Run a session on the calling thread until the worker exits
///
/// Returns the process exit code: 1 if the worker failed, 0 otherwise.
pub fn run_with_context(
    ctx: Arc<RelayContext>,
    session: Session,
    frontend: impl Frontend + 'static,
) -> anyhow::Result<i32> {
    demo::register_settings(&ctx);

    let mut controller = Controller::new(Arc::clone(&ctx), frontend);
    controller.on_status_change(print_status);
    controller
        .start(session.engine)
        .context("starting the simulation")?;

    let started = Instant::now();
    let mut stop_sent = false;
    while controller.is_running() {
        if let Some(limit) = session.stop_after {
            if !stop_sent && started.elapsed() >= limit {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "Stop timer expired");
                controller.request_stop();
                stop_sent = true;
            }
        }
        controller.wait_and_dispatch(POLL_INTERVAL);
    }

    ctx.sink().flush();
    let code = match controller.last_exit() {
        Some(exit) if exit.is_failure() => 1,
        _ => 0,
    };
    Ok(code)
}

fn print_status(change: StatusChange) {
    match change {
        StatusChange::Started => eprintln!("{}", "simulation started".green()),
        StatusChange::Paused => eprintln!("{}", "simulation paused".yellow()),
        StatusChange::Resumed => eprintln!("{}", "simulation resumed".green()),
        StatusChange::Stopped { unexpected: false } => eprintln!("{}", "simulation stopped".green()),
        StatusChange::Stopped { unexpected: true } => {
            eprintln!("{}", "simulation stopped unexpectedly".red().bold())
        }
    }
}
