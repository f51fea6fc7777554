//! Demo sessions driven through the console front end

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use simrelay_cli::app::{run_with_context, Session};
use simrelay_cli::console::ConsoleFrontend;
use simrelay_cli::demo::{DemoEngine, BOOT_DEVICE};
use simrelay_core::{FatalAction, LogSink, RelayConfig, RelayContext, SharedBuffer};

type ScriptedConsole = ConsoleFrontend<Cursor<Vec<u8>>, Vec<u8>>;

fn console(input: &str) -> ScriptedConsole {
    ConsoleFrontend::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
}

fn context(interactive: bool) -> (Arc<RelayContext>, SharedBuffer) {
    let config = RelayConfig {
        interactive,
        on_fatal: FatalAction::StopWorker,
        ..RelayConfig::default()
    };
    let (sink, buffer) = LogSink::memory();
    (RelayContext::with_sink(config, sink), buffer)
}

fn session(ticks: u64) -> Session {
    Session {
        engine: DemoEngine {
            ticks,
            panic_at: None,
            ask_at: None,
            tick: Duration::ZERO,
        },
        stop_after: None,
    }
}

#[test]
fn completed_run_exits_zero() {
    let (ctx, buffer) = context(false);
    let code = run_with_context(ctx, session(20), console("")).unwrap();

    assert_eq!(code, 0);
    let log = buffer.contents();
    assert!(log.contains("i[IO   ] demo machine powered on"));
    assert!(log.contains("i[IO   ] demo run complete"));
}

#[test]
fn non_interactive_panic_exits_one() {
    let (ctx, buffer) = context(false);
    let mut session = session(20);
    session.engine.panic_at = Some(3);

    let code = run_with_context(ctx, session, console("")).unwrap();

    assert_eq!(code, 1);
    let log = buffer.contents();
    assert!(log.contains("00000000003p[CPU  ] >>PANIC<< simulated fault at tick 3"));
    assert!(!log.contains("demo run complete"));
}

#[test]
fn interactive_panic_continues_on_answer() {
    let (ctx, buffer) = context(true);
    let mut session = session(10);
    session.engine.panic_at = Some(5);

    let code = run_with_context(ctx, session, console("c\n")).unwrap();

    assert_eq!(code, 0);
    assert!(buffer.contents().contains("demo run complete"));
}

#[test]
fn quit_answer_ends_with_failure() {
    let (ctx, _) = context(true);
    let mut session = session(10);
    session.engine.panic_at = Some(2);

    let code = run_with_context(ctx, session, console("q\n")).unwrap();
    assert_eq!(code, 1);
}

#[test]
fn boot_device_prompt_updates_setting() {
    let (ctx, buffer) = context(true);
    let mut session = session(10);
    session.engine.ask_at = Some(4);

    let code = run_with_context(Arc::clone(&ctx), session, console("floppy\n")).unwrap();

    assert_eq!(code, 0);
    assert_eq!(ctx.settings().value(BOOT_DEVICE).as_deref(), Some("floppy"));
    assert!(buffer.contents().contains("boot device is now floppy"));
}

#[test]
fn stop_timer_cancels_long_run() {
    let (ctx, buffer) = context(false);
    let mut session = session(1_000_000);
    session.engine.tick = Duration::from_millis(1);
    session.stop_after = Some(Duration::from_millis(30));

    let code = run_with_context(ctx, session, console("")).unwrap();

    assert_eq!(code, 0);
    assert!(buffer.contents().contains("stop requested at tick"));
}
