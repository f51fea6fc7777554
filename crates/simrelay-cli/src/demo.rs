//! Demonstration engine
//!
//! Counts ticks, moves a fake instruction pointer and logs from a few
//! devices. Optionally raises a PANIC or asks for a new boot device at a
//! chosen tick, so every relay path can be exercised from the command line.

use std::thread;
use std::time::Duration;

use simrelay_core::{Engine, EngineHost, RelayContext, RelayResult, StringSetting, ValueOutcome};

pub const BOOT_DEVICE: &str = "boot-device";

/// Reset vector the fake instruction pointer starts from
const RESET_VECTOR: u32 = 0xfff0;

/// Register the settings the demo engine asks about
pub fn register_settings(ctx: &RelayContext) {
    ctx.settings().register(
        StringSetting::new(BOOT_DEVICE, "cdrom")
            .with_description("Boot device")
            .with_prompt("Boot device (floppy, disk, cdrom)"),
    );
}

#[derive(Debug, Clone)]
pub struct DemoEngine {
    pub ticks: u64,
    pub panic_at: Option<u64>,
    pub ask_at: Option<u64>,
    pub tick: Duration,
}

impl DemoEngine {
    fn step(&self, host: &EngineHost, tick: u64) -> RelayResult<()> {
        host.advance_ticks(1);
        host.set_instruction_pointer(RESET_VECTOR.wrapping_add((tick as u32).wrapping_mul(3)));

        let cpu = host.logger("CPU");
        let io = host.logger("IO");

        if self.ask_at == Some(tick) {
            match host.request_value(BOOT_DEVICE) {
                ValueOutcome::Accepted(device) => io.info(format!("boot device is now {device}"))?,
                ValueOutcome::Cancelled => io.info("boot device unchanged")?,
                ValueOutcome::Rejected => io.error("boot device request was rejected")?,
            }
        }
        if self.panic_at == Some(tick) {
            cpu.panic(format!("simulated fault at tick {tick}"))?;
        }
        if host.take_interrupt() {
            cpu.info("debugger interrupt requested; no debugger attached, continuing")?;
        }
        if tick % 50 == 0 {
            cpu.debug(format!("reached tick {tick}"))?;
        }
        Ok(())
    }
}

impl Engine for DemoEngine {
    fn run(self: Box<Self>, host: &EngineHost) -> RelayResult<()> {
        let io = host.logger("IO");
        io.info("demo machine powered on")?;

        for tick in 1..=self.ticks {
            if host.checkpoint().is_cancel() {
                io.info(format!("stop requested at tick {tick}"))?;
                return Ok(());
            }
            self.step(host, tick)?;
            if !self.tick.is_zero() {
                thread::sleep(self.tick);
            }
        }

        io.info("demo run complete")?;
        Ok(())
    }
}
