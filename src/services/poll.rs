use log::{debug, info, warn};
use std::thread;
use std::time::{Duration, Instant};

use crate::switch::SwitchEntity;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub refreshed: usize,
    pub failed: usize,
    pub changed: usize,
}

/// Refresh every switch forever at a steady cadence. Per-switch failures are
/// logged and skipped; rejected credentials stop the loop.
pub fn run_loop<S: SwitchEntity>(switches: &mut [S], interval: Duration) -> Result<(), String> {
    loop {
        let tick_start = Instant::now();

        let summary = poll_once(switches)?;
        debug!(
            "Poll tick: refreshed={}, failed={}, changed={}",
            summary.refreshed, summary.failed, summary.changed
        );

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
}

pub fn poll_once<S: SwitchEntity>(switches: &mut [S]) -> Result<PollSummary, String> {
    let mut summary = PollSummary::default();
    for switch in switches.iter_mut().filter(|s| s.should_poll()) {
        let was_on = switch.is_on();
        match switch.update() {
            Ok(()) => {
                summary.refreshed += 1;
                if switch.is_on() != was_on {
                    summary.changed += 1;
                    info!(
                        "{} ({}) is now {}",
                        switch.name(),
                        switch.unique_id(),
                        if switch.is_on() { "on" } else { "off" }
                    );
                }
            }
            Err(e) if e.is_invalid_credentials() => {
                return Err(format!("credentials rejected while refreshing {}: {}", switch.name(), e));
            }
            Err(e) => {
                summary.failed += 1;
                warn!("Refreshing {} ({}) failed: {}", switch.name(), switch.unique_id(), e);
            }
        }
    }
    Ok(summary)
}
