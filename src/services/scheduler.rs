use chrono::Local;
use log::{error, info};
use std::thread;
use std::time::{Duration, Instant};

use crate::services::sync::SyncOrchestrator;

/// Run a sync every `interval`, forever. Runs never overlap: a run that
/// overshoots the interval is followed immediately by the next one.
pub fn run_loop(orchestrator: &SyncOrchestrator<'_>, interval: Duration) -> Result<(), String> {
    loop {
        let tick_start = Instant::now();

        match orchestrator.run_once(Local::now().date_naive()) {
            Ok(summary) => info!(
                "Run took {}s; {} row(s) looked at",
                tick_start.elapsed().as_secs(),
                summary.rows.len()
            ),
            Err(e) => error!("Sync run aborted: {}", e),
        }

        // Maintain steady cadence
        if let Some(rest) = remaining(tick_start.elapsed(), interval) {
            thread::sleep(rest);
        }
    }
}

fn remaining(elapsed: Duration, interval: Duration) -> Option<Duration> {
    interval.checked_sub(elapsed).filter(|d| !d.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleeps_only_the_rest_of_the_interval() {
        let minute = Duration::from_secs(60);
        assert_eq!(remaining(Duration::from_secs(20), minute), Some(Duration::from_secs(40)));
        assert_eq!(remaining(minute, minute), None);
        assert_eq!(remaining(Duration::from_secs(90), minute), None);
    }
}
