use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the scheduler should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Stop the loop and cancel the shared token.
    Stop,
}

/// Fixed-period driver for the render cycle.
///
/// Ticks run one at a time on the caller's task. A tick that overruns the
/// period delays the next one instead of queueing a burst.
pub struct Scheduler {
    period: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("period", &self.period)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Scheduler {
    /// Creates a scheduler that stops when `cancel` fires.
    pub fn new(period: Duration, cancel: CancellationToken) -> Result<Self> {
        if period.is_zero() {
            bail!("render period must be > 0");
        }

        Ok(Self { period, cancel })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Runs `tick` once per period until cancelled, returning the number of
    /// ticks executed. The first tick fires immediately.
    ///
    /// A failing tick is logged and the loop keeps going.
    pub async fn run<F, Fut>(&self, mut tick: F) -> u64
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<TickOutcome>>,
    {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ticks = 0u64;
        info!(period = ?self.period, "render scheduler started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!(ticks, "render scheduler cancelled");
                    break;
                }
                _ = interval.tick() => {
                    ticks += 1;
                    match tick().await {
                        Ok(TickOutcome::Continue) => {}
                        Ok(TickOutcome::Stop) => {
                            debug!(ticks, "tick requested stop");
                            self.cancel.cancel();
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "render tick failed");
                        }
                    }
                }
            }
        }

        info!(ticks, "render scheduler stopped");
        ticks
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::anyhow;

    use super::*;

    #[test]
    fn test_scheduler_rejects_zero_period() {
        let result = Scheduler::new(Duration::ZERO, CancellationToken::new());
        assert!(result.is_err());
        assert!(result
            .expect_err("should fail")
            .to_string()
            .contains("period"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let cancel = CancellationToken::new();
        let scheduler =
            Scheduler::new(Duration::from_millis(100), cancel.clone()).expect("valid period");

        let handle = tokio::spawn(async move {
            scheduler
                .run(|| async { Ok(TickOutcome::Continue) })
                .await
        });

        // Ticks at 0, 100, ..., 900ms.
        tokio::time::sleep(Duration::from_millis(950)).await;
        cancel.cancel();

        let ticks = handle.await.expect("scheduler task panicked");
        assert_eq!(ticks, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ticks_delay_and_never_overlap() {
        let cancel = CancellationToken::new();
        let scheduler =
            Scheduler::new(Duration::from_millis(100), cancel.clone()).expect("valid period");

        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let (in_flight_task, max_task) = (Arc::clone(&in_flight), Arc::clone(&max_in_flight));

        let handle = tokio::spawn(async move {
            scheduler
                .run(|| {
                    let in_flight = Arc::clone(&in_flight_task);
                    let max_in_flight = Arc::clone(&max_task);
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_in_flight.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(TickOutcome::Continue)
                    }
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        cancel.cancel();

        let ticks = handle.await.expect("scheduler task panicked");
        // Each tick takes 250ms, so a 100ms period cannot fit more than ~4-5.
        assert!((4..=5).contains(&ticks), "ticks={ticks}");
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_run_executes_no_ticks() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let scheduler =
            Scheduler::new(Duration::from_millis(100), cancel).expect("valid period");

        let ticks = scheduler.run(|| async { Ok(TickOutcome::Continue) }).await;
        assert_eq!(ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_outcome_cancels_token() {
        let cancel = CancellationToken::new();
        let scheduler =
            Scheduler::new(Duration::from_millis(100), cancel.clone()).expect("valid period");

        let mut seen = 0;
        let ticks = scheduler
            .run(|| {
                seen += 1;
                let outcome = if seen == 3 {
                    TickOutcome::Stop
                } else {
                    TickOutcome::Continue
                };
                async move { Ok(outcome) }
            })
            .await;

        assert_eq!(ticks, 3);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_tick_does_not_stop_loop() {
        let cancel = CancellationToken::new();
        let scheduler =
            Scheduler::new(Duration::from_millis(100), cancel.clone()).expect("valid period");

        let mut seen = 0;
        let ticks = scheduler
            .run(|| {
                seen += 1;
                let result = match seen {
                    1 | 2 => Err(anyhow!("terminal gone")),
                    _ => Ok(TickOutcome::Stop),
                };
                async move { result }
            })
            .await;

        assert_eq!(ticks, 3);
    }
}
