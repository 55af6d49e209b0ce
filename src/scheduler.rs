// src/scheduler.rs
//! Drives a [`Cycle`] once or forever. In forever mode a failed cycle is
//! logged, counted and alerted (behind a cooldown, and only when the cycle
//! did not report it itself), then the loop sleeps `retry_interval` and
//! carries on. Cycles never overlap.

use std::time::Duration;

use metrics::{counter, gauge};

use crate::bots::{Cycle, CycleOutcome};
use crate::error::CycleError;
use crate::notify::antiflutter::AntiFlutter;
use crate::notify::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Forever,
}

/// Injectable sleep so tests do not wait on the clock.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

pub struct Scheduler<S = TokioSleeper> {
    interval: Duration,
    retry_interval: Duration,
    sleeper: S,
    alerts: Dispatcher,
    flutter: AntiFlutter,
    max_cycles: Option<u64>,
}

impl Scheduler<TokioSleeper> {
    pub fn new(interval: Duration) -> Self {
        Self::with_sleeper(interval, TokioSleeper)
    }
}

impl<S: Sleeper> Scheduler<S> {
    pub fn with_sleeper(interval: Duration, sleeper: S) -> Self {
        Self {
            interval,
            retry_interval: interval,
            sleeper,
            alerts: Dispatcher::new(),
            flutter: AntiFlutter::new(3_600),
            max_cycles: None,
        }
    }

    /// Sleep used after a failed cycle instead of `interval`.
    pub fn retry_interval(mut self, d: Duration) -> Self {
        self.retry_interval = d;
        self
    }

    /// Where failure alerts go, and the minimum gap between two alerts of
    /// the same kind.
    pub fn alerts(mut self, dispatcher: Dispatcher, cooldown_secs: i64) -> Self {
        self.alerts = dispatcher;
        self.flutter = AntiFlutter::new(cooldown_secs);
        self
    }

    /// Stop a forever loop after `n` cycles.
    pub fn max_cycles(mut self, n: u64) -> Self {
        self.max_cycles = Some(n);
        self
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// `Once` returns the single cycle's result. `Forever` only returns
    /// when `max_cycles` is reached, with the last result.
    pub async fn run<C: Cycle + ?Sized>(
        &mut self,
        cycle: &mut C,
        mode: RunMode,
    ) -> Result<CycleOutcome, CycleError> {
        let mut n: u64 = 0;
        loop {
            n += 1;
            let result = self.run_one(cycle).await;

            if mode == RunMode::Once || self.max_cycles.is_some_and(|m| n >= m) {
                return result;
            }

            let pause = if result.is_ok() {
                self.interval
            } else {
                self.retry_interval
            };
            tracing::info!(target: "engine", bot = cycle.name(), secs = pause.as_secs(), "sleeping until next cycle");
            self.sleeper.sleep(pause).await;
        }
    }

    async fn run_one<C: Cycle + ?Sized>(&mut self, cycle: &mut C) -> Result<CycleOutcome, CycleError> {
        let bot = cycle.name().to_string();
        tracing::info!(target: "engine", bot = %bot, "cycle start");
        let started = std::time::Instant::now();
        let result = cycle.run_cycle().await;

        counter!("cycles_total", "bot" => bot.clone()).increment(1);
        gauge!("last_cycle_ts", "bot" => bot.clone()).set(chrono::Utc::now().timestamp() as f64);

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    target: "engine",
                    bot = %bot,
                    outcome = outcome.as_str(),
                    ms = started.elapsed().as_millis() as u64,
                    "cycle done"
                );
                self.flutter.reset();
            }
            Err(e) => {
                counter!("cycle_failures_total", "bot" => bot.clone(), "kind" => e.kind()).increment(1);
                tracing::error!(target: "engine", bot = %bot, kind = e.kind(), error = %e, "cycle failed");
                self.alert(&bot, e).await;
            }
        }
        result
    }

    async fn alert(&mut self, bot: &str, err: &CycleError) {
        if err.already_reported() {
            tracing::debug!(target: "engine", bot, kind = err.kind(), "failure already reported by the cycle");
            return;
        }
        let now = chrono::Utc::now();
        if !self.flutter.should_alert(err.kind(), now) {
            tracing::debug!(target: "engine", bot, "alert suppressed by cooldown");
            return;
        }
        self.alerts
            .send(&format!("[{bot}] cycle error ({})\n\n{err}", err.kind()))
            .await;
        self.flutter.record_alert(err.kind(), now);
    }
}
