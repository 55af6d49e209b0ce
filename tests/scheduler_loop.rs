mod common;

use std::time::Duration;

use common::{inbox_dispatcher, RecordingSleeper};
use monitor_engine::{Cycle, CycleError, CycleOutcome, FetchError, RunMode, Scheduler};

/// Fails on the listed cycle numbers (1-based), idles otherwise.
struct Flaky {
    failing: Vec<u32>,
    n: u32,
}

#[async_trait::async_trait]
impl Cycle for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        self.n += 1;
        if self.failing.contains(&self.n) {
            Err(FetchError::Unreachable("dns".into()).into())
        } else {
            Ok(CycleOutcome::Idle)
        }
    }
}

#[tokio::test]
async fn loop_survives_failures_and_uses_retry_interval() {
    let sleeper = RecordingSleeper::default();
    let mut sched = Scheduler::with_sleeper(Duration::from_secs(3_600), sleeper.clone())
        .retry_interval(Duration::from_secs(600))
        .max_cycles(4);
    let mut bot = Flaky {
        failing: vec![2],
        n: 0,
    };

    let last = sched.run(&mut bot, RunMode::Forever).await.unwrap();
    assert_eq!(last, CycleOutcome::Idle);
    assert_eq!(bot.n, 4);
    assert_eq!(
        sleeper.slept(),
        vec![
            Duration::from_secs(3_600),
            Duration::from_secs(600),
            Duration::from_secs(3_600)
        ]
    );
}

#[tokio::test]
async fn repeated_failures_alert_once_within_cooldown() {
    let (dispatcher, inbox) = inbox_dispatcher();
    let mut sched = Scheduler::with_sleeper(Duration::from_secs(60), RecordingSleeper::default())
        .alerts(dispatcher, 3_600)
        .max_cycles(3);
    let mut bot = Flaky {
        failing: vec![1, 2, 3],
        n: 0,
    };

    assert!(sched.run(&mut bot, RunMode::Forever).await.is_err());
    let alerts = inbox.all();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].starts_with("[flaky] cycle error (fetch)"));
}

#[tokio::test]
async fn success_rearms_the_alert() {
    let (dispatcher, inbox) = inbox_dispatcher();
    let mut sched = Scheduler::with_sleeper(Duration::from_secs(60), RecordingSleeper::default())
        .alerts(dispatcher, 3_600)
        .max_cycles(3);
    let mut bot = Flaky {
        failing: vec![1, 3],
        n: 0,
    };

    assert!(sched.run(&mut bot, RunMode::Forever).await.is_err());
    assert_eq!(inbox.all().len(), 2);
}

#[tokio::test]
async fn once_mode_returns_the_error() {
    let mut sched = Scheduler::with_sleeper(Duration::from_secs(60), RecordingSleeper::default());
    let mut bot = Flaky {
        failing: vec![1],
        n: 0,
    };
    let err = sched.run(&mut bot, RunMode::Once).await.unwrap_err();
    assert_eq!(err.kind(), "fetch");
    assert!(sched.sleeper().slept().is_empty());
}
