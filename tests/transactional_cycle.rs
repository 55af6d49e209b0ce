mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{inbox_dispatcher, CountingExecutor, FixedBalance, FixedMarket, RecordingSleeper};
use monitor_engine::bots::{Outputs, TransactionalBot, TransactionalSettings};
use monitor_engine::guard::BalanceGuard;
use monitor_engine::history::HistoryLog;
use monitor_engine::market::ReferenceMode;
use monitor_engine::policy::TierLadder;
use monitor_engine::{Cycle, CycleError, CycleOutcome, ExecutionError, IntentKind, RunMode, Scheduler, Tier};

fn ladder() -> TierLadder {
    TierLadder::new(vec![
        Tier::new(-10.0, 500_000.0, "crash"),
        Tier::new(-3.0, 110_000.0, "dip"),
    ])
    .unwrap()
}

fn settings() -> TransactionalSettings {
    TransactionalSettings {
        symbol: "KRW-ETH".into(),
        currency: "KRW".into(),
        reference: ReferenceMode::PreviousClose,
        ladder: ladder(),
    }
}

#[test]
fn threshold_ladder_is_deterministic() {
    let l = ladder();
    for _ in 0..3 {
        let intent = l.decide(-3.0);
        assert_eq!(intent.kind, IntentKind::Transact);
        assert_eq!(intent.amount, Some(110_000.0));
    }
    assert_eq!(l.decide(-12.5).amount, Some(500_000.0));
    assert_eq!(l.decide(-10.0).amount, Some(500_000.0));
    assert_eq!(l.decide(-2.99).kind, IntentKind::None);
}

#[tokio::test]
async fn insufficient_balance_skips_without_calling_executor() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, inbox) = inbox_dispatcher();
    let executor = Arc::new(CountingExecutor::default());
    let mut bot = TransactionalBot::new(
        "eth",
        settings(),
        // -12% => crash tier, 500,000 KRW
        Arc::new(FixedMarket {
            price: 88.0,
            reference: 100.0,
        }),
        BalanceGuard::new(Arc::new(FixedBalance(Some(300_000.0))), "KRW"),
        executor.clone(),
        dispatcher,
        Outputs::new(HistoryLog::new(dir.path().join("history.json"))),
    );

    assert_eq!(bot.run_cycle().await.unwrap(), CycleOutcome::Skipped);
    assert_eq!(executor.count(), 0);

    let msgs = inbox.all();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].contains("skipped"));
    assert!(msgs[0].contains("300,000"));
    assert!(msgs[0].contains("500,000"));
}

#[tokio::test]
async fn missing_balance_counts_as_zero() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, _inbox) = inbox_dispatcher();
    let executor = Arc::new(CountingExecutor::default());
    let mut bot = TransactionalBot::new(
        "eth",
        settings(),
        Arc::new(FixedMarket {
            price: 96.0,
            reference: 100.0,
        }),
        BalanceGuard::new(Arc::new(FixedBalance(None)), "KRW"),
        executor.clone(),
        dispatcher,
        Outputs::new(HistoryLog::new(dir.path().join("history.json"))),
    );
    assert_eq!(bot.run_cycle().await.unwrap(), CycleOutcome::Skipped);
    assert_eq!(executor.count(), 0);
}

#[tokio::test]
async fn sufficient_balance_executes_exactly_once_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, inbox) = inbox_dispatcher();
    let executor = Arc::new(CountingExecutor::default());
    let mut bot = TransactionalBot::new(
        "eth",
        settings(),
        Arc::new(FixedMarket {
            price: 97.0,
            reference: 100.0,
        }),
        BalanceGuard::new(Arc::new(FixedBalance(Some(1_000_000.0))), "KRW"),
        executor.clone(),
        dispatcher,
        Outputs::new(HistoryLog::new(dir.path().join("history.json"))),
    );

    assert_eq!(bot.run_cycle().await.unwrap(), CycleOutcome::Executed);
    assert_eq!(
        *executor.orders.lock().unwrap(),
        vec![("KRW-ETH".to_string(), 110_000.0)]
    );
    assert!(inbox.all()[0].contains("Filled: 110,000 KRW (dip)"));
    assert_eq!(
        HistoryLog::new(dir.path().join("history.json")).load().unwrap().len(),
        1
    );
}

#[tokio::test]
async fn failed_order_alerts_and_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, inbox) = inbox_dispatcher();
    let executor = Arc::new(CountingExecutor {
        fail: true,
        ..Default::default()
    });
    let mut bot = TransactionalBot::new(
        "eth",
        settings(),
        Arc::new(FixedMarket {
            price: 97.0,
            reference: 100.0,
        }),
        BalanceGuard::new(Arc::new(FixedBalance(Some(1_000_000.0))), "KRW"),
        executor.clone(),
        dispatcher,
        Outputs::new(HistoryLog::new(dir.path().join("history.json"))),
    );

    let err = bot.run_cycle().await.unwrap_err();
    assert!(matches!(err, CycleError::Execution(ExecutionError::Rejected(_))));
    assert_eq!(executor.count(), 1);
    assert!(inbox.all()[0].contains("buy failed"));
    assert!(!dir.path().join("history.json").exists());
}

#[tokio::test]
async fn history_has_one_record_per_successful_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, inbox) = inbox_dispatcher();
    let executor = Arc::new(CountingExecutor::default());
    // -1%: no tier fires
    let mut bot = TransactionalBot::new(
        "eth",
        settings(),
        Arc::new(FixedMarket {
            price: 99.0,
            reference: 100.0,
        }),
        BalanceGuard::new(Arc::new(FixedBalance(Some(1_000_000.0))), "KRW"),
        executor.clone(),
        dispatcher,
        Outputs::new(HistoryLog::new(dir.path().join("history.json"))),
    );

    let mut ok = 0;
    for _ in 0..3 {
        assert_eq!(bot.run_cycle().await.unwrap(), CycleOutcome::Idle);
        ok += 1;
    }
    let history = HistoryLog::new(dir.path().join("history.json")).load().unwrap();
    assert_eq!(history.len(), ok);
    assert_eq!(executor.count(), 0);
    assert!(inbox.all().is_empty());
}

#[tokio::test]
async fn failed_order_produces_a_single_message() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, inbox) = inbox_dispatcher();
    let mut bot = TransactionalBot::new(
        "eth",
        settings(),
        Arc::new(FixedMarket {
            price: 97.0,
            reference: 100.0,
        }),
        BalanceGuard::new(Arc::new(FixedBalance(Some(1_000_000.0))), "KRW"),
        Arc::new(CountingExecutor {
            fail: true,
            ..Default::default()
        }),
        dispatcher.clone(),
        Outputs::new(HistoryLog::new(dir.path().join("history.json"))),
    );
    let mut sched = Scheduler::with_sleeper(Duration::from_secs(86_400), RecordingSleeper::default())
        .alerts(dispatcher, 3_600);

    let err = sched.run(&mut bot, RunMode::Once).await.unwrap_err();
    assert_eq!(err.kind(), "execution");
    let msgs = inbox.all();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].starts_with("[KRW-ETH buy failed]"));
}
