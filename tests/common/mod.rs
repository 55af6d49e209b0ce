#![allow(dead_code)]
// Shared fakes for integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use monitor_engine::analyze::{AnalysisAdapter, LlmProvider};
use monitor_engine::error::{ExecutionError, FetchError};
use monitor_engine::fetch::{FetchAdapter, Recency};
use monitor_engine::market::{BalanceSource, Confirmation, Executor, MarketData, Quote, ReferenceMode};
use monitor_engine::notify::{Dispatcher, Notifier};
use monitor_engine::scheduler::Sleeper;
use monitor_engine::{Item, Verdict};

/// Captures every delivered message.
#[derive(Default)]
pub struct Inbox {
    pub messages: Mutex<Vec<String>>,
}

impl Inbox {
    pub fn all(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for Inbox {
    fn name(&self) -> &'static str {
        "inbox"
    }
    fn recipients(&self) -> Vec<String> {
        vec!["me".into()]
    }
    async fn deliver(&self, _recipient: &str, text: &str) -> Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub fn inbox_dispatcher() -> (Dispatcher, Arc<Inbox>) {
    let inbox = Arc::new(Inbox::default());
    (Dispatcher::new().with_channel(inbox.clone()), inbox)
}

/// Returns the scripted item lists in order, repeating the last one.
pub struct ScriptedFetcher {
    pub script: Mutex<Vec<Result<Vec<Item>, FetchError>>>,
    pub calls: Mutex<u32>,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<Vec<Item>, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(0),
        }
    }

    pub fn always(items: Vec<Item>) -> Self {
        Self::new(vec![Ok(items)])
    }
}

fn clone_result(r: &Result<Vec<Item>, FetchError>) -> Result<Vec<Item>, FetchError> {
    match r {
        Ok(v) => Ok(v.clone()),
        Err(e) => Err(FetchError::Unreachable(e.to_string())),
    }
}

#[async_trait::async_trait]
impl FetchAdapter for ScriptedFetcher {
    async fn fetch(&self, _query: &str, _recency: Recency) -> Result<Vec<Item>, FetchError> {
        *self.calls.lock().unwrap() += 1;
        let mut s = self.script.lock().unwrap();
        if s.len() > 1 {
            s.remove(0)
        } else {
            clone_result(&s[0])
        }
    }
    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Same verdict for every call; counts calls.
pub struct FixedAnalyzer {
    pub verdict: Verdict,
    pub calls: Mutex<Vec<usize>>,
}

impl FixedAnalyzer {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl AnalysisAdapter for FixedAnalyzer {
    async fn analyze(&self, _context: &str, items: &[Item]) -> Verdict {
        self.calls.lock().unwrap().push(items.len());
        self.verdict.clone()
    }
}

/// Every completion fails, as with an exhausted budget.
pub struct DownProvider;

#[async_trait::async_trait]
impl LlmProvider for DownProvider {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("daily llm budget of 0 calls exhausted")
    }
    fn name(&self) -> &'static str {
        "down"
    }
}

pub struct FixedMarket {
    pub price: f64,
    pub reference: f64,
}

#[async_trait::async_trait]
impl MarketData for FixedMarket {
    async fn quote(&self, symbol: &str, _mode: ReferenceMode) -> Result<Quote, FetchError> {
        Ok(Quote::from_prices(symbol, self.price, self.reference))
    }
    fn name(&self) -> &'static str {
        "fixed"
    }
}

pub struct FixedBalance(pub Option<f64>);

#[async_trait::async_trait]
impl BalanceSource for FixedBalance {
    async fn available(&self, _currency: &str) -> Result<Option<f64>, FetchError> {
        Ok(self.0)
    }
}

/// Records every order; optionally fails.
#[derive(Default)]
pub struct CountingExecutor {
    pub orders: Mutex<Vec<(String, f64)>>,
    pub fail: bool,
}

impl CountingExecutor {
    pub fn count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Executor for CountingExecutor {
    async fn execute(&self, symbol: &str, amount: f64) -> Result<Confirmation, ExecutionError> {
        self.orders.lock().unwrap().push((symbol.to_string(), amount));
        if self.fail {
            return Err(ExecutionError::Rejected("insufficient_funds_bid".into()));
        }
        Ok(Confirmation {
            order_id: format!("order-{}", self.count()),
            symbol: symbol.to_string(),
            amount,
            state: "wait".into(),
        })
    }
}

#[derive(Default, Clone)]
pub struct RecordingSleeper(pub Arc<Mutex<Vec<Duration>>>);

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, d: Duration) {
        self.0.lock().unwrap().push(d);
    }
}

pub fn items(ids: &[&str]) -> Vec<Item> {
    ids.iter()
        .map(|id| Item::new(*id, format!("headline {id}")))
        .collect()
}
