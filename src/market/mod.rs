// src/market/mod.rs
//! Market data, balance and order execution boundaries for the auto-buy bots.

pub mod upbit;

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, FetchError};

/// What the change percentage is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// Previous daily close.
    #[default]
    PreviousClose,
    /// Average buy price of the current holding.
    AverageBuyPrice,
}

/// Price snapshot with the change vs. its reference, rounded to 2 decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    /// `0.0` when there is no reference (e.g. nothing held yet).
    pub reference: f64,
    pub change_pct: f64,
}

impl Quote {
    pub fn from_prices(symbol: impl Into<String>, price: f64, reference: f64) -> Self {
        let change_pct = if reference > 0.0 {
            round2((price - reference) / reference * 100.0)
        } else {
            0.0
        };
        Self {
            symbol: symbol.into(),
            price,
            reference,
            change_pct,
        }
    }

    pub fn has_reference(&self) -> bool {
        self.reference > 0.0
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Fill confirmation returned by an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub order_id: String,
    pub symbol: String,
    pub amount: f64,
    pub state: String,
}

#[async_trait]
pub trait MarketData: Send + Sync {
    async fn quote(&self, symbol: &str, mode: ReferenceMode) -> Result<Quote, FetchError>;
    fn name(&self) -> &'static str;
}

/// Available amount of `currency`. `Ok(None)` means the account holds none.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn available(&self, currency: &str) -> Result<Option<f64>, FetchError>;
}

/// Commits an irreversible action. Called at most once per decision.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, symbol: &str, amount: f64) -> Result<Confirmation, ExecutionError>;
}

/// In-memory account used for dry runs: balances and fills never leave the
/// process.
#[derive(Debug)]
pub struct PaperAccount {
    inner: Mutex<PaperState>,
}

#[derive(Debug)]
struct PaperState {
    cash: f64,
    orders: Vec<Confirmation>,
}

impl PaperAccount {
    pub fn new(cash: f64) -> Self {
        Self {
            inner: Mutex::new(PaperState {
                cash,
                orders: Vec::new(),
            }),
        }
    }

    pub fn orders(&self) -> Vec<Confirmation> {
        self.inner
            .lock()
            .map(|g| g.orders.clone())
            .unwrap_or_default()
    }

    pub fn cash(&self) -> f64 {
        self.inner.lock().map(|g| g.cash).unwrap_or_default()
    }
}

#[async_trait]
impl BalanceSource for PaperAccount {
    async fn available(&self, _currency: &str) -> Result<Option<f64>, FetchError> {
        Ok(Some(self.cash()))
    }
}

#[async_trait]
impl Executor for PaperAccount {
    async fn execute(&self, symbol: &str, amount: f64) -> Result<Confirmation, ExecutionError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|_| ExecutionError::Transport("paper account poisoned".into()))?;
        if amount > g.cash {
            return Err(ExecutionError::Rejected(format!(
                "insufficient paper cash {:.0} for {:.0}",
                g.cash, amount
            )));
        }
        g.cash -= amount;
        let confirmation = Confirmation {
            order_id: format!("paper-{}", uuid::Uuid::new_v4()),
            symbol: symbol.to_string(),
            amount,
            state: "done".to_string(),
        };
        g.orders.push(confirmation.clone());
        Ok(confirmation)
    }
}
