//! Threshold-ladder auto-buy bot.
//!
//! quote → ladder → balance guard → one market order → report. A rejected
//! guard never reaches the executor; a failed order is reported and surfaces
//! as a cycle error without retry. Every successful cycle, including a quiet
//! one, appends a history record.

use std::sync::Arc;

use metrics::counter;

use super::{Cycle, CycleOutcome, Outputs};
use crate::analyze::LlmProvider;
use crate::error::CycleError;
use crate::guard::{group_thousands, BalanceGuard};
use crate::market::{Confirmation, Executor, MarketData, Quote, ReferenceMode};
use crate::notify::Dispatcher;
use crate::policy::TierLadder;
use crate::types::{CycleRecord, IntentKind, Item, Tier};

#[derive(Debug, Clone)]
pub struct TransactionalSettings {
    /// Market code, e.g. `KRW-ETH`.
    pub symbol: String,
    /// Currency the guard checks, e.g. `KRW`.
    pub currency: String,
    pub reference: ReferenceMode,
    pub ladder: TierLadder,
}

pub struct TransactionalBot {
    name: String,
    settings: TransactionalSettings,
    market: Arc<dyn MarketData>,
    guard: BalanceGuard,
    executor: Arc<dyn Executor>,
    dispatcher: Dispatcher,
    outputs: Outputs,
    commentary: Option<Arc<dyn LlmProvider>>,
}

impl TransactionalBot {
    pub fn new(
        name: impl Into<String>,
        settings: TransactionalSettings,
        market: Arc<dyn MarketData>,
        guard: BalanceGuard,
        executor: Arc<dyn Executor>,
        dispatcher: Dispatcher,
        outputs: Outputs,
    ) -> Self {
        Self {
            name: name.into(),
            settings,
            market,
            guard,
            executor,
            dispatcher,
            outputs,
            commentary: None,
        }
    }

    /// Ask a model for a short market comment after each fill.
    pub fn with_commentary(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.commentary = Some(provider);
        self
    }

    fn reference_label(&self) -> &'static str {
        match self.settings.reference {
            ReferenceMode::PreviousClose => "previous close",
            ReferenceMode::AverageBuyPrice => "average buy price",
        }
    }

    async fn comment(&self, quote: &Quote, amount: f64) -> Option<String> {
        let provider = self.commentary.as_ref()?;
        let prompt = format!(
            "{} trades at {} {} ({:+}% vs {}). A market buy of {} {} was just filled. \
             Considering recent news and market themes, write a three-line comment.",
            quote.symbol,
            group_thousands(quote.price),
            self.settings.currency,
            quote.change_pct,
            self.reference_label(),
            group_thousands(amount),
            self.settings.currency,
        );
        match provider.complete(&prompt).await {
            Ok(text) => Some(text.trim().to_string()),
            Err(e) => {
                tracing::warn!(target: "analyze", bot = %self.name, error = %format!("{e:#}"), "commentary unavailable");
                None
            }
        }
    }

    fn fill_report(&self, quote: &Quote, tier: &Tier, fill: &Confirmation, comment: Option<&str>) -> String {
        let cur = &self.settings.currency;
        let mut msg = format!(
            "[{} buy]\n\nFilled: {} {cur} ({})\nPrice: {} {cur}\nChange: {}% vs {}\nOrder: {} ({})\n",
            quote.symbol,
            group_thousands(fill.amount),
            tier.label,
            group_thousands(quote.price),
            quote.change_pct,
            self.reference_label(),
            fill.order_id,
            fill.state,
        );
        if let Some(c) = comment.filter(|c| !c.is_empty()) {
            msg.push_str("\nCommentary:\n");
            msg.push_str(c);
            msg.push('\n');
        }
        msg
    }

    fn skip_report(&self, quote: &Quote, tier: &Tier, reason: &str) -> String {
        format!(
            "[{} buy skipped]\n\n{reason}\nTier: {} ({} {}) at {}%",
            quote.symbol,
            tier.label,
            group_thousands(tier.amount),
            self.settings.currency,
            quote.change_pct,
        )
    }
}

impl TransactionalBot {
    /// Quiet cycles are still recorded so the history has one entry per
    /// successful cycle.
    async fn idle(&self, quote: &Quote, rationale: &str) -> Result<CycleOutcome, CycleError> {
        let record = CycleRecord::now(
            vec![record_item(
                format!("hold-{}", crate::types::now_rfc3339()),
                format!("hold {}", quote.symbol),
                quote,
            )],
            rationale,
        );
        self.outputs.persist_and_sync(record).await?;
        Ok(CycleOutcome::Idle)
    }
}

fn record_item(id: impl Into<String>, title: String, quote: &Quote) -> Item {
    Item::new(id, title)
        .snippet(format!("price {} change {}%", quote.price, quote.change_pct))
        .source(quote.symbol.clone())
}

#[async_trait::async_trait]
impl Cycle for TransactionalBot {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let quote = self
            .market
            .quote(&self.settings.symbol, self.settings.reference)
            .await?;

        if !quote.has_reference() {
            tracing::info!(target: "engine", bot = %self.name, symbol = %quote.symbol, "no reference price; nothing to compare");
            return self.idle(&quote, "no reference price; holding").await;
        }

        let intent = self.settings.ladder.decide(quote.change_pct);
        let tier = match (intent.kind, self.settings.ladder.select(quote.change_pct)) {
            (IntentKind::Transact, Some(t)) => t.clone(),
            _ => {
                tracing::info!(
                    target: "engine",
                    bot = %self.name,
                    price = quote.price,
                    change_pct = quote.change_pct,
                    "{}",
                    intent.rationale
                );
                return self.idle(&quote, &intent.rationale).await;
            }
        };

        let check = self.guard.check(tier.amount).await;
        if !check.ok {
            tracing::warn!(target: "engine", bot = %self.name, reason = %check.reason, "guard rejected order");
            self.dispatcher
                .send(&self.skip_report(&quote, &tier, &check.reason))
                .await;
            let record = CycleRecord::now(
                vec![record_item(
                    format!("skip-{}", crate::types::now_rfc3339()),
                    format!("skipped {} ({})", tier.label, check.reason),
                    &quote,
                )],
                format!("skipped: {}", check.reason),
            );
            self.outputs.persist_and_sync(record).await?;
            return Ok(CycleOutcome::Skipped);
        }

        let fill = match self.executor.execute(&quote.symbol, tier.amount).await {
            Ok(fill) => fill,
            Err(e) => {
                tracing::error!(target: "engine", bot = %self.name, error = %e, "order failed");
                self.dispatcher
                    .send(&format!(
                        "[{} buy failed]\n\n{} {} ({}) was not placed: {e}",
                        quote.symbol,
                        group_thousands(tier.amount),
                        self.settings.currency,
                        tier.label
                    ))
                    .await;
                return Err(e.into());
            }
        };
        counter!("fills_total", "bot" => self.name.clone()).increment(1);
        tracing::info!(
            target: "engine",
            bot = %self.name,
            order_id = %fill.order_id,
            amount = fill.amount,
            tier = %tier.label,
            "order filled"
        );

        let comment = self.comment(&quote, fill.amount).await;
        let report = self.fill_report(&quote, &tier, &fill, comment.as_deref());
        self.dispatcher.send(&report).await;

        let record = CycleRecord::now(
            vec![record_item(
                fill.order_id.clone(),
                format!("bought {} {} ({})", group_thousands(fill.amount), self.settings.currency, tier.label),
                &quote,
            )],
            report,
        );
        self.outputs.persist_and_sync(record).await?;
        Ok(CycleOutcome::Executed)
    }
}
