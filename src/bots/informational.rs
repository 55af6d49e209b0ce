//! Search → analyze → notify bots (new books, disclosures, news digests).
//!
//! Order inside one cycle:
//! 1. fetch every watch (any failure aborts before state changes);
//! 2. analyze unseen items per watch and apply the policy;
//! 3. save the seen set;
//! 4. dispatch;
//! 5. append history and publish.
//!
//! Items behind a fallback verdict are not marked seen, so the next cycle
//! retries them. With results extraction enabled, each new filing is also
//! mined for period figures; a newly stored period is announced, and a
//! filing whose extraction call failed stays unseen.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;

use super::{Cycle, CycleOutcome, Outputs};
use crate::analyze::{AnalysisAdapter, AnalysisMode, ResultsExtractor};
use crate::dataset::{ResultEntry, ResultsDataset};
use crate::error::CycleError;
use crate::fetch::{FetchAdapter, Recency};
use crate::notify::Dispatcher;
use crate::policy;
use crate::state::SeenStore;
use crate::types::{CycleRecord, IntentKind, Item, Verdict};

/// How many source links a notification lists.
const MAX_LINKS: usize = 3;

/// One monitored subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    /// Dedup domain in the seen set.
    pub key: String,
    /// Human label used in messages.
    pub label: String,
    pub query: String,
    /// What the analyzer is told the subject is.
    pub context: String,
}

impl Watch {
    pub fn new(key: impl Into<String>, query: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            context: key.clone(),
            key,
            query: query.into(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    fn titles_domain(&self) -> String {
        format!("{}#titles", self.key)
    }
}

pub struct InformationalBot {
    name: String,
    headline: String,
    watches: Vec<Watch>,
    recency: Recency,
    threshold: u8,
    mode: AnalysisMode,
    pause: Duration,
    fetcher: Arc<dyn FetchAdapter>,
    analyzer: Arc<dyn AnalysisAdapter>,
    dispatcher: Dispatcher,
    seen: SeenStore,
    outputs: Outputs,
    extraction: Option<(ResultsExtractor, ResultsDataset)>,
}

impl InformationalBot {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        watches: Vec<Watch>,
        fetcher: Arc<dyn FetchAdapter>,
        analyzer: Arc<dyn AnalysisAdapter>,
        dispatcher: Dispatcher,
        seen: SeenStore,
        outputs: Outputs,
    ) -> Self {
        let name = name.into();
        Self {
            headline: name.clone(),
            name,
            watches,
            recency: Recency::Any,
            threshold: 70,
            mode: AnalysisMode::Verdict,
            pause: Duration::ZERO,
            fetcher,
            analyzer,
            dispatcher,
            seen,
            outputs,
            extraction: None,
        }
    }

    /// Confidence must be strictly above this to notify.
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold.min(100);
        self
    }

    pub fn with_recency(mut self, recency: Recency) -> Self {
        self.recency = recency;
        self
    }

    /// Use the digest policy and message layout.
    pub fn with_mode(mut self, mode: AnalysisMode) -> Self {
        self.mode = mode;
        self
    }

    /// Message headline, e.g. "New book".
    pub fn with_headline(mut self, headline: impl Into<String>) -> Self {
        self.headline = headline.into();
        self
    }

    /// Wait between watches to spare upstream quotas.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Mine new filings for period results and keep them in `dataset`.
    pub fn with_extraction(mut self, extractor: ResultsExtractor, dataset: ResultsDataset) -> Self {
        self.extraction = Some((extractor, dataset));
        self
    }

    pub fn seen(&self) -> &SeenStore {
        &self.seen
    }

    fn format_results(&self, watch: &Watch, entry: &ResultEntry, filing: &Item) -> String {
        // DART items carry their viewer URL in the snippet
        let link = if filing.snippet.starts_with("http") {
            &filing.snippet
        } else {
            &filing.id
        };
        format!(
            "[{}] results updated\n\nPeriod: {}\nRevenue: {:.1}\nOperating income: {:.1}\n\nSource:\n- {}\n  {}\n",
            watch.label, entry.period, entry.revenue, entry.op_income, filing.title, link
        )
    }

    fn format_verdict(&self, watch: &Watch, verdict: &Verdict, items: &[Item]) -> String {
        let mut msg = format!("[{}] {}\n\n", watch.label, self.headline);
        if let Some(t) = &verdict.title {
            msg.push_str(&format!("Title: {t}\n"));
        }
        msg.push_str(&verdict.summary);
        msg.push_str(&format!("\nConfidence: {}%\n", verdict.confidence));
        push_links(&mut msg, items);
        msg
    }

    fn format_digest(&self, watch: &Watch, verdict: &Verdict, items: &[Item]) -> String {
        let mut msg = format!("[{}] {} ({} items)\n\n", watch.label, self.headline, items.len());
        msg.push_str(&verdict.summary);
        msg.push('\n');
        push_links(&mut msg, items);
        msg
    }
}

fn push_links(msg: &mut String, items: &[Item]) {
    let links: Vec<&Item> = items.iter().take(MAX_LINKS).collect();
    if links.is_empty() {
        return;
    }
    msg.push_str("\nSources:\n");
    for it in links {
        msg.push_str(&format!("- {}\n  {}\n", it.title, it.id));
    }
}

#[async_trait::async_trait]
impl Cycle for InformationalBot {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        let mut fetched = Vec::with_capacity(self.watches.len());
        for (i, w) in self.watches.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            let items = self.fetcher.fetch(&w.query, self.recency).await?;
            tracing::debug!(target: "engine", bot = %self.name, watch = %w.key, fetched = items.len(), "fetched");
            fetched.push(items);
        }

        let mut pending: Vec<String> = Vec::new();
        let mut new_items: Vec<Item> = Vec::new();
        let mut report: Vec<String> = Vec::new();

        for (w, items) in self.watches.iter().zip(fetched) {
            let unseen: Vec<Item> = items
                .into_iter()
                .filter(|it| !self.seen.is_seen(&w.key, &it.id))
                .collect();
            if unseen.is_empty() {
                report.push(format!("{}: no new items", w.label));
                continue;
            }

            let verdict = self.analyzer.analyze(&w.context, &unseen).await;
            let intent = match self.mode {
                AnalysisMode::Verdict => policy::informational(&verdict, self.threshold),
                AnalysisMode::Digest => policy::digest(&verdict, unseen.len()),
            };
            tracing::info!(
                target: "engine",
                bot = %self.name,
                watch = %w.key,
                new = unseen.len(),
                relevant = verdict.relevant,
                confidence = verdict.confidence,
                fallback = verdict.fallback,
                intent = ?intent.kind,
                "{}",
                intent.rationale
            );

            let mut retry: HashSet<String> = HashSet::new();
            if let Some((extractor, dataset)) = &self.extraction {
                for it in &unseen {
                    match extractor.extract(&w.context, it).await {
                        Ok(Some(entry)) => {
                            if dataset.insert(&w.key, entry.clone())? {
                                counter!("dataset_updates_total", "bot" => self.name.clone()).increment(1);
                                tracing::info!(target: "engine", bot = %self.name, watch = %w.key, period = %entry.period, "results stored");
                                report.push(format!("{}: results {}", w.label, entry.period));
                                pending.push(self.format_results(w, &entry, it));
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(target: "engine", bot = %self.name, filing = %it.id, error = %format!("{e:#}"), "results extraction failed; will retry");
                            retry.insert(it.id.clone());
                        }
                    }
                }
            }

            if !verdict.fallback {
                for it in unseen.iter().filter(|it| !retry.contains(&it.id)) {
                    self.seen.mark_seen(&w.key, &it.id);
                }
            }

            if intent.kind == IntentKind::Notify {
                let repeat_title = verdict
                    .title
                    .as_deref()
                    .is_some_and(|t| !self.seen.mark_seen(&w.titles_domain(), t));
                if repeat_title {
                    tracing::info!(target: "engine", bot = %self.name, watch = %w.key, "title already announced");
                } else {
                    pending.push(match self.mode {
                        AnalysisMode::Verdict => self.format_verdict(w, &verdict, &unseen),
                        AnalysisMode::Digest => self.format_digest(w, &verdict, &unseen),
                    });
                }
            }

            report.push(match &verdict.title {
                Some(t) => format!("{}: {} | {}", w.label, t, verdict.summary),
                None => format!("{}: {}", w.label, verdict.summary),
            });
            new_items.extend(unseen);
        }

        self.seen.save()?;

        for msg in &pending {
            let r = self.dispatcher.send(msg).await;
            counter!("notifications_total", "bot" => self.name.clone()).increment(1);
            if r.failed > 0 {
                tracing::warn!(target: "engine", bot = %self.name, delivered = r.delivered, failed = r.failed, "partial delivery");
            }
        }

        let record = CycleRecord::now(new_items, report.join("\n"));
        self.outputs.persist_and_sync(record).await?;

        Ok(if pending.is_empty() {
            CycleOutcome::Idle
        } else {
            CycleOutcome::Notified
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;
    use crate::history::HistoryLog;

    struct Fixed(Verdict);

    #[async_trait::async_trait]
    impl AnalysisAdapter for Fixed {
        async fn analyze(&self, _context: &str, _items: &[Item]) -> Verdict {
            self.0.clone()
        }
    }

    fn bot(dir: &std::path::Path, verdict: Verdict) -> InformationalBot {
        let items = vec![
            Item::new("https://n/1", "Night Walk announced"),
            Item::new("https://n/2", "Interview"),
        ];
        InformationalBot::new(
            "books",
            vec![Watch::new("han-kang", "Han Kang new book")],
            Arc::new(StaticFetcher::new(items)),
            Arc::new(Fixed(verdict)),
            Dispatcher::new(),
            SeenStore::open(dir.join("seen.json")).unwrap(),
            Outputs::new(HistoryLog::new(dir.join("history.json"))),
        )
        .with_headline("New book")
    }

    #[tokio::test]
    async fn relevant_verdict_notifies_then_goes_idle() {
        let dir = tempfile::tempdir().unwrap();
        let v = Verdict::new(true, "new novel", 90.0).with_title("Night Walk");
        let mut b = bot(dir.path(), v);

        assert_eq!(b.run_cycle().await.unwrap(), CycleOutcome::Notified);
        assert_eq!(b.seen().len("han-kang"), 2);
        assert_eq!(b.run_cycle().await.unwrap(), CycleOutcome::Idle);

        let reopened = SeenStore::open(dir.path().join("seen.json")).unwrap();
        assert!(reopened.is_seen("han-kang", "https://n/1"));
        assert!(reopened.is_seen("han-kang#titles", "Night Walk"));
    }

    #[tokio::test]
    async fn fallback_leaves_items_unseen() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = bot(dir.path(), Verdict::fallback("timeout"));
        assert_eq!(b.run_cycle().await.unwrap(), CycleOutcome::Idle);
        assert_eq!(b.seen().len("han-kang"), 0);
    }

    #[test]
    fn verdict_message_lists_sources() {
        let dir = tempfile::tempdir().unwrap();
        let v = Verdict::new(true, "new novel", 90.0).with_title("Night Walk");
        let b = bot(dir.path(), v.clone());
        let w = Watch::new("han-kang", "q").label("Han Kang");
        let msg = b.format_verdict(&w, &v, &[Item::new("https://n/1", "Night Walk announced")]);
        assert!(msg.starts_with("[Han Kang] New book"));
        assert!(msg.contains("Title: Night Walk"));
        assert!(msg.contains("Confidence: 90%"));
        assert!(msg.contains("https://n/1"));
    }
}
