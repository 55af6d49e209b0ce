// src/bootstrap.rs
//! Wires one configured bot: adapters from env credentials, state files
//! under the bot's state dir, and a scheduler with its intervals.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::analyze::{
    AnalysisMode, BudgetedProvider, GeminiProvider, LlmAnalyzer, LlmProvider, MockProvider,
    OpenAiProvider, ResultsExtractor,
};
use crate::bots::{Cycle, InformationalBot, Outputs, TransactionalBot, TransactionalSettings, Watch};
use crate::config::{
    AiConfig, BotConfig, BotKind, FileConfig, InformationalConfig, ProviderKind, SourceConfig,
    SyncConfig, TransactionalConfig,
};
use crate::dataset::ResultsDataset;
use crate::error::{ConfigError, FetchError};
use crate::fetch::{DartFetcher, FetchAdapter, RssFetcher, SerperFetcher, StaticFetcher};
use crate::guard::BalanceGuard;
use crate::history::HistoryLog;
use crate::market::upbit::UpbitClient;
use crate::market::{BalanceSource, Executor, MarketData, PaperAccount};
use crate::notify::Dispatcher;
use crate::scheduler::Scheduler;
use crate::state::SeenStore;
use crate::sync::{GitTransport, SyncPublisher};

const SEEN_FILE: &str = "seen.json";
const HISTORY_FILE: &str = "history.json";
const LATEST_FILE: &str = "latest_report.json";
const FINGERPRINT_FILE: &str = "sync_fingerprints.json";

const VERDICT_INSTRUCTIONS: &str = "You are a careful research assistant. Read the search results below \
and decide whether they report genuinely new information about the subject (a new release, a new \
filing, a new opening). Old reviews, namesakes and unrelated mentions are not relevant.";
const DIGEST_INSTRUCTIONS: &str = "You are a research assistant writing a short periodic briefing \
about the subject from the search results below.";

pub struct BotRuntime {
    pub bot: Box<dyn Cycle>,
    pub scheduler: Scheduler,
}

/// Build the named bot and its scheduler.
pub fn build(cfg: &FileConfig, name: &str) -> Result<BotRuntime, ConfigError> {
    let bc = cfg.bot(name)?;
    let dispatcher = Dispatcher::from_env(&bc.extra_chat_ids);
    let outputs = outputs_for(bc, &cfg.sync);

    info!(
        target: "engine",
        bot = %bc.name,
        interval_secs = bc.interval_secs,
        channels = ?dispatcher.channel_names(),
        state_dir = %bc.state_dir().display(),
        "bot configured"
    );

    let bot: Box<dyn Cycle> = match &bc.kind {
        BotKind::Informational(ic) => {
            Box::new(build_informational(bc, ic, &cfg.ai, dispatcher.clone(), outputs)?)
        }
        BotKind::Transactional(tc) => {
            Box::new(build_transactional(bc, tc, &cfg.ai, dispatcher.clone(), outputs)?)
        }
    };

    let scheduler = Scheduler::new(Duration::from_secs(bc.interval_secs))
        .retry_interval(Duration::from_secs(bc.retry_interval_secs))
        .alerts(dispatcher, bc.alert_cooldown_secs);

    Ok(BotRuntime { bot, scheduler })
}

fn outputs_for(bc: &BotConfig, sync: &SyncConfig) -> Outputs {
    let dir = bc.state_dir();
    let history = HistoryLog::new(dir.join(HISTORY_FILE)).with_latest(dir.join(LATEST_FILE));
    let mut outputs = Outputs::new(history);

    if let BotKind::Informational(ic) = &bc.kind {
        outputs = outputs.publish_also(dir.join(SEEN_FILE));
        if let Some(ex) = &ic.extract {
            outputs = outputs.publish_also(ex.dataset_path(&dir));
        }
    }
    if sync.enabled && bc.sync {
        let mut git = GitTransport::new(&sync.remote, &sync.refspec);
        if let Some(repo) = &sync.repo_dir {
            git = git.in_dir(repo);
        }
        outputs = outputs.with_sync(SyncPublisher::new(
            Arc::new(git),
            dir.join(FINGERPRINT_FILE),
            &bc.name,
        ));
    }
    outputs
}

/// LLM provider per `[ai]`, wrapped in the daily budget (mock excluded).
pub fn build_provider(ai: &AiConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    let model = ai.model.as_deref();
    let provider: Arc<dyn LlmProvider> = match ai.provider {
        ProviderKind::Mock => {
            let fixed = ai.mock_response.clone().unwrap_or_else(|| {
                r#"{"relevant": false, "summary": "mock provider", "confidence": 0}"#.to_string()
            });
            return Ok(Arc::new(MockProvider::new(fixed)));
        }
        ProviderKind::Gemini => {
            let key = ai.resolve_api_key()?;
            let p = GeminiProvider::new(key, model).map_err(|e| ConfigError::invalid("ai", format!("{e:#}")))?;
            Arc::new(BudgetedProvider::new(p, ai.daily_limit, &ai.counter_path))
        }
        ProviderKind::Openai => {
            let key = ai.resolve_api_key()?;
            let p = OpenAiProvider::new(key, model).map_err(|e| ConfigError::invalid("ai", format!("{e:#}")))?;
            Arc::new(BudgetedProvider::new(p, ai.daily_limit, &ai.counter_path))
        }
    };
    // Only key length is ever logged.
    info!(
        target: "analyze",
        provider = provider.name(),
        daily_limit = ai.daily_limit,
        key_len = ai.resolve_api_key().map(|k| k.len()).unwrap_or(0),
        "llm provider ready"
    );
    Ok(provider)
}

fn not_configured(e: FetchError) -> ConfigError {
    match e {
        FetchError::NotConfigured(var) => ConfigError::MissingEnv(var),
        other => ConfigError::invalid("source", other.to_string()),
    }
}

fn build_fetcher(source: &SourceConfig) -> Result<Arc<dyn FetchAdapter>, ConfigError> {
    let fetcher: Arc<dyn FetchAdapter> = match source {
        SourceConfig::Serper {
            gl,
            hl,
            num,
            organic_limit,
        } => {
            let mut f = SerperFetcher::from_env().map_err(not_configured)?;
            if let (Some(gl), Some(hl)) = (gl, hl) {
                f = f.with_locale(gl, hl);
            }
            if let Some(n) = num {
                f = f.with_num(*n);
            }
            if let Some(n) = organic_limit {
                f = f.with_organic_limit(*n);
            }
            Arc::new(f)
        }
        SourceConfig::Dart {
            keywords,
            days,
            disclosure_type,
        } => {
            let mut f = DartFetcher::from_env()
                .map_err(not_configured)?
                .with_keywords(keywords.clone());
            if let Some(d) = days {
                f = f.with_default_days(*d);
            }
            if disclosure_type.is_some() {
                f = f.with_disclosure_type(disclosure_type.clone());
            }
            Arc::new(f)
        }
        SourceConfig::Rss { url } => Arc::new(RssFetcher::new(url.clone())),
        SourceConfig::Static { items } => Arc::new(StaticFetcher::new(items.clone())),
    };
    Ok(fetcher)
}

fn build_informational(
    bc: &BotConfig,
    ic: &InformationalConfig,
    ai: &AiConfig,
    dispatcher: Dispatcher,
    outputs: Outputs,
) -> Result<InformationalBot, ConfigError> {
    let fetcher = build_fetcher(&ic.source)?;
    let default_instructions = match ic.mode {
        AnalysisMode::Verdict => VERDICT_INSTRUCTIONS,
        AnalysisMode::Digest => DIGEST_INSTRUCTIONS,
    };
    let provider = build_provider(ai)?;
    let analyzer = LlmAnalyzer::new(provider.clone(), ic.mode)
        .with_instructions(ic.instructions.as_deref().unwrap_or(default_instructions));

    let watches = ic
        .watches
        .iter()
        .map(|w| {
            let mut watch = Watch::new(&w.key, &w.query);
            if let Some(l) = &w.label {
                watch = watch.label(l);
            }
            if let Some(c) = &w.context {
                watch = watch.context(c);
            }
            watch
        })
        .collect();

    let seen = SeenStore::open(bc.state_dir().join(SEEN_FILE))
        .map_err(|e| ConfigError::invalid(&bc.name, e.to_string()))?;

    let mut bot = InformationalBot::new(
        &bc.name,
        watches,
        fetcher,
        Arc::new(analyzer),
        dispatcher,
        seen,
        outputs,
    )
    .with_threshold(ic.threshold)
    .with_recency(ic.recency)
    .with_mode(ic.mode)
    .with_pause(Duration::from_secs(ic.pause_secs));
    if let Some(h) = &ic.headline {
        bot = bot.with_headline(h);
    }
    if let Some(ex) = &ic.extract {
        let mut extractor = ResultsExtractor::new(provider);
        if let Some(text) = &ex.instructions {
            extractor = extractor.with_instructions(text);
        }
        let dataset = ResultsDataset::new(ex.dataset_path(&bc.state_dir()));
        info!(target: "engine", bot = %bc.name, dataset = %dataset.path().display(), "results extraction enabled");
        bot = bot.with_extraction(extractor, dataset);
    }
    Ok(bot)
}

fn build_transactional(
    bc: &BotConfig,
    tc: &TransactionalConfig,
    ai: &AiConfig,
    dispatcher: Dispatcher,
    outputs: Outputs,
) -> Result<TransactionalBot, ConfigError> {
    let ladder = tc
        .ladder()
        .map_err(|e| ConfigError::invalid(&bc.name, e.to_string()))?;
    let upbit = Arc::new(UpbitClient::from_env());
    let market: Arc<dyn MarketData> = upbit.clone();

    let (balance, executor): (Arc<dyn BalanceSource>, Arc<dyn Executor>) = match tc.paper_cash {
        Some(cash) => {
            info!(target: "market", bot = %bc.name, cash, "paper trading");
            let paper = Arc::new(PaperAccount::new(cash));
            (paper.clone() as Arc<dyn BalanceSource>, paper as Arc<dyn Executor>)
        }
        None => {
            if !upbit.has_credentials() {
                return Err(ConfigError::MissingEnv("UPBIT_ACCESS_KEY/UPBIT_SECRET_KEY".into()));
            }
            (upbit.clone() as Arc<dyn BalanceSource>, upbit as Arc<dyn Executor>)
        }
    };

    let settings = TransactionalSettings {
        symbol: tc.symbol.clone(),
        currency: tc.currency.clone(),
        reference: tc.reference,
        ladder,
    };
    let mut bot = TransactionalBot::new(
        &bc.name,
        settings,
        market,
        BalanceGuard::new(balance, &tc.currency),
        executor,
        dispatcher,
        outputs,
    );
    if tc.commentary {
        bot = bot.with_commentary(build_provider(ai)?);
    }
    Ok(bot)
}

/// Files a bot writes under `dir`; handy for tooling and tests.
pub fn state_files(dir: &Path) -> [std::path::PathBuf; 4] {
    [
        dir.join(SEEN_FILE),
        dir.join(HISTORY_FILE),
        dir.join(LATEST_FILE),
        dir.join(FINGERPRINT_FILE),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bots::CycleOutcome;
    use crate::config::bots::FileConfig;

    fn cfg(dir: &Path) -> FileConfig {
        let raw = format!(
            r#"
[ai]
provider = "mock"
mock_response = '{{"relevant": true, "title": "Night Walk", "summary": "new novel", "confidence": 92}}'

[[bots]]
name = "books"
kind = "informational"
interval_secs = 60
state_dir = "{dir}"

[bots.source]
type = "static"
items = [{{ id = "https://n/1", title = "Night Walk announced" }}]

[[bots.watches]]
key = "han-kang"
"#,
            dir = dir.display()
        );
        let cfg: FileConfig = toml::from_str(&raw).unwrap();
        cfg.validate().unwrap();
        cfg
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn static_mock_bot_runs_end_to_end() {
        for v in ["TELEGRAM_TOKEN", "SLACK_WEBHOOK_URL", "DISCORD_WEBHOOK_URL", "SMTP_HOST"] {
            std::env::remove_var(v);
        }
        let dir = tempfile::tempdir().unwrap();
        let mut rt = build(&cfg(dir.path()), "books").unwrap();
        assert_eq!(rt.bot.name(), "books");
        assert_eq!(rt.bot.run_cycle().await.unwrap(), CycleOutcome::Notified);
        assert_eq!(rt.bot.run_cycle().await.unwrap(), CycleOutcome::Idle);

        let [seen, history, latest, _] = state_files(dir.path());
        assert!(seen.exists() && history.exists() && latest.exists());
    }

    #[test]
    fn unknown_bot_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            build(&cfg(dir.path()), "nope"),
            Err(ConfigError::UnknownBot(_))
        ));
    }
}
