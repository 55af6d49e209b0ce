use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

const ENV_ADDR: &str = "METRICS_ADDR";

/// One-time metrics registration (so series show up with help text).
pub fn describe() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cycles_total", "Cycles run, by bot.");
        describe_counter!("cycle_failures_total", "Failed cycles, by bot and error kind.");
        describe_counter!("notifications_total", "Notifications dispatched, by bot.");
        describe_counter!("notify_failures_total", "Failed deliveries, by channel.");
        describe_counter!("sync_events_total", "Publish attempts, by result.");
        describe_counter!("orders_total", "Orders sent to a venue.");
        describe_counter!("fills_total", "Orders filled, by bot.");
        describe_counter!("dataset_updates_total", "Result periods stored, by bot.");
        describe_gauge!("last_cycle_ts", "Unix ts when the bot last finished a cycle.");
        describe_histogram!("fetch_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Install the Prometheus exporter on `addr` (serves `/metrics`).
/// Without an installed recorder every metric call is a no-op.
pub fn init(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install recorder")?;
    describe();
    Ok(())
}

/// `METRICS_ADDR` (e.g. `0.0.0.0:9000`) enables the exporter.
pub fn init_from_env() -> Result<Option<SocketAddr>> {
    let Ok(raw) = std::env::var(ENV_ADDR) else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let addr: SocketAddr = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid {ENV_ADDR}: {raw}"))?;
    init(addr)?;
    Ok(Some(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_in_prometheus_format() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("cycles_total", "bot" => "books").increment(2);
        });
        let out = handle.render();
        assert!(out.contains("cycles_total{bot=\"books\"} 2"));
    }

    struct Quiet;

    #[async_trait::async_trait]
    impl crate::bots::Cycle for Quiet {
        fn name(&self) -> &str {
            "quiet"
        }
        async fn run_cycle(&mut self) -> std::result::Result<crate::CycleOutcome, crate::CycleError> {
            Ok(crate::CycleOutcome::Idle)
        }
    }

    #[test]
    fn scheduler_series_reach_the_exporter() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            rt.block_on(async {
                let mut sched = crate::Scheduler::new(std::time::Duration::from_secs(60));
                sched.run(&mut Quiet, crate::RunMode::Once).await.unwrap();
            });
        });
        let out = handle.render();
        assert!(out.contains("cycles_total{bot=\"quiet\"} 1"), "{out}");
        assert!(out.contains("last_cycle_ts{bot=\"quiet\"}"), "{out}");
    }

    #[test]
    #[serial_test::serial]
    fn unset_addr_disables_exporter() {
        std::env::remove_var(ENV_ADDR);
        assert!(init_from_env().unwrap().is_none());
        std::env::set_var(ENV_ADDR, "not-an-addr");
        assert!(init_from_env().is_err());
        std::env::remove_var(ENV_ADDR);
    }
}
