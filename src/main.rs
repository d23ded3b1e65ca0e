// ██████╗  ██████╗  ██████╗██╗  ██╗███████╗████████╗
// ██╔══██╗██╔═══██╗██╔════╝██║ ██╔╝██╔════╝╚══██╔══╝
// ██║  ██║██║   ██║██║     █████╔╝ █████╗     ██║
// ██║  ██║██║   ██║██║     ██╔═██╗ ██╔══╝     ██║
// ██████╔╝╚██████╔╝╚██████╗██║  ██╗███████╗   ██║
// ╚═════╝  ╚═════╝  ╚═════╝╚═╝  ╚═╝╚══════╝   ╚═╝
//
// ██╗    ██╗ █████╗ ████████╗ ██████╗██╗  ██╗
// ██║    ██║██╔══██╗╚══██╔══╝██╔════╝██║  ██║
// ██║ █╗ ██║███████║   ██║   ██║     ███████║
// ██║███╗██║██╔══██║   ██║   ██║     ██╔══██║
// ╚███╔███╔╝██║  ██║   ██║   ╚██████╗██║  ██║
//  ╚══╝╚══╝ ╚═╝  ╚═╝   ╚═╝    ╚═════╝╚═╝  ╚═╝
//
// E N G I N E
//
// The most overkill court case tracking engine ever conceived.
// Rust + Tokio + Bloom Filters + Vision-Model CAPTCHA Solving + Cooldown
// Gates. All to find out that your hearing got adjourned. Again.

mod backoff;
mod captcha;
mod config;
mod diff;
mod extract;
mod metrics;
mod models;
mod notify;
mod pipeline;
mod providers;
mod reminders;
mod resolve;
mod session;
mod store;

use std::sync::Arc;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::captcha::CaptchaSolver;
use crate::config::Config;
use crate::metrics::{MetricsCollector, TriggerSource};
use crate::notify::RedisNotificationDispatcher;
use crate::pipeline::{PipelineSettings, UpdatePipeline};
use crate::providers::aggregator::LegalAggregatorApiProvider;
use crate::providers::ecourts::EcourtsProvider;
use crate::providers::public_search::PublicCaseSearchProvider;
use crate::providers::supreme_court::SupremeCourtProvider;
use crate::providers::CourtProvider;
use crate::reminders::ReminderLedger;
use crate::resolve::CourtResolutionService;
use crate::store::{CaseStore, RedisCaseStore};

fn print_banner() {
    let banner = r#"

    ╔══════════════════════════════════════════════════════════════════╗
    ║                                                                  ║
    ║              ⚖  D O C K E T   W A T C H   E N G I N E  ⚖         ║
    ║                                                                  ║
    ║   Sources:  Supreme Court | eCourts | Aggregator API | Public    ║
    ║   CAPTCHA:  Vision-Model Arithmetic Homework Outsourcing         ║
    ║   Dedup:    Bloom Filter + LRU Reminder Ledger                   ║
    ║   Pacing:   One Case Per Second, Like A Gentleman                ║
    ║   Resilience: Cooldown Gates on ALL portals                      ║
    ║                                                                  ║
    ║   "When the cause list moves, we know first."                    ║
    ║                                                                  ║
    ╚══════════════════════════════════════════════════════════════════╝

    "#;
    println!("{}", banner);
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_ansi(true)
        .init();

    print_banner();

    info!("⚖ DOCKET WATCH ENGINE initializing...");

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!("✅ Configuration loaded: redis_url={}", config.redis_url);
    if config.trigger_secret.trim().is_empty() {
        warn!("⚠ no trigger secret configured — POST /run will reject everything");
    }

    // The CAPTCHA solver — shared by every session-gated provider.
    let solver = Arc::new(CaptchaSolver::new(&config));
    if solver.is_configured() {
        info!("✅ Vision CAPTCHA solver configured");
    } else {
        warn!("⚠ no vision API key — CAPTCHA-gated portals are effectively offline");
    }

    // The provider orchestra, constructed once and injected — no globals.
    let supreme: Arc<dyn CourtProvider> =
        Arc::new(SupremeCourtProvider::new(&config, solver.clone()));
    let ecourts: Arc<dyn CourtProvider> = Arc::new(EcourtsProvider::new(&config, solver.clone()));
    let aggregator_provider = LegalAggregatorApiProvider::new(&config);
    if aggregator_provider.is_configured() {
        info!("✅ Aggregator API provider configured");
    } else {
        info!("ℹ aggregator API key absent — provider will sit out");
    }
    let aggregator: Arc<dyn CourtProvider> = Arc::new(aggregator_provider);
    let public_search: Arc<dyn CourtProvider> = Arc::new(PublicCaseSearchProvider::new(&config));

    let resolution = Arc::new(CourtResolutionService::new(
        supreme,
        ecourts,
        aggregator,
        public_search,
        config.search_policy,
    ));
    info!("✅ Resolution service online (search policy: {:?})", config.search_policy);

    // Store + dispatcher share the Redis deployment but hold their own
    // connections — the publisher going down shouldn't starve the docket.
    let store: Arc<dyn CaseStore> = Arc::new(RedisCaseStore::connect(&config).await?);
    let notifier = Arc::new(RedisNotificationDispatcher::connect(&config, store.clone()).await?);
    info!("✅ Store and notification dispatcher connected");

    let ledger = Arc::new(ReminderLedger::new(
        config.ledger_expected_items,
        config.ledger_false_positive_rate,
        config.ledger_lru_size,
    ));
    let metrics_collector = Arc::new(MetricsCollector::new());

    let update_pipeline = Arc::new(UpdatePipeline::new(
        resolution,
        store,
        notifier,
        ledger,
        metrics_collector.clone(),
        PipelineSettings::from_config(&config),
    ));

    // One-shot mode for external cron setups: run a single batch and exit
    // with a status code alerting can see.
    if std::env::args().any(|arg| arg == "--once") {
        info!("running in --once mode");
        return match update_pipeline.run(TriggerSource::Manual).await {
            Ok(summary) => {
                info!(checked = summary.cases_checked, "one-shot run complete");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "one-shot run failed");
                std::process::exit(1);
            }
        };
    }

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // The run queue: capacity 1 makes overlap structurally impossible.
    // One run executing + one queued behind it is the absolute ceiling;
    // any trigger beyond that bounces with a 409.
    let (run_tx, mut run_rx) = mpsc::channel::<TriggerSource>(1);

    // ═══════════════════════════════════════════
    // SPAWN THE RUN CONSUMER
    // ═══════════════════════════════════════════
    // The ONLY place pipeline.run is called from — a single consumer on a
    // single queue is what keeps runs strictly serialized.
    let consumer_pipeline = update_pipeline.clone();
    let mut consumer_shutdown = shutdown_rx.clone();
    let consumer_handle = tokio::spawn(async move {
        info!("🧾 Run consumer: ONLINE");
        loop {
            tokio::select! {
                maybe_source = run_rx.recv() => {
                    let Some(source) = maybe_source else { break };
                    match consumer_pipeline.run(source).await {
                        Ok(summary) => {
                            if summary.deadline_hit {
                                info!(
                                    checked = summary.cases_checked,
                                    total = summary.cases_total,
                                    "run hit its budget — the rest of the docket waits its turn"
                                );
                            }
                        }
                        Err(e) => {
                            // The fatal condition: the docket itself was
                            // unreadable. Loud log, counted in metrics,
                            // and the next trigger tries again.
                            error!(error = %e, "pipeline run FAILED — store read error");
                        }
                    }
                }
                _ = consumer_shutdown.changed() => break,
            }
        }
        info!("🧾 Run consumer: OFFLINE");
    });

    // ═══════════════════════════════════════════
    // SPAWN THE INTERNAL SCHEDULER
    // ═══════════════════════════════════════════
    let scheduler_tx = run_tx.clone();
    let scheduler_interval = config.run_interval;
    let scheduler_metrics = metrics_collector.clone();
    let mut scheduler_shutdown = shutdown_rx.clone();
    let scheduler_handle = tokio::spawn(async move {
        if scheduler_interval.is_zero() {
            info!("⏰ Internal scheduler disabled (interval = 0) — triggers are external-only");
            return;
        }
        info!(
            interval_secs = scheduler_interval.as_secs(),
            "⏰ Internal scheduler: ONLINE"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(scheduler_interval) => {
                    if scheduler_tx.try_send(TriggerSource::Scheduled).is_err() {
                        scheduler_metrics.run_rejected_overlap();
                        warn!("scheduled trigger skipped — a run is already queued or in flight");
                    }
                }
                _ = scheduler_shutdown.changed() => break,
            }
        }
        info!("⏰ Internal scheduler: OFFLINE");
    });

    // ═══════════════════════════════════════════
    // SPAWN THE TRIGGER + METRICS HTTP SERVER
    // ═══════════════════════════════════════════
    let server_metrics = metrics_collector.clone();
    let server_secret = config.trigger_secret.clone();
    let server_port = config.http_port;
    let server_tx = run_tx.clone();
    let mut server_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        metrics::run_http_server(
            server_metrics,
            server_secret,
            server_port,
            server_tx,
            &mut server_shutdown,
        )
        .await;
    });

    // Drop our copy so the consumer's recv() ends when the senders do.
    drop(run_tx);

    info!("═══════════════════════════════════════════════════════");
    info!("  🟢 ALL SYSTEMS ONLINE - DOCKET WATCH ENGINE ACTIVE");
    info!("  📡 4 providers wired");
    info!("  📤 Publishing changes to '{}'", config.redis_channel);
    info!("  📊 Metrics + trigger at http://0.0.0.0:{}", config.http_port);
    info!("  ⚡ Press Ctrl+C for graceful shutdown");
    info!("═══════════════════════════════════════════════════════");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("🛑 Shutdown signal received!");
            let _ = shutdown_tx.send(true);
        }
        Err(err) => {
            error!("❌ Signal listener error: {}", err);
            let _ = shutdown_tx.send(true);
        }
    }

    info!("⏳ Waiting for tasks to complete (timeout: 10s)...");
    let _ = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        let _ = tokio::join!(consumer_handle, scheduler_handle, server_handle);
    })
    .await;

    info!("💤 DOCKET WATCH ENGINE: OFFLINE");
    Ok(())
}
