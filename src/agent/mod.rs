use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;
use tracing::info;

use crate::config::Config;
use crate::export::{MetricsServer, NodesCollector, SchedulerCollector, ScrapeMetrics};
use crate::slurm::{CommandSource, ReportSource};

/// Agent wires the configured collectors into a registry and serves it.
pub struct Agent {
    registry: Registry,
    server: MetricsServer,
}

impl Agent {
    /// Creates an agent that runs the Slurm binaries named in `cfg`.
    pub fn new(cfg: Config) -> Result<Self> {
        let source = Arc::new(CommandSource::new(&cfg.slurm));
        Self::with_source(cfg, source)
    }

    /// Creates an agent over any report source.
    pub fn with_source<S: ReportSource + 'static>(cfg: Config, source: Arc<S>) -> Result<Self> {
        let registry = Registry::new();

        let scrape = ScrapeMetrics::new().context("creating scrape metrics")?;
        scrape
            .register(&registry)
            .context("registering scrape metrics")?;

        if cfg.collectors.nodes {
            let collector = NodesCollector::new(Arc::clone(&source), scrape.clone())
                .context("creating nodes collector")?;
            registry
                .register(Box::new(collector))
                .context("registering nodes collector")?;
            info!(collector = "nodes", "collector enabled");
        }

        if cfg.collectors.scheduler {
            let collector = SchedulerCollector::new(Arc::clone(&source), scrape)
                .context("creating scheduler collector")?;
            registry
                .register(Box::new(collector))
                .context("registering scheduler collector")?;
            info!(collector = "scheduler", "collector enabled");
        }

        let server = MetricsServer::new(
            registry.clone(),
            &cfg.web.listen_address,
            &cfg.web.telemetry_path,
        );

        Ok(Self { registry, server })
    }

    /// The registry holding every enabled collector.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Start serving metrics. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        self.server
            .start()
            .await
            .context("starting metrics server")
    }

    /// Stop the metrics server.
    pub async fn stop(&mut self) -> Result<()> {
        self.server.stop().await.context("stopping metrics server")?;
        info!("agent stopped");
        Ok(())
    }
}
