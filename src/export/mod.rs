pub mod nodes;
pub mod scheduler;
pub mod server;

use anyhow::Result;
use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use tracing::warn;

use crate::slurm::ReportError;

pub use self::nodes::NodesCollector;
pub use self::scheduler::SchedulerCollector;
pub use self::server::MetricsServer;

/// Metrics about the exporter's own scrapes.
///
/// All metrics use the "slurm_exporter" namespace.
#[derive(Clone)]
pub struct ScrapeMetrics {
    /// Time spent in one collector's scrape, including command runtime.
    pub duration: HistogramVec,
    /// Report acquisition failures by collector and report.
    pub errors: CounterVec,
    /// Partitions found by the last node scrape.
    pub partitions: Gauge,
}

impl ScrapeMetrics {
    pub fn new() -> Result<Self> {
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "scrape_duration_seconds",
                "Duration of a collector scrape including Slurm command runtime.",
            )
            .namespace("slurm_exporter")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["collector"],
        )?;
        let errors = CounterVec::new(
            Opts::new(
                "scrape_errors_total",
                "Total Slurm report acquisition failures by collector and report.",
            )
            .namespace("slurm_exporter"),
            &["collector", "source"],
        )?;
        let partitions = Gauge::with_opts(
            Opts::new("partitions", "Number of partitions seen in the last scrape.")
                .namespace("slurm_exporter"),
        )?;

        Ok(Self {
            duration,
            errors,
            partitions,
        })
    }

    /// Register all scrape metrics with `registry`.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.duration.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        registry.register(Box::new(self.partitions.clone()))?;
        Ok(())
    }

    /// Log and count a failed report.
    pub(crate) fn record_error(&self, collector: &str, source: &str, err: &ReportError) {
        warn!(collector, source, kind = err.kind(), error = %err, "slurm report failed");
        self.errors.with_label_values(&[collector, source]).inc();
    }
}
