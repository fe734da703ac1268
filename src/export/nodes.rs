use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, GaugeVec, Opts};
use tracing::debug;

use super::ScrapeMetrics;
use crate::nodes::{
    parse_node_total, parse_nodes_metrics, parse_partitions, NodeCategory, NodeMetrics,
};
use crate::slurm::ReportSource;

const COLLECTOR: &str = "nodes";

/// Per-partition node state gauges plus the cluster node total.
///
/// Each scrape lists partitions, aggregates every partition's `sinfo` rows
/// and resets the gauge vectors first, so partitions or feature sets that
/// disappeared are not reported with stale values.
pub struct NodesCollector<S> {
    source: Arc<S>,
    /// One vector per category, indexed by `NodeCategory as usize`.
    states: Vec<GaugeVec>,
    total: Gauge,
    scrape: ScrapeMetrics,
    // Serializes scrapes; reset and fill of the vectors must not interleave.
    lock: Mutex<()>,
}

impl<S: ReportSource> NodesCollector<S> {
    pub fn new(source: Arc<S>, scrape: ScrapeMetrics) -> Result<Self> {
        let states = NodeCategory::all()
            .iter()
            .map(|category| {
                GaugeVec::new(
                    Opts::new(category.metric_name(), category.help()),
                    &["partition", "active_feature_set"],
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let total = Gauge::with_opts(Opts::new("slurm_nodes_total", "Total number of nodes"))?;

        Ok(Self {
            source,
            states,
            total,
            scrape,
            lock: Mutex::new(()),
        })
    }

    fn record_partition(&self, partition: &str, metrics: &NodeMetrics) {
        for (category, counts) in metrics.iter() {
            let Some(vec) = self.states.get(category as usize) else {
                continue;
            };
            for (signature, count) in counts {
                vec.with_label_values(&[partition, signature.as_str()])
                    .set(*count as f64);
            }
        }
    }

    /// Refresh all per-partition gauges.
    fn scrape_partitions(&self) {
        let partitions = match self.source.partitions() {
            Ok(raw) => parse_partitions(&raw),
            Err(e) => {
                self.scrape.record_error(COLLECTOR, "partitions", &e);
                self.scrape.partitions.set(0.0);
                return;
            }
        };
        self.scrape.partitions.set(partitions.len() as f64);

        for partition in &partitions {
            match self.source.node_states(partition) {
                Ok(raw) => {
                    let metrics = parse_nodes_metrics(&raw);
                    debug!(
                        partition = %partition,
                        feature_sets = metrics.signatures().count(),
                        "aggregated node states",
                    );
                    self.record_partition(partition, &metrics);
                }
                Err(e) => self.scrape.record_error(COLLECTOR, "node_states", &e),
            }
        }
    }
}

impl<S: ReportSource + 'static> Collector for NodesCollector<S> {
    fn desc(&self) -> Vec<&Desc> {
        self.states
            .iter()
            .flat_map(|vec| vec.desc())
            .chain(self.total.desc())
            .collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let _guard = self.lock.lock();
        let _timer = self
            .scrape
            .duration
            .with_label_values(&[COLLECTOR])
            .start_timer();

        for vec in &self.states {
            vec.reset();
        }
        self.scrape_partitions();

        let mut families: Vec<MetricFamily> =
            self.states.iter().flat_map(|vec| vec.collect()).collect();

        match self.source.node_list() {
            Ok(raw) => {
                self.total.set(parse_node_total(&raw) as f64);
                families.extend(self.total.collect());
            }
            Err(e) => self.scrape.record_error(COLLECTOR, "node_list", &e),
        }

        families
    }
}
