use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, GaugeVec, Opts};

use super::ScrapeMetrics;
use crate::scheduler::rpc::RpcStat;
use crate::scheduler::{parse_scheduler_metrics, SchedulerSnapshot};
use crate::slurm::ReportSource;

const COLLECTOR: &str = "scheduler";

type Getter = fn(&SchedulerSnapshot) -> f64;

const SCALARS: &[(&str, &str, Getter)] = &[
    (
        "slurm_scheduler_threads",
        "Information provided by the Slurm sdiag command, number of scheduler threads",
        |s: &SchedulerSnapshot| s.threads,
    ),
    (
        "slurm_scheduler_queue_size",
        "Information provided by the Slurm sdiag command, length of the scheduler queue",
        |s: &SchedulerSnapshot| s.queue_size,
    ),
    (
        "slurm_scheduler_dbd_queue_size",
        "Information provided by the Slurm sdiag command, length of the DBD agent queue",
        |s: &SchedulerSnapshot| s.dbd_queue_size,
    ),
    (
        "slurm_scheduler_last_cycle",
        "Information provided by the Slurm sdiag command, scheduler last cycle time in (microseconds)",
        |s: &SchedulerSnapshot| s.last_cycle,
    ),
    (
        "slurm_scheduler_mean_cycle",
        "Information provided by the Slurm sdiag command, scheduler mean cycle time in (microseconds)",
        |s: &SchedulerSnapshot| s.mean_cycle,
    ),
    (
        "slurm_scheduler_cycle_per_minute",
        "Information provided by the Slurm sdiag command, number scheduler cycles per minute",
        |s: &SchedulerSnapshot| s.cycle_per_minute,
    ),
    (
        "slurm_scheduler_backfill_last_cycle",
        "Information provided by the Slurm sdiag command, scheduler backfill last cycle time in (microseconds)",
        |s: &SchedulerSnapshot| s.backfill_last_cycle,
    ),
    (
        "slurm_scheduler_backfill_mean_cycle",
        "Information provided by the Slurm sdiag command, scheduler backfill mean cycle time in (microseconds)",
        |s: &SchedulerSnapshot| s.backfill_mean_cycle,
    ),
    (
        "slurm_scheduler_backfill_depth_mean",
        "Information provided by the Slurm sdiag command, scheduler backfill mean depth",
        |s: &SchedulerSnapshot| s.backfill_depth_mean,
    ),
    (
        "slurm_scheduler_backfilled_jobs_since_start_total",
        "Information provided by the Slurm sdiag command, number of jobs started thanks to backfilling since last slurm start",
        |s: &SchedulerSnapshot| s.backfilled_jobs_since_start,
    ),
    (
        "slurm_scheduler_backfilled_jobs_since_cycle_total",
        "Information provided by the Slurm sdiag command, number of jobs started thanks to backfilling since last time stats where reset",
        |s: &SchedulerSnapshot| s.backfilled_jobs_since_cycle,
    ),
    (
        "slurm_scheduler_backfilled_heterogeneous_total",
        "Information provided by the Slurm sdiag command, number of heterogeneous job components started thanks to backfilling since last Slurm start",
        |s: &SchedulerSnapshot| s.backfilled_heterogeneous,
    ),
];

/// The three gauges reported for one RPC breakdown.
struct RpcGauges {
    count: GaugeVec,
    avg_time: GaugeVec,
    total_time: GaugeVec,
}

impl RpcGauges {
    /// `help_suffix` is appended to each help text, e.g. " per user".
    fn new(prefix: &str, label: &str, help_suffix: &str) -> Result<Self> {
        let vec = |suffix: &str, statistic: &str| {
            GaugeVec::new(
                Opts::new(
                    format!("{prefix}{suffix}"),
                    format!(
                        "Information provided by the Slurm sdiag command, rpc {statistic} statistic{help_suffix}"
                    ),
                ),
                &[label],
            )
        };
        Ok(Self {
            count: vec("", "count")?,
            avg_time: vec("_avg_time", "average time")?,
            total_time: vec("_total_time", "total time")?,
        })
    }

    fn vecs(&self) -> [&GaugeVec; 3] {
        [&self.count, &self.avg_time, &self.total_time]
    }

    fn set(&self, stats: &BTreeMap<String, RpcStat>) {
        for (key, stat) in stats {
            let labels = [key.as_str()];
            self.count.with_label_values(&labels).set(stat.count as f64);
            self.avg_time
                .with_label_values(&labels)
                .set(stat.ave_time as f64);
            self.total_time
                .with_label_values(&labels)
                .set(stat.total_time as f64);
        }
    }
}

/// Scheduler gauges and RPC statistics from `sdiag`.
///
/// A failed `sdiag` run yields no scheduler series at all for that scrape.
pub struct SchedulerCollector<S> {
    source: Arc<S>,
    scalars: Vec<(Gauge, Getter)>,
    by_operation: RpcGauges,
    by_user: RpcGauges,
    scrape: ScrapeMetrics,
    lock: Mutex<()>,
}

impl<S: ReportSource> SchedulerCollector<S> {
    pub fn new(source: Arc<S>, scrape: ScrapeMetrics) -> Result<Self> {
        let scalars = SCALARS
            .iter()
            .map(|(name, help, getter)| -> Result<(Gauge, Getter)> {
                Ok((Gauge::with_opts(Opts::new(*name, *help))?, *getter))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source,
            scalars,
            by_operation: RpcGauges::new("slurm_rpc_stats", "operation", "")?,
            by_user: RpcGauges::new("slurm_user_rpc_stats", "user", " per user")?,
            scrape,
            lock: Mutex::new(()),
        })
    }

    fn rpc_vecs(&self) -> impl Iterator<Item = &GaugeVec> {
        self.by_operation
            .vecs()
            .into_iter()
            .chain(self.by_user.vecs())
    }
}

impl<S: ReportSource + 'static> Collector for SchedulerCollector<S> {
    fn desc(&self) -> Vec<&Desc> {
        self.scalars
            .iter()
            .flat_map(|(gauge, _)| gauge.desc())
            .chain(self.rpc_vecs().flat_map(|vec| vec.desc()))
            .collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let _guard = self.lock.lock();
        let _timer = self
            .scrape
            .duration
            .with_label_values(&[COLLECTOR])
            .start_timer();

        for vec in self.rpc_vecs() {
            vec.reset();
        }

        let snapshot = match self.source.diagnostics() {
            Ok(raw) => parse_scheduler_metrics(&raw),
            Err(e) => {
                self.scrape.record_error(COLLECTOR, "diagnostics", &e);
                return Vec::new();
            }
        };

        for (gauge, getter) in &self.scalars {
            gauge.set(getter(&snapshot));
        }
        self.by_operation.set(&snapshot.rpc.by_message_type);
        self.by_user.set(&snapshot.rpc.by_user);

        self.scalars
            .iter()
            .flat_map(|(gauge, _)| gauge.collect())
            .chain(self.rpc_vecs().flat_map(|vec| vec.collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slurm::ReportError;

    struct FakeSdiag(Option<&'static str>);

    impl ReportSource for FakeSdiag {
        fn partitions(&self) -> Result<Vec<u8>, ReportError> {
            Ok(Vec::new())
        }

        fn node_states(&self, _partition: &str) -> Result<Vec<u8>, ReportError> {
            Ok(Vec::new())
        }

        fn node_list(&self) -> Result<Vec<u8>, ReportError> {
            Ok(Vec::new())
        }

        fn diagnostics(&self) -> Result<Vec<u8>, ReportError> {
            self.0
                .map(|s| s.as_bytes().to_vec())
                .ok_or_else(|| ReportError::Timeout {
                    command: "sdiag".into(),
                    timeout: std::time::Duration::from_secs(1),
                })
        }
    }

    const SDIAG: &str = "\
Server thread count:  3
Agent queue size:     0
DBD Agent queue size: 4

Main schedule statistics (microseconds):
\tLast cycle:   97209
\tMean cycle:   73593
\tCycles per minute: 1

Backfilling stats
\tTotal backfilled jobs (since last slurm start): 111
\tTotal backfilled jobs (since last stats cycle start): 2
\tTotal backfilled heterogeneous job components: 5
\tLast cycle: 1942890
\tMean cycle: 1693212
\tDepth Mean: 2

Remote Procedure Call statistics by message type
\tREQUEST_PARTITION_INFO                  ( 2009) count:468908 ave_time:2187   total_time:1025652211
\tMESSAGE_NODE_REGISTRATION_STATUS        ( 1002) count:12     ave_time:341    total_time:4092

Remote Procedure Call statistics by user
\troot            (       0) count:5985   ave_time:9321   total_time:55787434
\tjohn.doe        (    1001) count:12     ave_time:18     total_time:216
";

    fn value(families: &[MetricFamily], name: &str, label: Option<(&str, &str)>) -> Option<f64> {
        let family = families.iter().find(|f| f.get_name() == name)?;
        family
            .get_metric()
            .iter()
            .find(|m| match label {
                Some((k, v)) => m
                    .get_label()
                    .iter()
                    .any(|l| l.get_name() == k && l.get_value() == v),
                None => true,
            })
            .map(|m| m.get_gauge().get_value())
    }

    fn collector(sdiag: Option<&'static str>) -> SchedulerCollector<FakeSdiag> {
        SchedulerCollector::new(Arc::new(FakeSdiag(sdiag)), ScrapeMetrics::new().unwrap())
            .unwrap()
    }

    #[test]
    fn test_collect_scalars() {
        let families = collector(Some(SDIAG)).collect();

        assert_eq!(value(&families, "slurm_scheduler_threads", None), Some(3.0));
        assert_eq!(value(&families, "slurm_scheduler_queue_size", None), Some(0.0));
        assert_eq!(value(&families, "slurm_scheduler_dbd_queue_size", None), Some(4.0));
        assert_eq!(value(&families, "slurm_scheduler_last_cycle", None), Some(97209.0));
        assert_eq!(
            value(&families, "slurm_scheduler_backfill_last_cycle", None),
            Some(1942890.0)
        );
        assert_eq!(
            value(&families, "slurm_scheduler_backfilled_jobs_since_start_total", None),
            Some(111.0)
        );
        assert_eq!(
            value(&families, "slurm_scheduler_backfilled_heterogeneous_total", None),
            Some(5.0)
        );
    }

    #[test]
    fn test_collect_rpc_stats() {
        let families = collector(Some(SDIAG)).collect();

        let op = Some(("operation", "REQUEST_PARTITION_INFO"));
        assert_eq!(value(&families, "slurm_rpc_stats", op), Some(468908.0));
        assert_eq!(value(&families, "slurm_rpc_stats_avg_time", op), Some(2187.0));
        assert_eq!(
            value(&families, "slurm_rpc_stats_total_time", op),
            Some(1025652211.0)
        );

        let user = Some(("user", "john.doe"));
        assert_eq!(value(&families, "slurm_user_rpc_stats", user), Some(12.0));
        assert_eq!(value(&families, "slurm_user_rpc_stats_total_time", user), Some(216.0));
        assert_eq!(
            value(&families, "slurm_rpc_stats", Some(("operation", "root"))),
            None
        );
    }

    #[test]
    fn test_failed_sdiag_emits_nothing() {
        let c = collector(None);
        assert!(c.collect().is_empty());
        assert_eq!(
            c.scrape
                .errors
                .with_label_values(&["scheduler", "diagnostics"])
                .get(),
            1.0
        );
    }

    #[test]
    fn test_rpc_help_text() {
        let families = collector(Some(SDIAG)).collect();
        let help = |name: &str| {
            families
                .iter()
                .find(|f| f.get_name() == name)
                .map(|f| f.get_help().to_string())
        };

        assert_eq!(
            help("slurm_rpc_stats").as_deref(),
            Some("Information provided by the Slurm sdiag command, rpc count statistic")
        );
        assert_eq!(
            help("slurm_rpc_stats_avg_time").as_deref(),
            Some("Information provided by the Slurm sdiag command, rpc average time statistic")
        );
        assert_eq!(
            help("slurm_user_rpc_stats_total_time").as_deref(),
            Some("Information provided by the Slurm sdiag command, rpc total time statistic per user")
        );
    }

    #[test]
    fn test_desc_count() {
        let c = collector(None);
        assert_eq!(c.desc().len(), SCALARS.len() + 6);
    }
}
