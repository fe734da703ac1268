//! Scheduler statistics from `sdiag` output.
//!
//! The report is a list of `label: value` lines grouped under section
//! headers. The main scheduler and the backfill scheduler sections both
//! contain `Last cycle` and `Mean cycle` lines with identical text, so those
//! labels are told apart by the order in which they appear: `sdiag` always
//! prints the main section first.

pub mod rpc;

use self::rpc::{parse_rpc_stats, RpcStats};

/// Scalar field a label line feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Threads,
    QueueSize,
    DbdQueueSize,
    LastCycle,
    MeanCycle,
    CyclePerMinute,
    BackfillDepthMean,
    BackfilledJobsSinceStart,
    BackfilledJobsSinceCycle,
    BackfilledHeterogeneous,
}

/// How a label is compared against the text before the first colon.
#[derive(Debug, Clone, Copy)]
struct Label {
    text: &'static str,
    /// Section entries are indented under their header; top-level ones are not.
    indented: bool,
    /// Match the whole label instead of a prefix.
    exact: bool,
    field: Field,
}

impl Label {
    const fn top(text: &'static str, field: Field) -> Self {
        Self {
            text,
            indented: false,
            exact: false,
            field,
        }
    }

    const fn nested(text: &'static str, exact: bool, field: Field) -> Self {
        Self {
            text,
            indented: true,
            exact,
            field,
        }
    }

    fn matches(&self, label: &str) -> bool {
        let trimmed = label.trim_start();
        let is_indented = trimmed.len() < label.len();
        if self.indented != is_indented {
            return false;
        }

        if self.exact {
            trimmed == self.text
        } else {
            trimmed.starts_with(self.text)
        }
    }
}

/// Label table in evaluation order.
const LABELS: &[Label] = &[
    Label::top("Server thread", Field::Threads),
    Label::top("Agent queue", Field::QueueSize),
    Label::top("DBD Agent", Field::DbdQueueSize),
    Label::nested("Last cycle", true, Field::LastCycle),
    Label::nested("Mean cycle", true, Field::MeanCycle),
    Label::nested("Cycles per", false, Field::CyclePerMinute),
    Label::nested("Depth Mean", true, Field::BackfillDepthMean),
    Label::nested(
        "Total backfilled jobs (since last slurm start)",
        false,
        Field::BackfilledJobsSinceStart,
    ),
    Label::nested(
        "Total backfilled jobs (since last stats cycle start)",
        false,
        Field::BackfilledJobsSinceCycle,
    ),
    Label::nested(
        "Total backfilled heterogeneous job components",
        false,
        Field::BackfilledHeterogeneous,
    ),
];

/// Scheduler state from one `sdiag` report. Times are in microseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerSnapshot {
    pub threads: f64,
    pub queue_size: f64,
    pub dbd_queue_size: f64,
    pub last_cycle: f64,
    pub mean_cycle: f64,
    pub cycle_per_minute: f64,
    pub backfill_last_cycle: f64,
    pub backfill_mean_cycle: f64,
    pub backfill_depth_mean: f64,
    pub backfilled_jobs_since_start: f64,
    pub backfilled_jobs_since_cycle: f64,
    pub backfilled_heterogeneous: f64,
    pub rpc: RpcStats,
}

/// Tracks repeated labels across one scan.
#[derive(Debug, Default)]
struct CycleOccurrences {
    last_cycle_seen: bool,
    mean_cycle_seen: bool,
}

impl CycleOccurrences {
    /// Returns true the first time it is called for `seen`.
    fn first(seen: &mut bool) -> bool {
        !std::mem::replace(seen, true)
    }
}

impl SchedulerSnapshot {
    fn set(&mut self, field: Field, value: f64, occurrences: &mut CycleOccurrences) {
        match field {
            Field::Threads => self.threads = value,
            Field::QueueSize => self.queue_size = value,
            Field::DbdQueueSize => self.dbd_queue_size = value,
            Field::LastCycle => {
                if CycleOccurrences::first(&mut occurrences.last_cycle_seen) {
                    self.last_cycle = value;
                } else {
                    self.backfill_last_cycle = value;
                }
            }
            Field::MeanCycle => {
                if CycleOccurrences::first(&mut occurrences.mean_cycle_seen) {
                    self.mean_cycle = value;
                } else {
                    self.backfill_mean_cycle = value;
                }
            }
            Field::CyclePerMinute => self.cycle_per_minute = value,
            Field::BackfillDepthMean => self.backfill_depth_mean = value,
            Field::BackfilledJobsSinceStart => self.backfilled_jobs_since_start = value,
            Field::BackfilledJobsSinceCycle => self.backfilled_jobs_since_cycle = value,
            Field::BackfilledHeterogeneous => self.backfilled_heterogeneous = value,
        }
    }
}

/// Value of a `label: value` line: the text up to the next colon, trimmed.
fn colon_value(line: &str) -> f64 {
    line.split(':')
        .nth(1)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse a complete `sdiag` report.
///
/// Never fails: unknown lines are ignored, unparseable values become 0 and a
/// missing RPC section yields an empty table.
pub fn parse_scheduler_metrics(input: &[u8]) -> SchedulerSnapshot {
    let text = String::from_utf8_lossy(input);
    let mut snapshot = SchedulerSnapshot::default();
    let mut occurrences = CycleOccurrences::default();

    for line in text.split('\n') {
        let Some((label, _)) = line.split_once(':') else {
            continue;
        };

        if let Some(entry) = LABELS.iter().find(|l| l.matches(label)) {
            snapshot.set(entry.field, colon_value(line), &mut occurrences);
        }
    }

    snapshot.rpc = parse_rpc_stats(text.split('\n'));
    snapshot
}
