//! Node state aggregation for `sinfo` reports.
//!
//! Each partition is queried with `sinfo -h -o %D|%T|%b -p <partition>`,
//! producing lines of `count|state|features`. Lines are de-duplicated,
//! classified into a fixed set of [`NodeCategory`] buckets by state prefix and
//! summed per [`FeatureSignature`].

use std::collections::BTreeMap;
use std::fmt;

/// Delimiter between the fields of one `sinfo` line.
const FIELD_DELIMITER: char = '|';

/// Delimiter between feature tags, both in the report and in signatures.
const FEATURE_DELIMITER: &str = ",";

/// Feature list `sinfo` prints for nodes without features.
const NULL_FEATURES: &str = "(null)";

/// Normalized signature for nodes without features.
const NULL_SIGNATURE: &str = "null";

/// Coarse node state bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum NodeCategory {
    Allocated = 0,
    Completing = 1,
    Down = 2,
    Draining = 3,
    Error = 4,
    Failed = 5,
    Idle = 6,
    Maintenance = 7,
    Mixed = 8,
    Reserved = 9,
    Planned = 10,
    Other = 11,
}

/// Number of node categories, used for array sizing.
pub const NODE_CATEGORY_COUNT: usize = 12;

/// State prefixes in priority order. First match wins; no match is `Other`.
///
/// `fail` is tested before `err` and `res` covers both `reserved` and `resv`.
const STATE_PREFIXES: &[(&str, NodeCategory)] = &[
    ("alloc", NodeCategory::Allocated),
    ("comp", NodeCategory::Completing),
    ("down", NodeCategory::Down),
    ("drain", NodeCategory::Draining),
    ("fail", NodeCategory::Failed),
    ("err", NodeCategory::Error),
    ("idle", NodeCategory::Idle),
    ("maint", NodeCategory::Maintenance),
    ("mix", NodeCategory::Mixed),
    ("res", NodeCategory::Reserved),
    ("planned", NodeCategory::Planned),
];

impl NodeCategory {
    /// Classify a raw `sinfo` state token (e.g. `idle`, `drain*`, `alloc#`).
    pub fn classify(state: &str) -> Self {
        STATE_PREFIXES
            .iter()
            .find(|(prefix, _)| state.starts_with(prefix))
            .map(|(_, category)| *category)
            .unwrap_or(Self::Other)
    }

    /// Returns the canonical category name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allocated => "allocated",
            Self::Completing => "completing",
            Self::Down => "down",
            Self::Draining => "draining",
            Self::Error => "error",
            Self::Failed => "failed",
            Self::Idle => "idle",
            Self::Maintenance => "maintenance",
            Self::Mixed => "mixed",
            Self::Reserved => "reserved",
            Self::Planned => "planned",
            Self::Other => "other",
        }
    }

    /// Returns the exported gauge name.
    pub const fn metric_name(self) -> &'static str {
        match self {
            Self::Allocated => "slurm_nodes_alloc",
            Self::Completing => "slurm_nodes_comp",
            Self::Down => "slurm_nodes_down",
            Self::Draining => "slurm_nodes_drain",
            Self::Error => "slurm_nodes_err",
            Self::Failed => "slurm_nodes_fail",
            Self::Idle => "slurm_nodes_idle",
            Self::Maintenance => "slurm_nodes_maint",
            Self::Mixed => "slurm_nodes_mix",
            Self::Reserved => "slurm_nodes_resv",
            Self::Planned => "slurm_nodes_planned",
            Self::Other => "slurm_nodes_other",
        }
    }

    /// Returns the exported gauge help text.
    pub const fn help(self) -> &'static str {
        match self {
            Self::Allocated => "Allocated nodes",
            Self::Completing => "Completing nodes",
            Self::Down => "Down nodes",
            Self::Draining => "Drain nodes",
            Self::Error => "Error nodes",
            Self::Failed => "Fail nodes",
            Self::Idle => "Idle nodes",
            Self::Maintenance => "Maint nodes",
            Self::Mixed => "Mix nodes",
            Self::Reserved => "Reserved nodes",
            Self::Planned => "Planned nodes",
            Self::Other => "Nodes reported with an unknown state",
        }
    }

    /// Return all categories in discriminant order.
    pub fn all() -> &'static [Self] {
        &[
            Self::Allocated,
            Self::Completing,
            Self::Down,
            Self::Draining,
            Self::Error,
            Self::Failed,
            Self::Idle,
            Self::Maintenance,
            Self::Mixed,
            Self::Reserved,
            Self::Planned,
            Self::Other,
        ]
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order-independent key for a node's feature list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureSignature(String);

impl FeatureSignature {
    /// Build a signature from the raw comma-separated feature field.
    pub fn from_features(raw: &str) -> Self {
        let mut features: Vec<&str> = raw.trim().split(FEATURE_DELIMITER).collect();
        features.sort_unstable();
        let joined = features.join(FEATURE_DELIMITER);

        if joined == NULL_FEATURES {
            Self(NULL_SIGNATURE.to_string())
        } else {
            Self(joined)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node counts per category and feature signature for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMetrics {
    by_category: [BTreeMap<FeatureSignature, u64>; NODE_CATEGORY_COUNT],
}

impl NodeMetrics {
    /// Create an empty aggregation.
    pub fn new() -> Self {
        Self {
            by_category: std::array::from_fn(|_| BTreeMap::new()),
        }
    }

    /// Make `signature` visible in every category, keeping existing counts.
    fn init_signature(&mut self, signature: &FeatureSignature) {
        for counts in &mut self.by_category {
            counts.entry(signature.clone()).or_insert(0);
        }
    }

    fn add(&mut self, category: NodeCategory, signature: &FeatureSignature, count: u64) {
        if let Some(counts) = self.by_category.get_mut(category as usize) {
            let entry = counts.entry(signature.clone()).or_insert(0);
            *entry = entry.saturating_add(count);
        }
    }

    /// Counts for one category, keyed by feature signature.
    pub fn category(&self, category: NodeCategory) -> &BTreeMap<FeatureSignature, u64> {
        &self.by_category[category as usize]
    }

    /// Count for a category and signature, `None` if the signature never appeared.
    pub fn get(&self, category: NodeCategory, signature: &str) -> Option<u64> {
        self.category(category)
            .get(&FeatureSignature(signature.to_string()))
            .copied()
    }

    /// Iterate over all categories with their per-signature counts.
    pub fn iter(&self) -> impl Iterator<Item = (NodeCategory, &BTreeMap<FeatureSignature, u64>)> {
        NodeCategory::all()
            .iter()
            .map(move |category| (*category, self.category(*category)))
    }

    /// All signatures observed in this report, in sorted order.
    pub fn signatures(&self) -> impl Iterator<Item = &FeatureSignature> {
        // Every observed signature is present in every category.
        self.category(NodeCategory::Other).keys()
    }

    /// Sum over all categories for one signature.
    pub fn total_for(&self, signature: &str) -> u64 {
        NodeCategory::all()
            .iter()
            .filter_map(|category| self.get(*category, signature))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.iter().all(BTreeMap::is_empty)
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate one partition's `sinfo -o %D|%T|%b` output.
///
/// Never fails: malformed lines are skipped and unparseable counts become 0.
pub fn parse_nodes_metrics(input: &[u8]) -> NodeMetrics {
    let text = String::from_utf8_lossy(input);

    // sinfo may print the same (count, state, features) row once per node
    // reason; identical rows must only be counted once.
    let mut lines: Vec<&str> = text.split('\n').collect();
    lines.sort_unstable();
    lines.dedup();
    lines.retain(|line| !line.is_empty());

    let mut metrics = NodeMetrics::new();

    for line in lines {
        if !line.contains(FIELD_DELIMITER) {
            continue;
        }

        let mut fields = line.split(FIELD_DELIMITER);
        let (Some(count), Some(state), Some(features)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };

        let count = count.trim().parse::<u64>().unwrap_or(0);
        let signature = FeatureSignature::from_features(features);

        metrics.init_signature(&signature);
        metrics.add(NodeCategory::classify(state.trim()), &signature, count);
    }

    metrics
}

/// Parse `sinfo -h -o %R` output into a sorted, de-duplicated partition list.
pub fn parse_partitions(input: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(input);

    let mut partitions: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    partitions.sort_unstable();
    partitions.dedup();

    partitions
}

/// Count the nodes in `scontrol show nodes -o` output (one node per line).
pub fn parse_node_total(input: &[u8]) -> u64 {
    String::from_utf8_lossy(input)
        .lines()
        .filter(|line| line.trim_start().starts_with("NodeName="))
        .count() as u64
}
