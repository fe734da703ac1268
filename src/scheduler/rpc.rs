//! RPC statistics sections of `sdiag` output.
//!
//! `sdiag` ends with two tables introduced by header lines:
//!
//! ```text
//! Remote Procedure Call statistics by message type
//!     REQUEST_JOB_INFO    ( 2003) count:12 ave_time:34 total_time:408
//! Remote Procedure Call statistics by user
//!     alice               (  1000) count:3 ave_time:10 total_time:30
//! ```

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

const MESSAGE_TYPE_HEADER: &str = "Remote Procedure Call statistics by message type";
const USER_HEADER: &str = "Remote Procedure Call statistics by user";

/// Identifier, then `count:`, `ave_time:` and `total_time:` columns.
const STAT_LINE_PATTERN: &str =
    r"^\s*([A-Za-z0-9_.\-]*).*count:([0-9]*)\s*ave_time:([0-9]*)\s+total_time:([0-9]*)\s*$";

fn stat_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(STAT_LINE_PATTERN).expect("static RPC stat pattern compiles"))
}

/// Invocation statistics for one message type or user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RpcStat {
    pub count: u64,
    /// Average duration in microseconds.
    pub ave_time: u64,
    /// Total duration in microseconds.
    pub total_time: u64,
}

/// The two RPC tables of one report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcStats {
    pub by_message_type: BTreeMap<String, RpcStat>,
    pub by_user: BTreeMap<String, RpcStat>,
}

/// Which table the scanner is currently filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    MessageType,
    User,
}

impl Section {
    /// Transition on a header line; other lines keep the current section.
    fn next(self, line: &str) -> Self {
        if line.contains(MESSAGE_TYPE_HEADER) {
            Self::MessageType
        } else if line.contains(USER_HEADER) {
            Self::User
        } else {
            self
        }
    }
}

/// Parse a single stat line into its identifier and values.
fn parse_stat_line(line: &str) -> Option<(&str, RpcStat)> {
    let caps = stat_line_re().captures(line)?;
    let field = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };

    let key = caps.get(1).map_or("", |m| m.as_str());
    Some((
        key,
        RpcStat {
            count: field(2),
            ave_time: field(3),
            total_time: field(4),
        },
    ))
}

/// Extract both RPC tables from the lines of an `sdiag` report.
///
/// Lines before the first header are ignored. A key repeated within a section
/// keeps its last value.
pub fn parse_rpc_stats<'a>(lines: impl IntoIterator<Item = &'a str>) -> RpcStats {
    let mut stats = RpcStats::default();
    let mut section = Section::None;

    for line in lines {
        section = section.next(line);

        let table = match section {
            Section::None => continue,
            Section::MessageType => &mut stats.by_message_type,
            Section::User => &mut stats.by_user,
        };

        if let Some((key, stat)) = parse_stat_line(line) {
            table.insert(key.to_string(), stat);
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_do_not_mix() {
        let text = "Remote Procedure Call statistics by message type\n\
                    REQUEST_JOB_INFO count:12 ave_time:34 total_time:408\n\
                    Remote Procedure Call statistics by user\n\
                    alice count:3 ave_time:10 total_time:30\n";
        let stats = parse_rpc_stats(text.lines());

        assert_eq!(
            stats.by_message_type.get("REQUEST_JOB_INFO"),
            Some(&RpcStat {
                count: 12,
                ave_time: 34,
                total_time: 408
            })
        );
        assert_eq!(
            stats.by_user.get("alice"),
            Some(&RpcStat {
                count: 3,
                ave_time: 10,
                total_time: 30
            })
        );
        assert!(!stats.by_message_type.contains_key("alice"));
        assert!(!stats.by_user.contains_key("REQUEST_JOB_INFO"));
    }

    #[test]
    fn test_sdiag_column_layout() {
        let text = "Remote Procedure Call statistics by message type\n\
                    \tREQUEST_PARTITION_INFO                  ( 2009) count:5432   ave_time:143    total_time:776789\n\
                    \tMESSAGE_NODE_REGISTRATION_STATUS        ( 1002) count:12     ave_time:405    total_time:4860\n\
                    \n\
                    Remote Procedure Call statistics by user\n\
                    \troot            (       0) count:9876   ave_time:250    total_time:2469000\n\
                    \tjohn.doe        (    1001) count:4      ave_time:90     total_time:360\n";
        let stats = parse_rpc_stats(text.lines());

        assert_eq!(stats.by_message_type.len(), 2);
        assert_eq!(stats.by_message_type["REQUEST_PARTITION_INFO"].count, 5432);
        assert_eq!(
            stats.by_message_type["MESSAGE_NODE_REGISTRATION_STATUS"].total_time,
            4860
        );
        assert_eq!(stats.by_user["root"].ave_time, 250);
        assert_eq!(stats.by_user["john.doe"].count, 4);
    }

    #[test]
    fn test_lines_before_first_header_ignored() {
        let text = "stray count:1 ave_time:1 total_time:1\n\
                    Remote Procedure Call statistics by user\n\
                    bob count:2 ave_time:2 total_time:4\n";
        let stats = parse_rpc_stats(text.lines());

        assert!(stats.by_message_type.is_empty());
        assert_eq!(stats.by_user.len(), 1);
        assert!(!stats.by_user.contains_key("stray"));
    }

    #[test]
    fn test_duplicate_key_last_write_wins() {
        let text = "Remote Procedure Call statistics by message type\n\
                    PING count:1 ave_time:1 total_time:1\n\
                    PING count:7 ave_time:2 total_time:14\n";
        let stats = parse_rpc_stats(text.lines());
        assert_eq!(stats.by_message_type["PING"].count, 7);
    }

    #[test]
    fn test_non_matching_lines_skipped() {
        let text = "Remote Procedure Call statistics by message type\n\
                    this line has no stats\n\
                    PING count:1 ave_time:1\n";
        let stats = parse_rpc_stats(text.lines());
        assert!(stats.by_message_type.is_empty());
    }

    #[test]
    fn test_empty_number_is_zero() {
        let text = "Remote Procedure Call statistics by user\n\
                    carol count: ave_time:5 total_time:10\n";
        let stats = parse_rpc_stats(text.lines());
        assert_eq!(stats.by_user["carol"].count, 0);
        assert_eq!(stats.by_user["carol"].ave_time, 5);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_rpc_stats("".lines()), RpcStats::default());
    }
}
