//! Stream identifiers and the topics they map to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Topic carried by the maintenance stream on every producer.
pub const MAINT_TOPIC: &str = "MAINT_STREAM_TOPIC";
/// Topic carried by the initial-load stream on every producer.
pub const INIT_TOPIC: &str = "INIT_STREAM_TOPIC";

/// Consumer-side port receiving the maintenance stream.
pub const COORD_MAINT_STREAM_PORT: u16 = 9105;
/// Consumer-side port receiving the initial-load stream.
pub const COORD_INIT_STREAM_PORT: u16 = 9106;

/// Transport kind requested for every topic.
pub const DATAPORT_ENDPOINT_TYPE: &str = "dataport";

/// Prefix applied to topic names when running against a test fleet.
const TESTING_TOPIC_PREFIX: &str = "testing ";

/// Logical stream category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamId {
    /// Ongoing maintenance of built indexes.
    Maintenance,
    /// Initial build of new indexes.
    Initial,
}

impl StreamId {
    pub fn topic(self) -> &'static str {
        match self {
            StreamId::Maintenance => MAINT_TOPIC,
            StreamId::Initial => INIT_TOPIC,
        }
    }

    /// Topic name, with the testing prefix applied when `testing` is set.
    pub fn topic_name(self, testing: bool) -> String {
        if testing {
            format!("{}{}", TESTING_TOPIC_PREFIX, self.topic())
        } else {
            self.topic().to_string()
        }
    }

    pub fn port(self) -> u16 {
        match self {
            StreamId::Maintenance => COORD_MAINT_STREAM_PORT,
            StreamId::Initial => COORD_INIT_STREAM_PORT,
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamId::Maintenance => f.write_str("maint"),
            StreamId::Initial => f.write_str("init"),
        }
    }
}

impl FromStr for StreamId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "maint" | "maintenance" => Ok(StreamId::Maintenance),
            "init" | "initial" => Ok(StreamId::Initial),
            other => Err(format!("unknown stream '{}', expected maint or init", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_per_stream() {
        assert_eq!(StreamId::Maintenance.topic(), "MAINT_STREAM_TOPIC");
        assert_eq!(StreamId::Initial.topic(), "INIT_STREAM_TOPIC");
        assert_ne!(StreamId::Maintenance.port(), StreamId::Initial.port());
    }

    #[test]
    fn test_testing_topic_prefix() {
        assert_eq!(StreamId::Initial.topic_name(false), "INIT_STREAM_TOPIC");
        assert_eq!(StreamId::Initial.topic_name(true), "testing INIT_STREAM_TOPIC");
    }

    #[test]
    fn test_parse_stream_id() {
        assert_eq!("maint".parse::<StreamId>(), Ok(StreamId::Maintenance));
        assert_eq!("INIT".parse::<StreamId>(), Ok(StreamId::Initial));
        assert!("catchup".parse::<StreamId>().is_err());
    }
}
