use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricLabel {
    pub name: String,
    pub value: String,
}

impl MetricLabel {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One named gauge sample reported by an ingest client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<MetricLabel>,
    pub value: u64,
}

/// Batch of samples forwarded to the metrics registry unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsDatapoint {
    #[serde(default)]
    pub entries: Vec<MetricEntry>,
}
