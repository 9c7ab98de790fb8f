//! Operational helpers: logging setup and the metrics pass-through sink.

use std::{
    collections::BTreeMap,
    sync::{Mutex, PoisonError},
};

use sixelping_types::{config::OpsConfig, metrics::MetricsDatapoint, Result, SixelError};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ops_error(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| ops_error(format!("tracing init error: {err}")))?;
    Ok(())
}

/// Destination for metrics reported by ingest clients.
pub trait MetricsSink: Send + Sync {
    fn record(&self, datapoint: &MetricsDatapoint) -> Result<()>;
}

/// Gauge name plus its label set, sorted by label name.
pub type GaugeKey = (String, Vec<(String, String)>);

/// In-process gauge store keyed by name and label set; later samples overwrite.
#[derive(Default)]
pub struct GaugeRegistry {
    gauges: Mutex<BTreeMap<GaugeKey, u64>>,
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        let key = gauge_key(
            name,
            labels.iter().map(|(k, v)| (k.to_string(), v.to_string())),
        );
        self.lock().get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<GaugeKey, u64>> {
        self.gauges.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsSink for GaugeRegistry {
    fn record(&self, datapoint: &MetricsDatapoint) -> Result<()> {
        if datapoint.entries.iter().any(|entry| entry.name.is_empty()) {
            return Err(ops_error("metric entries must be named"));
        }
        let mut gauges = self.lock();
        for entry in &datapoint.entries {
            let key = gauge_key(
                &entry.name,
                entry
                    .labels
                    .iter()
                    .map(|label| (label.name.clone(), label.value.clone())),
            );
            gauges.insert(key, entry.value);
        }
        debug!(entries = datapoint.entries.len(), "Metrics recorded");
        Ok(())
    }
}

fn gauge_key(name: &str, labels: impl Iterator<Item = (String, String)>) -> GaugeKey {
    let mut labels: Vec<(String, String)> = labels.collect();
    labels.sort();
    (name.to_string(), labels)
}

pub fn ops_error(message: impl Into<String>) -> SixelError {
    SixelError::Ops(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sixelping_types::metrics::{MetricEntry, MetricLabel};

    fn entry(name: &str, labels: &[(&str, &str)], value: u64) -> MetricEntry {
        MetricEntry {
            name: name.into(),
            labels: labels
                .iter()
                .map(|(k, v)| MetricLabel::new(*k, *v))
                .collect(),
            value,
        }
    }

    #[test]
    fn later_samples_overwrite() {
        let registry = GaugeRegistry::new();
        registry
            .record(&MetricsDatapoint {
                entries: vec![
                    entry("receiver_packets", &[("mac", "aa")], 1),
                    entry("receiver_packets", &[("mac", "bb")], 5),
                ],
            })
            .expect("record");
        registry
            .record(&MetricsDatapoint {
                entries: vec![entry("receiver_packets", &[("mac", "aa")], 9)],
            })
            .expect("record");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("receiver_packets", &[("mac", "aa")]), Some(9));
        assert_eq!(registry.get("receiver_packets", &[("mac", "bb")]), Some(5));
        assert_eq!(registry.get("receiver_packets", &[]), None);
    }

    #[test]
    fn label_order_does_not_matter() {
        let registry = GaugeRegistry::new();
        registry
            .record(&MetricsDatapoint {
                entries: vec![entry("bytes", &[("b", "2"), ("a", "1")], 3)],
            })
            .unwrap();
        assert_eq!(registry.get("bytes", &[("a", "1"), ("b", "2")]), Some(3));
    }

    #[test]
    fn unnamed_entries_reject_whole_datapoint() {
        let registry = GaugeRegistry::new();
        let err = registry
            .record(&MetricsDatapoint {
                entries: vec![entry("ok", &[], 1), entry("", &[], 2)],
            })
            .unwrap_err();
        assert!(matches!(err, SixelError::Ops(_)));
        assert!(registry.is_empty());
    }
}
