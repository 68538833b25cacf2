use prometheus::core::Collector;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;

use crate::catalog::MetricKind;
use crate::error::ScrapeError;

/// A typed metric accumulator keyed by label-value tuples.
///
/// The variant decides what [`Instrument::apply`] means: gauges take the
/// latest value, counters add to what is already there.
#[derive(Clone)]
pub enum Instrument {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

impl Instrument {
    fn new(name: &str, kind: MetricKind, help: &str, labels: &[&str]) -> prometheus::Result<Self> {
        let opts = Opts::new(name, help);
        Ok(match kind {
            MetricKind::Gauge => Self::Gauge(GaugeVec::new(opts, labels)?),
            MetricKind::Counter => Self::Counter(CounterVec::new(opts, labels)?),
        })
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Counter(_) => MetricKind::Counter,
        }
    }

    /// Record `value` under the label tuple `labels`
    pub fn apply(&self, name: &str, labels: &[&str], value: f64) -> Result<(), ScrapeError> {
        match self {
            Self::Gauge(vec) => {
                vec.get_metric_with_label_values(labels)
                    .map_err(|e| ScrapeError::Internal(e.to_string()))?
                    .set(value);
            }
            Self::Counter(vec) => {
                if value.is_nan() || value < 0.0 {
                    return Err(ScrapeError::NegativeCounterIncrement {
                        metric: name.to_string(),
                        value,
                    });
                }
                vec.get_metric_with_label_values(labels)
                    .map_err(|e| ScrapeError::Internal(e.to_string()))?
                    .inc_by(value);
            }
        }
        Ok(())
    }

    /// Current value for a label tuple, if one was ever recorded
    pub fn value(&self, labels: &[&str]) -> Option<f64> {
        // Look the child up without creating it. Collected label pairs are
        // sorted by name, so match them by name rather than position.
        let (descs, families) = match self {
            Self::Gauge(vec) => (vec.desc(), vec.collect()),
            Self::Counter(vec) => (vec.desc(), vec.collect()),
        };
        let wanted: HashMap<&str, &str> = descs
            .first()
            .map(|desc| desc.variable_labels.iter().map(String::as_str))
            .into_iter()
            .flatten()
            .zip(labels.iter().copied())
            .collect();

        families
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                let pairs = metric.get_label();
                pairs.len() == labels.len()
                    && pairs
                        .iter()
                        .all(|pair| wanted.get(pair.get_name()) == Some(&pair.get_value()))
            })
            .map(|metric| match self {
                Self::Gauge(_) => metric.get_gauge().get_value(),
                Self::Counter(_) => metric.get_counter().get_value(),
            })
    }

    fn collector(&self) -> Box<dyn Collector> {
        match self {
            Self::Gauge(vec) => Box::new(vec.clone()),
            Self::Counter(vec) => Box::new(vec.clone()),
        }
    }
}

/// All instruments produced by one scrape request.
///
/// Created empty per request, filled query by query, encoded once and then
/// dropped. Never shared between requests.
pub struct SnapshotRegistry {
    registry: Registry,
    instruments: HashMap<String, Instrument>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            instruments: HashMap::new(),
        }
    }

    /// Create an instrument and register it under `name`
    pub fn register(
        &mut self,
        name: &str,
        kind: MetricKind,
        help: &str,
        labels: &[&str],
    ) -> Result<&Instrument, ScrapeError> {
        if self.instruments.contains_key(name) {
            return Err(ScrapeError::DuplicateMetricName {
                name: name.to_string(),
            });
        }

        let invalid = |e: prometheus::Error| ScrapeError::InvalidMetric {
            name: name.to_string(),
            reason: e.to_string(),
        };
        let instrument = Instrument::new(name, kind, help, labels).map_err(invalid)?;
        self.registry
            .register(instrument.collector())
            .map_err(invalid)?;

        Ok(self
            .instruments
            .entry(name.to_string())
            .or_insert(instrument))
    }

    pub fn get(&self, name: &str) -> Option<&Instrument> {
        self.instruments.get(name)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Render the text exposition format
    pub fn encode(&self) -> Result<Vec<u8>, ScrapeError> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(buffer)
    }

    /// Content type of [`SnapshotRegistry::encode`]'s output
    pub fn content_type() -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl Default for SnapshotRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_last_write_wins() {
        let mut registry = SnapshotRegistry::new();
        let gauge = registry
            .register("db_size", MetricKind::Gauge, "size", &["schema"])
            .unwrap()
            .clone();

        gauge.apply("db_size", &["app"], 10.0).unwrap();
        gauge.apply("db_size", &["app"], 4.0).unwrap();

        assert_eq!(gauge.value(&["app"]), Some(4.0));
        assert_eq!(gauge.value(&["other"]), None);
    }

    #[test]
    fn test_counter_accumulates() {
        let mut registry = SnapshotRegistry::new();
        let counter = registry
            .register("db_rows", MetricKind::Counter, "rows", &[])
            .unwrap()
            .clone();

        counter.apply("db_rows", &[], 5.0).unwrap();
        counter.apply("db_rows", &[], 2.5).unwrap();

        assert_eq!(counter.kind(), MetricKind::Counter);
        assert_eq!(counter.value(&[]), Some(7.5));
    }

    #[test]
    fn test_counter_rejects_negative() {
        let mut registry = SnapshotRegistry::new();
        let counter = registry
            .register("db_rows", MetricKind::Counter, "rows", &[])
            .unwrap()
            .clone();

        let err = counter.apply("db_rows", &[], -1.0).unwrap_err();
        assert!(matches!(err, ScrapeError::NegativeCounterIncrement { .. }));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = SnapshotRegistry::new();
        registry
            .register("db_rows", MetricKind::Counter, "rows", &[])
            .unwrap();
        let err = registry
            .register("db_rows", MetricKind::Gauge, "rows", &["x"])
            .err()
            .unwrap();
        assert!(matches!(err, ScrapeError::DuplicateMetricName { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_metric_name_rejected() {
        let mut registry = SnapshotRegistry::new();
        let err = registry
            .register("my-query_total", MetricKind::Gauge, "h", &[])
            .err()
            .unwrap();
        assert!(matches!(err, ScrapeError::InvalidMetric { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_encode_text_format() {
        let mut registry = SnapshotRegistry::new();
        let gauge = registry
            .register("up_value", MetricKind::Gauge, "is up", &["host"])
            .unwrap()
            .clone();
        gauge.apply("up_value", &["a"], 1.0).unwrap();

        let text = String::from_utf8(registry.encode().unwrap()).unwrap();
        assert!(text.contains("# HELP up_value is up"));
        assert!(text.contains("# TYPE up_value gauge"));
        assert!(text.contains("up_value{host=\"a\"} 1"));
        assert!(SnapshotRegistry::content_type().starts_with("text/plain"));
    }
}
