use serde::{Deserialize, Serialize};

use super::enums::{MetricCategory, MetricFlag};

/// Reference interval printed next to a lab value.
///
/// `low-high` ranges carry both bounds; `<X` carries only `high`
/// and `>X` only `low`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalRange {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl NormalRange {
    pub fn between(low: f64, high: f64) -> Self {
        // Some reports print ranges high-first ("100-70"); keep bounds ordered.
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        Self {
            low: Some(low),
            high: Some(high),
        }
    }

    pub fn below(high: f64) -> Self {
        Self {
            low: None,
            high: Some(high),
        }
    }

    pub fn above(low: f64) -> Self {
        Self {
            low: Some(low),
            high: None,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.low.map_or(true, |low| value >= low) && self.high.map_or(true, |high| value <= high)
    }
}

/// One typed measurement extracted from a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetric {
    pub category: MetricCategory,
    pub metric: String,
    pub value: f64,
    pub unit: String,
    pub flag: MetricFlag,
    pub normal_range: Option<NormalRange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn between_orders_bounds() {
        let range = NormalRange::between(100.0, 70.0);
        assert_eq!(range.low, Some(70.0));
        assert_eq!(range.high, Some(100.0));
    }

    #[test]
    fn open_ranges_contain() {
        assert!(NormalRange::below(100.0).contains(0.0));
        assert!(!NormalRange::below(100.0).contains(100.5));
        assert!(NormalRange::above(40.0).contains(1000.0));
        assert!(!NormalRange::above(40.0).contains(39.9));
    }

    #[test]
    fn metric_serializes_camel_case() {
        let metric = HealthMetric {
            category: MetricCategory::Metabolic,
            metric: "Glucose".into(),
            value: 85.0,
            unit: "mg/dL".into(),
            flag: MetricFlag::Normal,
            normal_range: Some(NormalRange::between(70.0, 100.0)),
        };
        let json = serde_json::to_string(&metric).unwrap();
        assert!(json.contains("\"normalRange\":{\"low\":70.0,\"high\":100.0}"));
        assert!(json.contains("\"flag\":\"NORMAL\""));
        assert!(json.contains("\"category\":\"metabolic\""));
    }
}
