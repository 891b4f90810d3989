use serde::{Deserialize, Serialize};

use super::ParseEnumError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ParseEnumError {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(MetricFlag {
    Low => "LOW",
    Normal => "NORMAL",
    High => "HIGH",
    Critical => "CRITICAL",
});

str_enum!(MetricCategory {
    Metabolic => "metabolic",
    Hematology => "hematology",
    Lipids => "lipids",
    Kidney => "kidney",
    Liver => "liver",
    Electrolytes => "electrolytes",
    Thyroid => "thyroid",
    Vitamins => "vitamins",
    IronStudies => "iron_studies",
    Inflammation => "inflammation",
});

impl MetricCategory {
    /// How far above the upper reference bound (as a multiple of it) a value
    /// must sit before it is flagged CRITICAL rather than HIGH.
    pub fn critical_multiplier(&self) -> f64 {
        match self {
            Self::Electrolytes => 1.2,
            Self::Hematology => 2.0,
            Self::Lipids => 2.0,
            Self::Metabolic => 2.5,
            Self::Kidney => 3.0,
            Self::Liver => 3.0,
            Self::Thyroid => 3.0,
            Self::Vitamins => 3.0,
            Self::IronStudies => 3.0,
            Self::Inflammation => 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn metric_flag_round_trip() {
        for (variant, s) in [
            (MetricFlag::Low, "LOW"),
            (MetricFlag::Normal, "NORMAL"),
            (MetricFlag::High, "HIGH"),
            (MetricFlag::Critical, "CRITICAL"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(MetricFlag::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn metric_category_round_trip() {
        for (variant, s) in [
            (MetricCategory::Metabolic, "metabolic"),
            (MetricCategory::Hematology, "hematology"),
            (MetricCategory::IronStudies, "iron_studies"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(MetricCategory::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn flag_serializes_uppercase() {
        let json = serde_json::to_string(&MetricFlag::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        let back: MetricFlag = serde_json::from_str("\"LOW\"").unwrap();
        assert_eq!(back, MetricFlag::Low);
    }

    #[test]
    fn critical_multipliers_exceed_one() {
        for category in [
            MetricCategory::Metabolic,
            MetricCategory::Hematology,
            MetricCategory::Lipids,
            MetricCategory::Kidney,
            MetricCategory::Liver,
            MetricCategory::Electrolytes,
            MetricCategory::Thyroid,
            MetricCategory::Vitamins,
            MetricCategory::IronStudies,
            MetricCategory::Inflammation,
        ] {
            assert!(category.critical_multiplier() > 1.0, "{category}");
        }
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(MetricFlag::from_str("normal").is_err());
        assert!(MetricCategory::from_str("").is_err());
    }
}
