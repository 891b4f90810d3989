//! Ordered registry of metric recognition rules.
//!
//! Rules are evaluated in table order and a name span matched by an earlier
//! rule is unavailable to later ones, so every analyte whose name contains
//! another analyte's name ("Hemoglobin A1c", "Mean corpuscular hemoglobin",
//! "HDL cholesterol") is listed before it.

use std::sync::LazyLock;

use regex::Regex;

use super::units::{self, UnitTable};
use crate::models::MetricCategory;

/// Static description of one analyte.
struct RuleDef {
    name: &'static str,
    category: MetricCategory,
    synonyms: &'static [&'static str],
    units: &'static [UnitTable],
}

/// First numeric token in a window: decimal point or comma, optional
/// thousands groups, not preceded by a letter or digit.
const NUMBER: &str = r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:[.,]\d+)?";

static VALUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?:^|[^\p{{L}}\p{{N}}.,])(?P<num>{NUMBER})"))
        .expect("Invalid value regex")
});

/// `low-high`, `low–high`, `low to high`, or a one-sided bound.
static RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:^|[^\p{{L}}\p{{N}}.,])(?:(?P<low>{NUMBER})\s*(?:-|–|—|to)\s*(?P<high>{NUMBER})|(?P<op><=|>=|≤|≥|<|>|up\s*to)\s*(?P<bound>{NUMBER}))"
    ))
    .expect("Invalid range regex")
});

use MetricCategory::*;

const RULES: &[RuleDef] = &[
    // ── Metabolic ─────────────────────────────────────────
    RuleDef {
        name: "HbA1c",
        category: Metabolic,
        synonyms: &[
            "hemoglobin a1c", "haemoglobin a1c", "glycated hemoglobin", "glycated haemoglobin",
            "glycosylated hemoglobin", "hba1c", "hb a1c", "a1c",
        ],
        units: &[units::PERCENT, units::MMOL_MOL],
    },
    RuleDef {
        name: "Glucose",
        category: Metabolic,
        synonyms: &[
            "fasting blood sugar", "fasting glucose", "blood glucose", "plasma glucose",
            "glucose", "fbs",
        ],
        units: &[units::MG_DL, units::MMOL_L],
    },
    // ── Hematology ────────────────────────────────────────
    RuleDef {
        name: "MCHC",
        category: Hematology,
        synonyms: &["mean corpuscular hemoglobin concentration", "mchc"],
        units: &[units::G_DL, units::G_L, units::PERCENT],
    },
    RuleDef {
        name: "MCH",
        category: Hematology,
        synonyms: &["mean corpuscular hemoglobin", "mch"],
        units: &[units::PG],
    },
    RuleDef {
        name: "MCV",
        category: Hematology,
        synonyms: &["mean corpuscular volume", "mcv"],
        units: &[units::FL],
    },
    RuleDef {
        name: "Hemoglobin",
        category: Hematology,
        synonyms: &["hemoglobin", "haemoglobin", "hgb", "hb"],
        units: &[units::G_DL, units::G_L],
    },
    RuleDef {
        name: "Hematocrit",
        category: Hematology,
        synonyms: &["hematocrit", "haematocrit", "hct", "pcv"],
        units: &[units::PERCENT],
    },
    RuleDef {
        name: "White Blood Cells",
        category: Hematology,
        synonyms: &[
            "white blood cell count", "white blood cells", "white blood cell",
            "total leukocyte count", "leukocytes", "wbc",
        ],
        units: &[units::CELLS_UL],
    },
    RuleDef {
        name: "Red Blood Cells",
        category: Hematology,
        synonyms: &[
            "red blood cell count", "red blood cells", "red blood cell", "erythrocytes", "rbc",
        ],
        units: &[units::RBC_UL],
    },
    RuleDef {
        name: "Platelets",
        category: Hematology,
        synonyms: &["platelet count", "platelets", "platelet", "plt"],
        units: &[units::CELLS_UL],
    },
    // ── Lipids ────────────────────────────────────────────
    RuleDef {
        name: "Non-HDL Cholesterol",
        category: Lipids,
        synonyms: &["non-hdl cholesterol", "non hdl cholesterol", "non-hdl"],
        units: &[units::MG_DL, units::MMOL_L],
    },
    RuleDef {
        name: "HDL Cholesterol",
        category: Lipids,
        synonyms: &["hdl cholesterol", "hdl-cholesterol", "hdl-c", "hdl"],
        units: &[units::MG_DL, units::MMOL_L],
    },
    RuleDef {
        name: "LDL Cholesterol",
        category: Lipids,
        synonyms: &["ldl cholesterol", "ldl-cholesterol", "ldl-c", "ldl"],
        units: &[units::MG_DL, units::MMOL_L],
    },
    RuleDef {
        name: "Total Cholesterol",
        category: Lipids,
        synonyms: &["total cholesterol", "cholesterol, total", "cholesterol"],
        units: &[units::MG_DL, units::MMOL_L],
    },
    RuleDef {
        name: "Triglycerides",
        category: Lipids,
        synonyms: &["triglycerides", "triglyceride", "trig"],
        units: &[units::MG_DL, units::MMOL_L],
    },
    // ── Kidney ────────────────────────────────────────────
    RuleDef {
        name: "eGFR",
        category: Kidney,
        synonyms: &["estimated gfr", "egfr", "gfr"],
        units: &[units::GFR],
    },
    RuleDef {
        name: "Creatinine",
        category: Kidney,
        synonyms: &["serum creatinine", "creatinine", "creat"],
        units: &[units::MG_DL, units::UMOL_L],
    },
    RuleDef {
        name: "Blood Urea Nitrogen",
        category: Kidney,
        synonyms: &["blood urea nitrogen", "urea nitrogen", "bun"],
        units: &[units::MG_DL, units::MMOL_L],
    },
    RuleDef {
        name: "Urea",
        category: Kidney,
        synonyms: &["urea"],
        units: &[units::MG_DL, units::MMOL_L],
    },
    RuleDef {
        name: "Uric Acid",
        category: Kidney,
        synonyms: &["uric acid", "urate"],
        units: &[units::MG_DL, units::UMOL_L],
    },
    // ── Liver ─────────────────────────────────────────────
    RuleDef {
        name: "ALT",
        category: Liver,
        synonyms: &["alanine aminotransferase", "alanine transaminase", "sgpt", "alt"],
        units: &[units::U_L],
    },
    RuleDef {
        name: "AST",
        category: Liver,
        synonyms: &["aspartate aminotransferase", "aspartate transaminase", "sgot", "ast"],
        units: &[units::U_L],
    },
    RuleDef {
        name: "ALP",
        category: Liver,
        synonyms: &["alkaline phosphatase", "alk phos", "alp"],
        units: &[units::U_L],
    },
    RuleDef {
        name: "GGT",
        category: Liver,
        synonyms: &["gamma-glutamyl transferase", "gamma glutamyl transferase", "gamma gt", "ggt"],
        units: &[units::U_L],
    },
    RuleDef {
        name: "Direct Bilirubin",
        category: Liver,
        synonyms: &["direct bilirubin", "conjugated bilirubin", "bilirubin, direct"],
        units: &[units::MG_DL, units::UMOL_L],
    },
    RuleDef {
        name: "Total Bilirubin",
        category: Liver,
        synonyms: &["total bilirubin", "bilirubin, total", "bilirubin"],
        units: &[units::MG_DL, units::UMOL_L],
    },
    RuleDef {
        name: "Albumin",
        category: Liver,
        synonyms: &["serum albumin", "albumin"],
        units: &[units::G_DL, units::G_L],
    },
    // ── Electrolytes ──────────────────────────────────────
    RuleDef {
        name: "Sodium",
        category: Electrolytes,
        synonyms: &["sodium", "na+"],
        units: &[units::MMOL_L, units::MEQ_L],
    },
    RuleDef {
        name: "Potassium",
        category: Electrolytes,
        synonyms: &["potassium", "k+"],
        units: &[units::MMOL_L, units::MEQ_L],
    },
    RuleDef {
        name: "Chloride",
        category: Electrolytes,
        synonyms: &["chloride", "cl-"],
        units: &[units::MMOL_L, units::MEQ_L],
    },
    RuleDef {
        name: "Bicarbonate",
        category: Electrolytes,
        synonyms: &["bicarbonate", "hco3-", "hco3", "total co2", "co2"],
        units: &[units::MMOL_L, units::MEQ_L],
    },
    RuleDef {
        name: "Calcium",
        category: Electrolytes,
        synonyms: &["total calcium", "calcium"],
        units: &[units::MG_DL, units::MMOL_L],
    },
    RuleDef {
        name: "Magnesium",
        category: Electrolytes,
        synonyms: &["magnesium"],
        units: &[units::MG_DL, units::MMOL_L, units::MEQ_L],
    },
    RuleDef {
        name: "Phosphorus",
        category: Electrolytes,
        synonyms: &["phosphorus", "phosphate"],
        units: &[units::MG_DL, units::MMOL_L],
    },
    // ── Thyroid ───────────────────────────────────────────
    RuleDef {
        name: "TSH",
        category: Thyroid,
        synonyms: &["thyroid stimulating hormone", "thyrotropin", "tsh"],
        units: &[units::MIU_L],
    },
    RuleDef {
        name: "Free T4",
        category: Thyroid,
        synonyms: &["free thyroxine", "free t4", "ft4"],
        units: &[units::NG_DL, units::PMOL_L],
    },
    RuleDef {
        name: "Free T3",
        category: Thyroid,
        synonyms: &["free triiodothyronine", "free t3", "ft3"],
        units: &[units::PG_ML, units::PG_DL, units::PMOL_L],
    },
    // ── Vitamins ──────────────────────────────────────────
    RuleDef {
        name: "Vitamin D",
        category: Vitamins,
        synonyms: &[
            "25-hydroxyvitamin d", "25-oh vitamin d", "vitamin d, 25-oh", "25(oh)d",
            "vitamin d3", "vitamin d",
        ],
        units: &[units::NG_ML, units::NMOL_L],
    },
    RuleDef {
        name: "Vitamin B12",
        category: Vitamins,
        synonyms: &["vitamin b12", "cobalamin", "b12"],
        units: &[units::PG_ML, units::PMOL_L],
    },
    RuleDef {
        name: "Folate",
        category: Vitamins,
        synonyms: &["folic acid", "folate"],
        units: &[units::NG_ML, units::NMOL_L],
    },
    // ── Iron studies ──────────────────────────────────────
    RuleDef {
        name: "TIBC",
        category: IronStudies,
        synonyms: &["total iron binding capacity", "iron binding capacity", "tibc"],
        units: &[units::UG_DL, units::UMOL_L],
    },
    RuleDef {
        name: "Transferrin Saturation",
        category: IronStudies,
        synonyms: &["transferrin saturation", "iron saturation", "tsat"],
        units: &[units::PERCENT],
    },
    RuleDef {
        name: "Ferritin",
        category: IronStudies,
        synonyms: &["serum ferritin", "ferritin"],
        units: &[units::NG_ML, units::UG_L],
    },
    RuleDef {
        name: "Iron",
        category: IronStudies,
        synonyms: &["serum iron", "iron"],
        units: &[units::UG_DL, units::UMOL_L],
    },
    // ── Inflammation ──────────────────────────────────────
    RuleDef {
        name: "CRP",
        category: Inflammation,
        synonyms: &[
            "high sensitivity c-reactive protein", "c-reactive protein", "hs-crp", "hscrp", "crp",
        ],
        units: &[units::MG_L, units::MG_DL],
    },
    RuleDef {
        name: "ESR",
        category: Inflammation,
        synonyms: &["erythrocyte sedimentation rate", "sed rate", "esr"],
        units: &[units::MM_HR],
    },
];

/// One compiled recognition rule.
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pub name: &'static str,
    pub category: MetricCategory,
    pub synonyms: &'static [&'static str],
    pub units: &'static [UnitTable],
    pub critical_multiplier: f64,
    pub name_pattern: Regex,
    pub value_pattern: Regex,
    pub range_pattern: Regex,
}

impl ExtractionRule {
    fn compile(def: &RuleDef) -> Result<Self, regex::Error> {
        Ok(Self {
            name: def.name,
            category: def.category,
            synonyms: def.synonyms,
            units: def.units,
            critical_multiplier: def.category.critical_multiplier(),
            name_pattern: name_pattern(def.synonyms)?,
            value_pattern: VALUE_PATTERN.clone(),
            range_pattern: RANGE_PATTERN.clone(),
        })
    }

    /// Canonical unit for `raw` when it is one of this analyte's spellings.
    pub fn canonical_unit(&self, raw: &str) -> Option<&'static str> {
        units::canonical_unit(raw, self.units)
    }
}

/// Case-insensitive alternation, longest synonym first. Word boundaries are
/// only asserted on sides that end in a word character, so `k+` and `cl-`
/// still match before a space.
fn name_pattern(synonyms: &[&str]) -> Result<Regex, regex::Error> {
    let mut sorted: Vec<&str> = synonyms.to_vec();
    sorted.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let alternatives: Vec<String> = sorted
        .iter()
        .map(|syn| {
            let starts_word = syn.chars().next().is_some_and(char::is_alphanumeric);
            let ends_word = syn.chars().last().is_some_and(char::is_alphanumeric);
            format!(
                "{}{}{}",
                if starts_word { r"\b" } else { "" },
                regex::escape(syn),
                if ends_word { r"\b" } else { "" },
            )
        })
        .collect();

    Regex::new(&format!("(?i)(?:{})", alternatives.join("|")))
}

/// Read-only rule table shared by every extraction call.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    rules: Vec<ExtractionRule>,
}

static STANDARD: LazyLock<MetricRegistry> =
    LazyLock::new(|| MetricRegistry::build().expect("Invalid built-in metric rule"));

impl MetricRegistry {
    fn build() -> Result<Self, regex::Error> {
        let rules = RULES
            .iter()
            .map(ExtractionRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// The built-in lab analyte table.
    pub fn standard() -> &'static MetricRegistry {
        &STANDARD
    }

    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&ExtractionRule> {
        self.rules.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
