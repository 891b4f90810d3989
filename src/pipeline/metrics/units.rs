//! Unit synonym tables and unit token recognition.
//!
//! Each table maps a lowercase raw spelling to the canonical unit. Rules
//! list the tables that apply to their analyte.

use std::sync::LazyLock;

use regex::Regex;

pub type UnitTable = &'static [(&'static str, &'static str)];

pub const MG_DL: UnitTable = &[
    ("mg/dl", "mg/dL"),
    ("mg/100ml", "mg/dL"),
    ("mg%", "mg/dL"),
    ("mgdl", "mg/dL"),
];
pub const G_DL: UnitTable = &[("g/dl", "g/dL"), ("gm/dl", "g/dL"), ("g%", "g/dL")];
pub const G_L: UnitTable = &[("g/l", "g/L")];
pub const MMOL_L: UnitTable = &[("mmol/l", "mmol/L"), ("mmol", "mmol/L")];
pub const MEQ_L: UnitTable = &[("meq/l", "mEq/L")];
pub const UMOL_L: UnitTable = &[("umol/l", "µmol/L"), ("µmol/l", "µmol/L"), ("μmol/l", "µmol/L")];
pub const PERCENT: UnitTable = &[("%", "%"), ("percent", "%")];
pub const MMOL_MOL: UnitTable = &[("mmol/mol", "mmol/mol")];
pub const U_L: UnitTable = &[("u/l", "U/L"), ("iu/l", "U/L"), ("ui/l", "U/L")];
pub const MG_L: UnitTable = &[("mg/l", "mg/L")];
pub const MM_HR: UnitTable = &[("mm/hr", "mm/hr"), ("mm/h", "mm/hr"), ("mm/1hr", "mm/hr")];
pub const NG_ML: UnitTable = &[("ng/ml", "ng/mL")];
pub const NG_DL: UnitTable = &[("ng/dl", "ng/dL")];
pub const PG_ML: UnitTable = &[("pg/ml", "pg/mL")];
pub const PG_DL: UnitTable = &[("pg/dl", "pg/dL")];
pub const PMOL_L: UnitTable = &[("pmol/l", "pmol/L")];
pub const NMOL_L: UnitTable = &[("nmol/l", "nmol/L")];
pub const UG_DL: UnitTable = &[("ug/dl", "µg/dL"), ("µg/dl", "µg/dL"), ("μg/dl", "µg/dL"), ("mcg/dl", "µg/dL")];
pub const UG_L: UnitTable = &[("ug/l", "µg/L"), ("µg/l", "µg/L"), ("μg/l", "µg/L"), ("mcg/l", "µg/L")];
pub const MIU_L: UnitTable = &[
    ("miu/l", "mIU/L"),
    ("uiu/ml", "mIU/L"),
    ("µiu/ml", "mIU/L"),
    ("μiu/ml", "mIU/L"),
    ("mu/l", "mIU/L"),
];
pub const GFR: UnitTable = &[
    ("ml/min/1.73m2", "mL/min/1.73m²"),
    ("ml/min/1.73m²", "mL/min/1.73m²"),
    ("ml/min/1.73", "mL/min/1.73m²"),
    ("ml/min", "mL/min/1.73m²"),
];
pub const CELLS_UL: UnitTable = &[
    ("10^3/ul", "10^3/µL"),
    ("10^3/µl", "10^3/µL"),
    ("10^3/μl", "10^3/µL"),
    ("x10^3/ul", "10^3/µL"),
    ("x10^3/µl", "10^3/µL"),
    ("10*3/ul", "10^3/µL"),
    ("k/ul", "10^3/µL"),
    ("k/µl", "10^3/µL"),
    ("thou/ul", "10^3/µL"),
    ("10^9/l", "10^3/µL"),
    ("x10^9/l", "10^3/µL"),
];
pub const RBC_UL: UnitTable = &[
    ("10^6/ul", "10^6/µL"),
    ("10^6/µl", "10^6/µL"),
    ("10^6/μl", "10^6/µL"),
    ("x10^6/ul", "10^6/µL"),
    ("x10^6/µl", "10^6/µL"),
    ("10*6/ul", "10^6/µL"),
    ("m/ul", "10^6/µL"),
    ("mill/ul", "10^6/µL"),
    ("10^12/l", "10^6/µL"),
    ("x10^12/l", "10^6/µL"),
];
pub const FL: UnitTable = &[("fl", "fL")];
pub const PG: UnitTable = &[("pg", "pg"), ("pg/cell", "pg")];

const ALL_TABLES: &[UnitTable] = &[
    MG_DL, G_DL, G_L, MMOL_L, MEQ_L, UMOL_L, PERCENT, MMOL_MOL, U_L, MG_L, MM_HR, NG_ML, NG_DL,
    PG_ML, PG_DL, PMOL_L, NMOL_L, UG_DL, UG_L, MIU_L, GFR, CELLS_UL, RBC_UL, FL, PG,
];

/// A unit token right after a value: scientific cell counts (`x10^3/uL`,
/// `10*6/µL`) or anything starting with a letter, `%` or micro sign.
static UNIT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[x×]?\s?10\s?[\^\*]\s?\d+\s?/\s?[\p{L}µμ]+|[%\p{L}µμ][\p{L}\p{N}µμ%/\^\*\.²]*)")
        .expect("Invalid unit token regex")
});

/// Abnormality markers printed beside a value; never a unit.
const FLAG_WORDS: &[&str] = &[
    "h", "l", "hi", "lo", "high", "low", "n", "normal", "a", "abnormal", "c", "crit", "critical",
];

/// Unit tokens are written in a handful of alphabets; fold them before lookup.
fn fold(raw: &str) -> String {
    raw.trim_end_matches(['.', ',', ';'])
        .replace('×', "x")
        .replace(' ', "")
        .to_lowercase()
}

/// Canonical spelling of `raw` among `tables`, if it is a known variant.
pub fn canonical_unit(raw: &str, tables: &[UnitTable]) -> Option<&'static str> {
    let folded = fold(raw);
    tables
        .iter()
        .flat_map(|table| table.iter())
        .find(|(variant, _)| *variant == folded)
        .map(|(_, canonical)| *canonical)
}

/// Whether `raw` is a spelling of any unit this crate knows.
pub fn is_known_unit(raw: &str) -> bool {
    canonical_unit(raw, ALL_TABLES).is_some()
}

pub fn is_flag_word(token: &str) -> bool {
    let folded = token
        .trim_matches(|c: char| matches!(c, '(' | ')' | '[' | ']' | '*' | '!'))
        .to_lowercase();
    !folded.is_empty() && FLAG_WORDS.contains(&folded.as_str())
}

/// Length in bytes of the unit token at the start of `s`, if any.
pub fn unit_token_len(s: &str) -> Option<usize> {
    let m = UNIT_TOKEN.find(s)?;
    let token = m.as_str().trim_end_matches(['.', ',', ';']);
    (!token.is_empty()).then_some(token.len())
}
