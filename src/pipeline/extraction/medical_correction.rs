//! Post-OCR lab term correction.
//!
//! Fuzzy-matches words against a dictionary of lab analyte names to undo
//! common recognizer confusions (rn→m, u→n, l→t). A word is only rewritten
//! when it is at least 5 letters long, contains no digit, is within edit
//! distance 2 of a term, and that best match is unique.

use crate::pipeline::ensemble::similarity::levenshtein;

const MIN_WORD_CHARS: usize = 5;
const MAX_EDIT_DISTANCE: usize = 2;

/// Lab analyte vocabulary. Sorted, lowercase.
const LAB_TERMS: &[&str] = &[
    "albumin", "alkaline", "basophils", "bicarbonate", "bilirubin",
    "calcium", "chloride", "cholesterol", "creatinine", "eosinophils",
    "ferritin", "fibrinogen", "globulin", "glucose", "hematocrit",
    "hemoglobin", "lymphocytes", "magnesium", "monocytes", "neutrophils",
    "phosphate", "phosphorus", "platelets", "potassium", "protein",
    "sodium", "thyroxine", "transferrin", "triglycerides", "triiodothyronine",
    "urea", "vitamin",
];

/// Returns `text` with near-miss lab terms replaced, case pattern kept.
pub fn correct_medical_terms(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut word_buf = String::new();

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            word_buf.push(ch);
        } else {
            flush_word(&mut word_buf, &mut result);
            result.push(ch);
        }
    }
    flush_word(&mut word_buf, &mut result);

    result
}

fn flush_word(word_buf: &mut String, out: &mut String) {
    if word_buf.is_empty() {
        return;
    }
    match try_correct_word(word_buf) {
        Some(fixed) => out.push_str(&fixed),
        None => out.push_str(word_buf),
    }
    word_buf.clear();
}

fn try_correct_word(word: &str) -> Option<String> {
    let char_len = word.chars().count();
    if char_len < MIN_WORD_CHARS || word.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let lower = word.to_lowercase();
    if LAB_TERMS.binary_search(&lower.as_str()).is_ok() {
        return None;
    }

    let lower_chars: Vec<char> = lower.chars().collect();
    let mut best: Option<(&str, usize)> = None;
    let mut ambiguous = false;

    for &term in LAB_TERMS {
        if term.len().abs_diff(char_len) > MAX_EDIT_DISTANCE {
            continue;
        }
        let term_chars: Vec<char> = term.chars().collect();
        let dist = levenshtein(&lower_chars, &term_chars);
        if dist > MAX_EDIT_DISTANCE {
            continue;
        }
        match best {
            Some((_, d)) if dist == d => ambiguous = true,
            Some((_, d)) if dist > d => {}
            _ => {
                best = Some((term, dist));
                ambiguous = false;
            }
        }
    }

    match best {
        Some((term, _)) if !ambiguous => Some(preserve_case(word, term)),
        _ => None,
    }
}

fn preserve_case(original: &str, correction: &str) -> String {
    if original.chars().all(|c| c.is_uppercase() || !c.is_alphabetic()) {
        return correction.to_uppercase();
    }

    let first_upper = original.chars().next().is_some_and(|c| c.is_uppercase());
    if !first_upper {
        return correction.to_string();
    }
    let mut chars = correction.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
