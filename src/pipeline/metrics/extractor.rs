//! Pattern-based lab value extraction.
//!
//! Best-effort and total: malformed text yields fewer metrics, never an
//! error. Every name occurrence is located first (earlier rules claim their
//! spans), then each occurrence reads its value, unit and range from the
//! text that follows it, up to the next metric name.

use std::collections::BTreeMap;

use tracing::debug;

use super::flag::compute_flag;
use super::rules::{ExtractionRule, MetricRegistry};
use super::units::{is_flag_word, is_known_unit, unit_token_len};
use super::{ExtractionWarning, MetricExtraction};
use crate::config::DEFAULT_WINDOW_CHARS;
use crate::models::{HealthMetric, NormalRange};

/// Extract with the built-in registry and default window.
pub fn extract(text: &str) -> Vec<HealthMetric> {
    extract_with_diagnostics(text).metrics
}

pub fn extract_with_diagnostics(text: &str) -> MetricExtraction {
    MetricRegistry::standard().extract(text, DEFAULT_WINDOW_CHARS)
}

/// A rule's name found at `start..end` of the normalized text.
#[derive(Debug, Clone, Copy)]
struct NameHit {
    rule: usize,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    rule: usize,
    position: usize,
    value: f64,
    raw_unit: Option<String>,
    canonical_unit: Option<&'static str>,
    range: Option<NormalRange>,
}

impl Candidate {
    /// Local match quality used to pick among duplicates.
    fn score(&self) -> u8 {
        u8::from(self.raw_unit.is_some())
            + u8::from(self.canonical_unit.is_some())
            + 2 * u8::from(self.range.is_some())
    }
}

impl MetricRegistry {
    pub fn extract(&self, text: &str, window_chars: usize) -> MetricExtraction {
        let normalized = normalize_whitespace(text);
        let hits = self.locate_names(&normalized);

        let mut candidates = Vec::new();
        for (i, hit) in hits.iter().enumerate() {
            let limit = hits.get(i + 1).map_or(normalized.len(), |next| next.start);
            let rule = &self.rules()[hit.rule];
            if let Some(candidate) = read_candidate(rule, hit, &normalized, limit, window_chars) {
                candidates.push(candidate);
            }
        }

        self.finish(candidates)
    }

    /// Name occurrences of every rule, in text order. A span claimed by an
    /// earlier rule cannot be matched again.
    fn locate_names(&self, text: &str) -> Vec<NameHit> {
        let mut hits: Vec<NameHit> = Vec::new();
        for (idx, rule) in self.rules().iter().enumerate() {
            for m in rule.name_pattern.find_iter(text) {
                let overlaps = hits.iter().any(|h| m.start() < h.end && h.start < m.end());
                if !overlaps {
                    hits.push(NameHit {
                        rule: idx,
                        start: m.start(),
                        end: m.end(),
                    });
                }
            }
        }
        hits.sort_by_key(|h| h.start);
        hits
    }

    /// Duplicate suppression, flagging and warnings.
    fn finish(&self, candidates: Vec<Candidate>) -> MetricExtraction {
        // rule index -> (kept, discarded values)
        let mut best: BTreeMap<usize, (Candidate, Vec<f64>)> = BTreeMap::new();
        for candidate in candidates {
            match best.get_mut(&candidate.rule) {
                None => {
                    best.insert(candidate.rule, (candidate, Vec::new()));
                }
                Some((kept, discarded)) => {
                    if candidate.score() > kept.score() {
                        let previous = std::mem::replace(kept, candidate);
                        discarded.push(previous.value);
                    } else {
                        discarded.push(candidate.value);
                    }
                }
            }
        }

        let mut kept: Vec<(Candidate, Vec<f64>)> = best.into_values().collect();
        kept.sort_by_key(|(c, _)| c.position);

        let mut extraction = MetricExtraction::default();
        for (candidate, discarded) in kept {
            let rule = &self.rules()[candidate.rule];
            let metric = rule.name.to_string();

            if let (Some(raw), None) = (&candidate.raw_unit, candidate.canonical_unit) {
                extraction.warnings.push(ExtractionWarning::UnnormalizedUnit {
                    metric: metric.clone(),
                    unit: raw.clone(),
                });
            }
            if candidate.range.is_none() {
                extraction
                    .warnings
                    .push(ExtractionWarning::RangeNotFound { metric: metric.clone() });
            }
            let conflicting: Vec<f64> = discarded
                .into_iter()
                .filter(|v| (v - candidate.value).abs() > f64::EPSILON)
                .collect();
            if !conflicting.is_empty() {
                debug!(metric = %metric, kept = candidate.value, "Conflicting duplicate values");
                extraction.warnings.push(ExtractionWarning::AmbiguousDuplicate {
                    metric: metric.clone(),
                    kept: candidate.value,
                    discarded: conflicting,
                });
            }

            let flag = compute_flag(
                candidate.value,
                candidate.range.as_ref(),
                rule.critical_multiplier,
            );
            let unit = candidate
                .canonical_unit
                .map(str::to_string)
                .or(candidate.raw_unit)
                .unwrap_or_default();

            extraction.metrics.push(HealthMetric {
                category: rule.category,
                metric,
                value: candidate.value,
                unit,
                flag,
                normal_range: candidate.range,
            });
        }
        extraction
    }
}

/// Read value, unit and range following one name occurrence.
fn read_candidate(
    rule: &ExtractionRule,
    hit: &NameHit,
    text: &str,
    limit: usize,
    window_chars: usize,
) -> Option<Candidate> {
    let line_end = text[hit.end..]
        .find('\n')
        .map_or(text.len(), |offset| hit.end + offset);
    let rest_of_line = &text[hit.end..line_end.min(limit)];

    let (window, number) = match first_value(rule, rest_of_line) {
        Some(number) => (rest_of_line, number),
        None => {
            let end = advance_chars(text, hit.end, window_chars).min(limit);
            let window = &text[hit.end..end];
            (window, first_value(rule, window)?)
        }
    };
    let value = parse_number(number.as_str())?;
    let after_value = &window[number.end()..];

    let (raw_unit, canonical_unit, after_unit) = read_unit(rule, after_value);
    let range = read_range(rule, after_unit);

    Some(Candidate {
        rule: hit.rule,
        position: hit.start,
        value,
        raw_unit,
        canonical_unit,
        range,
    })
}

/// First number in `window` that is not the head of a word. "3rd" or
/// "2nd" are skipped, a unit glued on ("85mg/dL") is not.
fn first_value<'a>(rule: &ExtractionRule, window: &'a str) -> Option<regex::Match<'a>> {
    rule.value_pattern
        .captures_iter(window)
        .filter_map(|caps| caps.name("num"))
        .find(|number| {
            let after = &window[number.end()..];
            !after.starts_with(char::is_alphabetic) || glued_unit(after)
        })
}

fn glued_unit(after: &str) -> bool {
    unit_token_len(after).is_some_and(|len| looks_like_unit(&after[..len]))
}

/// Unit token after the value, skipping separators and flag markers.
/// Returns the raw unit, its canonical form and the unread remainder.
fn read_unit<'a>(
    rule: &ExtractionRule,
    mut rest: &'a str,
) -> (Option<String>, Option<&'static str>, &'a str) {
    for _ in 0..3 {
        rest = skip_separators(rest);
        let token = rest.split_whitespace().next().unwrap_or("");
        if token.is_empty() || !is_flag_word(token) {
            break;
        }
        rest = &rest[token.len()..];
    }

    let Some(len) = unit_token_len(rest) else {
        return (None, None, rest);
    };
    let raw = &rest[..len];
    if is_flag_word(raw) {
        return (None, None, rest);
    }
    match rule.canonical_unit(raw) {
        Some(canonical) => (Some(raw.to_string()), Some(canonical), &rest[len..]),
        None if looks_like_unit(raw) => (Some(raw.to_string()), None, &rest[len..]),
        None => (None, None, rest),
    }
}

/// Unknown tokens are only kept as units when they read like one, so
/// "Reference" or "Fasting" are not mistaken for units.
fn looks_like_unit(token: &str) -> bool {
    token.contains(['/', '%', '^', '*']) || is_known_unit(token)
}

fn read_range(rule: &ExtractionRule, text: &str) -> Option<NormalRange> {
    let caps = rule.range_pattern.captures(text)?;
    if let (Some(low), Some(high)) = (caps.name("low"), caps.name("high")) {
        let low = parse_number(low.as_str())?;
        let high = parse_number(high.as_str())?;
        return Some(NormalRange::between(low, high));
    }
    let bound = parse_number(caps.name("bound")?.as_str())?;
    match caps.name("op")?.as_str() {
        "<" | "<=" | "≤" => Some(NormalRange::below(bound)),
        ">" | ">=" | "≥" => Some(NormalRange::above(bound)),
        // "up to"
        _ => Some(NormalRange::below(bound)),
    }
}

fn skip_separators(s: &str) -> &str {
    s.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '|' | '='))
}

/// A comma is a decimal separator unless exactly three digits follow it.
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = match raw.split_once(',') {
        Some((_, tail)) if tail.split('.').next().is_some_and(|d| d.len() == 3) => raw.replace(',', ""),
        Some(_) => raw.replacen(',', ".", 1),
        None => raw.to_string(),
    };
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Byte offset `n` chars after `from`, clamped to the end of `s`.
fn advance_chars(s: &str, from: usize, n: usize) -> usize {
    s[from..]
        .char_indices()
        .nth(n)
        .map_or(s.len(), |(offset, _)| from + offset)
}

/// Collapse whitespace runs inside each line and drop blank lines.
fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
