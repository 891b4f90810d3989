//! Text agreement measures.

use std::collections::HashMap;

/// Levenshtein edit distance over chars, two-row dynamic programming.
pub fn levenshtein(a: &[char], b: &[char]) -> usize {
    let (m, n) = (a.len(), b.len());
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for (i, &a_ch) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &b_ch) in b.iter().enumerate() {
            let cost = usize::from(a_ch != b_ch);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Levenshtein distance if it is at most `max`, else `None`.
///
/// Furthest-reaching diagonals: round `d` extends every diagonal in
/// `[-d, d]` as far as cost `d` allows, sliding over equal chars. Work is
/// about `max² + (m + n)·d`, so near-identical long texts stay cheap and
/// hopeless pairs stop after `max` rounds.
pub fn levenshtein_within(a: &[char], b: &[char], max: usize) -> Option<usize> {
    let (m, n) = (a.len() as i64, b.len() as i64);
    if (m - n).unsigned_abs() as usize > max {
        return None;
    }

    const UNREACHED: i64 = i64::MIN / 2;
    // Diagonal k = j - i lives at index k + offset; one spare slot per side.
    let offset = max as i64 + 1;
    let width = 2 * max + 3;
    let mut prev = vec![UNREACHED; width];
    let mut curr = vec![UNREACHED; width];
    let target = n - m;

    let in_bounds = |i: i64, k: i64| i >= 0 && i <= m && i + k >= 0 && i + k <= n;
    let slide = |mut i: i64, k: i64| {
        while i < m && i + k < n && a[i as usize] == b[(i + k) as usize] {
            i += 1;
        }
        i
    };

    for d in 0..=max as i64 {
        for k in (-d).max(-m)..=d.min(n) {
            let idx = (k + offset) as usize;
            let start = if d == 0 {
                0
            } else {
                // substitution, deletion from `a`, insertion into `a`
                [(prev[idx], 1), (prev[idx + 1], 1), (prev[idx - 1], 0)]
                    .into_iter()
                    .filter(|&(from, _)| from != UNREACHED)
                    .map(|(from, step)| from + step)
                    .filter(|&i| in_bounds(i, k))
                    .max()
                    .unwrap_or(UNREACHED)
            };
            if start == UNREACHED {
                curr[idx] = UNREACHED;
                continue;
            }

            let reached = slide(start, k);
            curr[idx] = reached;
            if k == target && reached == m {
                return Some(d as usize);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
        curr.fill(UNREACHED);
    }
    None
}

/// Lower bound on the edit distance from character counts alone.
fn char_count_bound(a: &[char], b: &[char]) -> usize {
    let mut balance: HashMap<char, i64> = HashMap::new();
    for &c in a {
        *balance.entry(c).or_default() += 1;
    }
    for &c in b {
        *balance.entry(c).or_default() -= 1;
    }
    let (surplus, deficit) = balance.values().fold((0i64, 0i64), |(s, d), &v| {
        if v > 0 {
            (s + v, d)
        } else {
            (s, d - v)
        }
    });
    surplus.max(deficit) as usize
}

/// Lowercase with every whitespace run collapsed to one space.
pub fn normalize_for_comparison(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `1 - distance / max_len >= threshold` on already-normalized
/// texts. Two empty texts are identical.
pub fn agrees(a: &[char], b: &[char], threshold: f64) -> bool {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return true;
    }
    let allowed = ((1.0 - threshold) * longest as f64 + 1e-9).floor().max(0.0) as usize;

    if a.len().abs_diff(b.len()) > allowed || char_count_bound(a, b) > allowed {
        return false;
    }
    levenshtein_within(a, b, allowed).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn lev(a: &str, b: &str) -> usize {
        levenshtein(&chars(a), &chars(b))
    }

    fn ratio(a: &str, b: &str) -> f64 {
        let longest = a.chars().count().max(b.chars().count());
        if longest == 0 {
            return 1.0;
        }
        1.0 - lev(a, b) as f64 / longest as f64
    }

    #[test]
    fn distance_basics() {
        assert_eq!(lev("kitten", "sitting"), 3);
        assert_eq!(lev("", "abc"), 3);
        assert_eq!(lev("abc", ""), 3);
        assert_eq!(lev("abc", "abc"), 0);
        assert_eq!(lev("creatinine", "creatiniue"), 1);
    }

    #[test]
    fn distance_counts_chars_not_bytes() {
        assert_eq!(lev("µg/L", "ug/L"), 1);
    }

    #[test]
    fn bounded_distance_matches_full_distance() {
        let pairs = [
            ("kitten", "sitting"),
            ("", ""),
            ("", "abc"),
            ("abc", ""),
            ("flaw", "lawn"),
            ("glucose 95 mg/dl", "gIucose 9s mg/dl"),
            ("hemoglobin", "haemoglobin a1c"),
            ("abcdef", "fedcba"),
            ("sodium 140", "potassium 4.1"),
        ];
        for (a, b) in pairs {
            let exact = lev(a, b);
            for max in 0..=exact + 2 {
                let expected = (exact <= max).then_some(exact);
                assert_eq!(levenshtein_within(&chars(a), &chars(b), max), expected, "{a:?} {b:?} max={max}");
            }
        }
    }

    #[test]
    fn agreement_matches_ratio_definition() {
        let pairs = [
            ("abcd", "abcf"),
            ("glucose 95 mg/dl 70-100", "glucose 95 mg/dl 70-1oo"),
            ("sodium 140 mmol/l", "~~ illegible ~~"),
            ("abc", "abc"),
            ("abc", ""),
        ];
        for (a, b) in pairs {
            for threshold in [0.5, 0.75, 0.85, 0.9, 1.0] {
                assert_eq!(
                    agrees(&chars(a), &chars(b), threshold),
                    ratio(a, b) >= threshold,
                    "{a:?} {b:?} at {threshold}"
                );
            }
        }
        assert!(agrees(&[], &[], 1.0));
    }

    #[test]
    fn normalization_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_for_comparison("  Glucose\t95  MG/DL\n\nSodium 140 "),
            "glucose 95 mg/dl sodium 140"
        );
    }

    #[test]
    fn near_identical_ocr_outputs_exceed_default_threshold() {
        let a = normalize_for_comparison("Glucose 95 mg/dL 70-100\nHemoglobin 13.2 g/dL 12.0-16.0");
        let b = normalize_for_comparison("Glucose 95 mg/dl 70-100\nHemogIobin 13.2 g/dL 12.0-16.0");
        assert!(agrees(&chars(&a), &chars(&b), 0.85));
    }
}
