/// Clean recognized or extracted text before metric extraction.
///
/// Strips control and unexpected symbol characters, keeps the punctuation
/// lab reports rely on (ranges, comparators, units), trims each line and
/// drops empty lines.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '\t' { ' ' } else { c })
        .filter(|&c| c.is_alphanumeric() || c == ' ' || c == '\n' || is_report_symbol(c))
        .collect::<String>()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_report_symbol(c: char) -> bool {
    matches!(
        c,
        '.' | ','
            | ';'
            | ':'
            | '-'
            | '/'
            | '('
            | ')'
            | '['
            | ']'
            | '+'
            | '='
            | '%'
            | '#'
            | '*'
            | '^'
            | '\''
            | '<'
            | '>'
            | '_'
            | '|'
            | '°'
            | '²'
            | '³'
            | 'µ'
            | 'μ'
            | '±'
            | '×'
            | '≤'
            | '≥'
            | '↑'
            | '↓'
            | '\u{2013}' // en dash, used in ranges
            | '\u{2014}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        let raw = "Glucose 95\x00 mg/dL\x01\x02\nSodium 140";
        let clean = sanitize_extracted_text(raw);
        assert!(!clean.contains('\x00'));
        assert!(!clean.contains('\x01'));
        assert_eq!(clean, "Glucose 95 mg/dL\nSodium 140");
    }

    #[test]
    fn preserves_units_and_ranges() {
        let raw = "Potassium: 4.2 mmol/L (3.5-5.0)";
        assert_eq!(sanitize_extracted_text(raw), raw);
    }

    #[test]
    fn preserves_comparators_and_dashes() {
        let raw = "LDL 130 mg/dL <100\nHDL 45 mg/dL ≥40\nTSH 2.1 µIU/mL 0.4\u{2013}4.0";
        assert_eq!(sanitize_extracted_text(raw), raw);
    }

    #[test]
    fn preserves_exponent_units() {
        let raw = "WBC 6.2 x10^3/µL";
        assert_eq!(sanitize_extracted_text(raw), raw);
    }

    #[test]
    fn drops_box_drawing_noise() {
        let raw = "▌Glucose ▐ 95";
        assert_eq!(sanitize_extracted_text(raw), "Glucose  95");
    }

    #[test]
    fn tabs_become_spaces() {
        assert_eq!(sanitize_extracted_text("Sodium\t140"), "Sodium 140");
    }

    #[test]
    fn collapses_blank_lines_and_trims() {
        let raw = "  Line one  \r\n\n\n  Line two\n\n";
        assert_eq!(sanitize_extracted_text(raw), "Line one\nLine two");
    }

    #[test]
    fn empty_and_control_only() {
        assert_eq!(sanitize_extracted_text(""), "");
        assert_eq!(sanitize_extracted_text("\x00\x01\x02"), "");
    }

    #[test]
    fn keeps_accented_letters() {
        let raw = "Résultat: élevé µg/L";
        assert_eq!(sanitize_extracted_text(raw), raw);
    }
}
