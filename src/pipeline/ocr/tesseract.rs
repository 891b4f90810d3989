//! Tesseract adapter: one `tesseract stdin stdout ... tsv` subprocess per page.
//!
//! The child is spawned with `kill_on_drop`, so cancelling the future
//! (timeout, aborted task) terminates the process.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::types::{EngineHealth, Recognition, RecognizeOptions};
use super::EngineError;
use crate::config::EngineSettings;
use crate::pipeline::extraction::NormalizedPage;

/// Word rows in TSV output.
const TSV_WORD_LEVEL: u32 = 5;
const TSV_COLUMNS: usize = 12;

#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: String,
    language: String,
    psm: u8,
}

impl TesseractEngine {
    pub const NAME: &'static str = "tesseract";

    pub fn new(binary: &str, language: &str, psm: u8) -> Self {
        Self {
            binary: binary.to_string(),
            language: language.to_string(),
            psm,
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(
            &settings.tesseract_bin,
            &settings.tesseract_lang,
            settings.tesseract_psm,
        )
    }

    /// Per-call override if non-blank, else the configured language.
    fn language_for<'a>(&'a self, options: &'a RecognizeOptions) -> &'a str {
        options
            .language
            .as_deref()
            .map(str::trim)
            .filter(|lang| !lang.is_empty())
            .unwrap_or(&self.language)
    }

    /// Binary runs and every language the call will use is installed.
    pub async fn healthcheck(&self, options: &RecognizeOptions) -> EngineHealth {
        let output = match Command::new(&self.binary)
            .arg("--list-langs")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => return EngineHealth::Unhealthy(format!("cannot run {}: {e}", self.binary)),
        };

        if !output.status.success() {
            return EngineHealth::Unhealthy(format!("--list-langs exited with {}", output.status));
        }

        // Older releases print the list on stderr
        let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        let installed = parse_language_list(&listing);

        match self
            .language_for(options)
            .split('+')
            .find(|lang| !installed.iter().any(|i| i == lang))
        {
            Some(missing) => EngineHealth::Unhealthy(format!("language '{missing}' not installed")),
            None => EngineHealth::Healthy,
        }
    }

    pub async fn recognize(
        &self,
        pages: &[NormalizedPage],
        options: &RecognizeOptions,
    ) -> Result<Recognition, EngineError> {
        let language = self.language_for(options);

        let mut recognition = Recognition::default();
        for page in pages {
            let tsv = self.run_page(page, language).await?;
            let parsed = parse_tsv(&tsv);
            debug!(
                page = page.page_number,
                words = parsed.word_confidences.len(),
                "Tesseract page recognized"
            );
            recognition.page_texts.push(parsed.text);
            recognition.token_confidences.extend(parsed.word_confidences);
        }
        Ok(recognition)
    }

    async fn run_page(&self, page: &NormalizedPage, language: &str) -> Result<String, EngineError> {
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", language, "--psm"])
            .arg(self.psm.to_string())
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::unavailable(Self::NAME, format!("cannot spawn {}: {e}", self.binary)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::failed(Self::NAME, "stdin not captured"))?;
        let png = page.png_bytes.as_slice();
        let feed = async move {
            let written = stdin.write_all(png).await;
            drop(stdin);
            written
        };

        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| EngineError::failed(Self::NAME, format!("wait failed: {e}")))?;
        written.map_err(|e| EngineError::failed(Self::NAME, format!("writing page image: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::failed(
                Self::NAME,
                format!("page {} exited with {}: {}", page.page_number, output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default, PartialEq)]
struct ParsedTsv {
    text: String,
    word_confidences: Vec<f64>,
}

/// Rebuild page text from TSV word rows.
///
/// Columns: level page_num block_num par_num line_num word_num left top
/// width height conf text. Words sharing (block, par, line) form one line;
/// a new block or paragraph starts after a blank line.
fn parse_tsv(tsv: &str) -> ParsedTsv {
    let mut parsed = ParsedTsv::default();
    let mut current_key: Option<(u32, u32, u32)> = None;
    let mut line_words: Vec<&str> = Vec::new();

    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < TSV_COLUMNS {
            continue;
        }
        let Ok(level) = fields[0].parse::<u32>() else {
            continue;
        };
        if level != TSV_WORD_LEVEL {
            continue;
        }
        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }
        let key = (
            fields[2].parse().unwrap_or(0),
            fields[3].parse().unwrap_or(0),
            fields[4].parse().unwrap_or(0),
        );
        let conf: f64 = fields[10].parse().unwrap_or(0.0);

        if current_key != Some(key) {
            if let Some((block, par, _)) = current_key {
                flush_line(&mut parsed.text, &mut line_words);
                parsed.text.push('\n');
                if (block, par) != (key.0, key.1) {
                    parsed.text.push('\n');
                }
            }
            current_key = Some(key);
        }
        line_words.push(word);
        parsed.word_confidences.push(conf.max(0.0));
    }
    flush_line(&mut parsed.text, &mut line_words);

    parsed
}

fn flush_line(text: &mut String, words: &mut Vec<&str>) {
    text.push_str(&words.join(" "));
    words.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ocr::{test_pages, EngineFailure};

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(block: u32, par: u32, line: u32, conf: &str, text: &str) -> String {
        format!("5\t1\t{block}\t{par}\t{line}\t1\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn tsv_groups_words_into_lines() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t".to_string(),
            word(1, 1, 1, "96", "Glucose"),
            word(1, 1, 1, "92", "95"),
            word(1, 1, 1, "90", "mg/dL"),
            word(1, 1, 2, "88", "Sodium"),
            word(1, 1, 2, "86", "140"),
        ]
        .join("\n");

        let parsed = parse_tsv(&tsv);
        assert_eq!(parsed.text, "Glucose 95 mg/dL\nSodium 140");
        assert_eq!(parsed.word_confidences, vec![96.0, 92.0, 90.0, 88.0, 86.0]);
    }

    #[test]
    fn tsv_separates_blocks_with_blank_line() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 1, "90", "CHEMISTRY"),
            word(2, 1, 1, "90", "Glucose"),
        ]
        .join("\n");
        assert_eq!(parse_tsv(&tsv).text, "CHEMISTRY\n\nGlucose");
    }

    #[test]
    fn tsv_skips_malformed_and_empty_rows() {
        let tsv = [
            HEADER.to_string(),
            "garbage".to_string(),
            word(1, 1, 1, "90", "  "),
            word(1, 1, 1, "-1", "Hb"),
        ]
        .join("\n");
        let parsed = parse_tsv(&tsv);
        assert_eq!(parsed.text, "Hb");
        assert_eq!(parsed.word_confidences, vec![0.0]);
    }

    #[test]
    fn empty_tsv_has_no_tokens() {
        let parsed = parse_tsv(HEADER);
        assert_eq!(parsed, ParsedTsv::default());
    }

    #[test]
    fn language_list_parsing() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nfra\nosd\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "fra", "osd"]);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let engine = TesseractEngine::new("/nonexistent/tesseract-bin", "eng", 6);

        assert!(!engine.healthcheck(&RecognizeOptions::default()).await.is_healthy());
        let err = engine
            .recognize(&test_pages(1), &RecognizeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.reason, EngineFailure::Unavailable(_)));
        assert_eq!(err.engine, "tesseract");
    }

    /// Shell script standing in for the tesseract binary.
    #[cfg(unix)]
    fn fake_tesseract(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("tesseract");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn subprocess_output_parsed_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let script = format!(
            r#"if [ "$1" = "--list-langs" ]; then printf 'List of available languages (2):\neng\nosd\n'; exit 0; fi
cat > /dev/null
printf '{HEADER}\n'
printf '5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tGlucose\n'
printf '5\t1\t1\t1\t1\t2\t0\t0\t10\t10\t80\t85\n'"#
        );
        let engine = TesseractEngine::new(&fake_tesseract(&dir, &script), "eng", 6);

        assert!(engine.healthcheck(&RecognizeOptions::default()).await.is_healthy());
        let recognition = engine
            .recognize(&test_pages(2), &RecognizeOptions::default())
            .await
            .unwrap();
        assert_eq!(recognition.page_texts, vec!["Glucose 85", "Glucose 85"]);
        assert_eq!(recognition.token_confidences, vec![90.0, 80.0, 90.0, 80.0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_language_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TesseractEngine::new(
            &fake_tesseract(&dir, "printf 'List of available languages (1):\\neng\\n'"),
            "eng+deu",
            6,
        );
        match engine.healthcheck(&RecognizeOptions::default()).await {
            EngineHealth::Unhealthy(reason) => assert!(reason.contains("deu"), "{reason}"),
            EngineHealth::Healthy => panic!("deu is not installed"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TesseractEngine::new(
            &fake_tesseract(&dir, "cat > /dev/null; echo 'Error in pixReadMem' >&2; exit 1"),
            "eng",
            6,
        );
        let err = engine
            .recognize(&test_pages(1), &RecognizeOptions::default())
            .await
            .unwrap_err();
        match err.reason {
            EngineFailure::Failed(detail) => assert!(detail.contains("pixReadMem"), "{detail}"),
            other => panic!("unexpected failure kind: {other}"),
        }
    }

    /// Lists only `deu` and echoes the `-l` argument as the recognized word.
    #[cfg(unix)]
    fn german_only_tesseract(dir: &tempfile::TempDir) -> String {
        let script = format!(
            r#"if [ "$1" = "--list-langs" ]; then printf 'List of available languages (1):\ndeu\n'; exit 0; fi
cat > /dev/null
printf '{HEADER}\n'
printf '5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tLANG=%s\n' "$4""#
        );
        fake_tesseract(dir, &script)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn configured_language_used_without_override() {
        let dir = tempfile::tempdir().unwrap();
        let settings = EngineSettings {
            tesseract_bin: german_only_tesseract(&dir),
            tesseract_lang: "deu".into(),
            ..EngineSettings::default()
        };
        let engine = TesseractEngine::from_settings(&settings);
        let options = RecognizeOptions {
            language: crate::config::PipelineOptions::default().ocr_language,
        };

        assert!(engine.healthcheck(&options).await.is_healthy());
        let recognition = engine.recognize(&test_pages(1), &options).await.unwrap();
        assert_eq!(recognition.page_texts, vec!["LANG=deu"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn language_override_is_healthchecked() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TesseractEngine::new(&german_only_tesseract(&dir), "deu", 6);
        let options = RecognizeOptions {
            language: Some("eng".into()),
        };

        match engine.healthcheck(&options).await {
            EngineHealth::Unhealthy(reason) => assert!(reason.contains("eng"), "{reason}"),
            EngineHealth::Healthy => panic!("eng is not installed"),
        }
        let recognition = engine.recognize(&test_pages(1), &options).await.unwrap();
        assert_eq!(recognition.page_texts, vec!["LANG=eng"]);
    }

    #[test]
    fn blank_override_falls_back_to_configured_language() {
        let engine = TesseractEngine::new("tesseract", "eng+fra", 6);
        let blank = RecognizeOptions {
            language: Some("  ".into()),
        };
        assert_eq!(engine.language_for(&blank), "eng+fra");
        assert_eq!(engine.language_for(&RecognizeOptions::default()), "eng+fra");
    }

    #[test]
    fn built_from_settings() {
        let settings = EngineSettings::default();
        let engine = TesseractEngine::from_settings(&settings);
        assert_eq!(engine.binary, settings.tesseract_bin);
        assert_eq!(engine.psm, settings.tesseract_psm);
    }
}
