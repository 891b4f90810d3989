//! Configuration surface.
//!
//! `PipelineOptions` is supplied per call by the upload collaborator and
//! deserializes from camelCase JSON. `EngineSettings` wires the OCR backends
//! once per process and reads its overrides from the environment.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::extraction::format::canonical_mime;
use crate::pipeline::extraction::PreprocessOptions;

/// Application-level constants
pub const APP_NAME: &str = "HealthScan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MIME types the normalizer can decode.
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/bmp",
    "image/tiff",
];

pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_PER_ENGINE_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;
pub const DEFAULT_AGREEMENT_BOOST: f64 = 5.0;
pub const DEFAULT_RENDER_DPI: u32 = 300;
/// Lowest DPI that still gives the recognizers usable glyph sizes.
pub const MIN_RENDER_DPI: u32 = 200;
pub const DEFAULT_WINDOW_CHARS: usize = 40;
pub const DEFAULT_ENGINE: &str = "tesseract";
pub const DEFAULT_OCR_LANGUAGE: &str = "eng";
pub const DEFAULT_MAX_CONCURRENT_ENGINES: usize = 4;
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_VISION_MODEL: &str = "llama3.2-vision";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "healthscan_lib=debug,info"
    } else {
        "healthscan_lib=info,warn"
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("similarityThreshold must be in (0, 1], got {0}")]
    SimilarityThreshold(f64),

    #[error("agreementBoost must be in [0, 100], got {0}")]
    AgreementBoost(f64),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("renderDpi must be at least 200, got {0}")]
    RenderDpi(u32),

    #[error("MIME type not supported by the normalizer: {0}")]
    UnsupportedMime(String),

    #[error("Engine name must not be empty")]
    EmptyEngineName,

    #[error("Invalid options JSON: {0}")]
    Json(String),
}

// ═══════════════════════════════════════════════════════════
// Engine preference
// ═══════════════════════════════════════════════════════════

/// `preferredEngine`: either one named engine or `"ensemble"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnginePreference {
    Ensemble,
    Named(String),
}

impl EnginePreference {
    pub fn is_ensemble(&self) -> bool {
        matches!(self, Self::Ensemble)
    }
}

impl From<String> for EnginePreference {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("ensemble") {
            Self::Ensemble
        } else {
            Self::Named(value.trim().to_lowercase())
        }
    }
}

impl From<EnginePreference> for String {
    fn from(value: EnginePreference) -> Self {
        match value {
            EnginePreference::Ensemble => "ensemble".to_string(),
            EnginePreference::Named(name) => name,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Per-call options
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineOptions {
    pub preferred_engine: EnginePreference,
    pub enhanced_preprocessing: bool,
    /// Explicit stage toggles; wins over `enhanced_preprocessing` when set.
    pub preprocess: Option<PreprocessOptions>,
    pub per_engine_timeout_ms: u64,
    pub max_file_size_bytes: u64,
    pub allowed_mime_types: BTreeSet<String>,
    /// Bound on the whole call. `None` leaves only the per-engine bound.
    pub overall_timeout_ms: Option<u64>,
    /// Fallback for single mode when the preferred engine is missing or unhealthy.
    pub default_engine: String,
    pub similarity_threshold: f64,
    pub agreement_boost: f64,
    pub render_dpi: u32,
    /// Overrides the engine's configured language when set.
    pub ocr_language: Option<String>,
    pub window_chars: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            preferred_engine: EnginePreference::Named(DEFAULT_ENGINE.to_string()),
            enhanced_preprocessing: false,
            preprocess: None,
            per_engine_timeout_ms: DEFAULT_PER_ENGINE_TIMEOUT_MS,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            allowed_mime_types: SUPPORTED_MIME_TYPES.iter().map(|m| m.to_string()).collect(),
            overall_timeout_ms: None,
            default_engine: DEFAULT_ENGINE.to_string(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            agreement_boost: DEFAULT_AGREEMENT_BOOST,
            render_dpi: DEFAULT_RENDER_DPI,
            ocr_language: None,
            window_chars: DEFAULT_WINDOW_CHARS,
        }
    }
}

impl PipelineOptions {
    /// Parse and validate options sent as JSON. Missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn ensemble() -> Self {
        Self {
            preferred_engine: EnginePreference::Ensemble,
            ..Self::default()
        }
    }

    pub fn with_engine(mut self, name: &str) -> Self {
        self.preferred_engine = EnginePreference::from(name.to_string());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ConfigError::SimilarityThreshold(self.similarity_threshold));
        }
        if !(0.0..=100.0).contains(&self.agreement_boost) {
            return Err(ConfigError::AgreementBoost(self.agreement_boost));
        }
        if self.per_engine_timeout_ms == 0 {
            return Err(ConfigError::Zero {
                field: "perEngineTimeoutMs",
            });
        }
        if self.overall_timeout_ms == Some(0) {
            return Err(ConfigError::Zero {
                field: "overallTimeoutMs",
            });
        }
        if self.max_file_size_bytes == 0 {
            return Err(ConfigError::Zero {
                field: "maxFileSizeBytes",
            });
        }
        if self.window_chars == 0 {
            return Err(ConfigError::Zero {
                field: "windowChars",
            });
        }
        if self.render_dpi < MIN_RENDER_DPI {
            return Err(ConfigError::RenderDpi(self.render_dpi));
        }
        if self.default_engine.trim().is_empty() {
            return Err(ConfigError::EmptyEngineName);
        }
        if let EnginePreference::Named(name) = &self.preferred_engine {
            if name.is_empty() {
                return Err(ConfigError::EmptyEngineName);
            }
        }
        for mime in &self.allowed_mime_types {
            if !SUPPORTED_MIME_TYPES.contains(&canonical_mime(mime).as_str()) {
                return Err(ConfigError::UnsupportedMime(mime.clone()));
            }
        }
        Ok(())
    }

    /// Stages to run on raster pages.
    pub fn preprocess_options(&self) -> PreprocessOptions {
        self.preprocess
            .unwrap_or_else(|| PreprocessOptions::for_enhanced(self.enhanced_preprocessing))
    }

    /// Whether `mime` (after alias canonicalization) is on the allow-list.
    pub fn allows_mime(&self, mime: &str) -> bool {
        let canonical = canonical_mime(mime);
        self.allowed_mime_types
            .iter()
            .any(|allowed| canonical_mime(allowed) == canonical)
    }
}

// ═══════════════════════════════════════════════════════════
// Process-wide engine wiring
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub tesseract_bin: String,
    pub tesseract_lang: String,
    /// Tesseract page segmentation mode. 6 = single uniform block, the
    /// layout most lab tables OCR best in.
    pub tesseract_psm: u8,
    pub ollama_host: String,
    pub vision_model: String,
    pub max_concurrent_engines: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tesseract_bin: "tesseract".to_string(),
            tesseract_lang: DEFAULT_OCR_LANGUAGE.to_string(),
            tesseract_psm: 6,
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            max_concurrent_engines: DEFAULT_MAX_CONCURRENT_ENGINES,
        }
    }
}

impl EngineSettings {
    /// Defaults overridden by `TESSERACT_BIN`, `TESSERACT_LANG`, `OLLAMA_HOST`,
    /// `HEALTHSCAN_VISION_MODEL` and `HEALTHSCAN_MAX_CONCURRENT_ENGINES`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bin) = non_empty("TESSERACT_BIN") {
            settings.tesseract_bin = bin;
        }
        if let Some(lang) = non_empty("TESSERACT_LANG") {
            settings.tesseract_lang = lang;
        }
        if let Some(host) = non_empty("OLLAMA_HOST") {
            settings.ollama_host = normalize_ollama_host(&host);
        }
        if let Some(model) = non_empty("HEALTHSCAN_VISION_MODEL") {
            settings.vision_model = model;
        }
        if let Some(raw) = non_empty("HEALTHSCAN_MAX_CONCURRENT_ENGINES") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => settings.max_concurrent_engines = n,
                _ => tracing::warn!(
                    value = %raw,
                    "Ignoring invalid HEALTHSCAN_MAX_CONCURRENT_ENGINES"
                ),
            }
        }
        settings
    }
}

/// `OLLAMA_HOST` is often given as bare `host:port`.
fn normalize_ollama_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let options = PipelineOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(options.allowed_mime_types.len(), 6);
        assert_eq!(options.preferred_engine, EnginePreference::Named("tesseract".into()));
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let options = PipelineOptions::from_json(
            r#"{"preferredEngine": "ensemble", "perEngineTimeoutMs": 5000}"#,
        )
        .unwrap();
        assert!(options.preferred_engine.is_ensemble());
        assert_eq!(options.per_engine_timeout_ms, 5000);
        assert_eq!(options.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(options.window_chars, DEFAULT_WINDOW_CHARS);
        assert_eq!(options.ocr_language, None);
    }

    #[test]
    fn ocr_language_override_parsed() {
        let options = PipelineOptions::from_json(r#"{"ocrLanguage": "eng+fra"}"#).unwrap();
        assert_eq!(options.ocr_language.as_deref(), Some("eng+fra"));
    }

    #[test]
    fn stage_override_wins_over_preset() {
        assert_eq!(PipelineOptions::default().preprocess_options(), PreprocessOptions::standard());

        let enhanced = PipelineOptions {
            enhanced_preprocessing: true,
            ..PipelineOptions::default()
        };
        assert_eq!(enhanced.preprocess_options(), PreprocessOptions::enhanced());

        let options = PipelineOptions::from_json(
            r#"{"enhancedPreprocessing": true, "preprocess": {"deskew": true, "upscale": false}}"#,
        )
        .unwrap();
        let stages = options.preprocess_options();
        assert!(stages.deskew && stages.grayscale && stages.contrast_normalize);
        assert!(!stages.upscale && !stages.binarize && !stages.denoise);
    }

    #[test]
    fn config_errors_are_cloneable() {
        let err = ConfigError::Zero { field: "windowChars" };
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn engine_name_is_lowercased() {
        let options = PipelineOptions::from_json(r#"{"preferredEngine": "Vision"}"#).unwrap();
        assert_eq!(options.preferred_engine, EnginePreference::Named("vision".into()));
    }

    #[test]
    fn options_serialize_camel_case() {
        let json = serde_json::to_string(&PipelineOptions::ensemble()).unwrap();
        assert!(json.contains("\"preferredEngine\":\"ensemble\""));
        assert!(json.contains("\"maxFileSizeBytes\":10485760"));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let options = PipelineOptions {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(ConfigError::SimilarityThreshold(1.5)));

        let options = PipelineOptions {
            similarity_threshold: 0.0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeouts() {
        let options = PipelineOptions {
            per_engine_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(
            options.validate(),
            Err(ConfigError::Zero {
                field: "perEngineTimeoutMs"
            })
        );

        let options = PipelineOptions {
            overall_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn rejects_low_dpi() {
        let options = PipelineOptions {
            render_dpi: 150,
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(ConfigError::RenderDpi(150)));
    }

    #[test]
    fn rejects_unsupported_mime_in_allow_list() {
        let err = PipelineOptions::from_json(r#"{"allowedMimeTypes": ["image/webp"]}"#).unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedMime("image/webp".into()));
    }

    #[test]
    fn allow_list_honours_aliases() {
        let options = PipelineOptions::from_json(r#"{"allowedMimeTypes": ["image/jpeg"]}"#).unwrap();
        assert!(options.allows_mime("image/jpg"));
        assert!(options.allows_mime("IMAGE/JPEG"));
        assert!(!options.allows_mime("application/pdf"));
    }

    #[test]
    fn malformed_json_is_config_error() {
        assert!(matches!(
            PipelineOptions::from_json("{not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn engine_settings_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("TESSERACT_BIN", "/opt/tess/bin/tesseract"),
            ("TESSERACT_LANG", "eng+fra"),
            ("OLLAMA_HOST", "127.0.0.1:11500"),
            ("HEALTHSCAN_MAX_CONCURRENT_ENGINES", "2"),
        ]
        .into_iter()
        .collect();
        let settings = EngineSettings::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.tesseract_bin, "/opt/tess/bin/tesseract");
        assert_eq!(settings.tesseract_lang, "eng+fra");
        assert_eq!(settings.ollama_host, "http://127.0.0.1:11500");
        assert_eq!(settings.vision_model, DEFAULT_VISION_MODEL);
        assert_eq!(settings.max_concurrent_engines, 2);
    }

    #[test]
    fn engine_settings_ignore_bad_concurrency() {
        let settings = EngineSettings::from_lookup(|k| {
            (k == "HEALTHSCAN_MAX_CONCURRENT_ENGINES").then(|| "zero".to_string())
        });
        assert_eq!(settings.max_concurrent_engines, DEFAULT_MAX_CONCURRENT_ENGINES);
    }

    #[test]
    fn app_name_is_healthscan() {
        assert_eq!(APP_NAME, "HealthScan");
    }
}
