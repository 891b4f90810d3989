use serde::{Deserialize, Serialize};

/// Decodable input families.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    Pdf,
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
}

impl InputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match canonical_mime(mime).as_str() {
            "application/pdf" => Some(Self::Pdf),
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            "image/bmp" => Some(Self::Bmp),
            "image/tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

/// Lowercase, strip parameters (`; charset=...`) and fold common aliases.
pub fn canonical_mime(mime: &str) -> String {
    let base = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".into(),
        "image/x-ms-bmp" | "image/x-bmp" => "image/bmp".into(),
        "image/tif" | "image/x-tiff" => "image/tiff".into(),
        "image/x-png" => "image/png".into(),
        "application/x-pdf" => "application/pdf".into(),
        _ => base,
    }
}

/// Identify the payload from magic bytes (never from the declared type).
pub fn sniff_format(bytes: &[u8]) -> Option<InputFormat> {
    match bytes {
        [0x25, 0x50, 0x44, 0x46, ..] => Some(InputFormat::Pdf),
        [0xFF, 0xD8, 0xFF, ..] => Some(InputFormat::Jpeg),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(InputFormat::Png),
        [0x47, 0x49, 0x46, 0x38, ..] => Some(InputFormat::Gif),
        [0x42, 0x4D, ..] => Some(InputFormat::Bmp),
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Some(InputFormat::Tiff),
        // Some scanners emit a short preamble before %PDF
        _ if find_pdf_header(bytes) => Some(InputFormat::Pdf),
        _ => None,
    }
}

fn find_pdf_header(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(5).any(|w| w == b"%PDF-")
}
