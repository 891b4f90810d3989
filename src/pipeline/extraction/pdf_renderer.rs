//! Embedded scan extraction using lopdf.
//!
//! Fallback when PDFium is not installed. Scanned reports almost always
//! carry one full-page image XObject per page; that image is pulled out
//! as-is and re-encoded to PNG.

use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use lopdf::{Document, Object, ObjectId};

use super::preprocess::decode_image;
use super::types::PdfPageRenderer;
use super::NormalizationError;

pub struct LopdfImageExtractor;

fn load_document(pdf_bytes: &[u8]) -> Result<Document, NormalizationError> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| NormalizationError::CorruptInput(format!("Failed to parse PDF: {e}")))?;
    if doc.is_encrypted() {
        return Err(NormalizationError::PdfEncrypted);
    }
    Ok(doc)
}

impl PdfPageRenderer for LopdfImageExtractor {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, NormalizationError> {
        Ok(load_document(pdf_bytes)?.get_pages().len())
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, NormalizationError> {
        let page_number = page_index + 1;
        let doc = load_document(pdf_bytes)?;

        let page_ids: Vec<ObjectId> = doc.page_iter().collect();
        let &page_id = page_ids
            .get(page_index)
            .ok_or_else(|| NormalizationError::PdfRendering {
                page: page_number,
                reason: format!("Page not found (PDF has {} pages)", page_ids.len()),
            })?;

        let img = extract_largest_page_image(&doc, page_id).map_err(|reason| {
            NormalizationError::PdfRendering {
                page: page_number,
                reason,
            }
        })?;

        let mut png_buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut png_buf, ImageOutputFormat::Png)
            .map_err(|e| NormalizationError::ImageProcessing(format!("PNG encoding failed: {e}")))?;

        tracing::debug!(
            page = page_number,
            width = img.width(),
            height = img.height(),
            png_size = png_buf.get_ref().len(),
            "Extracted embedded image from PDF page"
        );

        Ok(png_buf.into_inner())
    }

    fn renders_full_page(&self) -> bool {
        false
    }
}

/// Walks /Resources -> /XObject and decodes the image with the most pixels.
fn extract_largest_page_image(doc: &Document, page_id: ObjectId) -> Result<DynamicImage, String> {
    let page_dict = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| format!("Page object error: {e}"))?;

    let resources = resolve_dict_entry(doc, page_dict, b"Resources")?;
    let xobjects = resolve_dict_entry(doc, resources, b"XObject")?;

    let mut largest: Option<DynamicImage> = None;
    for (_name, obj_ref) in xobjects.iter() {
        let stream = match resolve_object(doc, obj_ref) {
            Object::Stream(s) => s,
            _ => continue,
        };
        if !is_image_subtype(&stream.dict) {
            continue;
        }

        let img = match decode_image_stream(doc, stream) {
            Ok(img) => img,
            Err(reason) => {
                tracing::debug!(%reason, "Skipping undecodable image XObject");
                continue;
            }
        };

        let area = |i: &DynamicImage| i.width() as u64 * i.height() as u64;
        if largest.as_ref().map_or(true, |prev| area(&img) > area(prev)) {
            largest = Some(img);
        }
    }

    largest.ok_or_else(|| "No decodable image XObjects on this page".to_string())
}

fn is_image_subtype(dict: &lopdf::Dictionary) -> bool {
    matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image")
}

fn has_filter(dict: &lopdf::Dictionary, name: &[u8]) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => n == name,
        Ok(Object::Array(arr)) => arr
            .iter()
            .any(|o| matches!(o, Object::Name(n) if n == name)),
        _ => false,
    }
}

fn decode_image_stream(doc: &Document, stream: &lopdf::Stream) -> Result<DynamicImage, String> {
    // DCTDecode: the stream body is a complete JPEG file.
    if has_filter(&stream.dict, b"DCTDecode") {
        return decode_image(&stream.content).map_err(|e| format!("JPEG decode: {e}"));
    }

    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    // Some producers embed whole PNG/TIFF files
    if let Ok(img) = decode_image(&content) {
        return Ok(img);
    }

    reconstruct_raw_image(doc, &stream.dict, content)
}

/// Rebuild raw 8-bit samples using /Width, /Height, /ColorSpace.
fn reconstruct_raw_image(
    doc: &Document,
    dict: &lopdf::Dictionary,
    raw_pixels: Vec<u8>,
) -> Result<DynamicImage, String> {
    let width = get_int(dict, b"Width")? as u32;
    let height = get_int(dict, b"Height")? as u32;
    let bpc = get_int(dict, b"BitsPerComponent").unwrap_or(8);
    if bpc != 8 {
        return Err(format!("Unsupported BitsPerComponent {bpc}"));
    }

    let channels = determine_channels(doc, dict);
    let expected = width as usize * height as usize * channels as usize;
    if raw_pixels.len() < expected {
        return Err(format!(
            "Raw pixel buffer too small: {} bytes, expected {expected}",
            raw_pixels.len()
        ));
    }
    let mut pixels = raw_pixels;
    pixels.truncate(expected);

    match channels {
        1 => image::GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
        3 => image::RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
        4 => image::RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8),
        _ => None,
    }
    .ok_or_else(|| format!("Cannot build {channels}-channel image"))
}

fn determine_channels(doc: &Document, dict: &lopdf::Dictionary) -> u32 {
    let cs = match dict.get(b"ColorSpace") {
        Ok(obj) => resolve_object(doc, obj),
        Err(_) => return 3,
    };

    match cs {
        Object::Name(n) => match n.as_slice() {
            b"DeviceGray" | b"CalGray" => 1,
            b"DeviceCMYK" => 4,
            _ => 3,
        },
        Object::Array(arr) => match arr.first() {
            Some(Object::Name(n)) if n == b"ICCBased" => arr
                .get(1)
                .map(|o| resolve_object(doc, o))
                .and_then(|o| match o {
                    Object::Stream(s) => get_int(&s.dict, b"N").ok(),
                    _ => None,
                })
                .unwrap_or(3) as u32,
            Some(Object::Name(n)) if n == b"Indexed" => 1,
            _ => 3,
        },
        _ => 3,
    }
}

fn resolve_object<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn resolve_dict_entry<'a>(
    doc: &'a Document,
    dict: &'a lopdf::Dictionary,
    key: &[u8],
) -> Result<&'a lopdf::Dictionary, String> {
    let name = String::from_utf8_lossy(key);
    let obj = dict.get(key).map_err(|_| format!("Missing /{name}"))?;
    resolve_object(doc, obj)
        .as_dict()
        .map_err(|_| format!("/{name} is not a dictionary"))
}

fn get_int(dict: &lopdf::Dictionary, key: &[u8]) -> Result<i64, String> {
    let name = String::from_utf8_lossy(key);
    dict.get(key)
        .map_err(|_| format!("Missing /{name}"))?
        .as_i64()
        .map_err(|_| format!("/{name} is not an integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::fixtures::{make_scanned_pdf, make_test_jpeg, make_text_pdf};

    #[test]
    fn extractor_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LopdfImageExtractor>();
    }

    #[test]
    fn extract_image_from_scanned_pdf() {
        let pdf_bytes = make_scanned_pdf(&[&make_test_jpeg(200, 300)]);
        let png = LopdfImageExtractor.render_page(&pdf_bytes, 0, 300).unwrap();

        assert_eq!(&png[0..4], b"\x89PNG");
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (200, 300));
    }

    #[test]
    fn counts_pages() {
        let jpeg = make_test_jpeg(50, 50);
        let pdf_bytes = make_scanned_pdf(&[&jpeg, &jpeg, &jpeg]);
        assert_eq!(LopdfImageExtractor.page_count(&pdf_bytes).unwrap(), 3);
    }

    #[test]
    fn invalid_page_number_returns_error() {
        let pdf_bytes = make_scanned_pdf(&[&make_test_jpeg(100, 100)]);
        let err = LopdfImageExtractor.render_page(&pdf_bytes, 5, 300).unwrap_err();
        assert!(matches!(err, NormalizationError::PdfRendering { page: 6, .. }));
    }

    #[test]
    fn pdf_without_images_returns_error() {
        let pdf_bytes = make_text_pdf(&["Hello from a text-only page"]);
        let err = LopdfImageExtractor.render_page(&pdf_bytes, 0, 300).unwrap_err();
        assert!(matches!(err, NormalizationError::PdfRendering { page: 1, .. }));
    }

    #[test]
    fn garbage_is_corrupt_input() {
        assert!(matches!(
            LopdfImageExtractor.page_count(b"%PDF-1.4 nothing else"),
            Err(NormalizationError::CorruptInput(_))
        ));
    }

    #[test]
    fn is_embedded_only() {
        assert!(!LopdfImageExtractor.renders_full_page());
    }
}
