//! Test-only document builders shared across pipeline tests.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Letter-size page in points.
const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;

enum FixturePage<'a> {
    Text(&'a str),
    Scan(&'a [u8]),
}

/// Digital PDF with one page of Helvetica text per entry.
pub fn make_text_pdf(pages: &[&str]) -> Vec<u8> {
    let pages: Vec<FixturePage> = pages.iter().map(|t| FixturePage::Text(t)).collect();
    build_pdf(&pages)
}

/// Scanned PDF: each page carries only a full-page DCTDecode image.
pub fn make_scanned_pdf(jpegs: &[&[u8]]) -> Vec<u8> {
    let pages: Vec<FixturePage> = jpegs.iter().map(|j| FixturePage::Scan(j)).collect();
    build_pdf(&pages)
}

/// Page 1 has a text layer, page 2 is a scan.
pub fn make_mixed_pdf(text: &str, jpeg: &[u8]) -> Vec<u8> {
    build_pdf(&[FixturePage::Text(text), FixturePage::Scan(jpeg)])
}

fn build_pdf(pages: &[FixturePage]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let page_id = match page {
            FixturePage::Text(text) => add_text_page(&mut doc, pages_id, font_id, text),
            FixturePage::Scan(jpeg) => add_scan_page(&mut doc, pages_id, jpeg),
        };
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn add_text_page(doc: &mut Document, pages_id: ObjectId, font_id: ObjectId, text: &str) -> ObjectId {
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
    })
}

fn add_scan_page(doc: &mut Document, pages_id: ObjectId, jpeg: &[u8]) -> ObjectId {
    let decoded = image::load_from_memory(jpeg).unwrap();
    let mut image_stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => decoded.width() as i64,
            "Height" => decoded.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg.to_vec(),
    );
    image_stream.allows_compression = false;
    let image_id = doc.add_object(image_stream);

    let draw = format!("q {PAGE_WIDTH} 0 0 {PAGE_HEIGHT} 0 0 cm /Img1 Do Q");
    let content_id = doc.add_object(Stream::new(dictionary! {}, draw.into_bytes()));

    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Img1" => image_id },
        },
    })
}

/// White page with dark 3px strokes every 40px, sloped by `angle` degrees.
pub fn make_lined_page(size: u32, angle: f32) -> GrayImage {
    let slope = (angle as f64).to_radians().tan();
    let mut img = GrayImage::from_pixel(size, size, Luma([255]));
    for y0 in (20..size.saturating_sub(40)).step_by(40) {
        for x in 0..size {
            let base = (y0 as f64 + x as f64 * slope).round() as i64;
            for y in base..base + 3 {
                if (0..size as i64).contains(&y) {
                    img.put_pixel(x, y as u32, Luma([0]));
                }
            }
        }
    }
    img
}

/// `make_lined_page` encoded as PNG.
pub fn make_skewed_png(size: u32, angle: f32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(make_lined_page(size, angle))
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Light-gray JPEG with a darker band so it is not blank.
pub fn make_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |_, y| {
        if y % 20 < 3 {
            Rgb([40, 40, 40])
        } else {
            Rgb([230, 230, 230])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageOutputFormat::Jpeg(85))
        .unwrap();
    buf.into_inner()
}

/// White page with dark horizontal text-like strokes.
pub fn make_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(width, height, |x, y| {
        if y % 24 < 4 && x % 16 < 12 {
            Luma([20])
        } else {
            Luma([250])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    buf.into_inner()
}
