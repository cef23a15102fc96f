use crate::config::ReportConfig;
use crate::error::Result;
use crate::models::Detection;
use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_128;

const BOX_THICKNESS: i32 = 3;
const CAPTION_OFFSET: i32 = 20;
const CAPTION_SCALE: f32 = 16.0;

pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", xxh3_128(bytes))
}

/// Regular face of the report font family, used for box captions. Without it
/// boxes are drawn uncaptioned.
pub fn load_caption_font(config: &ReportConfig) -> Option<FontVec> {
    let Some(path) = config.font_file("Regular") else {
        log::warn!(
            "No {} font found; annotated images will have no captions",
            config.font_family
        );
        return None;
    };
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("Failed to read font {}: {}", path.display(), err);
            return None;
        }
    };
    match FontVec::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(err) => {
            log::warn!("Invalid font {}: {}", path.display(), err);
            None
        }
    }
}

pub fn caption(detection: &Detection) -> String {
    format!("{} ({:.2})", detection.weapon, detection.confidence)
}

/// Copy of `image` with one outlined box per detection, colored by alert
/// level, and its caption just above the box when a font is available.
pub fn draw_detection_boxes(
    image: &DynamicImage,
    detections: &[Detection],
    font: Option<&FontVec>,
) -> RgbaImage {
    let mut canvas = image.to_rgba8();
    for detection in detections {
        let [r, g, b] = detection.alert_level.rgb();
        let color = Rgba([r, g, b, 255]);
        let bbox = detection.bbox;
        let (x0, y0) = (bbox.xmin as i32, bbox.ymin as i32);
        let (x1, y1) = (bbox.xmax as i32, bbox.ymax as i32);
        for t in 0..BOX_THICKNESS {
            let width = x1 - x0 + 1 - 2 * t;
            let height = y1 - y0 + 1 - 2 * t;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(x0 + t, y0 + t).of_size(width as u32, height as u32);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
        if let Some(font) = font {
            draw_text_mut(
                &mut canvas,
                color,
                x0,
                y0 - CAPTION_OFFSET,
                PxScale::from(CAPTION_SCALE),
                font,
                &caption(detection),
            );
        }
    }
    canvas
}

/// Writes the annotated image as `<hash>_annotated.png` under `dest_dir`.
pub fn save_annotated(
    image: &DynamicImage,
    detections: &[Detection],
    font: Option<&FontVec>,
    source_hash: &str,
    dest_dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir)?;
    let output = dest_dir.join(format!("{source_hash}_annotated.png"));
    draw_detection_boxes(image, detections, font).save(&output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, RawDetection};
    use crate::weapons::classify;

    fn detections_at(label: &str, bbox: BoundingBox) -> Vec<Detection> {
        classify(&[RawDetection {
            label: label.into(),
            score: 0.8,
            bbox,
        }])
    }

    fn detections(label: &str) -> Vec<Detection> {
        detections_at(
            label,
            BoundingBox {
                xmin: 2.0,
                ymin: 2.0,
                xmax: 12.0,
                ymax: 12.0,
            },
        )
    }

    fn painted_rows(img: &RgbaImage, rows: std::ops::Range<u32>) -> usize {
        rows.flat_map(|y| (0..img.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| img.get_pixel(x, y) != &Rgba([0, 0, 0, 255]))
            .count()
    }

    #[test]
    fn boxes_use_alert_colors() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(20, 20));
        let out = draw_detection_boxes(&img, &detections("pistol"), None);
        assert_eq!(out.get_pixel(2, 2), &Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(7, 4), &Rgba([255, 0, 0, 255]));
        // Interior untouched.
        assert_eq!(out.get_pixel(7, 7), &Rgba([0, 0, 0, 255]));

        let out = draw_detection_boxes(&img, &detections("knife"), None);
        assert_eq!(out.get_pixel(12, 12), &Rgba([255, 165, 0, 255]));
    }

    #[test]
    fn boxes_past_the_edge_are_clipped() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(8, 8));
        let dets = detections_at(
            "stick",
            BoundingBox {
                xmin: -5.0,
                ymin: -5.0,
                xmax: 50.0,
                ymax: 50.0,
            },
        );
        let out = draw_detection_boxes(&img, &dets, None);
        assert_eq!(out.dimensions(), (8, 8));
    }

    #[test]
    fn caption_shows_weapon_and_confidence() {
        let dets = detections("machete");
        assert_eq!(caption(&dets[0]), "machete (0.80)");
    }

    #[test]
    fn caption_is_drawn_above_the_box() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(160, 80));
        let dets = detections_at(
            "rifle",
            BoundingBox {
                xmin: 10.0,
                ymin: 40.0,
                xmax: 150.0,
                ymax: 75.0,
            },
        );
        let plain = draw_detection_boxes(&img, &dets, None);
        assert_eq!(painted_rows(&plain, 0..40), 0);

        // Hosts without Liberation fonts only get the uncaptioned box.
        let Some(font) = load_caption_font(&ReportConfig::default()) else {
            return;
        };
        let captioned = draw_detection_boxes(&img, &dets, Some(&font));
        assert!(painted_rows(&captioned, 20..40) > 0);
        assert_eq!(painted_rows(&captioned, 0..15), 0);
    }

    #[test]
    fn saves_png_named_by_hash() {
        let dir = std::env::temp_dir().join("marque_annotate_test");
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(16, 16));
        let hash = content_hash(b"source bytes");
        let path = save_annotated(&img, &detections("club"), None, &hash, &dir).unwrap();
        assert!(path.ends_with(format!("{hash}_annotated.png")));
        let reloaded = image::open(&path).unwrap();
        assert_eq!(reloaded.width(), 16);
        assert_eq!(content_hash(b"source bytes"), hash);
    }
}
