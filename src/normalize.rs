//! Backend-agnostic conversion of raw detections into `DetectionRecord`s.

use crate::detect::{RawBox, RawDetectionSet};
use crate::frame::ImageFrame;
use crate::record::DetectionRecord;

/// Filter by `min_score` and convert every surviving raw detection, in input
/// order, into a record. Degenerate boxes are kept; cropping deals with them.
pub fn normalize(
    raw: &RawDetectionSet,
    frame: &ImageFrame,
    min_score: f32,
) -> Vec<DetectionRecord> {
    let width = frame.width();
    let height = frame.height();
    let mut records = Vec::with_capacity(raw.len());

    for det in &raw.detections {
        if det.score.is_nan() || det.score < min_score {
            log::debug!(
                "skipping detection with confidence {:.3} (below threshold {})",
                det.score,
                min_score
            );
            continue;
        }
        log::debug!(
            "accepting detection with confidence {:.3} (threshold {})",
            det.score,
            min_score
        );

        let (bbox, box_pixels) = match det.bbox {
            RawBox::Pixel { x1, y1, x2, y2 } => {
                let (w, h) = (width as f64, height as f64);
                let bbox = ordered_unit([
                    y1 as f64 / h,
                    x1 as f64 / w,
                    y2 as f64 / h,
                    x2 as f64 / w,
                ]);
                let pixels = ordered_pixels([
                    to_pixel(x1 as f64, width),
                    to_pixel(y1 as f64, height),
                    to_pixel(x2 as f64, width),
                    to_pixel(y2 as f64, height),
                ]);
                (bbox, pixels)
            }
            RawBox::Normalized {
                ymin,
                xmin,
                ymax,
                xmax,
            } => {
                let bbox = ordered_unit([ymin as f64, xmin as f64, ymax as f64, xmax as f64]);
                let (w, h) = (width as f64, height as f64);
                let pixels = ordered_pixels([
                    to_pixel(xmin as f64 * w, width),
                    to_pixel(ymin as f64 * h, height),
                    to_pixel(xmax as f64 * w, width),
                    to_pixel(ymax as f64 * h, height),
                ]);
                (bbox, pixels)
            }
        };

        records.push(DetectionRecord {
            bbox,
            box_pixels,
            center_point: center_point(box_pixels),
            class_id: det.class_id,
            score: round_score(det.score),
            label: raw
                .class_names
                .as_ref()
                .map(|names| names.label_for(det.class_id)),
            crop: None,
            crop_error: None,
        });
    }

    records
}

/// Round to 4 decimal places for the response.
pub fn round_score(score: f32) -> f64 {
    (score as f64 * 10_000.0).round() / 10_000.0
}

/// Floor midpoint of `[left, top, right, bottom]`.
pub fn center_point(box_pixels: [u32; 4]) -> [u32; 2] {
    let [left, top, right, bottom] = box_pixels;
    [
        ((left as u64 + right as u64) / 2) as u32,
        ((top as u64 + bottom as u64) / 2) as u32,
    ]
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn to_pixel(value: f64, max: u32) -> u32 {
    if value.is_nan() {
        0
    } else {
        value.clamp(0.0, max as f64) as u32
    }
}

fn ordered_unit(bbox: [f64; 4]) -> [f64; 4] {
    let [ymin, xmin, ymax, xmax] = bbox.map(unit);
    [ymin.min(ymax), xmin.min(xmax), ymin.max(ymax), xmin.max(xmax)]
}

fn ordered_pixels(pixels: [u32; 4]) -> [u32; 4] {
    let [left, top, right, bottom] = pixels;
    [
        left.min(right),
        top.min(bottom),
        left.max(right),
        top.max(bottom),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ClassNames, RawDetection};
    use image::RgbImage;
    use std::sync::Arc;

    fn frame(width: u32, height: u32) -> ImageFrame {
        ImageFrame::from_rgb(RgbImage::new(width, height))
    }

    fn set(detections: Vec<RawDetection>) -> RawDetectionSet {
        RawDetectionSet::new(detections, None)
    }

    #[test]
    fn pixel_box_is_divided_by_image_dimensions() {
        let raw = set(vec![RawDetection::pixel(10.0, 20.0, 110.0, 220.0, 2, 0.9)]);
        let records = normalize(&raw, &frame(200, 400), 0.7);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bbox, [0.05, 0.05, 0.55, 0.55]);
        assert_eq!(records[0].box_pixels, [10, 20, 110, 220]);
        assert_eq!(records[0].center_point, [60, 120]);
        assert_eq!(records[0].class_id, 2);
    }

    #[test]
    fn normalized_box_is_scaled_and_clamped() {
        let raw = set(vec![RawDetection::normalized(
            -0.02, 0.25, 1.03, 0.75, 1, 0.95,
        )]);
        let records = normalize(&raw, &frame(101, 51), 0.5);

        let rec = &records[0];
        assert_eq!(rec.bbox[0], 0.0);
        assert_eq!(rec.bbox[2], 1.0);
        assert_eq!(rec.box_pixels, [25, 0, 75, 51]);
        assert_eq!(rec.center_point, [50, 25]);
    }

    #[test]
    fn center_uses_pixel_corners_not_normalized_box() {
        let raw = set(vec![RawDetection::normalized(0.0, 0.0, 1.0, 0.9, 0, 0.9)]);
        let records = normalize(&raw, &frame(3, 3), 0.5);
        assert_eq!(records[0].box_pixels, [0, 0, 2, 3]);
        assert_eq!(records[0].center_point, [1, 1]);
    }

    #[test]
    fn detections_below_threshold_are_dropped() {
        let raw = set(vec![
            RawDetection::pixel(0.0, 0.0, 5.0, 5.0, 0, 0.69),
            RawDetection::pixel(0.0, 0.0, 5.0, 5.0, 1, 0.7),
            RawDetection::pixel(0.0, 0.0, 5.0, 5.0, 2, f32::NAN),
            RawDetection::pixel(0.0, 0.0, 5.0, 5.0, 3, 0.99),
        ]);
        let records = normalize(&raw, &frame(10, 10), 0.7);
        let classes: Vec<i64> = records.iter().map(|r| r.class_id).collect();
        assert_eq!(classes, vec![1, 3]);
        assert!(records.iter().all(|r| r.score >= 0.7));
    }

    #[test]
    fn score_is_rounded_after_threshold_comparison() {
        let raw = set(vec![RawDetection::pixel(0.0, 0.0, 5.0, 5.0, 0, 0.733_333_33)]);
        let records = normalize(&raw, &frame(10, 10), 0.7);
        assert_eq!(records[0].score, 0.7333);
    }

    #[test]
    fn zero_detections_yield_empty_list() {
        let records = normalize(&set(Vec::new()), &frame(10, 10), 0.0);
        assert!(records.is_empty());
    }

    #[test]
    fn degenerate_and_out_of_range_boxes_are_still_emitted() {
        let raw = set(vec![
            RawDetection::pixel(5.0, 2.0, 5.0, 8.0, 0, 0.9),
            RawDetection::pixel(-30.0, -10.0, 500.0, 900.0, 0, 0.9),
            RawDetection::pixel(80.0, 0.0, 20.0, 10.0, 0, 0.9),
        ]);
        let records = normalize(&raw, &frame(100, 50), 0.5);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].box_pixels, [5, 2, 5, 8]);
        assert_eq!(records[1].box_pixels, [0, 0, 100, 50]);
        assert_eq!(records[1].bbox, [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(records[2].box_pixels, [20, 0, 80, 10]);
        for rec in &records {
            assert!(rec.bbox.iter().all(|v| (0.0..=1.0).contains(v)));
            assert!(rec.bbox[0] <= rec.bbox[2] && rec.bbox[1] <= rec.bbox[3]);
            assert!(rec.box_pixels[2] <= 100 && rec.box_pixels[3] <= 50);
        }
    }

    #[test]
    fn labels_follow_backend_mapping() {
        let names = ClassNames::from_yolo_metadata("{0: 'person', 1: 'bicycle'}").unwrap();
        let raw = RawDetectionSet::new(
            vec![
                RawDetection::pixel(0.0, 0.0, 5.0, 5.0, 1, 0.9),
                RawDetection::pixel(0.0, 0.0, 5.0, 5.0, 42, 0.9),
            ],
            Some(Arc::new(names)),
        );
        let records = normalize(&raw, &frame(10, 10), 0.5);
        assert_eq!(records[0].label.as_deref(), Some("bicycle"));
        assert_eq!(records[1].label.as_deref(), Some("42"));

        let unlabeled = normalize(
            &set(vec![RawDetection::normalized(0.0, 0.0, 0.5, 0.5, 3, 0.9)]),
            &frame(10, 10),
            0.5,
        );
        assert_eq!(unlabeled[0].label, None);
    }

    #[test]
    fn input_order_is_preserved() {
        let raw = set(vec![
            RawDetection::pixel(0.0, 0.0, 5.0, 5.0, 7, 0.8),
            RawDetection::pixel(0.0, 0.0, 5.0, 5.0, 3, 0.95),
            RawDetection::pixel(0.0, 0.0, 5.0, 5.0, 5, 0.85),
        ]);
        let records = normalize(&raw, &frame(10, 10), 0.5);
        let classes: Vec<i64> = records.iter().map(|r| r.class_id).collect();
        assert_eq!(classes, vec![7, 3, 5]);
    }
}
