use serde::{Deserialize, Serialize};

use crate::crop::{CropError, EncodedImage};

/// One accepted detection as returned to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Normalized `[ymin, xmin, ymax, xmax]`, each in [0, 1].
    #[serde(rename = "box")]
    pub bbox: [f64; 4],
    /// `[left, top, right, bottom]` in pixels, within the image.
    pub box_pixels: [u32; 4],
    /// Floor midpoint of `box_pixels`.
    pub center_point: [u32; 2],
    #[serde(rename = "class")]
    pub class_id: i64,
    /// Confidence rounded to 4 decimals.
    pub score: f64,
    /// Present only for backends with a class-name mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "crop_b64", default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_error: Option<String>,
}

impl DetectionRecord {
    /// Store the outcome of a crop. Exactly one of `crop` and `crop_error`
    /// is set afterwards.
    pub fn attach_crop(&mut self, outcome: Result<EncodedImage, CropError>) {
        match outcome {
            Ok(encoded) => {
                self.crop = Some(encoded.into_data_uri());
                self.crop_error = None;
            }
            Err(err) => {
                self.crop = None;
                self.crop_error = Some(err.to_string());
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalSize {
    pub width: u32,
    pub height: u32,
}

/// Response envelope for `POST /detect`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub detections: Vec<DetectionRecord>,
    pub original_size: OriginalSize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> DetectionRecord {
        DetectionRecord {
            bbox: [0.05, 0.05, 0.55, 0.55],
            box_pixels: [10, 20, 110, 220],
            center_point: [60, 120],
            class_id: 0,
            score: 0.7333,
            label: None,
            crop: None,
            crop_error: None,
        }
    }

    #[test]
    fn serializes_wire_field_names_and_omits_absent_fields() {
        let value = serde_json::to_value(record()).unwrap();
        assert_eq!(
            value,
            json!({
                "box": [0.05, 0.05, 0.55, 0.55],
                "box_pixels": [10, 20, 110, 220],
                "center_point": [60, 120],
                "class": 0,
                "score": 0.7333,
            })
        );
    }

    #[test]
    fn crop_failure_replaces_success() {
        let mut rec = record();
        rec.crop = Some("data:image/jpeg;base64,AAAA".to_string());
        rec.attach_crop(Err(CropError::Degenerate {
            left: 1,
            top: 1,
            right: 1,
            bottom: 5,
        }));
        assert!(rec.crop.is_none());
        assert!(rec.crop_error.unwrap().contains("zero area"));
    }

    #[test]
    fn empty_response_keeps_detections_array() {
        let resp = DetectionResponse {
            detections: Vec::new(),
            original_size: OriginalSize {
                width: 3,
                height: 4,
            },
        };
        assert_eq!(
            serde_json::to_string(&resp).unwrap(),
            r#"{"detections":[],"original_size":{"width":3,"height":4}}"#
        );
    }
}
