use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};

/// The 80 COCO classes in the order YOLOv8 checkpoints emit them.
pub const COCO80: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Class-id to name mapping supplied by a backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassNames {
    names: HashMap<i64, String>,
}

impl ClassNames {
    pub fn coco80() -> Self {
        Self::from_list(COCO80.iter().map(|name| name.to_string()), 0)
    }

    /// Build from an ordered list; the first entry gets `first_id`.
    pub fn from_list<I: IntoIterator<Item = String>>(names: I, first_id: i64) -> Self {
        let names = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (first_id + idx as i64, name))
            .collect();
        Self { names }
    }

    /// Load one name per line. Blank lines still consume an id so that files
    /// with gaps (COCO-91 style) keep their numbering.
    pub fn from_file(path: &Path, first_id: i64) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        let names = Self::from_list(raw.lines().map(|line| line.trim().to_string()), first_id);
        let names = Self {
            names: names
                .names
                .into_iter()
                .filter(|(_, name)| !name.is_empty())
                .collect(),
        };
        if names.is_empty() {
            return Err(anyhow!("labels file {} contains no names", path.display()));
        }
        Ok(names)
    }

    /// Parse the `names` metadata property written by the YOLOv8 ONNX
    /// exporter, e.g. `{0: 'person', 1: 'bicycle'}`.
    pub fn from_yolo_metadata(value: &str) -> Option<Self> {
        static ENTRY_RE: OnceLock<regex::Regex> = OnceLock::new();
        let re = ENTRY_RE.get_or_init(|| {
            regex::Regex::new(r#"(\d+)\s*:\s*(?:'([^']*)'|"([^"]*)")"#).unwrap()
        });
        let names: HashMap<i64, String> = re
            .captures_iter(value)
            .filter_map(|caps| {
                let id = caps.get(1)?.as_str().parse().ok()?;
                let name = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
                Some((id, name))
            })
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(Self { names })
        }
    }

    pub fn get(&self, class_id: i64) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    /// Name for `class_id`, or the stringified id when unknown.
    pub fn label_for(&self, class_id: i64) -> String {
        self.get(class_id)
            .map(str::to_string)
            .unwrap_or_else(|| class_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
