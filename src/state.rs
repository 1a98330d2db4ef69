use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_K: usize = 100;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;
pub const DEFAULT_NMS_THRESHOLD: f64 = 0.5;

/// A query chip registered with the backend.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Chip {
    pub chip_id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default, rename = "preview_url")]
    pub preview_ref: String,
    /// Bands, height, width as decoded by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
}

impl Chip {
    pub fn preview_path(&self) -> String {
        if self.preview_ref.is_empty() {
            format!("/preview/{}", self.chip_id)
        } else {
            self.preview_ref.clone()
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SearchStatus {
    #[serde(default)]
    pub embedder_loaded: bool,
    #[serde(default)]
    pub index_loaded: bool,
    #[serde(default)]
    pub index_size: Option<u64>,
    #[serde(default)]
    pub device: Option<String>,
}

impl SearchStatus {
    pub fn is_ready(&self) -> bool {
        self.embedder_loaded && self.index_loaded
    }
}

/// Knobs passed through to the backend unchanged.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SearchTuning {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f64,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_nms_threshold() -> f64 {
    DEFAULT_NMS_THRESHOLD
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchParameters {
    pub class_name: String,
    pub top_k: usize,
    pub similarity_threshold: f64,
    pub nms_threshold: f64,
}

impl SearchParameters {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self::with_tuning(class_name, SearchTuning::default())
    }

    pub fn with_tuning(class_name: impl Into<String>, tuning: SearchTuning) -> Self {
        Self {
            class_name: class_name.into(),
            top_k: tuning.top_k,
            similarity_threshold: tuning.similarity_threshold,
            nms_threshold: tuning.nms_threshold,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SearchRequest {
    pub chip_ids: Vec<String>,
    pub class_name: String,
    pub top_k: usize,
    pub similarity_threshold: f64,
    pub nms_threshold: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Detection {
    pub target_filename: String,
    pub class_name: String,
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
    pub score: f64,
}

/// Body returned by the search endpoint. Counts are recomputed client side.
#[derive(Deserialize, Clone, Debug)]
pub struct SearchResponse {
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub total_count: Option<usize>,
    #[serde(default)]
    pub images_count: Option<usize>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SearchResult {
    pub total_count: usize,
    pub images_count: usize,
    pub detections: Vec<Detection>,
}

impl SearchResult {
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        let images: HashSet<&str> = detections
            .iter()
            .map(|d| d.target_filename.as_str())
            .collect();
        Self {
            total_count: detections.len(),
            images_count: images.len(),
            detections,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} detections in {} images",
            self.total_count, self.images_count
        )
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct IndexInfo {
    pub total_vectors: u64,
    #[serde(default)]
    pub unique_images: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Region of a server-side image to cut into a new chip.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ChipRegion {
    pub image_path: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Raw submission bytes as handed back by the backend.
#[derive(Clone, Debug)]
pub struct Submission {
    pub server_filename: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ExportArtifact {
    pub path: PathBuf,
    pub server_filename: Option<String>,
    pub size: usize,
    pub detections: usize,
}
