use serde::Serialize;

use crate::state::{Detection, SearchResult};

/// Rows shown at once. Export always uses the full result.
pub const DISPLAY_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Low => "low",
        }
    }
}

pub fn classify(score: f64) -> Tier {
    if score >= 0.8 {
        Tier::High
    } else if score >= 0.6 {
        Tier::Medium
    } else {
        Tier::Low
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionRow {
    pub target_filename: String,
    pub class_name: String,
    pub bbox: [i64; 4],
    pub score: String,
    pub tier: Tier,
}

impl From<&Detection> for DetectionRow {
    fn from(d: &Detection) -> Self {
        Self {
            target_filename: d.target_filename.clone(),
            class_name: d.class_name.clone(),
            bbox: [d.x_min, d.y_min, d.x_max, d.y_max],
            score: format!("{:.3}", d.score),
            tier: classify(d.score),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultView {
    pub summary: String,
    pub total_count: usize,
    pub rows: Vec<DetectionRow>,
}

pub fn present(result: &SearchResult) -> ResultView {
    ResultView {
        summary: result.summary(),
        total_count: result.total_count,
        rows: result
            .detections
            .iter()
            .take(DISPLAY_CAP)
            .map(DetectionRow::from)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(classify(0.8), Tier::High);
        assert_eq!(classify(0.7999), Tier::Medium);
        assert_eq!(classify(0.6), Tier::Medium);
        assert_eq!(classify(0.5999), Tier::Low);
        assert_eq!(classify(1.0), Tier::High);
        assert_eq!(classify(0.0), Tier::Low);
    }

    #[test]
    fn test_display_capped_without_touching_result() {
        let detections: Vec<Detection> = (0..150)
            .map(|i| Detection {
                target_filename: format!("t{}.tif", i % 7),
                class_name: "Ship".into(),
                x_min: i,
                y_min: i,
                x_max: i + 5,
                y_max: i + 5,
                score: 0.65,
            })
            .collect();
        let result = SearchResult::from_detections(detections);
        let view = present(&result);
        assert_eq!(view.rows.len(), DISPLAY_CAP);
        assert_eq!(view.total_count, 150);
        assert_eq!(result.detections.len(), 150);
        assert_eq!(view.rows[0].bbox, [0, 0, 5, 5]);
        assert_eq!(view.rows[99].bbox[0], 99);
    }

    #[test]
    fn test_row_formatting() {
        let row = DetectionRow::from(&Detection {
            target_filename: "t1.tif".into(),
            class_name: "Solar_Panel".into(),
            x_min: 1,
            y_min: 2,
            x_max: 3,
            y_max: 4,
            score: 0.91234,
        });
        assert_eq!(row.score, "0.912");
        assert_eq!(row.tier, Tier::High);
        assert_eq!(row.tier.label(), "high");
    }
}
