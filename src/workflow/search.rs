use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::backend::SearchBackend;
use crate::error::{ValidationError, WorkflowError};
use crate::state::{Chip, SearchParameters, SearchRequest, SearchResult};

fn check_unit_interval(name: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidParameter {
            name,
            reason: format!("{} is outside [0, 1]", value),
        })
    }
}

/// Validates preconditions and assembles the request, chip ids in registry order.
pub fn build_request(
    chips: &[Chip],
    params: &SearchParameters,
) -> Result<SearchRequest, ValidationError> {
    if chips.is_empty() {
        return Err(ValidationError::NoChipsSelected);
    }
    let class_name = params.class_name.trim();
    if class_name.is_empty() {
        return Err(ValidationError::MissingClassName);
    }
    if params.top_k == 0 {
        return Err(ValidationError::InvalidParameter {
            name: "top_k",
            reason: "must be at least 1".to_string(),
        });
    }
    check_unit_interval("similarity_threshold", params.similarity_threshold)?;
    check_unit_interval("nms_threshold", params.nms_threshold)?;

    Ok(SearchRequest {
        chip_ids: chips.iter().map(|c| c.chip_id.clone()).collect(),
        class_name: class_name.to_string(),
        top_k: params.top_k,
        similarity_threshold: params.similarity_threshold,
        nms_threshold: params.nms_threshold,
    })
}

pub struct SearchExecutor {
    backend: Arc<dyn SearchBackend>,
}

impl SearchExecutor {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Issues exactly one backend call once validation passes.
    pub async fn search(
        &self,
        chips: &[Chip],
        params: &SearchParameters,
    ) -> Result<SearchResult, WorkflowError> {
        let request = build_request(chips, params)?;
        debug!(
            "search: {} chips, class=\"{}\", top_k={}, sim={}, nms={}",
            request.chip_ids.len(),
            request.class_name,
            request.top_k,
            request.similarity_threshold,
            request.nms_threshold
        );

        let response = self.backend.search(&request).await.map_err(|e| {
            error!("search failed: {}", e);
            WorkflowError::SearchFailed {
                message: e.user_message(),
            }
        })?;

        let reported = (response.total_count, response.images_count);
        let result = SearchResult::from_detections(response.detections);
        if reported != (Some(result.total_count), Some(result.images_count)) {
            warn!(
                "backend counts {:?} differ from detections ({}, {})",
                reported, result.total_count, result.images_count
            );
        }
        info!("search: {}", result.summary());
        Ok(result)
    }
}
