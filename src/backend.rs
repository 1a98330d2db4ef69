use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Response};
use serde::Deserialize;

use crate::error::BackendError;
use crate::state::{
    Chip, ChipRegion, Detection, IndexInfo, SearchRequest, SearchResponse, SearchStatus,
    Submission,
};

/// The remote visual-search service. Every method is one request/response.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn status(&self) -> Result<SearchStatus, BackendError>;
    async fn upload_chip(&self, filename: &str, bytes: Vec<u8>) -> Result<Chip, BackendError>;
    async fn draw_chip(&self, region: &ChipRegion) -> Result<Chip, BackendError>;
    async fn load_index(&self, index_dir: &str) -> Result<IndexInfo, BackendError>;
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, BackendError>;
    async fn export_submission(
        &self,
        detections: &[Detection],
        team_name: &str,
    ) -> Result<Submission, BackendError>;
    async fn preview(&self, chip_id: &str) -> Result<Vec<u8>, BackendError>;
    fn endpoint(&self) -> String;
}

pub struct HttpBackend {
    base: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

fn parse_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!("backend returned {}: {}", status, body);
    Err(BackendError::Rejected {
        status: status.as_u16(),
        detail: parse_detail(&body),
    })
}

fn disposition_filename(response: &Response) -> Option<String> {
    let value = response.headers().get(header::CONTENT_DISPOSITION)?.to_str().ok()?;
    value.split(';').map(str::trim).find_map(|part| {
        let name = part
            .strip_prefix("filename*=")
            .and_then(|v| v.split("''").nth(1))
            .or_else(|| part.strip_prefix("filename="))?;
        let name = name.trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

#[async_trait]
impl SearchBackend for HttpBackend {
    async fn status(&self) -> Result<SearchStatus, BackendError> {
        let response = self.client.get(self.url("status")).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn upload_chip(&self, filename: &str, bytes: Vec<u8>) -> Result<Chip, BackendError> {
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part("file", part);
        let response = self
            .client
            .post(self.url("upload_chip"))
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let mut chip: Chip = response.json().await?;
        if chip.filename.is_empty() {
            chip.filename = filename.to_string();
        }
        Ok(chip)
    }

    async fn draw_chip(&self, region: &ChipRegion) -> Result<Chip, BackendError> {
        let form = Form::new()
            .text("image_path", region.image_path.clone())
            .text("x", region.x.to_string())
            .text("y", region.y.to_string())
            .text("width", region.width.to_string())
            .text("height", region.height.to_string());
        let response = self
            .client
            .post(self.url("draw_chip"))
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn load_index(&self, index_dir: &str) -> Result<IndexInfo, BackendError> {
        let form = Form::new().text("index_dir", index_dir.to_string());
        let response = self
            .client
            .post(self.url("load_index"))
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, BackendError> {
        let response = self
            .client
            .post(self.url("search"))
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn export_submission(
        &self,
        detections: &[Detection],
        team_name: &str,
    ) -> Result<Submission, BackendError> {
        let response = self
            .client
            .post(self.url("export_submission"))
            .query(&[("team_name", team_name)])
            .json(detections)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let server_filename = disposition_filename(&response);
        let bytes = response.bytes().await?.to_vec();
        Ok(Submission { server_filename, bytes })
    }

    async fn preview(&self, chip_id: &str) -> Result<Vec<u8>, BackendError> {
        let response = self
            .client
            .get(self.url(&format!("preview/{}", chip_id)))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    fn endpoint(&self) -> String {
        self.base.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn detection(file: &str, score: f64) -> Detection {
        Detection {
            target_filename: file.into(),
            class_name: "Solar_Panel".into(),
            x_min: 1,
            y_min: 2,
            x_max: 30,
            y_max: 40,
            score,
        }
    }

    #[test]
    fn test_parse_detail_variants() {
        assert_eq!(
            parse_detail(r#"{"detail": "Embedder not loaded"}"#),
            Some("Embedder not loaded".into())
        );
        assert_eq!(parse_detail("Internal Server Error"), None);
        assert_eq!(parse_detail(r#"{"detail": null}"#), None);
        assert!(parse_detail(r#"{"detail": [{"msg": "field required"}]}"#)
            .unwrap()
            .contains("field required"));
    }

    #[test]
    fn test_url_join_trims_slashes() {
        let backend = HttpBackend::new("http://localhost:8000/");
        assert_eq!(backend.url("/status"), "http://localhost:8000/status");
        assert_eq!(backend.endpoint(), "http://localhost:8000");
    }

    #[tokio::test]
    async fn test_status_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedder_loaded": true,
                "index_loaded": true,
                "index_size": 1200,
                "device": "cpu"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let status = backend.status().await.unwrap();
        assert!(status.is_ready());
        assert_eq!(status.index_size, Some(1200));
        assert_eq!(status.device.as_deref(), Some("cpu"));
    }

    #[tokio::test]
    async fn test_status_unreachable() {
        let backend = HttpBackend::new("http://127.0.0.1:1");
        let err = backend.status().await.unwrap_err();
        assert!(matches!(err, BackendError::Unreachable(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload_chip"))
            .and(body_string_contains("filename=\"a.tif\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "chip_id": "c-1",
                "filename": "a.tif",
                "shape": [4, 32, 32],
                "preview_url": "/preview/c-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let chip = backend.upload_chip("a.tif", vec![1, 2, 3]).await.unwrap();
        assert_eq!(chip.chip_id, "c-1");
        assert_eq!(chip.filename, "a.tif");
    }

    #[tokio::test]
    async fn test_upload_rejected_carries_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload_chip"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "detail": "Failed to upload chip: not a TIFF"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let err = backend.upload_chip("bad.png", vec![0]).await.unwrap_err();
        assert_eq!(
            err,
            BackendError::Rejected {
                status: 400,
                detail: Some("Failed to upload chip: not a TIFF".into())
            }
        );
    }

    #[tokio::test]
    async fn test_load_index_sends_form_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/load_index"))
            .and(body_string_contains("cache/indexes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "Index loaded successfully",
                "total_vectors": 5000,
                "unique_images": 12
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let info = backend.load_index("cache/indexes").await.unwrap();
        assert_eq!(info.total_vectors, 5000);
        assert_eq!(info.unique_images, Some(12));
    }

    #[tokio::test]
    async fn test_search_posts_request_json() {
        let server = MockServer::start().await;
        let request = SearchRequest {
            chip_ids: vec!["a".into(), "b".into()],
            class_name: "Solar_Panel".into(),
            top_k: 100,
            similarity_threshold: 0.7,
            nms_threshold: 0.5,
        };
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_json(serde_json::json!({
                "chip_ids": ["a", "b"],
                "class_name": "Solar_Panel",
                "top_k": 100,
                "similarity_threshold": 0.7,
                "nms_threshold": 0.5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "detections": [detection("t1.tif", 0.9)],
                "total_count": 1,
                "images_count": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let response = backend.search(&request).await.unwrap();
        assert_eq!(response.detections.len(), 1);
        assert_eq!(response.detections[0].target_filename, "t1.tif");
    }

    #[tokio::test]
    async fn test_search_malformed_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not valid json"))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let request = SearchRequest {
            chip_ids: vec!["a".into()],
            class_name: "Ship".into(),
            top_k: 10,
            similarity_threshold: 0.7,
            nms_threshold: 0.5,
        };
        let err = backend.search(&request).await.unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_export_reads_bytes_and_filename() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/export_submission"))
            .and(query_param("team_name", "TeamName"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "content-disposition",
                        "attachment; filename=\"GC_PS03_17-Oct-2026_TeamName.txt\"",
                    )
                    .set_body_string("1 2 30 40 Solar_Panel t1.tif 0.900000\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let submission = backend
            .export_submission(&[detection("t1.tif", 0.9)], "TeamName")
            .await
            .unwrap();
        assert_eq!(
            submission.server_filename.as_deref(),
            Some("GC_PS03_17-Oct-2026_TeamName.txt")
        );
        assert!(String::from_utf8_lossy(&submission.bytes).contains("Solar_Panel"));
    }

    #[tokio::test]
    async fn test_preview_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/preview/missing"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({ "detail": "Preview not found" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&server.uri());
        let err = backend.preview("missing").await.unwrap_err();
        assert_eq!(err.user_message(), "Preview not found");
    }
}
