use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::engine::EngineError;

/// HTTP client for the external face recognition service. The service is
/// treated as opaque, possibly slow and possibly down; every call carries a
/// bounded timeout and failures surface as `UpstreamUnavailable`.
#[derive(Clone)]
pub struct FaceApiClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizedStudent {
    pub student_id: String,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeResponse {
    pub success: bool,
    #[serde(default)]
    pub students: Vec<RecognizedStudent>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeManyResponse {
    pub success: bool,
    #[serde(default)]
    pub recognized_students: Vec<RecognizedStudent>,
    #[serde(default)]
    pub total_faces: u32,
    #[serde(default)]
    pub unrecognized_count: u32,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResponse {
    pub success: bool,
    #[serde(default)]
    pub embedding: Option<Vec<f64>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl FaceApiClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build face API client");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, EngineError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.post(&url).json(&body).send().await.map_err(|e| {
            warn!(error = %e, url = %url, "face API request failed");
            EngineError::UpstreamUnavailable("Face Recognition API is not available".to_string())
        })?;

        // Non-2xx responses still carry a {success:false, message} body, so
        // decode them instead of treating the status as fatal.
        resp.json::<T>().await.map_err(|e| {
            warn!(error = %e, url = %url, "face API returned malformed body");
            EngineError::UpstreamUnavailable(
                "Face Recognition API returned an invalid response".to_string(),
            )
        })
    }

    pub async fn recognize(&self, image_base64: &str) -> Result<RecognizeResponse, EngineError> {
        self.post("/recognize", json!({ "image": image_base64 }))
            .await
    }

    pub async fn recognize_multiple(
        &self,
        image_base64: &str,
    ) -> Result<RecognizeManyResponse, EngineError> {
        self.post("/recognize-multiple", json!({ "image": image_base64 }))
            .await
    }

    pub async fn add_student(
        &self,
        student_id: &str,
        name: &str,
        image_base64: &str,
    ) -> Result<EnrollResponse, EngineError> {
        self.post(
            "/add-student",
            json!({ "studentId": student_id, "name": name, "image": image_base64 }),
        )
        .await
    }

    pub async fn remove_student(&self, student_id: &str) -> Result<EnrollResponse, EngineError> {
        self.post("/remove-student", json!({ "studentId": student_id }))
            .await
    }

    /// Health probe, never fails: a down matcher reports itself as such.
    pub async fn health(&self) -> serde_json::Value {
        let url = format!("{}/health", self.base_url);
        fn fallback() -> serde_json::Value {
            json!({
                "success": false,
                "message": "Face Recognition API is not running"
            })
        }
        match self.http.get(&url).send().await {
            Ok(resp) => resp.json().await.unwrap_or_else(|_| fallback()),
            Err(_) => fallback(),
        }
    }
}
