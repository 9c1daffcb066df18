use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{InferenceBackend, InferenceError, VideoProbe};
use crate::models::detection::FrameClassification;

/// Client for the model-serving HTTP service.
///
/// Payloads travel base64-encoded in JSON bodies. A 422 from the service
/// means the input could not be decoded and maps to
/// [`InferenceError::Decode`].
pub struct RemoteInferenceBackend {
    http: Client,
    base_url: String,
    api_token: Option<String>,
}

#[derive(Serialize)]
struct ClassifyRequest {
    image: String,
}

#[derive(Serialize)]
struct EmbedRequest {
    audio: String,
    sample_rate: u32,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct VideoRequest<'a> {
    video: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    indices: Option<&'a [u64]>,
}

#[derive(Deserialize)]
struct FramesResponse {
    frames: Vec<Option<String>>,
}

const SAMPLE_RATE: u32 = 16_000;

impl RemoteInferenceBackend {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, InferenceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, InferenceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.http.post(format!("{}{}", self.base_url, path)).json(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(InferenceError::Decode(response.text().await.unwrap_or_default()));
        }
        if !status.is_success() {
            return Err(InferenceError::Service {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| {
                if e.is_decode() {
                    InferenceError::Malformed(format!("{path}: {e}"))
                } else {
                    InferenceError::Transport(e)
                }
            })
    }
}

fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[async_trait]
impl InferenceBackend for RemoteInferenceBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn classify(&self, image: &[u8]) -> Result<FrameClassification, InferenceError> {
        let result: FrameClassification = self
            .post("/v1/classify", &ClassifyRequest { image: encode(image) })
            .await?;

        if !(0.0..=100.0).contains(&result.confidence) {
            return Err(InferenceError::Malformed(format!(
                "confidence {} out of range",
                result.confidence
            )));
        }
        Ok(result)
    }

    async fn embed(&self, audio: &[u8]) -> Result<Vec<f32>, InferenceError> {
        let response: EmbedResponse = self
            .post(
                "/v1/embed",
                &EmbedRequest {
                    audio: encode(audio),
                    sample_rate: SAMPLE_RATE,
                },
            )
            .await?;
        Ok(response.embedding)
    }

    async fn probe_video(&self, video: &[u8]) -> Result<VideoProbe, InferenceError> {
        self.post(
            "/v1/video/probe",
            &VideoRequest {
                video: encode(video),
                indices: None,
            },
        )
        .await
    }

    async fn extract_frames(
        &self,
        video: &[u8],
        indices: &[u64],
    ) -> Result<Vec<Option<Vec<u8>>>, InferenceError> {
        let response: FramesResponse = self
            .post(
                "/v1/video/frames",
                &VideoRequest {
                    video: encode(video),
                    indices: Some(indices),
                },
            )
            .await?;

        if response.frames.len() != indices.len() {
            return Err(InferenceError::Malformed(format!(
                "requested {} frames, received {}",
                indices.len(),
                response.frames.len()
            )));
        }

        // An undecodable frame is skipped rather than failing the whole batch.
        Ok(response
            .frames
            .into_iter()
            .map(|frame| {
                frame.and_then(|data| base64::engine::general_purpose::STANDARD.decode(data).ok())
            })
            .collect())
    }

    async fn health_check(&self) -> Result<(), InferenceError> {
        let response = self.http.get(format!("{}/health", self.base_url)).send().await?;
        if !response.status().is_success() {
            return Err(InferenceError::Service {
                status: response.status().as_u16(),
                message: "health check failed".to_string(),
            });
        }
        Ok(())
    }
}
