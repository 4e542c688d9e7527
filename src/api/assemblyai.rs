use crate::api::Transcriber;
use crate::captions::CaptionWord;
use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::info;

const ASSEMBLYAI_BASE: &str = "https://api.assemblyai.com";
const POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TranscriptStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Deserialize)]
struct TranscriptWord {
    text: String,
    start: f64,
    end: f64,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    id: String,
    status: TranscriptStatus,
    #[serde(default)]
    words: Option<Vec<TranscriptWord>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

pub struct AssemblyAiClient {
    pub client: Client,
    api_key: String,
}

impl AssemblyAiClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            api_key: cfg.assemblyai_api_key.clone(),
        })
    }

    pub fn with_client(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    async fn upload_audio(&self, audio_path: &Path) -> Result<String> {
        let audio_data = fs::read(audio_path)
            .await
            .with_context(|| format!("read audio: {}", audio_path.display()))?;

        let resp = self
            .client
            .post(format!("{ASSEMBLYAI_BASE}/v2/upload"))
            .header("authorization", &self.api_key)
            .header("Content-Type", "application/octet-stream")
            .body(audio_data)
            .send()
            .await
            .context("AssemblyAI upload failed")?;

        if !resp.status().is_success() {
            return Err(anyhow::anyhow!(
                "AssemblyAI upload HTTP {}",
                resp.status().as_u16()
            ));
        }

        let upload: UploadResponse = resp.json().await.context("parse upload response")?;
        Ok(upload.upload_url)
    }

    async fn create_transcript(&self, audio_url: &str) -> Result<String> {
        let resp = self
            .client
            .post(format!("{ASSEMBLYAI_BASE}/v2/transcript"))
            .header("authorization", &self.api_key)
            .json(&json!({
                "audio_url": audio_url,
                "language_detection": true,
            }))
            .send()
            .await
            .context("AssemblyAI transcript request failed")?;

        if !resp.status().is_success() {
            return Err(anyhow::anyhow!(
                "AssemblyAI transcript HTTP {}",
                resp.status().as_u16()
            ));
        }

        let transcript: TranscriptResponse = resp.json().await.context("parse transcript")?;
        Ok(transcript.id)
    }

    async fn fetch_transcript(&self, transcript_id: &str) -> Result<TranscriptResponse> {
        let resp = self
            .client
            .get(format!("{ASSEMBLYAI_BASE}/v2/transcript/{transcript_id}"))
            .header("authorization", &self.api_key)
            .send()
            .await
            .context("AssemblyAI poll failed")?;

        if !resp.status().is_success() {
            return Err(anyhow::anyhow!(
                "AssemblyAI poll HTTP {}",
                resp.status().as_u16()
            ));
        }

        resp.json().await.context("parse transcript poll")
    }

    async fn poll_transcript(&self, transcript_id: &str) -> Result<TranscriptResponse> {
        loop {
            let transcript = self.fetch_transcript(transcript_id).await?;
            match transcript.status {
                TranscriptStatus::Completed => return Ok(transcript),
                TranscriptStatus::Error => {
                    return Err(anyhow::anyhow!(
                        "Transcription failed: {}",
                        transcript.error.unwrap_or_else(|| "unknown".to_string())
                    ));
                }
                TranscriptStatus::Queued | TranscriptStatus::Processing => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }
}

#[async_trait]
impl Transcriber for AssemblyAiClient {
    async fn word_captions(&self, audio_path: &Path) -> Result<Vec<CaptionWord>> {
        let audio_url = self.upload_audio(audio_path).await?;
        let transcript_id = self.create_transcript(&audio_url).await?;
        info!("Transcript {} created, polling...", transcript_id);
        let transcript = self.poll_transcript(&transcript_id).await?;

        // AssemblyAI reports word timings in milliseconds.
        let captions = transcript
            .words
            .unwrap_or_default()
            .into_iter()
            .map(|w| CaptionWord {
                text: w.text,
                start: w.start / 1000.0,
                end: w.end / 1000.0,
                confidence: w.confidence,
            })
            .collect();
        Ok(captions)
    }
}
