use crate::render::ClipPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub openrouter_api_key: String,
    pub assemblyai_api_key: String,
    pub pexels_api_key: String,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    #[serde(default = "default_model")]
    pub idea_model: String,
    #[serde(default = "default_model")]
    pub script_model: String,
    #[serde(default = "default_model")]
    pub visual_model: String,

    #[serde(default = "default_idea_prompt")]
    pub idea_system_prompt: String,
    #[serde(default = "default_script_prompt")]
    pub script_system_prompt: String,
    #[serde(default = "default_visual_prompt")]
    pub visual_system_prompt: String,

    #[serde(default)]
    pub clip_policy: ClipPolicy,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_model() -> String {
    "openai/gpt-4o".to_string()
}

fn default_idea_prompt() -> String {
    "You are a creative director for short-form narrated story videos.".to_string()
}

fn default_script_prompt() -> String {
    "You are a scriptwriter for emotional, narration-driven videos.".to_string()
}

fn default_visual_prompt() -> String {
    "You are a video editor planning stock-footage b-roll for a narrated video.".to_string()
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: Config = serde_json::from_str(&content)?;

        if config.openrouter_api_key.is_empty() {
            anyhow::bail!("config.json: openrouter_api_key missing");
        }
        if config.assemblyai_api_key.is_empty() {
            anyhow::bail!("config.json: assemblyai_api_key missing");
        }
        if config.pexels_api_key.is_empty() {
            anyhow::bail!("config.json: pexels_api_key missing");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_minimal_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(
            &path,
            r#"{"openrouter_api_key":"or","assemblyai_api_key":"aai","pexels_api_key":"px"}"#,
        )
        .await
        .unwrap();

        let cfg = Config::load(&path).await.unwrap();
        assert_eq!(cfg.upload_dir, PathBuf::from("./uploads"));
        assert_eq!(cfg.clip_policy, ClipPolicy::BestEffort);
        assert!(!cfg.visual_system_prompt.is_empty());
    }

    #[tokio::test]
    async fn rejects_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(
            &path,
            r#"{"openrouter_api_key":"","assemblyai_api_key":"aai","pexels_api_key":"px"}"#,
        )
        .await
        .unwrap();

        assert!(Config::load(&path).await.is_err());
    }
}
