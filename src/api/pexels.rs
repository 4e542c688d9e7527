use crate::api::StockFootage;
use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const PEXELS_API_URL: &str = "https://api.pexels.com/videos";
const TARGET_ASPECT: f64 = 16.0 / 9.0;
const ASPECT_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PexelsVideoFile {
    pub id: u64,
    pub quality: String,
    pub file_type: String,
    pub width: i32,
    pub height: i32,
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PexelsVideo {
    pub id: u64,
    pub width: i32,
    pub height: i32,
    pub url: String,
    #[serde(default)]
    pub image: String,
    pub duration: f64,
    pub video_files: Vec<PexelsVideoFile>,
}

#[derive(Debug, Deserialize)]
struct PexelsSearchResponse {
    videos: Vec<PexelsVideo>,
}

fn is_16_9(width: i32, height: i32) -> bool {
    if height <= 0 {
        return false;
    }
    (width as f64 / height as f64 - TARGET_ASPECT).abs() < ASPECT_TOLERANCE
}

/// Picks the download link for a video: exact 1920x1080 first, then any
/// `hd`-quality 16:9 file, then the widest 16:9, then the widest overall.
pub fn best_video_file(video: &PexelsVideo) -> Option<&str> {
    let mut wide: Vec<&PexelsVideoFile> = video
        .video_files
        .iter()
        .filter(|f| is_16_9(f.width, f.height))
        .collect();

    if let Some(full_hd) = wide.iter().find(|f| f.width == 1920 && f.height == 1080) {
        return Some(&full_hd.link);
    }
    if let Some(hd) = wide.iter().find(|f| f.quality == "hd") {
        return Some(&hd.link);
    }

    wide.sort_by(|a, b| b.width.cmp(&a.width));
    if let Some(best) = wide.first() {
        return Some(&best.link);
    }

    video
        .video_files
        .iter()
        .max_by_key(|f| f.width)
        .map(|f| f.link.as_str())
}

pub struct PexelsClient {
    pub client: Client,
    api_key: String,
}

impl PexelsClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            api_key: cfg.pexels_api_key.clone(),
        })
    }

    pub fn with_client(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl StockFootage for PexelsClient {
    async fn search(&self, query: &str, per_page: usize) -> Result<Vec<PexelsVideo>> {
        // Request double the wanted count so there is room to filter for
        // 16:9 results.
        let fetch_count = (per_page * 2).to_string();
        let resp = self
            .client
            .get(format!("{PEXELS_API_URL}/search"))
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query),
                ("per_page", fetch_count.as_str()),
                ("orientation", "landscape"),
            ])
            .send()
            .await
            .context("Pexels search failed")?;

        if !resp.status().is_success() {
            return Err(anyhow::anyhow!(
                "Pexels search HTTP {}",
                resp.status().as_u16()
            ));
        }

        let search: PexelsSearchResponse = resp.json().await.context("parse Pexels search")?;
        let mut filtered: Vec<PexelsVideo> = search
            .videos
            .into_iter()
            .filter(|v| is_16_9(v.width, v.height))
            .collect();
        filtered.truncate(per_page);
        Ok(filtered)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .context("Pexels download failed")?;

        if !resp.status().is_success() {
            return Err(anyhow::anyhow!(
                "Pexels download HTTP {}",
                resp.status().as_u16()
            ));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create dir {}", parent.display()))?;
        }

        let mut out = fs::File::create(dest)
            .await
            .with_context(|| format!("create clip file: {}", dest.display()))?;
        while let Some(chunk) = resp.chunk().await? {
            out.write_all(&chunk).await?;
        }
        out.flush().await.ok();
        Ok(())
    }
}
