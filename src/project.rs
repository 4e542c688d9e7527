use crate::api::pexels::PexelsVideo;
use crate::captions::CaptionWord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Rendering,
    Completed,
    Failed,
}

/// The clip chosen for one section, pinned down to the file that will be
/// downloaded for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedClip {
    pub id: u64,
    pub url: String,
    pub width: i32,
    pub height: i32,
}

/// A contiguous stretch of the narration timeline assigned one stock clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualSection {
    pub section_text: String,
    pub search_query: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub selected_clip: Option<SelectedClip>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<PexelsVideo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub status: ProjectStatus,
    pub script_text: Option<String>,
    pub audio_file_path: Option<PathBuf>,
    #[serde(default)]
    pub captions: Vec<CaptionWord>,
    #[serde(default)]
    pub sections: Vec<VisualSection>,
    pub final_video_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            status: ProjectStatus::Draft,
            script_text: None,
            audio_file_path: None,
            captions: Vec::new(),
            sections: Vec::new(),
            final_video_path: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persistence seam for the project record. The render pipeline only ever
/// writes status transitions and the final video path through this trait;
/// what backs it is the caller's concern.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn load(&self, project_id: &str) -> Result<Project>;
    async fn save(&self, project: &Project) -> Result<()>;
    async fn set_status(&self, project_id: &str, status: ProjectStatus) -> Result<()>;
    async fn set_final_video(&self, project_id: &str, video_path: &Path) -> Result<()>;
}

/// Project records as one JSON file per project under a root directory.
pub struct JsonProjectStore {
    root: PathBuf,
}

impl JsonProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, project_id: &str) -> PathBuf {
        self.root.join(format!("{project_id}.json"))
    }
}

#[async_trait]
impl ProjectStore for JsonProjectStore {
    async fn load(&self, project_id: &str) -> Result<Project> {
        let path = self.record_path(project_id);
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("read project record: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parse project record: {}", path.display()))
    }

    async fn save(&self, project: &Project) -> Result<()> {
        fs::create_dir_all(&self.root).await.ok();
        let path = self.record_path(&project.id);
        let content = serde_json::to_string_pretty(project)?;
        fs::write(&path, content)
            .await
            .with_context(|| format!("write project record: {}", path.display()))?;
        Ok(())
    }

    async fn set_status(&self, project_id: &str, status: ProjectStatus) -> Result<()> {
        let mut project = self.load(project_id).await?;
        project.status = status;
        project.updated_at = Utc::now();
        self.save(&project).await
    }

    async fn set_final_video(&self, project_id: &str, video_path: &Path) -> Result<()> {
        let mut project = self.load(project_id).await?;
        project.status = ProjectStatus::Completed;
        project.final_video_path = Some(video_path.to_path_buf());
        project.updated_at = Utc::now();
        self.save(&project).await
    }
}
