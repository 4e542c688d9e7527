use crate::api::pexels::best_video_file;
use crate::api::{Completions, StockFootage, Transcriber};
use crate::config::Config;
use crate::project::{Project, ProjectStore, SelectedClip, VisualSection};
use crate::render::{spawn_render, RenderJob, Renderer, SectionClip};
use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

const CANDIDATES_PER_SECTION: usize = 3;
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a"];

/// The full idea-to-video flow with every external collaborator injected:
/// LLM completions, transcription, stock footage, and the render pipeline.
pub struct Pipeline {
    cfg: Config,
    completions: Arc<dyn Completions>,
    transcriber: Arc<dyn Transcriber>,
    footage: Arc<dyn StockFootage>,
    store: Arc<dyn ProjectStore>,
    renderer: Arc<Renderer>,
}

impl Pipeline {
    pub fn new(
        cfg: Config,
        completions: Arc<dyn Completions>,
        transcriber: Arc<dyn Transcriber>,
        footage: Arc<dyn StockFootage>,
        store: Arc<dyn ProjectStore>,
        renderer: Arc<Renderer>,
    ) -> Self {
        Self {
            cfg,
            completions,
            transcriber,
            footage,
            store,
            renderer,
        }
    }

    pub async fn generate_ideas(&self, count: usize, previous: &[String]) -> Result<Vec<String>> {
        self.completions
            .generate_ideas(
                &self.cfg.idea_system_prompt,
                &self.cfg.idea_model,
                count,
                previous,
            )
            .await
    }

    pub async fn generate_script(&self, idea: &str) -> Result<String> {
        self.completions
            .generate_script(&self.cfg.script_system_prompt, &self.cfg.script_model, idea)
            .await
    }

    /// Takes one recorded narration through captions, section planning,
    /// footage selection, and the render, returning the deliverable path.
    pub async fn process_narration(&self, project_id: &str, audio_path: &Path) -> Result<PathBuf> {
        let mut project = Project::new(project_id, project_id);
        project.audio_file_path = Some(audio_path.to_path_buf());
        self.store.save(&project).await?;

        info!("Transcribing narration: {}", audio_path.display());
        let captions = self.transcriber.word_captions(audio_path).await?;
        if captions.is_empty() {
            anyhow::bail!(
                "Transcription returned no words for {}",
                audio_path.display()
            );
        }
        let narration_end = captions.last().map(|w| w.end).unwrap_or(0.0);
        info!("Captions: {} words over {:.2}s", captions.len(), narration_end);
        project.captions = captions.clone();
        self.store.save(&project).await?;

        info!("Planning visual sections...");
        let plans = self
            .completions
            .generate_visual_sections(
                &self.cfg.visual_system_prompt,
                &self.cfg.visual_model,
                &captions,
            )
            .await?;
        if plans.is_empty() {
            anyhow::bail!("Section planning returned no sections");
        }
        info!("Planned {} sections", plans.len());

        let mut sections = Vec::new();
        for plan in plans {
            let candidates = match self
                .footage
                .search(&plan.search_query, CANDIDATES_PER_SECTION)
                .await
            {
                Ok(videos) => videos,
                Err(err) => {
                    warn!("Footage search failed for '{}': {err:#}", plan.search_query);
                    Vec::new()
                }
            };
            sections.push(VisualSection {
                duration: plan.end_time - plan.start_time,
                section_text: plan.section_text,
                search_query: plan.search_query,
                start_time: plan.start_time,
                end_time: plan.end_time,
                selected_clip: None,
                candidates,
            });
        }

        // Headless selection: first candidate with a usable file. The
        // interactive selection step of the full product replaces this.
        let visuals_dir = self.cfg.upload_dir.join("visuals").join(project_id);
        for (index, section) in sections.iter_mut().enumerate() {
            let chosen = section
                .candidates
                .iter()
                .find_map(|v| best_video_file(v).map(|link| (v, link.to_string())));
            let Some((video, link)) = chosen else {
                warn!(
                    "No usable footage for section {index} ('{}')",
                    section.search_query
                );
                continue;
            };

            let dest = visuals_dir.join(format!("{}.mp4", video.id));
            if fs::metadata(&dest).await.is_err() {
                info!("Downloading clip {} for section {index}", video.id);
                self.footage
                    .download(&link, &dest)
                    .await
                    .with_context(|| format!("download clip {}", video.id))?;
            }
            section.selected_clip = Some(SelectedClip {
                id: video.id,
                url: link,
                width: video.width,
                height: video.height,
            });
        }

        project.sections = sections;
        self.store.save(&project).await?;

        // Render precondition: every section must have a resolved clip.
        let mut clips = Vec::new();
        for (index, section) in project.sections.iter().enumerate() {
            let selected = section.selected_clip.as_ref().ok_or_else(|| {
                anyhow::anyhow!("Section {index} has no selected clip; cannot render")
            })?;
            clips.push(SectionClip {
                clip_path: visuals_dir.join(format!("{}.mp4", selected.id)),
                duration: section.duration,
            });
        }

        let job = RenderJob {
            project_id: project_id.to_string(),
            sections: clips,
            audio_path: audio_path.to_path_buf(),
            captions,
        };
        let handle = spawn_render(self.renderer.clone(), self.store.clone(), job).await?;
        let final_path = handle.wait().await?;
        Ok(final_path)
    }

    /// Scans the narration drop folder and processes every file that does
    /// not already have a deliverable. Returns how many were processed.
    pub async fn run_all(&self) -> Result<i32> {
        let audio_dir = self.cfg.upload_dir.join("audio");
        let mut processed = 0;

        let mut entries = fs::read_dir(&audio_dir)
            .await
            .with_context(|| format!("read narration folder: {}", audio_dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_audio = path
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| AUDIO_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
                .unwrap_or(false);
            if !is_audio {
                continue;
            }

            let project_id = strip_ext(entry.file_name().to_string_lossy().as_ref());
            let deliverable = self
                .cfg
                .upload_dir
                .join("final")
                .join(&project_id)
                .join("video.mp4");
            if fs::metadata(&deliverable).await.is_ok() {
                info!("Skipping {} (already rendered)", project_id);
                continue;
            }

            info!("=== Processing: {} ===", project_id);
            match self.process_narration(&project_id, &path).await {
                Ok(final_path) => {
                    processed += 1;
                    info!("DONE: {} -> {}", project_id, final_path.display());
                }
                Err(err) => {
                    warn!("FAILED: {}: {err:#}", project_id);
                }
            }
        }

        info!("All done. Processed: {}", processed);
        Ok(processed)
    }
}

fn strip_ext(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or(filename)
        .to_string()
}
