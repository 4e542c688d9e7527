use crate::captions::{chunk_captions, CaptionWord};
use crate::ffmpeg::Encoder;
use crate::project::{ProjectStatus, ProjectStore};
use crate::srt;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// What to do when a section's selected clip file is absent on disk.
/// `BestEffort` logs and renders a shorter video from the clips that exist;
/// `Strict` fails the whole job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClipPolicy {
    Strict,
    #[default]
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    ProcessingClips,
    Concatenating,
    Subtitling,
    Muxing,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderStage::ProcessingClips => "processing-clips",
            RenderStage::Concatenating => "concatenating",
            RenderStage::Subtitling => "subtitling",
            RenderStage::Muxing => "muxing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("section {section} clip missing: {path}")]
    MissingClip { section: usize, path: PathBuf },
    #[error("no usable clips to concatenate")]
    NoClips,
    #[error("{stage} failed: {cause}")]
    Stage {
        stage: RenderStage,
        cause: anyhow::Error,
    },
    #[error("render task aborted: {0}")]
    Aborted(String),
}

fn stage_err(stage: RenderStage, cause: anyhow::Error) -> RenderError {
    RenderError::Stage { stage, cause }
}

/// One section's resolved input to the pipeline: the local clip file and the
/// duration it must be retimed to.
#[derive(Debug, Clone)]
pub struct SectionClip {
    pub clip_path: PathBuf,
    pub duration: f64,
}

/// Everything one render invocation needs from its caller. Preconditions
/// (audio present, captions present, all sections resolved) are the
/// caller's job; they are not re-validated here.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub project_id: String,
    pub sections: Vec<SectionClip>,
    pub audio_path: PathBuf,
    pub captions: Vec<CaptionWord>,
}

/// Scratch directory for one render invocation. Acquired up front and
/// released on every exit path, success or failure.
struct Workspace {
    root: PathBuf,
}

impl Workspace {
    async fn create(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create workspace: {}", root.display()))?;
        Ok(Self { root })
    }

    fn clip_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("clip_{index}.mp4"))
    }

    fn concat_list(&self) -> PathBuf {
        self.root.join("concat_list.txt")
    }

    fn subtitle_file(&self) -> PathBuf {
        self.root.join("subtitles.srt")
    }

    fn merged(&self) -> PathBuf {
        self.root.join("merged.mp4")
    }

    /// Deletes scratch contents first, then the directory itself. Failures
    /// are logged and swallowed; a leftover scratch file never fails a
    /// render that otherwise finished.
    async fn cleanup(self) {
        for entry in WalkDir::new(&self.root).min_depth(1).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Workspace walk failed under {}: {}", self.root.display(), err);
                    continue;
                }
            };
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir(path).await.ok();
            } else {
                fs::remove_file(path).await.ok();
            }
        }
        if let Err(err) = fs::remove_dir(&self.root).await {
            warn!("Failed to remove workspace {}: {}", self.root.display(), err);
        }
    }
}

pub struct Renderer {
    encoder: Arc<dyn Encoder>,
    policy: ClipPolicy,
    output_root: PathBuf,
}

impl Renderer {
    pub fn new(encoder: Arc<dyn Encoder>, policy: ClipPolicy, output_root: impl Into<PathBuf>) -> Self {
        Self {
            encoder,
            policy,
            output_root: output_root.into(),
        }
    }

    /// Runs the full pipeline for one job and returns the final video path.
    /// Strictly sequential; the first stage failure aborts the job. The
    /// scratch workspace is deleted whether the render succeeds or not.
    pub async fn render(&self, job: &RenderJob) -> Result<PathBuf, RenderError> {
        info!("Starting render for project {}", job.project_id);

        let project_dir = self.output_root.join(&job.project_id);
        fs::create_dir_all(&project_dir)
            .await
            .with_context(|| format!("create project dir: {}", project_dir.display()))
            .map_err(|e| stage_err(RenderStage::ProcessingClips, e))?;

        let workspace = Workspace::create(project_dir.join("temp"))
            .await
            .map_err(|e| stage_err(RenderStage::ProcessingClips, e))?;

        let result = self.run_stages(&workspace, &project_dir, job).await;
        workspace.cleanup().await;

        match &result {
            Ok(path) => info!(
                "Render complete for project {}: {}",
                job.project_id,
                path.display()
            ),
            Err(err) => error!("Render failed for project {}: {}", job.project_id, err),
        }
        result
    }

    async fn run_stages(
        &self,
        workspace: &Workspace,
        project_dir: &Path,
        job: &RenderJob,
    ) -> Result<PathBuf, RenderError> {
        info!(
            "[{}] normalizing {} section clips",
            RenderStage::ProcessingClips,
            job.sections.len()
        );
        let mut normalized = Vec::new();
        for (index, section) in job.sections.iter().enumerate() {
            let present = fs::metadata(&section.clip_path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !present {
                match self.policy {
                    ClipPolicy::Strict => {
                        return Err(RenderError::MissingClip {
                            section: index,
                            path: section.clip_path.clone(),
                        });
                    }
                    ClipPolicy::BestEffort => {
                        warn!(
                            "Skipping section {index}: clip missing at {}",
                            section.clip_path.display()
                        );
                        continue;
                    }
                }
            }

            let out = workspace.clip_path(index);
            self.encoder
                .normalize_clip(&section.clip_path, section.duration, &out)
                .await
                .map_err(|e| stage_err(RenderStage::ProcessingClips, e))?;
            normalized.push(out);
        }

        if normalized.is_empty() {
            return Err(RenderError::NoClips);
        }

        info!(
            "[{}] merging {} clips",
            RenderStage::Concatenating,
            normalized.len()
        );
        let list_path = workspace.concat_list();
        write_concat_manifest(&normalized, &list_path)
            .await
            .map_err(|e| stage_err(RenderStage::Concatenating, e))?;
        let merged = workspace.merged();
        self.encoder
            .concat_clips(&list_path, &merged)
            .await
            .map_err(|e| stage_err(RenderStage::Concatenating, e))?;

        info!("[{}] building subtitle track", RenderStage::Subtitling);
        let chunks = chunk_captions(&job.captions);
        let subtitle_path = workspace.subtitle_file();
        srt::write_subtitle_file(&chunks, &subtitle_path)
            .await
            .map_err(|e| stage_err(RenderStage::Subtitling, e))?;

        info!("[{}] burning subtitles and muxing narration", RenderStage::Muxing);
        let final_path = project_dir.join("video.mp4");
        self.encoder
            .mux_final(&merged, &job.audio_path, &subtitle_path, &final_path)
            .await
            .map_err(|e| stage_err(RenderStage::Muxing, e))?;

        Ok(final_path)
    }
}

/// Concat demuxer manifest: one `file '<absolute path>'` line per clip, in
/// playback order.
async fn write_concat_manifest(clips: &[PathBuf], list_path: &Path) -> Result<()> {
    let mut listf = fs::File::create(list_path)
        .await
        .with_context(|| format!("create concat list: {}", list_path.display()))?;
    for clip in clips {
        let absolute = fs::canonicalize(clip)
            .await
            .with_context(|| format!("resolve clip path: {}", clip.display()))?;
        listf
            .write_all(format!("file '{}'\n", absolute.display()).as_bytes())
            .await?;
    }
    listf.flush().await?;
    Ok(())
}

/// Handle to a render running as a background task. The project store is
/// the job's observable side channel; the handle is for callers that want
/// the result itself.
pub struct RenderHandle {
    task: JoinHandle<Result<PathBuf, RenderError>>,
}

impl RenderHandle {
    pub async fn wait(self) -> Result<PathBuf, RenderError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(RenderError::Aborted(err.to_string())),
        }
    }
}

/// Marks the project `rendering` and starts the pipeline as a tracked
/// background task. The task records `completed` plus the video path, or
/// `failed`, on the store when it finishes; store write failures are logged
/// and do not change the render outcome.
pub async fn spawn_render(
    renderer: Arc<Renderer>,
    store: Arc<dyn ProjectStore>,
    job: RenderJob,
) -> Result<RenderHandle> {
    store
        .set_status(&job.project_id, ProjectStatus::Rendering)
        .await
        .context("mark project rendering")?;

    let task = tokio::spawn(async move {
        let project_id = job.project_id.clone();
        let result = renderer.render(&job).await;
        match &result {
            Ok(path) => {
                if let Err(err) = store.set_final_video(&project_id, path).await {
                    warn!("Failed to record final video for {project_id}: {err:#}");
                }
            }
            Err(_) => {
                if let Err(err) = store.set_status(&project_id, ProjectStatus::Failed).await {
                    warn!("Failed to mark {project_id} failed: {err:#}");
                }
            }
        }
        result
    });

    Ok(RenderHandle { task })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeEncoder {
        calls: Mutex<Vec<String>>,
        manifest_seen: Mutex<Option<String>>,
        subtitles_seen: Mutex<Option<String>>,
        fail_mux: bool,
    }

    #[async_trait]
    impl Encoder for FakeEncoder {
        async fn normalize_clip(
            &self,
            input: &Path,
            target_duration: f64,
            out: &Path,
        ) -> Result<()> {
            self.calls.lock().unwrap().push(format!(
                "normalize {} {:.0}",
                input.file_name().unwrap().to_string_lossy(),
                target_duration
            ));
            fs::write(out, b"normalized").await?;
            Ok(())
        }

        async fn concat_clips(&self, list_file: &Path, out: &Path) -> Result<()> {
            self.calls.lock().unwrap().push("concat".to_string());
            let manifest = fs::read_to_string(list_file).await?;
            *self.manifest_seen.lock().unwrap() = Some(manifest);
            fs::write(out, b"merged").await?;
            Ok(())
        }

        async fn mux_final(
            &self,
            _video: &Path,
            _audio: &Path,
            subtitles: &Path,
            out: &Path,
        ) -> Result<()> {
            self.calls.lock().unwrap().push("mux".to_string());
            let document = fs::read_to_string(subtitles).await?;
            *self.subtitles_seen.lock().unwrap() = Some(document);
            if self.fail_mux {
                anyhow::bail!("encoder exploded");
            }
            fs::write(out, b"final").await?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProjectStore for RecordingStore {
        async fn load(&self, project_id: &str) -> Result<Project> {
            Ok(Project::new(project_id, "test"))
        }

        async fn save(&self, _project: &Project) -> Result<()> {
            Ok(())
        }

        async fn set_status(&self, project_id: &str, status: ProjectStatus) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push(format!("{project_id}:{status:?}"));
            Ok(())
        }

        async fn set_final_video(&self, project_id: &str, video_path: &Path) -> Result<()> {
            self.events.lock().unwrap().push(format!(
                "{project_id}:Completed:{}",
                video_path.file_name().unwrap().to_string_lossy()
            ));
            Ok(())
        }
    }

    fn word(text: &str, start: f64, end: f64) -> CaptionWord {
        CaptionWord {
            text: text.to_string(),
            start,
            end,
            confidence: 0.9,
        }
    }

    async fn stub_clip(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"source clip").await.unwrap();
        path
    }

    fn narration_words() -> Vec<CaptionWord> {
        // 40 words spread evenly over a 23s narration.
        (0..40)
            .map(|i| {
                let t = i as f64 * 0.575;
                word(&format!("w{i}"), t, t + 0.4)
            })
            .collect()
    }

    #[tokio::test]
    async fn renders_sections_in_order_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let visuals = dir.path().join("visuals");
        fs::create_dir_all(&visuals).await.unwrap();

        let sections = vec![
            SectionClip {
                clip_path: stub_clip(&visuals, "a.mp4").await,
                duration: 5.0,
            },
            SectionClip {
                clip_path: stub_clip(&visuals, "b.mp4").await,
                duration: 10.0,
            },
            SectionClip {
                clip_path: stub_clip(&visuals, "c.mp4").await,
                duration: 8.0,
            },
        ];
        let job = RenderJob {
            project_id: "p1".to_string(),
            sections,
            audio_path: dir.path().join("narration.mp3"),
            captions: narration_words(),
        };

        let encoder = Arc::new(FakeEncoder::default());
        let renderer = Renderer::new(encoder.clone(), ClipPolicy::Strict, dir.path().join("final"));

        let final_path = renderer.render(&job).await.unwrap();
        assert_eq!(final_path, dir.path().join("final").join("p1").join("video.mp4"));
        assert!(fs::metadata(&final_path).await.is_ok());

        let calls = encoder.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "normalize a.mp4 5",
                "normalize b.mp4 10",
                "normalize c.mp4 8",
                "concat",
                "mux"
            ]
        );

        // Manifest lists the normalized clips in section order, as
        // absolute paths.
        let manifest = encoder.manifest_seen.lock().unwrap().clone().unwrap();
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines.len(), 3);
        for (i, line) in lines.iter().enumerate() {
            assert!(line.starts_with("file '/"), "not absolute: {line}");
            assert!(line.contains(&format!("clip_{i}.mp4")));
        }

        // Subtitle document was built from the captions: at this word
        // spacing the 2.0s span cap closes every third word, so 40 words
        // become 14 cues.
        let document = encoder.subtitles_seen.lock().unwrap().clone().unwrap();
        assert!(document.starts_with("1\n00:00:00,000 --> "));
        assert_eq!(document.matches(" --> ").count(), 14);

        // Scratch workspace is gone; the deliverable is not.
        assert!(fs::metadata(dir.path().join("final").join("p1").join("temp"))
            .await
            .is_err());
        assert!(fs::metadata(&final_path).await.is_ok());
    }

    #[tokio::test]
    async fn missing_clip_fails_under_strict_policy() {
        let dir = tempfile::tempdir().unwrap();
        let job = RenderJob {
            project_id: "p2".to_string(),
            sections: vec![SectionClip {
                clip_path: dir.path().join("ghost.mp4"),
                duration: 5.0,
            }],
            audio_path: dir.path().join("narration.mp3"),
            captions: vec![],
        };

        let encoder = Arc::new(FakeEncoder::default());
        let renderer = Renderer::new(encoder.clone(), ClipPolicy::Strict, dir.path().join("final"));

        let err = renderer.render(&job).await.unwrap_err();
        assert!(matches!(err, RenderError::MissingClip { section: 0, .. }));
        assert!(encoder.calls.lock().unwrap().is_empty());
        // Workspace cleanup runs on the failure path too.
        assert!(fs::metadata(dir.path().join("final").join("p2").join("temp"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn missing_clip_is_skipped_under_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let visuals = dir.path().join("visuals");
        fs::create_dir_all(&visuals).await.unwrap();

        let job = RenderJob {
            project_id: "p3".to_string(),
            sections: vec![
                SectionClip {
                    clip_path: dir.path().join("ghost.mp4"),
                    duration: 5.0,
                },
                SectionClip {
                    clip_path: stub_clip(&visuals, "real.mp4").await,
                    duration: 6.0,
                },
            ],
            audio_path: dir.path().join("narration.mp3"),
            captions: vec![word("hi", 0.0, 0.4)],
        };

        let encoder = Arc::new(FakeEncoder::default());
        let renderer = Renderer::new(
            encoder.clone(),
            ClipPolicy::BestEffort,
            dir.path().join("final"),
        );

        renderer.render(&job).await.unwrap();
        let calls = encoder.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["normalize real.mp4 6", "concat", "mux"]);
    }

    #[tokio::test]
    async fn all_clips_missing_is_no_clips() {
        let dir = tempfile::tempdir().unwrap();
        let job = RenderJob {
            project_id: "p4".to_string(),
            sections: vec![SectionClip {
                clip_path: dir.path().join("ghost.mp4"),
                duration: 5.0,
            }],
            audio_path: dir.path().join("narration.mp3"),
            captions: vec![],
        };

        let renderer = Renderer::new(
            Arc::new(FakeEncoder::default()),
            ClipPolicy::BestEffort,
            dir.path().join("final"),
        );
        let err = renderer.render(&job).await.unwrap_err();
        assert!(matches!(err, RenderError::NoClips));
    }

    #[tokio::test]
    async fn empty_captions_still_render() {
        let dir = tempfile::tempdir().unwrap();
        let visuals = dir.path().join("visuals");
        fs::create_dir_all(&visuals).await.unwrap();

        let job = RenderJob {
            project_id: "p5".to_string(),
            sections: vec![SectionClip {
                clip_path: stub_clip(&visuals, "only.mp4").await,
                duration: 7.0,
            }],
            audio_path: dir.path().join("narration.mp3"),
            captions: vec![],
        };

        let encoder = Arc::new(FakeEncoder::default());
        let renderer = Renderer::new(encoder.clone(), ClipPolicy::Strict, dir.path().join("final"));

        renderer.render(&job).await.unwrap();
        let document = encoder.subtitles_seen.lock().unwrap().clone().unwrap();
        assert_eq!(document, "");
    }

    #[tokio::test]
    async fn spawned_render_updates_store_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let visuals = dir.path().join("visuals");
        fs::create_dir_all(&visuals).await.unwrap();

        let job = RenderJob {
            project_id: "p6".to_string(),
            sections: vec![SectionClip {
                clip_path: stub_clip(&visuals, "x.mp4").await,
                duration: 4.0,
            }],
            audio_path: dir.path().join("narration.mp3"),
            captions: vec![word("hi", 0.0, 0.4)],
        };

        let store = Arc::new(RecordingStore::default());
        let renderer = Arc::new(Renderer::new(
            Arc::new(FakeEncoder::default()),
            ClipPolicy::Strict,
            dir.path().join("final"),
        ));

        let handle = spawn_render(renderer, store.clone(), job).await.unwrap();
        handle.wait().await.unwrap();

        let events = store.events.lock().unwrap().clone();
        assert_eq!(events, vec!["p6:Rendering", "p6:Completed:video.mp4"]);
    }

    #[tokio::test]
    async fn spawned_render_marks_failed_on_stage_error() {
        let dir = tempfile::tempdir().unwrap();
        let visuals = dir.path().join("visuals");
        fs::create_dir_all(&visuals).await.unwrap();

        let job = RenderJob {
            project_id: "p7".to_string(),
            sections: vec![SectionClip {
                clip_path: stub_clip(&visuals, "x.mp4").await,
                duration: 4.0,
            }],
            audio_path: dir.path().join("narration.mp3"),
            captions: vec![],
        };

        let store = Arc::new(RecordingStore::default());
        let encoder = Arc::new(FakeEncoder {
            fail_mux: true,
            ..FakeEncoder::default()
        });
        let renderer = Arc::new(Renderer::new(
            encoder,
            ClipPolicy::Strict,
            dir.path().join("final"),
        ));

        let handle = spawn_render(renderer, store.clone(), job).await.unwrap();
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(
            err,
            RenderError::Stage {
                stage: RenderStage::Muxing,
                ..
            }
        ));

        let events = store.events.lock().unwrap().clone();
        assert_eq!(events, vec!["p7:Rendering", "p7:Failed"]);
    }
}
