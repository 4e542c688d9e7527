use crate::captions::CaptionWord;
use crate::section_plan::SectionPlan;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub mod assemblyai;
pub mod openrouter;
pub mod pexels;

/// LLM completion collaborator: idea generation, script writing, and
/// visual-section planning over word timings.
#[async_trait]
pub trait Completions: Send + Sync {
    async fn generate_ideas(
        &self,
        system_prompt: &str,
        model: &str,
        count: usize,
        previous_ideas: &[String],
    ) -> Result<Vec<String>>;

    async fn generate_script(&self, system_prompt: &str, model: &str, idea: &str)
        -> Result<String>;

    async fn generate_visual_sections(
        &self,
        system_prompt: &str,
        model: &str,
        captions: &[CaptionWord],
    ) -> Result<Vec<SectionPlan>>;
}

/// Speech-to-text collaborator producing word-level timed captions.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn word_captions(&self, audio_path: &Path) -> Result<Vec<CaptionWord>>;
}

/// Stock-footage collaborator: search candidates and fetch the chosen file.
#[async_trait]
pub trait StockFootage: Send + Sync {
    async fn search(&self, query: &str, per_page: usize) -> Result<Vec<pexels::PexelsVideo>>;
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}
