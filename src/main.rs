use ai_story_shorts::api::assemblyai::AssemblyAiClient;
use ai_story_shorts::api::openrouter::OpenRouterClient;
use ai_story_shorts::api::pexels::PexelsClient;
use ai_story_shorts::config::Config;
use ai_story_shorts::ffmpeg::FfmpegEncoder;
use ai_story_shorts::generator::Pipeline;
use ai_story_shorts::init;
use ai_story_shorts::project::JsonProjectStore;
use ai_story_shorts::render::Renderer;
use anyhow::Result;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = Config::load("config.json").await?;

    init::ensure_directories(&cfg.upload_dir).await?;
    if !init::check_ffmpeg().await {
        eprintln!("[WARNING] FFmpeg not found in PATH. Please install FFmpeg.");
    }

    let completions = Arc::new(OpenRouterClient::new(&cfg)?);
    let transcriber = Arc::new(AssemblyAiClient::new(&cfg)?);
    let footage = Arc::new(PexelsClient::new(&cfg)?);
    let store = Arc::new(JsonProjectStore::new(cfg.upload_dir.join("projects")));
    let renderer = Arc::new(Renderer::new(
        Arc::new(FfmpegEncoder),
        cfg.clip_policy,
        cfg.upload_dir.join("final"),
    ));

    let pipeline = Pipeline::new(cfg, completions, transcriber, footage, store, renderer);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("ideas") => {
            let count = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(5);
            for idea in pipeline.generate_ideas(count, &[]).await? {
                println!("{idea}");
            }
        }
        Some("script") => {
            let idea = args[1..].join(" ");
            if idea.is_empty() {
                anyhow::bail!("usage: ai-story-shorts script <idea>");
            }
            println!("{}", pipeline.generate_script(&idea).await?);
        }
        Some(other) => anyhow::bail!("unknown command: {other}"),
        None => {
            pipeline.run_all().await?;
        }
    }

    Ok(())
}
