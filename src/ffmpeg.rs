use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

const MIN_SPEED_FACTOR: f64 = 0.5;
const MAX_SPEED_FACTOR: f64 = 2.0;

const OUT_WIDTH: i32 = 1920;
const OUT_HEIGHT: i32 = 1080;
const OUT_FPS: i32 = 30;

// Burned-in caption look for short-form viewing: bold white Arial on an
// opaque black box, bottom-anchored.
const SUBTITLE_STYLE: &str = "FontName=Arial,FontSize=48,PrimaryColour=&H00FFFFFF,\
OutlineColour=&H00000000,BorderStyle=3,Outline=4,Shadow=0,Bold=1,Alignment=2,MarginV=50";

/// The video-encoder seam of the pipeline. The orchestrator only ever talks
/// to this trait, so tests can substitute a fake that never shells out.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn normalize_clip(&self, input: &Path, target_duration: f64, out: &Path) -> Result<()>;
    async fn concat_clips(&self, list_file: &Path, out: &Path) -> Result<()>;
    async fn mux_final(&self, video: &Path, audio: &Path, subtitles: &Path, out: &Path)
        -> Result<()>;
}

/// Shells out to the ffmpeg/ffprobe CLI.
pub struct FfmpegEncoder;

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn normalize_clip(&self, input: &Path, target_duration: f64, out: &Path) -> Result<()> {
        ffmpeg_normalize_clip(input, target_duration, out).await
    }

    async fn concat_clips(&self, list_file: &Path, out: &Path) -> Result<()> {
        ffmpeg_concat_clips(list_file, out).await
    }

    async fn mux_final(
        &self,
        video: &Path,
        audio: &Path,
        subtitles: &Path,
        out: &Path,
    ) -> Result<()> {
        ffmpeg_mux_final(video, audio, subtitles, out).await
    }
}

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let status = cmd.status().await.context("Command execution failed")?;
    if !status.success() {
        return Err(anyhow::anyhow!("Command failed: {:?}", args));
    }

    Ok(())
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed for {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(anyhow::anyhow!("Invalid duration for {}", path.display()));
    }
    Ok(duration)
}

/// Speed factor that retimes a clip of `native` seconds to `target` seconds,
/// clamped so playback never drops below half speed or exceeds double speed.
/// Past the clamp the output duration stops tracking the target exactly; the
/// truncation in the encode call keeps it from overshooting.
pub fn clamped_speed_factor(native: f64, target: f64) -> f64 {
    (native / target).clamp(MIN_SPEED_FACTOR, MAX_SPEED_FACTOR)
}

/// Re-encodes `input` so its playback duration matches `target_duration`.
/// Every normalized clip comes out with the same codec parameters (H.264,
/// yuv420p, constant frame rate, fixed geometry), which is what makes the
/// later stream-copy concatenation legal. Stock clips are treated as silent;
/// the audio stream is dropped.
pub async fn ffmpeg_normalize_clip(
    input: &Path,
    target_duration: f64,
    out: &Path,
) -> Result<()> {
    if target_duration <= 0.1 {
        return Err(anyhow::anyhow!(
            "Invalid target duration {:.3}s for {}",
            target_duration,
            input.display()
        ));
    }

    let native = ffprobe_duration_seconds(input).await?;
    let speed = clamped_speed_factor(native, target_duration);
    info!(
        "Normalizing {} ({:.2}s native -> {:.2}s target, speed {:.3}x)",
        input.display(),
        native,
        target_duration,
        speed
    );

    let filter = format!(
        "[0:v]setpts=PTS/{:.3},fps={},scale={}:{},setsar=1[v]",
        speed, OUT_FPS, OUT_WIDTH, OUT_HEIGHT
    );

    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-filter_complex".to_string(),
        filter,
        "-map".to_string(),
        "[v]".to_string(),
        "-an".to_string(),
        "-t".to_string(),
        format!("{:.3}", target_duration),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        out.display().to_string(),
    ];

    run_cmd(&args).await?;
    if !out.exists() {
        return Err(anyhow::anyhow!(
            "ffmpeg produced no output at {}",
            out.display()
        ));
    }
    Ok(())
}

/// Stitches the clips listed in a concat manifest into one file in list
/// order, stream-copied. All inputs must share codec parameters; the
/// normalizer's fixed profile guarantees that.
pub async fn ffmpeg_concat_clips(list_file: &Path, out: &Path) -> Result<()> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_file.display().to_string(),
        "-c".to_string(),
        "copy".to_string(),
        out.display().to_string(),
    ];
    run_cmd(&args).await?;
    if !out.exists() {
        return Err(anyhow::anyhow!(
            "concat produced no output at {}",
            out.display()
        ));
    }
    Ok(())
}

/// Burns the subtitle track into the silent video and muxes the narration
/// in. The only stage after normalization that re-encodes picture; burn-in
/// requires it.
pub async fn ffmpeg_mux_final(
    video: &Path,
    audio: &Path,
    subtitles: &Path,
    out: &Path,
) -> Result<()> {
    let subtitle_path = subtitles.display().to_string().replace('\\', "/");
    let filter = format!(
        "subtitles={}:force_style='{}'",
        subtitle_path, SUBTITLE_STYLE
    );

    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-i".to_string(),
        audio.display().to_string(),
        "-vf".to_string(),
        filter,
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "medium".to_string(),
        "-crf".to_string(),
        "23".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out.display().to_string(),
    ];
    run_cmd(&args).await?;
    if !out.exists() {
        return Err(anyhow::anyhow!("mux produced no output at {}", out.display()));
    }
    Ok(())
}
