use anyhow::Result;
use std::path::Path;
use tokio::fs;

const REQUIRED_SUBDIRS: &[&str] = &["audio", "visuals", "final", "projects"];

pub async fn ensure_directories(upload_dir: &Path) -> Result<()> {
    for sub in REQUIRED_SUBDIRS {
        let dir = upload_dir.join(sub);
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::info!("Created directory: {}", dir.display());
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
