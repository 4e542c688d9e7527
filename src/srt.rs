use crate::captions::CaptionChunk;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1_000;
    let ms = total_ms % 1_000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, ms)
}

/// Serializes caption chunks into a SubRip document: 1-based index, a
/// `start --> end` timestamp line, the cue text, blank-line separated.
/// Chunks are written in the order given; no merging or wrapping.
pub fn build_subtitle_document(chunks: &[CaptionChunk]) -> String {
    let mut out = String::new();
    for (index, chunk) in chunks.iter().enumerate() {
        out.push_str(&format!("{}\n", index + 1));
        out.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(chunk.start),
            format_timestamp(chunk.end)
        ));
        out.push_str(&chunk.text);
        out.push_str("\n\n");
    }
    out
}

pub async fn write_subtitle_file(chunks: &[CaptionChunk], dest: &Path) -> Result<()> {
    let document = build_subtitle_document(chunks);
    let mut out = fs::File::create(dest)
        .await
        .with_context(|| format!("create srt: {}", dest.display()))?;
    out.write_all(document.as_bytes()).await?;
    out.flush().await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, start: f64, end: f64) -> CaptionChunk {
        CaptionChunk {
            words: text.split(' ').map(str::to_string).collect(),
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn timestamp_is_zero_padded_with_millis() {
        assert_eq!(format_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_timestamp(3661.234), "01:01:01,234");
        assert_eq!(format_timestamp(3665.0), "01:01:05,000");
        assert_eq!(format_timestamp(59.999), "00:00:59,999");
    }

    #[test]
    fn document_layout_matches_subrip() {
        let chunks = vec![chunk("hello there", 0.0, 1.5), chunk("again", 1.6, 2.1)];
        let doc = build_subtitle_document(&chunks);
        assert_eq!(
            doc,
            "1\n00:00:00,000 --> 00:00:01,500\nhello there\n\n\
             2\n00:00:01,600 --> 00:00:02,100\nagain\n\n"
        );
    }

    #[test]
    fn empty_chunks_yield_empty_document() {
        assert_eq!(build_subtitle_document(&[]), "");
    }

    #[tokio::test]
    async fn writes_document_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("subtitles.srt");
        write_subtitle_file(&[chunk("on disk", 3.0, 4.25)], &dest)
            .await
            .unwrap();

        let written = tokio::fs::read_to_string(&dest).await.unwrap();
        assert_eq!(written, "1\n00:00:03,000 --> 00:00:04,250\non disk\n\n");
    }
}
