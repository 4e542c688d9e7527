use serde::{Deserialize, Serialize};

const MAX_CHUNK_SPAN_SECS: f64 = 2.0;
const MAX_CHUNK_WORDS: usize = 4;

/// One word of the narration with its spoken time range, as returned by the
/// transcription service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionWord {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
}

/// A short run of consecutive words grouped into one on-screen cue.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionChunk {
    pub words: Vec<String>,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl CaptionChunk {
    fn from_words(words: &[CaptionWord], start: f64) -> Self {
        let texts: Vec<String> = words.iter().map(|w| w.text.clone()).collect();
        let end = words.last().map(|w| w.end).unwrap_or(start);
        let text = texts.join(" ");
        Self {
            words: texts,
            start,
            end,
            text,
        }
    }
}

/// Groups word captions into subtitle-sized chunks. A chunk closes once the
/// next word would stretch it past 2.0 seconds from its start, or once it
/// already holds 4 words; the triggering word opens the next chunk.
pub fn chunk_captions(captions: &[CaptionWord]) -> Vec<CaptionChunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<CaptionWord> = Vec::new();
    let mut chunk_start = captions.first().map(|w| w.start).unwrap_or(0.0);

    for word in captions {
        if word.end - chunk_start > MAX_CHUNK_SPAN_SECS || current.len() >= MAX_CHUNK_WORDS {
            if !current.is_empty() {
                chunks.push(CaptionChunk::from_words(&current, chunk_start));
            }
            chunk_start = word.start;
            current = vec![word.clone()];
        } else {
            current.push(word.clone());
        }
    }

    if !current.is_empty() {
        chunks.push(CaptionChunk::from_words(&current, chunk_start));
    }

    chunks
}
