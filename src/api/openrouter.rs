use crate::api::Completions;
use crate::captions::CaptionWord;
use crate::config::Config;
use crate::section_plan::{SectionPlan, SectionPlanList};
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const REFERER: &str = "http://localhost:3001";
const APP_TITLE: &str = "AI Story Shorts";

pub struct OpenRouterClient {
    pub client: Client,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            api_key: cfg.openrouter_api_key.clone(),
        })
    }

    pub fn with_client(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    async fn chat_completion(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let mut body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": temperature,
        });
        if let Some(max_tokens) = max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", APP_TITLE)
            .json(&body)
            .send()
            .await
            .context("OpenRouter request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet = raw.chars().take(800).collect::<String>();
            warn!("OpenRouter HTTP {}: {}", status.as_u16(), snippet);
            return Err(anyhow::anyhow!("OpenRouter HTTP {}", status.as_u16()));
        }

        extract_message_content(&raw)
            .ok_or_else(|| anyhow::anyhow!("OpenRouter response had no message content"))
    }
}

fn extract_message_content(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error") {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            warn!("OpenRouter error message: {}", msg);
        }
        return None;
    }

    root.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

/// Models routinely wrap JSON answers in markdown code fences even when told
/// not to; strip one fenced block if present.
fn strip_code_fences(content: &str) -> String {
    static OPEN_RE: OnceCell<Regex> = OnceCell::new();
    static CLOSE_RE: OnceCell<Regex> = OnceCell::new();

    let open = OPEN_RE.get_or_init(|| Regex::new(r"^```(?:json)?\s*\n?").unwrap());
    let close = CLOSE_RE.get_or_init(|| Regex::new(r"\n?```\s*$").unwrap());

    let trimmed = content.trim();
    let without_open = open.replace(trimmed, "");
    close.replace(&without_open, "").into_owned()
}

#[async_trait]
impl Completions for OpenRouterClient {
    async fn generate_ideas(
        &self,
        system_prompt: &str,
        model: &str,
        count: usize,
        previous_ideas: &[String],
    ) -> Result<Vec<String>> {
        let mut avoid = String::new();
        if !previous_ideas.is_empty() {
            avoid.push_str(
                "IMPORTANT: Do NOT generate any ideas similar to these previously approved ideas:\n",
            );
            for (i, idea) in previous_ideas.iter().enumerate() {
                avoid.push_str(&format!("{}. {}\n", i + 1, idea));
            }
        }

        let user_prompt = format!(
            "Generate exactly {count} unique and compelling ideas for narrated story videos. \
             Each idea should be a single sentence that describes what the video will be about.\n\n\
             {avoid}\n\
             Return the ideas as a JSON array of strings, nothing else. Format: [\"idea 1\", \"idea 2\", ...]"
        );

        let content = self
            .chat_completion(model, system_prompt, &user_prompt, 0.8, None)
            .await?;

        let cleaned = strip_code_fences(&content);
        let ideas: Vec<String> =
            serde_json::from_str(&cleaned).context("Failed to parse ideas JSON")?;
        Ok(ideas)
    }

    async fn generate_script(
        &self,
        system_prompt: &str,
        model: &str,
        idea: &str,
    ) -> Result<String> {
        let user_prompt = format!(
            "Write a compelling 3000-word script for a narrated video about: \"{idea}\"\n\n\
             The script should:\n\
             - Be approximately 3000 words long\n\
             - Be engaging and emotional\n\
             - Include a strong hook at the beginning\n\
             - Have a clear narrative structure\n\
             - Be suitable for narration\n\
             - Include vivid descriptions and storytelling elements\n\n\
             Write ONLY the script text, nothing else."
        );

        self.chat_completion(model, system_prompt, &user_prompt, 0.7, Some(4000))
            .await
    }

    async fn generate_visual_sections(
        &self,
        system_prompt: &str,
        model: &str,
        captions: &[CaptionWord],
    ) -> Result<Vec<SectionPlan>> {
        let total_duration = captions.last().map(|w| w.end).unwrap_or(0.0);
        let word_timings = captions
            .iter()
            .map(|w| format!("{}[{:.1}s-{:.1}s]", w.text, w.start, w.end))
            .collect::<Vec<_>>()
            .join(" ");

        let user_prompt = format!(
            "Below is a transcript with word-level timestamps. Break it into visual sections for \
             video editing. Each section needs a different background video from a stock-footage \
             library.\n\n\
             TRANSCRIPT WITH TIMINGS:\n{word_timings}\n\n\
             TOTAL DURATION: {total_duration:.2} seconds\n\n\
             Return ONLY a JSON array with this exact format (no markdown, no explanation):\n\
             [\n  {{\n    \"section_text\": \"brief description of what this section covers\",\n    \
             \"search_query\": \"stock footage search term\",\n    \"start_time\": 0.0,\n    \
             \"end_time\": 15.5\n  }}\n]"
        );

        let content = self
            .chat_completion(model, system_prompt, &user_prompt, 0.5, None)
            .await?;

        let plan = SectionPlanList::from_json(&strip_code_fences(&content))?;
        Ok(plan.items)
    }
}
