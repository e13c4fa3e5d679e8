//! Client for the generative-language API that simulates the human on the
//! other side of a chat. One best-effort call per human message; callers
//! treat any failure as non-fatal and substitute a fixed apology.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;

use crate::store::{ChatMessage, DonatedItem, UserRole};

/// Only the most recent turns are sent upstream as context.
const HISTORY_WINDOW: usize = 10;

/// Reply used when no API key is configured, so the demo keeps working.
const KEYLESS_REPLY: &str = "Thank you for your message. We will get back to you shortly.";

#[async_trait]
pub trait ReplyOracle: Send + Sync {
    /// Produce the next message `simulate` would say, given the conversation
    /// so far about `item`.
    async fn reply(
        &self,
        history: &[ChatMessage],
        item: &DonatedItem,
        simulate: UserRole,
    ) -> anyhow::Result<String>;
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl GeminiClient {
    pub fn from_env() -> Self {
        let api_key = env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; chat replies will use a canned response");
        }
        GeminiClient {
            http: reqwest::Client::new(),
            api_key,
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
        }
    }
}

#[async_trait]
impl ReplyOracle for GeminiClient {
    async fn reply(
        &self,
        history: &[ChatMessage],
        item: &DonatedItem,
        simulate: UserRole,
    ) -> anyhow::Result<String> {
        let Some(api_key) = &self.api_key else {
            return Ok(KEYLESS_REPLY.to_string());
        };

        let request = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: system_instruction(item, simulate),
                }],
            },
            contents: history_to_contents(history),
            generation_config: GenerationConfig {
                thinking_config: ThinkingConfig { thinking_budget: 0 },
            },
        };

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("generative-language API returned {}", resp.status());
        }

        let body: GenerateContentResponse = resp.json().await?;
        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow::anyhow!("generative-language API returned no candidates"))?;

        Ok(text.trim().to_string())
    }
}

fn system_instruction(item: &DonatedItem, simulate: UserRole) -> String {
    format!(
        "You are simulating a conversation on AidBridge.\n{}\nThe conversation is about the item: \"{}\".\nKeep your replies concise, friendly, and focused on arranging the donation. Do not use markdown.",
        simulate.persona(),
        item.name
    )
}

/// Machine-attributed messages replay as `model` turns, everything else as
/// `user`, capped to the most recent [`HISTORY_WINDOW`] entries.
fn history_to_contents(history: &[ChatMessage]) -> Vec<Content> {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    history[start..]
        .iter()
        .map(|message| Content {
            role: Some(if message.is_machine() { "model" } else { "user" }.to_string()),
            parts: vec![Part {
                text: message.text.clone(),
            }],
        })
        .collect()
}

#[derive(Serialize)]
struct GenerateContentRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "thinkingConfig")]
    thinking_config: ThinkingConfig,
}

#[derive(Serialize)]
struct ThinkingConfig {
    #[serde(rename = "thinkingBudget")]
    thinking_budget: u32,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ItemStatus, AI_SENDER_PREFIX};
    use chrono::Utc;

    fn message(sender: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: "m".into(),
            sender_id: sender.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn history_tags_machine_messages_as_model_turns() {
        let history = vec![
            message("ngo1", "hello"),
            message(&format!("{}donor1", AI_SENDER_PREFIX), "hi there"),
        ];
        let contents = history_to_contents(&history);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn history_is_capped_to_the_most_recent_turns() {
        let history: Vec<_> = (0..25)
            .map(|n| message("ngo1", &format!("turn {}", n)))
            .collect();
        let contents = history_to_contents(&history);
        assert_eq!(contents.len(), HISTORY_WINDOW);
        assert_eq!(contents[0].parts[0].text, "turn 15");
        assert_eq!(contents.last().unwrap().parts[0].text, "turn 24");
    }

    #[test]
    fn system_instruction_names_the_item_and_persona() {
        let item = DonatedItem {
            id: "item1".into(),
            donor_id: "donor1".into(),
            name: "Winter Coat".into(),
            description: String::new(),
            category: "Clothing".into(),
            image_url: String::new(),
            status: ItemStatus::Available,
        };
        let prompt = system_instruction(&item, UserRole::Donor);
        assert!(prompt.contains("Winter Coat"));
        assert!(prompt.contains("friendly Donor"));
        let prompt = system_instruction(&item, UserRole::Ngo);
        assert!(prompt.contains("verified NGO"));
    }
}
