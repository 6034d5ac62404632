//! OpenAI-compatible chat client backing the collaborator trait.
//!
//! All five supported providers expose the same `/chat/completions` wire
//! shape, so a single client parameterized by a provider profile covers
//! them. Ideation and coding requests differ only in model and temperature.

use super::{Collaborator, Idea, parse_ideas, prompts, strip_code_fences};
use crate::config::ProviderProfile;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

/// Chat-backed collaborator for one configured provider.
pub struct HttpCollaborator {
    label: String,
    profile: ProviderProfile,
    api_key: String,
    client: Client,
}

impl HttpCollaborator {
    pub fn new(
        label: &str,
        profile: ProviderProfile,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            label: label.to_string(),
            profile,
            api_key,
            client,
        })
    }

    fn endpoint(&self) -> String {
        let base = self.profile.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }

    async fn chat(
        &self,
        model: &str,
        temperature: f32,
        system: &str,
        user: &str,
    ) -> Result<String> {
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            stream: false,
        };

        debug!(provider = %self.label, model, "sending chat request");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach provider '{}'", self.label))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!(
                "provider '{}' returned {status}: {}",
                self.label,
                truncate(&body, 320)
            );
        }

        let reply: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("Invalid response from provider '{}'", self.label))?;
        let Some(choice) = reply.choices.into_iter().next() else {
            bail!("provider '{}' response had no choices", self.label);
        };
        let content = choice.message.content;
        if content.trim().is_empty() {
            bail!("provider '{}' returned an empty message", self.label);
        }
        Ok(content)
    }
}

#[async_trait]
impl Collaborator for HttpCollaborator {
    fn label(&self) -> &str {
        &self.label
    }

    async fn propose(&self, seed: &str, count: usize) -> Vec<Idea> {
        let prompt = prompts::ideation_prompt(seed, count);
        match self
            .chat(
                &self.profile.ideation_model,
                self.profile.temperature_ideation,
                prompts::IDEATION_SYSTEM_PROMPT,
                &prompt,
            )
            .await
        {
            Ok(content) => parse_ideas(&content),
            Err(err) => {
                error!(provider = %self.label, error = %err, "ideation request failed");
                Vec::new()
            }
        }
    }

    async fn generate_code(&self, idea: &Idea) -> Option<String> {
        let prompt = prompts::code_gen_prompt(idea);
        match self
            .chat(
                &self.profile.coding_model,
                self.profile.temperature_coding,
                prompts::CODING_SYSTEM_PROMPT,
                &prompt,
            )
            .await
        {
            Ok(content) => Some(strip_code_fences(&content)),
            Err(err) => {
                error!(
                    provider = %self.label,
                    factor = %idea.name,
                    error = %err,
                    "code generation request failed"
                );
                None
            }
        }
    }

    async fn repair_code(&self, old_code: &str, error: &str, idea: &Idea) -> Option<String> {
        let prompt = prompts::repair_prompt(old_code, error, idea);
        match self
            .chat(
                &self.profile.coding_model,
                self.profile.temperature_coding,
                prompts::REPAIR_SYSTEM_PROMPT,
                &prompt,
            )
            .await
        {
            Ok(content) => Some(strip_code_fences(&content)),
            Err(err) => {
                error!(
                    provider = %self.label,
                    factor = %idea.name,
                    error = %err,
                    "code repair request failed"
                );
                None
            }
        }
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let truncated: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{truncated}...")
    } else {
        truncated
    }
}
