//! Generative collaborator seam.
//!
//! The pipeline only ever sees the `Collaborator` trait: propose variants of
//! a seed idea, emit code for one variant, repair code given a diagnostic.
//! Every method swallows transport and parsing failures into empty/absent
//! returns; the orchestrator decides what a missing answer means, never a
//! transport layer.

pub mod http;
pub mod prompts;

use crate::config::Settings;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

pub use http::HttpCollaborator;

/// A proposed factor variant.
#[derive(Debug, Clone, PartialEq)]
pub struct Idea {
    /// CamelCase factor identifier, also the requested function name.
    pub name: String,
    /// DSL expression for the factor, when the collaborator supplied one.
    pub formula: Option<String>,
    pub description: String,
}

impl Idea {
    /// Ideas missing a name or description cannot be processed.
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.description.is_empty()
    }

    /// Formula text for prompts, with a placeholder when absent.
    pub fn formula_text(&self) -> &str {
        self.formula.as_deref().unwrap_or("(not provided)")
    }
}

#[derive(Debug, Deserialize)]
struct IdeaWire {
    #[serde(default)]
    factor_name: String,
    #[serde(default)]
    factor_formula: Option<String>,
    #[serde(default)]
    factor_description: String,
}

impl From<IdeaWire> for Idea {
    fn from(wire: IdeaWire) -> Self {
        let formula = wire
            .factor_formula
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
        Idea {
            name: wire.factor_name.trim().to_string(),
            formula,
            description: wire.factor_description.trim().to_string(),
        }
    }
}

/// The generative side of the pipeline.
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Label recorded in the audit ledger.
    fn label(&self) -> &str;

    /// Propose `count` variants of a seed idea. Empty on any failure.
    async fn propose(&self, seed: &str, count: usize) -> Vec<Idea>;

    /// Emit code implementing an idea. `None` on any failure.
    async fn generate_code(&self, idea: &Idea) -> Option<String>;

    /// Repair previously generated code given an execution diagnostic.
    /// `None` on any failure.
    async fn repair_code(&self, old_code: &str, error: &str, idea: &Idea) -> Option<String>;
}

/// Build the collaborator for a configured provider label.
///
/// The API key is resolved from the profile's environment variable here, at
/// startup, so a missing key fails the run before any work happens.
pub fn collaborator_for(label: &str, settings: &Settings) -> Result<HttpCollaborator> {
    let Some(profile) = settings.profile(label) else {
        bail!(
            "unknown provider '{label}' (configured: {})",
            settings.provider_labels().join(", ")
        );
    };
    let api_key = std::env::var(&profile.api_key_env).with_context(|| {
        format!(
            "provider '{label}' needs an API key in the {} environment variable",
            profile.api_key_env
        )
    })?;
    HttpCollaborator::new(
        label,
        profile.clone(),
        api_key,
        std::time::Duration::from_secs(settings.request_timeout_secs),
    )
}

/// Drop markdown code-fence lines and surrounding whitespace from model
/// output. Models regularly wrap both code and JSON in ``` fences despite
/// instructions not to; the loader cleans again on its side.
pub fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Extract the outermost JSON array from text that may contain other
/// content. Bracket depth is tracked outside string literals so formulas
/// and descriptions containing `]` do not cut the scan short.
pub fn extract_json_array(text: &str) -> Option<String> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '[' if !in_string => depth += 1,
            ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a model ideation reply into ideas. Anything unparseable yields an
/// empty list; the caller treats that as a failed proposal.
pub(crate) fn parse_ideas(content: &str) -> Vec<Idea> {
    let cleaned = strip_code_fences(content);
    let Some(body) = extract_json_array(&cleaned) else {
        warn!("ideation reply contained no JSON array");
        return Vec::new();
    };
    match serde_json::from_str::<Vec<IdeaWire>>(&body) {
        Ok(wires) => wires.into_iter().map(Idea::from).collect(),
        Err(err) => {
            warn!(error = %err, "ideation reply failed to parse");
            Vec::new()
        }
    }
}
