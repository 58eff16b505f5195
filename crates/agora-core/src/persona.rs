//! Assistant persona, capabilities and settings.
//!
//! A [`Persona`] describes how the assistant speaks. Prompt templates refer
//! to persona fields with `{placeholder}` syntax and are filled in with
//! [`Persona::render`].

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AgoraError, Result};

/// One line of an example conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageExample {
    pub user: String,
    pub text: String,
    #[serde(default)]
    pub action: Option<String>,
}

impl std::fmt::Display for MessageExample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "User: {}\nContent: {}", self.user, self.text)?;
        if let Some(action) = &self.action {
            write!(f, "\nAction: {action}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRules {
    pub general: Vec<String>,
    pub conversation: Vec<String>,
    pub publication: Vec<String>,
}

/// The assistant's personality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    #[serde(default = "default_persona_name")]
    pub name: String,
    /// Short snippets describing the assistant.
    pub description: Vec<String>,
    #[serde(default)]
    pub backstory: Vec<String>,
    #[serde(default)]
    pub adjectives: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Each inner list is one example exchange.
    #[serde(default)]
    pub conversation_examples: Vec<Vec<MessageExample>>,
    #[serde(default)]
    pub publication_examples: Vec<String>,
    pub style_rules: StyleRules,
}

fn default_persona_name() -> String {
    "Athena".to_string()
}

impl Persona {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AgoraError::Validation("persona name is empty".into()));
        }
        if self.description.is_empty() {
            return Err(AgoraError::Validation(
                "persona needs at least one description line".into(),
            ));
        }
        let rules = &self.style_rules;
        if rules.general.is_empty() || rules.conversation.is_empty() || rules.publication.is_empty()
        {
            return Err(AgoraError::Validation(
                "every style rule group needs at least one rule".into(),
            ));
        }
        Ok(())
    }

    /// Template fields exposed to prompts.
    pub fn fields(&self) -> HashMap<&'static str, String> {
        let examples = self
            .conversation_examples
            .iter()
            .map(|exchange| {
                exchange
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        HashMap::from([
            ("name", self.name.clone()),
            ("description", self.description.join("\n")),
            ("backstory", self.backstory.join("\n")),
            ("adjectives", self.adjectives.join(", ")),
            ("topics", self.topics.join(", ")),
            ("conversation_examples", examples),
            ("publications_examples", self.publication_examples.join("\n")),
            ("general_conversation", self.style_rules.general.join("\n")),
            ("conversation_style", self.style_rules.conversation.join("\n")),
            ("publication_style", self.style_rules.publication.join("\n")),
        ])
    }

    /// Fill `{field}` placeholders from the persona.
    ///
    /// Unknown placeholders are left as-is, and `{{`/`}}` produce literal braces.
    pub fn render(&self, template: &str) -> String {
        render_template(template, &self.fields())
    }

    /// The built-in persona.
    pub fn athena() -> Self {
        Self {
            name: default_persona_name(),
            description: vec![
                "A calm guide who makes sense of busy group chats".into(),
                "Brings the important threads of a conversation to the surface".into(),
                "Prefers plain words over jargon".into(),
            ],
            backstory: vec![
                "Has read more community chats than anyone should".into(),
                "Learned that most discussions circle around a handful of topics".into(),
            ],
            adjectives: vec![
                "clear-eyed".into(),
                "grounded".into(),
                "concise".into(),
                "curious".into(),
            ],
            topics: vec![
                "community discussions".into(),
                "open-source projects".into(),
                "technology news".into(),
            ],
            conversation_examples: vec![vec![
                MessageExample {
                    user: "Sam".into(),
                    text: "What did I miss in the dev chat?".into(),
                    action: None,
                },
                MessageExample {
                    user: "Athena".into(),
                    text: "Mostly the release plan and a long thread on build times.".into(),
                    action: Some("SUMMARIZE".into()),
                },
            ]],
            publication_examples: vec![
                "Three threads worth your time today, none of them about tabs vs spaces.".into(),
            ],
            style_rules: StyleRules {
                general: vec![
                    "Be brief".into(),
                    "Never invent facts that are not in the messages".into(),
                ],
                conversation: vec!["Answer the question first, then add context".into()],
                publication: vec!["One idea per post".into()],
            },
        }
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::athena()
    }
}

/// Messaging surfaces the assistant may act through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientKind {
    TelegramUser,
    TelegramBot,
}

/// What the assistant is allowed to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Powers {
    pub selected_clients: Vec<ClientKind>,
    /// Provider name, as understood by the LLM registry.
    pub selected_model: String,
}

impl Powers {
    pub fn validate(&self) -> Result<()> {
        if self.selected_clients.is_empty() {
            return Err(AgoraError::Validation(
                "At least one client must be selected".into(),
            ));
        }
        if self.selected_model.trim().is_empty() {
            return Err(AgoraError::Validation("A model must be selected".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub streaming_response: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            streaming_response: true,
        }
    }
}

/// Persona, powers and settings together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Essence {
    pub persona: Persona,
    pub powers: Powers,
    #[serde(default)]
    pub settings: Settings,
}

impl Essence {
    /// Load an essence from a TOML file with `[persona]`, `[powers]` and
    /// `[settings]` tables.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let essence: Essence = toml::from_str(&content)?;
        essence.validate()?;
        info!(name = %essence.persona.name, "Essence loaded from {}", path.display());
        Ok(essence)
    }

    pub fn validate(&self) -> Result<()> {
        self.persona.validate()?;
        self.powers.validate()
    }
}

fn render_template(template: &str, fields: &HashMap<&'static str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
        } else {
            match tail.find('}') {
                Some(end) => {
                    let key = &tail[1..end];
                    match fields.get(key) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&tail[..=end]),
                    }
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
        }
    }
    out.push_str(rest);
    out
}
