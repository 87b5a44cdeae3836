//! Chat-agnostic replies.
//!
//! A [`Reply`] serializes to the JSON the chat adapter renders: plain
//! content, an optional embed, an optional interactive prompt and an optional
//! file attachment.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::prompt::Choice;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    /// Shown only to the invoking user.
    #[serde(default)]
    pub ephemeral: bool,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ephemeral: true,
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embed: Some(embed),
            ..Default::default()
        }
    }

    pub fn with_prompt(mut self, prompt: PromptView) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn private(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// Text content, or empty.
    pub fn text_content(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Blue,
    Green,
    Red,
    Gold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: Color,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new(title: impl Into<String>, color: Color) -> Self {
        Self {
            title: title.into(),
            description: None,
            color,
            fields: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonStyle {
    Primary,
    Success,
    Danger,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub choice: Choice,
    pub label: String,
    pub style: ButtonStyle,
    pub disabled: bool,
}

/// The interactive part of a reply. Answered via `POST /api/v1/prompts/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptView {
    pub id: Uuid,
    pub message: String,
    pub buttons: Vec<Button>,
    pub timeout_secs: u64,
}

impl PromptView {
    /// Same prompt with every button disabled.
    pub fn inert(mut self) -> Self {
        for button in &mut self.buttons {
            button.disabled = true;
        }
        self
    }

    pub fn button(&self, choice: Choice) -> Option<&Button> {
        self.buttons.iter().find(|b| b.choice == choice)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data_base64: String,
}

impl Attachment {
    pub fn png(filename: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            filename: filename.into(),
            content_type: "image/png".to_string(),
            data_base64: STANDARD.encode(bytes),
        }
    }
}

/// Clock-style uptime: `H:MM:SS`, with a `N day(s), ` prefix past 24 hours.
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let rem = seconds % 86_400;
    let clock = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}

pub fn format_memory(used_bytes: u64, max_bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    format!(
        "{:.0}MB / {:.0}MB",
        used_bytes as f64 / MIB,
        max_bytes as f64 / MIB
    )
}

pub fn format_cpu(cores: Option<u64>, fraction: f64) -> String {
    let cores = cores.map_or_else(|| "?".to_string(), |c| c.to_string());
    format!("{cores} Cores\nUsage: {:.1}%", fraction * 100.0)
}
