//! Prompt construction.

use serde::{Deserialize, Serialize};

/// Opening sentence of every prompt.
const BASE_SENTENCE: &str =
    "A stylized digital avatar/profile picture representing an AI agent's current state.";

/// Style used when the agent does not pick one.
pub const DEFAULT_STYLE: &str = "Digital art style, vibrant colors, abstract elements, \
     futuristic, square format, centered composition.";

/// What the agent wants its image to express.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePrompt {
    pub mood: String,
    pub context: Option<String>,
    pub style: Option<String>,
}

impl ImagePrompt {
    pub fn new(mood: impl Into<String>) -> Self {
        Self {
            mood: mood.into(),
            context: None,
            style: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Full prompt text, falling back to `default_style` when no style is set.
    pub fn render_with_default(&self, default_style: &str) -> String {
        let mut text = format!("{BASE_SENTENCE} The mood is: {}.", self.mood.trim());
        if let Some(context) = self.context.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            text.push_str(&format!(" Context: {context}."));
        }
        let style = self
            .style
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(default_style);
        text.push(' ');
        text.push_str(style);
        text
    }

    /// Full prompt text with [`DEFAULT_STYLE`].
    pub fn render(&self) -> String {
        self.render_with_default(DEFAULT_STYLE)
    }
}
