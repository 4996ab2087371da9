//! NFT metadata document.

use molt_types::time::iso_date;
use molt_types::{Agent, ContentId};
use serde::{Deserialize, Serialize};

/// Mood label used when the agent gave none.
const UNDEFINED_MOOD: &str = "Undefined";

/// ERC-721 style metadata published next to the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub name: String,
    pub description: String,
    /// `ipfs://` URI of the image.
    pub image: String,
    pub external_url: String,
    pub attributes: Vec<Attribute>,
    pub properties: MetadataProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: serde_json::Value,
}

impl Attribute {
    fn new(trait_type: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            trait_type: trait_type.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataProperties {
    pub agent_handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_prompt: Option<String>,
}

impl MetadataDocument {
    /// Build the document for the agent's next mint.
    ///
    /// `day` is the agent's `total_mints + 1`; `minted_at` only feeds the
    /// `Minted` date attribute.
    pub fn for_mint(
        agent: &Agent,
        mood: Option<&str>,
        image: &ContentId,
        prompt: Option<&str>,
        external_url_base: &str,
        minted_at: u64,
    ) -> Self {
        let display = agent.display_name.as_str();
        let mood = mood
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(UNDEFINED_MOOD);
        let day = agent.next_day_number();

        Self {
            name: format!("Daily Molt #{day} by {display}"),
            description: format!("Daily mood PFP by AI agent {display}. Mood: {mood}"),
            image: image.uri(),
            external_url: format!(
                "{}/agent/{}",
                external_url_base.trim_end_matches('/'),
                agent.handle
            ),
            attributes: vec![
                Attribute::new("Agent", display),
                Attribute::new("Mood", mood),
                Attribute::new("Day", day),
                Attribute::new("Minted", iso_date(minted_at)),
            ],
            properties: MetadataProperties {
                agent_handle: agent.handle.clone(),
                generation_prompt: prompt.map(str::to_string),
            },
        }
    }

    /// Name used when pinning, e.g. `molty-day-3.json`.
    pub fn pin_name(&self) -> String {
        let day = self
            .attributes
            .iter()
            .find(|a| a.trait_type == "Day")
            .map(|a| a.value.to_string())
            .unwrap_or_else(|| "0".into());
        format!("{}-day-{day}.json", self.properties.agent_handle)
    }
}

/// File name for an uploaded image.
pub fn image_file_name(handle: &str, now: u64) -> String {
    format!("molt-{handle}-{now}.png")
}
