//! Voice selection for speech output.
//!
//! The host synthesizer exposes an inventory of voices. Selection is
//! best-effort: detect the utterance language from its text, then walk a
//! preference ladder over the inventory. No match means the utterance is
//! handed to the host engine without an explicit voice.

use serde::{Deserialize, Serialize};

/// Name fragment identifying the preferred voice provider
const PREFERRED_PROVIDER: &str = "Google";
/// Name fragment identifying the preferred voice gender
const PREFERRED_GENDER: &str = "Female";

/// One voice advertised by the host synthesizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Engine-assigned display name, e.g. "Google US English Female"
    pub name: String,
    /// BCP-47 language tag, e.g. "en-US"
    pub language: String,
}

impl VoiceInfo {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
        }
    }
}

/// Spoken language of an utterance, as far as output voice choice cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpokenLanguage {
    English,
    Mandarin,
}

impl SpokenLanguage {
    /// Parse a recognition language tag, rejecting unsupported ones
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "en-US" => Some(SpokenLanguage::English),
            "zh-CN" => Some(SpokenLanguage::Mandarin),
            _ => None,
        }
    }

    /// Full tag attached to the utterance
    pub fn tag(&self) -> &'static str {
        match self {
            SpokenLanguage::English => "en-US",
            SpokenLanguage::Mandarin => "zh-CN",
        }
    }

    /// Primary subtag used to match against voice inventory tags
    pub fn primary_subtag(&self) -> &'static str {
        match self {
            SpokenLanguage::English => "en",
            SpokenLanguage::Mandarin => "zh",
        }
    }
}

/// Detect the utterance language from its text.
///
/// Any CJK unified ideograph (U+4E00..=U+9FFF) marks the text as Mandarin;
/// everything else speaks in the default English voice.
pub fn detect_language(text: &str) -> SpokenLanguage {
    if text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c)) {
        SpokenLanguage::Mandarin
    } else {
        SpokenLanguage::English
    }
}

/// Walk the preference ladder over the voice inventory, first match wins:
/// provider and gender tag, then provider tag, then any voice whose tag
/// starts with the language's primary subtag.
pub fn pick_voice(voices: &[VoiceInfo], language: SpokenLanguage) -> Option<&VoiceInfo> {
    let primary = language.primary_subtag();
    voices
        .iter()
        .find(|v| {
            v.language.starts_with(primary)
                && v.name.contains(PREFERRED_PROVIDER)
                && v.name.contains(PREFERRED_GENDER)
        })
        .or_else(|| {
            voices
                .iter()
                .find(|v| v.language.starts_with(primary) && v.name.contains(PREFERRED_PROVIDER))
        })
        .or_else(|| voices.iter().find(|v| v.language.starts_with(primary)))
}
