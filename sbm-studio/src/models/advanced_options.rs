//! Optional per-song form settings applied after the core fields

use serde::{Deserialize, Serialize};

/// Slider value that leaves a slider untouched
pub const NEUTRAL_SLIDER: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VocalGender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LyricsMode {
    Manual,
    Auto,
}

/// Advanced options; ignored entirely unless `enabled`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedOptions {
    pub enabled: bool,
    pub exclude_styles: String,
    pub vocal_gender: Option<VocalGender>,
    pub lyrics_mode: Option<LyricsMode>,
    /// 0-100
    pub weirdness: u8,
    /// 0-100
    pub style_influence: u8,
    pub persona_name: String,
}

impl Default for AdvancedOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            exclude_styles: String::new(),
            vocal_gender: None,
            lyrics_mode: None,
            weirdness: NEUTRAL_SLIDER,
            style_influence: NEUTRAL_SLIDER,
            persona_name: String::new(),
        }
    }
}

impl AdvancedOptions {
    /// Clamp slider values into 0-100
    pub fn sanitized(mut self) -> Self {
        self.weirdness = self.weirdness.min(100);
        self.style_influence = self.style_influence.min(100);
        self
    }
}
