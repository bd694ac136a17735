//! XPath selectors for the song creation page
//!
//! Selector drift is the most common failure; when a field stops filling,
//! check these first.

// Form mode
pub const CUSTOM_BUTTON: &str = "//button[normalize-space(.)='Custom']";

// Core fields
pub const LYRICS_TEXTAREA: &str = "//textarea[contains(@placeholder, 'Write some lyrics')]";
pub const STYLES_TEXTAREA: &str = "//textarea[contains(@placeholder, 'indie, electronic')]";
pub const TITLE_INPUT: &str = "//input[@placeholder='Song Title (Optional)']";
pub const TITLE_INPUT_BY_LABEL: &str =
    "//input[contains(@placeholder, 'Song Title') and contains(@placeholder, 'Optional')]";
pub const CREATE_BUTTON: &str = "//button[@aria-label='Create song']";

// Advanced options
pub const ADVANCED_OPTIONS_BUTTON: &str =
    "//div[@role='button']//div[contains(text(), 'Advanced Options')]";
pub const EXCLUDE_STYLES_INPUT: &str = "//input[contains(@placeholder, 'Exclude styles')]";
pub const MALE_BUTTON: &str = "//button[normalize-space(.)='Male']";
pub const FEMALE_BUTTON: &str = "//button[normalize-space(.)='Female']";
pub const MANUAL_LYRICS_BUTTON: &str = "//button[normalize-space(.)='Manual']";
pub const AUTO_LYRICS_BUTTON: &str = "//button[normalize-space(.)='Auto']";
pub const WEIRDNESS_SLIDER: &str = "//div[@role='slider' and @aria-label='Weirdness']";
pub const STYLE_INFLUENCE_SLIDER: &str =
    "//div[@role='slider' and @aria-label='Style Influence']";

// Persona picker
pub const PERSONA_BUTTON: &str = "//button[contains(., 'Persona') or contains(., 'Add Persona')]";
pub const PERSONA_MODAL_SEARCH: &str =
    "//div[contains(@class, 'chakra-modal__content')]//input[@placeholder='Search']";
pub const PERSONA_CONTAINER: &str =
    "//div[contains(@class, 'group flex w-full cursor-pointer items-center gap-4')]";
pub const CREATE_PERSONA_LABEL: &str = "Create New Persona";

/// URL fragment of a created song's page
pub const SONG_URL_MARKER: &str = "/song/";
