//! Song form filling on the creation page
//!
//! Lyrics and style are required; failing either fails the tab. The title
//! tries two selectors and then a native value setter script, and is skipped
//! with a warning if all three fail. Advanced options never fail the tab.

use super::driver::{AutomationDriver, AutomationError, ElementRef};
use super::selectors;
use crate::models::advanced_options::NEUTRAL_SLIDER;
use crate::models::{AdvancedOptions, LyricsMode, Prompt, VocalGender};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sets a visible title input through the native value setter so
/// framework-controlled inputs see the change
const SET_TITLE_SCRIPT: &str = r#"
const els = Array.from(document.querySelectorAll('input[placeholder="Song Title (Optional)"]'));
const el = els.find(e => e && e.offsetParent !== null && getComputedStyle(e).visibility !== 'hidden');
if (!el) return { ok: false, reason: 'not-found-visible' };
el.scrollIntoView({ block: 'center' });
el.focus();
const setter = Object.getOwnPropertyDescriptor(window.HTMLInputElement.prototype, 'value').set;
setter.call(el, '');
el.dispatchEvent(new Event('input', { bubbles: true }));
setter.call(el, arguments[0]);
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
return { ok: el.value === arguments[0], value: el.value };
"#;

const SCROLL_INTO_VIEW_SCRIPT: &str = "arguments[0].scrollIntoView({block: 'center'});";
const SCROLL_TOP_SCRIPT: &str = "window.scrollTo(0, 0);";

/// Short waits for the secondary fields
const TITLE_WAIT: Duration = Duration::from_secs(3);
const TITLE_FALLBACK_WAIT: Duration = Duration::from_secs(2);
const OPTION_WAIT: Duration = Duration::from_secs(2);

/// Fills one tab's creation form
pub struct SongFormFiller<'a> {
    driver: &'a dyn AutomationDriver,
    element_wait: Duration,
    pause: Duration,
    tab_index: usize,
}

impl<'a> SongFormFiller<'a> {
    pub fn new(driver: &'a dyn AutomationDriver, element_wait: Duration, tab_index: usize) -> Self {
        Self {
            driver,
            element_wait,
            pause: Duration::from_millis(500),
            tab_index,
        }
    }

    /// Pause between UI steps (zero in tests)
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    async fn settle(&self) {
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
    }

    async fn scroll_into_view(&self, element: &ElementRef) {
        if let Err(e) = self
            .driver
            .execute_script(SCROLL_INTO_VIEW_SCRIPT, vec![element.to_script_arg()])
            .await
        {
            debug!(tab = self.tab_index, error = %e, "scrollIntoView failed");
        }
    }

    /// Switch to custom mode when the lyrics box is not on the page
    async fn ensure_custom_mode(&self) -> Result<(), AutomationError> {
        if !self.driver.find_elements(selectors::LYRICS_TEXTAREA).await?.is_empty() {
            return Ok(());
        }
        let custom = self
            .driver
            .find_element(selectors::CUSTOM_BUTTON, self.element_wait)
            .await?;
        self.driver.click(&custom).await?;
        debug!(tab = self.tab_index, "Switched to custom mode");
        self.settle().await;
        Ok(())
    }

    async fn fill_required(&self, xpath: &str, value: &str) -> Result<(), AutomationError> {
        let field = self.driver.find_element(xpath, self.element_wait).await?;
        self.driver.click(&field).await?;
        self.driver.set_text(&field, value).await
    }

    async fn fill_title(&self, title: &str) -> bool {
        for (xpath, wait) in [
            (selectors::TITLE_INPUT, TITLE_WAIT),
            (selectors::TITLE_INPUT_BY_LABEL, TITLE_FALLBACK_WAIT),
        ] {
            let Ok(field) = self.driver.find_element(xpath, wait).await else {
                continue;
            };
            if self.driver.click(&field).await.is_ok()
                && self.driver.set_text(&field, title).await.is_ok()
            {
                return true;
            }
        }

        match self
            .driver
            .execute_script(SET_TITLE_SCRIPT, vec![Value::String(title.to_string())])
            .await
        {
            Ok(result) if result.get("ok").and_then(Value::as_bool) == Some(true) => {
                info!(tab = self.tab_index, title = %title, "Title set through script fallback");
                true
            }
            Ok(result) => {
                warn!(tab = self.tab_index, result = %result, "Title script fallback failed");
                false
            }
            Err(e) => {
                warn!(tab = self.tab_index, error = %e, "Title script fallback errored");
                false
            }
        }
    }

    /// Fill lyrics, style and title, then the advanced options if enabled
    pub async fn fill_form(&self, prompt: &Prompt, options: &AdvancedOptions) -> Result<(), AutomationError> {
        self.ensure_custom_mode().await?;

        self.fill_required(selectors::LYRICS_TEXTAREA, &prompt.lyrics)
            .await
            .inspect_err(|e| warn!(tab = self.tab_index, title = %prompt.title, error = %e, "Lyrics fill failed"))?;
        self.fill_required(selectors::STYLES_TEXTAREA, &prompt.style)
            .await
            .inspect_err(|e| warn!(tab = self.tab_index, title = %prompt.title, error = %e, "Style fill failed"))?;

        if !self.fill_title(&prompt.title).await {
            warn!(tab = self.tab_index, title = %prompt.title, "Title input not found, skipping");
        }

        if options.enabled {
            let failed = self.apply_advanced_options(options).await;
            if !failed.is_empty() {
                warn!(tab = self.tab_index, skipped = ?failed, "Some advanced options were not applied");
            }
        }

        info!(tab = self.tab_index, title = %prompt.title, "Form filled");
        Ok(())
    }

    /// Apply every requested advanced option; returns the names that failed
    pub async fn apply_advanced_options(&self, options: &AdvancedOptions) -> Vec<&'static str> {
        let options = options.clone().sanitized();
        let mut failed = Vec::new();

        match self
            .driver
            .find_element(selectors::ADVANCED_OPTIONS_BUTTON, self.element_wait)
            .await
        {
            Ok(button) => {
                self.scroll_into_view(&button).await;
                if let Err(e) = self.driver.click(&button).await {
                    warn!(tab = self.tab_index, error = %e, "Cannot open advanced options");
                    failed.push("advanced_options");
                    return failed;
                }
                self.settle().await;
            }
            Err(e) => {
                warn!(tab = self.tab_index, error = %e, "Advanced options button not found");
                failed.push("advanced_options");
                return failed;
            }
        }

        if !options.exclude_styles.trim().is_empty() {
            if let Err(e) = self
                .fill_option_text(selectors::EXCLUDE_STYLES_INPUT, &options.exclude_styles)
                .await
            {
                warn!(tab = self.tab_index, error = %e, "Exclude styles not set");
                failed.push("exclude_styles");
            }
        }

        if let Some(gender) = options.vocal_gender {
            let xpath = match gender {
                VocalGender::Male => selectors::MALE_BUTTON,
                VocalGender::Female => selectors::FEMALE_BUTTON,
            };
            if let Err(e) = self.click_option(xpath).await {
                warn!(tab = self.tab_index, gender = ?gender, error = %e, "Vocal gender not set");
                failed.push("vocal_gender");
            }
        }

        if let Some(mode) = options.lyrics_mode {
            let xpath = match mode {
                LyricsMode::Manual => selectors::MANUAL_LYRICS_BUTTON,
                LyricsMode::Auto => selectors::AUTO_LYRICS_BUTTON,
            };
            if let Err(e) = self.click_option(xpath).await {
                warn!(tab = self.tab_index, mode = ?mode, error = %e, "Lyrics mode not set");
                failed.push("lyrics_mode");
            }
        }

        for (name, xpath, value) in [
            ("weirdness", selectors::WEIRDNESS_SLIDER, options.weirdness),
            ("style_influence", selectors::STYLE_INFLUENCE_SLIDER, options.style_influence),
        ] {
            if value == NEUTRAL_SLIDER {
                continue;
            }
            if let Err(e) = self.set_slider(xpath, value).await {
                warn!(tab = self.tab_index, slider = name, error = %e, "Slider not set");
                failed.push(name);
            }
        }

        if !options.persona_name.trim().is_empty() {
            if let Err(e) = self.select_persona(options.persona_name.trim()).await {
                warn!(tab = self.tab_index, persona = %options.persona_name, error = %e, "Persona not selected");
                failed.push("persona");
            }
        }

        failed
    }

    async fn fill_option_text(&self, xpath: &str, value: &str) -> Result<(), AutomationError> {
        let field = self.driver.find_element(xpath, OPTION_WAIT).await?;
        self.driver.set_text(&field, value).await
    }

    async fn click_option(&self, xpath: &str) -> Result<(), AutomationError> {
        let button = self.driver.find_element(xpath, OPTION_WAIT).await?;
        self.driver.click(&button).await?;
        self.settle().await;
        Ok(())
    }

    /// Drag an ARIA slider from its current value to `target`
    async fn set_slider(&self, xpath: &str, target: u8) -> Result<(), AutomationError> {
        let slider = self.driver.find_element(xpath, OPTION_WAIT).await?;
        let current = self.numeric_attribute(&slider, "aria-valuenow").await?;
        let min = self.numeric_attribute(&slider, "aria-valuemin").await?;
        let max = self.numeric_attribute(&slider, "aria-valuemax").await?;
        let width = self.driver.rect(&slider).await?.width;

        let Some(offset) = slider_offset(current, min, max, f64::from(target), width) else {
            debug!(tab = self.tab_index, target, "Slider already at target");
            return Ok(());
        };
        self.driver.drag_by(&slider, offset).await
    }

    async fn numeric_attribute(&self, element: &ElementRef, name: &str) -> Result<f64, AutomationError> {
        self.driver
            .attribute(element, name)
            .await?
            .and_then(|v| v.trim().parse::<f64>().ok())
            .ok_or_else(|| AutomationError::Protocol(format!("slider has no numeric {}", name)))
    }

    /// Open the persona picker, search, and click the closest entry
    async fn select_persona(&self, name: &str) -> Result<(), AutomationError> {
        self.driver.execute_script(SCROLL_TOP_SCRIPT, Vec::new()).await?;
        self.settle().await;

        let button = self
            .driver
            .find_element(selectors::PERSONA_BUTTON, self.element_wait)
            .await?;
        self.driver.click(&button).await?;
        self.settle().await;

        let search = self
            .driver
            .find_element(selectors::PERSONA_MODAL_SEARCH, self.element_wait)
            .await?;
        self.driver.click(&search).await?;
        self.driver.set_text(&search, &name.to_lowercase()).await?;
        self.settle().await;

        let entries = self.driver.find_elements(selectors::PERSONA_CONTAINER).await?;
        let mut candidates = Vec::with_capacity(entries.len());
        for entry in entries {
            let text = self.driver.text(&entry).await.unwrap_or_default();
            if text.contains(selectors::CREATE_PERSONA_LABEL) {
                continue;
            }
            candidates.push((entry, text));
        }

        let texts: Vec<&str> = candidates.iter().map(|(_, t)| t.as_str()).collect();
        let best = best_persona_match(name, &texts)
            .ok_or_else(|| AutomationError::ElementNotFound(format!("persona '{}'", name)))?;
        let (entry, text) = &candidates[best];

        self.scroll_into_view(entry).await;
        self.driver.click(entry).await?;
        info!(tab = self.tab_index, persona = %name, matched = %text.lines().next().unwrap_or_default(), "Persona selected");
        Ok(())
    }

    /// Click create and wait for the song page URL; returns the song id
    pub async fn submit(&self, timeout: Duration) -> Result<String, AutomationError> {
        let create = self
            .driver
            .find_element(selectors::CREATE_BUTTON, self.element_wait)
            .await?;
        self.driver.click(&create).await?;

        let deadline = Instant::now() + timeout;
        loop {
            let url = self.driver.current_url().await?;
            if let Some(id) = song_id_from_url(&url) {
                return Ok(id);
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::Timeout(format!(
                    "no song URL after {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(Duration::from_millis(500).min(timeout)).await;
        }
    }
}

/// Horizontal pixel offset moving a slider from `current` to `target`
///
/// `None` when no move is needed or the slider range is degenerate.
pub fn slider_offset(current: f64, min: f64, max: f64, target: f64, width: f64) -> Option<i64> {
    if max <= min || (current - target).abs() < f64::EPSILON {
        return None;
    }
    let offset = ((target - current) / (max - min) * width).round() as i64;
    (offset != 0).then_some(offset)
}

/// Index of the entry most similar to `wanted`; ties keep the first
pub fn best_persona_match(wanted: &str, entries: &[&str]) -> Option<usize> {
    let wanted = wanted.trim().to_lowercase();
    let mut best: Option<(usize, f64)> = None;
    for (idx, entry) in entries.iter().enumerate() {
        let label = entry.lines().next().unwrap_or_default().trim().to_lowercase();
        let score = strsim::normalized_levenshtein(&wanted, &label);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((idx, score));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Song id from a `.../song/<id>` URL
pub fn song_id_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once(selectors::SONG_URL_MARKER)?;
    let id = rest
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    (!id.is_empty()).then(|| id.to_string())
}

/// Random pause in `[min_ms, max_ms]`
pub fn random_delay(min_ms: u64, max_ms: u64) -> Duration {
    use rand::Rng;
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_id_from_url() {
        assert_eq!(
            song_id_from_url("https://suno.com/song/abc-123").as_deref(),
            Some("abc-123")
        );
        assert_eq!(
            song_id_from_url("https://suno.com/song/abc-123/?sh=1").as_deref(),
            Some("abc-123")
        );
        assert_eq!(song_id_from_url("https://suno.com/create"), None);
        assert_eq!(song_id_from_url("https://suno.com/song/"), None);
    }

    #[test]
    fn test_slider_offset() {
        assert_eq!(slider_offset(50.0, 0.0, 100.0, 75.0, 200.0), Some(50));
        assert_eq!(slider_offset(50.0, 0.0, 100.0, 0.0, 200.0), Some(-100));
        assert_eq!(slider_offset(30.0, 0.0, 100.0, 30.0, 200.0), None);
        assert_eq!(slider_offset(30.0, 10.0, 10.0, 50.0, 200.0), None);
    }

    #[test]
    fn test_best_persona_match() {
        let entries = ["Midnight Crooner\n12 songs", "Mid Crew", "Sunny"];
        assert_eq!(best_persona_match("midnight crooner", &entries), Some(0));
        assert_eq!(best_persona_match("Sunny", &entries), Some(2));
        assert_eq!(best_persona_match("x", &[]), None);
    }

    #[test]
    fn test_best_persona_match_ties_keep_first() {
        assert_eq!(best_persona_match("abc", &["abd", "abe"]), Some(0));
    }

    #[test]
    fn test_random_delay_bounds() {
        for _ in 0..20 {
            let d = random_delay(10, 20);
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(random_delay(5, 5), Duration::from_millis(5));
    }
}
