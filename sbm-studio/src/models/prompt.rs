//! Song prompts and prompt document parsing
//!
//! A prompt document is a flat sequence of `<TITLE>`, `<LYRICS>` and
//! `<STYLE>` elements. The n-th title, lyrics and style form the n-th prompt.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One song to generate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prompt {
    pub title: String,
    pub lyrics: String,
    pub style: String,
}

impl Prompt {
    pub fn new(
        title: impl Into<String>,
        lyrics: impl Into<String>,
        style: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            lyrics: lyrics.into(),
            style: style.into(),
        }
    }

    /// All three fields carry non-whitespace text
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.lyrics.trim().is_empty()
            && !self.style.trim().is_empty()
    }
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<(TITLE|LYRICS|STYLE)>(.*?)</(?:TITLE|LYRICS|STYLE)>")
            .expect("prompt tag pattern is valid")
    })
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Extract every prompt from a prompt document
///
/// Empty elements are dropped before pairing, and the result is as long as
/// the shortest of the three element lists.
pub fn parse_prompt_document(text: &str) -> Vec<Prompt> {
    let mut titles = Vec::new();
    let mut lyrics = Vec::new();
    let mut styles = Vec::new();

    for caps in tag_re().captures_iter(text) {
        let (Some(tag), Some(body)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let value = unescape(body.as_str().trim());
        if value.is_empty() {
            continue;
        }
        match tag.as_str() {
            "TITLE" => titles.push(value),
            "LYRICS" => lyrics.push(value),
            _ => styles.push(value),
        }
    }

    let count = titles.len().min(lyrics.len()).min(styles.len());
    if count < titles.len().max(lyrics.len()).max(styles.len()) {
        tracing::warn!(
            titles = titles.len(),
            lyrics = lyrics.len(),
            styles = styles.len(),
            "Prompt document has unbalanced elements, truncating"
        );
    }

    titles
        .into_iter()
        .zip(lyrics)
        .zip(styles)
        .take(count)
        .map(|((title, lyrics), style)| Prompt { title, lyrics, style })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multiple_prompts() {
        let doc = r#"
<TITLE>Night Drive</TITLE>
<LYRICS>
[Verse]
Headlights &amp; rain
</LYRICS>
<STYLE>synthwave, 80s</STYLE>

<TITLE>Morning</TITLE>
<LYRICS>Sun comes up</LYRICS>
<STYLE>acoustic folk</STYLE>
"#;
        let prompts = parse_prompt_document(doc);
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].title, "Night Drive");
        assert_eq!(prompts[0].lyrics, "[Verse]\nHeadlights & rain");
        assert_eq!(prompts[1].style, "acoustic folk");
    }

    #[test]
    fn test_unbalanced_document_truncates_to_shortest() {
        let doc = "<TITLE>A</TITLE><TITLE>B</TITLE><LYRICS>la</LYRICS><STYLE>pop</STYLE><STYLE>rock</STYLE>";
        let prompts = parse_prompt_document(doc);
        assert_eq!(prompts, vec![Prompt::new("A", "la", "pop")]);
    }

    #[test]
    fn test_empty_elements_are_dropped() {
        let doc = "<TITLE> </TITLE><TITLE>Real</TITLE><LYRICS>words</LYRICS><STYLE>jazz</STYLE>";
        let prompts = parse_prompt_document(doc);
        assert_eq!(prompts, vec![Prompt::new("Real", "words", "jazz")]);
    }

    #[test]
    fn test_is_complete() {
        assert!(Prompt::new("t", "l", "s").is_complete());
        assert!(!Prompt::new("t", "", "s").is_complete());
    }
}
