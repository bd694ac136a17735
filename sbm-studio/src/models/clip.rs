//! Remote clips, clip pages and account info as returned by the studio API

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One remote song clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongClip {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Human-readable duration as the API formats it (e.g. `3:12`)
    #[serde(default)]
    pub duration: Option<String>,
}

/// Clip as the API sends it
#[derive(Debug, Deserialize)]
struct RawClip {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    image_large_url: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    duration_formatted: Option<Value>,
}

impl From<RawClip> for SongClip {
    fn from(raw: RawClip) -> Self {
        let duration = raw.metadata.duration_formatted.and_then(|v| match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        Self {
            id: raw.id,
            title: raw
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            audio_url: raw.audio_url.filter(|u| !u.is_empty()),
            image_url: raw
                .image_url
                .filter(|u| !u.is_empty())
                .or(raw.image_large_url.filter(|u| !u.is_empty())),
            tags: raw.metadata.tags.unwrap_or_default(),
            created_at: raw.created_at,
            duration,
        }
    }
}

impl SongClip {
    /// Build from one API clip object; `None` if it carries no id
    pub fn from_api_value(value: &Value) -> Option<Self> {
        let raw: RawClip = serde_json::from_value(value.clone()).ok()?;
        if raw.id.is_empty() {
            return None;
        }
        Some(raw.into())
    }

    /// Parse the `clips` array of a page response, skipping unusable entries
    pub fn list_from_page(body: &Value) -> Vec<Self> {
        body.get("clips")
            .and_then(Value::as_array)
            .map(|clips| clips.iter().filter_map(Self::from_api_value).collect())
            .unwrap_or_default()
    }
}

/// One page of a paginated clip collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipPage {
    pub page: u32,
    pub clips: Vec<SongClip>,
    /// A non-empty page implies more may follow
    pub has_more: bool,
}

impl ClipPage {
    pub fn new(page: u32, clips: Vec<SongClip>) -> Self {
        let has_more = !clips.is_empty();
        Self {
            page,
            clips,
            has_more,
        }
    }
}

/// Current account summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub email: String,
    pub credits: i64,
}

impl UserInfo {
    pub fn from_billing_info(body: &Value) -> Self {
        Self {
            username: body
                .get("display_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            email: body
                .get("email")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            credits: body
                .get("total_credits_left")
                .and_then(Value::as_i64)
                .unwrap_or(0),
        }
    }
}
