use serde_json::Value;

/// One generation run's sub-results as the backend reports them. Fields are
/// independent: a modality that was not requested is simply absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerateResponse {
    pub tags: Option<Vec<String>>,
    pub music: Option<MusicPayload>,
    pub images: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MusicPayload {
    #[serde(default)]
    pub audio_url: String,
    /// True when the backend acknowledged the request but the track is not
    /// rendered yet.
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub prompt_url: String,
    #[serde(default)]
    pub lyrics_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegenerateResponse {
    #[serde(default)]
    pub audio_url: String,
}

impl GenerateResponse {
    /// Parse a response body field by field. The backend has shipped both
    /// `{"tags": {"tags": [...]}}` and `{"tags": [...]}` shapes; either
    /// parses, and a malformed field coerces to empty rather than failing
    /// the whole response.
    pub fn from_value(v: &Value) -> Self {
        Self {
            tags: v.get("tags").map(|t| string_list(t, "tags")),
            music: v
                .get("music")
                .and_then(|m| serde_json::from_value(m.clone()).ok()),
            images: v.get("images").map(|i| string_list(i, "images")),
        }
    }
}

/// Accept either a bare JSON array of strings or an object wrapping one
/// under `inner_key`. Anything else yields an empty list.
fn string_list(v: &Value, inner_key: &str) -> Vec<String> {
    let candidate = match v.as_object() {
        Some(obj) => obj.get(inner_key).unwrap_or(&Value::Null),
        None => v,
    };
    candidate
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Path of a run's generation prompt under the backend's output tree.
pub fn prompt_path(folder: &str) -> String {
    format!("output/{folder}/prompt.txt")
}

/// Path of a run's lyrics file under the backend's output tree.
pub fn lyrics_path(folder: &str) -> String {
    format!("output/{folder}/lyrics.lrc")
}
