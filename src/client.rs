use std::future::Future;

use reqwest::Url;
use reqwest::header::CACHE_CONTROL;
use reqwest::multipart::{Form, Part};

use crate::error::{InkwaveError, InkwaveResult};
use crate::protocol::{GenerateResponse, RegenerateResponse};

/// What the polling subsystem needs from the backend: readiness probes and
/// text artifact fetches. [`StudioClient`] is the production impl; tests
/// substitute an in-memory fake.
pub trait ArtifactSource: Send + Sync + 'static {
    /// One cache-bypassing readiness check. Transport errors count as "not
    /// ready".
    fn probe(&self, url: &str) -> impl Future<Output = bool> + Send;

    /// Fetch a plain-text artifact; `None` until it exists.
    fn fetch_text(&self, url: &str) -> impl Future<Output = Option<String>> + Send;

    /// Resolve a backend-relative path to an absolute locator.
    fn resolve(&self, path: &str) -> String;
}

/// Typed wrapper over the backend HTTP contract. All relative locators the
/// backend returns are resolved against `base` before they leave this type.
#[derive(Clone, Debug)]
pub struct StudioClient {
    http: reqwest::Client,
    base: Url,
}

impl StudioClient {
    pub fn new(base: impl AsRef<str>) -> InkwaveResult<Self> {
        let base = Url::parse(base.as_ref())
            .map_err(|e| InkwaveError::validation(format!("invalid backend base url: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    /// Resolve `path` against the backend base. Already-absolute locators
    /// pass through; unresolvable ones are returned untouched.
    pub fn with_base(&self, path: &str) -> String {
        if path.is_empty() {
            return String::new();
        }
        self.base
            .join(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| path.to_string())
    }

    /// `POST /generate` with the flattened artboard. The response is parsed
    /// defensively and every locator in it is resolved against the base.
    #[tracing::instrument(skip(self, image_jpeg), fields(bytes = image_jpeg.len()))]
    pub async fn generate(
        &self,
        image_jpeg: Vec<u8>,
        modes: &str,
        language: &str,
    ) -> InkwaveResult<GenerateResponse> {
        let url = self
            .base
            .join("generate")
            .map_err(|e| InkwaveError::backend(e.to_string()))?;
        let part = Part::bytes(image_jpeg)
            .file_name("canvas.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new().part("file", part);

        let value: serde_json::Value = self
            .http
            .post(url)
            .query(&[("modes", modes), ("language", language)])
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;

        let mut resp = GenerateResponse::from_value(&value);
        if let Some(music) = &mut resp.music {
            music.audio_url = self.with_base(&music.audio_url);
            music.prompt_url = self.with_base(&music.prompt_url);
            music.lyrics_url = self.with_base(&music.lyrics_url);
        }
        if let Some(images) = &mut resp.images {
            for img in images.iter_mut() {
                *img = self.with_base(img);
            }
        }
        Ok(resp)
    }

    /// `POST /regenerate` with the run folder and the (possibly user-edited)
    /// prompt and lyrics.
    #[tracing::instrument(skip(self, prompt, lyrics))]
    pub async fn regenerate(
        &self,
        folder: &str,
        prompt: &str,
        lyrics: &str,
    ) -> InkwaveResult<RegenerateResponse> {
        let url = self
            .base
            .join("regenerate")
            .map_err(|e| InkwaveError::backend(e.to_string()))?;
        let form = Form::new()
            .text("folder", folder.to_string())
            .text("prompt", prompt.to_string())
            .text("lyrics", lyrics.to_string());

        let mut resp: RegenerateResponse = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        resp.audio_url = self.with_base(&resp.audio_url);
        Ok(resp)
    }

    /// Download the finished track's bytes (for the save-audio action).
    pub async fn download_audio(&self, url: &str) -> InkwaveResult<Vec<u8>> {
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(InkwaveError::backend(format!(
                "audio download returned {}",
                resp.status()
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

impl ArtifactSource for StudioClient {
    fn probe(&self, url: &str) -> impl Future<Output = bool> + Send {
        let req = self.http.get(url).header(CACHE_CONTROL, "no-store");
        async move {
            match req.send().await {
                Ok(resp) => resp.status().is_success(),
                Err(err) => {
                    tracing::debug!(%err, "probe failed, treating as not ready");
                    false
                }
            }
        }
    }

    fn fetch_text(&self, url: &str) -> impl Future<Output = Option<String>> + Send {
        let req = self.http.get(url).header(CACHE_CONTROL, "no-store");
        async move {
            match req.send().await {
                Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
                Ok(_) => None,
                Err(err) => {
                    tracing::debug!(%err, "text fetch failed, treating as not ready");
                    None
                }
            }
        }
    }

    fn resolve(&self, path: &str) -> String {
        self.with_base(path)
    }
}
