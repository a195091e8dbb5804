use image::RgbaImage;
use kurbo::Point;

use crate::error::{InkwaveError, InkwaveResult};

/// A text overlay captured from the editing surface with its style already
/// resolved. Positions are artboard pixel coordinates, top-left anchored.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TextBox {
    pub origin: Point,
    pub text: String,
    pub style: TextStyle,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TextStyle {
    pub size_px: f32,
    pub family: String,
    /// Straight (non-premultiplied) RGBA.
    pub color: [u8; 4],
}

impl TextStyle {
    pub fn validate(&self) -> InkwaveResult<()> {
        if !self.size_px.is_finite() || self.size_px <= 0.0 {
            return Err(InkwaveError::validation("text size_px must be > 0"));
        }
        if self.family.trim().is_empty() {
            return Err(InkwaveError::validation("text family must be non-empty"));
        }
        Ok(())
    }
}

/// The user-editable drawing surface: an immutable background raster, a
/// mutable ink raster drawn over it, ordered text boxes, and an optional
/// waveform strip rendered from user-supplied audio.
#[derive(Clone)]
pub struct Artboard {
    pub background: RgbaImage,
    pub ink: RgbaImage,
    pub text_boxes: Vec<TextBox>,
    pub wave_strip: Option<RgbaImage>,
    /// True only when the user actually supplied audio input; a strip
    /// raster without user audio is ignored at flatten time.
    pub has_user_audio: bool,
}

impl Artboard {
    pub fn new(background: RgbaImage) -> InkwaveResult<Self> {
        let (w, h) = (background.width(), background.height());
        if w == 0 || h == 0 {
            return Err(InkwaveError::validation(
                "artboard background must be non-empty",
            ));
        }
        Ok(Self {
            background,
            ink: RgbaImage::new(w, h),
            text_boxes: Vec::new(),
            wave_strip: None,
            has_user_audio: false,
        })
    }

    pub fn width(&self) -> u32 {
        self.background.width()
    }

    pub fn height(&self) -> u32 {
        self.background.height()
    }

    pub fn validate(&self) -> InkwaveResult<()> {
        if self.width() == 0 || self.height() == 0 {
            return Err(InkwaveError::validation(
                "artboard background must be non-empty",
            ));
        }
        if self.ink.dimensions() != self.background.dimensions() {
            return Err(InkwaveError::validation(format!(
                "ink layer is {}x{} but background is {}x{}",
                self.ink.width(),
                self.ink.height(),
                self.width(),
                self.height()
            )));
        }
        if let Some(strip) = &self.wave_strip {
            if strip.width() != self.width() {
                return Err(InkwaveError::validation(format!(
                    "wave strip width {} does not match artboard width {}",
                    strip.width(),
                    self.width()
                )));
            }
            if strip.height() == 0 {
                return Err(InkwaveError::validation("wave strip must be non-empty"));
            }
        }
        for tb in &self.text_boxes {
            tb.style.validate()?;
        }
        Ok(())
    }

    /// Capture the editing state for later restoration. In-memory only —
    /// not durable across restarts.
    pub fn snapshot(&self) -> ArtboardSnapshot {
        ArtboardSnapshot {
            inner: self.clone(),
        }
    }
}

/// Opaque snapshot of an [`Artboard`], held by the session so the user can
/// return from the results view and keep editing where they left off.
#[derive(Clone)]
pub struct ArtboardSnapshot {
    inner: Artboard,
}

impl ArtboardSnapshot {
    pub fn restore(self) -> Artboard {
        self.inner
    }
}

impl std::fmt::Debug for ArtboardSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtboardSnapshot")
            .field("width", &self.inner.width())
            .field("height", &self.inner.height())
            .field("text_boxes", &self.inner.text_boxes.len())
            .finish()
    }
}
