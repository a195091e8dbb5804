use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbaImage};
use kurbo::Point;

use crate::artboard::{Artboard, ArtboardSnapshot};
use crate::error::{InkwaveError, InkwaveResult};
use crate::text::{FontStore, draw_text};

/// Quality used for the backend submission encode.
pub const SUBMISSION_JPEG_QUALITY: u8 = 92;

/// Output of [`flatten`]: one raster for the backend, one for the screen,
/// plus the editing snapshot captured alongside them.
pub struct FlattenedArt {
    /// Lossy JPEG of the full artboard, waveform strip included when user
    /// audio is present. This is what goes to the backend.
    pub submission_jpeg: Vec<u8>,
    /// Lossless PNG of the main artboard only — never the waveform strip.
    pub preview_png: Vec<u8>,
    pub snapshot: ArtboardSnapshot,
}

/// Source-over for straight (non-premultiplied) RGBA8.
pub fn over_straight(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    let sa = u32::from(src[3]);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }
    let da = u32::from(dst[3]);
    let out_a_255 = sa * 255 + da * (255 - sa);
    if out_a_255 == 0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let sc = u32::from(src[i]);
        let dc = u32::from(dst[i]);
        let num = sc * sa * 255 + dc * da * (255 - sa);
        out[i] = ((num + out_a_255 / 2) / out_a_255) as u8;
    }
    out[3] = ((out_a_255 + 127) / 255) as u8;
    out
}

/// Blend `src` over `dst` at offset `(ox, oy)`, clipped to `dst`.
fn blit_over(dst: &mut RgbaImage, src: &RgbaImage, ox: u32, oy: u32) {
    let (dw, dh) = dst.dimensions();
    for (x, y, px) in src.enumerate_pixels() {
        let (tx, ty) = (ox + x, oy + y);
        if tx >= dw || ty >= dh {
            continue;
        }
        let d = dst.get_pixel_mut(tx, ty);
        d.0 = over_straight(d.0, px.0);
    }
}

/// Paint background, ink, then text boxes in document order. The text
/// em-box top sits one font-size unit below the box's captured top edge,
/// matching how the editing surface positions its overlays.
fn paint_main(art: &Artboard, fonts: &FontStore) -> InkwaveResult<RgbaImage> {
    let mut out = art.background.clone();
    blit_over(&mut out, &art.ink, 0, 0);

    for tb in &art.text_boxes {
        let font = fonts.resolve(&tb.style.family)?;
        let top = Point::new(
            tb.origin.x,
            tb.origin.y + f64::from(tb.style.size_px),
        );
        draw_text(&mut out, font, &tb.text, tb.style.size_px, top, tb.style.color);
    }
    Ok(out)
}

/// Flatten the artboard into its two raster outputs and capture a snapshot.
///
/// Fails fast on a malformed artboard (empty background, mismatched layer
/// dimensions, unresolvable fonts) rather than emitting a blank image.
#[tracing::instrument(skip(art, fonts))]
pub fn flatten(art: &Artboard, fonts: &FontStore) -> InkwaveResult<FlattenedArt> {
    art.validate()?;

    let main = paint_main(art, fonts)?;
    let (w, h) = main.dimensions();

    let strip = match (&art.wave_strip, art.has_user_audio) {
        (Some(strip), true) => Some(strip),
        _ => None,
    };

    let full = match strip {
        Some(strip) => {
            let mut full = RgbaImage::new(w, h + strip.height());
            blit_over(&mut full, &main, 0, 0);
            blit_over(&mut full, strip, 0, h);
            full
        }
        None => main.clone(),
    };

    tracing::debug!(
        width = w,
        main_height = h,
        full_height = full.height(),
        text_boxes = art.text_boxes.len(),
        "flattened artboard"
    );

    Ok(FlattenedArt {
        submission_jpeg: encode_jpeg(&full, SUBMISSION_JPEG_QUALITY)?,
        preview_png: encode_png(&main)?,
        snapshot: art.snapshot(),
    })
}

fn encode_jpeg(img: &RgbaImage, quality: u8) -> InkwaveResult<Vec<u8>> {
    let rgb = image::DynamicImage::ImageRgba8(img.clone()).to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(|e| InkwaveError::compose(format!("jpeg encode failed: {e}")))?;
    Ok(buf)
}

fn encode_png(img: &RgbaImage) -> InkwaveResult<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| InkwaveError::compose(format!("png encode failed: {e}")))?;
    Ok(buf)
}
