// Image codec adapter
//
// Converts uploaded files into transport-ready payloads and composites
// free-hand mask strokes onto a base image. Stateless; raster work runs
// under spawn_blocking so it never stalls the async runtime.

use image::{GenericImageView, ImageFormat, Rgba};
use std::io::Cursor;
use tracing::{debug, warn};

use crate::core::errors::{CodecError, CodecResult};
use crate::core::types::{ImagePayload, MaskStroke, SourceImage};

/// Fixed marker color used for every mask stroke. The prompt tells the model
/// to scope edits to regions painted in this color.
pub const MARKER_COLOR: Rgba<u8> = Rgba([255, 0, 122, 255]);

/// Validate an uploaded file and wrap it as a transport payload.
///
/// This is a lossless passthrough: bytes are kept exactly as uploaded, only
/// the claimed media type is checked. Non-image entries are rejected with
/// `UnsupportedMedia` so the caller can filter them before job creation.
pub fn encode(filename: &str, bytes: Vec<u8>, media_type: &str) -> CodecResult<SourceImage> {
    if !media_type.starts_with("image/") {
        return Err(CodecError::UnsupportedMedia(media_type.to_string()));
    }
    Ok(SourceImage {
        filename: filename.to_string(),
        payload: ImagePayload::new(bytes, media_type),
    })
}

/// Encode a batch of uploaded `(filename, bytes, media_type)` entries,
/// dropping the ones that are not images. One stray text file must not sink
/// the rest of the upload. Order is preserved.
pub fn encode_batch<I>(files: I) -> Vec<SourceImage>
where
    I: IntoIterator<Item = (String, Vec<u8>, String)>,
{
    files
        .into_iter()
        .filter_map(|(filename, bytes, media_type)| {
            match encode(&filename, bytes, &media_type) {
                Ok(source) => Some(source),
                Err(e) => {
                    warn!("skipping {filename}: {e}");
                    None
                }
            }
        })
        .collect()
}

/// Composite mask strokes onto the base image at its native resolution.
///
/// Stroke geometry arrives normalized to 0..1 of the display canvas, so the
/// scale to native pixels is what keeps the marked region where the user
/// drew it. Output is a flattened PNG of exactly the base image's dimensions.
/// With no strokes the base payload is returned bit-identical.
pub async fn composite_mask(
    base: &ImagePayload,
    strokes: &[MaskStroke],
) -> CodecResult<ImagePayload> {
    if strokes.is_empty() {
        return Ok(base.clone());
    }

    let bytes = base.bytes.clone();
    let stroke_count = strokes.len();
    let strokes = strokes.to_vec();

    let png_bytes = tokio::task::spawn_blocking(move || -> CodecResult<Vec<u8>> {
        let decoded = image::load_from_memory(&bytes)?;
        let (width, height) = decoded.dimensions();
        let mut canvas = decoded.to_rgba8();

        for stroke in &strokes {
            rasterize_stroke(&mut canvas, stroke, width, height);
        }

        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(canvas)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        Ok(out)
    })
    .await
    .map_err(|e| CodecError::TaskJoin(e.to_string()))??;

    debug!(strokes = stroke_count, "composited mask overlay");
    Ok(ImagePayload::new(png_bytes, "image/png"))
}

/// Stamp a stroke as a sequence of filled discs along each segment.
fn rasterize_stroke(
    canvas: &mut image::RgbaImage,
    stroke: &MaskStroke,
    width: u32,
    height: u32,
) {
    if stroke.points.is_empty() {
        return;
    }

    // Brush radius in native pixels, never below one pixel.
    let radius = ((stroke.width * width as f32) / 2.0).max(1.0);

    let scale = |p: [f32; 2]| -> (f32, f32) {
        (
            (p[0].clamp(0.0, 1.0)) * (width.saturating_sub(1)) as f32,
            (p[1].clamp(0.0, 1.0)) * (height.saturating_sub(1)) as f32,
        )
    };

    let mut stamp = |cx: f32, cy: f32| {
        let r = radius.ceil() as i64;
        let (cx_i, cy_i) = (cx.round() as i64, cy.round() as i64);
        for dy in -r..=r {
            for dx in -r..=r {
                if (dx * dx + dy * dy) as f32 > radius * radius {
                    continue;
                }
                let (x, y) = (cx_i + dx, cy_i + dy);
                if x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height {
                    canvas.put_pixel(x as u32, y as u32, MARKER_COLOR);
                }
            }
        }
    };

    let first = scale(stroke.points[0]);
    stamp(first.0, first.1);

    for pair in stroke.points.windows(2) {
        let (x0, y0) = scale(pair[0]);
        let (x1, y1) = scale(pair[1]);
        let distance = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        let steps = distance.ceil().max(1.0) as u32;
        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            stamp(x0 + (x1 - x0) * t, y0 + (y1 - y0) * t);
        }
    }
}
