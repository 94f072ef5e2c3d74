//! Visual feedback for detections.
//!
//! Renderers draw onto the frame buffer and present it somewhere. Nothing a
//! renderer does feeds back into the grouped results; the only signal it
//! returns is whether its display surface is still there.

use ab_glyph::{FontRef, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::fs;
use std::path::PathBuf;

use crate::detect::{BoundingBox, Detection};
use crate::frame::Frame;

type Canvas<'a> = ImageBuffer<Rgb<u8>, &'a mut [u8]>;

/// DejaVu Sans Mono Bold, see `assets/DejaVu-LICENSE`.
static LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono-Bold.ttf");

const BOX_COLOR: [u8; 3] = [255, 0, 255];
const CORNER_COLOR: [u8; 3] = [0, 255, 0];
const TEXT_COLOR: [u8; 3] = [255, 255, 255];
const CORNER_LENGTH: i32 = 30;
const CORNER_THICKNESS: i32 = 5;
/// Label plates sit at least this far from the top edge.
const LABEL_MIN_Y: i32 = 35;
const LABEL_SCALE: f32 = 20.0;
const LABEL_PADDING: i32 = 5;

/// Outcome of presenting one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStatus {
    Continue,
    /// The display surface is gone; the capture loop should stop.
    Closed,
}

pub trait Renderer {
    fn render(&mut self, frame: &mut Frame, detections: &[Detection]) -> Result<RenderStatus>;

    /// Tear down the display surface.
    fn close(&mut self) {}
}

/// Headless renderer. Draws nothing, never closes.
#[derive(Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _frame: &mut Frame, _detections: &[Detection]) -> Result<RenderStatus> {
        Ok(RenderStatus::Continue)
    }
}

/// Draws corner-accented boxes and captioned label plates into the frame.
pub struct Annotator {
    font: FontRef<'static>,
}

impl Annotator {
    pub fn new() -> Result<Self> {
        let font = FontRef::try_from_slice(LABEL_FONT)
            .map_err(|e| anyhow!("invalid label font: {}", e))?;
        Ok(Self { font })
    }

    pub fn annotate(&self, frame: &mut Frame, detections: &[Detection]) -> Result<()> {
        let index = frame.index;
        let (width, height) = (frame.width, frame.height);
        let mut canvas: Canvas = ImageBuffer::from_raw(width, height, frame.pixels_mut())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        for det in detections {
            draw_corner_rect(&mut canvas, &det.bbox);
            let caption = format!("{} {:.2}", det.label, det.confidence);
            self.draw_label(
                &mut canvas,
                det.bbox.x1.max(0),
                det.bbox.y1.max(LABEL_MIN_Y),
                &caption,
            );
            log::trace!("frame {}: drew '{}' at {:?}", index, caption, det.bbox);
        }
        Ok(())
    }

    /// Filled caption plate whose bottom-left corner is `(x, y)`.
    fn draw_label(&self, canvas: &mut Canvas, x: i32, y: i32, caption: &str) {
        let scale = PxScale::from(LABEL_SCALE);
        let (text_w, text_h) = text_size(scale, &self.font, caption);
        let (text_w, text_h) = (text_w as i32, text_h as i32);
        let top = y - text_h - 2 * LABEL_PADDING;
        fill_rect(canvas, x, top, x + text_w + 2 * LABEL_PADDING, y, BOX_COLOR);
        draw_text_mut(
            canvas,
            Rgb(TEXT_COLOR),
            x + LABEL_PADDING,
            top + LABEL_PADDING,
            scale,
            &self.font,
            caption,
        );
    }
}

impl Renderer for Annotator {
    fn render(&mut self, frame: &mut Frame, detections: &[Detection]) -> Result<RenderStatus> {
        self.annotate(frame, detections)?;
        Ok(RenderStatus::Continue)
    }
}

/// Annotates frames and publishes the latest one as a JPEG file.
///
/// The file is the display surface: once it can no longer be written the
/// preview reports `Closed`.
pub struct JpegPreview {
    path: PathBuf,
    annotator: Annotator,
    frames_written: u64,
}

impl JpegPreview {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let annotator = Annotator::new()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create preview directory {}", parent.display())
                })?;
            }
        }
        Ok(Self {
            path,
            annotator,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn publish(&self, frame: &Frame) -> Result<()> {
        let image = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        // Write beside the target and rename so readers never see a partial JPEG.
        let tmp = self.path.with_extension("jpg.tmp");
        image
            .save_with_format(&tmp, image::ImageFormat::Jpeg)
            .with_context(|| format!("failed to encode preview {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to publish preview {}", self.path.display()))?;
        Ok(())
    }
}

impl Renderer for JpegPreview {
    fn render(&mut self, frame: &mut Frame, detections: &[Detection]) -> Result<RenderStatus> {
        self.annotator.annotate(frame, detections)?;
        match self.publish(frame) {
            Ok(()) => {
                self.frames_written += 1;
                Ok(RenderStatus::Continue)
            }
            Err(err) => {
                log::warn!("preview surface lost: {:#}", err);
                Ok(RenderStatus::Closed)
            }
        }
    }

    fn close(&mut self) {
        log::debug!(
            "preview {} closed after {} frames",
            self.path.display(),
            self.frames_written
        );
    }
}

/// Half-open span `[x1, x2) x [y1, y2)`. Empty spans draw nothing.
fn span(x1: i32, y1: i32, x2: i32, y2: i32) -> Option<Rect> {
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::at(x1, y1).of_size((x2 - x1) as u32, (y2 - y1) as u32))
}

fn fill_rect(canvas: &mut Canvas, x1: i32, y1: i32, x2: i32, y2: i32, rgb: [u8; 3]) {
    if let Some(rect) = span(x1, y1, x2, y2) {
        draw_filled_rect_mut(canvas, rect, Rgb(rgb));
    }
}

fn draw_corner_rect(canvas: &mut Canvas, bbox: &BoundingBox) {
    let BoundingBox { x1, y1, x2, y2 } = *bbox;

    // 1px outline, corners inclusive
    if let Some(rect) = span(x1, y1, x2 + 1, y2 + 1) {
        draw_hollow_rect_mut(canvas, rect, Rgb(BOX_COLOR));
    }

    let len = CORNER_LENGTH.min(bbox.width() / 2).min(bbox.height() / 2);
    if len <= 0 {
        return;
    }
    let t = CORNER_THICKNESS;
    for (cx, cy, dx, dy) in [(x1, y1, 1, 1), (x2, y1, -1, 1), (x1, y2, 1, -1), (x2, y2, -1, -1)] {
        let (hx1, hx2) = ordered(cx, cx + dx * len);
        let (hy1, hy2) = ordered(cy, cy + dy * t);
        fill_rect(canvas, hx1, hy1, hx2, hy2, CORNER_COLOR);
        let (vx1, vx2) = ordered(cx, cx + dx * t);
        let (vy1, vy2) = ordered(cy, cy + dy * len);
        fill_rect(canvas, vx1, vy1, vx2, vy2, CORNER_COLOR);
    }
}

fn ordered(a: i32, b: i32) -> (i32, i32) {
    (a.min(b), a.max(b))
}
