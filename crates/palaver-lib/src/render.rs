//! Placeholder image renderer.
//!
//! A 512×512 canvas filled with a random solid colour, with the prompt drawn
//! in white starting at (10, 10). Text is not wrapped; anything past the
//! canvas edge is dropped.
//!
//! Fonts: a TrueType face (configured path, then common system locations) at
//! 20 px, or the built-in 8×8 bitmap font scaled ×2 when none loads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::{Font, FontVec, GlyphId, PxScale, ScaleFont, point};
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};
use rand::Rng;
use tracing::{debug, info};

use palaver_core::assets::AssetKind;

use crate::error::Result;
use crate::store::AssetStore;

pub const CANVAS_SIZE: u32 = 512;
pub const TEXT_ORIGIN: (i32, i32) = (10, 10);
pub const FONT_PX: f32 = 20.0;

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BITMAP_SCALE: i32 = 2;
const BITMAP_CELL: i32 = 8 * BITMAP_SCALE;

const SYSTEM_FONTS: &[&str] = &[
    "arial.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Font used for prompt text.
pub enum FontFace {
    TrueType(FontVec),
    /// Built-in 8×8 bitmap glyphs.
    Bitmap,
}

impl FontFace {
    /// Load `preferred` if given, else the first system font that parses.
    /// Never fails; falls back to [`FontFace::Bitmap`].
    pub fn load(preferred: Option<&Path>) -> Self {
        let candidates = preferred
            .map(Path::to_path_buf)
            .into_iter()
            .chain(SYSTEM_FONTS.iter().map(PathBuf::from));

        for path in candidates {
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    info!(font = %path.display(), "image: using TrueType font");
                    return FontFace::TrueType(font);
                }
                Err(e) => debug!(font = %path.display(), "image: skipping font: {e}"),
            }
        }

        debug!("image: no TrueType font found, using built-in bitmap font");
        FontFace::Bitmap
    }
}

pub struct ImageRenderer {
    font: FontFace,
}

impl ImageRenderer {
    pub fn new(font: FontFace) -> Self {
        Self { font }
    }

    /// Draw `prompt` over a random background.
    pub fn render(&self, prompt: &str) -> RgbImage {
        self.render_on(prompt, random_background())
    }

    /// Draw `prompt` over `background`.
    pub fn render_on(&self, prompt: &str, background: Rgb<u8>) -> RgbImage {
        let mut canvas = RgbImage::from_pixel(CANVAS_SIZE, CANVAS_SIZE, background);
        match &self.font {
            FontFace::TrueType(font) => draw_truetype(&mut canvas, font, prompt),
            FontFace::Bitmap => draw_bitmap(&mut canvas, prompt),
        }
        canvas
    }

    /// Render `prompt` to a new PNG in `store` and return its URL.
    pub async fn generate(self: &Arc<Self>, store: &AssetStore, prompt: &str) -> Result<String> {
        let file_name = AssetKind::Image.new_file_name();
        let path = store.path_for(AssetKind::Image, &file_name);

        let renderer = Arc::clone(self);
        let prompt = prompt.to_owned();
        tokio::task::spawn_blocking(move || renderer.render(&prompt).save(&path)).await??;

        info!(file = %file_name, "image: saved");
        Ok(AssetKind::Image.url_for(&file_name))
    }
}

/// Uniformly random RGB colour. Unseeded.
pub fn random_background() -> Rgb<u8> {
    let mut rng = rand::rng();
    Rgb([rng.random(), rng.random(), rng.random()])
}

fn draw_truetype(canvas: &mut RgbImage, font: &FontVec, text: &str) {
    let scaled = font.as_scaled(PxScale::from(FONT_PX));
    let line_height = scaled.height() + scaled.line_gap();
    let (x0, y0) = TEXT_ORIGIN;

    let mut caret = x0 as f32;
    let mut baseline = y0 as f32 + scaled.ascent();
    let mut previous: Option<GlyphId> = None;

    for c in text.chars() {
        if c == '\n' {
            caret = x0 as f32;
            baseline += line_height;
            previous = None;
            continue;
        }
        if c.is_control() {
            continue;
        }

        let id = scaled.glyph_id(c);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        let glyph = id.with_scale_and_position(scaled.scale(), point(caret, baseline));
        caret += scaled.h_advance(id);
        previous = Some(id);

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let x = bounds.min.x as i32 + gx as i32;
                let y = bounds.min.y as i32 + gy as i32;
                blend(canvas, x, y, coverage);
            });
        }
    }
}

fn draw_bitmap(canvas: &mut RgbImage, text: &str) {
    let (x0, y0) = TEXT_ORIGIN;
    let (mut col, mut row) = (0, 0);

    for c in text.chars() {
        if c == '\n' {
            col = 0;
            row += 1;
            continue;
        }
        if c.is_control() {
            continue;
        }

        let rows = BASIC_FONTS.get(c).or_else(|| BASIC_FONTS.get('?'));
        if let Some(rows) = rows {
            let cell_x = x0 + col * BITMAP_CELL;
            let cell_y = y0 + row * BITMAP_CELL;
            for (dy, &bits) in rows.iter().enumerate() {
                for dx in 0..8i32 {
                    if bits & (1u8 << dx) == 0 {
                        continue;
                    }
                    for sy in 0..BITMAP_SCALE {
                        for sx in 0..BITMAP_SCALE {
                            let x = cell_x + dx * BITMAP_SCALE + sx;
                            let y = cell_y + dy as i32 * BITMAP_SCALE + sy;
                            blend(canvas, x, y, 1.0);
                        }
                    }
                }
            }
        }
        col += 1;
    }
}

/// Mix the text colour into one pixel. Off-canvas coordinates are ignored.
fn blend(canvas: &mut RgbImage, x: i32, y: i32, coverage: f32) {
    if x < 0 || y < 0 || x as u32 >= canvas.width() || y as u32 >= canvas.height() {
        return;
    }
    let alpha = coverage.clamp(0.0, 1.0);
    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
    for (channel, text) in pixel.0.iter_mut().zip(TEXT_COLOR.0) {
        *channel = (*channel as f32 * (1.0 - alpha) + text as f32 * alpha).round() as u8;
    }
}
