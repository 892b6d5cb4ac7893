//! Composite rendering: base image, then every annotation in list order, then
//! the uncommitted stroke.
//!
//! Rendering is pure. The same inputs produce byte-identical pixels; text uses
//! the bundled 8x8 bitmap font so there is no platform rasterizer involved.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, Rgba, RgbaImage};
use serde::Serialize;

use crate::color::parse_color;
use crate::config::EngineConfig;
use crate::error::InputError;
use crate::geometry::Point;
use crate::model::{Annotation, Geometry, TextLabel};

const GLYPH_PX: i32 = 8;

/// The in-progress path drawn on top of committed annotations.
#[derive(Debug, Clone, Copy)]
pub struct LiveStroke<'a> {
    pub points: &'a [Point],
    pub color: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedAnnotation {
    pub index: usize,
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Composite {
    pub image: RgbaImage,
    pub skipped: Vec<SkippedAnnotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Renderer {
    stroke_width: f64,
    glyph_scale: u32,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl Renderer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            stroke_width: config.stroke_width.max(1.0),
            glyph_scale: config.glyph_scale(),
        }
    }

    /// Renders onto a surface sized exactly to the base image.
    ///
    /// Malformed annotations are skipped and reported; they never abort the
    /// composite.
    pub fn render(
        &self,
        base: &DynamicImage,
        annotations: &[Annotation],
        live: Option<LiveStroke<'_>>,
    ) -> Composite {
        let mut surface = base.to_rgba8();
        let mut skipped = Vec::new();

        for (index, annotation) in annotations.iter().enumerate() {
            if let Err(err) = self.draw_annotation(&mut surface, annotation) {
                tracing::warn!(
                    index,
                    id = %annotation.id,
                    error = %err,
                    "skipping annotation that cannot be rendered"
                );
                skipped.push(SkippedAnnotation {
                    index,
                    id: annotation.id.clone(),
                    reason: err.to_string(),
                });
            }
        }

        if let Some(live) = live {
            match parse_color(live.color) {
                Ok(color) => draw_polyline(&mut surface, live.points, color, self.stroke_width),
                Err(err) => tracing::warn!(error = %err, "skipping live stroke"),
            }
        }

        Composite {
            image: surface,
            skipped,
        }
    }

    fn draw_annotation(&self, img: &mut RgbaImage, annotation: &Annotation) -> Result<(), InputError> {
        annotation.validate()?;
        let color = parse_color(&annotation.color)?;
        match &annotation.geometry {
            Geometry::Stroke(points) => draw_polyline(img, points, color, self.stroke_width),
            Geometry::Text(label) => self.draw_label(img, label, color),
        }
        Ok(())
    }

    /// The anchor is the baseline origin of the first line; glyph bottoms
    /// sit on it and each `'\n'` starts a new line one glyph height lower.
    /// Labels that fall entirely off the surface draw nothing.
    fn draw_label(&self, img: &mut RgbaImage, label: &TextLabel, color: Rgba<u8>) {
        let glyph = f64::from(GLYPH_PX) * f64::from(self.glyph_scale.max(1));
        let (cols, rows) = text_extent(&label.text);
        let left = label.x.round();
        let top = label.y.round() - glyph;
        let right = left + cols as f64 * glyph;
        let bottom = top + rows as f64 * glyph;
        if !left.is_finite()
            || !top.is_finite()
            || right <= 0.0
            || bottom <= 0.0
            || left >= f64::from(img.width())
            || top >= f64::from(img.height())
        {
            return;
        }
        draw_bitmap_text(img, left as i64, top as i64, &label.text, color, self.glyph_scale);
    }
}

/// Widest line in characters and number of lines.
fn text_extent(text: &str) -> (usize, usize) {
    let mut cols = 0;
    let mut rows = 0;
    for line in text.split('\n') {
        cols = cols.max(line.chars().count());
        rows += 1;
    }
    (cols, rows.max(1))
}

/// Straight segments between consecutive points. A single point has no
/// segments and draws nothing.
fn draw_polyline(img: &mut RgbaImage, points: &[Point], color: Rgba<u8>, width: f64) {
    for pair in points.windows(2) {
        draw_thick_line(img, pair[0].x, pair[0].y, pair[1].x, pair[1].y, color, width);
    }
}

fn clamp_i32(value: i32, min_value: i32, max_value: i32) -> i32 {
    value.max(min_value).min(max_value)
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| {
        (f64::from(d) * inv + f64::from(s) * a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * inv)
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2]), out_a])
}

fn blend_at(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && x < i64::from(img.width()) && y < i64::from(img.height()) {
        let dst = *img.get_pixel(x as u32, y as u32);
        img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
    }
}

fn draw_disc(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    if radius <= 0.1 {
        blend_at(img, cx.round() as i64, cy.round() as i64, color);
        return;
    }
    let min_x = clamp_i32((cx - radius).floor() as i32, 0, img.width() as i32 - 1);
    let max_x = clamp_i32((cx + radius).ceil() as i32, 0, img.width() as i32 - 1);
    let min_y = clamp_i32((cy - radius).floor() as i32, 0, img.height() as i32 - 1);
    let max_y = clamp_i32((cy + radius).ceil() as i32, 0, img.height() as i32 - 1);
    let r2 = radius * radius;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = f64::from(x) - cx;
            let dy = f64::from(y) - cy;
            if dx * dx + dy * dy <= r2 {
                blend_at(img, i64::from(x), i64::from(y), color);
            }
        }
    }
}

/// Liang-Barsky clip of the segment `a`-`b` against `[min, max]`.
fn clip_segment(
    a: (f64, f64),
    b: (f64, f64),
    min: (f64, f64),
    max: (f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    for (p, q) in [
        (-dx, a.0 - min.0),
        (dx, max.0 - a.0),
        (-dy, a.1 - min.1),
        (dy, max.1 - a.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some(((a.0 + t0 * dx, a.1 + t0 * dy), (a.0 + t1 * dx, a.1 + t1 * dy)))
}

/// Stamps discs along the segment. Only the part within one radius of the
/// surface is walked, so off-image geometry costs nothing.
fn draw_thick_line(
    img: &mut RgbaImage,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    color: Rgba<u8>,
    width: f64,
) {
    if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
        return;
    }
    let radius = (width.max(1.0) / 2.0).max(0.6);
    let pad = radius + 1.0;
    let Some(((x1, y1), (x2, y2))) = clip_segment(
        (x1, y1),
        (x2, y2),
        (-pad, -pad),
        (f64::from(img.width()) + pad, f64::from(img.height()) + pad),
    ) else {
        return;
    };
    let dx = x2 - x1;
    let dy = y2 - y1;
    let distance = (dx * dx + dy * dy).sqrt();
    let steps = distance.max(1.0).ceil() as i32;
    for step in 0..=steps {
        let t = f64::from(step) / f64::from(steps.max(1));
        draw_disc(img, x1 + dx * t, y1 + dy * t, radius, color);
    }
}

fn draw_bitmap_text(img: &mut RgbaImage, x: i64, y: i64, text: &str, color: Rgba<u8>, scale: u32) {
    let scale_i = i64::from(scale.max(1));
    let advance = i64::from(GLYPH_PX) * scale_i;
    let width = i64::from(img.width());
    let mut cursor_x = x;
    let mut line_top = y;
    for ch in text.chars() {
        if ch == '\n' {
            cursor_x = x;
            line_top += advance;
            continue;
        }
        if cursor_x >= width {
            continue;
        }
        let glyph = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?'));
        let Some(glyph) = glyph else {
            cursor_x += advance;
            continue;
        };
        if cursor_x + advance > 0 {
            for (row_idx, row) in glyph.iter().enumerate() {
                for col_idx in 0..GLYPH_PX {
                    if (*row >> col_idx) & 1 == 0 {
                        continue;
                    }
                    let px = cursor_x + i64::from(col_idx) * scale_i;
                    let py = line_top + row_idx as i64 * scale_i;
                    for sy in 0..scale_i {
                        for sx in 0..scale_i {
                            blend_at(img, px + sx, py + sy, color);
                        }
                    }
                }
            }
        }
        cursor_x += advance;
    }
}
