use std::fs;
use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow};
use fontdb::{Database, Family, Query, Source, Weight};
use image::{Rgb, RgbImage};
use tracing::{debug, warn};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GREY: Rgb<u8> = Rgb([100, 100, 100]);
const MOUNTAIN: Rgb<u8> = Rgb([200, 200, 0]);
const SUN: Rgb<u8> = Rgb([255, 200, 0]);

pub const TITLE: &str = "No Photos Found";

/// Layout is designed for a 1200 px tall panel and scaled from there.
const REFERENCE_HEIGHT: f32 = 1200.0;

pub struct PlaceholderFonts {
    pub title: FontArc,
    pub body: FontArc,
}

impl PlaceholderFonts {
    /// Looks up a system sans-serif face; `None` when the system has no
    /// usable fonts, in which case the placeholder is drawn without text.
    pub fn load() -> Option<Self> {
        let mut db = Database::new();
        db.load_system_fonts();
        let body = match load_font(&db, Weight::NORMAL) {
            Ok(font) => font,
            Err(err) => {
                warn!("placeholder text disabled: {err:#}");
                return None;
            }
        };
        let title = load_font(&db, Weight::BOLD).unwrap_or_else(|_| body.clone());
        Some(Self { title, body })
    }
}

fn load_font(db: &Database, weight: Weight) -> Result<FontArc> {
    let preferred_families = [
        Family::Name("DejaVu Sans"),
        Family::Name("FreeSans"),
        Family::Name("Noto Sans"),
        Family::SansSerif,
    ];
    for family in preferred_families {
        if let Some(id) = db.query(&Query {
            families: &[family],
            weight,
            ..Default::default()
        }) && let Some(font) = usable_face(db, id)
        {
            return Ok(font);
        }
    }
    db.faces()
        .find_map(|face| usable_face(db, face.id))
        .ok_or_else(|| anyhow!("no usable system font available"))
}

/// Unreadable or undecodable faces are skipped.
fn usable_face(db: &Database, id: fontdb::ID) -> Option<FontArc> {
    match load_face(db, id) {
        Ok(font) => Some(font),
        Err(err) => {
            debug!("skipping font face: {err:#}");
            None
        }
    }
}

fn load_face(db: &Database, id: fontdb::ID) -> Result<FontArc> {
    let face = db.face(id).context("missing font face in database")?;
    let data = match &face.source {
        Source::Binary(data) => data.as_ref().as_ref().to_vec(),
        Source::File(path) => {
            fs::read(path).with_context(|| format!("failed to read font at {}", path.display()))?
        }
        Source::SharedFile(_, data) => data.as_ref().as_ref().to_vec(),
    };
    debug!(family = ?face.families.first().map(|f| &f.0), "placeholder font");
    FontArc::try_from_vec(data).context("failed to decode font face")
}

/// Instruction lines shown under the title.
pub fn instructions(local_path: &Path) -> Vec<String> {
    vec![
        "Add photos to display:".to_string(),
        format!("{}/", local_path.display().to_string().trim_end_matches('/')),
        String::new(),
        "Or edit the configuration to".to_string(),
        "enable the remote library".to_string(),
    ]
}

/// "No photos" screen at exactly `width`x`height`: a framed landscape icon,
/// a title and instructions naming `local_path`.
pub fn render_placeholder(
    width: u32,
    height: u32,
    fonts: Option<&PlaceholderFonts>,
    local_path: &Path,
) -> RgbImage {
    let mut img = RgbImage::from_pixel(width, height, WHITE);
    let s = height as f32 / REFERENCE_HEIGHT;
    let (cx, cy) = ((width / 2) as f32, (height / 2) as f32);

    let half = 200.0 * s;
    stroke_rect(
        &mut img,
        (cx - half, cy - half - 80.0 * s),
        (cx + half, cy + half - 80.0 * s),
        (8.0 * s).max(1.0),
        BLACK,
    );
    fill_triangle(
        &mut img,
        [
            (cx - 120.0 * s, cy - 20.0 * s),
            (cx, cy - 120.0 * s),
            (cx + 120.0 * s, cy - 20.0 * s),
        ],
        MOUNTAIN,
    );
    fill_circle(&mut img, (cx + 70.0 * s, cy - 120.0 * s), 30.0 * s, SUN);

    let Some(fonts) = fonts else {
        return img;
    };
    let title_scale = PxScale::from((80.0 * s).max(8.0));
    let title_top = cy + 180.0 * s;
    draw_centered(&mut img, &fonts.title, TITLE, cx, title_top, title_scale, BLACK);

    let body_scale = PxScale::from((40.0 * s).max(6.0));
    let mut top = cy + 300.0 * s;
    for line in instructions(local_path) {
        draw_centered(&mut img, &fonts.body, &line, cx, top, body_scale, GREY);
        top += 55.0 * s;
    }
    img
}

fn stroke_rect(img: &mut RgbImage, min: (f32, f32), max: (f32, f32), line: f32, color: Rgb<u8>) {
    let inner_min = (min.0 + line, min.1 + line);
    let inner_max = (max.0 - line, max.1 - line);
    for_each_in(img, min, max, |x, y| {
        !(x >= inner_min.0 && x < inner_max.0 && y >= inner_min.1 && y < inner_max.1)
    }, color);
}

fn fill_triangle(img: &mut RgbImage, [a, b, c]: [(f32, f32); 3], color: Rgb<u8>) {
    let edge = |p: (f32, f32), q: (f32, f32), x: f32, y: f32| {
        (q.0 - p.0) * (y - p.1) - (q.1 - p.1) * (x - p.0)
    };
    let min = (a.0.min(b.0).min(c.0), a.1.min(b.1).min(c.1));
    let max = (a.0.max(b.0).max(c.0), a.1.max(b.1).max(c.1));
    for_each_in(img, min, max, |x, y| {
        let (e0, e1, e2) = (edge(a, b, x, y), edge(b, c, x, y), edge(c, a, x, y));
        (e0 >= 0.0 && e1 >= 0.0 && e2 >= 0.0) || (e0 <= 0.0 && e1 <= 0.0 && e2 <= 0.0)
    }, color);
}

fn fill_circle(img: &mut RgbImage, center: (f32, f32), radius: f32, color: Rgb<u8>) {
    let min = (center.0 - radius, center.1 - radius);
    let max = (center.0 + radius, center.1 + radius);
    for_each_in(img, min, max, |x, y| {
        let (dx, dy) = (x - center.0, y - center.1);
        dx * dx + dy * dy <= radius * radius
    }, color);
}

// Paints pixel centres inside the clipped box for which `inside` holds.
fn for_each_in(
    img: &mut RgbImage,
    min: (f32, f32),
    max: (f32, f32),
    inside: impl Fn(f32, f32) -> bool,
    color: Rgb<u8>,
) {
    let x0 = min.0.floor().max(0.0) as u32;
    let y0 = min.1.floor().max(0.0) as u32;
    let x1 = (max.0.ceil().max(0.0) as u32).min(img.width());
    let y1 = (max.1.ceil().max(0.0) as u32).min(img.height());
    for y in y0..y1 {
        for x in x0..x1 {
            if inside(x as f32 + 0.5, y as f32 + 0.5) {
                img.put_pixel(x, y, color);
            }
        }
    }
}

fn draw_centered(
    img: &mut RgbImage,
    font: &FontArc,
    text: &str,
    cx: f32,
    top: f32,
    scale: PxScale,
    color: Rgb<u8>,
) {
    if text.is_empty() {
        return;
    }
    let left = cx - measure_text(text, font, scale) / 2.0;
    let baseline = top + font.as_scaled(scale).ascent();
    draw_text(img, font, text, left, baseline, scale, color);
}

fn draw_text(
    img: &mut RgbImage,
    font: &FontArc,
    text: &str,
    left: f32,
    baseline: f32,
    scale: PxScale,
    color: Rgb<u8>,
) {
    let scaled = font.as_scaled(scale);
    let mut cursor_x = left;
    let mut previous = None;
    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            cursor_x += scaled.kern(prev, glyph);
        }
        let advance = scaled.h_advance(glyph);
        let mut positioned = scaled.scaled_glyph(ch);
        positioned.position = point(cursor_x, baseline);
        if let Some(outline) = font.outline_glyph(positioned) {
            let bounds = outline.px_bounds();
            outline.draw(|x, y, coverage| {
                let px = bounds.min.x as i64 + i64::from(x);
                let py = bounds.min.y as i64 + i64::from(y);
                if px < 0 || py < 0 || px >= i64::from(img.width()) || py >= i64::from(img.height()) {
                    return;
                }
                let dst = img.get_pixel_mut(px as u32, py as u32);
                for (d, c) in dst.0.iter_mut().zip(color.0) {
                    let blended = f32::from(*d) * (1.0 - coverage) + f32::from(c) * coverage;
                    *d = blended.round().clamp(0.0, 255.0) as u8;
                }
            });
        }
        cursor_x += advance;
        previous = Some(glyph);
    }
}

fn measure_text(text: &str, font: &FontArc, scale: PxScale) -> f32 {
    let scaled_font = font.as_scaled(scale);
    let mut width = 0.0f32;
    let mut previous = None;
    for ch in text.chars() {
        let glyph_id = scaled_font.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled_font.kern(prev, glyph_id);
        }
        width += scaled_font.h_advance(glyph_id);
        previous = Some(glyph_id);
    }
    width.max(0.0)
}
