//! # Weather Icon Generation
//!
//! Draws the firmware's weather icons and packs them into `weather_icons.h`,
//! a C header of `PROGMEM` arrays in the e-paper controller's 4-bit format.
//!
//! ## Pipeline
//! 1. Each [`IconKind`] is drawn with `embedded-graphics` primitives onto an
//!    [`IconCanvas`]: white background, black outlines, red accents.
//! 2. Every RGB pixel is mapped to a palette index by [`classify_pixel`].
//! 3. [`pack_4bpp`] puts two pixels in each byte, high nibble first.
//! 4. [`render_icon_header`] emits the arrays with their dimensions.
//!
//! Hand-edited artwork goes through the same steps from PNG files:
//! [`write_pngs`] exports the drawn icons and [`load_png_dir`] reads a
//! directory of `NAME_WxH.png` files back in.
//!
//! ## Palette
//! The controller has seven colours; the icons use three of them:
//! `BLACK = 0`, `WHITE = 1`, `RED = 4`.

use core::convert::Infallible;
use embedded_graphics::{
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{
        Circle, Ellipse, Line, Polyline, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle,
        Triangle,
    },
};
use std::f32::consts::PI;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const BLACK: u8 = 0;
pub const WHITE: u8 = 1;
pub const RED: u8 = 4;

/// Edge length of the large icons
pub const LARGE: u32 = 120;
/// Edge length of the small icons
pub const SMALL: u32 = 40;

const BYTES_PER_LINE: usize = 16;
const HEADER_GUARD: &str = "WEATHER_ICONS_H";

/// Errors reading or writing icon PNGs.
#[derive(Error, Debug)]
pub enum IconError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// In-memory RGB framebuffer for drawing one icon.
#[derive(Clone, Debug)]
pub struct IconCanvas {
    width: u32,
    height: u32,
    pixels: Vec<Rgb888>,
}

impl IconCanvas {
    /// A canvas filled with white.
    pub fn new(width: u32, height: u32) -> Self {
        IconCanvas {
            width,
            height,
            pixels: vec![Rgb888::WHITE; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb888> {
        if x < self.width && y < self.height {
            Some(self.pixels[(y * self.width + x) as usize])
        } else {
            None
        }
    }

    /// Copy into an `image` buffer for saving.
    pub fn to_rgb_image(&self) -> image::RgbImage {
        image::RgbImage::from_fn(self.width, self.height, |x, y| {
            let c = self.pixels[(y * self.width + x) as usize];
            image::Rgb([c.r(), c.g(), c.b()])
        })
    }

    /// Palette index of every pixel, row-major.
    pub fn to_palette(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .map(|c| classify_pixel(c.r(), c.g(), c.b(), 255))
            .collect()
    }
}

impl OriginDimensions for IconCanvas {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for IconCanvas {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && point.y >= 0
                && (point.x as u32) < self.width
                && (point.y as u32) < self.height
            {
                let index = point.y as u32 * self.width + point.x as u32;
                self.pixels[index as usize] = color;
            }
        }
        Ok(())
    }
}

/// The weather conditions the firmware can show.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IconKind {
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    Snow,
    Thunderstorm,
}

impl IconKind {
    pub const ALL: [IconKind; 8] = [
        IconKind::Clear,
        IconKind::PartlyCloudy,
        IconKind::Cloudy,
        IconKind::Fog,
        IconKind::Drizzle,
        IconKind::Rain,
        IconKind::Snow,
        IconKind::Thunderstorm,
    ];

    /// Base name used in array identifiers.
    pub fn name(&self) -> &'static str {
        match self {
            IconKind::Clear => "clear",
            IconKind::PartlyCloudy => "partly_cloudy",
            IconKind::Cloudy => "cloudy",
            IconKind::Fog => "fog",
            IconKind::Drizzle => "drizzle",
            IconKind::Rain => "rain",
            IconKind::Snow => "snow",
            IconKind::Thunderstorm => "thunderstorm",
        }
    }

    /// Draw this icon on a fresh `size`×`size` canvas.
    pub fn draw(&self, size: u32) -> IconCanvas {
        let mut canvas = IconCanvas::new(size, size);
        let s = size as f32;
        let lw = line_width(size, 3.0);
        let c = &mut canvas;

        match self {
            IconKind::Clear => {
                let radius = (s / 2.0 - margin(size) as f32) * 0.38;
                draw_sun(c, s / 2.0, s / 2.0, radius, lw, 1.75);
            }
            IconKind::PartlyCloudy => {
                draw_sun(c, s * 0.62, s * 0.30, s * 0.16, lw, 1.8);
                draw_cloud(c, s * 0.45, s * 0.58, s * 0.72, s * 0.48, lw);
            }
            IconKind::Cloudy => {
                draw_cloud(c, s * 0.55, s * 0.38, s * 0.60, s * 0.42, lw);
                draw_cloud(c, s * 0.42, s * 0.55, s * 0.70, s * 0.48, lw);
            }
            IconKind::Fog => {
                let m = margin(size) as f32;
                let left = m + s * 0.10;
                let right = s - m - s * 0.10;
                let segments = 12;
                let step = (right - left) / segments as f32;
                for base in [s * 0.32, s * 0.50, s * 0.68] {
                    let points: Vec<Point> = (0..=segments)
                        .map(|i| {
                            let wave = (i as f32 * PI / (segments as f32 / 2.0)).sin();
                            point(left + i as f32 * step, base + wave * s * 0.02)
                        })
                        .collect();
                    Polyline::new(&points)
                        .into_styled(stroke(Rgb888::BLACK, lw))
                        .draw(c)
                        .ok();
                }
            }
            IconKind::Drizzle => {
                draw_cloud(c, s * 0.50, s * 0.38, s * 0.70, s * 0.42, lw);
                let diameter = 2 * ((s * 0.025).round() as u32).max(1) + 1;
                let top = s * 0.66;
                let second = top + s * 0.10;
                for (x, y) in [
                    (0.32, top),
                    (0.50, top),
                    (0.68, top),
                    (0.40, second),
                    (0.58, second),
                ] {
                    Circle::with_center(point(s * x, y), diameter)
                        .into_styled(PrimitiveStyle::with_fill(Rgb888::BLACK))
                        .draw(c)
                        .ok();
                }
            }
            IconKind::Rain => {
                draw_cloud(c, s * 0.50, s * 0.35, s * 0.70, s * 0.40, lw);
                let rain_lw = line_width(size, 2.0);
                let length = s * 0.12;
                for row in 0..2 {
                    let y = s * 0.62 + row as f32 * s * 0.12;
                    let columns: &[f32] = if row == 0 {
                        &[0.30, 0.45, 0.60, 0.75]
                    } else {
                        &[0.30, 0.45, 0.60]
                    };
                    for x in columns {
                        let x = s * x;
                        Line::new(point(x, y), point(x - s * 0.03, y + length))
                            .into_styled(stroke(Rgb888::BLACK, rain_lw))
                            .draw(c)
                            .ok();
                    }
                }
            }
            IconKind::Snow => {
                draw_cloud(c, s * 0.50, s * 0.35, s * 0.70, s * 0.40, lw);
                let radius = (s * 0.04).round().max(2.0);
                let flake_lw = line_width(size, 1.5);
                for (x, y) in [
                    (0.30, 0.66),
                    (0.50, 0.64),
                    (0.70, 0.66),
                    (0.38, 0.78),
                    (0.58, 0.80),
                ] {
                    let (fx, fy) = (s * x, s * y);
                    for degrees in [0.0f32, 60.0, 120.0] {
                        let (sin, cos) = degrees.to_radians().sin_cos();
                        let (dx, dy) = (cos * radius, sin * radius);
                        Line::new(point(fx - dx, fy - dy), point(fx + dx, fy + dy))
                            .into_styled(stroke(Rgb888::BLACK, flake_lw))
                            .draw(c)
                            .ok();
                    }
                }
            }
            IconKind::Thunderstorm => {
                draw_cloud(c, s * 0.50, s * 0.32, s * 0.74, s * 0.42, lw);
                draw_lightning(c, s * 0.48, s * 0.55, s * 0.90, s * 0.30);
            }
        }

        canvas
    }
}

/// One packed icon ready for the header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Icon {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Icon {
    /// Classify and pack a drawn canvas under the array name `name`.
    pub fn from_canvas(name: impl Into<String>, canvas: &IconCanvas) -> Self {
        Icon {
            name: name.into(),
            width: canvas.width(),
            height: canvas.height(),
            data: pack_4bpp(canvas.width(), canvas.height(), &canvas.to_palette()),
        }
    }
}

/// Map an RGBA pixel to a palette index.
///
/// Red is tested before brightness so dark reds do not become black.
pub fn classify_pixel(r: u8, g: u8, b: u8, a: u8) -> u8 {
    if a == 0 {
        return WHITE;
    }
    if r > 150 && g < 100 && b < 100 {
        return RED;
    }
    let brightness = (u16::from(r) + u16::from(g) + u16::from(b)) as f32 / 3.0;
    if brightness < 128.0 {
        BLACK
    } else {
        WHITE
    }
}

/// Pack palette indices two per byte, high nibble first.
///
/// Rows are packed independently; on odd widths the last byte of each row
/// carries `WHITE` in its low nibble.
pub fn pack_4bpp(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
    let width = width as usize;
    let mut packed = Vec::with_capacity(width.div_ceil(2) * height as usize);
    for row in pixels.chunks(width.max(1)).take(height as usize) {
        for pair in row.chunks(2) {
            let hi = pair[0] & 0x0f;
            let lo = pair.get(1).map_or(WHITE, |p| p & 0x0f);
            packed.push((hi << 4) | lo);
        }
    }
    packed
}

/// Array name and dimensions for an icon stem like `clear_120x120`.
///
/// 120×120 icons get the `large` suffix and 40×40 `small`; any other size
/// keeps its `WxH` so nothing collides.
pub fn derive_name(stem: &str) -> Option<(String, u32, u32)> {
    let (base, dims) = stem.rsplit_once('_')?;
    let (w, h) = dims.split_once(['x', 'X'])?;
    let width: u32 = w.parse().ok()?;
    let height: u32 = h.parse().ok()?;
    if base.is_empty() {
        return None;
    }

    let suffix = match (width, height) {
        (LARGE, LARGE) => "large".to_string(),
        (SMALL, SMALL) => "small".to_string(),
        _ => format!("{}x{}", width, height),
    };
    Some((format!("icon_{}_{}", base, suffix), width, height))
}

/// Hex literals, 16 per line with a 2-space indent, no trailing comma.
pub fn format_byte_array(data: &[u8]) -> String {
    let chunks: Vec<&[u8]> = data.chunks(BYTES_PER_LINE).collect();
    let mut lines = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let values: Vec<String> = chunk.iter().map(|b| format!("0x{:02x}", b)).collect();
        let comma = if i + 1 < chunks.len() { "," } else { "" };
        lines.push(format!("  {}{}", values.join(", "), comma));
    }
    lines.join("\n")
}

/// Complete `weather_icons.h` for `icons`, in the given order.
pub fn render_icon_header(icons: &[Icon]) -> String {
    let mut out = String::new();
    out.push_str("// Auto-generated weather icon data for e-ink display\n");
    out.push_str(
        "// 7-color e-ink palette: BLACK=0, WHITE=1, GREEN=2, BLUE=3, RED=4, YELLOW=5, ORANGE=6\n",
    );
    out.push('\n');
    let _ = writeln!(out, "#ifndef {}", HEADER_GUARD);
    let _ = writeln!(out, "#define {}", HEADER_GUARD);
    out.push('\n');
    out.push_str("#include <Arduino.h>\n");

    for icon in icons {
        let upper = icon.name.to_uppercase();
        out.push('\n');
        let _ = writeln!(
            out,
            "// {} - {}x{} pixels, 4bpp (2 pixels per byte)",
            icon.name, icon.width, icon.height
        );
        let _ = writeln!(out, "const uint16_t {}_WIDTH = {};", upper, icon.width);
        let _ = writeln!(out, "const uint16_t {}_HEIGHT = {};", upper, icon.height);
        let _ = writeln!(
            out,
            "const uint8_t {}[{}] PROGMEM = {{",
            icon.name,
            icon.data.len()
        );
        out.push_str(&format_byte_array(&icon.data));
        out.push_str("\n};\n");
    }

    out.push('\n');
    let _ = writeln!(out, "#endif // {}", HEADER_GUARD);
    out
}

/// File stem, kind and size of every icon, ordered by stem.
fn icon_stems() -> Vec<(String, IconKind, u32)> {
    let mut stems: Vec<(String, IconKind, u32)> = IconKind::ALL
        .iter()
        .flat_map(|kind| {
            [LARGE, SMALL]
                .into_iter()
                .map(move |size| (format!("{}_{}x{}", kind.name(), size, size), *kind, size))
        })
        .collect();
    stems.sort_by(|a, b| a.0.cmp(&b.0));
    stems
}

/// Draw and pack every icon at both sizes, ordered by file stem.
pub fn generate_all() -> Vec<Icon> {
    icon_stems()
        .into_iter()
        .filter_map(|(stem, kind, size)| {
            let (name, _, _) = derive_name(&stem)?;
            Some(Icon::from_canvas(name, &kind.draw(size)))
        })
        .collect()
}

/// Save every drawn icon as `NAME_WxH.png` in `dir`, creating it if needed.
pub fn write_pngs(dir: &Path) -> Result<Vec<PathBuf>, IconError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for (stem, kind, size) in icon_stems() {
        let path = dir.join(format!("{}.png", stem));
        kind.draw(size)
            .to_rgb_image()
            .save(&path)
            .map_err(|source| IconError::Image {
                path: path.clone(),
                source,
            })?;
        written.push(path);
    }
    Ok(written)
}

/// Icons read from a PNG directory, plus what was skipped or adjusted.
#[derive(Debug, Default)]
pub struct PngImport {
    pub icons: Vec<Icon>,
    pub warnings: Vec<String>,
}

/// Convert every `*.png` in `dir`, in file name order.
///
/// File names must follow `NAME_WxH.png`; others are skipped with a warning.
/// When the image size disagrees with its name the array keeps the name but
/// takes the real dimensions.
pub fn load_png_dir(dir: &Path) -> Result<PngImport, IconError> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if is_png && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut import = PngImport::default();
    for path in paths {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some((name, width, height)) = derive_name(&stem) else {
            import.warnings.push(format!(
                "skipping {}: name does not end in _WxH",
                path.display()
            ));
            continue;
        };

        let rgba = image::open(&path)
            .map_err(|source| IconError::Image {
                path: path.clone(),
                source,
            })?
            .to_rgba8();
        let (actual_width, actual_height) = rgba.dimensions();
        if (actual_width, actual_height) != (width, height) {
            import.warnings.push(format!(
                "{}: named {}x{} but the image is {}x{}",
                path.display(),
                width,
                height,
                actual_width,
                actual_height
            ));
        }

        let palette: Vec<u8> = rgba
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                classify_pixel(r, g, b, a)
            })
            .collect();
        import.icons.push(Icon {
            name,
            width: actual_width,
            height: actual_height,
            data: pack_4bpp(actual_width, actual_height, &palette),
        });
    }
    Ok(import)
}

fn line_width(size: u32, base: f32) -> u32 {
    ((base * size as f32 / 120.0).round() as u32).max(1)
}

fn margin(size: u32) -> u32 {
    ((5.0 * size as f32 / 120.0).round() as u32).max(2)
}

fn point(x: f32, y: f32) -> Point {
    Point::new(x.round() as i32, y.round() as i32)
}

fn stroke(color: Rgb888, width: u32) -> PrimitiveStyle<Rgb888> {
    PrimitiveStyle::with_stroke(color, width)
}

fn ellipse(cx: f32, cy: f32, rx: f32, ry: f32) -> Ellipse {
    Ellipse::new(
        point(cx - rx, cy - ry),
        Size::new((2.0 * rx).round() as u32, (2.0 * ry).round() as u32),
    )
}

/// Cloud centred at (cx, cy) inside a `w`×`h` box: three bumps over a flat base.
fn draw_cloud(canvas: &mut IconCanvas, cx: f32, cy: f32, w: f32, h: f32, lw: u32) {
    const BUMPS: [(f32, f32, f32, f32); 3] = [
        (-0.20, -0.10, 0.28, 0.30),
        (0.05, -0.25, 0.32, 0.35),
        (0.28, -0.05, 0.24, 0.25),
    ];
    let top = cy + h * 0.05;
    let bottom = cy + h * 0.40;
    let left = cx - w * 0.45;
    let right = cx + w * 0.45;
    let fill = PrimitiveStyle::with_fill(Rgb888::WHITE);
    let bumps = BUMPS.map(|(bx, by, rx, ry)| ellipse(cx + w * bx, cy + h * by, w * rx, h * ry));

    // Solid interior first so the cloud hides whatever is behind it.
    for bump in bumps {
        bump.into_styled(fill).draw(canvas).ok();
    }
    Rectangle::with_corners(point(left, top), point(right, bottom))
        .into_styled(fill)
        .draw(canvas)
        .ok();

    let outline = PrimitiveStyleBuilder::new()
        .stroke_color(Rgb888::BLACK)
        .stroke_width(lw)
        .build();
    for bump in bumps {
        bump.into_styled(outline).draw(canvas).ok();
    }

    // Cover the bump outlines that fall inside the base.
    let pad = lw as f32;
    Rectangle::with_corners(point(left + pad, top), point(right - pad, bottom - pad))
        .into_styled(fill)
        .draw(canvas)
        .ok();

    let edges = [
        (point(left, bottom), point(right, bottom)),
        (point(left, top + h * 0.05), point(left, bottom)),
        (point(right, top + h * 0.05), point(right, bottom)),
    ];
    for (start, end) in edges {
        Line::new(start, end)
            .into_styled(stroke(Rgb888::BLACK, lw))
            .draw(canvas)
            .ok();
    }
}

/// Red ring with eight rays from 1.35 r out to `ray_outer` r.
fn draw_sun(canvas: &mut IconCanvas, cx: f32, cy: f32, radius: f32, lw: u32, ray_outer: f32) {
    let diameter = (2.0 * radius).round() as u32;
    Circle::with_center(point(cx, cy), diameter)
        .into_styled(stroke(Rgb888::RED, lw))
        .draw(canvas)
        .ok();

    for i in 0..8 {
        let (sin, cos) = (2.0 * PI * i as f32 / 8.0).sin_cos();
        let inner = point(cx + cos * radius * 1.35, cy + sin * radius * 1.35);
        let outer = point(cx + cos * radius * ray_outer, cy + sin * radius * ray_outer);
        Line::new(inner, outer)
            .into_styled(stroke(Rgb888::RED, lw))
            .draw(canvas)
            .ok();
    }
}

/// Filled red zigzag bolt between `top` and `bottom`, made of two triangles.
fn draw_lightning(canvas: &mut IconCanvas, cx: f32, top: f32, bottom: f32, width: f32) {
    let h = bottom - top;
    let tip = point(cx + width * 0.10, top);
    let upper_left = point(cx - width * 0.15, top + h * 0.45);
    let right_kink = point(cx + width * 0.15, top + h * 0.55);
    let lower_left = point(cx - width * 0.10, top + h * 0.60);
    let end = point(cx - width * 0.05, bottom);

    let fill = PrimitiveStyle::with_fill(Rgb888::RED);
    Triangle::new(tip, upper_left, right_kink)
        .into_styled(fill)
        .draw(canvas)
        .ok();
    Triangle::new(lower_left, right_kink, end)
        .into_styled(fill)
        .draw(canvas)
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn count(palette: &[u8], color: u8) -> usize {
        palette.iter().filter(|p| **p == color).count()
    }

    #[test]
    fn test_classify_pixel() {
        assert_eq!(classify_pixel(0, 0, 0, 0), WHITE);
        assert_eq!(classify_pixel(255, 0, 0, 255), RED);
        assert_eq!(classify_pixel(160, 90, 90, 255), RED);
        // Dark red fails the red test on brightness, not on hue.
        assert_eq!(classify_pixel(140, 20, 20, 255), BLACK);
        assert_eq!(classify_pixel(0, 0, 0, 255), BLACK);
        assert_eq!(classify_pixel(127, 127, 127, 255), BLACK);
        assert_eq!(classify_pixel(128, 128, 128, 255), WHITE);
        assert_eq!(classify_pixel(255, 255, 255, 255), WHITE);
    }

    #[test]
    fn test_pack_even_width() {
        let pixels = [BLACK, WHITE, RED, BLACK, WHITE, WHITE, RED, RED];
        assert_eq!(pack_4bpp(4, 2, &pixels), vec![0x01, 0x40, 0x11, 0x44]);
    }

    #[test]
    fn test_pack_odd_width_pads_each_row() {
        let pixels = [RED, BLACK, RED, BLACK, RED, BLACK];
        assert_eq!(pack_4bpp(3, 2, &pixels), vec![0x40, 0x41, 0x04, 0x01]);
    }

    #[test]
    fn test_derive_name() {
        assert_eq!(
            derive_name("clear_120x120"),
            Some(("icon_clear_large".to_string(), 120, 120))
        );
        assert_eq!(
            derive_name("partly_cloudy_40x40"),
            Some(("icon_partly_cloudy_small".to_string(), 40, 40))
        );
        assert_eq!(
            derive_name("rain_64x32"),
            Some(("icon_rain_64x32".to_string(), 64, 32))
        );
        assert_eq!(derive_name("rain"), None);
        assert_eq!(derive_name("rain_big"), None);
        assert_eq!(derive_name("_40x40"), None);
    }

    #[test]
    fn test_format_byte_array() {
        let data: Vec<u8> = (0..18).collect();
        let text = format_byte_array(&data);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  0x00, 0x01,"));
        assert!(lines[0].ends_with("0x0f,"));
        assert_eq!(lines[1], "  0x10, 0x11");

        assert_eq!(format_byte_array(&[0xab]), "  0xab");
    }

    #[test]
    fn test_render_icon_header() {
        let icon = Icon {
            name: "icon_dot_2x1".to_string(),
            width: 2,
            height: 1,
            data: vec![0x04],
        };
        let expected = "\
// Auto-generated weather icon data for e-ink display
// 7-color e-ink palette: BLACK=0, WHITE=1, GREEN=2, BLUE=3, RED=4, YELLOW=5, ORANGE=6

#ifndef WEATHER_ICONS_H
#define WEATHER_ICONS_H

#include <Arduino.h>

// icon_dot_2x1 - 2x1 pixels, 4bpp (2 pixels per byte)
const uint16_t ICON_DOT_2X1_WIDTH = 2;
const uint16_t ICON_DOT_2X1_HEIGHT = 1;
const uint8_t icon_dot_2x1[1] PROGMEM = {
  0x04
};

#endif // WEATHER_ICONS_H
";
        assert_eq!(render_icon_header(&[icon]), expected);
    }

    #[test]
    fn test_canvas_clips_out_of_bounds() {
        let mut canvas = IconCanvas::new(4, 4);
        Line::new(Point::new(-5, 1), Point::new(10, 1))
            .into_styled(stroke(Rgb888::BLACK, 1))
            .draw(&mut canvas)
            .ok();
        assert_eq!(canvas.pixel(0, 1), Some(Rgb888::BLACK));
        assert_eq!(canvas.pixel(3, 1), Some(Rgb888::BLACK));
        assert_eq!(canvas.pixel(0, 0), Some(Rgb888::WHITE));
        assert_eq!(canvas.pixel(4, 1), None);
    }

    #[test]
    fn test_sun_is_red_and_cloud_is_black() {
        let clear = IconKind::Clear.draw(LARGE).to_palette();
        assert!(count(&clear, RED) > 0);
        assert_eq!(count(&clear, BLACK), 0);

        let cloudy = IconKind::Cloudy.draw(LARGE).to_palette();
        assert!(count(&cloudy, BLACK) > 0);
        assert_eq!(count(&cloudy, RED), 0);

        let storm = IconKind::Thunderstorm.draw(SMALL).to_palette();
        assert!(count(&storm, BLACK) > 0);
        assert!(count(&storm, RED) > 0);
    }

    #[test]
    fn test_every_icon_draws_something() {
        for kind in IconKind::ALL {
            for size in [LARGE, SMALL] {
                let palette = kind.draw(size).to_palette();
                assert_eq!(palette.len(), (size * size) as usize);
                assert!(
                    count(&palette, WHITE) < palette.len(),
                    "{} at {} is blank",
                    kind.name(),
                    size
                );
            }
        }
    }

    #[test]
    fn test_generate_all() {
        let icons = generate_all();
        assert_eq!(icons.len(), 16);
        assert_eq!(icons[0].name, "icon_clear_large");
        assert_eq!(icons[1].name, "icon_clear_small");
        assert_eq!(icons[15].name, "icon_thunderstorm_small");
        for icon in &icons {
            let expected = if icon.width == LARGE { 60 * 120 } else { 20 * 40 };
            assert_eq!(icon.data.len(), expected, "{}", icon.name);
        }

        let header = render_icon_header(&icons);
        assert!(header.contains("const uint8_t icon_partly_cloudy_large[7200] PROGMEM = {"));
        assert!(header.contains("const uint16_t ICON_SNOW_SMALL_WIDTH = 40;"));
    }

    #[test]
    fn test_load_png_dir_packs_odd_width() {
        let dir = TempDir::new().unwrap();
        let dot = image::RgbaImage::from_fn(3, 2, |x, y| match (x, y) {
            (0, 0) | (2, 1) => image::Rgba([255, 0, 0, 255]),
            (2, 0) => image::Rgba([0, 0, 0, 0]),
            _ => image::Rgba([0, 0, 0, 255]),
        });
        dot.save(dir.path().join("dot_3x2.png")).unwrap();
        // Named 4x4 but really 3x1.
        image::RgbaImage::from_pixel(3, 1, image::Rgba([255, 255, 255, 255]))
            .save(dir.path().join("bar_4x4.png"))
            .unwrap();
        fs::write(dir.path().join("notes.png"), b"not an image").unwrap();
        fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();

        let import = load_png_dir(dir.path()).unwrap();
        assert_eq!(import.icons.len(), 2);

        let bar = &import.icons[0];
        assert_eq!(bar.name, "icon_bar_4x4");
        assert_eq!((bar.width, bar.height), (3, 1));
        assert_eq!(bar.data, vec![0x11, 0x11]);

        let dot = &import.icons[1];
        assert_eq!(dot.name, "icon_dot_3x2");
        assert_eq!((dot.width, dot.height), (3, 2));
        assert_eq!(dot.data, vec![0x40, 0x11, 0x00, 0x41]);

        assert_eq!(import.warnings.len(), 2);
        assert!(import.warnings[0].contains("named 4x4 but the image is 3x1"));
        assert!(import.warnings[1].contains("notes.png"));
    }

    #[test]
    fn test_exported_pngs_convert_back_to_the_same_header() {
        let dir = TempDir::new().unwrap();
        let written = write_pngs(dir.path()).unwrap();
        assert_eq!(written.len(), 16);
        assert!(dir.path().join("fog_40x40.png").is_file());

        let import = load_png_dir(dir.path()).unwrap();
        assert!(import.warnings.is_empty());
        assert_eq!(
            render_icon_header(&import.icons),
            render_icon_header(&generate_all())
        );
    }

    #[test]
    fn test_load_png_dir_reports_corrupt_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("rain_40x40.png"), b"not an image").unwrap();
        let err = load_png_dir(dir.path()).unwrap_err();
        assert!(matches!(err, IconError::Image { .. }));
        assert!(err.to_string().contains("rain_40x40.png"));
    }
}
