//! Plot renderer - draws render states with plotters into RGB buffers.
//!
//! Each frame is a 3D cartesian chart over the state's view bounds, seen
//! from the state's elevation (pitch) and azimuth (yaw), with one circle
//! series per draw batch. Data `z` is the vertical axis. The title sits in
//! a band above the chart, written with a 3x5 block font whose size follows
//! the frame width and shrinks until the title fits 90% of it.

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::Color as PlottersColor;
use plotters_bitmap::BitMapBackendError;

use pca3d_core::bounds::Bounds;
use pca3d_core::pipeline::{Frame, FrameRenderer, RenderSettings};
use pca3d_core::state::{Color, DrawBatch, Style};
use pca3d_core::{RenderState, Result, VisError};

type PlotResult = std::result::Result<(), DrawingAreaErrorKind<BitMapBackendError>>;

/// Default point colour.
const DEFAULT_COLOR: RGBColor = RGBColor(31, 119, 180);

/// Default point area in points squared.
const DEFAULT_SIZE: f64 = 20.0;

/// Title height at the reference width, in pixels.
const TITLE_HEIGHT_AT_REFERENCE: f64 = 80.0;
const REFERENCE_WIDTH: f64 = 1920.0;

/// Renders frames with plotters' bitmap backend.
#[derive(Debug, Clone)]
pub struct PlotRenderer {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
}

impl PlotRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: WHITE,
        }
    }

    pub fn for_settings(settings: &RenderSettings) -> Self {
        Self::new(settings.width, settings.height)
    }

    /// Height of the band reserved for the title.
    fn title_band(&self) -> u32 {
        (GLYPH_ROWS + 2) * base_title_scale(self.width)
    }

    fn draw(&self, area: &DrawingArea<BitMapBackend<'_>, Shift>, state: &RenderState) -> PlotResult {
        area.fill(&self.background)?;
        let (title_area, plot_area) = area.split_vertically(self.title_band() as i32);
        draw_title(&title_area, &state.title, self.width)?;

        let bounds = &state.view_bounds;
        let mut chart = ChartBuilder::on(&plot_area)
            .margin(4)
            .build_cartesian_3d(axis_range(bounds, 0), axis_range(bounds, 2), axis_range(bounds, 1))?;
        chart.with_projection(|mut pb| {
            pb.pitch = state.rotation.elevation.to_radians();
            pb.yaw = state.rotation.azimuth.to_radians();
            pb.scale = 0.8;
            pb.into_matrix()
        });
        chart.configure_axes().draw()?;

        let scale = self.height.min(self.width) as f64 / 480.0;
        for batch in state.draw_batches() {
            let alpha = batch.style.alpha.unwrap_or(1.0).clamp(0.0, 1.0);
            if alpha <= 0.0 {
                continue;
            }
            let size = batch.style.size.unwrap_or(DEFAULT_SIZE).max(0.0);
            let radius = ((size.sqrt() / 2.0 * scale).round() as i32).max(1);
            let colors = batch_colors(&batch);

            chart.draw_series(batch.points.row_iter().zip(colors).map(|(row, color)| {
                let (rgb, a) = color;
                Circle::new((row[0], row[2], row[1]), radius, rgb.mix(a * alpha).filled())
            }))?;
        }
        Ok(())
    }
}

impl FrameRenderer for PlotRenderer {
    fn render(&self, state: &RenderState) -> Result<Frame> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut rgb = vec![0u8; w * h * 3];
        {
            let backend = BitMapBackend::with_buffer(&mut rgb, (self.width, self.height));
            let area = backend.into_drawing_area();
            self.draw(&area, state)
                .and_then(|_| area.present())
                .map_err(|e| VisError::Render(format!("{:?}", e)))?;
        }

        let rgba = rgb.chunks_exact(3).flat_map(|p| [p[0], p[1], p[2], 255]).collect();
        Frame::new(self.width, self.height, rgba)
    }
}

/// Chart range of one axis; empty ranges are widened so the chart stays valid.
fn axis_range(bounds: &Bounds, axis: usize) -> std::ops::Range<f64> {
    let (lo, hi) = (bounds.min(axis), bounds.max(axis));
    if (hi - lo).abs() > f64::EPSILON && lo.is_finite() && hi.is_finite() {
        lo..hi
    } else if lo.is_finite() {
        lo - 0.5..lo + 0.5
    } else {
        -0.5..0.5
    }
}

/// Colour and alpha of every point of a batch.
fn batch_colors(batch: &DrawBatch) -> Vec<(RGBColor, f64)> {
    let n = batch.points.nrows();
    match &batch.style.color {
        Some(Color::Solid([r, g, b, a])) => vec![(rgb_of(*r, *g, *b), a.clamp(0.0, 1.0)); n],
        Some(Color::Values(values)) => {
            let (vmin, vmax) = value_range(&batch.style, values);
            let colormap = batch.style.colormap.as_deref().unwrap_or("viridis");
            values
                .iter()
                .map(|&v| (colormap_color(colormap, v, vmin, vmax), 1.0))
                .collect()
        }
        None => vec![(DEFAULT_COLOR, 1.0); n],
    }
}

fn rgb_of(r: f64, g: f64, b: f64) -> RGBColor {
    let channel = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    RGBColor(channel(r), channel(g), channel(b))
}

fn value_range(style: &Style, values: &[f64]) -> (f64, f64) {
    match style.norm {
        Some(norm) => (norm.vmin, norm.vmax),
        None => {
            let finite = values.iter().copied().filter(|v| v.is_finite());
            let vmin = finite.clone().fold(f64::INFINITY, f64::min);
            let vmax = finite.fold(f64::NEG_INFINITY, f64::max);
            if vmin <= vmax {
                (vmin, vmax)
            } else {
                (0.0, 1.0)
            }
        }
    }
}

/// Colour of `value` under a named colormap over `[vmin, vmax]`.
///
/// `set1`, `tab10` and `palette` are qualitative: each integer step above
/// `vmin` picks the next palette entry. Unknown names use viridis.
pub fn colormap_color(name: &str, value: f64, vmin: f64, vmax: f64) -> RGBColor {
    let hi = if vmax > vmin { vmax } else { vmin + 1.0 };
    let v = if value.is_finite() { value.clamp(vmin, hi) } else { vmin };
    let (v, lo, hi) = (v as f32, vmin as f32, hi as f32);

    match name.to_ascii_lowercase().as_str() {
        "set1" | "tab10" | "palette" => {
            let c = Palette99::pick((v - lo).round() as usize).to_rgba();
            RGBColor(c.0, c.1, c.2)
        }
        "gray" | "grey" | "binary" => BlackWhite.get_color_normalized(v, lo, hi),
        "bone" => Bone.get_color_normalized(v, lo, hi),
        "copper" => Copper.get_color_normalized(v, lo, hi),
        _ => ViridisRGB.get_color_normalized(v, lo, hi),
    }
}

// ============================================================================
// TITLE
// ============================================================================

const GLYPH_ROWS: u32 = 5;
const GLYPH_ADVANCE: u32 = 4;

/// Block size of the title font before any shrinking.
fn base_title_scale(width: u32) -> u32 {
    let height = width as f64 * TITLE_HEIGHT_AT_REFERENCE / REFERENCE_WIDTH;
    ((height / GLYPH_ROWS as f64).round() as u32).max(1)
}

fn title_width(chars: usize, scale: u32) -> u32 {
    (chars as u32 * GLYPH_ADVANCE).saturating_sub(1) * scale
}

/// Block size for `title`: the base size, shrunk until the title fits 90%
/// of the frame width (never below one pixel).
pub fn title_scale(width: u32, title: &str) -> u32 {
    let chars = title.chars().count();
    let limit = 0.9 * width as f64;
    let mut scale = base_title_scale(width);
    while scale > 1 && title_width(chars, scale) as f64 > limit {
        scale -= 1;
    }
    scale
}

fn draw_title(area: &DrawingArea<BitMapBackend<'_>, Shift>, title: &str, width: u32) -> PlotResult {
    if title.is_empty() {
        return Ok(());
    }
    let scale = title_scale(width, title);
    let (band_w, band_h) = area.dim_in_pixel();
    let text_w = title_width(title.chars().count(), scale);
    let x0 = (band_w.saturating_sub(text_w) / 2) as i32;
    let y0 = (band_h.saturating_sub(GLYPH_ROWS * scale) / 2) as i32;
    let s = scale as i32;

    for (i, ch) in title.chars().enumerate() {
        let left = x0 + (i as u32 * GLYPH_ADVANCE) as i32 * s;
        for (row, bits) in glyph_bits(ch.to_ascii_uppercase()).iter().enumerate() {
            for col in 0..3 {
                if (bits >> (2 - col)) & 1 == 1 {
                    let x = left + col * s;
                    let y = y0 + row as i32 * s;
                    area.draw(&Rectangle::new([(x, y), (x + s - 1, y + s - 1)], BLACK.filled()))?;
                }
            }
        }
    }
    Ok(())
}

const fn glyph_bits(ch: char) -> [u8; 5] {
    match ch {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b111, 0b100, 0b100, 0b100, 0b111],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b111, 0b100, 0b101, 0b101, 0b111],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b111],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b111, 0b101, 0b101, 0b101, 0b111],
        'P' => [0b111, 0b101, 0b111, 0b100, 0b100],
        'Q' => [0b111, 0b101, 0b101, 0b111, 0b011],
        'R' => [0b111, 0b101, 0b111, 0b110, 0b101],
        'S' => [0b111, 0b100, 0b111, 0b001, 0b111],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '>' => [0b100, 0b010, 0b001, 0b010, 0b100],
        '<' => [0b001, 0b010, 0b100, 0b010, 0b001],
        '(' => [0b010, 0b100, 0b100, 0b100, 0b010],
        ')' => [0b010, 0b001, 0b001, 0b001, 0b010],
        '+' => [0b000, 0b010, 0b111, 0b010, 0b000],
        '=' => [0b000, 0b111, 0b000, 0b111, 0b000],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        '\'' => [0b010, 0b010, 0b000, 0b000, 0b000],
        '!' => [0b010, 0b010, 0b010, 0b000, 0b010],
        '?' => [0b111, 0b001, 0b010, 0b000, 0b010],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        ' ' => [0b000, 0b000, 0b000, 0b000, 0b000],
        _ => [0b111, 0b101, 0b010, 0b000, 0b010],
    }
}
