//! Rasterizing a [`ChartSpec`] into a PNG.
//!
//! The figure is 6.4 x 4.8 inches at the configured DPI. Marks, axes frames
//! and wedges are drawn; text is not.

use super::spec::{ChartKind, ChartSpec, Panel, Series};
use super::CancelFlag;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgb, RgbImage};
use ragchart_core::{AppError, AppResult};
use std::f64::consts::TAU;

pub const FIGURE_WIDTH_IN: f64 = 6.4;
pub const FIGURE_HEIGHT_IN: f64 = 4.8;
pub const MAX_DPI: u32 = 600;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const FRAME: Rgb<u8> = Rgb([0, 0, 0]);

/// matplotlib's default color cycle.
const PALETTE: [Rgb<u8>; 10] = [
    Rgb([0x1f, 0x77, 0xb4]),
    Rgb([0xff, 0x7f, 0x0e]),
    Rgb([0x2c, 0xa0, 0x2c]),
    Rgb([0xd6, 0x27, 0x28]),
    Rgb([0x94, 0x67, 0xbd]),
    Rgb([0x8c, 0x56, 0x4b]),
    Rgb([0xe3, 0x77, 0xc2]),
    Rgb([0x7f, 0x7f, 0x7f]),
    Rgb([0xbc, 0xbd, 0x22]),
    Rgb([0x17, 0xbe, 0xcf]),
];

fn color(i: usize) -> Rgb<u8> {
    PALETTE[i % PALETTE.len()]
}

fn reject(msg: impl std::fmt::Display) -> AppError {
    AppError::Sandbox(msg.to_string())
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl Rect {
    fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Shrink by fractions of the width and height.
    fn inset(&self, left: f64, right: f64, top: f64, bottom: f64) -> Rect {
        Rect {
            x0: self.x0 + self.width() * left,
            x1: self.x1 - self.width() * right,
            y0: self.y0 + self.height() * top,
            y1: self.y1 - self.height() * bottom,
        }
    }
}

/// Linear map from data space onto a pixel span.
#[derive(Debug, Clone, Copy)]
struct Scale {
    lo: f64,
    hi: f64,
    from: f64,
    to: f64,
}

impl Scale {
    fn new(lo: f64, hi: f64, from: f64, to: f64) -> Self {
        let (lo, hi) = if (hi - lo).abs() < f64::EPSILON {
            (lo - 1.0, hi + 1.0)
        } else {
            let pad = (hi - lo) * 0.05;
            (lo - pad, hi + pad)
        };
        Self { lo, hi, from, to }
    }

    fn map(&self, v: f64) -> f64 {
        self.from + (v - self.lo) / (self.hi - self.lo) * (self.to - self.from)
    }
}

struct Canvas {
    img: RgbImage,
    line_width: f64,
    marker_radius: f64,
    frame_width: f64,
}

impl Canvas {
    fn new(width: u32, height: u32, dpi: u32) -> Self {
        let points = dpi as f64 / 72.0;
        Self {
            img: RgbImage::from_pixel(width, height, WHITE),
            line_width: (1.5 * points).max(1.0),
            marker_radius: (3.0 * points).max(1.0),
            frame_width: (0.8 * points).max(1.0),
        }
    }

    fn fill_rect(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, c: Rgb<u8>) {
        let (w, h) = (self.img.width() as f64, self.img.height() as f64);
        let xa = x0.min(x1).round().clamp(0.0, w) as u32;
        let xb = x0.max(x1).round().clamp(0.0, w) as u32;
        let ya = y0.min(y1).round().clamp(0.0, h) as u32;
        let yb = y0.max(y1).round().clamp(0.0, h) as u32;
        for y in ya..yb {
            for x in xa..xb {
                self.img.put_pixel(x, y, c);
            }
        }
    }

    fn fill_circle(&mut self, cx: f64, cy: f64, r: f64, c: Rgb<u8>) {
        let r2 = r * r;
        let (w, h) = (self.img.width() as i64, self.img.height() as i64);
        let (xa, xb) = ((cx - r).floor() as i64, (cx + r).ceil() as i64);
        let (ya, yb) = ((cy - r).floor() as i64, (cy + r).ceil() as i64);
        for y in ya.max(0)..yb.min(h) {
            for x in xa.max(0)..xb.min(w) {
                let (dx, dy) = (x as f64 + 0.5 - cx, y as f64 + 0.5 - cy);
                if dx * dx + dy * dy <= r2 {
                    self.img.put_pixel(x as u32, y as u32, c);
                }
            }
        }
    }

    fn line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, c: Rgb<u8>) {
        let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = from.0 + (to.0 - from.0) * t;
            let y = from.1 + (to.1 - from.1) * t;
            self.fill_circle(x, y, width / 2.0, c);
        }
    }

    fn frame(&mut self, area: Rect) {
        let w = self.frame_width;
        self.fill_rect(area.x0 - w / 2.0, area.y0 - w / 2.0, area.x1 + w / 2.0, area.y0 + w / 2.0, FRAME);
        self.fill_rect(area.x0 - w / 2.0, area.y1 - w / 2.0, area.x1 + w / 2.0, area.y1 + w / 2.0, FRAME);
        self.fill_rect(area.x0 - w / 2.0, area.y0 - w / 2.0, area.x0 + w / 2.0, area.y1 + w / 2.0, FRAME);
        self.fill_rect(area.x1 - w / 2.0, area.y0 - w / 2.0, area.x1 + w / 2.0, area.y1 + w / 2.0, FRAME);
    }
}

/// Pixel dimensions of the figure at `dpi`.
pub fn figure_size(dpi: u32) -> (u32, u32) {
    (
        (FIGURE_WIDTH_IN * dpi as f64).round() as u32,
        (FIGURE_HEIGHT_IN * dpi as f64).round() as u32,
    )
}

/// Draw `spec` onto a white canvas, checking `cancel` before each series.
pub fn rasterize(spec: &ChartSpec, dpi: u32, cancel: &CancelFlag) -> AppResult<RgbImage> {
    if dpi == 0 || dpi > MAX_DPI {
        return Err(AppError::Config(format!(
            "chart dpi must be between 1 and {}, got {}",
            MAX_DPI, dpi
        )));
    }
    if spec.is_empty() {
        return Err(reject("figure is empty"));
    }

    let (width, height) = figure_size(dpi);
    let mut canvas = Canvas::new(width, height, dpi);

    let rows = spec.rows.max(1);
    let cols = spec.cols.max(1);
    let top = if spec.title.is_some() { height as f64 * 0.06 } else { 0.0 };
    let cell_w = width as f64 / cols as f64;
    let cell_h = (height as f64 - top) / rows as f64;

    for (i, panel) in spec.panels.iter().enumerate().take(rows * cols) {
        let (r, c) = (i / cols, i % cols);
        let cell = Rect {
            x0: c as f64 * cell_w,
            y0: top + r as f64 * cell_h,
            x1: (c + 1) as f64 * cell_w,
            y1: top + (r + 1) as f64 * cell_h,
        };
        cancel.check()?;
        draw_panel(&mut canvas, panel, cell.inset(0.125, 0.1, 0.12, 0.11), cancel)?;
    }

    Ok(canvas.img)
}

/// PNG-encode an image and return it as standard base64.
pub fn encode_png_base64(img: &RgbImage) -> AppResult<String> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
        .map_err(|e| AppError::Chart(format!("PNG encoding failed: {}", e)))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn draw_panel(canvas: &mut Canvas, panel: &Panel, area: Rect, cancel: &CancelFlag) -> AppResult<()> {
    let Some(first) = panel.series.iter().find(|s| s.points() > 0) else {
        canvas.frame(area);
        return Ok(());
    };

    match first.kind {
        ChartKind::Pie => draw_pie(canvas, first, area),
        ChartKind::HorizontalBar => {
            let bars: Vec<&Series> = panel
                .series
                .iter()
                .filter(|s| s.kind == ChartKind::HorizontalBar)
                .collect();
            draw_horizontal_bars(canvas, &bars, area, cancel)?;
            canvas.frame(area);
            Ok(())
        }
        _ => {
            let series: Vec<&Series> = panel
                .series
                .iter()
                .filter(|s| !matches!(s.kind, ChartKind::Pie | ChartKind::HorizontalBar))
                .collect();
            draw_cartesian(canvas, &series, area, cancel)?;
            canvas.frame(area);
            Ok(())
        }
    }
}

/// Heights drawn for a bar-like series: values, or bin counts for histograms.
fn bar_heights(series: &Series) -> Vec<f64> {
    match series.kind {
        ChartKind::Histogram => histogram(&series.values, series.bins.unwrap_or(10)),
        _ => series.values.clone(),
    }
}

fn histogram(values: &[f64], bins: usize) -> Vec<f64> {
    let bins = bins.max(1);
    let mut counts = vec![0.0; bins];
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if !lo.is_finite() {
        return counts;
    }

    let span = hi - lo;
    for v in values {
        let i = if span > 0.0 {
            (((v - lo) / span) * bins as f64) as usize
        } else {
            bins / 2
        };
        counts[i.min(bins - 1)] += 1.0;
    }
    counts
}

fn value_range<'a>(values: impl Iterator<Item = &'a f64>, include_zero: bool) -> (f64, f64) {
    let init = if include_zero {
        (0.0, 0.0)
    } else {
        (f64::INFINITY, f64::NEG_INFINITY)
    };
    let (lo, hi) = values.fold(init, |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if lo.is_finite() {
        (lo, hi)
    } else {
        (0.0, 1.0)
    }
}

fn draw_cartesian(
    canvas: &mut Canvas,
    series: &[&Series],
    area: Rect,
    cancel: &CancelFlag,
) -> AppResult<()> {
    let bar_like: Vec<(usize, Vec<f64>, bool)> = series
        .iter()
        .enumerate()
        .filter(|(_, s)| matches!(s.kind, ChartKind::Bar | ChartKind::Histogram))
        .map(|(i, s)| (i, bar_heights(s), s.kind == ChartKind::Histogram))
        .collect();
    let marks: Vec<(usize, &Series)> = series
        .iter()
        .enumerate()
        .filter(|(_, s)| matches!(s.kind, ChartKind::Line | ChartKind::Scatter))
        .map(|(i, s)| (i, *s))
        .collect();

    let categorical = !bar_like.is_empty() || marks.iter().any(|(_, s)| s.xs.is_none());

    let all_y = bar_like
        .iter()
        .flat_map(|(_, h, _)| h.iter())
        .chain(marks.iter().flat_map(|(_, s)| s.values.iter()));
    let (y_lo, y_hi) = value_range(all_y, !bar_like.is_empty());
    let y_scale = Scale::new(y_lo, y_hi, area.y1, area.y0);

    let slots = bar_like
        .iter()
        .map(|(_, h, _)| h.len())
        .chain(marks.iter().map(|(_, s)| s.values.len()))
        .max()
        .unwrap_or(1)
        .max(1);
    let slot_w = area.width() / slots as f64;

    let slot_center = |i: usize| area.x0 + slot_w * (i as f64 + 0.5);

    let bar_groups = bar_like.len().max(1);
    for (group, (i, heights, is_hist)) in bar_like.iter().enumerate() {
        cancel.check()?;
        let c = color(*i);
        let (bar_w, offset) = if *is_hist {
            (slot_w, -slot_w / 2.0)
        } else {
            let w = slot_w * 0.8 / bar_groups as f64;
            (w, -slot_w * 0.4 + w * group as f64)
        };
        for (k, h) in heights.iter().enumerate() {
            let left = slot_center(k) + offset;
            let right = left + bar_w - if *is_hist { 1.0 } else { 0.0 };
            canvas.fill_rect(left, y_scale.map(0.0), right, y_scale.map(*h), c);
        }
    }

    let x_scale = if categorical {
        None
    } else {
        let xs = marks.iter().flat_map(|(_, s)| s.xs.iter().flatten());
        let (lo, hi) = value_range(xs, false);
        Some(Scale::new(lo, hi, area.x0, area.x1))
    };

    for (i, s) in &marks {
        cancel.check()?;
        let c = color(*i);
        let points: Vec<(f64, f64)> = s
            .values
            .iter()
            .enumerate()
            .map(|(k, v)| {
                let x = match (&x_scale, &s.xs) {
                    (Some(scale), Some(xs)) => scale.map(xs[k]),
                    _ => slot_center(k),
                };
                (x, y_scale.map(*v))
            })
            .collect();

        match s.kind {
            ChartKind::Line => {
                for pair in points.windows(2) {
                    canvas.line(pair[0], pair[1], canvas.line_width, c);
                }
                if let [only] = points.as_slice() {
                    canvas.fill_circle(only.0, only.1, canvas.line_width, c);
                }
            }
            _ => {
                for (x, y) in points {
                    canvas.fill_circle(x, y, canvas.marker_radius, c);
                }
            }
        }
    }
    Ok(())
}

fn draw_horizontal_bars(
    canvas: &mut Canvas,
    series: &[&Series],
    area: Rect,
    cancel: &CancelFlag,
) -> AppResult<()> {
    let (lo, hi) = value_range(series.iter().flat_map(|s| s.values.iter()), true);
    let x_scale = Scale::new(lo, hi, area.x0, area.x1);

    let slots = series.iter().map(|s| s.values.len()).max().unwrap_or(1).max(1);
    let slot_h = area.height() / slots as f64;
    let bar_h = slot_h * 0.8 / series.len().max(1) as f64;

    for (group, s) in series.iter().enumerate() {
        cancel.check()?;
        let c = color(group);
        for (k, v) in s.values.iter().enumerate() {
            // First category at the bottom.
            let center = area.y1 - slot_h * (k as f64 + 0.5);
            let top = center - slot_h * 0.4 + bar_h * group as f64;
            canvas.fill_rect(x_scale.map(0.0), top, x_scale.map(*v), top + bar_h, c);
        }
    }
    Ok(())
}

fn draw_pie(canvas: &mut Canvas, series: &Series, area: Rect) -> AppResult<()> {
    let total: f64 = series.values.iter().sum();
    if total <= 0.0 {
        return Err(reject("pie values sum to zero"));
    }

    let bounds: Vec<f64> = series
        .values
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v / total;
            Some(*acc)
        })
        .collect();

    let cx = (area.x0 + area.x1) / 2.0;
    let cy = (area.y0 + area.y1) / 2.0;
    let r = area.width().min(area.height()) * 0.5;
    let (w, h) = (canvas.img.width() as i64, canvas.img.height() as i64);

    for y in ((cy - r).floor() as i64).max(0)..((cy + r).ceil() as i64).min(h) {
        for x in ((cx - r).floor() as i64).max(0)..((cx + r).ceil() as i64).min(w) {
            let dx = x as f64 + 0.5 - cx;
            let dy = cy - (y as f64 + 0.5);
            if dx * dx + dy * dy > r * r {
                continue;
            }
            // Counter-clockwise from three o'clock.
            let fraction = dy.atan2(dx).rem_euclid(TAU) / TAU;
            let wedge = bounds
                .iter()
                .position(|b| fraction < *b)
                .unwrap_or(bounds.len().saturating_sub(1));
            canvas.img.put_pixel(x as u32, y as u32, color(wedge));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar_spec() -> ChartSpec {
        let mut spec = ChartSpec::default();
        spec.panels[0].series.push(Series::new(
            ChartKind::Bar,
            vec!["A".into(), "B".into()],
            vec![1.0, 2.0],
        ));
        spec
    }

    fn count_color(img: &RgbImage, c: Rgb<u8>) -> usize {
        img.pixels().filter(|p| **p == c).count()
    }

    #[test]
    fn test_figure_size_follows_dpi() {
        assert_eq!(figure_size(100), (640, 480));
        assert_eq!(figure_size(200), (1280, 960));
        let img = rasterize(&bar_spec(), 50, &CancelFlag::default()).unwrap();
        assert_eq!((img.width(), img.height()), (320, 240));
    }

    #[test]
    fn test_taller_bar_has_more_pixels() {
        let img = rasterize(&bar_spec(), 50, &CancelFlag::default()).unwrap();
        let bar_pixels = count_color(&img, PALETTE[0]);
        assert!(bar_pixels > 0);

        let mut single = ChartSpec::default();
        single.panels[0].series.push(Series::new(
            ChartKind::Bar,
            vec!["A".into(), "B".into()],
            vec![2.0, 2.0],
        ));
        let full = rasterize(&single, 50, &CancelFlag::default()).unwrap();
        assert!(count_color(&full, PALETTE[0]) > bar_pixels);
    }

    #[test]
    fn test_pie_uses_one_color_per_wedge() {
        let mut spec = ChartSpec::default();
        spec.panels[0].series.push(Series::new(
            ChartKind::Pie,
            Vec::new(),
            vec![1.0, 1.0, 2.0],
        ));
        let img = rasterize(&spec, 50, &CancelFlag::default()).unwrap();
        let a = count_color(&img, PALETTE[0]);
        let c = count_color(&img, PALETTE[2]);
        assert!(a > 0);
        assert!(c > a);
    }

    #[test]
    fn test_line_and_scatter_draw() {
        let mut spec = ChartSpec::default();
        spec.panels[0]
            .series
            .push(Series::new(ChartKind::Line, Vec::new(), vec![1.0, 3.0, 2.0]).with_xs(vec![0.0, 1.0, 2.0]));
        spec.panels[0]
            .series
            .push(Series::new(ChartKind::Scatter, Vec::new(), vec![2.0, 2.5]).with_xs(vec![0.5, 1.5]));
        let img = rasterize(&spec, 50, &CancelFlag::default()).unwrap();
        assert!(count_color(&img, PALETTE[0]) > 0);
        assert!(count_color(&img, PALETTE[1]) > 0);
    }

    #[test]
    fn test_histogram_counts() {
        assert_eq!(histogram(&[1.0, 2.0, 2.0, 3.0], 3), vec![1.0, 2.0, 1.0]);
        assert_eq!(histogram(&[5.0, 5.0], 4), vec![0.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            rasterize(&ChartSpec::default(), 100, &CancelFlag::default()),
            Err(AppError::Sandbox(_))
        ));
        assert!(matches!(
            rasterize(&bar_spec(), 0, &CancelFlag::default()),
            Err(AppError::Config(_))
        ));

        let mut zero_pie = ChartSpec::default();
        zero_pie.panels[0]
            .series
            .push(Series::new(ChartKind::Pie, Vec::new(), vec![0.0, 0.0]));
        assert!(matches!(
            rasterize(&zero_pie, 50, &CancelFlag::default()),
            Err(AppError::Sandbox(_))
        ));
    }

    #[test]
    fn test_cancelled_raster_stops() {
        let cancel = CancelFlag::default();
        cancel.cancel();
        assert!(matches!(
            rasterize(&bar_spec(), 50, &cancel),
            Err(AppError::Sandbox(_))
        ));
    }

    #[test]
    fn test_png_base64() {
        let img = rasterize(&bar_spec(), 20, &CancelFlag::default()).unwrap();
        let encoded = encode_png_base64(&img).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }
}
