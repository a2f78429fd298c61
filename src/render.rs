use std::fs;
use std::io::{self, Write};
use std::ops::Range;
use std::path::Path;

use plotters::coord::Shift;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;

use crate::config::{OutputConfig, OutputMode};
use crate::error::{ChainsError, Result};
use crate::palette::Palette;
use crate::History;

/// Figure inches per generation (horizontal) and per individual (vertical).
const INCHES_PER_GENERATION: f64 = 1.0;
const INCHES_PER_INDIVIDUAL: f64 = 1.5;
/// Share of the figure height given to the lineage panel (3:1 split).
const LINEAGE_SHARE: f64 = 0.75;
/// Largest figure, in pixels, a run may render.
pub const MAX_FIGURE_PIXELS: f64 = 1e8;

/// Pixel count of the figure for a run of this size.
pub fn figure_pixels(population_size: usize, generations: usize, dpi: u32) -> f64 {
    let dpi = dpi as f64;
    (generations as f64 * INCHES_PER_GENERATION * dpi)
        * (population_size as f64 * INCHES_PER_INDIVIDUAL * dpi)
}

// ── Options ───────────────────────────────────────────────────────────────────

/// Drawing knobs. Lengths without a unit suffix are in data units; `_pt`
/// lengths are typographic points scaled by `dpi / 72`.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderOptions {
    pub dpi: u32,
    pub shorten_edges: bool,
    pub annotate: bool,
    pub circle_radius: f64,
    pub head_length: f64,
    pub head_width: f64,
    /// Fraction of the head length swept back at the wings (0 = triangle).
    pub overhang: f64,
    pub arrow_alpha: f64,
    pub outline_pt: f64,
    pub arrow_pt: f64,
    pub trajectory_pt: f64,
    pub marker_pt: f64,
    pub font_pt: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi: 300,
            shorten_edges: false,
            annotate: true,
            circle_radius: 0.2,
            head_length: 0.1,
            head_width: 0.1,
            overhang: 0.3,
            arrow_alpha: 0.6,
            outline_pt: 1.0,
            arrow_pt: 1.0,
            trajectory_pt: 3.0,
            marker_pt: 5.0,
            font_pt: 10.0,
        }
    }
}

impl RenderOptions {
    fn px(&self, points: f64) -> f64 {
        points * self.dpi as f64 / 72.0
    }

    fn stroke_px(&self, points: f64) -> u32 {
        (self.px(points).round() as u32).max(1)
    }
}

// ── Layout ────────────────────────────────────────────────────────────────────

/// Pixel geometry of both panels and the data ranges they show.
#[derive(Clone, Debug, PartialEq)]
pub struct FigureLayout {
    pub width: u32,
    pub height: u32,
    pub lineage_height: u32,
    pub margin: u32,
    pub y_label_area: u32,
    pub x_label_area: u32,
    /// Pixels per data unit in the lineage panel, equal on both axes.
    pub px_per_unit: f64,
    pub lineage_x: Range<f64>,
    pub lineage_y: Range<f64>,
    pub trajectory_x: Range<f64>,
    pub trajectory_y: Range<f64>,
}

impl FigureLayout {
    pub fn new(population_size: usize, generations: usize, options: &RenderOptions) -> Self {
        let dpi = options.dpi as f64;
        let width = ((generations as f64 * INCHES_PER_GENERATION * dpi).round() as u32).max(1);
        let height =
            ((population_size as f64 * INCHES_PER_INDIVIDUAL * dpi).round() as u32).max(2);
        let lineage_height = ((height as f64 * LINEAGE_SHARE).round() as u32).clamp(1, height - 1);

        let margin = options.px(6.0).round() as u32;
        let (y_label_area, x_label_area) = if options.annotate {
            (
                options.px(4.5 * options.font_pt).round() as u32,
                options.px(3.5 * options.font_pt).round() as u32,
            )
        } else {
            (0, 0)
        };

        let plot_w = width.saturating_sub(2 * margin + y_label_area).max(1) as f64;
        let plot_h = lineage_height.saturating_sub(2 * margin).max(1) as f64;
        let (lineage_x, lineage_y, px_per_unit) = equal_aspect(
            (plot_w, plot_h),
            -0.5..generations as f64 - 0.5,
            -0.5..population_size as f64 - 0.5,
        );

        Self {
            width,
            height,
            lineage_height,
            margin,
            y_label_area,
            x_label_area,
            px_per_unit,
            trajectory_x: lineage_x.clone(),
            lineage_x,
            lineage_y,
            trajectory_y: 0.0..1.0,
        }
    }

    pub fn for_history(history: &History, options: &RenderOptions) -> Self {
        Self::new(history.population_size(), history.generations(), options)
    }

    fn to_px(&self, length: f64) -> u32 {
        ((length * self.px_per_unit).round() as u32).max(1)
    }
}

/// Widens whichever data range is short so one data unit spans the same
/// number of pixels on both axes. Returns the ranges and pixels per unit.
pub fn equal_aspect(
    plot_px: (f64, f64),
    x: Range<f64>,
    y: Range<f64>,
) -> (Range<f64>, Range<f64>, f64) {
    let (w, h) = plot_px;
    let unit = (w / (x.end - x.start)).min(h / (y.end - y.start));
    let widen = |r: Range<f64>, px: f64| {
        let mid = (r.start + r.end) / 2.0;
        let half = px / unit / 2.0;
        (mid - half)..(mid + half)
    };
    (widen(x, w), widen(y, h), unit)
}

// ── Arrow geometry ────────────────────────────────────────────────────────────

/// Trims `radius` off both ends of the segment so it runs between circle
/// boundaries. Segments too short to trim come back unchanged.
pub fn shorten(start: (f64, f64), end: (f64, f64), radius: f64) -> ((f64, f64), (f64, f64)) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = dx.hypot(dy);
    if len <= 2.0 * radius {
        return (start, end);
    }
    let (ux, uy) = (dx / len, dy / len);
    (
        (start.0 + ux * radius, start.1 + uy * radius),
        (end.0 - ux * radius, end.1 - uy * radius),
    )
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArrowGeometry {
    pub shaft: [(f64, f64); 2],
    /// Tip, left wing, notch, right wing.
    pub head: [(f64, f64); 4],
}

/// Arrow from `start` to `end` with the head included in the length.
pub fn arrow(start: (f64, f64), end: (f64, f64), options: &RenderOptions) -> Option<ArrowGeometry> {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = dx.hypot(dy);
    if len == 0.0 {
        return None;
    }
    let (ux, uy) = (dx / len, dy / len);
    let (px, py) = (-uy, ux);
    let head_length = options.head_length.min(len);
    let half_width = options.head_width / 2.0;

    let back = (end.0 - ux * head_length, end.1 - uy * head_length);
    let notch_back = head_length * (1.0 - options.overhang);
    let notch = (end.0 - ux * notch_back, end.1 - uy * notch_back);
    Some(ArrowGeometry {
        shaft: [start, notch],
        head: [
            end,
            (back.0 + px * half_width, back.1 + py * half_width),
            notch,
            (back.0 - px * half_width, back.1 - py * half_width),
        ],
    })
}

// ── Panels ────────────────────────────────────────────────────────────────────

fn integer_tick(v: &f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        String::new()
    }
}

fn draw_frame<DB: DrawingBackend>(
    area: &DrawingArea<DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    x: &Range<f64>,
    y: &Range<f64>,
    options: &RenderOptions,
) -> Result<()> {
    area.draw(&Rectangle::new(
        [(x.start, y.start), (x.end, y.end)],
        BLACK.stroke_width(options.stroke_px(0.8)),
    ))?;
    Ok(())
}

/// One circle per individual, one arrow per transmission edge.
pub fn draw_lineage<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    history: &History,
    palette: &Palette,
    layout: &FigureLayout,
    options: &RenderOptions,
) -> Result<()> {
    let mut chart = ChartBuilder::on(area)
        .margin(layout.margin)
        .y_label_area_size(layout.y_label_area)
        .build_cartesian_2d(layout.lineage_x.clone(), layout.lineage_y.clone())?;

    if options.annotate {
        let font = ("sans-serif", options.px(options.font_pt));
        chart
            .configure_mesh()
            .disable_mesh()
            .disable_x_axis()
            .y_labels(history.population_size() + 1)
            .y_label_formatter(&integer_tick)
            .y_desc("individuals")
            .label_style(font)
            .axis_desc_style(font)
            .draw()?;
    }
    draw_frame(chart.plotting_area(), &layout.lineage_x, &layout.lineage_y, options)?;

    let radius_px = layout.to_px(options.circle_radius);
    let outline = BLACK.stroke_width(options.stroke_px(options.outline_pt));
    for record in &history.records {
        let x = record.generation as f64;
        let individuals = || record.population.traits.iter().enumerate();
        chart.draw_series(individuals().map(|(slot, &id)| {
            Circle::new((x, slot as f64), radius_px, palette.color(id).filled())
        }))?;
        chart.draw_series(
            individuals().map(|(slot, _)| Circle::new((x, slot as f64), radius_px, outline)),
        )?;
    }

    let arrow_color = BLACK.mix(options.arrow_alpha);
    let shaft_style = arrow_color.stroke_width(options.stroke_px(options.arrow_pt));
    for record in history.records.iter().skip(1) {
        let x = record.generation as f64;
        let arrows = record.edges.iter().filter_map(|edge| {
            let start = (x - 1.0, edge.source as f64);
            let end = (x, edge.target as f64);
            let (start, end) = if options.shorten_edges {
                shorten(start, end, options.circle_radius)
            } else {
                (start, end)
            };
            arrow(start, end, options)
        });
        for geometry in arrows {
            chart.draw_series(std::iter::once(PathElement::new(
                geometry.shaft.to_vec(),
                shaft_style,
            )))?;
            chart.draw_series(std::iter::once(Polygon::new(
                geometry.head.to_vec(),
                arrow_color.filled(),
            )))?;
        }
    }
    Ok(())
}

/// Reference-trait proportion per generation on a fixed `[0, 1]` axis.
pub fn draw_trajectory<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    history: &History,
    palette: &Palette,
    layout: &FigureLayout,
    options: &RenderOptions,
) -> Result<()> {
    let mut chart = ChartBuilder::on(area)
        .margin(layout.margin)
        .x_label_area_size(layout.x_label_area)
        .y_label_area_size(layout.y_label_area)
        .build_cartesian_2d(layout.trajectory_x.clone(), layout.trajectory_y.clone())?;

    if options.annotate {
        let font = ("sans-serif", options.px(options.font_pt));
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(history.generations().min(12) + 1)
            .x_label_formatter(&integer_tick)
            .y_labels(3)
            .y_label_formatter(&|v| format!("{v:.1}"))
            .x_desc("generations")
            .y_desc(format!(
                "proportion of '{}'",
                history.alphabet.label(history.reference)
            ))
            .label_style(font)
            .axis_desc_style(font)
            .draw()?;
    }
    draw_frame(
        chart.plotting_area(),
        &layout.trajectory_x,
        &layout.trajectory_y,
        options,
    )?;

    let color = palette.color(history.reference);
    let points = || {
        history
            .records
            .iter()
            .map(|r| (r.generation as f64, r.proportion))
    };
    chart.draw_series(LineSeries::new(
        points(),
        color.stroke_width(options.stroke_px(options.trajectory_pt)),
    ))?;
    let marker_px = (options.px(options.marker_pt) / 2.0).round().max(1.0) as u32;
    chart.draw_series(points().map(|p| Circle::new(p, marker_px, color.filled())))?;
    Ok(())
}

/// Lineage panel on top, trajectory panel below.
pub fn draw_figure<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    history: &History,
    palette: &Palette,
    layout: &FigureLayout,
    options: &RenderOptions,
) -> Result<()> {
    root.fill(&WHITE)?;
    let (upper, lower) = root.split_vertically(layout.lineage_height);
    draw_lineage(&upper, history, palette, layout, options)?;
    draw_trajectory(&lower, history, palette, layout, options)?;
    Ok(())
}

// ── Output ────────────────────────────────────────────────────────────────────

/// Renders the figure to a PNG at `path`. The parent directory must exist.
pub fn save_png(
    history: &History,
    palette: &Palette,
    options: &RenderOptions,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(ChainsError::io(
                path,
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("directory '{}' does not exist", parent.display()),
                ),
            ));
        }
    }

    let layout = FigureLayout::for_history(history, options);
    let root = BitMapBackend::new(path, (layout.width, layout.height)).into_drawing_area();
    let drawn = draw_figure(&root, history, palette, &layout, options).and_then(|()| {
        root.present()
            .map_err(|e| ChainsError::io(path, io::Error::other(e.to_string())))
    });
    drop(root);
    if let Err(err) = drawn {
        // the backend flushes whatever was drawn when dropped
        let _ = fs::remove_file(path);
        return Err(err);
    }
    log::info!(
        "write {} ({}x{} px)",
        path.display(),
        layout.width,
        layout.height
    );
    Ok(())
}

/// Renders the figure as an SVG document.
pub fn render_svg(history: &History, palette: &Palette, options: &RenderOptions) -> Result<String> {
    let layout = FigureLayout::for_history(history, options);
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (layout.width, layout.height))
            .into_drawing_area();
        draw_figure(&root, history, palette, &layout, options)?;
        root.present()?;
    }
    Ok(svg)
}

/// Saves or displays the figure according to `output`.
pub fn emit(
    history: &History,
    palette: &Palette,
    options: &RenderOptions,
    output: &OutputConfig,
) -> Result<()> {
    match output.mode {
        OutputMode::Save => save_png(history, palette, options, &output.path),
        OutputMode::Display => {
            let svg = render_svg(history, palette, options)?;
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(svg.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(|e| ChainsError::io("<stdout>", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Alphabet, ChainsConfig, DriftSimulator, Parameters};

    fn history(n: usize, generations: usize) -> History {
        let params = Parameters {
            random_seed: 12123,
            population_size: n,
            runtime: generations,
            initial_weights: vec![0.5, 0.5],
        };
        DriftSimulator::initialize(params, Alphabet::default(), "A")
            .unwrap()
            .finalize()
            .unwrap()
    }

    fn plain(dpi: u32) -> RenderOptions {
        RenderOptions {
            dpi,
            annotate: false,
            ..RenderOptions::default()
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_figure_pixels_match_layout() {
        assert_eq!(figure_pixels(5, 11, 300), 3300.0 * 2250.0);
        assert!(figure_pixels(100, 100, 300) > MAX_FIGURE_PIXELS);
    }

    #[test]
    fn test_figure_size_follows_inches_and_dpi() {
        let layout = FigureLayout::new(5, 11, &RenderOptions::default());
        assert_eq!(layout.width, 3300);
        assert_eq!(layout.height, 2250);
        assert_eq!(layout.lineage_height, 1688);
    }

    #[test]
    fn test_trajectory_axis_is_unit_interval() {
        for (n, t) in [(1, 1), (5, 3), (20, 40)] {
            let layout = FigureLayout::new(n, t, &RenderOptions::default());
            assert_eq!(layout.trajectory_y, 0.0..1.0);
            assert_eq!(layout.trajectory_x, layout.lineage_x);
        }
    }

    #[test]
    fn test_lineage_aspect_is_equal() {
        for options in [RenderOptions::default(), plain(72)] {
            let layout = FigureLayout::new(5, 11, &options);
            let plot_w = (layout.width - 2 * layout.margin - layout.y_label_area) as f64;
            let plot_h = (layout.lineage_height - 2 * layout.margin) as f64;
            let x_span = layout.lineage_x.end - layout.lineage_x.start;
            let y_span = layout.lineage_y.end - layout.lineage_y.start;
            assert!(close(plot_w / x_span, plot_h / y_span));
            assert!(close(plot_w / x_span, layout.px_per_unit));
            let eps = 1e-9;
            assert!(layout.lineage_x.start <= -0.5 + eps && layout.lineage_x.end >= 10.5 - eps);
            assert!(layout.lineage_y.start <= -0.5 + eps && layout.lineage_y.end >= 4.5 - eps);
        }
    }

    #[test]
    fn test_equal_aspect_widens_short_axis() {
        let (x, y, unit) = equal_aspect((200.0, 100.0), 0.0..1.0, 0.0..1.0);
        assert!(close(unit, 100.0));
        assert!(close(x.start, -0.5) && close(x.end, 1.5));
        assert_eq!(y, 0.0..1.0);
    }

    #[test]
    fn test_shorten_trims_both_ends() {
        let (start, end) = shorten((0.0, 0.0), (1.0, 3.0), 0.2);
        let len = |a: (f64, f64), b: (f64, f64)| (b.0 - a.0).hypot(b.1 - a.1);
        assert!(close(len((0.0, 0.0), start), 0.2));
        assert!(close(len(end, (1.0, 3.0)), 0.2));
        assert!(close(len(start, end), 10f64.sqrt() - 0.4));
    }

    #[test]
    fn test_shorten_keeps_short_segments() {
        let seg = ((0.0, 0.0), (0.3, 0.0));
        assert_eq!(shorten(seg.0, seg.1, 0.2), seg);
    }

    #[test]
    fn test_arrow_head_ends_at_target() {
        let options = RenderOptions::default();
        let geometry = arrow((0.0, 0.0), (1.0, 0.0), &options).unwrap();
        let [tip, left, notch, right] = geometry.head;
        assert_eq!(tip, (1.0, 0.0));
        assert!(close(left.0, 0.9) && close(left.1, 0.05));
        assert!(close(right.0, 0.9) && close(right.1, -0.05));
        assert!(close(notch.0, 0.93) && close(notch.1, 0.0));
        assert_eq!(geometry.shaft[0], (0.0, 0.0));
        assert_eq!(geometry.shaft[1], notch);
    }

    #[test]
    fn test_arrow_degenerate() {
        assert!(arrow((1.0, 1.0), (1.0, 1.0), &RenderOptions::default()).is_none());
    }

    #[test]
    fn test_save_png_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("chains.png");
        let history = history(3, 2);
        let palette = ChainsConfig::default().palette().unwrap();
        let err = save_png(&history, &palette, &plain(20), &path).unwrap_err();
        match err {
            ChainsError::Io { path: p, source } => {
                assert_eq!(p, path);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected Io error, got {other:?}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_save_png_writes_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chains.png");
        let history = history(5, 3);
        let palette = ChainsConfig::default().palette().unwrap();
        let options = RenderOptions {
            shorten_edges: true,
            ..plain(20)
        };
        save_png(&history, &palette, &options, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let width = u32::from_be_bytes(bytes[16..20].try_into().unwrap());
        let height = u32::from_be_bytes(bytes[20..24].try_into().unwrap());
        assert_eq!((width, height), (60, 150));
    }

    #[test]
    fn test_render_svg_without_labels() {
        let history = history(4, 5);
        let palette = ChainsConfig::default().palette().unwrap();
        let svg = render_svg(&history, &palette, &plain(30)).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
        // fill color of the reference trait appears in both panels
        assert!(svg.to_uppercase().contains("#EB6864"));
    }
}
