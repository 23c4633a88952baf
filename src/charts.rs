//! SVG charts
//!
//! Every analysis renders one SVG file made of a grid of panels. Three panel
//! kinds cover all figures: distributions (box plus strip of points), trends
//! (mean ± SEM per x with optional fitted line and faint trajectories) and
//! bars (value ± error with a note above each bar).

use plotters::coord::Shift;
use plotters::prelude::*;
use std::error::Error;
use std::fs;
use std::path::Path;

use crate::error::AnalysisError;
use crate::stats::{percentile, LinearFit};
use crate::types::{GROUP_OLD, GROUP_YOUNG};

pub const OLD_COLOR: RGBColor = RGBColor(0xd6, 0x27, 0x28);
pub const YOUNG_COLOR: RGBColor = RGBColor(0x1f, 0x77, 0xb4);
pub const NEUTRAL_COLOR: RGBColor = RGBColor(0x55, 0x55, 0x55);

const PANEL_WIDTH: u32 = 560;
const PANEL_HEIGHT: u32 = 440;
const TITLE_HEIGHT: u32 = 40;

type DrawResult = Result<(), Box<dyn Error>>;
type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

/// Color used for a group label
pub fn group_color(group: &str) -> RGBColor {
    match group {
        GROUP_OLD => OLD_COLOR,
        GROUP_YOUNG => YOUNG_COLOR,
        _ => NEUTRAL_COLOR,
    }
}

/// One box of a distribution panel
#[derive(Debug, Clone)]
pub struct Category {
    pub label: String,
    pub values: Vec<f64>,
    pub color: RGBColor,
}

/// Text placed above a category position
#[derive(Debug, Clone)]
pub struct Annotation {
    /// Category index; fractional values fall between boxes
    pub x: f64,
    pub text: String,
    pub highlight: bool,
}

#[derive(Debug, Clone)]
pub struct DistributionPanel {
    pub title: String,
    pub y_desc: String,
    pub categories: Vec<Category>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Copy)]
pub struct TrendPoint {
    pub x: f64,
    pub mean: f64,
    pub sem: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TrendSeries {
    pub label: String,
    pub color: RGBColor,
    pub points: Vec<TrendPoint>,
    pub fit: Option<LinearFit>,
}

/// Faint per-block line drawn beneath the series
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub color: RGBColor,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone)]
pub struct TrendPanel {
    pub title: String,
    pub x_desc: String,
    pub y_desc: String,
    /// Tick labels become `<prefix><nn>` (e.g. `T01`) when set
    pub x_tick_prefix: Option<String>,
    pub series: Vec<TrendSeries>,
    pub trajectories: Vec<Trajectory>,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    pub error: Option<f64>,
    pub color: RGBColor,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BarPanel {
    pub title: String,
    pub y_desc: String,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone)]
pub enum Panel {
    Distribution(DistributionPanel),
    Trend(TrendPanel),
    Bars(BarPanel),
}

/// Render `panels` into an SVG grid with `columns` panels per row.
pub fn render(path: &Path, title: &str, columns: usize, panels: &[Panel]) -> Result<(), AnalysisError> {
    draw_figure(path, title, columns, panels)
        .map_err(|e| AnalysisError::Chart(format!("{}: {e}", path.display())))
}

fn draw_figure(path: &Path, title: &str, columns: usize, panels: &[Panel]) -> DrawResult {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let columns = columns.clamp(1, panels.len().max(1));
    let rows = panels.len().div_ceil(columns).max(1);
    let size = (
        PANEL_WIDTH * columns as u32,
        PANEL_HEIGHT * rows as u32 + TITLE_HEIGHT,
    );

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let body = root.titled(title, ("sans-serif", 24))?;
    let areas = body.split_evenly((rows, columns));
    for (area, panel) in areas.iter().zip(panels) {
        match panel {
            Panel::Distribution(p) => draw_distribution(area, p)?,
            Panel::Trend(p) => draw_trend(area, p)?,
            Panel::Bars(p) => draw_bars(area, p)?,
        }
    }
    root.present()?;
    Ok(())
}

/// Padded `(low, high)` covering all values; a unit window when empty or flat
fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < 1e-9 {
        return (lo - 0.5, hi + 0.5);
    }
    let pad = 0.08 * (hi - lo);
    (lo - pad, hi + pad)
}

/// Label of the category at integer position `x`
fn category_label(labels: &[String], x: f64) -> String {
    let idx = x.round();
    if (x - idx).abs() > 1e-6 || idx < 0.0 {
        return String::new();
    }
    labels.get(idx as usize).cloned().unwrap_or_default()
}

/// Deterministic horizontal spread for strip points
fn jitter(i: usize) -> f64 {
    ((i * 37) % 21) as f64 / 20.0 * 0.3 - 0.15
}

fn draw_distribution(area: &Area<'_>, panel: &DistributionPanel) -> DrawResult {
    let n = panel.categories.len().max(1);
    let (lo, hi) = value_range(panel.categories.iter().flat_map(|c| c.values.iter().copied()));
    let headroom = if panel.annotations.is_empty() {
        0.0
    } else {
        0.15 * (hi - lo)
    };
    let labels: Vec<String> = panel
        .categories
        .iter()
        .map(|c| format!("{} (n={})", c.label, c.values.len()))
        .collect();

    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, ("sans-serif", 16))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), lo..(hi + headroom))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(2 * n + 1)
        .x_label_formatter(&|x| category_label(&labels, *x))
        .y_desc(panel.y_desc.as_str())
        .draw()?;

    for (i, category) in panel.categories.iter().enumerate() {
        let x = i as f64;
        let values = &category.values;
        if let (Some(q1), Some(med), Some(q3)) = (
            percentile(values, 25.0),
            percentile(values, 50.0),
            percentile(values, 75.0),
        ) {
            // Whiskers stop at the most extreme values within 1.5 IQR
            let iqr = q3 - q1;
            let low = values
                .iter()
                .copied()
                .filter(|v| *v >= q1 - 1.5 * iqr)
                .fold(q1, f64::min);
            let high = values
                .iter()
                .copied()
                .filter(|v| *v <= q3 + 1.5 * iqr)
                .fold(q3, f64::max);
            let style = category.color.stroke_width(2);
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x - 0.25, q1), (x + 0.25, q3)],
                style,
            )))?;
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x - 0.25, med), (x + 0.25, med)],
                BLACK.stroke_width(2),
            )))?;
            for (from, to) in [(q1, low), (q3, high)] {
                chart.draw_series(std::iter::once(PathElement::new(vec![(x, from), (x, to)], style)))?;
                chart.draw_series(std::iter::once(PathElement::new(
                    vec![(x - 0.1, to), (x + 0.1, to)],
                    style,
                )))?;
            }
        }
        chart.draw_series(
            values
                .iter()
                .enumerate()
                .map(|(j, v)| Circle::new((x + jitter(j), *v), 2, BLACK.mix(0.35).filled())),
        )?;
    }

    for note in &panel.annotations {
        let color = if note.highlight { RED } else { BLACK };
        chart.draw_series(std::iter::once(Text::new(
            note.text.clone(),
            (note.x - 0.2, hi + 0.6 * headroom),
            ("sans-serif", 13).into_font().color(&color),
        )))?;
    }
    Ok(())
}

fn draw_trend(area: &Area<'_>, panel: &TrendPanel) -> DrawResult {
    let xs = panel
        .series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.x))
        .chain(panel.trajectories.iter().flat_map(|t| t.points.iter().map(|p| p.0)));
    let (x_lo, x_hi) = xs.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
        (lo.min(x), hi.max(x))
    });
    let (x_lo, x_hi) = if x_lo.is_finite() {
        (x_lo - 0.5, x_hi + 0.5)
    } else {
        (0.0, 1.0)
    };

    let ys = panel
        .series
        .iter()
        .flat_map(|s| {
            s.points.iter().flat_map(|p| {
                let e = p.sem.unwrap_or(0.0);
                [p.mean - e, p.mean + e]
            })
        })
        .chain(panel.trajectories.iter().flat_map(|t| t.points.iter().map(|p| p.1)));
    let (y_lo, y_hi) = value_range(ys);

    let prefix = panel.x_tick_prefix.clone();
    let tick_label = move |x: &f64| -> String {
        match &prefix {
            Some(p) if (x - x.round()).abs() < 1e-6 => format!("{p}{:02}", x.round() as i64),
            Some(_) => String::new(),
            None => format!("{x}"),
        }
    };
    let tick_count = ((x_hi - x_lo).round() as usize).max(1) * 2 + 1;

    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, ("sans-serif", 16))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

    chart
        .configure_mesh()
        .x_labels(tick_count)
        .x_label_formatter(&tick_label)
        .x_desc(panel.x_desc.as_str())
        .y_desc(panel.y_desc.as_str())
        .draw()?;

    for trajectory in &panel.trajectories {
        chart.draw_series(LineSeries::new(
            trajectory.points.iter().copied(),
            trajectory.color.mix(0.15),
        ))?;
    }

    for series in &panel.series {
        let color = series.color;
        chart
            .draw_series(LineSeries::new(
                series.points.iter().map(|p| (p.x, p.mean)),
                color.stroke_width(2),
            ))?
            .label(series.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));

        for p in &series.points {
            if let Some(e) = p.sem {
                let cap = 0.06;
                chart.draw_series(std::iter::once(PathElement::new(
                    vec![(p.x, p.mean - e), (p.x, p.mean + e)],
                    color,
                )))?;
                for y in [p.mean - e, p.mean + e] {
                    chart.draw_series(std::iter::once(PathElement::new(
                        vec![(p.x - cap, y), (p.x + cap, y)],
                        color,
                    )))?;
                }
            }
        }
        chart.draw_series(
            series
                .points
                .iter()
                .map(|p| Circle::new((p.x, p.mean), 4, color.filled())),
        )?;

        if let Some(fit) = &series.fit {
            let first = series.points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
            let last = series.points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
            if first.is_finite() && last.is_finite() {
                chart.draw_series(LineSeries::new(
                    vec![(first, fit.predict(first)), (last, fit.predict(last))],
                    color.mix(0.5),
                ))?;
            }
        }
    }

    if !panel.series.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    if let Some(note) = &panel.note {
        for (i, line) in note.lines().enumerate() {
            area.draw(&Text::new(
                line.to_string(),
                (80, 40 + 16 * i as i32),
                ("sans-serif", 13).into_font(),
            ))?;
        }
    }
    Ok(())
}

fn draw_bars(area: &Area<'_>, panel: &BarPanel) -> DrawResult {
    let n = panel.bars.len().max(1);
    let (lo, hi) = value_range(
        panel
            .bars
            .iter()
            .flat_map(|b| {
                let e = b.error.unwrap_or(0.0);
                [b.value - e, b.value + e]
            })
            .chain(std::iter::once(0.0)),
    );
    let headroom = 0.12 * (hi - lo);
    let labels: Vec<String> = panel.bars.iter().map(|b| b.label.clone()).collect();

    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, ("sans-serif", 16))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..(n as f64 - 0.5), lo..(hi + headroom))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(2 * n + 1)
        .x_label_formatter(&|x| category_label(&labels, *x))
        .y_desc(panel.y_desc.as_str())
        .draw()?;

    chart.draw_series(std::iter::once(PathElement::new(
        vec![(-0.5, 0.0), (n as f64 - 0.5, 0.0)],
        BLACK,
    )))?;

    for (i, bar) in panel.bars.iter().enumerate() {
        let x = i as f64;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x - 0.3, 0.0), (x + 0.3, bar.value)],
            bar.color.mix(0.6).filled(),
        )))?;
        let mut top = bar.value.max(0.0);
        if let Some(e) = bar.error {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x, bar.value - e), (x, bar.value + e)],
                BLACK,
            )))?;
            for y in [bar.value - e, bar.value + e] {
                chart.draw_series(std::iter::once(PathElement::new(
                    vec![(x - 0.08, y), (x + 0.08, y)],
                    BLACK,
                )))?;
            }
            top = top.max(bar.value + e);
        }
        if let Some(note) = &bar.note {
            chart.draw_series(std::iter::once(Text::new(
                note.clone(),
                (x - 0.15, top + 0.5 * headroom),
                ("sans-serif", 13).into_font(),
            )))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_panels() -> Vec<Panel> {
        vec![
            Panel::Distribution(DistributionPanel {
                title: "Symbolic entropy".into(),
                y_desc: "Symb".into(),
                categories: vec![
                    Category {
                        label: "old".into(),
                        values: vec![1.2, 1.4, 1.3, 1.8],
                        color: OLD_COLOR,
                    },
                    Category {
                        label: "young".into(),
                        values: vec![],
                        color: YOUNG_COLOR,
                    },
                ],
                annotations: vec![Annotation {
                    x: 0.5,
                    text: "p=0.042".into(),
                    highlight: true,
                }],
            }),
            Panel::Trend(TrendPanel {
                title: "Trend".into(),
                x_desc: "Trial".into(),
                y_desc: "Symb".into(),
                x_tick_prefix: Some("T".into()),
                series: vec![TrendSeries {
                    label: "OLD".into(),
                    color: OLD_COLOR,
                    points: vec![
                        TrendPoint { x: 1.0, mean: 1.2, sem: Some(0.1) },
                        TrendPoint { x: 2.0, mean: 1.3, sem: None },
                        TrendPoint { x: 3.0, mean: 1.5, sem: Some(0.05) },
                    ],
                    fit: Some(LinearFit {
                        slope: 0.15,
                        intercept: 1.03,
                        r_squared: 0.96,
                    }),
                }],
                trajectories: vec![Trajectory {
                    color: OLD_COLOR,
                    points: vec![(1.0, 1.1), (2.0, 1.4), (3.0, 1.6)],
                }],
                note: Some("Mixed model:\nβ=0.15".into()),
            }),
            Panel::Bars(BarPanel {
                title: "Effect sizes".into(),
                y_desc: "d".into(),
                bars: vec![Bar {
                    label: "OLD".into(),
                    value: -0.3,
                    error: Some(0.1),
                    color: OLD_COLOR,
                    note: Some("n.s.".into()),
                }],
            }),
        ]
    }

    #[test]
    fn test_render_writes_svg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("figure.svg");
        render(&path, "Figure", 2, &sample_panels()).unwrap();

        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.starts_with("<svg") || svg.contains("<svg"));
        assert!(svg.contains("Figure"));
    }

    #[test]
    fn test_render_empty_panels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.svg");
        render(&path, "Nothing", 3, &[]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_value_range() {
        assert_eq!(value_range(std::iter::empty()), (0.0, 1.0));
        assert_eq!(value_range([2.0, 2.0].into_iter()), (1.5, 2.5));
        let (lo, hi) = value_range([0.0, 10.0].into_iter());
        assert!((lo - -0.8).abs() < 1e-12);
        assert!((hi - 10.8).abs() < 1e-12);
    }

    #[test]
    fn test_category_label() {
        let labels = vec!["old".to_string(), "young".to_string()];
        assert_eq!(category_label(&labels, 0.0), "old");
        assert_eq!(category_label(&labels, 1.0), "young");
        assert_eq!(category_label(&labels, 0.5), "");
        assert_eq!(category_label(&labels, 2.0), "");
        assert_eq!(category_label(&labels, -1.0), "");
    }

    #[test]
    fn test_group_color() {
        assert_eq!(group_color("old"), OLD_COLOR);
        assert_eq!(group_color("young"), YOUNG_COLOR);
        assert_eq!(group_color("other"), NEUTRAL_COLOR);
    }
}
