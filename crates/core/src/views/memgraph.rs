//! Stacked area chart of the plotted nodes over every snapshot.
//!
//! The first plotted node is drawn on top of the stack, so series run in
//! reverse plotted order: series 0 sits on the baseline.

use massif_view_protocol::{Point, Rect, RenderCommand, TextAlign, ThemeToken, Viewport};
use serde::{Deserialize, Serialize};

use super::Renderable;
use crate::color::HexColor;
use crate::format::{format_percent, mbytes_to_bytes, pprint_bytes};
use crate::model::{MassifData, ModelEvent, NodeId};

const AXIS_MARGIN_X: f64 = 120.0;
const AXIS_MARGIN_Y: f64 = 35.0;
const LEGEND_HEIGHT: f64 = 40.0;
const MARKER_WIDTH: f64 = 3.0;
const FONT_SIZE: f64 = 11.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Legend {
    #[default]
    None,
    Right,
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemgraphOptions {
    /// Plot each node's share of the plotted total instead of megabytes.
    pub relative: bool,
    pub stacked: bool,
    pub legend: Legend,
}

impl Default for MemgraphOptions {
    fn default() -> Self {
        Self {
            relative: false,
            stacked: true,
            legend: Legend::None,
        }
    }
}

/// One plotted node's values, one per snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub node: NodeId,
    pub uid: u64,
    pub name: String,
    pub color: HexColor,
    pub values: Vec<f64>,
}

/// Everything the chart needs, independent of pixel size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemgraphData {
    /// `"Snapshot i/n"`, one per snapshot.
    pub rows: Vec<String>,
    /// Bottom of the stack first.
    pub series: Vec<Series>,
    /// Top of the value axis.
    pub axis_max: f64,
}

impl MemgraphData {
    pub fn build(data: &MassifData, options: &MemgraphOptions) -> Self {
        let count = data.times().len();
        let plotted = data.plotted_nodes();
        let totals: Vec<f64> = (0..count)
            .map(|t| plotted.iter().map(|&n| data.alloc_at(n, t)).sum())
            .collect();

        let series = plotted
            .iter()
            .rev()
            .map(|&n| {
                let node = data.node(n);
                let values = node
                    .allocs()
                    .iter()
                    .zip(&totals)
                    .map(|(&v, &total)| match (options.relative, total > 0.0) {
                        (false, _) => v,
                        (true, true) => v / total,
                        (true, false) => 0.0,
                    })
                    .collect();
                Series {
                    node: n,
                    uid: node.uid(),
                    name: node.func_name(),
                    color: data.colors(n).normal.background,
                    values,
                }
            })
            .collect();

        let peak = if options.stacked {
            totals.iter().copied().fold(0.0, f64::max)
        } else {
            plotted
                .iter()
                .flat_map(|&n| data.node(n).allocs().iter().copied())
                .fold(0.0, f64::max)
        };
        let axis_max = if options.relative {
            1.0
        } else {
            nice_axis_max(peak)
        };

        Self {
            rows: (1..=count).map(|i| format!("Snapshot {i}/{count}")).collect(),
            series,
            axis_max,
        }
    }

    /// Lower and upper value of `series` at `time`, stacked if requested.
    pub fn band(&self, series: usize, time: usize, stacked: bool) -> (f64, f64) {
        let value = self.series[series].values[time];
        if stacked {
            let below: f64 = self.series[..series].iter().map(|s| s.values[time]).sum();
            (below, below + value)
        } else {
            (0.0, value)
        }
    }
}

/// Round a peak value up to the top of a readable value axis.
///
/// The steps follow a 1-2-2.4-3-4-5-6-8-10 ladder within each order of
/// magnitude, with a few fixed cases between 24 and 45.
pub fn nice_axis_max(v: f64) -> f64 {
    if !(v > 0.0) || !v.is_finite() {
        return 0.0;
    }
    if 24.0 < v && v <= 28.0 {
        return 28.0;
    }
    if 28.0 < v && v < 30.0 {
        return 32.0;
    }
    if 40.0 < v && v <= 44.0 {
        return 44.0;
    }
    if 44.0 < v && v < 45.0 {
        return 48.0;
    }

    let mut v = v;
    let mut oom = 1.0;
    while v <= 1.0 {
        v *= 10.0;
        oom /= 10.0;
    }
    while v > 10.0 {
        v /= 10.0;
        oom *= 10.0;
    }
    let step = if v > 8.0 {
        10.0
    } else if v >= 6.0 {
        8.0
    } else if v >= 4.5 {
        6.0
    } else if v > 4.0 {
        5.0
    } else if v >= 3.0 {
        4.0
    } else if v >= 2.25 {
        3.0
    } else if v > 2.0 {
        2.4
    } else if v >= 1.5 {
        2.0
    } else if v > 1.2 {
        1.6
    } else if v > 1.0 {
        2.0
    } else {
        v
    };
    step * oom
}

/// The plotting area inside a `width` x `height` view, leaving room for the
/// axes and the legend.
pub fn chart_area(width: f64, height: f64, legend: Legend) -> Rect {
    let mut w = width - AXIS_MARGIN_X;
    let mut h = height - AXIS_MARGIN_Y;
    match legend {
        Legend::Right => w -= w / 4.0,
        Legend::Top | Legend::Bottom => h -= LEGEND_HEIGHT,
        Legend::None => {}
    }
    let w = w.max(0.0);
    let h = h.max(0.0);
    Rect::new((width - w) / 2.0, (height - h) / 2.0, w, h)
}

/// Where to point out a highlighted series: a bar at the selected snapshot
/// and an arrow beside the final snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightMarker {
    pub bar: Rect,
    pub arrow: Point,
}

/// The marker for `node`, if it is plotted.
pub fn highlight_marker(
    data: &MassifData,
    options: &MemgraphOptions,
    node: NodeId,
    area: Rect,
) -> Option<HighlightMarker> {
    let plotted = data.plotted_nodes();
    if !plotted.contains(&node) {
        return None;
    }
    let bar_time = data.selected_time();
    let arrow_time = data.times().len() - 1;

    let (bar_total, arrow_total) = if options.relative {
        let sum = |t: usize| plotted.iter().map(|&n| data.alloc_at(n, t)).sum::<f64>();
        (sum(bar_time), sum(arrow_time))
    } else {
        let axis_max = MemgraphData::build(data, options).axis_max;
        (axis_max, axis_max)
    };
    let scale = |total: f64| if total > 0.0 { area.h / total } else { 0.0 };
    let bar_ratio = scale(bar_total);
    let arrow_ratio = scale(arrow_total);
    let bottom = area.y + area.h;

    let mut bar_below = 0.0;
    let mut arrow_below = 0.0;
    for &n in plotted.iter().rev() {
        let bar_size = data.alloc_at(n, bar_time);
        let arrow_size = data.alloc_at(n, arrow_time);
        if n == node {
            let (bar_top, arrow_top) = if options.stacked {
                (bar_below + bar_size, arrow_below + arrow_size)
            } else {
                (bar_size, arrow_size)
            };
            let x = if arrow_time == 0 {
                area.x
            } else {
                area.x + area.w * bar_time as f64 / arrow_time as f64
            };
            return Some(HighlightMarker {
                bar: Rect::new(
                    x - MARKER_WIDTH / 2.0,
                    bottom - bar_top * bar_ratio,
                    MARKER_WIDTH,
                    bar_size * bar_ratio,
                ),
                arrow: Point::new(
                    area.x + area.w + 1.0,
                    bottom - (arrow_top - arrow_size / 2.0) * arrow_ratio,
                ),
            });
        }
        bar_below += bar_size;
        arrow_below += arrow_size;
    }
    None
}

/// The memgraph as a [`Renderable`].
#[derive(Debug, Clone, Default)]
pub struct MemgraphView {
    options: MemgraphOptions,
    area: Option<Rect>,
    hovered: Option<NodeId>,
}

impl MemgraphView {
    pub fn new(options: MemgraphOptions) -> Self {
        Self {
            options,
            area: None,
            hovered: None,
        }
    }

    pub fn options(&self) -> &MemgraphOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut MemgraphOptions {
        &mut self.options
    }

    /// The series and snapshot under `p`, using the area of the last draw.
    pub fn hit(&self, data: &MassifData, p: Point) -> Option<(NodeId, usize)> {
        let area = self.area?;
        if !area.contains(p) {
            return None;
        }
        let chart = MemgraphData::build(data, &self.options);
        let count = chart.rows.len();
        let time = (((p.x - area.x) / area.w) * count as f64) as usize;
        let time = time.min(count.saturating_sub(1));
        if chart.axis_max <= 0.0 {
            return None;
        }
        let value = (area.y + area.h - p.y) / area.h * chart.axis_max;
        let in_band = |&i: &usize| {
            let (lo, hi) = chart.band(i, time, self.options.stacked);
            value >= lo && value < hi
        };
        // Non-stacked bands overlap; the last one drawn is on top.
        let index = if self.options.stacked {
            (0..chart.series.len()).find(in_band)
        } else {
            (0..chart.series.len()).rev().find(in_band)
        };
        index.map(|i| (chart.series[i].node, time))
    }

    /// Highlight the series under the pointer and select its snapshot.
    pub fn hover(&mut self, data: &mut MassifData, p: Point) {
        let hit = self.hit(data, p);
        let node = hit.map(|(n, _)| n);
        if self.hovered != node
            && let Some(prev) = self.hovered.take()
        {
            data.set_highlighted(prev, false);
        }
        if let Some((node, time)) = hit {
            data.set_highlighted(node, true);
            self.hovered = Some(node);
            if data.selected_time() != time {
                data.select_time(time);
            }
        }
    }

    pub fn unhover(&mut self, data: &mut MassifData) {
        if let Some(prev) = self.hovered.take() {
            data.set_highlighted(prev, false);
        }
    }
}

impl Renderable for MemgraphView {
    fn draw(&mut self, data: &MassifData, viewport: &Viewport) -> Vec<RenderCommand> {
        let chart = MemgraphData::build(data, &self.options);
        let area = chart_area(viewport.width, viewport.height, self.options.legend);
        self.area = Some(area);

        let count = chart.rows.len();
        let mut commands = Vec::with_capacity(chart.series.len() * count + 12);
        commands.push(RenderCommand::BeginGroup {
            id: "memgraph".into(),
            label: Some("Memory over time".into()),
        });
        commands.push(RenderCommand::DrawRect {
            rect: Rect::new(0.0, 0.0, viewport.width, viewport.height),
            color: ThemeToken::MemgraphBackground.into(),
            border_color: None,
            label: None,
            node_uid: None,
        });

        let bottom = area.y + area.h;
        if count > 0 && chart.axis_max > 0.0 && area.is_drawable() {
            let col_w = area.w / count as f64;
            let scale = area.h / chart.axis_max;
            commands.push(RenderCommand::SetClip { rect: area });
            for time in 0..count {
                let x = area.x + time as f64 * col_w;
                for (i, series) in chart.series.iter().enumerate() {
                    let (lo, hi) = chart.band(i, time, self.options.stacked);
                    let h = (hi - lo) * scale;
                    if h < 0.1 {
                        continue;
                    }
                    commands.push(RenderCommand::DrawRect {
                        rect: Rect::new(x, bottom - hi * scale, col_w, h),
                        color: series.color.to_color().into(),
                        border_color: None,
                        label: Some(format!("{}: {}", chart.rows[time], series.name)),
                        node_uid: Some(series.uid),
                    });
                }
            }
            commands.push(RenderCommand::ClearClip);

            let selected_x = area.x + (data.selected_time() as f64 + 0.5) * col_w;
            commands.push(RenderCommand::DrawLine {
                from: Point::new(selected_x, area.y),
                to: Point::new(selected_x, bottom),
                color: ThemeToken::SelectionHighlight.into(),
                width: 1.0,
            });
        }

        // Axes
        commands.push(RenderCommand::DrawLine {
            from: Point::new(area.x, area.y),
            to: Point::new(area.x, bottom),
            color: ThemeToken::MemgraphAxis.into(),
            width: 1.0,
        });
        commands.push(RenderCommand::DrawLine {
            from: Point::new(area.x, bottom),
            to: Point::new(area.x + area.w, bottom),
            color: ThemeToken::MemgraphAxis.into(),
            width: 1.0,
        });
        let (axis_title, axis_top) = if self.options.relative {
            ("Memory (%)", format_percent(chart.axis_max))
        } else {
            ("Memory (MB)", pprint_bytes(mbytes_to_bytes(chart.axis_max)))
        };
        commands.push(RenderCommand::DrawText {
            position: Point::new(area.x - 4.0, area.y + FONT_SIZE),
            text: axis_top,
            color: ThemeToken::TextMuted.into(),
            font_size: FONT_SIZE,
            align: TextAlign::Right,
            vertical: false,
        });
        commands.push(RenderCommand::DrawText {
            position: Point::new(FONT_SIZE, area.y),
            text: axis_title.into(),
            color: ThemeToken::TextSecondary.into(),
            font_size: FONT_SIZE,
            align: TextAlign::Left,
            vertical: true,
        });
        commands.push(RenderCommand::DrawText {
            position: Point::new(area.x + area.w / 2.0, viewport.height - 4.0),
            text: "Snapshot".into(),
            color: ThemeToken::TextSecondary.into(),
            font_size: FONT_SIZE,
            align: TextAlign::Center,
            vertical: false,
        });

        for &node in data.plotted_nodes() {
            if !data.is_highlighted(node) {
                continue;
            }
            let Some(marker) = highlight_marker(data, &self.options, node, area) else {
                continue;
            };
            let color = data.colors(node).highlighted.background.to_color();
            commands.push(RenderCommand::DrawRect {
                rect: marker.bar,
                color: color.into(),
                border_color: Some(ThemeToken::MemgraphHighlightMarker),
                label: None,
                node_uid: Some(data.node(node).uid()),
            });
            commands.push(RenderCommand::DrawText {
                position: marker.arrow,
                text: "\u{2190}".into(),
                color: color.into(),
                font_size: FONT_SIZE * 2.0,
                align: TextAlign::Left,
                vertical: false,
            });
        }

        if self.options.legend != Legend::None {
            push_legend(&mut commands, &chart, area, viewport, self.options.legend);
        }

        commands.push(RenderCommand::EndGroup);
        commands
    }

    fn on_event(&mut self, _data: &MassifData, event: &ModelEvent) {
        if let ModelEvent::NodePlotted { node, plotted: false, .. } = *event
            && self.hovered == Some(node)
        {
            self.hovered = None;
        }
    }
}

fn push_legend(
    commands: &mut Vec<RenderCommand>,
    chart: &MemgraphData,
    area: Rect,
    viewport: &Viewport,
    legend: Legend,
) {
    let swatch = FONT_SIZE;
    let line = FONT_SIZE + 4.0;
    // The top of the stack is listed first.
    for (row, series) in chart.series.iter().rev().enumerate() {
        let origin = match legend {
            Legend::Right => Point::new(area.x + area.w + 24.0, area.y + row as f64 * line),
            Legend::Top => Point::new(area.x + row as f64 * 120.0, (area.y - LEGEND_HEIGHT).max(0.0)),
            Legend::Bottom => Point::new(area.x + row as f64 * 120.0, area.y + area.h + 20.0),
            Legend::None => return,
        };
        if origin.x > viewport.width || origin.y > viewport.height {
            break;
        }
        commands.push(RenderCommand::DrawRect {
            rect: Rect::new(origin.x, origin.y, swatch, swatch),
            color: series.color.to_color().into(),
            border_color: None,
            label: None,
            node_uid: Some(series.uid),
        });
        commands.push(RenderCommand::DrawText {
            position: Point::new(origin.x + swatch + 4.0, origin.y + swatch),
            text: series.name.clone(),
            color: ThemeToken::TextPrimary.into(),
            font_size: FONT_SIZE,
            align: TextAlign::Left,
            vertical: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::{id, model, site};

    fn two_sites() -> MassifData {
        model(
            &[1.0, 2.0, 4.0],
            vec![
                site(1, &[10.0, 30.0, 5.0], vec![]),
                site(2, &[10.0, 10.0, 0.0], vec![]),
            ],
        )
    }

    #[test]
    fn nice_axis_ladder() {
        assert_eq!(nice_axis_max(26.0), 28.0);
        assert_eq!(nice_axis_max(29.0), 32.0);
        assert_eq!(nice_axis_max(42.0), 44.0);
        assert_eq!(nice_axis_max(40.0), 40.0);
        assert_eq!(nice_axis_max(95.0), 100.0);
        assert!((nice_axis_max(0.22) - 0.24).abs() < 1e-12);
        assert!((nice_axis_max(0.23) - 0.3).abs() < 1e-12);
        assert_eq!(nice_axis_max(1.1), 2.0);
        assert_eq!(nice_axis_max(700.0), 800.0);
        assert_eq!(nice_axis_max(0.0), 0.0);
    }

    #[test]
    fn series_run_bottom_up() {
        let data = two_sites();
        let chart = MemgraphData::build(&data, &MemgraphOptions::default());
        assert_eq!(chart.rows, vec!["Snapshot 1/3", "Snapshot 2/3", "Snapshot 3/3"]);
        let uids: Vec<u64> = chart.series.iter().map(|s| s.uid).collect();
        assert_eq!(uids, vec![2, 1]);
        assert_eq!(chart.series[0].color, data.colors(id(&data, 2)).normal.background);
        // Stacked peak is 40 at snapshot 2.
        assert_eq!(chart.axis_max, 40.0);
        assert_eq!(chart.band(1, 1, true), (10.0, 40.0));
    }

    #[test]
    fn non_stacked_uses_single_peak() {
        let data = two_sites();
        let options = MemgraphOptions {
            stacked: false,
            ..Default::default()
        };
        let chart = MemgraphData::build(&data, &options);
        assert_eq!(chart.axis_max, 40.0);
        assert_eq!(chart.band(1, 1, false), (0.0, 30.0));
    }

    #[test]
    fn relative_values_are_shares_of_total() {
        let data = model(
            &[1.0, 2.0],
            vec![site(1, &[3.0, 0.0], vec![]), site(2, &[1.0, 0.0], vec![])],
        );
        let options = MemgraphOptions {
            relative: true,
            ..Default::default()
        };
        let chart = MemgraphData::build(&data, &options);
        assert_eq!(chart.axis_max, 1.0);
        assert_eq!(chart.series[1].values, vec![0.75, 0.0]);
        assert_eq!(chart.series[0].values, vec![0.25, 0.0]);
    }

    #[test]
    fn chart_area_leaves_room_for_legend() {
        assert_eq!(chart_area(520.0, 235.0, Legend::None), Rect::new(60.0, 17.5, 400.0, 200.0));
        assert_eq!(chart_area(520.0, 235.0, Legend::Right).w, 300.0);
        assert_eq!(chart_area(520.0, 235.0, Legend::Bottom).h, 160.0);
    }

    #[test]
    fn marker_tracks_stack_position() {
        let data = two_sites();
        let options = MemgraphOptions::default();
        let area = Rect::new(0.0, 0.0, 100.0, 400.0);
        // Axis max 40 over 400px: 10px per MB. Node 1 sits above node 2.
        let marker = highlight_marker(&data, &options, id(&data, 1), area).unwrap();
        assert_eq!(marker.bar, Rect::new(-1.5, 200.0, 3.0, 100.0));
        // Final snapshot: node 2 is 0, node 1 is 5, centered at 2.5MB.
        assert_eq!(marker.arrow, Point::new(101.0, 375.0));
    }

    #[test]
    fn hover_highlights_and_selects_time() {
        let mut data = two_sites();
        let mut view = MemgraphView::new(MemgraphOptions::default());
        view.draw(&data, &Viewport::sized(420.0, 435.0));
        let area = chart_area(420.0, 435.0, Legend::None);
        // Middle column, just above the baseline: the bottom series (node 2).
        let p = Point::new(area.x + area.w / 2.0, area.y + area.h - 1.0);
        view.hover(&mut data, p);
        let b = id(&data, 2);
        assert!(data.is_highlighted(b));
        assert_eq!(data.selected_time(), 1);

        view.unhover(&mut data);
        assert!(!data.is_highlighted(b));
    }
}
