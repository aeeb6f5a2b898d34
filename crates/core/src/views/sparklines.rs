//! One small chart per node: the node's allocations over time
//! (sparklines) or the change at each snapshot (difflines).

use massif_view_protocol::{Paint, Point, Rect, RenderCommand, TextAlign, ThemeToken, Viewport};
use serde::{Deserialize, Serialize};

use super::Renderable;
use crate::format::{mbytes_to_bytes, pprint_bytes};
use crate::model::{MassifData, ModelEvent, NodeId};

pub const MEDIUM_ITEM_HEIGHT: f64 = 40.0;
pub const LARGE_ITEM_HEIGHT: f64 = 60.0;

/// Rows taller than this show an axis line.
const AXIS_MIN_HEIGHT: f64 = 35.0;
const LABEL_FRACTION: f64 = 0.4;
const FONT_SIZE: f64 = 11.0;

const INDENT_LAST: &str = "\u{250B}\u{00A0}";
const INDENT_MORE: &str = "\u{2503}\u{00A0}";
const BULLET_LAST: &str = "\u{2517}\u{00A0}";
const BULLET_MORE: &str = "\u{2523}\u{00A0}";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparklineOptions {
    /// Fixed row height; `None` shares the view height between rows.
    pub item_height: Option<f64>,
    /// Append each node's peak size to its label.
    pub display_sizes: bool,
    /// Show every visible node with tree glyphs instead of plotted nodes.
    pub nested: bool,
    /// Chart per-snapshot changes instead of sizes.
    pub diff: bool,
}

/// Tree glyphs drawn before a node's name in nested mode.
pub fn indent_for(data: &MassifData, id: NodeId) -> String {
    let is_last = |n: NodeId| {
        data.parent(n)
            .is_some_and(|p| data.children(p).last() == Some(&n))
    };

    let mut ancestors = Vec::new();
    let mut cur = data.parent(id);
    while let Some(n) = cur {
        let Some(parent) = data.parent(n) else { break };
        ancestors.push(if is_last(n) { INDENT_LAST } else { INDENT_MORE });
        cur = Some(parent);
    }

    let mut indent: String = ancestors.into_iter().rev().collect();
    indent.push_str(if is_last(id) { BULLET_LAST } else { BULLET_MORE });
    indent
}

pub fn label_for(data: &MassifData, id: NodeId, options: &SparklineOptions) -> String {
    let mut label = if options.nested {
        indent_for(data, id)
    } else {
        String::new()
    };
    label.push_str(data.node(id).signature().base_name());
    if options.display_sizes {
        label.push_str(&format!(
            " ({})",
            pprint_bytes(mbytes_to_bytes(data.max_size(id)))
        ));
    }
    label
}

/// Largest absolute step of a series, counting the first sample as a step
/// up from zero.
pub fn diff_range(allocs: &[f64]) -> f64 {
    let first = allocs.first().copied().unwrap_or(0.0);
    allocs
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(first, f64::max)
}

/// Four cells per snapshot plus one: a `0, diff, 0` spike wherever the
/// value changed, and gaps elsewhere so unchanged stretches draw nothing.
pub fn diff_spikes(allocs: &[f64]) -> Vec<Option<f64>> {
    let mut cells = vec![None; allocs.len() * 4 + 1];
    let mut prev = 0.0;
    for (j, &v) in allocs.iter().enumerate() {
        let diff = v - prev;
        if diff != 0.0 {
            cells[j * 4] = Some(0.0);
            cells[j * 4 + 1] = Some(diff);
            cells[j * 4 + 2] = Some(0.0);
        }
        prev = v;
    }
    cells
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SparklineRow {
    pub node: NodeId,
    pub uid: u64,
    pub label: String,
    pub color: Paint,
    pub min: f64,
    /// `None` lets the chart scale to the row's own peak.
    pub max: Option<f64>,
    pub values: Vec<Option<f64>>,
}

/// The nodes a sparkline view shows, in display order.
pub fn row_nodes<'a>(data: &'a MassifData, options: &SparklineOptions) -> &'a [NodeId] {
    if options.nested {
        data.visible_nodes()
    } else {
        data.plotted_nodes()
    }
}

pub fn rows(data: &MassifData, options: &SparklineOptions) -> Vec<SparklineRow> {
    row_nodes(data, options)
        .iter()
        .map(|&n| {
            let allocs = data.node(n).allocs();
            let color = if !options.nested || data.is_plotted(n) {
                Paint::Rgb(data.colors(n).normal.background.to_color())
            } else {
                Paint::Token(ThemeToken::SparklineMuted)
            };
            let (min, max, values) = if options.diff {
                let range = diff_range(allocs);
                (-range, Some(range), diff_spikes(allocs))
            } else {
                (0.0, None, allocs.iter().copied().map(Some).collect())
            };
            SparklineRow {
                node: n,
                uid: data.node(n).uid(),
                label: label_for(data, n, options),
                color,
                min,
                max,
                values,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct SparklinesView {
    options: SparklineOptions,
    row_height: f64,
    selected: Option<NodeId>,
}

impl SparklinesView {
    pub fn new(options: SparklineOptions) -> Self {
        Self {
            options,
            row_height: 0.0,
            selected: None,
        }
    }

    pub fn options(&self) -> &SparklineOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut SparklineOptions {
        &mut self.options
    }

    /// The row currently marked as selected.
    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    /// Node of the row under `y`, using the row height of the last draw.
    pub fn row_at(&self, data: &MassifData, y: f64) -> Option<NodeId> {
        if self.row_height <= 0.0 || y < 0.0 {
            return None;
        }
        let index = (y / self.row_height) as usize;
        row_nodes(data, &self.options).get(index).copied()
    }

    /// Highlight the node of row `index` and clear every other row.
    pub fn select_row(&self, data: &mut MassifData, index: Option<usize>) {
        let nodes = row_nodes(data, &self.options).to_vec();
        for &n in &nodes {
            data.set_highlighted(n, false);
        }
        if let Some(&n) = index.and_then(|i| nodes.get(i)) {
            data.set_highlighted(n, true);
        }
    }

    fn row_height_for(&self, rows: usize, viewport: &Viewport) -> f64 {
        match self.options.item_height {
            Some(h) => h,
            None if rows > 0 => viewport.height / rows as f64,
            None => 0.0,
        }
    }
}

impl Renderable for SparklinesView {
    fn draw(&mut self, data: &MassifData, viewport: &Viewport) -> Vec<RenderCommand> {
        let rows = rows(data, &self.options);
        self.row_height = self.row_height_for(rows.len(), viewport);
        let row_h = self.row_height;
        let label_w = viewport.width * LABEL_FRACTION;
        let chart_x = label_w + 4.0;
        let chart_w = (viewport.width - chart_x - 4.0).max(0.0);

        let mut commands = Vec::with_capacity(rows.len() * 8 + 2);
        commands.push(RenderCommand::BeginGroup {
            id: (if self.options.diff { "difflines" } else { "sparklines" }).into(),
            label: None,
        });

        for (i, row) in rows.iter().enumerate() {
            let y = i as f64 * row_h;
            if y + row_h < viewport.y || y > viewport.y + viewport.height {
                continue;
            }
            if self.selected == Some(row.node) {
                commands.push(RenderCommand::DrawRect {
                    rect: Rect::new(0.0, y, viewport.width, row_h),
                    color: ThemeToken::SelectionHighlight.into(),
                    border_color: None,
                    label: None,
                    node_uid: None,
                });
            }
            commands.push(RenderCommand::DrawText {
                position: Point::new(label_w, y + row_h / 2.0 + FONT_SIZE / 3.0),
                text: row.label.clone(),
                color: ThemeToken::TextPrimary.into(),
                font_size: FONT_SIZE,
                align: TextAlign::Right,
                vertical: false,
            });
            push_chart(
                &mut commands,
                row,
                Rect::new(chart_x, y + 1.0, chart_w, row_h - 2.0),
                self.options.diff,
            );
            if row_h > AXIS_MIN_HEIGHT {
                let base = if self.options.diff {
                    y + row_h / 2.0
                } else {
                    y + row_h - 1.0
                };
                commands.push(RenderCommand::DrawLine {
                    from: Point::new(chart_x, base),
                    to: Point::new(chart_x + chart_w, base),
                    color: ThemeToken::SparklineBaseline.into(),
                    width: 1.0,
                });
            }
        }

        commands.push(RenderCommand::EndGroup);
        commands
    }

    fn on_event(&mut self, _data: &MassifData, event: &ModelEvent) {
        if let ModelEvent::NodeHighlighted {
            node, highlighted, ..
        } = *event
        {
            if highlighted {
                self.selected = Some(node);
            } else if self.selected == Some(node) {
                self.selected = None;
            }
        }
    }
}

fn push_chart(commands: &mut Vec<RenderCommand>, row: &SparklineRow, area: Rect, diff: bool) {
    if !area.is_drawable() || row.values.is_empty() {
        return;
    }
    let max = row.max.unwrap_or_else(|| {
        row.values
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f64::max)
    });
    let span = max - row.min;
    if span <= 0.0 {
        return;
    }
    let y_of = |v: f64| area.y + area.h - (v - row.min) / span * area.h;
    let step = area.w / row.values.len() as f64;

    if diff {
        let zero = y_of(0.0);
        for (i, v) in row.values.iter().enumerate() {
            let Some(v) = *v else { continue };
            if v == 0.0 {
                continue;
            }
            let x = area.x + (i as f64 + 0.5) * step;
            commands.push(RenderCommand::DrawLine {
                from: Point::new(x, zero),
                to: Point::new(x, y_of(v)),
                color: row.color,
                width: 1.0,
            });
        }
    } else {
        let base = y_of(row.min);
        for (i, v) in row.values.iter().enumerate() {
            let Some(v) = *v else { continue };
            let top = y_of(v);
            if base - top < 0.1 {
                continue;
            }
            commands.push(RenderCommand::DrawRect {
                rect: Rect::new(area.x + i as f64 * step, top, step, base - top),
                color: row.color,
                border_color: None,
                label: None,
                node_uid: Some(row.uid),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::{id, model, site};

    fn tree() -> MassifData {
        let mut data = model(
            &[1.0, 2.0, 3.0],
            vec![
                site(
                    1,
                    &[4.0, 6.0, 6.0],
                    vec![site(3, &[1.0, 2.0, 2.0], vec![]), site(4, &[3.0, 4.0, 4.0], vec![])],
                ),
                site(2, &[1.0, 1.0, 3.0], vec![]),
            ],
        );
        data.set_expanded(id(&data, 1), true);
        data
    }

    #[test]
    fn nested_labels_draw_tree_glyphs() {
        let data = tree();
        assert_eq!(indent_for(&data, id(&data, 1)), "\u{2523}\u{00A0}");
        assert_eq!(indent_for(&data, id(&data, 2)), "\u{2517}\u{00A0}");
        assert_eq!(
            indent_for(&data, id(&data, 3)),
            "\u{2503}\u{00A0}\u{2523}\u{00A0}"
        );
        assert_eq!(
            indent_for(&data, id(&data, 4)),
            "\u{2503}\u{00A0}\u{2517}\u{00A0}"
        );
    }

    #[test]
    fn labels_use_base_name_and_optional_size() {
        let data = tree();
        let options = SparklineOptions {
            display_sizes: true,
            ..Default::default()
        };
        assert_eq!(label_for(&data, id(&data, 2), &options), "f2 (3MB)");
    }

    #[test]
    fn nested_mode_mutes_unplotted_rows() {
        let data = tree();
        let options = SparklineOptions {
            nested: true,
            ..Default::default()
        };
        let rows = rows(&data, &options);
        let uids: Vec<u64> = rows.iter().map(|r| r.uid).collect();
        assert_eq!(uids, vec![1, 3, 4, 2]);
        assert_eq!(rows[0].color, Paint::Token(ThemeToken::SparklineMuted));
        assert!(matches!(rows[1].color, Paint::Rgb(_)));
        assert_eq!(rows[1].min, 0.0);
        assert_eq!(rows[1].max, None);

        let flat = super::rows(&data, &SparklineOptions::default());
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn difflines_spike_on_change_only() {
        assert_eq!(diff_range(&[1.0, 2.0, 2.0]), 1.0);
        assert_eq!(diff_range(&[1.0, 6.0, 2.0]), 5.0);
        let cells = diff_spikes(&[1.0, 1.0, 3.0]);
        assert_eq!(cells.len(), 13);
        assert_eq!(&cells[0..3], &[Some(0.0), Some(1.0), Some(0.0)]);
        assert_eq!(&cells[4..7], &[None, None, None]);
        assert_eq!(&cells[8..11], &[Some(0.0), Some(2.0), Some(0.0)]);
        assert_eq!(cells[12], None);
    }

    #[test]
    fn selecting_a_row_highlights_only_that_node() {
        let mut data = tree();
        let view = SparklinesView::new(SparklineOptions::default());
        view.select_row(&mut data, Some(0));
        view.select_row(&mut data, Some(1));
        assert!(!data.is_highlighted(id(&data, 3)));
        assert!(data.is_highlighted(id(&data, 4)));
        view.select_row(&mut data, None);
        assert!(!data.is_highlighted(id(&data, 4)));
    }

    #[test]
    fn row_lookup_uses_drawn_height() {
        let data = tree();
        let mut view = SparklinesView::new(SparklineOptions {
            item_height: Some(MEDIUM_ITEM_HEIGHT),
            ..Default::default()
        });
        let commands = view.draw(&data, &Viewport::sized(400.0, 300.0));
        assert!(!commands.is_empty());
        assert_eq!(view.row_at(&data, 45.0), Some(id(&data, 4)));
        assert_eq!(view.row_at(&data, 500.0), None);
    }
}
