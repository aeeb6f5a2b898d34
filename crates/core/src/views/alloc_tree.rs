//! The allocation tree as an indented list, one row per visible node, each
//! with a size bar for the selected snapshot.

use massif_view_protocol::{Paint, Point, Rect, RenderCommand, TextAlign, ThemeToken, Viewport};
use serde::{Deserialize, Serialize};

use super::Renderable;
use crate::color::ColorPair;
use crate::format::{format_percent, mbytes_to_bytes, pprint_bytes};
use crate::model::{ExpandState, LabelOptions, MassifData, NodeId, ShuffleDirection};

pub const SIZEBAR_PERCENT_WIDTH: f64 = 40.0;
pub const SIZEBAR_MBYTES_WIDTH: f64 = 50.0;

const ROW_HEIGHT: f64 = 18.0;
const INDENT: f64 = 16.0;
const FONT_SIZE: f64 = 11.0;
const BOX_WIDTH: f64 = 18.0;

/// What a row's size bar measures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizebarMode {
    #[default]
    PercentOfTotal,
    PercentOfParent,
    /// Absolute size; the bar still shows the share of the total.
    Mbytes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sizebar {
    /// Filled share of the bar, `0.0..=1.0` for well-formed trees.
    pub fraction: f64,
    pub width: f64,
    pub bar_width: f64,
    pub text: String,
    /// Absolute size, shown on hover whatever the mode.
    pub tooltip: String,
}

pub fn sizebar(data: &MassifData, id: NodeId, mode: SizebarMode) -> Sizebar {
    let time = data.selected_time();
    let mbytes = data.alloc_at(id, time);
    let container = match (mode, data.parent(id)) {
        (SizebarMode::PercentOfParent, Some(parent)) => data.alloc_at(parent, time),
        _ => data.total_at(time),
    };
    let fraction = if container != 0.0 {
        mbytes / container
    } else {
        0.0
    };
    let width = match mode {
        SizebarMode::Mbytes => SIZEBAR_MBYTES_WIDTH,
        SizebarMode::PercentOfTotal | SizebarMode::PercentOfParent => SIZEBAR_PERCENT_WIDTH,
    };
    let pretty = pprint_bytes(mbytes_to_bytes(mbytes));
    Sizebar {
        fraction,
        width,
        bar_width: ((width - 2.0) * fraction).round(),
        text: match mode {
            SizebarMode::Mbytes => pretty.clone(),
            _ => format_percent(fraction),
        },
        tooltip: pretty,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocTreeOptions {
    pub sizebar: SizebarMode,
    pub labels: LabelOptions,
    /// Show per-row checkboxes for choosing which sites are graphed.
    pub hide_boxes_visible: bool,
    pub shuffle_buttons_visible: bool,
}

impl Default for AllocTreeOptions {
    fn default() -> Self {
        Self {
            sizebar: SizebarMode::PercentOfTotal,
            labels: LabelOptions::default(),
            hide_boxes_visible: false,
            shuffle_buttons_visible: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocTreeRow {
    pub node: NodeId,
    pub uid: u64,
    pub depth: usize,
    pub expand: ExpandState,
    pub hidden: bool,
    pub label: String,
    /// Full signature, for tooltips.
    pub title: String,
    pub sizebar: Sizebar,
    /// Present only while the node is plotted.
    pub colors: Option<ColorPair>,
}

pub fn rows(data: &MassifData, options: &AllocTreeOptions) -> Vec<AllocTreeRow> {
    data.visible_nodes()
        .iter()
        .map(|&n| {
            let node = data.node(n);
            AllocTreeRow {
                node: n,
                uid: node.uid(),
                depth: data.depth(n),
                expand: node.expand_state(),
                hidden: data.is_hidden(n),
                label: node.signature().label(&options.labels),
                title: node.signature().full_func_name(),
                sizebar: sizebar(data, n, options.sizebar),
                colors: data
                    .is_plotted(n)
                    .then(|| data.colors(n).pair(data.is_highlighted(n))),
            }
        })
        .collect()
}

/// Parts of a row that respond to clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTarget {
    Expander,
    HideBox,
    MoveDown,
    MoveUp,
    Label,
}

#[derive(Debug, Clone, Default)]
pub struct AllocTreeView {
    options: AllocTreeOptions,
}

impl AllocTreeView {
    pub fn new(options: AllocTreeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AllocTreeOptions {
        &self.options
    }

    pub fn set_sizebar_mode(&mut self, mode: SizebarMode) {
        self.options.sizebar = mode;
    }

    pub fn set_labels(&mut self, labels: LabelOptions) {
        self.options.labels = labels;
    }

    /// Showing the checkboxes turns hiding on in the model; hiding them
    /// graphs every site again.
    pub fn set_hide_boxes_visible(&mut self, data: &mut MassifData, visible: bool) {
        self.options.hide_boxes_visible = visible;
        data.set_hiding_enabled(visible);
    }

    pub fn set_shuffle_buttons_visible(&mut self, visible: bool) {
        self.options.shuffle_buttons_visible = visible;
    }

    pub fn row_height(&self) -> f64 {
        ROW_HEIGHT
    }

    pub fn row_at(&self, data: &MassifData, y: f64) -> Option<NodeId> {
        if y < 0.0 {
            return None;
        }
        data.visible_nodes().get((y / ROW_HEIGHT) as usize).copied()
    }

    /// Which control of `node`'s row lies at horizontal offset `x`.
    pub fn target_at(&self, data: &MassifData, node: NodeId, x: f64) -> RowTarget {
        let layout = self.columns(data.depth(node));
        if x < layout.expander + INDENT {
            RowTarget::Expander
        } else if layout.hide_box.is_some_and(|h| x < h + BOX_WIDTH) {
            RowTarget::HideBox
        } else if layout.arrows.is_some_and(|a| x < a + BOX_WIDTH / 2.0) {
            RowTarget::MoveDown
        } else if layout.arrows.is_some_and(|a| x < a + BOX_WIDTH) {
            RowTarget::MoveUp
        } else {
            RowTarget::Label
        }
    }

    /// Apply a click on `target` of `node`'s row.
    pub fn click(&self, data: &mut MassifData, node: NodeId, target: RowTarget) {
        match target {
            RowTarget::Expander => data.toggle_expanded(node),
            RowTarget::HideBox => {
                let hidden = data.node(node).hide_requested();
                data.set_hidden(node, !hidden);
            }
            RowTarget::MoveDown => {
                data.shuffle(node, ShuffleDirection::Down);
            }
            RowTarget::MoveUp => {
                data.shuffle(node, ShuffleDirection::Up);
            }
            RowTarget::Label => {}
        }
    }

    fn columns(&self, depth: usize) -> Columns {
        let expander = depth as f64 * INDENT;
        let mut x = expander + INDENT;
        let hide_box = self.options.hide_boxes_visible.then(|| {
            let at = x;
            x += BOX_WIDTH;
            at
        });
        let arrows = self.options.shuffle_buttons_visible.then(|| {
            let at = x;
            x += BOX_WIDTH;
            at
        });
        Columns {
            expander,
            hide_box,
            arrows,
            sizebar: x + 2.0,
        }
    }
}

struct Columns {
    expander: f64,
    hide_box: Option<f64>,
    arrows: Option<f64>,
    sizebar: f64,
}

impl Renderable for AllocTreeView {
    fn draw(&mut self, data: &MassifData, viewport: &Viewport) -> Vec<RenderCommand> {
        let rows = rows(data, &self.options);
        let mut commands = Vec::with_capacity(rows.len() * 7 + 2);
        commands.push(RenderCommand::BeginGroup {
            id: "alloc-tree".into(),
            label: Some("Allocation tree".into()),
        });

        for (i, row) in rows.iter().enumerate() {
            let y = i as f64 * ROW_HEIGHT;
            if y + ROW_HEIGHT < viewport.y || y > viewport.y + viewport.height {
                continue;
            }
            let text_y = y + ROW_HEIGHT / 2.0 + 4.0;
            let (background, foreground): (Paint, Paint) = match row.colors {
                Some(pair) => (
                    pair.background.to_color().into(),
                    pair.foreground.to_color().into(),
                ),
                None if i % 2 == 0 => (
                    ThemeToken::TableRowEven.into(),
                    ThemeToken::TextPrimary.into(),
                ),
                None => (
                    ThemeToken::TableRowOdd.into(),
                    ThemeToken::TextPrimary.into(),
                ),
            };
            commands.push(RenderCommand::DrawRect {
                rect: Rect::new(0.0, y, viewport.width, ROW_HEIGHT),
                color: background,
                border_color: None,
                label: Some(row.title.clone()),
                node_uid: Some(row.uid),
            });

            let columns = self.columns(row.depth);
            let glyph = match row.expand {
                ExpandState::Leaf => "\u{2022}",
                ExpandState::Collapsed => "\u{25B8}",
                ExpandState::Expanded => "\u{25BE}",
            };
            commands.push(text(columns.expander + 4.0, text_y, glyph, foreground));
            if let Some(x) = columns.hide_box {
                let mark = if row.hidden { "\u{2610}" } else { "\u{2611}" };
                let color = if row.hidden {
                    ThemeToken::HiddenMarker.into()
                } else {
                    foreground
                };
                commands.push(text(x + 2.0, text_y, mark, color));
            }
            if let Some(x) = columns.arrows {
                commands.push(text(x + 1.0, text_y, "\u{2193}\u{2191}", foreground));
            }

            let bar = &row.sizebar;
            let bar_rect = Rect::new(columns.sizebar, y + 3.0, bar.width, ROW_HEIGHT - 6.0);
            commands.push(RenderCommand::DrawRect {
                rect: bar_rect,
                color: ThemeToken::Surface.into(),
                border_color: Some(ThemeToken::SizebarFrame),
                label: Some(bar.tooltip.clone()),
                node_uid: None,
            });
            if bar.bar_width > 0.0 {
                commands.push(RenderCommand::DrawRect {
                    rect: Rect::new(bar_rect.x + 1.0, bar_rect.y + 1.0, bar.bar_width, bar_rect.h - 2.0),
                    color: ThemeToken::SizebarFill.into(),
                    border_color: None,
                    label: None,
                    node_uid: None,
                });
            }
            commands.push(RenderCommand::DrawText {
                position: Point::new(bar_rect.x + bar.width / 2.0, text_y),
                text: bar.text.clone(),
                color: ThemeToken::TextPrimary.into(),
                font_size: FONT_SIZE - 2.0,
                align: TextAlign::Center,
                vertical: false,
            });
            commands.push(text(bar_rect.x + bar.width + 6.0, text_y, &row.label, foreground));
        }

        commands.push(RenderCommand::EndGroup);
        commands
    }
}

fn text(x: f64, y: f64, s: &str, color: Paint) -> RenderCommand {
    RenderCommand::DrawText {
        position: Point::new(x, y),
        text: s.to_string(),
        color,
        font_size: FONT_SIZE,
        align: TextAlign::Left,
        vertical: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::{id, model, site};

    fn tree() -> MassifData {
        let mut data = model(
            &[1.0, 2.0],
            vec![
                site(
                    1,
                    &[8.0, 60.0],
                    vec![site(3, &[2.0, 15.0], vec![]), site(4, &[6.0, 45.0], vec![])],
                ),
                site(2, &[2.0, 40.0], vec![]),
            ],
        );
        data.set_expanded(id(&data, 1), true);
        data
    }

    #[test]
    fn percent_of_total_and_parent() {
        let mut data = tree();
        data.select_time(1);
        let c = id(&data, 3);
        let total = sizebar(&data, c, SizebarMode::PercentOfTotal);
        assert_eq!(total.fraction, 0.15);
        assert_eq!(total.text, "15%");
        assert_eq!(total.bar_width, 6.0);
        assert_eq!(total.width, SIZEBAR_PERCENT_WIDTH);

        let parent = sizebar(&data, c, SizebarMode::PercentOfParent);
        assert_eq!(parent.fraction, 0.25);
        assert_eq!(parent.text, "25%");
        assert_eq!(parent.tooltip, "15MB");
    }

    #[test]
    fn mbytes_mode_shows_absolute_size() {
        let data = tree();
        let bar = sizebar(&data, id(&data, 4), SizebarMode::Mbytes);
        assert_eq!(bar.width, SIZEBAR_MBYTES_WIDTH);
        assert_eq!(bar.text, "6MB");
        assert_eq!(bar.fraction, 0.6);
        assert_eq!(bar.bar_width, 29.0);
    }

    #[test]
    fn rows_follow_visible_order_with_depth() {
        let data = tree();
        let rows = rows(&data, &AllocTreeOptions::default());
        let shape: Vec<(u64, usize)> = rows.iter().map(|r| (r.uid, r.depth)).collect();
        assert_eq!(shape, vec![(1, 0), (3, 1), (4, 1), (2, 0)]);
        assert_eq!(rows[0].expand, ExpandState::Expanded);
        assert!(rows[0].colors.is_none());
        assert_eq!(rows[1].expand, ExpandState::Leaf);
        assert_eq!(rows[1].colors, Some(data.colors(id(&data, 3)).normal));
    }

    #[test]
    fn hide_boxes_toggle_model_hiding() {
        let mut data = tree();
        let mut view = AllocTreeView::new(AllocTreeOptions::default());
        let b = id(&data, 2);
        data.set_hidden(b, true);
        view.set_hide_boxes_visible(&mut data, false);
        assert!(!data.hiding_enabled());
        assert!(data.plotted_nodes().contains(&b));
        view.set_hide_boxes_visible(&mut data, true);
        assert!(!data.plotted_nodes().contains(&b));
    }

    #[test]
    fn clicks_map_to_mutators() {
        let mut data = tree();
        let view = AllocTreeView::new(AllocTreeOptions {
            hide_boxes_visible: true,
            ..Default::default()
        });
        let a = id(&data, 1);
        assert_eq!(view.row_at(&data, 0.0), Some(a));
        assert_eq!(view.target_at(&data, a, 2.0), RowTarget::Expander);
        view.click(&mut data, a, RowTarget::Expander);
        assert!(!data.is_expanded(a));

        let b = id(&data, 2);
        assert_eq!(view.target_at(&data, b, INDENT + 1.0), RowTarget::HideBox);
        view.click(&mut data, b, RowTarget::HideBox);
        assert!(data.is_hidden(b));
        assert_eq!(data.plotted_nodes(), &[a]);
    }
}
