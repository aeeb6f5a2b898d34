//! Treemap of the allocation tree.
//!
//! Siblings are split into two groups, each group gets a share of the
//! rectangle proportional to its weight along the rectangle's longer side,
//! and groups recurse until every box holds one node. An expanded node's
//! box nests its children inside its interior.
//!
//! The box hierarchy is built once from all-time peak sizes and then only
//! resized when the selected time or the viewport changes.

use massif_view_protocol::{
    Paint, Point, Rect, RenderCommand, TextAlign, ThemeToken, Viewport,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Renderable;
use crate::model::{MassifData, ModelEvent, NodeId};

pub const SMALL_TEXT_SIZE: f64 = 10.0;
pub const NORMAL_TEXT_SIZE: f64 = 12.0;
pub const LARGE_TEXT_SIZE: f64 = 18.0;

/// How a sibling list is divided before recursing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Greedy left-to-right pass that keeps the two halves close in weight.
    #[default]
    Bisect,
    /// The heaviest node alone, then everything else.
    Biggest,
}

/// Which sample a node is weighed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    /// Peak over the whole run.
    Max,
    AtTime(usize),
}

impl Weight {
    pub fn of(self, data: &MassifData, id: NodeId) -> f64 {
        match self {
            Self::Max => data.max_size(id),
            Self::AtTime(t) => data.alloc_at(id, t),
        }
    }

    fn sum(self, data: &MassifData, nodes: &[NodeId]) -> f64 {
        nodes.iter().map(|&n| self.of(data, n)).sum()
    }
}

/// What box areas are proportional to once the layout is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBasis {
    #[default]
    SelectedTime,
    Peak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreemapOptions {
    pub border: f64,
    pub padding: f64,
    pub text_size: f64,
    /// Only plotted nodes reserve a label strip.
    pub label_only_leaf: bool,
    pub split: SplitStrategy,
    pub size_basis: SizeBasis,
}

impl Default for TreemapOptions {
    fn default() -> Self {
        Self {
            border: 1.0,
            padding: 1.0,
            text_size: NORMAL_TEXT_SIZE,
            label_only_leaf: false,
            split: SplitStrategy::Bisect,
            size_basis: SizeBasis::SelectedTime,
        }
    }
}

impl TreemapOptions {
    /// Border plus padding, consumed on every side of a node box.
    fn frame(&self) -> f64 {
        self.border + self.padding
    }

    fn min_size(&self) -> f64 {
        2.0 * self.frame()
    }
}

/// Divide `nodes` into two groups for one level of the layout.
///
/// A single node comes back as one group. The second group is never empty
/// when there are two or more nodes.
pub fn split_nodes(
    data: &MassifData,
    nodes: &[NodeId],
    weight: Weight,
    strategy: SplitStrategy,
) -> Vec<Vec<NodeId>> {
    if nodes.len() <= 1 {
        return vec![nodes.to_vec()];
    }
    let (mut group1, mut group2) = match strategy {
        SplitStrategy::Biggest => {
            let mut biggest = 0;
            let mut biggest_size = f64::NEG_INFINITY;
            for (i, &n) in nodes.iter().enumerate() {
                let size = weight.of(data, n);
                if size > biggest_size {
                    biggest_size = size;
                    biggest = i;
                }
            }
            let rest = nodes
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != biggest)
                .map(|(_, &n)| n)
                .collect();
            (vec![nodes[biggest]], rest)
        }
        SplitStrategy::Bisect => {
            let mut diff = 0.0;
            let mut group1 = Vec::new();
            let mut group2 = Vec::new();
            for &n in nodes {
                let size = weight.of(data, n);
                if diff >= 0.0 {
                    group1.push(n);
                    diff -= size;
                } else {
                    group2.push(n);
                    diff += size;
                }
            }
            (group1, group2)
        }
    };
    // Leading zero-weight nodes can pull everything into the first group.
    if group2.is_empty()
        && let Some(last) = group1.pop()
    {
        group2.push(last);
    }
    vec![group1, group2]
}

/// One box of the layout: a node, or a group of siblings still being split.
#[derive(Debug, Clone, PartialEq)]
pub struct TreemapBox {
    /// `None` for a group box.
    pub node: Option<NodeId>,
    /// Whether this box and its siblings are laid out left to right.
    pub horizontal: bool,
    /// Space assigned by the parent, frame included.
    pub rect: Rect,
    /// Interior after the frame and label strip; children go here.
    pub content: Rect,
    /// Label strip, when one is reserved.
    pub label: Option<Rect>,
    /// Whether the label reads top to bottom.
    pub label_vertical: bool,
    /// Node boxes with no interior left are not drawn.
    pub shown: bool,
    pub children: Vec<TreemapBox>,
}

impl TreemapBox {
    fn group(horizontal: bool, children: Vec<TreemapBox>) -> Self {
        Self {
            node: None,
            horizontal,
            rect: Rect::new(0.0, 0.0, 0.0, 0.0),
            content: Rect::new(0.0, 0.0, 0.0, 0.0),
            label: None,
            label_vertical: false,
            shown: true,
            children,
        }
    }

    fn weight(&self, data: &MassifData, weight: Weight) -> f64 {
        match self.node {
            Some(n) => weight.of(data, n),
            None => self.children.iter().map(|c| c.weight(data, weight)).sum(),
        }
    }

    fn find(&self, id: NodeId) -> Option<&TreemapBox> {
        if self.node == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    fn find_mut(&mut self, id: NodeId) -> Option<&mut TreemapBox> {
        if self.node == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    fn node_at(&self, p: Point) -> Option<NodeId> {
        if !self.shown || !self.rect.contains(p) {
            return None;
        }
        self.children
            .iter()
            .find_map(|c| c.node_at(p))
            .or(self.node)
    }

    /// Node boxes at or below this one, pre-order.
    fn visit<'a>(&'a self, out: &mut Vec<&'a TreemapBox>) {
        if self.node.is_some() {
            out.push(self);
        }
        for child in &self.children {
            child.visit(out);
        }
    }
}

/// Boxes under an interior too small to hold them take up no space.
fn collapse(boxes: &mut [TreemapBox], at: Point) {
    for b in boxes {
        b.rect = Rect::new(at.x, at.y, 0.0, 0.0);
        b.content = b.rect;
        b.label = None;
        b.shown = false;
        collapse(&mut b.children, at);
    }
}

/// A built treemap: the box hierarchy plus the options it was built with.
#[derive(Debug, Clone)]
pub struct TreemapLayout {
    options: TreemapOptions,
    width: f64,
    height: f64,
    boxes: Vec<TreemapBox>,
}

impl TreemapLayout {
    /// Build the box hierarchy for the root's children from peak sizes,
    /// then size every box.
    pub fn build(data: &MassifData, options: TreemapOptions, width: f64, height: f64) -> Self {
        let mut layout = Self {
            options,
            width,
            height,
            boxes: Vec::new(),
        };
        layout.boxes = layout.populate(data, data.children(data.root()), width, height);
        layout.resize(data, width, height);
        debug!(
            boxes = layout.node_boxes().len(),
            width, height, "built treemap"
        );
        layout
    }

    pub fn options(&self) -> &TreemapOptions {
        &self.options
    }

    pub fn boxes(&self) -> &[TreemapBox] {
        &self.boxes
    }

    /// Every node box, pre-order.
    pub fn node_boxes(&self) -> Vec<&TreemapBox> {
        let mut out = Vec::new();
        for b in &self.boxes {
            b.visit(&mut out);
        }
        out
    }

    pub fn find(&self, id: NodeId) -> Option<&TreemapBox> {
        self.boxes.iter().find_map(|b| b.find(id))
    }

    pub fn node_at(&self, p: Point) -> Option<NodeId> {
        self.boxes.iter().find_map(|b| b.node_at(p))
    }

    fn size_weight(&self, data: &MassifData) -> Weight {
        match self.options.size_basis {
            SizeBasis::SelectedTime => Weight::AtTime(data.selected_time()),
            SizeBasis::Peak => Weight::Max,
        }
    }

    /// Create boxes for `nodes` without positioning them. Groups too small
    /// to hold a framed box are left out.
    fn populate(&self, data: &MassifData, nodes: &[NodeId], width: f64, height: f64) -> Vec<TreemapBox> {
        if nodes.is_empty() {
            return Vec::new();
        }
        let horizontal = width > height;
        let total = Weight::Max.sum(data, nodes);
        if total <= 0.0 {
            return Vec::new();
        }

        let frame = self.options.frame();
        let min_size = self.options.min_size();
        let mut boxes = Vec::new();
        for group in split_nodes(data, nodes, Weight::Max, self.options.split) {
            let ratio = Weight::Max.sum(data, &group) / total;
            let (mut w, mut h) = if horizontal {
                ((width * ratio).floor(), height)
            } else {
                (width, (height * ratio).floor())
            };
            if w < min_size || h < min_size {
                continue;
            }

            let &[node] = group.as_slice() else {
                boxes.push(TreemapBox::group(
                    horizontal,
                    self.populate(data, &group, w, h),
                ));
                continue;
            };

            w -= 2.0 * frame;
            h -= 2.0 * frame;
            if self.reserves_label(data, node) {
                if w > h {
                    h -= self.options.text_size;
                } else {
                    w -= self.options.text_size;
                }
            }
            let children = if data.is_expanded(node) && w > 0.0 && h > 0.0 {
                self.populate(data, data.children(node), w, h)
            } else {
                Vec::new()
            };
            boxes.push(TreemapBox {
                node: Some(node),
                children,
                ..TreemapBox::group(horizontal, Vec::new())
            });
        }
        boxes
    }

    fn reserves_label(&self, data: &MassifData, node: NodeId) -> bool {
        !(self.options.label_only_leaf && !data.is_plotted(node))
    }

    /// Re-size the existing hierarchy for new dimensions or a new selected
    /// time. The structure is left alone.
    pub fn resize(&mut self, data: &MassifData, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        let weight = self.size_weight(data);
        let area = Rect::new(0.0, 0.0, width, height);
        let mut boxes = std::mem::take(&mut self.boxes);
        self.resize_level(data, weight, &mut boxes, area);
        self.boxes = boxes;
    }

    fn resize_level(&self, data: &MassifData, weight: Weight, boxes: &mut [TreemapBox], area: Rect) {
        let mut remaining_total: f64 = boxes.iter().map(|b| b.weight(data, weight)).sum();
        let mut remaining_w = area.w;
        let mut remaining_h = area.h;
        let mut cursor = Point::new(area.x, area.y);
        let count = boxes.len();

        for (i, b) in boxes.iter_mut().enumerate() {
            let size = b.weight(data, weight);
            let share = |remaining: f64| {
                if i + 1 == count && remaining_total > 0.0 {
                    remaining
                } else if remaining_total > 0.0 {
                    (remaining * size / remaining_total).round()
                } else {
                    0.0
                }
            };
            let (w, h) = if b.horizontal {
                let w = share(remaining_w);
                remaining_w -= w;
                (w, area.h)
            } else {
                let h = share(remaining_h);
                remaining_h -= h;
                (area.w, h)
            };
            remaining_total -= size;

            b.rect = Rect::new(cursor.x, cursor.y, w, h);
            if b.horizontal {
                cursor.x += w;
            } else {
                cursor.y += h;
            }

            let Some(node) = b.node else {
                b.content = b.rect;
                self.resize_level(data, weight, &mut b.children, b.rect);
                continue;
            };

            let inner = b.rect.inset(self.options.frame());
            b.shown = inner.is_drawable();
            b.label_vertical = inner.w <= inner.h;
            b.label = None;
            let mut content = inner;
            if self.reserves_label(data, node) {
                let ts = self.options.text_size;
                if b.label_vertical {
                    b.label = Some(Rect::new(inner.x, inner.y, ts.min(inner.w), inner.h));
                    content = Rect::new(inner.x + ts, inner.y, inner.w - ts, inner.h);
                } else {
                    b.label = Some(Rect::new(inner.x, inner.y, inner.w, ts.min(inner.h)));
                    content = Rect::new(inner.x, inner.y + ts, inner.w, inner.h - ts);
                }
            }
            b.content = content;
            if content.is_drawable() {
                self.resize_level(data, weight, &mut b.children, content);
            } else {
                collapse(&mut b.children, Point::new(content.x, content.y));
            }
        }
    }

    /// Bring one node's box in line with its new expansion state, then
    /// re-size everything.
    pub fn on_expanded(&mut self, data: &MassifData, id: NodeId, expanded: bool) {
        if data.children(id).is_empty() {
            return;
        }
        let Some(content) = self.boxes.iter().find_map(|b| b.find(id)).map(|b| b.content) else {
            return;
        };
        let children = if expanded {
            if self.find(id).is_some_and(|b| !b.children.is_empty()) {
                return;
            }
            if !content.is_drawable() {
                return;
            }
            self.populate(data, data.children(id), content.w, content.h)
        } else {
            Vec::new()
        };
        if let Some(b) = self.boxes.iter_mut().find_map(|b| b.find_mut(id)) {
            b.children = children;
        }
        self.resize(data, self.width, self.height);
    }

    pub fn render(&self, data: &MassifData) -> Vec<RenderCommand> {
        let node_boxes = self.node_boxes();
        let mut commands = Vec::with_capacity(node_boxes.len() * 2 + 3);
        commands.push(RenderCommand::BeginGroup {
            id: "treemap".into(),
            label: Some("Treemap".into()),
        });
        commands.push(RenderCommand::DrawRect {
            rect: Rect::new(0.0, 0.0, self.width, self.height),
            color: ThemeToken::TreemapBackground.into(),
            border_color: None,
            label: None,
            node_uid: None,
        });

        let border = (self.options.border > 0.0).then_some(ThemeToken::TreemapBorder);
        for b in node_boxes {
            let Some(node) = b.node else { continue };
            if !b.shown {
                continue;
            }
            let (fill, text): (Paint, Paint) = if data.is_plotted(node) {
                let pair = data.colors(node).pair(data.is_highlighted(node));
                (
                    pair.background.to_color().into(),
                    pair.foreground.to_color().into(),
                )
            } else {
                (
                    ThemeToken::TreemapUnplotted.into(),
                    ThemeToken::TextPrimary.into(),
                )
            };
            let name = data.node(node).func_name();
            commands.push(RenderCommand::DrawRect {
                rect: b.rect.inset(self.options.padding),
                color: fill,
                border_color: border,
                label: Some(name.clone()),
                node_uid: Some(data.node(node).uid()),
            });
            if let Some(strip) = b.label.filter(Rect::is_drawable) {
                let position = if b.label_vertical {
                    Point::new(strip.x + strip.w * 0.8, strip.y + 2.0)
                } else {
                    Point::new(strip.x + 2.0, strip.y + strip.h * 0.8)
                };
                commands.push(RenderCommand::DrawText {
                    position,
                    text: name,
                    color: text,
                    font_size: self.options.text_size,
                    align: TextAlign::Left,
                    vertical: b.label_vertical,
                });
            }
        }

        commands.push(RenderCommand::EndGroup);
        commands
    }
}

/// The treemap as a [`Renderable`], rebuilding or re-sizing its layout as
/// model events arrive.
#[derive(Debug, Clone, Default)]
pub struct TreemapView {
    options: TreemapOptions,
    layout: Option<TreemapLayout>,
    stale: bool,
    needs_resize: bool,
}

impl TreemapView {
    pub fn new(options: TreemapOptions) -> Self {
        Self {
            options,
            layout: None,
            stale: true,
            needs_resize: false,
        }
    }

    pub fn options(&self) -> &TreemapOptions {
        &self.options
    }

    /// Replace the options; the next draw rebuilds from scratch.
    pub fn set_options(&mut self, options: TreemapOptions) {
        self.options = options;
        self.stale = true;
    }

    pub fn layout(&self) -> Option<&TreemapLayout> {
        self.layout.as_ref()
    }

    pub fn node_at(&self, p: Point) -> Option<NodeId> {
        self.layout.as_ref()?.node_at(p)
    }

    /// Clicking a leaf toggles its parent, since a leaf cannot expand.
    pub fn click(&self, data: &mut MassifData, p: Point) {
        let Some(mut node) = self.node_at(p) else {
            return;
        };
        if data.children(node).is_empty() {
            match data.parent(node) {
                Some(parent) if parent != data.root() => node = parent,
                _ => return,
            }
        }
        data.toggle_expanded(node);
    }
}

impl Renderable for TreemapView {
    fn draw(&mut self, data: &MassifData, viewport: &Viewport) -> Vec<RenderCommand> {
        match &mut self.layout {
            Some(layout) if !self.stale => {
                let size_changed =
                    layout.width != viewport.width || layout.height != viewport.height;
                if self.needs_resize || size_changed {
                    layout.resize(data, viewport.width, viewport.height);
                }
            }
            _ => {
                self.layout = Some(TreemapLayout::build(
                    data,
                    self.options.clone(),
                    viewport.width,
                    viewport.height,
                ));
                self.stale = false;
            }
        }
        self.needs_resize = false;
        self.layout
            .as_ref()
            .map(|l| l.render(data))
            .unwrap_or_default()
    }

    fn on_event(&mut self, data: &MassifData, event: &ModelEvent) {
        match *event {
            ModelEvent::NodeShuffled { .. } => self.stale = true,
            ModelEvent::NodeExpanded { node, expanded, .. } => {
                if let Some(layout) = &mut self.layout {
                    layout.on_expanded(data, node, expanded);
                }
            }
            ModelEvent::TimeSelected { .. } | ModelEvent::VisibleChanged => {
                self.needs_resize = true;
            }
            _ => {}
        }
    }

    fn on_resize(&mut self, data: &MassifData, viewport: &Viewport) {
        if let Some(layout) = &mut self.layout
            && !self.stale
        {
            layout.resize(data, viewport.width, viewport.height);
        }
    }
}
