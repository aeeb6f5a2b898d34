use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use super::events::{EventHub, Listeners};
use super::node::{ExpandState, HeapSeqNode, NodeId};
use crate::color::{HexColor, NodeColors};

/// Where [`MassifData::shuffle`] moves a node among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleDirection {
    /// One place toward the front.
    Up,
    /// One place toward the back.
    Down,
    /// To the front, then the same for every ancestor.
    Top,
    /// To the back, then the same for every ancestor.
    Bottom,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown shuffle direction {0:?} (expected up, down, top or bottom)")]
pub struct ShuffleDirectionError(pub String);

impl FromStr for ShuffleDirection {
    type Err = ShuffleDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            other => Err(ShuffleDirectionError(other.to_string())),
        }
    }
}

/// The heap profile being viewed: the allocation tree, the snapshot
/// timeline, the selected snapshot, and the derived visible/plotted sets.
///
/// This is the only writer of derived state and the only source of change
/// notifications. Views read from it and call its mutators; they never
/// talk to each other.
pub struct MassifData {
    pub(crate) times: Vec<f64>,
    pub(crate) nodes: Vec<HeapSeqNode>,
    pub(crate) root: NodeId,
    pub(crate) selected_time: usize,
    pub(crate) visible: Vec<NodeId>,
    pub(crate) plotted: Vec<NodeId>,
    pub(crate) hiding_enabled: bool,
    pub(crate) events: EventHub,
}

impl fmt::Debug for MassifData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MassifData")
            .field("snapshots", &self.times.len())
            .field("nodes", &self.nodes.len())
            .field("selected_time", &self.selected_time)
            .field("visible", &self.visible.len())
            .field("plotted", &self.plotted.len())
            .field("hiding_enabled", &self.hiding_enabled)
            .field("listeners", &self.events.listener_count())
            .finish()
    }
}

impl MassifData {
    // --- Read access ---

    /// Snapshot timestamps, one per entry of every node's `allocs`.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// The synthetic root. It is never visible or plotted itself.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &HeapSeqNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node id, in pre-order from the root.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = vec![self.root];
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
            Some(id)
        })
    }

    pub fn find_by_uid(&self, uid: u64) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.uid == uid)
            .map(NodeId)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Distance from the root's children (which are at depth 0).
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cur = self.nodes[id.0].parent;
        while let Some(p) = cur {
            cur = self.nodes[p.0].parent;
            if cur.is_some() {
                depth += 1;
            }
        }
        depth
    }

    pub fn selected_time(&self) -> usize {
        self.selected_time
    }

    /// Nodes reachable through expanded ancestors, in display order.
    pub fn visible_nodes(&self) -> &[NodeId] {
        &self.visible
    }

    /// The visible, unexpanded, unhidden nodes whose series are drawn.
    pub fn plotted_nodes(&self) -> &[NodeId] {
        &self.plotted
    }

    pub fn hiding_enabled(&self) -> bool {
        self.hiding_enabled
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.nodes[id.0].expand.is_expanded()
    }

    /// The node's own hide flag, honored only while hiding is enabled.
    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.hiding_enabled && self.nodes[id.0].hidden
    }

    pub fn is_highlighted(&self, id: NodeId) -> bool {
        self.nodes[id.0].highlighted
    }

    pub fn is_plotted(&self, id: NodeId) -> bool {
        self.nodes[id.0].plotted
    }

    pub fn colors(&self, id: NodeId) -> &NodeColors {
        &self.nodes[id.0].colors
    }

    pub fn max_size(&self, id: NodeId) -> f64 {
        self.nodes[id.0].max_size()
    }

    /// Megabytes attributed to `id` at snapshot `time`.
    pub fn alloc_at(&self, id: NodeId, time: usize) -> f64 {
        self.nodes[id.0].allocs[time]
    }

    /// Whole-heap megabytes at snapshot `time`.
    pub fn total_at(&self, time: usize) -> f64 {
        self.alloc_at(self.root, time)
    }

    /// Handle offering the node-level mutators.
    pub fn node_mut(&mut self, id: NodeId) -> NodeMut<'_> {
        NodeMut { data: self, id }
    }

    // --- Model-level mutators ---

    /// Move the time cursor. Visible and plotted sets do not depend on it.
    pub fn select_time(&mut self, time: usize) {
        debug_assert!(time < self.times.len(), "time index out of range");
        self.selected_time = time;
        self.dispatch(|e| &mut e.time, time);
    }

    /// Turn per-node hiding on or off for the whole model.
    pub fn set_hiding_enabled(&mut self, enabled: bool) {
        if self.hiding_enabled == enabled {
            return;
        }
        self.hiding_enabled = enabled;
        debug!(enabled, "hiding toggled");
        let flips = self.recompute();
        self.notify_recomputed(flips);
    }

    // --- Node-level mutators ---

    /// Expand or collapse an internal node. No-op on leaves or when unchanged.
    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        let node = &mut self.nodes[id.0];
        let next = match (node.expand, expanded) {
            (ExpandState::Collapsed, true) => ExpandState::Expanded,
            (ExpandState::Expanded, false) => ExpandState::Collapsed,
            _ => return,
        };
        node.expand = next;
        let flips = self.recompute();
        self.dispatch(|e| &mut e.expanded, (id, expanded));
        self.notify_recomputed(flips);
    }

    pub fn toggle_expanded(&mut self, id: NodeId) {
        let expanded = self.is_expanded(id);
        self.set_expanded(id, !expanded);
    }

    /// Set the node's own hide flag. No-op when unchanged.
    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) {
        let node = &mut self.nodes[id.0];
        if node.hidden == hidden {
            return;
        }
        node.hidden = hidden;
        let flips = self.recompute();
        self.dispatch(|e| &mut e.hidden, (id, hidden));
        self.notify_recomputed(flips);
    }

    /// Transient hover/selection state; does not affect plotting.
    pub fn set_highlighted(&mut self, id: NodeId, highlighted: bool) {
        let node = &mut self.nodes[id.0];
        if node.highlighted == highlighted {
            return;
        }
        node.highlighted = highlighted;
        self.dispatch(|e| &mut e.highlighted, (id, highlighted));
    }

    /// Recolor a node together with both of its leftmost spines: the
    /// ancestors it is the first child of, and its own first-child chain.
    pub fn set_color(&mut self, id: NodeId, color: HexColor) {
        let affected = self.color_linked(id);
        debug!(uid = self.nodes[id.0].uid, %color, nodes = affected.len(), "recoloring");
        let colors = NodeColors::derive(color);
        for &n in &affected {
            self.nodes[n.0].colors = colors;
            self.dispatch(|e| &mut e.color, (n, color));
        }
        self.dispatch(|e| &mut e.colors, ());
    }

    /// `id`, then the ancestors reached while it is a first child, then its
    /// first-child descendants.
    fn color_linked(&self, id: NodeId) -> Vec<NodeId> {
        let mut linked = vec![id];
        let mut cur = id;
        while let Some(parent) = self.nodes[cur.0].parent {
            if self.nodes[parent.0].children.first() != Some(&cur) {
                break;
            }
            linked.push(parent);
            cur = parent;
        }
        let mut cur = id;
        while let Some(&first) = self.nodes[cur.0].children.first() {
            linked.push(first);
            cur = first;
        }
        linked
    }

    /// Reorder a node among its siblings. Returns whether any order changed.
    ///
    /// `Top` and `Bottom` also apply the same move to the parent, so the
    /// whole ancestor chain ends up at the front (or back) of its level.
    /// When the node is already in place only the ancestors move.
    pub fn shuffle(&mut self, id: NodeId, direction: ShuffleDirection) -> bool {
        let Some(parent) = self.nodes[id.0].parent else {
            return false;
        };
        let siblings = &mut self.nodes[parent.0].children;
        let Some(pos) = siblings.iter().position(|&c| c == id) else {
            return false;
        };
        let last = siblings.len() - 1;

        let moved = match direction {
            ShuffleDirection::Up if pos > 0 => {
                siblings.swap(pos - 1, pos);
                true
            }
            ShuffleDirection::Down if pos < last => {
                siblings.swap(pos, pos + 1);
                true
            }
            ShuffleDirection::Top if pos > 0 => {
                let node = siblings.remove(pos);
                siblings.insert(0, node);
                true
            }
            ShuffleDirection::Bottom if pos < last => {
                let node = siblings.remove(pos);
                siblings.push(node);
                true
            }
            _ => false,
        };

        let ancestors_moved = matches!(direction, ShuffleDirection::Top | ShuffleDirection::Bottom)
            && self.shuffle(parent, direction);

        if moved {
            debug!(uid = self.nodes[id.0].uid, ?direction, "node shuffled");
            let flips = self.recompute();
            self.dispatch(|e| &mut e.shuffled, id);
            self.notify_recomputed(flips);
        }
        moved || ancestors_moved
    }

    /// Expand `id` and every descendant whose peak allocation reaches
    /// `threshold` megabytes, stopping at the first node below it.
    pub fn expand_to(&mut self, id: NodeId, threshold: f64) {
        if self.max_size(id) < threshold {
            return;
        }
        self.set_expanded(id, true);
        let children = self.nodes[id.0].children.clone();
        for child in children {
            self.expand_to(child, threshold);
        }
    }

    // --- Subscription ---

    pub fn on_node_expanded(&mut self, mut f: impl FnMut(&MassifData, NodeId, bool) + 'static) {
        self.events
            .expanded
            .push(Box::new(move |d, (n, v)| f(d, n, v)));
    }

    pub fn on_node_hidden(&mut self, mut f: impl FnMut(&MassifData, NodeId, bool) + 'static) {
        self.events.hidden.push(Box::new(move |d, (n, v)| f(d, n, v)));
    }

    pub fn on_node_highlighted(&mut self, mut f: impl FnMut(&MassifData, NodeId, bool) + 'static) {
        self.events
            .highlighted
            .push(Box::new(move |d, (n, v)| f(d, n, v)));
    }

    pub fn on_node_plotted(&mut self, mut f: impl FnMut(&MassifData, NodeId, bool) + 'static) {
        self.events
            .plotted
            .push(Box::new(move |d, (n, v)| f(d, n, v)));
    }

    pub fn on_node_color(&mut self, mut f: impl FnMut(&MassifData, NodeId, HexColor) + 'static) {
        self.events.color.push(Box::new(move |d, (n, c)| f(d, n, c)));
    }

    pub fn on_node_shuffled(&mut self, f: impl FnMut(&MassifData, NodeId) + 'static) {
        self.events.shuffled.push(Box::new(f));
    }

    pub fn on_time_selected(&mut self, f: impl FnMut(&MassifData, usize) + 'static) {
        self.events.time.push(Box::new(f));
    }

    /// Fired once after a recolor, however many nodes it touched.
    pub fn on_colors_changed(&mut self, mut f: impl FnMut(&MassifData) + 'static) {
        self.events.colors.push(Box::new(move |d, ()| f(d)));
    }

    /// Fired once after every recompute of the visible and plotted sets.
    pub fn on_visible_changed(&mut self, mut f: impl FnMut(&MassifData) + 'static) {
        self.events.visible.push(Box::new(move |d, ()| f(d)));
    }

    // --- Derivation ---

    /// Call every listener of one kind. The list is moved out while it
    /// runs so listeners can borrow the model.
    fn dispatch<A: Copy>(&mut self, select: fn(&mut EventHub) -> &mut Listeners<A>, arg: A) {
        let mut listeners = std::mem::take(select(&mut self.events));
        listeners.call_all(self, arg);
        *select(&mut self.events) = listeners;
    }

    fn notify_recomputed(&mut self, flips: Vec<(NodeId, bool)>) {
        for (id, plotted) in flips {
            self.dispatch(|e| &mut e.plotted, (id, plotted));
        }
        self.dispatch(|e| &mut e.visible, ());
    }

    /// Rebuild the visible and plotted sets and commit every node's plotted
    /// flag. Returns the flag flips in walk order; nodes that dropped out of
    /// view come last.
    ///
    /// Hiding is inherited down the tree; expansion is not. An unexpanded
    /// node ends the walk for its subtree.
    pub(crate) fn recompute(&mut self) -> Vec<(NodeId, bool)> {
        let mut was_plotted = vec![false; self.nodes.len()];
        for id in &self.plotted {
            was_plotted[id.0] = true;
        }

        let mut visible = Vec::with_capacity(self.visible.len());
        let mut plotted = Vec::with_capacity(self.plotted.len());
        let mut flips = Vec::new();
        let mut stack: Vec<(NodeId, bool)> = self.nodes[self.root.0]
            .children
            .iter()
            .rev()
            .map(|&c| (c, false))
            .collect();

        while let Some((id, parent_hidden)) = stack.pop() {
            let hidden = parent_hidden || self.is_hidden(id);
            visible.push(id);

            let node = &self.nodes[id.0];
            let now_plotted = if node.expand.is_expanded() && !node.children.is_empty() {
                stack.extend(node.children.iter().rev().map(|&c| (c, hidden)));
                false
            } else {
                !hidden
            };

            if now_plotted {
                plotted.push(id);
            }
            if was_plotted[id.0] != now_plotted {
                trace!(uid = node.uid, plotted = now_plotted, "plotted flag flipped");
                flips.push((id, now_plotted));
            }
            was_plotted[id.0] = false;
            self.nodes[id.0].plotted = now_plotted;
        }

        // Anything still marked was plotted before but is no longer visible.
        for (index, stale) in was_plotted.into_iter().enumerate() {
            if stale {
                self.nodes[index].plotted = false;
                flips.push((NodeId(index), false));
            }
        }

        debug!(
            visible = visible.len(),
            plotted = plotted.len(),
            flips = flips.len(),
            "recomputed visible nodes"
        );
        self.visible = visible;
        self.plotted = plotted;
        flips
    }
}

/// A node together with the model that owns it, exposing the node-level
/// mutators as methods.
pub struct NodeMut<'a> {
    data: &'a mut MassifData,
    id: NodeId,
}

impl NodeMut<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn set_expanded(&mut self, expanded: bool) {
        self.data.set_expanded(self.id, expanded);
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.data.set_hidden(self.id, hidden);
    }

    pub fn set_highlighted(&mut self, highlighted: bool) {
        self.data.set_highlighted(self.id, highlighted);
    }

    pub fn set_color(&mut self, color: HexColor) {
        self.data.set_color(self.id, color);
    }

    pub fn shuffle(&mut self, direction: ShuffleDirection) -> bool {
        self.data.shuffle(self.id, direction)
    }

    pub fn expand_to(&mut self, threshold: f64) {
        self.data.expand_to(self.id, threshold);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::model::events::{EventLog, ModelEvent};
    use crate::model::testing::{id, model, site};

    /// root -> [A(1) -> [B(3), C(4)], D(2)]
    fn tree() -> MassifData {
        model(
            &[1.0, 2.0],
            vec![
                site(
                    1,
                    &[6.0, 10.0],
                    vec![site(3, &[2.0, 4.0], vec![]), site(4, &[4.0, 6.0], vec![])],
                ),
                site(2, &[1.0, 1.0], vec![]),
            ],
        )
    }

    fn uids(data: &MassifData, ids: &[NodeId]) -> Vec<u64> {
        ids.iter().map(|&n| data.node(n).uid()).collect()
    }

    fn plotted_flips(data: &mut MassifData) -> Rc<RefCell<Vec<(u64, bool)>>> {
        let flips = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&flips);
        data.on_node_plotted(move |d, n, p| sink.borrow_mut().push((d.node(n).uid(), p)));
        flips
    }

    #[test]
    fn collapsed_tree_plots_top_level() {
        let data = tree();
        assert_eq!(uids(&data, data.visible_nodes()), vec![1, 2]);
        assert_eq!(uids(&data, data.plotted_nodes()), vec![1, 2]);
        assert_eq!(data.depth(id(&data, 3)), 1);
        assert_eq!(data.total_at(1), 11.0);
    }

    #[test]
    fn expanding_flips_parent_off_and_children_on() {
        let mut data = tree();
        let flips = plotted_flips(&mut data);
        data.set_expanded(id(&data, 1), true);
        assert_eq!(*flips.borrow(), vec![(1, false), (3, true), (4, true)]);
        assert_eq!(uids(&data, data.visible_nodes()), vec![1, 3, 4, 2]);
        assert_eq!(uids(&data, data.plotted_nodes()), vec![3, 4, 2]);
    }

    #[test]
    fn collapsing_clears_flags_of_nodes_leaving_view() {
        let mut data = tree();
        let a = id(&data, 1);
        data.set_expanded(a, true);
        let flips = plotted_flips(&mut data);
        data.set_expanded(a, false);
        assert_eq!(*flips.borrow(), vec![(1, true), (3, false), (4, false)]);
        assert!(!data.is_plotted(id(&data, 3)));
        assert!(!data.is_plotted(id(&data, 4)));
    }

    #[test]
    fn leaves_ignore_expansion() {
        let mut data = tree();
        let log = EventLog::attach(&mut data);
        data.set_expanded(id(&data, 2), true);
        data.toggle_expanded(id(&data, 2));
        assert!(log.is_empty());
    }

    #[test]
    fn hiding_is_inherited_and_switchable() {
        let mut data = tree();
        let a = id(&data, 1);
        data.set_expanded(a, true);
        data.set_hidden(a, true);
        assert_eq!(uids(&data, data.visible_nodes()), vec![1, 3, 4, 2]);
        assert_eq!(uids(&data, data.plotted_nodes()), vec![2]);
        assert!(!data.is_hidden(id(&data, 3)));

        data.set_hiding_enabled(false);
        assert!(!data.is_hidden(a));
        assert!(data.node(a).hide_requested());
        assert_eq!(uids(&data, data.plotted_nodes()), vec![3, 4, 2]);
    }

    #[test]
    fn redundant_hiding_toggle_is_silent() {
        let mut data = tree();
        let log = EventLog::attach(&mut data);
        data.set_hiding_enabled(true);
        data.set_hidden(id(&data, 2), false);
        assert!(log.is_empty());
    }

    #[test]
    fn shuffle_respects_sibling_bounds() {
        let mut data = tree();
        let (a, d) = (id(&data, 1), id(&data, 2));
        assert!(!data.shuffle(a, ShuffleDirection::Up));
        assert!(!data.shuffle(d, ShuffleDirection::Down));
        assert!(!data.shuffle(data.root(), ShuffleDirection::Top));
        assert!(data.shuffle(d, ShuffleDirection::Up));
        assert_eq!(uids(&data, data.children(data.root())), vec![2, 1]);
        assert_eq!(uids(&data, data.visible_nodes()), vec![2, 1]);
    }

    #[test]
    fn bottom_moves_ancestors_even_when_node_is_in_place() {
        let mut data = tree();
        let log = EventLog::attach(&mut data);
        assert!(data.shuffle(id(&data, 4), ShuffleDirection::Bottom));
        assert_eq!(uids(&data, data.children(data.root())), vec![2, 1]);
        assert_eq!(uids(&data, data.children(id(&data, 1))), vec![3, 4]);

        let shuffled: Vec<u64> = log
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                ModelEvent::NodeShuffled { uid, .. } => Some(uid),
                _ => None,
            })
            .collect();
        assert_eq!(shuffled, vec![1]);
    }

    #[test]
    fn top_on_front_chain_changes_nothing() {
        let mut data = tree();
        assert!(!data.shuffle(id(&data, 3), ShuffleDirection::Top));
        assert_eq!(uids(&data, data.children(data.root())), vec![1, 2]);
    }

    #[test]
    fn color_follows_first_child_spines() {
        let mut data = tree();
        let red: HexColor = "#ff0000".parse().unwrap();
        let log = EventLog::attach(&mut data);
        data.set_color(id(&data, 3), red);

        for uid in [0, 1, 3] {
            assert_eq!(data.colors(id(&data, uid)).base(), red, "uid {uid}");
        }
        for uid in [2, 4] {
            assert_ne!(data.colors(id(&data, uid)).base(), red, "uid {uid}");
        }
        let events = log.drain();
        assert_eq!(events.len(), 4);
        assert_eq!(events.last(), Some(&ModelEvent::ColorsChanged));
    }

    #[test]
    fn color_of_later_sibling_stays_local() {
        let mut data = tree();
        let green: HexColor = "#00ff00".parse().unwrap();
        data.set_color(id(&data, 2), green);
        assert_eq!(data.colors(id(&data, 2)).base(), green);
        assert_ne!(data.colors(data.root()).base(), green);
    }

    #[test]
    fn expand_to_stops_below_threshold() {
        let mut data = tree();
        data.expand_to(id(&data, 1), 20.0);
        assert!(!data.is_expanded(id(&data, 1)));
        data.node_mut(id(&data, 1)).expand_to(10.0);
        assert!(data.is_expanded(id(&data, 1)));
    }

    #[test]
    fn highlight_and_time_do_not_recompute() {
        let mut data = tree();
        let log = EventLog::attach(&mut data);
        data.node_mut(id(&data, 2)).set_highlighted(true);
        data.select_time(1);
        assert_eq!(log.drain().len(), 2);
        assert!(data.is_highlighted(id(&data, 2)));
        assert_eq!(data.selected_time(), 1);
    }

    #[test]
    fn only_child_shares_parent_samples() {
        let data = model(
            &[1.0, 2.0],
            vec![site(1, &[3.0, 5.0], vec![site(2, &[0.0, 0.0], vec![])])],
        );
        let (a, b) = (id(&data, 1), id(&data, 2));
        assert!(data.node(a).shares_allocs_with(data.node(b)));
        assert_eq!(data.node(b).allocs(), &[3.0, 5.0]);
        assert_eq!(data.max_size(b), 5.0);
        assert_eq!(data.node(a).expand_state(), ExpandState::Expanded);
        assert_eq!(uids(&data, data.plotted_nodes()), vec![2]);
    }

    #[test]
    fn shuffle_direction_parses() {
        assert_eq!("top".parse::<ShuffleDirection>(), Ok(ShuffleDirection::Top));
        assert_eq!("down".parse::<ShuffleDirection>(), Ok(ShuffleDirection::Down));
        assert_eq!(
            "sideways".parse::<ShuffleDirection>(),
            Err(ShuffleDirectionError("sideways".into()))
        );
    }
}
