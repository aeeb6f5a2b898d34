//! Change notifications fanned out by [`MassifData`].
//!
//! Each event kind has its own append-only listener list. Listeners get a
//! shared borrow of the model, so they can read derived state but cannot
//! start another mutation while one is being dispatched.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::massif::MassifData;
use super::node::NodeId;
use crate::color::HexColor;

pub(crate) type Listener<A> = Box<dyn FnMut(&MassifData, A)>;

pub(crate) struct Listeners<A> {
    list: Vec<Listener<A>>,
}

impl<A> Default for Listeners<A> {
    fn default() -> Self {
        Self { list: Vec::new() }
    }
}

impl<A: Copy> Listeners<A> {
    pub(crate) fn push(&mut self, listener: Listener<A>) {
        self.list.push(listener);
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    pub(crate) fn call_all(&mut self, data: &MassifData, arg: A) {
        for listener in &mut self.list {
            listener(data, arg);
        }
    }
}

/// Every listener list, one per event kind.
#[derive(Default)]
pub(crate) struct EventHub {
    pub(crate) expanded: Listeners<(NodeId, bool)>,
    pub(crate) hidden: Listeners<(NodeId, bool)>,
    pub(crate) highlighted: Listeners<(NodeId, bool)>,
    pub(crate) plotted: Listeners<(NodeId, bool)>,
    pub(crate) color: Listeners<(NodeId, HexColor)>,
    pub(crate) shuffled: Listeners<NodeId>,
    pub(crate) time: Listeners<usize>,
    pub(crate) colors: Listeners<()>,
    pub(crate) visible: Listeners<()>,
}

impl EventHub {
    pub(crate) fn listener_count(&self) -> usize {
        self.expanded.len()
            + self.hidden.len()
            + self.highlighted.len()
            + self.plotted.len()
            + self.color.len()
            + self.shuffled.len()
            + self.time.len()
            + self.colors.len()
            + self.visible.len()
    }
}

/// A notification, in a form consumers can queue or serialize.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelEvent {
    NodeExpanded { node: NodeId, uid: u64, expanded: bool },
    NodeHidden { node: NodeId, uid: u64, hidden: bool },
    NodeHighlighted { node: NodeId, uid: u64, highlighted: bool },
    NodePlotted { node: NodeId, uid: u64, plotted: bool },
    NodeColor { node: NodeId, uid: u64, color: HexColor },
    NodeShuffled { node: NodeId, uid: u64 },
    TimeSelected { time: usize },
    ColorsChanged,
    VisibleChanged,
}

impl ModelEvent {
    /// The node the event is about, for per-node events.
    pub fn node(&self) -> Option<NodeId> {
        match *self {
            Self::NodeExpanded { node, .. }
            | Self::NodeHidden { node, .. }
            | Self::NodeHighlighted { node, .. }
            | Self::NodePlotted { node, .. }
            | Self::NodeColor { node, .. }
            | Self::NodeShuffled { node, .. } => Some(node),
            Self::TimeSelected { .. } | Self::ColorsChanged | Self::VisibleChanged => None,
        }
    }
}

/// Records every notification of a model, in dispatch order, for consumers
/// that poll instead of reacting inside a callback.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<ModelEvent>>>,
}

impl EventLog {
    /// Subscribe a new log to every event kind of `data`.
    pub fn attach(data: &mut MassifData) -> Self {
        let log = Self::default();

        let sink = log.sink();
        data.on_node_expanded(move |d, node, expanded| {
            sink.borrow_mut().push(ModelEvent::NodeExpanded {
                node,
                uid: d.node(node).uid(),
                expanded,
            });
        });
        let sink = log.sink();
        data.on_node_hidden(move |d, node, hidden| {
            sink.borrow_mut().push(ModelEvent::NodeHidden {
                node,
                uid: d.node(node).uid(),
                hidden,
            });
        });
        let sink = log.sink();
        data.on_node_highlighted(move |d, node, highlighted| {
            sink.borrow_mut().push(ModelEvent::NodeHighlighted {
                node,
                uid: d.node(node).uid(),
                highlighted,
            });
        });
        let sink = log.sink();
        data.on_node_plotted(move |d, node, plotted| {
            sink.borrow_mut().push(ModelEvent::NodePlotted {
                node,
                uid: d.node(node).uid(),
                plotted,
            });
        });
        let sink = log.sink();
        data.on_node_color(move |d, node, color| {
            sink.borrow_mut().push(ModelEvent::NodeColor {
                node,
                uid: d.node(node).uid(),
                color,
            });
        });
        let sink = log.sink();
        data.on_node_shuffled(move |d, node| {
            sink.borrow_mut().push(ModelEvent::NodeShuffled {
                node,
                uid: d.node(node).uid(),
            });
        });
        let sink = log.sink();
        data.on_time_selected(move |_, time| {
            sink.borrow_mut().push(ModelEvent::TimeSelected { time });
        });
        let sink = log.sink();
        data.on_colors_changed(move |_| sink.borrow_mut().push(ModelEvent::ColorsChanged));
        let sink = log.sink();
        data.on_visible_changed(move |_| sink.borrow_mut().push(ModelEvent::VisibleChanged));

        log
    }

    fn sink(&self) -> Rc<RefCell<Vec<ModelEvent>>> {
        Rc::clone(&self.events)
    }

    /// Take every event recorded so far.
    pub fn drain(&self) -> Vec<ModelEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::{id, model, site};

    fn data() -> MassifData {
        model(
            &[1.0],
            vec![
                site(1, &[4.0], vec![site(3, &[1.0], vec![]), site(4, &[3.0], vec![])]),
                site(2, &[1.0], vec![]),
            ],
        )
    }

    #[test]
    fn expansion_fires_node_then_plotted_then_visible() {
        let mut data = data();
        let log = EventLog::attach(&mut data);
        let a = id(&data, 1);
        data.set_expanded(a, true);

        let kinds: Vec<&str> = log
            .drain()
            .iter()
            .map(|e| match e {
                ModelEvent::NodeExpanded { .. } => "expanded",
                ModelEvent::NodePlotted { .. } => "plotted",
                ModelEvent::VisibleChanged => "visible",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, ["expanded", "plotted", "plotted", "plotted", "visible"]);
    }

    #[test]
    fn listeners_see_committed_state() {
        let mut data = data();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        data.on_node_expanded(move |d, _, _| sink.borrow_mut().push(d.visible_nodes().len()));
        data.set_expanded(id(&data, 1), true);
        assert_eq!(*seen.borrow(), vec![4]);
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = ModelEvent::NodeHidden {
            node: NodeId(3),
            uid: 7,
            hidden: true,
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["kind"], "node_hidden");
        assert_eq!(json["uid"], 7);
        assert_eq!(event.node(), Some(NodeId(3)));
        assert_eq!(ModelEvent::VisibleChanged.node(), None);
    }

    #[test]
    fn drain_empties_the_log() {
        let mut data = data();
        let log = EventLog::attach(&mut data);
        data.select_time(0);
        assert_eq!(log.len(), 1);
        assert_eq!(log.drain(), vec![ModelEvent::TimeSelected { time: 0 }]);
        assert!(log.is_empty());
    }
}
