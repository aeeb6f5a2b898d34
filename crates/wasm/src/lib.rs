use std::cell::RefCell;
use std::fmt::Display;

use massif_view_core::color::HexColor;
use massif_view_core::config::ViewerConfig;
use massif_view_core::svg;
use massif_view_core::views::{
    AllocTreeView, MemgraphView, Renderable, SparklinesView, TimelineView, TreemapView, alloc_tree,
    sparklines,
};
use massif_view_core::{EventLog, MassifData, ModelEvent, NodeId, ShuffleDirection};
use massif_view_protocol::{Point, RenderCommand, Viewport};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// One loaded snapshot with the views drawn from it.
struct Session {
    data: MassifData,
    log: EventLog,
    /// Events already delivered to the views, waiting for the page to poll.
    pending: Vec<ModelEvent>,
    treemap: TreemapView,
    memgraph: MemgraphView,
    sparklines: SparklinesView,
    alloc_tree: AllocTreeView,
    timeline: TimelineView,
}

impl Session {
    fn new(mut data: MassifData, config: ViewerConfig) -> Self {
        let log = EventLog::attach(&mut data);
        Self {
            data,
            log,
            pending: Vec::new(),
            treemap: TreemapView::new(config.treemap),
            memgraph: MemgraphView::new(config.memgraph),
            sparklines: SparklinesView::new(config.sparklines),
            alloc_tree: AllocTreeView::new(config.alloc_tree),
            timeline: TimelineView::new(config.playback),
        }
    }

    fn draw(&mut self, view_type: &str, viewport: &Viewport) -> Result<Vec<RenderCommand>, JsError> {
        let data = &self.data;
        Ok(match view_type {
            "treemap" => self.treemap.draw(data, viewport),
            "memgraph" => self.memgraph.draw(data, viewport),
            "sparklines" => self.sparklines.draw(data, viewport),
            "alloc-tree" => self.alloc_tree.draw(data, viewport),
            "timeline" => self.timeline.draw(data, viewport),
            _ => return Err(JsError::new(&format!("unknown view type: {view_type}"))),
        })
    }

    fn node(&self, uid: u64) -> Result<NodeId, JsError> {
        self.data
            .find_by_uid(uid)
            .ok_or_else(|| JsError::new(&format!("no node with uid {uid}")))
    }

    /// Hand new model events to every view and queue them for the page.
    fn sync(&mut self) {
        for event in self.log.drain() {
            self.treemap.on_event(&self.data, &event);
            self.memgraph.on_event(&self.data, &event);
            self.sparklines.on_event(&self.data, &event);
            self.alloc_tree.on_event(&self.data, &event);
            self.timeline.on_event(&self.data, &event);
            self.pending.push(event);
        }
    }
}

thread_local! {
    static SESSIONS: RefCell<Vec<Session>> = const { RefCell::new(Vec::new()) };
}

fn js_err(e: impl Display) -> JsError {
    JsError::new(&e.to_string())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(js_err)
}

/// Run `f` on a session, then deliver whatever events it caused.
fn with_session<T>(
    handle: usize,
    f: impl FnOnce(&mut Session) -> Result<T, JsError>,
) -> Result<T, JsError> {
    SESSIONS.with_borrow_mut(|sessions| {
        let session = sessions
            .get_mut(handle)
            .ok_or_else(|| JsError::new("invalid session handle"))?;
        let out = f(session)?;
        session.sync();
        Ok(out)
    })
}

/// Load a snapshot (JSON bytes) with optional viewer settings (JSON).
/// Returns a handle for later calls.
#[wasm_bindgen]
pub fn load_snapshot(data: &[u8], config: Option<String>) -> Result<usize, JsError> {
    let config = match config {
        Some(json) => ViewerConfig::from_json(json.as_bytes()).map_err(js_err)?,
        None => ViewerConfig::default(),
    };
    let model = MassifData::from_json(data, &config.model).map_err(js_err)?;
    Ok(SESSIONS.with_borrow_mut(|sessions| {
        sessions.push(Session::new(model, config));
        sessions.len() - 1
    }))
}

/// Render a view, returning its render commands as JSON.
///
/// `view_type` is one of `treemap`, `memgraph`, `sparklines`, `alloc-tree`
/// or `timeline`.
#[wasm_bindgen]
pub fn render_view(
    handle: usize,
    view_type: &str,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    dpr: f64,
) -> Result<String, JsError> {
    let viewport = Viewport {
        x,
        y,
        width,
        height,
        dpr,
    };
    with_session(handle, |s| to_json(&s.draw(view_type, &viewport)?))
}

/// Render a view straight to an SVG document.
#[wasm_bindgen]
pub fn render_view_svg(
    handle: usize,
    view_type: &str,
    width: f64,
    height: f64,
    dark: bool,
) -> Result<String, JsError> {
    with_session(handle, |s| {
        let commands = s.draw(view_type, &Viewport::sized(width, height))?;
        Ok(svg::render_svg(&commands, width, height, dark))
    })
}

#[derive(Serialize)]
struct Metadata<'a> {
    times: &'a [f64],
    selected_time: usize,
    node_count: usize,
    visible: Vec<u64>,
    plotted: Vec<u64>,
    hiding_enabled: bool,
}

/// Snapshot times, selection and the visible/plotted uids, as JSON.
#[wasm_bindgen]
pub fn get_metadata(handle: usize) -> Result<String, JsError> {
    with_session(handle, |s| {
        let d = &s.data;
        let uids =
            |ids: &[NodeId]| -> Vec<u64> { ids.iter().map(|&n| d.node(n).uid()).collect() };
        to_json(&Metadata {
            times: d.times(),
            selected_time: d.selected_time(),
            node_count: d.len(),
            visible: uids(d.visible_nodes()),
            plotted: uids(d.plotted_nodes()),
            hiding_enabled: d.hiding_enabled(),
        })
    })
}

/// The allocation tree rows (labels, size bars, colors) as JSON.
#[wasm_bindgen]
pub fn alloc_tree_rows(handle: usize) -> Result<String, JsError> {
    with_session(handle, |s| {
        to_json(&alloc_tree::rows(&s.data, s.alloc_tree.options()))
    })
}

/// Every model event since the last call, oldest first, as JSON.
#[wasm_bindgen]
pub fn drain_events(handle: usize) -> Result<String, JsError> {
    with_session(handle, |s| to_json(&std::mem::take(&mut s.pending)))
}

#[wasm_bindgen]
pub fn select_time(handle: usize, time: usize) -> Result<(), JsError> {
    with_session(handle, |s| {
        if time >= s.data.times().len() {
            return Err(JsError::new(&format!("time {time} out of range")));
        }
        s.data.select_time(time);
        Ok(())
    })
}

#[wasm_bindgen]
pub fn set_hiding_enabled(handle: usize, enabled: bool) -> Result<(), JsError> {
    with_session(handle, |s| {
        s.alloc_tree.set_hide_boxes_visible(&mut s.data, enabled);
        Ok(())
    })
}

#[wasm_bindgen]
pub fn set_expanded(handle: usize, uid: u64, expanded: bool) -> Result<(), JsError> {
    with_session(handle, |s| {
        let n = s.node(uid)?;
        s.data.set_expanded(n, expanded);
        Ok(())
    })
}

#[wasm_bindgen]
pub fn set_hidden(handle: usize, uid: u64, hidden: bool) -> Result<(), JsError> {
    with_session(handle, |s| {
        let n = s.node(uid)?;
        s.data.set_hidden(n, hidden);
        Ok(())
    })
}

#[wasm_bindgen]
pub fn set_highlighted(handle: usize, uid: u64, highlighted: bool) -> Result<(), JsError> {
    with_session(handle, |s| {
        let n = s.node(uid)?;
        s.data.set_highlighted(n, highlighted);
        Ok(())
    })
}

/// Recolor a node (`#rrggbb`) along with its first-child spines.
#[wasm_bindgen]
pub fn set_color(handle: usize, uid: u64, color: &str) -> Result<(), JsError> {
    let color: HexColor = color.parse().map_err(js_err)?;
    with_session(handle, |s| {
        let n = s.node(uid)?;
        s.data.set_color(n, color);
        Ok(())
    })
}

/// Move a node among its siblings (`up`, `down`, `top` or `bottom`).
/// Returns whether any order changed.
#[wasm_bindgen]
pub fn shuffle(handle: usize, uid: u64, direction: &str) -> Result<bool, JsError> {
    let direction: ShuffleDirection = direction.parse().map_err(js_err)?;
    with_session(handle, |s| {
        let n = s.node(uid)?;
        Ok(s.data.shuffle(n, direction))
    })
}

/// Expand `uid` and its descendants whose peak reaches `threshold` MB.
#[wasm_bindgen]
pub fn expand_to(handle: usize, uid: u64, threshold: f64) -> Result<(), JsError> {
    with_session(handle, |s| {
        let n = s.node(uid)?;
        s.data.expand_to(n, threshold);
        Ok(())
    })
}

/// Click at a treemap point from the last treemap render.
#[wasm_bindgen]
pub fn treemap_click(handle: usize, x: f64, y: f64) -> Result<(), JsError> {
    with_session(handle, |s| {
        s.treemap.click(&mut s.data, Point::new(x, y));
        Ok(())
    })
}

/// Hover the memgraph; highlights the series and selects the snapshot
/// under the pointer. Pass `None` coordinates when the pointer leaves.
#[wasm_bindgen]
pub fn memgraph_hover(handle: usize, x: Option<f64>, y: Option<f64>) -> Result<(), JsError> {
    with_session(handle, |s| {
        match (x, y) {
            (Some(x), Some(y)) => s.memgraph.hover(&mut s.data, Point::new(x, y)),
            _ => s.memgraph.unhover(&mut s.data),
        }
        Ok(())
    })
}

/// Hovering the timeline selects the snapshot under the pointer.
#[wasm_bindgen]
pub fn timeline_hover(handle: usize, x: f64) -> Result<(), JsError> {
    with_session(handle, |s| {
        s.timeline.hover(&mut s.data, x);
        Ok(())
    })
}

/// Start or stop playback. Returns whether it is now running; when it is,
/// call `playback_tick` right away.
#[wasm_bindgen]
pub fn playback_toggle(handle: usize) -> Result<bool, JsError> {
    with_session(handle, |s| Ok(s.timeline.playback_mut().toggle()))
}

/// Advance playback one step. Returns the delay in milliseconds before the
/// next tick, or `None` once playback has stopped.
#[wasm_bindgen]
pub fn playback_tick(handle: usize) -> Result<Option<f64>, JsError> {
    with_session(handle, |s| {
        Ok(s
            .timeline
            .playback_mut()
            .tick(&mut s.data)
            .map(|d| d.as_secs_f64() * 1000.0))
    })
}

/// Hover a sparkline row: highlights the node under `y`, or clears every
/// row highlight when `y` is `None`.
#[wasm_bindgen]
pub fn sparklines_hover(handle: usize, y: Option<f64>) -> Result<(), JsError> {
    with_session(handle, |s| {
        let index = y
            .and_then(|y| s.sparklines.row_at(&s.data, y))
            .and_then(|n| {
                sparklines::row_nodes(&s.data, s.sparklines.options())
                    .iter()
                    .position(|&r| r == n)
            });
        s.sparklines.select_row(&mut s.data, index);
        Ok(())
    })
}
