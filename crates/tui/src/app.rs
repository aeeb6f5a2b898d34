//! Interactive state of the terminal viewer: the model, the views that
//! consume its events, the tree cursor and the playback timer.

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use massif_view_core::color::next_palette_color;
use massif_view_core::config::ViewerConfig;
use massif_view_core::views::alloc_tree::{self, AllocTreeRow, SizebarMode};
use massif_view_core::views::{AllocTreeView, Renderable, TimelineView, TreemapView};
use massif_view_core::{EventLog, MassifData, NodeId, ShuffleDirection};
use massif_view_protocol::Point;
use tracing::debug;

pub struct App {
    pub data: MassifData,
    log: EventLog,
    pub tree: AllocTreeView,
    pub treemap: TreemapView,
    pub timeline: TimelineView,
    /// Index into the visible nodes.
    pub cursor: usize,
    /// Fraction of the peak heap used by the expand-to-threshold key.
    expand_fraction: f64,
    next_tick: Option<Instant>,
    pub quit: bool,
}

impl App {
    pub fn new(mut data: MassifData, config: ViewerConfig) -> Self {
        let log = EventLog::attach(&mut data);
        let mut app = Self {
            tree: AllocTreeView::new(config.alloc_tree.clone()),
            treemap: TreemapView::new(config.treemap.clone()),
            timeline: TimelineView::new(config.playback.clone()),
            expand_fraction: config.model.auto_expand_fraction,
            data,
            log,
            cursor: 0,
            next_tick: None,
            quit: false,
        };
        app.highlight_cursor(None);
        app.sync();
        app
    }

    pub fn rows(&self) -> Vec<AllocTreeRow> {
        alloc_tree::rows(&self.data, self.tree.options())
    }

    pub fn cursor_node(&self) -> Option<NodeId> {
        self.data.visible_nodes().get(self.cursor).copied()
    }

    /// How long the event loop may block before the next playback step.
    pub fn poll_timeout(&self, now: Instant) -> Duration {
        let idle = Duration::from_millis(100);
        match self.next_tick {
            Some(at) => at.saturating_duration_since(now).min(idle),
            None => idle,
        }
    }

    pub fn on_timer(&mut self, now: Instant) {
        let Some(at) = self.next_tick else {
            return;
        };
        if now < at {
            return;
        }
        self.next_tick = self
            .timeline
            .playback_mut()
            .tick(&mut self.data)
            .map(|delay| now + delay);
        self.sync();
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        let before = self.cursor_node();
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => self.quit = true,
            KeyCode::Up => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Down => self.cursor += 1,
            KeyCode::PageUp => self.cursor = self.cursor.saturating_sub(10),
            KeyCode::PageDown => self.cursor += 10,
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.data.visible_nodes().len().saturating_sub(1),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(n) = self.cursor_node() {
                    self.data.toggle_expanded(n);
                }
            }
            KeyCode::Char('x') => {
                if let Some(n) = self.cursor_node() {
                    let threshold = self.data.max_size(self.data.root()) * self.expand_fraction;
                    self.data.expand_to(n, threshold);
                }
            }
            KeyCode::Char('h') => {
                if let Some(n) = self.cursor_node() {
                    let hidden = self.data.node(n).hide_requested();
                    self.data.set_hidden(n, !hidden);
                }
            }
            KeyCode::Char('H') => {
                let visible = !self.tree.options().hide_boxes_visible;
                self.tree.set_hide_boxes_visible(&mut self.data, visible);
            }
            KeyCode::Char('K') => self.shuffle(ShuffleDirection::Up),
            KeyCode::Char('J') => self.shuffle(ShuffleDirection::Down),
            KeyCode::Char('t') => self.shuffle(ShuffleDirection::Top),
            KeyCode::Char('b') => self.shuffle(ShuffleDirection::Bottom),
            KeyCode::Left => {
                let t = self.data.selected_time();
                if t > 0 {
                    self.data.select_time(t - 1);
                }
            }
            KeyCode::Right => {
                let t = self.data.selected_time();
                if t + 1 < self.data.times().len() {
                    self.data.select_time(t + 1);
                }
            }
            KeyCode::Char('p') => {
                self.next_tick = self
                    .timeline
                    .playback_mut()
                    .toggle()
                    .then(Instant::now);
            }
            KeyCode::Char('c') => {
                if let Some(n) = self.cursor_node() {
                    let next = next_palette_color(self.data.colors(n).base());
                    self.data.set_color(n, next);
                }
            }
            KeyCode::Char('s') => {
                let next = match self.tree.options().sizebar {
                    SizebarMode::PercentOfTotal => SizebarMode::PercentOfParent,
                    SizebarMode::PercentOfParent => SizebarMode::Mbytes,
                    SizebarMode::Mbytes => SizebarMode::PercentOfTotal,
                };
                self.tree.set_sizebar_mode(next);
            }
            KeyCode::Char('o') => {
                let visible = !self.tree.options().shuffle_buttons_visible;
                self.tree.set_shuffle_buttons_visible(visible);
            }
            _ => {}
        }
        self.highlight_cursor(before);
        self.sync();
    }

    /// Clicking a treemap box expands or collapses it (or its parent).
    pub fn click_treemap(&mut self, p: Point) {
        let before = self.cursor_node();
        self.treemap.click(&mut self.data, p);
        self.highlight_cursor(before);
        self.sync();
    }

    /// Move the cursor's node, keeping the cursor on it.
    fn shuffle(&mut self, direction: ShuffleDirection) {
        let Some(n) = self.cursor_node() else {
            return;
        };
        if self.data.shuffle(n, direction) {
            if let Some(pos) = self.data.visible_nodes().iter().position(|&v| v == n) {
                self.cursor = pos;
            }
        }
    }

    /// Clamp the cursor and move the highlight from `before` to the node
    /// now under it.
    fn highlight_cursor(&mut self, before: Option<NodeId>) {
        let len = self.data.visible_nodes().len();
        self.cursor = self.cursor.min(len.saturating_sub(1));
        let now = self.cursor_node();
        if before == now {
            return;
        }
        if let Some(prev) = before {
            self.data.set_highlighted(prev, false);
        }
        if let Some(n) = now {
            self.data.set_highlighted(n, true);
        }
    }

    /// Deliver queued model events to the views.
    fn sync(&mut self) {
        for event in self.log.drain() {
            debug!(?event, "model event");
            self.treemap.on_event(&self.data, &event);
            self.tree.on_event(&self.data, &event);
            self.timeline.on_event(&self.data, &event);
        }
    }
}
