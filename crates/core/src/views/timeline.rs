//! The snapshot timeline strip: one box per snapshot sized by the time it
//! covers, plus auto-playback through the snapshots.

use std::time::Duration;

use massif_view_protocol::{Point, Rect, RenderCommand, TextAlign, ThemeToken, Viewport};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Renderable;
use crate::model::MassifData;

/// Room reserved left of the strip for the play/pause control.
pub const PLAY_BUTTON_WIDTH: f64 = 28.0;
/// Horizontal margin taken out of every timepoint box.
const TIMEPOINT_GAP: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackOptions {
    /// How long a full pass from the first to the last snapshot takes.
    pub play_time_ms: u64,
    /// Pause on the last snapshot before starting over.
    pub loop_delay_ms: u64,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            play_time_ms: 5000,
            loop_delay_ms: 1000,
        }
    }
}

/// Pixel widths of the timepoint boxes, each proportional to the time since
/// the previous snapshot, minus the gap.
///
/// Widths are floored; the fractional remainder of each box is carried into
/// the next one so the strip adds up to `total_width`.
pub fn timeline_widths(times: &[f64], total_width: f64) -> Vec<f64> {
    let Some(&total_time) = times.last() else {
        return Vec::new();
    };
    if total_time <= 0.0 || total_width <= 0.0 {
        let each = (total_width / times.len() as f64 - TIMEPOINT_GAP).floor();
        return vec![each.max(0.0); times.len()];
    }

    let mut prev = 0.0;
    times
        .iter()
        .map(|&t| {
            let width = total_width * (t - prev) / total_time - TIMEPOINT_GAP;
            let floored = width.floor();
            prev = t - (width - floored) * (total_time / total_width);
            floored.max(0.0)
        })
        .collect()
}

/// Hover text for snapshot `index`: its timestamp as a share of the last.
pub fn timepoint_title(times: &[f64], index: usize) -> String {
    let last = times.last().copied().unwrap_or(0.0);
    if last == 0.0 {
        return "0%".into();
    }
    let percent = (1000.0 * times[index] / last).round() / 10.0;
    format!("{percent}%")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    /// Paused on the last snapshot; the next tick rewinds to the first.
    Looping,
}

/// Steps the selected time forward on a timer the caller owns.
///
/// After [`toggle`](Self::toggle) starts playback, call [`tick`](Self::tick)
/// right away and then again after each returned delay.
#[derive(Debug, Clone, Default)]
pub struct Playback {
    state: PlaybackState,
    options: PlaybackOptions,
}

impl Playback {
    pub fn new(options: PlaybackOptions) -> Self {
        Self {
            state: PlaybackState::Stopped,
            options,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state != PlaybackState::Stopped
    }

    /// Start or stop. Returns whether playback is now running.
    pub fn toggle(&mut self) -> bool {
        self.state = match self.state {
            PlaybackState::Stopped => PlaybackState::Playing,
            PlaybackState::Playing | PlaybackState::Looping => PlaybackState::Stopped,
        };
        debug!(state = ?self.state, "playback toggled");
        self.is_running()
    }

    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
    }

    /// Advance one step. Returns how long to wait before the next tick, or
    /// `None` once stopped.
    pub fn tick(&mut self, data: &mut MassifData) -> Option<Duration> {
        let last = data.times().len().saturating_sub(1);
        if last == 0 {
            self.state = PlaybackState::Stopped;
            return None;
        }
        match self.state {
            PlaybackState::Stopped => None,
            PlaybackState::Looping => {
                data.select_time(0);
                self.state = PlaybackState::Playing;
                Some(self.step_delay(data.times(), 0, 1))
            }
            PlaybackState::Playing => {
                let current = data.selected_time();
                if current < last {
                    data.select_time(current + 1);
                    Some(self.step_delay(data.times(), current, current + 1))
                } else {
                    self.state = PlaybackState::Looping;
                    Some(Duration::from_millis(self.options.loop_delay_ms))
                }
            }
        }
    }

    /// Time spent on `to` after arriving from `from`: its share of the whole
    /// play time. Without a usable time axis every step is equal.
    fn step_delay(&self, times: &[f64], from: usize, to: usize) -> Duration {
        let play = self.options.play_time_ms as f64;
        let total = times.last().copied().unwrap_or(0.0);
        let ms = if total > 0.0 {
            (times[to] - times[from]).max(0.0) * play / total
        } else {
            play / (times.len().saturating_sub(1).max(1)) as f64
        };
        Duration::from_secs_f64(ms / 1000.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimelineView {
    playback: Playback,
    widths: Vec<f64>,
}

impl TimelineView {
    pub fn new(options: PlaybackOptions) -> Self {
        Self {
            playback: Playback::new(options),
            widths: Vec::new(),
        }
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut Playback {
        &mut self.playback
    }

    /// Snapshot index under horizontal offset `x`, from the last draw.
    pub fn time_at(&self, x: f64) -> Option<usize> {
        let mut left = PLAY_BUTTON_WIDTH;
        if x < left {
            return None;
        }
        for (i, w) in self.widths.iter().enumerate() {
            left += w + TIMEPOINT_GAP;
            if x < left {
                return Some(i);
            }
        }
        None
    }

    /// Hovering a timepoint selects it.
    pub fn hover(&self, data: &mut MassifData, x: f64) {
        match self.time_at(x) {
            Some(time) if time != data.selected_time() => data.select_time(time),
            _ => {}
        }
    }

    pub fn is_play_button(&self, x: f64) -> bool {
        (0.0..PLAY_BUTTON_WIDTH).contains(&x)
    }
}

impl Renderable for TimelineView {
    fn draw(&mut self, data: &MassifData, viewport: &Viewport) -> Vec<RenderCommand> {
        let times = data.times();
        self.widths = timeline_widths(times, viewport.width - PLAY_BUTTON_WIDTH);

        let mut commands = Vec::with_capacity(times.len() + 4);
        commands.push(RenderCommand::BeginGroup {
            id: "timeline".into(),
            label: Some("Timeline".into()),
        });
        let glyph = if self.playback.is_running() {
            "\u{275A}\u{275A}"
        } else {
            "\u{25B6}"
        };
        commands.push(RenderCommand::DrawText {
            position: Point::new(PLAY_BUTTON_WIDTH / 2.0, viewport.height / 2.0 + 4.0),
            text: glyph.into(),
            color: ThemeToken::TextPrimary.into(),
            font_size: 12.0,
            align: TextAlign::Center,
            vertical: false,
        });

        let selected = data.selected_time();
        let mut x = PLAY_BUTTON_WIDTH;
        for (i, &w) in self.widths.iter().enumerate() {
            let token = if i == selected {
                ThemeToken::TimelineSelected
            } else {
                ThemeToken::TimelinePoint
            };
            commands.push(RenderCommand::DrawRect {
                rect: Rect::new(x + TIMEPOINT_GAP / 2.0, 2.0, w, viewport.height - 4.0),
                color: token.into(),
                border_color: None,
                label: Some(timepoint_title(times, i)),
                node_uid: None,
            });
            x += w + TIMEPOINT_GAP;
        }

        commands.push(RenderCommand::EndGroup);
        commands
    }

    fn on_resize(&mut self, data: &MassifData, viewport: &Viewport) {
        self.widths = timeline_widths(data.times(), viewport.width - PLAY_BUTTON_WIDTH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::{model, site};

    #[test]
    fn even_spacing() {
        assert_eq!(timeline_widths(&[1.0, 2.0, 3.0, 4.0], 100.0), vec![23.0; 4]);
    }

    #[test]
    fn remainder_carries_into_next_box() {
        let widths = timeline_widths(&[1.0, 2.0, 3.0], 100.0);
        assert_eq!(widths[0], 31.0);
        let used: f64 = widths.iter().map(|w| w + TIMEPOINT_GAP).sum();
        assert!((99.0..=100.0).contains(&used), "used {used}");
    }

    #[test]
    fn degenerate_time_axis_falls_back_to_equal_widths() {
        assert_eq!(timeline_widths(&[0.0, 0.0], 50.0), vec![23.0, 23.0]);
        assert!(timeline_widths(&[], 50.0).is_empty());
    }

    #[test]
    fn titles_are_percent_of_last_time() {
        let times = [10.0, 33.0, 200.0];
        assert_eq!(timepoint_title(&times, 0), "5%");
        assert_eq!(timepoint_title(&times, 1), "16.5%");
        assert_eq!(timepoint_title(&times, 2), "100%");
    }

    #[test]
    fn playback_steps_then_loops() {
        let mut data = model(&[1.0, 3.0, 4.0], vec![site(1, &[1.0, 2.0, 3.0], vec![])]);
        let mut playback = Playback::default();
        assert_eq!(playback.tick(&mut data), None);

        assert!(playback.toggle());
        let delay = playback.tick(&mut data).map(|d| d.as_millis());
        assert_eq!(data.selected_time(), 1);
        assert_eq!(delay, Some(2500));

        assert_eq!(playback.tick(&mut data).map(|d| d.as_millis()), Some(1250));
        assert_eq!(data.selected_time(), 2);

        assert_eq!(playback.tick(&mut data), Some(Duration::from_millis(1000)));
        assert_eq!(playback.state(), PlaybackState::Looping);
        assert_eq!(data.selected_time(), 2);

        playback.tick(&mut data);
        assert_eq!(data.selected_time(), 0);
        assert_eq!(playback.state(), PlaybackState::Playing);

        assert!(!playback.toggle());
        assert_eq!(playback.tick(&mut data), None);
    }

    #[test]
    fn single_snapshot_never_plays() {
        let mut data = model(&[1.0], vec![site(1, &[1.0], vec![])]);
        let mut playback = Playback::default();
        playback.toggle();
        assert_eq!(playback.tick(&mut data), None);
        assert!(!playback.is_running());
    }

    #[test]
    fn hover_selects_timepoint_under_cursor() {
        let mut data = model(&[1.0, 2.0, 3.0, 4.0], vec![site(1, &[1.0; 4], vec![])]);
        let mut view = TimelineView::default();
        let commands = view.draw(&data, &Viewport::sized(128.0, 20.0));
        let boxes = commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::DrawRect { .. }))
            .count();
        assert_eq!(boxes, 4);

        assert_eq!(view.time_at(10.0), None);
        assert!(view.is_play_button(10.0));
        view.hover(&mut data, PLAY_BUTTON_WIDTH + 60.0);
        assert_eq!(data.selected_time(), 2);
    }
}
