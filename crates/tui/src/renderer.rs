use std::io::stdout;
use std::time::Instant;

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind, MouseButton, MouseEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use massif_view_core::color::{ColorPair, HexColor};
use massif_view_core::config::ViewerConfig;
use massif_view_core::model::ExpandState;
use massif_view_core::views::Renderable;
use massif_view_core::views::timeline::{timeline_widths, timepoint_title};
use massif_view_core::views::treemap::TreemapOptions;
use massif_view_core::MassifData;
use massif_view_protocol::{Paint, Point, RenderCommand, ThemeToken, Viewport};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph},
};

use crate::app::App;

fn theme_to_color(token: ThemeToken) -> Color {
    match token {
        ThemeToken::Background
        | ThemeToken::TreemapBackground
        | ThemeToken::MemgraphBackground
        | ThemeToken::TableRowEven => Color::Black,
        ThemeToken::Surface | ThemeToken::TableRowOdd => Color::Rgb(20, 20, 20),
        ThemeToken::Border | ThemeToken::TreemapBorder | ThemeToken::SizebarFrame => {
            Color::DarkGray
        }
        ThemeToken::TextPrimary => Color::White,
        ThemeToken::TextSecondary | ThemeToken::MemgraphAxis => Color::Gray,
        ThemeToken::TextMuted | ThemeToken::SparklineMuted | ThemeToken::SparklineBaseline => {
            Color::DarkGray
        }
        ThemeToken::TreemapUnplotted => Color::Rgb(60, 60, 60),
        ThemeToken::SizebarFill => Color::Rgb(60, 120, 200),
        ThemeToken::HiddenMarker => Color::LightRed,
        ThemeToken::MemgraphHighlightMarker | ThemeToken::SelectionHighlight => Color::Yellow,
        ThemeToken::TimelinePoint => Color::DarkGray,
        ThemeToken::TimelineSelected => Color::LightBlue,
    }
}

fn paint_to_color(paint: Paint) -> Color {
    match paint {
        Paint::Token(token) => theme_to_color(token),
        Paint::Rgb(c) => {
            let (r, g, b) = c.to_rgb8();
            Color::Rgb(r, g, b)
        }
    }
}

fn hex_to_color(hex: HexColor) -> Color {
    let [r, g, b] = hex.0;
    Color::Rgb(r, g, b)
}

/// Treemap settings for a character grid: one cell is one unit, with no
/// frame and a single row (or column) of label.
fn cell_treemap_options(base: &TreemapOptions) -> TreemapOptions {
    TreemapOptions {
        border: 0.0,
        padding: 0.0,
        text_size: 1.0,
        ..base.clone()
    }
}

/// Paint render commands onto a terminal buffer, one unit per cell, offset
/// to `area`. Rect labels are tooltips and are not drawn.
pub fn rasterize(commands: &[RenderCommand], area: Rect, buf: &mut Buffer) {
    let in_area = |x: i64, y: i64| {
        x >= 0 && y >= 0 && x < i64::from(area.width) && y < i64::from(area.height)
    };
    for cmd in commands {
        match cmd {
            RenderCommand::DrawRect { rect, color, .. } => {
                if !rect.is_drawable() {
                    continue;
                }
                let bg = paint_to_color(*color);
                let (x0, y0) = (rect.x.round() as i64, rect.y.round() as i64);
                let (x1, y1) = ((rect.x + rect.w).round() as i64, (rect.y + rect.h).round() as i64);
                for y in y0..y1 {
                    for x in x0..x1 {
                        if in_area(x, y) {
                            buf[(area.x + x as u16, area.y + y as u16)]
                                .set_char(' ')
                                .set_bg(bg);
                        }
                    }
                }
            }
            RenderCommand::DrawText {
                position,
                text,
                color,
                vertical,
                ..
            } => {
                let fg = paint_to_color(*color);
                let (mut x, mut y) = (position.x.floor() as i64, position.y.floor() as i64);
                for ch in text.chars() {
                    if in_area(x, y) {
                        buf[(area.x + x as u16, area.y + y as u16)]
                            .set_char(ch)
                            .set_fg(fg);
                    }
                    if *vertical {
                        y += 1;
                    } else {
                        x += 1;
                    }
                }
            }
            _ => {}
        }
    }
}

/// Run the interactive viewer until the user quits.
pub fn run(data: MassifData, mut config: ViewerConfig) -> Result<()> {
    config.treemap = cell_treemap_options(&config.treemap);
    let mut app = App::new(data, config);

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    result
}

fn event_loop(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, app: &mut App) -> Result<()> {
    let mut treemap_area = Rect::default();
    while !app.quit {
        terminal.draw(|frame| treemap_area = draw(frame, app))?;

        if event::poll(app.poll_timeout(Instant::now()))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
                Event::Mouse(mouse) if mouse.kind == MouseEventKind::Down(MouseButton::Left) => {
                    let (col, row) = (mouse.column, mouse.row);
                    if treemap_area.contains((col, row).into()) {
                        let p = Point::new(
                            f64::from(col - treemap_area.x) + 0.5,
                            f64::from(row - treemap_area.y) + 0.5,
                        );
                        app.click_treemap(p);
                    }
                }
                _ => {}
            }
        }
        app.on_timer(Instant::now());
    }
    Ok(())
}

/// Draw one frame. Returns the treemap's area for mouse hit testing.
fn draw(frame: &mut Frame, app: &mut App) -> Rect {
    let [header, body, timeline, help] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());
    let [tree_area, map_area] =
        Layout::horizontal([Constraint::Percentage(45), Constraint::Percentage(55)]).areas(body);

    let data = &app.data;
    let time = data.selected_time();
    let title = format!(
        " massif-view | snapshot {}/{} | {} nodes | {} plotted ",
        time + 1,
        data.times().len(),
        data.len(),
        data.plotted_nodes().len()
    );
    frame.render_widget(
        Paragraph::new(title).style(Style::default().fg(Color::White).bg(Color::DarkGray)),
        header,
    );

    draw_tree(frame, app, tree_area);

    let block = Block::bordered().title(" treemap ");
    let inner = block.inner(map_area);
    frame.render_widget(block, map_area);
    let viewport = Viewport::sized(f64::from(inner.width), f64::from(inner.height));
    let commands = app.treemap.draw(&app.data, &viewport);
    rasterize(&commands, inner, frame.buffer_mut());

    draw_timeline(frame, app, timeline);
    frame.render_widget(
        Paragraph::new(
            " ↑↓ move  ⏎ expand  x expand-to  h hide  H hiding  K/J/t/b shuffle  ←→ time  p play  c color  s sizebar  q quit",
        )
        .style(Style::default().fg(Color::Gray)),
        help,
    );
    inner
}

fn draw_tree(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::bordered().title(" allocations ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = app.rows();
    let height = usize::from(inner.height);
    let first = app.cursor.saturating_sub(height.saturating_sub(1));
    let options = app.tree.options();

    let lines: Vec<Line> = rows
        .iter()
        .enumerate()
        .skip(first)
        .take(height)
        .map(|(i, row)| {
            let glyph = match row.expand {
                ExpandState::Leaf => "•",
                ExpandState::Collapsed => "▸",
                ExpandState::Expanded => "▾",
            };
            let mut spans = vec![Span::raw(format!("{}{glyph} ", "  ".repeat(row.depth)))];
            if options.hide_boxes_visible {
                let mark = if row.hidden { "[ ] " } else { "[x] " };
                spans.push(Span::styled(mark, Style::default().fg(Color::LightRed)));
            }
            if options.shuffle_buttons_visible {
                spans.push(Span::raw("↓↑ "));
            }
            spans.push(Span::styled(
                format!("{:>7} ", row.sizebar.text),
                Style::default().fg(Color::LightBlue),
            ));
            let label_style = match row.colors {
                Some(ColorPair {
                    background,
                    foreground,
                }) => Style::default()
                    .bg(hex_to_color(background))
                    .fg(hex_to_color(foreground)),
                None => Style::default(),
            };
            spans.push(Span::styled(row.label.clone(), label_style));
            let line = Line::from(spans);
            if i == app.cursor {
                line.style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                line
            }
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn draw_timeline(frame: &mut Frame, app: &App, area: Rect) {
    let data = &app.data;
    let times = data.times();
    let glyph = if app.timeline.playback().is_running() {
        " ❚❚ "
    } else {
        " ▶  "
    };
    let label = format!(" {} ", timepoint_title(times, data.selected_time()));
    let width = f64::from(area.width) - (glyph.chars().count() + label.len()) as f64;

    let mut spans = vec![Span::raw(glyph)];
    for (i, w) in timeline_widths(times, width).into_iter().enumerate() {
        let color = if i == data.selected_time() {
            theme_to_color(ThemeToken::TimelineSelected)
        } else {
            theme_to_color(ThemeToken::TimelinePoint)
        };
        // One of the two gap cells goes back to the box so none is empty.
        let cells = w as usize + 1;
        spans.push(Span::styled("━".repeat(cells), Style::default().fg(color)));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::raw(label));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use massif_view_protocol::{Color as RgbColor, TextAlign};

    #[test]
    fn rects_fill_cells_and_text_overwrites() {
        let area = Rect::new(0, 0, 6, 3);
        let mut buf = Buffer::empty(area);
        let commands = vec![
            RenderCommand::DrawRect {
                rect: massif_view_protocol::Rect::new(1.0, 0.0, 3.0, 2.0),
                color: Paint::Rgb(RgbColor::rgb8(10, 20, 30)),
                border_color: None,
                label: Some("tooltip".into()),
                node_uid: Some(1),
            },
            RenderCommand::DrawText {
                position: Point::new(1.0, 1.0),
                text: "abcdefgh".into(),
                color: ThemeToken::TextPrimary.into(),
                font_size: 1.0,
                align: TextAlign::Left,
                vertical: false,
            },
        ];
        rasterize(&commands, area, &mut buf);
        assert_eq!(buf[(1, 0)].bg, Color::Rgb(10, 20, 30));
        assert_eq!(buf[(0, 0)].bg, Color::Reset);
        assert_eq!(buf[(1, 1)].symbol(), "a");
        assert_eq!(buf[(5, 1)].symbol(), "e");
        assert_eq!(buf[(3, 0)].symbol(), " ");
    }

    #[test]
    fn vertical_text_runs_down() {
        let area = Rect::new(2, 1, 4, 4);
        let mut buf = Buffer::empty(Rect::new(0, 0, 8, 8));
        let commands = vec![RenderCommand::DrawText {
            position: Point::new(0.0, 0.0),
            text: "xyz".into(),
            color: ThemeToken::TextPrimary.into(),
            font_size: 1.0,
            align: TextAlign::Left,
            vertical: true,
        }];
        rasterize(&commands, area, &mut buf);
        assert_eq!(buf[(2, 1)].symbol(), "x");
        assert_eq!(buf[(2, 3)].symbol(), "z");
    }
}
