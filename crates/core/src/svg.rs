//! SVG export: turns any view's `RenderCommand` list into a standalone
//! SVG document.

use massif_view_protocol::{Paint, RenderCommand, TextAlign, ThemeToken};

/// Render a list of commands as an SVG document string.
///
/// `width` and `height` define the viewBox; `dark` picks the palette that
/// theme tokens resolve to. Explicit RGB paints are used as-is.
pub fn render_svg(commands: &[RenderCommand], width: f64, height: f64, dark: bool) -> String {
    let mut svg = String::with_capacity(commands.len() * 160);
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}" width="{width}" height="{height}" style="font-family:system-ui,-apple-system,sans-serif;font-size:11px">"#,
    ));
    svg.push_str(&format!(
        r#"<rect width="{width}" height="{height}" fill="{}"/>"#,
        resolve_token(ThemeToken::Background, dark),
    ));

    let mut clips = 0usize;
    let mut clip_open = false;
    for cmd in commands {
        match cmd {
            RenderCommand::DrawRect {
                rect,
                color,
                border_color,
                label,
                node_uid,
            } => {
                if !rect.is_drawable() {
                    continue;
                }
                svg.push_str(&format!(
                    r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}""#,
                    rect.x,
                    rect.y,
                    rect.w,
                    rect.h,
                    resolve(*color, dark),
                ));
                if let Some(border) = border_color {
                    svg.push_str(&format!(
                        r#" stroke="{}" stroke-width="1""#,
                        resolve_token(*border, dark)
                    ));
                }
                if let Some(uid) = node_uid {
                    svg.push_str(&format!(r#" data-uid="{uid}""#));
                }
                match label {
                    Some(label) => {
                        svg.push_str(&format!(
                            "><title>{}</title></rect>",
                            escape_xml(label)
                        ));
                    }
                    None => svg.push_str("/>"),
                }
            }
            RenderCommand::DrawLine {
                from,
                to,
                color,
                width: line_width,
            } => {
                svg.push_str(&format!(
                    r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="{line_width}"/>"#,
                    from.x,
                    from.y,
                    to.x,
                    to.y,
                    resolve(*color, dark),
                ));
            }
            RenderCommand::DrawText {
                position,
                text,
                color,
                font_size,
                align,
                vertical,
            } => {
                let anchor = match align {
                    TextAlign::Left => "start",
                    TextAlign::Center => "middle",
                    TextAlign::Right => "end",
                };
                svg.push_str(&format!(
                    r#"<text x="{}" y="{}" fill="{}" font-size="{font_size}" text-anchor="{anchor}""#,
                    position.x,
                    position.y,
                    resolve(*color, dark),
                ));
                if *vertical {
                    svg.push_str(r#" style="writing-mode:vertical-rl;pointer-events:none""#);
                } else {
                    svg.push_str(r#" style="pointer-events:none""#);
                }
                svg.push_str(&format!(">{}</text>", escape_xml(text)));
            }
            RenderCommand::SetClip { rect } => {
                if clip_open {
                    svg.push_str("</g>");
                }
                clips += 1;
                svg.push_str(&format!(
                    r#"<clipPath id="clip{clips}"><rect x="{}" y="{}" width="{}" height="{}"/></clipPath><g clip-path="url(#clip{clips})">"#,
                    rect.x, rect.y, rect.w, rect.h,
                ));
                clip_open = true;
            }
            RenderCommand::ClearClip => {
                if clip_open {
                    svg.push_str("</g>");
                    clip_open = false;
                }
            }
            // Groups only matter to interactive renderers.
            RenderCommand::BeginGroup { .. } | RenderCommand::EndGroup => {}
        }
    }
    if clip_open {
        svg.push_str("</g>");
    }

    svg.push_str("</svg>");
    svg
}

fn resolve(paint: Paint, dark: bool) -> String {
    match paint {
        Paint::Token(token) => resolve_token(token, dark).to_string(),
        Paint::Rgb(color) => color.to_hex(),
    }
}

fn resolve_token(token: ThemeToken, dark: bool) -> &'static str {
    use ThemeToken::*;
    if dark {
        match token {
            Background | TreemapBackground | MemgraphBackground => "#181818",
            Surface | TableRowEven => "#222222",
            TableRowOdd => "#2a2a2a",
            Border | TreemapBorder | SizebarFrame => "#505050",
            TextPrimary => "#ececec",
            TextSecondary | MemgraphAxis => "#9e9e9e",
            TextMuted | SparklineMuted | TreemapUnplotted => "#616161",
            SparklineBaseline => "#424242",
            SizebarFill => "#5c8dd6",
            HiddenMarker => "#ef5350",
            MemgraphHighlightMarker | SelectionHighlight => "#ffd600",
            TimelinePoint => "#3a3a3a",
            TimelineSelected => "#448aff",
        }
    } else {
        match token {
            Background | TreemapBackground | MemgraphBackground => "#ffffff",
            Surface | TableRowEven => "#f8f9fa",
            TableRowOdd => "#eef0f2",
            Border | TreemapBorder | SizebarFrame => "#9aa0a6",
            TextPrimary => "#1a1a2e",
            TextSecondary | MemgraphAxis => "#666677",
            TextMuted | SparklineMuted | TreemapUnplotted => "#c8c8c8",
            SparklineBaseline => "#dee2e6",
            SizebarFill => "#7799cc",
            HiddenMarker => "#e63946",
            MemgraphHighlightMarker | SelectionHighlight => "#000000",
            TimelinePoint => "#d0d4d8",
            TimelineSelected => "#3366cc",
        }
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use massif_view_protocol::{Color, Point, Rect};

    #[test]
    fn rgb_paint_passes_through_and_tokens_follow_theme() {
        let commands = vec![
            RenderCommand::DrawRect {
                rect: Rect::new(10.0, 20.0, 100.0, 18.0),
                color: Paint::Rgb(Color::rgb8(0x40, 0x80, 0xc0)),
                border_color: Some(ThemeToken::TreemapBorder),
                label: Some("main".into()),
                node_uid: Some(7),
            },
            RenderCommand::DrawRect {
                rect: Rect::new(0.0, 0.0, 5.0, 5.0),
                color: ThemeToken::TreemapUnplotted.into(),
                border_color: None,
                label: None,
                node_uid: None,
            },
        ];
        let svg = render_svg(&commands, 800.0, 400.0, true);
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("#4080c0"));
        assert!(svg.contains(r#"data-uid="7""#));
        assert!(svg.contains("<title>main</title>"));
        assert!(svg.contains("#616161"));
    }

    #[test]
    fn escapes_xml_entities() {
        let commands = vec![RenderCommand::DrawText {
            position: Point::new(0.0, 10.0),
            text: "operator<<(&std::ostream)".into(),
            color: ThemeToken::TextPrimary.into(),
            font_size: 11.0,
            align: TextAlign::Left,
            vertical: false,
        }];
        let svg = render_svg(&commands, 400.0, 100.0, false);
        assert!(svg.contains("operator&lt;&lt;(&amp;std::ostream)"));
    }

    #[test]
    fn vertical_text_and_clip_regions() {
        let commands = vec![
            RenderCommand::SetClip {
                rect: Rect::new(0.0, 0.0, 50.0, 50.0),
            },
            RenderCommand::DrawText {
                position: Point::new(5.0, 5.0),
                text: "label".into(),
                color: ThemeToken::TextPrimary.into(),
                font_size: 10.0,
                align: TextAlign::Center,
                vertical: true,
            },
            RenderCommand::ClearClip,
        ];
        let svg = render_svg(&commands, 100.0, 100.0, false);
        assert!(svg.contains("writing-mode:vertical-rl"));
        assert!(svg.contains(r#"text-anchor="middle""#));
        assert!(svg.contains(r#"clip-path="url(#clip1)""#));
        assert_eq!(svg.matches("<g ").count(), svg.matches("</g>").count());
    }

    #[test]
    fn labelled_rect_is_one_element() {
        let commands = vec![RenderCommand::DrawRect {
            rect: Rect::new(1.0, 2.0, 3.0, 4.0),
            color: Paint::Rgb(Color::rgb8(0x40, 0x80, 0xc0)),
            border_color: None,
            label: Some("a<b".into()),
            node_uid: Some(9),
        }];
        let svg = render_svg(&commands, 10.0, 10.0, false);
        assert!(svg.contains(
            r##"<rect x="1" y="2" width="3" height="4" fill="#4080c0" data-uid="9"><title>a&lt;b</title></rect>"##
        ));
    }

    #[test]
    fn empty_rects_are_skipped() {
        let commands = vec![RenderCommand::DrawRect {
            rect: Rect::new(0.0, 0.0, 0.0, 10.0),
            color: ThemeToken::Surface.into(),
            border_color: None,
            label: None,
            node_uid: None,
        }];
        let svg = render_svg(&commands, 10.0, 10.0, false);
        assert_eq!(svg.matches("<rect").count(), 1);
    }
}
