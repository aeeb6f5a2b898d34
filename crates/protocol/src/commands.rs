use serde::{Deserialize, Serialize};

use crate::theme::ThemeToken;
use crate::types::{Color, Point, Rect};

/// How a shape or glyph is filled: a themed role or an explicit color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Paint {
    Token(ThemeToken),
    Rgb(Color),
}

impl From<ThemeToken> for Paint {
    fn from(token: ThemeToken) -> Self {
        Self::Token(token)
    }
}

impl From<Color> for Paint {
    fn from(color: Color) -> Self {
        Self::Rgb(color)
    }
}

/// A single, stateless render instruction.
///
/// Every view emits a `Vec<RenderCommand>`. Renderers consume the list
/// sequentially; each command carries all the data it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RenderCommand {
    /// Draw a filled rectangle, optionally with a text label and the uid of
    /// the allocation site it represents (for hit-testing / selection).
    DrawRect {
        rect: Rect,
        color: Paint,
        border_color: Option<ThemeToken>,
        label: Option<String>,
        node_uid: Option<u64>,
    },

    /// Draw a text string at a position.
    DrawText {
        position: Point,
        text: String,
        color: Paint,
        font_size: f64,
        align: TextAlign,
        /// Text runs top-to-bottom instead of left-to-right.
        vertical: bool,
    },

    /// Draw a line segment.
    DrawLine {
        from: Point,
        to: Point,
        color: Paint,
        width: f64,
    },

    /// Restrict subsequent drawing to a rectangular region.
    SetClip { rect: Rect },

    /// Remove the active clip region.
    ClearClip,

    /// Begin a logical group (e.g. one view). Renderers may use this for
    /// batching or layer separation.
    BeginGroup { id: String, label: Option<String> },

    /// End the current group.
    EndGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_serialize_with_variant_tags() {
        let cmd = RenderCommand::DrawRect {
            rect: Rect::new(0.0, 0.0, 10.0, 5.0),
            color: Paint::Token(ThemeToken::TreemapUnplotted),
            border_color: None,
            label: Some("main".into()),
            node_uid: Some(7),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("DrawRect"));
        assert!(json.contains("TreemapUnplotted"));
        assert!(json.contains("\"node_uid\":7"));
    }
}
