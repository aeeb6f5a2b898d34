pub mod commands;
pub mod snapshot;
pub mod theme;
pub mod types;

pub use commands::{Paint, RenderCommand, TextAlign};
pub use snapshot::{HeapSeqInput, SnapshotFile};
pub use theme::ThemeToken;
pub use types::{Color, Point, Rect, Viewport};
