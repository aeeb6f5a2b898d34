pub mod alloc_tree;
pub mod memgraph;
pub mod sparklines;
pub mod timeline;
pub mod treemap;

use massif_view_protocol::{RenderCommand, Viewport};

use crate::model::{MassifData, ModelEvent};

pub use alloc_tree::AllocTreeView;
pub use memgraph::MemgraphView;
pub use sparklines::SparklinesView;
pub use timeline::TimelineView;
pub use treemap::TreemapView;

/// A view over a [`MassifData`]: turns the model into render commands and
/// keeps whatever cached layout it needs in step with model events.
pub trait Renderable {
    fn draw(&mut self, data: &MassifData, viewport: &Viewport) -> Vec<RenderCommand>;

    /// Called for every model event, in dispatch order, before the next draw.
    fn on_event(&mut self, _data: &MassifData, _event: &ModelEvent) {}

    fn on_resize(&mut self, _data: &MassifData, _viewport: &Viewport) {}
}
