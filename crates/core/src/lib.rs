//! Heap-profile model and views for massif-view.
//!
//! [`model::MassifData`] owns the allocation tree and is the only writer of
//! derived state. Views in [`views`] read it, call its mutators, and turn it
//! into [`massif_view_protocol::RenderCommand`] lists that any front end
//! (terminal, browser, SVG) can draw.

pub mod color;
pub mod config;
pub mod format;
pub mod model;
pub mod svg;
pub mod views;

pub use config::{ConfigError, ModelConfig, ViewerConfig};
pub use model::{EventLog, LoadError, MassifData, ModelEvent, NodeId, ShuffleDirection};
