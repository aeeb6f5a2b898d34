pub mod events;
pub mod load;
pub mod massif;
pub mod node;

pub use events::{EventLog, ModelEvent};
pub use load::LoadError;
pub use massif::{MassifData, NodeMut, ShuffleDirection, ShuffleDirectionError};
pub use node::{ExpandState, FuncSignature, HeapSeqNode, LabelOptions, NodeId};

#[cfg(test)]
pub(crate) mod testing;
