use std::cell::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

use massif_view_protocol::{HeapSeqInput, SnapshotFile};
use thiserror::Error;
use tracing::debug;

use super::events::EventHub;
use super::massif::MassifData;
use super::node::{ExpandState, FuncSignature, HeapSeqNode, NodeId};
use crate::color::{ColorParseError, HexColor, NodeColors};
use crate::config::ModelConfig;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot has no timestamps")]
    NoSnapshots,
    #[error("selected time {selected} is out of range for {count} snapshots")]
    SelectedTimeOutOfRange { selected: usize, count: usize },
    #[error("node {uid}: expected {expected} allocation samples, found {found}")]
    AllocsLength {
        uid: u64,
        expected: usize,
        found: usize,
    },
    #[error("node {uid}: {source}")]
    Color {
        uid: u64,
        #[source]
        source: ColorParseError,
    },
    #[error("duplicate node uid {0}")]
    DuplicateUid(u64),
}

impl MassifData {
    /// Parse a snapshot file and build the model from it.
    pub fn from_json(data: &[u8], config: &ModelConfig) -> Result<Self, LoadError> {
        let snapshot: SnapshotFile = serde_json::from_slice(data)?;
        Self::from_snapshot(snapshot, config)
    }

    /// Build the model, derive the visible and plotted sets, and expand
    /// every node holding at least `config.auto_expand_fraction` of the
    /// peak heap.
    pub fn from_snapshot(snapshot: SnapshotFile, config: &ModelConfig) -> Result<Self, LoadError> {
        let count = snapshot.times.len();
        if count == 0 {
            return Err(LoadError::NoSnapshots);
        }
        if snapshot.selected_time >= count {
            return Err(LoadError::SelectedTimeOutOfRange {
                selected: snapshot.selected_time,
                count,
            });
        }

        let mut builder = Builder {
            expected_len: count,
            nodes: Vec::with_capacity(snapshot.node_count()),
            uids: HashMap::new(),
        };
        let root = builder.add(snapshot.heap_seq, None, None, false)?;

        let mut data = MassifData {
            times: snapshot.times,
            nodes: builder.nodes,
            root,
            selected_time: snapshot.selected_time,
            visible: Vec::new(),
            plotted: Vec::new(),
            hiding_enabled: config.hiding_enabled,
            events: EventHub::default(),
        };
        data.recompute();

        let threshold = data.max_size(root) * config.auto_expand_fraction;
        data.expand_to(root, threshold);

        debug!(
            nodes = data.nodes.len(),
            snapshots = count,
            visible = data.visible.len(),
            plotted = data.plotted.len(),
            "loaded heap snapshot"
        );
        Ok(data)
    }
}

struct Builder {
    expected_len: usize,
    nodes: Vec<HeapSeqNode>,
    uids: HashMap<u64, NodeId>,
}

impl Builder {
    /// Add `input` and its subtree in pre-order. An only child reuses its
    /// parent's samples instead of its own.
    fn add(
        &mut self,
        input: HeapSeqInput,
        parent: Option<NodeId>,
        inherited: Option<Arc<[f64]>>,
        only_child: bool,
    ) -> Result<NodeId, LoadError> {
        let uid = input.uid;
        let id = NodeId(self.nodes.len());
        if self.uids.insert(uid, id).is_some() {
            return Err(LoadError::DuplicateUid(uid));
        }

        let allocs = match inherited {
            Some(shared) => shared,
            None if input.allocs.len() == self.expected_len => Arc::from(input.allocs),
            None => {
                return Err(LoadError::AllocsLength {
                    uid,
                    expected: self.expected_len,
                    found: input.allocs.len(),
                });
            }
        };
        let color: HexColor = input
            .color
            .parse()
            .map_err(|source| LoadError::Color { uid, source })?;

        let expand = match (input.children.is_empty(), only_child) {
            (true, _) => ExpandState::Leaf,
            (false, true) => ExpandState::Expanded,
            (false, false) => ExpandState::Collapsed,
        };

        self.nodes.push(HeapSeqNode {
            uid,
            signature: FuncSignature {
                return_type: input.func_rtype,
                context: input.func_context,
                name: input.func_name,
                template_args: input.func_template_args,
                args: input.func_args,
                qualifiers: input.func_qualifiers,
                source_file: input.func_source_file,
                source_line: input.func_source_line,
            },
            allocs: Arc::clone(&allocs),
            parent,
            children: Vec::with_capacity(input.children.len()),
            expand,
            hidden: false,
            highlighted: false,
            plotted: false,
            colors: NodeColors::derive(color),
            max_size: OnceCell::new(),
        });

        let single = input.children.len() == 1;
        for child in input.children {
            let shared = single.then(|| Arc::clone(&allocs));
            let child_id = self.add(child, Some(id), shared, single)?;
            self.nodes[id.0].children.push(child_id);
        }
        Ok(id)
    }
}
