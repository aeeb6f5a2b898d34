//! Small tree builders for unit tests.

use massif_view_protocol::{HeapSeqInput, SnapshotFile};

use super::MassifData;
use crate::config::ModelConfig;

pub(crate) fn site(uid: u64, allocs: &[f64], children: Vec<HeapSeqInput>) -> HeapSeqInput {
    HeapSeqInput {
        uid,
        color: "#4080c0".into(),
        func_name: Some(format!("f{uid}")),
        allocs: allocs.to_vec(),
        children,
        ..Default::default()
    }
}

/// A snapshot whose root (uid 0) holds the per-time sum of `children`.
pub(crate) fn snapshot(times: &[f64], children: Vec<HeapSeqInput>) -> SnapshotFile {
    let totals = (0..times.len())
        .map(|t| children.iter().map(|c| c.allocs[t]).sum())
        .collect::<Vec<f64>>();
    SnapshotFile {
        times: times.to_vec(),
        heap_seq: site(0, &totals, children),
        selected_time: 0,
    }
}

/// Load without auto-expansion so every multi-child node starts collapsed.
pub(crate) fn model(times: &[f64], children: Vec<HeapSeqInput>) -> MassifData {
    let config = ModelConfig {
        auto_expand_fraction: 2.0,
        ..Default::default()
    };
    MassifData::from_snapshot(snapshot(times, children), &config).unwrap()
}

pub(crate) fn id(data: &MassifData, uid: u64) -> super::NodeId {
    data.find_by_uid(uid).unwrap()
}
