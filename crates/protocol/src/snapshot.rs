//! The pre-parsed heap-profile snapshot handed to the viewer.
//!
//! The field names follow the JSON emitted by the profile converter, so a
//! snapshot file deserializes directly into [`SnapshotFile`].

use serde::{Deserialize, Serialize};

/// A whole profiling run: the snapshot timestamps and the allocation tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFile {
    /// Snapshot timestamps, ascending.
    pub times: Vec<f64>,
    /// Synthetic root of the allocation tree.
    pub heap_seq: HeapSeqInput,
    /// Index into `times` shown initially.
    #[serde(default)]
    pub selected_time: usize,
}

/// One allocation site in the input tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapSeqInput {
    pub uid: u64,
    /// Highlight color as `#rrggbb`.
    pub color: String,
    #[serde(default, rename = "funcRType")]
    pub func_rtype: Option<String>,
    #[serde(default)]
    pub func_context: Option<String>,
    #[serde(default)]
    pub func_name: Option<String>,
    #[serde(default)]
    pub func_template_args: Option<String>,
    #[serde(default)]
    pub func_args: Option<String>,
    #[serde(default)]
    pub func_qualifiers: Option<String>,
    #[serde(default)]
    pub func_source_file: Option<String>,
    /// Line numbers arrive as either strings or integers.
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub func_source_line: Option<String>,
    /// Megabytes attributed to this site at each snapshot.
    #[serde(default)]
    pub allocs: Vec<f64>,
    #[serde(default)]
    pub children: Vec<HeapSeqInput>,
}

impl SnapshotFile {
    /// Number of nodes in the tree, root included.
    pub fn node_count(&self) -> usize {
        fn count(node: &HeapSeqInput) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        count(&self.heap_seq)
    }
}

mod de {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Int(i64),
        Float(f64),
    }

    pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<StringOrNumber>::deserialize(deserializer)?;
        Ok(value.map(|v| match v {
            StringOrNumber::String(s) => s,
            StringOrNumber::Int(i) => i.to_string(),
            StringOrNumber::Float(f) => f.to_string(),
        }))
    }
}
