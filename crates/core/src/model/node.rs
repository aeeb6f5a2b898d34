use std::cell::OnceCell;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color::NodeColors;

/// Index of a node in its [`MassifData`](super::MassifData) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Whether a node's children are shown in place of the node itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpandState {
    /// No children; expansion does not apply.
    Leaf,
    Collapsed,
    Expanded,
}

impl ExpandState {
    pub fn is_expanded(self) -> bool {
        self == Self::Expanded
    }

    pub fn is_leaf(self) -> bool {
        self == Self::Leaf
    }
}

/// Which parts of a signature the allocation tree shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelOptions {
    pub show_context: bool,
    pub show_args: bool,
    pub show_location: bool,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            show_context: true,
            show_args: false,
            show_location: true,
        }
    }
}

/// The parsed signature of the function at an allocation site. Display only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncSignature {
    pub return_type: Option<String>,
    /// Enclosing namespaces and classes, including the trailing separator.
    pub context: Option<String>,
    pub name: Option<String>,
    pub template_args: Option<String>,
    pub args: Option<String>,
    /// `const` / `volatile`.
    pub qualifiers: Option<String>,
    pub source_file: Option<String>,
    pub source_line: Option<String>,
}

fn part(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("")
}

impl FuncSignature {
    /// The bare function name.
    pub fn base_name(&self) -> &str {
        part(&self.name)
    }

    /// `" (file:line)"`, `" (file)"`, or empty.
    pub fn location_suffix(&self) -> String {
        match (self.source_file.as_deref(), self.source_line.as_deref()) {
            (Some(file), Some(line)) if !file.is_empty() && !line.is_empty() => {
                format!(" ({file}:{line})")
            }
            (Some(file), _) if !file.is_empty() => format!(" ({file})"),
            _ => String::new(),
        }
    }

    /// Context, name, template args and args, with the source location.
    pub fn func_name(&self) -> String {
        let mut s = format!(
            "{}{}{}{}",
            part(&self.context),
            part(&self.name),
            part(&self.template_args),
            part(&self.args)
        );
        s.push_str(&self.location_suffix());
        s
    }

    /// Everything known about the function, for tooltips.
    pub fn full_func_name(&self) -> String {
        let mut s = format!(
            "{}{}{}{}",
            part(&self.context),
            part(&self.name),
            part(&self.template_args),
            part(&self.args)
        );
        if let Some(rtype) = self.return_type.as_deref().filter(|r| !r.is_empty()) {
            s = format!("{rtype} {s}");
        }
        if let Some(q) = self.qualifiers.as_deref().filter(|q| !q.is_empty()) {
            s.push(' ');
            s.push_str(q);
        }
        s.push_str(&self.location_suffix());
        s
    }

    /// The allocation-tree label under the given options.
    pub fn label(&self, options: &LabelOptions) -> String {
        let mut s = if options.show_context {
            format!(
                "{}{}{}",
                part(&self.context),
                part(&self.name),
                part(&self.template_args)
            )
        } else {
            part(&self.name).to_string()
        };
        if options.show_args {
            s.push_str(part(&self.args));
            s.push_str(part(&self.qualifiers));
        }
        if options.show_location {
            s.push_str(&self.location_suffix());
        }
        s
    }
}

/// One allocation site. Owned by a [`MassifData`](super::MassifData); all
/// mutation goes through it so derived state and notifications stay in step.
#[derive(Debug, Clone)]
pub struct HeapSeqNode {
    pub(crate) uid: u64,
    pub(crate) signature: FuncSignature,
    /// Megabytes per snapshot, aliased down single-child chains.
    pub(crate) allocs: Arc<[f64]>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) expand: ExpandState,
    pub(crate) hidden: bool,
    pub(crate) highlighted: bool,
    pub(crate) plotted: bool,
    pub(crate) colors: NodeColors,
    pub(crate) max_size: OnceCell<f64>,
}

impl HeapSeqNode {
    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn signature(&self) -> &FuncSignature {
        &self.signature
    }

    pub fn func_name(&self) -> String {
        self.signature.func_name()
    }

    pub fn allocs(&self) -> &[f64] {
        &self.allocs
    }

    /// Whether this node shares its sample array with `other`.
    pub fn shares_allocs_with(&self, other: &HeapSeqNode) -> bool {
        Arc::ptr_eq(&self.allocs, &other.allocs)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn expand_state(&self) -> ExpandState {
        self.expand
    }

    /// The user's own hide flag, ignoring whether hiding is enabled.
    pub fn hide_requested(&self) -> bool {
        self.hidden
    }

    pub fn is_highlighted(&self) -> bool {
        self.highlighted
    }

    pub fn is_plotted(&self) -> bool {
        self.plotted
    }

    pub fn colors(&self) -> &NodeColors {
        &self.colors
    }

    /// Largest sample over the whole run, computed once.
    pub fn max_size(&self) -> f64 {
        *self
            .max_size
            .get_or_init(|| self.allocs.iter().copied().fold(0.0, f64::max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature() -> FuncSignature {
        FuncSignature {
            return_type: Some("void*".into()),
            context: Some("std::vector<int>::".into()),
            name: Some("grow".into()),
            template_args: Some("<4>".into()),
            args: Some("(size_t)".into()),
            qualifiers: Some("const".into()),
            source_file: Some("vector.h".into()),
            source_line: Some("120".into()),
        }
    }

    #[test]
    fn func_name_includes_location() {
        assert_eq!(
            signature().func_name(),
            "std::vector<int>::grow<4>(size_t) (vector.h:120)"
        );
    }

    #[test]
    fn full_name_adds_return_type_and_qualifiers() {
        assert_eq!(
            signature().full_func_name(),
            "void* std::vector<int>::grow<4>(size_t) const (vector.h:120)"
        );
    }

    #[test]
    fn location_without_line() {
        let sig = FuncSignature {
            name: Some("f".into()),
            source_file: Some("f.c".into()),
            ..Default::default()
        };
        assert_eq!(sig.func_name(), "f (f.c)");
        assert_eq!(FuncSignature::default().func_name(), "");
    }

    #[test]
    fn label_respects_options() {
        let sig = signature();
        assert_eq!(
            sig.label(&LabelOptions::default()),
            "std::vector<int>::grow<4> (vector.h:120)"
        );
        let bare = LabelOptions {
            show_context: false,
            show_args: true,
            show_location: false,
        };
        assert_eq!(sig.label(&bare), "grow(size_t)const");
    }
}
