use serde::{Deserialize, Serialize};

/// Semantic color tokens resolved by the renderer's active theme.
///
/// Per-node colors chosen by the user travel as explicit RGB values (see
/// [`crate::Paint`]); tokens cover everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThemeToken {
    Background,
    Surface,
    Border,

    TextPrimary,
    TextSecondary,
    TextMuted,

    // Treemap
    TreemapBackground,
    TreemapBorder,
    /// Box of a node that is visible but not plotted (expanded or hidden).
    TreemapUnplotted,

    // Memgraph
    MemgraphBackground,
    MemgraphAxis,
    /// Marker drawn beside the highlighted series.
    MemgraphHighlightMarker,

    // Sparklines
    SparklineMuted,
    SparklineBaseline,

    // Allocation tree
    TableRowEven,
    TableRowOdd,
    SizebarFrame,
    SizebarFill,
    HiddenMarker,

    // Timeline
    TimelinePoint,
    TimelineSelected,
    SelectionHighlight,
}
