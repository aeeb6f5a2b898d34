//! Integration test: render every view of a loaded snapshot, keep the views
//! in step through model events, and export the result as SVG.

use std::collections::HashSet;

use massif_view_core::config::ViewerConfig;
use massif_view_core::svg::render_svg;
use massif_view_core::views::{
    AllocTreeView, MemgraphView, Renderable, SparklinesView, TimelineView, TreemapView,
};
use massif_view_core::{EventLog, MassifData};
use massif_view_protocol::{RenderCommand, Viewport};

fn views(config: &ViewerConfig) -> Vec<Box<dyn Renderable>> {
    vec![
        Box::new(TreemapView::new(config.treemap.clone())),
        Box::new(MemgraphView::new(config.memgraph.clone())),
        Box::new(SparklinesView::new(config.sparklines.clone())),
        Box::new(AllocTreeView::new(config.alloc_tree.clone())),
        Box::new(TimelineView::new(config.playback.clone())),
    ]
}

fn groups_balanced(commands: &[RenderCommand]) -> bool {
    let mut depth = 0i32;
    for cmd in commands {
        match cmd {
            RenderCommand::BeginGroup { .. } => depth += 1,
            RenderCommand::EndGroup => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

fn drawn_uids(commands: &[RenderCommand]) -> HashSet<u64> {
    commands
        .iter()
        .filter_map(|c| match c {
            RenderCommand::DrawRect { node_uid, .. } => *node_uid,
            _ => None,
        })
        .collect()
}

#[test]
fn every_view_renders_and_exports() {
    let config = ViewerConfig::default();
    let mut data = MassifData::from_json(include_bytes!("fixtures/program.json"), &config.model)
        .expect("fixture should load");
    let viewport = Viewport::sized(640.0, 360.0);

    for mut view in views(&config) {
        let commands = view.draw(&data, &viewport);
        assert!(!commands.is_empty());
        assert!(groups_balanced(&commands));

        let svg = render_svg(&commands, viewport.width, viewport.height, false);
        assert!(svg.starts_with("<svg") && svg.ends_with("</svg>"));
    }

    let mut treemap = TreemapView::new(config.treemap.clone());
    let uids = drawn_uids(&treemap.draw(&data, &viewport));
    for uid in [1, 2, 3, 4, 5, 6, 7] {
        assert!(uids.contains(&uid), "treemap is missing uid {uid}");
    }

    // Collapsing a subtree through the model drops its children from the
    // treemap on the next draw.
    let log = EventLog::attach(&mut data);
    let malloc = data.find_by_uid(5).expect("uid 5");
    data.set_expanded(malloc, false);
    for event in log.drain() {
        treemap.on_event(&data, &event);
    }
    let uids = drawn_uids(&treemap.draw(&data, &viewport));
    assert!(uids.contains(&5));
    assert!(!uids.contains(&6) && !uids.contains(&7));
}

#[test]
fn alloc_tree_rows_track_visible_nodes() {
    let config = ViewerConfig::default();
    let mut data = MassifData::from_json(include_bytes!("fixtures/program.json"), &config.model)
        .expect("fixture should load");
    let mut view = AllocTreeView::new(config.alloc_tree.clone());
    let viewport = Viewport::sized(400.0, 1000.0);

    let rows = |commands: &[RenderCommand]| drawn_uids(commands).len();
    assert_eq!(rows(&view.draw(&data, &viewport)), 7);

    let operator_new = data.find_by_uid(1).expect("uid 1");
    data.set_expanded(operator_new, false);
    assert_eq!(rows(&view.draw(&data, &viewport)), 4);
}
