// SPDX-License-Identifier: MIT OR Apache-2.0
//! `loom` - drives the Loom engine from the command line.
//!
//! Builds a small demo pipeline, renders it through a registered renderer,
//! then exercises undo and reports cache statistics.
//!
//! ```text
//! loom [settings.ron]
//! loom --init <settings.ron>
//! ```

mod pipeline;
mod settings;

use loom_graph::{Canceller, Graph, ScenePath, V3f};
use loom_scene::{
    add_drained_listener, create_renderer, register_node_types, remove_drained_listener, render, SceneView,
};
use settings::{AppError, AppSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if let [flag, path] = args.as_slice() {
        if flag == "--init" {
            if let Err(e) = AppSettings::default().save(path) {
                eprintln!("Failed to write {path}: {e}");
                std::process::exit(1);
            }
            println!("Wrote default settings to {path}");
            return;
        }
    }

    let settings = match args.first() {
        Some(path) => match AppSettings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Failed to load {path}: {e}");
                std::process::exit(1);
            }
        },
        None => AppSettings::default(),
    };

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in settings.log_directives() {
        match directive.parse() {
            Ok(directive) => env_filter = env_filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive '{directive}': {e}"),
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Loom v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&settings) {
        tracing::error!("Loom failed: {e}");
        std::process::exit(1);
    }
}

fn run(settings: &AppSettings) -> Result<(), AppError> {
    register_node_types();

    let renderer =
        create_renderer(&settings.renderer).ok_or_else(|| AppError::UnknownRenderer(settings.renderer.clone()))?;
    let drained = add_drained_listener(|| tracing::debug!("Traversal drained"));

    let graph = Graph::with_config(settings.engine.clone());
    let pipeline = pipeline::build(&graph)?;
    let view = SceneView::new(&graph, pipeline.output);

    let report = render(&view, renderer.as_ref(), &settings.traversal, &Canceller::new())?;
    tracing::info!(
        "Rendered {} locations: {} objects, {} placeholders, {} errors",
        report.locations,
        report.objects,
        report.placeholders,
        report.errors
    );

    let light = ScenePath::parse("/world/light");
    let before = view.full_transform(&light)?;
    {
        let _scope = graph.merging_undo_scope("Nudge box", "nudge");
        for step in 1..=3 {
            graph.set_value(graph.plug(pipeline.shape, "translate")?, V3f::new(step as f32, 0.0, 0.0))?;
        }
    }
    tracing::info!(
        "Light moved from {:?} to {:?}",
        before.translation(),
        view.full_transform(&light)?.translation()
    );

    graph.undo()?;
    tracing::info!("Undo restored light to {:?}", view.full_transform(&light)?.translation());

    let history = graph.history_stats();
    let cache = graph.cache().stats();
    tracing::info!(
        "History: {} undo, {} redo; cache: {} hits, {} misses, {} entries",
        history.undo_count,
        history.redo_count,
        cache.hits,
        cache.misses,
        cache.entries
    );

    remove_drained_listener(drained);
    Ok(())
}
