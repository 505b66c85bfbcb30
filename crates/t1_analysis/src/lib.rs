#![allow(dead_code)]

pub mod atype;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod graph;
pub mod locals;
pub mod pretty_print;
pub mod resolve;
pub mod specialize;
pub mod stack;
pub mod struct_store;
pub mod type_set;

use crate::error::Error;
use crate::graph::Graph;
use crate::specialize::SpecializedTable;
use t1_common::config::AnalysisOptions;
use t1_common::progress_ui;
use t1_common::util::progress_logger::{ProgressLogger, ProgressSession};
use t1_frontend::Program;

/// Runs the analysis from every entry point of the program.
pub fn analyze<'a>(program: &'a Program, options: &AnalysisOptions) -> Result<Graph<'a>, Error> {
    let mut graph = Graph::new(program, options.recursion_limit);
    for name in options.resolve_entry_points(&program.entry_points) {
        graph.add_root(&name)?;
        graph.run(progress_ui::bar(
            options.progress,
            format!("analyze: {}", name),
        ))?;
    }
    Ok(graph)
}

/// Builds the specialized function table of an analyzed program.
pub fn specialize(graph: &Graph, options: &AnalysisOptions) -> Result<SpecializedTable, Error> {
    let mut table = SpecializedTable::new();
    let mut session =
        progress_ui::bar(options.progress, "specialize").start_session(Some(graph.roots.len()));
    for root in &graph.roots {
        session.note(&root.name);
        table.add_root(graph, root)?;
        session.update(1);
    }
    session.finish();
    Ok(table)
}
