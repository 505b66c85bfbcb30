#![allow(dead_code)]

#[cfg(test)]
mod test;

pub mod cli;

use std::io;
use t1_analysis::pretty_print;
use t1_common::report_error::Reportable;
use t1_frontend::load_program;

#[derive(Debug)]
enum ErrorKind {
    FrontendError(t1_frontend::error::Error),
    AnalysisError(t1_analysis::error::Error),
    WriteFailed(io::Error),
}

// Kept apart from 'ErrorKind' so that the error types of the other crates stay private.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error { kind }
    }
}

impl Reportable for Error {
    fn report(&self, dest: &mut impl io::Write) -> io::Result<()> {
        match &self.kind {
            ErrorKind::FrontendError(err) => err.report(dest),
            ErrorKind::AnalysisError(err) => err.report(dest),
            ErrorKind::WriteFailed(err) => writeln!(dest, "Could not write output: {}", err),
        }
    }

    fn exit_status(&self) -> i32 {
        1
    }
}

/// Figures reported after a successful run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub entry_points: usize,
    pub instances: usize,
    pub nodes: usize,
    pub constants: usize,
    pub allocation_sites: usize,
    /// Number of specialized functions, when specialization ran.
    pub variants: Option<usize>,
}

pub fn run(config: &cli::Config, out: &mut dyn io::Write) -> Result<Stats, Error> {
    let program = load_program(&config.src_path).map_err(ErrorKind::FrontendError)?;
    let graph =
        t1_analysis::analyze(&program, &config.options).map_err(ErrorKind::AnalysisError)?;
    if config.dump_trees {
        pretty_print::write_tree(out, &graph).map_err(ErrorKind::WriteFailed)?;
    }

    let mut stats = Stats {
        entry_points: graph.roots.len(),
        instances: graph.instances.len(),
        nodes: graph.nodes.len(),
        constants: graph.constants.values().count(),
        allocation_sites: graph.constants.allocations().count(),
        variants: None,
    };

    if config.mode == cli::Mode::Specialize {
        let table = t1_analysis::specialize(&graph, &config.options)
            .map_err(ErrorKind::AnalysisError)?;
        if config.dump_functions {
            pretty_print::write_table(out, &program, &table).map_err(ErrorKind::WriteFailed)?;
        }
        stats.variants = Some(table.len());
    }

    write_summary(out, &stats).map_err(ErrorKind::WriteFailed)?;
    Ok(stats)
}

fn write_summary(out: &mut dyn io::Write, stats: &Stats) -> io::Result<()> {
    writeln!(
        out,
        "analyzed {} entry point(s): {} invocation(s), {} node(s), {} constant(s), {} allocation \
         site(s)",
        stats.entry_points,
        stats.instances,
        stats.nodes,
        stats.constants,
        stats.allocation_sites
    )?;
    if let Some(variants) = stats.variants {
        writeln!(out, "specialized {} function(s)", variants)?;
    }
    Ok(())
}

pub fn handle_config(config: cli::Config) -> Result<(), Error> {
    run(&config, &mut io::stdout().lock()).map(|_| ())
}
