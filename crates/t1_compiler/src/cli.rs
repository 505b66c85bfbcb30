use clap::builder::styling;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::ffi::OsString;
use std::path::PathBuf;
use t1_common::config::{AnalysisOptions, DEFAULT_RECURSION_LIMIT};
use t1_common::progress_ui::ProgressMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Type analysis only.
    Check,
    /// Type analysis followed by call specialization.
    Specialize,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mode: Mode,
    pub src_path: PathBuf,
    pub options: AnalysisOptions,
    pub dump_trees: bool,
    pub dump_functions: bool,
}

fn common_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("src-path")
                .help("Specify the JSON program description to analyze.")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .index(1),
        )
        .arg(
            Arg::new("entry")
                .long("entry")
                .action(ArgAction::Append)
                .help(
                    "Analyze from this zero-argument function. May be given several times. \
                    Overrides the entry points listed by the program, which default to \
                    'def::main'.",
                ),
        )
        .arg(
            Arg::new("recursion-limit")
                .long("recursion-limit")
                .value_parser(value_parser!(usize))
                .default_value(DEFAULT_RECURSION_LIMIT.to_string())
                .help(
                    "Number of pending invocations of a function allowed above a new call to it \
                    before the recursion is considered unbounded.",
                ),
        )
        .arg(
            Arg::new("progress")
                .long("progress")
                .action(ArgAction::SetTrue)
                .help("Display progress bars on stderr."),
        )
        .arg(
            Arg::new("dump-trees")
                .long("dump-trees")
                .action(ArgAction::SetTrue)
                .help("Print the analyzed call tree with the stack and locals of every node."),
        )
}

pub fn command() -> Command {
    let styles = styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Cyan.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default());

    Command::new("t1c")
        .version(std::env!("CARGO_PKG_VERSION"))
        .about(std::env!("CARGO_PKG_DESCRIPTION"))
        .styles(styles)
        .next_line_help(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(common_args(
            Command::new("check").about("Runs the type analysis on a program"),
        ))
        .subcommand(
            common_args(
                Command::new("specialize")
                    .about("Runs the type analysis, then specializes every reachable call"),
            )
            .arg(
                Arg::new("dump-functions")
                    .long("dump-functions")
                    .action(ArgAction::SetTrue)
                    .help("Print the specialized functions with their frame layouts."),
            ),
        )
}

impl Config {
    pub fn from_args() -> Self {
        Self::from_matches(&command().get_matches())
    }

    pub fn try_from_arg_list<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        let (mode, matches) = match matches.subcommand() {
            Some(("specialize", sub)) => (Mode::Specialize, sub),
            Some(("check", sub)) => (Mode::Check, sub),
            _ => unreachable!("a subcommand is required"),
        };

        let src_path = matches
            .get_one::<PathBuf>("src-path")
            .expect("src-path is required")
            .clone();

        let entry_points = match matches.get_many::<String>("entry") {
            Some(names) => names.cloned().collect(),
            None => Vec::new(),
        };

        let progress = if matches.get_flag("progress") {
            ProgressMode::Visible
        } else {
            ProgressMode::Hidden
        };

        let dump_functions = mode == Mode::Specialize && matches.get_flag("dump-functions");

        Config {
            mode,
            src_path,
            options: AnalysisOptions {
                entry_points,
                recursion_limit: *matches.get_one::<usize>("recursion-limit").unwrap(),
                progress,
            },
            dump_trees: matches.get_flag("dump-trees"),
            dump_functions,
        }
    }
}
