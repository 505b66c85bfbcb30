use crate::cli::{Config, Mode};
use crate::{Error, ErrorKind, Stats};
use std::io;
use std::path::Path;
use t1_common::config::AnalysisOptions;

pub fn run_sample(path: impl AsRef<Path>, entry_points: &[&str]) -> Result<Stats, Error> {
    let config = Config {
        mode: Mode::Specialize,
        src_path: path.as_ref().to_owned(),
        options: AnalysisOptions {
            entry_points: entry_points.iter().map(|&name| name.to_owned()).collect(),
            ..Default::default()
        },
        dump_trees: true,
        dump_functions: true,
    };
    crate::run(&config, &mut io::sink())
}

pub fn analysis_error(path: impl AsRef<Path>, entry_points: &[&str]) -> t1_analysis::error::Error {
    match run_sample(path, entry_points) {
        Err(Error {
            kind: ErrorKind::AnalysisError(err),
        }) => err,
        other => panic!("expected an analysis error, got {:?}", other),
    }
}

macro_rules! sample {
    (
        $name:ident $path:expr ;
        $( entry = $entry:expr ; )*
        succeeds ;
        $( $stat:ident = $value:expr ; )*
    ) => {
        #[test]
        fn $name() {
            let stats = crate::test::run_sample::run_sample($path, &[$( $entry ),*])
                .unwrap_or_else(|err| panic!("analysis failed: {:?}", err));
            $(
                assert_eq!(stats.$stat, $value, "unexpected {}", stringify!($stat));
            )*
        }
    };

    (
        $name:ident $path:expr ;
        $( entry = $entry:expr ; )*
        error = ( $pattern:pat $( if $guard:expr )? ) ;
        $( site = $site:expr ; )?
    ) => {
        #[test]
        fn $name() {
            let err = crate::test::run_sample::analysis_error($path, &[$( $entry ),*]);
            assert!(matches!(err.kind(), $pattern $( if $guard )?), "unexpected error: {}", err);
            $(
                assert_eq!(err.site(), Some($site));
            )?
        }
    };
}
