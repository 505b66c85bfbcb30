use ansi_term::Color;
use std::io;
use std::path::{Path, PathBuf};
use textwrap::{NoHyphenation, Wrapper};

pub trait Reportable {
    fn report(&self, dest: &mut impl io::Write) -> io::Result<()>;

    fn exit_status(&self) -> i32;
}

#[derive(Clone, Copy, Debug)]
pub struct Report<'a> {
    pub path: Option<&'a Path>,
    /// A program point inside the reported file, already rendered (e.g. `def::main @ 3`).
    pub site: Option<&'a str>,
    pub title: &'a str,
    pub message: Option<&'a str>,
}

const TITLE_LEADING_DASHES: usize = 10;
const TITLE_TOTAL_COLS: usize = 60;
const MESSAGE_WIDTH: usize = 60;

pub fn report_error(dest: &mut impl io::Write, report: Report) -> io::Result<()> {
    let title_style = Color::Blue.bold();
    let path_style = Color::Yellow.normal();
    let site_style = Color::Cyan.normal();

    writeln!(
        dest,
        "\n{}",
        title_style.paint(format!(
            "{leading} {title} {trailing}",
            leading = "-".repeat(TITLE_LEADING_DASHES),
            title = report.title,
            trailing = "-".repeat(
                TITLE_TOTAL_COLS.saturating_sub(2 + report.title.len() + TITLE_LEADING_DASHES)
            ),
        ))
    )?;

    match (report.path, report.site) {
        (Some(path), Some(site)) => {
            writeln!(
                dest,
                "{} {}",
                path_style.paint(path.display().to_string()),
                site_style.paint(format!("in {}", site))
            )?;
        }
        (Some(path), None) => {
            writeln!(dest, "{}", path_style.paint(path.display().to_string()))?;
        }
        (None, Some(site)) => {
            writeln!(dest, "{}", site_style.paint(format!("in {}", site)))?;
        }
        (None, None) => {}
    }

    if let Some(message) = report.message {
        writeln!(dest)?;
        for line in message.lines() {
            let indentation = line.chars().take_while(|&c| c == ' ').count();
            let indent_str = &line[..indentation];

            let wrapped = Wrapper::with_splitter(MESSAGE_WIDTH, NoHyphenation)
                .initial_indent(indent_str)
                .subsequent_indent(indent_str)
                .wrap(&line[indentation..]);

            if wrapped.is_empty() {
                writeln!(dest)?;
            } else {
                for wrapped_line in wrapped {
                    writeln!(dest, "{}", wrapped_line)?;
                }
            }
        }
    }

    writeln!(dest)?;

    Ok(())
}

/// An error tagged with the file it was found in.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Locate<E> {
    pub path: Option<PathBuf>,
    pub error: E,
}

impl<E> From<E> for Locate<E> {
    fn from(error: E) -> Self {
        Locate { path: None, error }
    }
}

// Curried for convenient usage with 'map_err'.
pub fn locate_path<'a, E>(
    path: &'a (impl AsRef<Path> + ?Sized),
) -> impl FnOnce(Locate<E>) -> Locate<E> + 'a {
    move |err| Locate {
        path: Some(err.path.unwrap_or_else(|| path.as_ref().to_owned())),
        ..err
    }
}

impl<E> Locate<E> {
    pub fn report_with<Title, Msg>(
        &self,
        dest: &mut impl io::Write,
        site: Option<&str>,
        reporter: impl FnOnce(&E) -> (Title, Msg),
    ) -> io::Result<()>
    where
        Title: AsRef<str>,
        Msg: AsRef<str>,
    {
        let (title, message) = reporter(&self.error);

        report_error(
            dest,
            Report {
                path: self.path.as_deref(),
                site,
                title: title.as_ref(),
                message: Some(message.as_ref()),
            },
        )
    }
}
