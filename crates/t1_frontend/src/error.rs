use std::io;
use std::path::{Path, PathBuf};
use t1_common::lines;
use t1_common::report_error::{locate_path, Locate, Reportable};

#[derive(thiserror::Error, Debug)]
pub enum ErrorKind {
    #[error("could not read {}: {1}", .0.display())]
    ReadFailed(PathBuf, io::Error),
    #[error("malformed program description: {0}")]
    ParseFailed(serde_json::Error),

    #[error("cannot add element {element} to type {ty}: type is not open yet")]
    TypeNotOpen { element: String, ty: String },
    #[error("cannot add element {element} to type {ty}: duplicate type element name")]
    DuplicateElement { element: String, ty: String },
    #[error("cannot add element {element} to type {ty}: type is full")]
    TypeFull { element: String, ty: String },
    #[error("cannot add element {element} to type {ty}: type is closed")]
    TypeClosed { element: String, ty: String },
    #[error("cannot reopen type {0}")]
    Reopen(String),
    #[error("cannot mark as full type {0} which is not open")]
    MarkFullNotOpen(String),
    #[error("cannot close undefined type {0}")]
    CloseUndefined(String),
    #[error("embedding cycle on type {0}")]
    EmbeddingCycle(String),
    #[error("type {sup} does not accept {sub} as sub-type")]
    SubTypeRefused { sup: String, sub: String },
    #[error("sub-typing cycle {sup} -> {sub}")]
    SubTypingCycle { sup: String, sub: String },
    #[error("cannot embed type {0}")]
    NotEmbeddable(String),
    #[error("nonpositive array size: {0}")]
    NonPositiveArraySize(i64),
    #[error("type {name} already exists and is not an array of {element}")]
    ArrayNameClash { name: String, element: String },

    #[error("duplicate registration for function {name} with types: {types}")]
    DuplicateRegistration { name: String, types: String },
    #[error("duplicate immediate registration for function {0}")]
    DuplicateImmediate(String),

    #[error("local name collision on: {0}")]
    LocalCollision(String),
    #[error("invalid local array length: {0}")]
    InvalidLocalArrayLength(i64),
    #[error("control-flow stack underflow")]
    ControlFlowUnderflow,
    #[error("not an origin")]
    NotAnOrigin,
    #[error("not a destination")]
    NotADestination,
    #[error("cannot build {0}: control-flow stack is not empty")]
    ControlFlowNotEmpty(String),
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),
}

impl ErrorKind {
    fn title(&self) -> &'static str {
        use ErrorKind::*;
        match self {
            ReadFailed(_, err) if err.kind() == io::ErrorKind::NotFound => "File Not Found",
            ReadFailed(_, _) => "Could Not Read File",
            ParseFailed(_) => "Malformed Program",
            TypeNotOpen { .. }
            | DuplicateElement { .. }
            | TypeFull { .. }
            | TypeClosed { .. }
            | Reopen(_)
            | MarkFullNotOpen(_)
            | CloseUndefined(_)
            | ArrayNameClash { .. } => "Invalid Type Definition",
            EmbeddingCycle(_) => "Embedding Cycle",
            SubTypeRefused { .. } | SubTypingCycle { .. } => "Invalid Sub-Typing",
            NotEmbeddable(_) | NonPositiveArraySize(_) => "Invalid Type Element",
            DuplicateRegistration { .. } | DuplicateImmediate(_) => "Duplicate Registration",
            LocalCollision(_) | InvalidLocalArrayLength(_) => "Invalid Local Variable",
            ControlFlowUnderflow
            | NotAnOrigin
            | NotADestination
            | ControlFlowNotEmpty(_) => "Unbalanced Control Flow",
            InvalidLiteral(_) => "Invalid Literal",
        }
    }
}

#[derive(Debug)]
pub struct Error {
    error: Locate<ErrorKind>,
    /// The type or function whose definition was being processed.
    definition: Option<String>,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            error: kind.into(),
            definition: None,
        }
    }
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.error.error
    }

    pub fn in_definition(self, name: &str) -> Self {
        Error {
            definition: Some(self.definition.unwrap_or_else(|| name.to_owned())),
            ..self
        }
    }

    pub fn in_file(self, path: &Path) -> Self {
        Error {
            error: locate_path(path)(self.error),
            ..self
        }
    }
}

impl Reportable for Error {
    fn report(&self, dest: &mut impl io::Write) -> io::Result<()> {
        let site = self.definition.as_deref();
        self.error.report_with(dest, site, |kind| match kind {
            ErrorKind::ReadFailed(path, err) if err.kind() == io::ErrorKind::NotFound => (
                kind.title(),
                format!(
                    lines!["I couldn't find a program description at this path:", "", "    {}"],
                    path.display()
                ),
            ),
            _ => (kind.title(), kind.to_string()),
        })
    }

    fn exit_status(&self) -> i32 {
        1
    }
}
