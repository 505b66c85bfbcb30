use std::io;
use t1_common::report_error::{report_error, Report, Reportable};

#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("forbidden type merging between {0} and {1}")]
    ForbiddenMerge(String, String),
    #[error("expecting {expected}, but may get:{}", list_lines(.found))]
    UnexpectedType { expected: String, found: Vec<String> },
    #[error("potentially reading uninitialized local variable")]
    UninitializedLocal,
    #[error("internal error: mismatch on number of locals ({0} / {1})")]
    LocalsMismatch(usize, usize),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack merge depth mismatch ({0} / {1})")]
    StackDepthMismatch(usize, usize),
    #[error("non-empty stack upon exit: {0} element(s)")]
    NonEmptyExit(usize),

    #[error("reference to local instance of type {value} may escape through writing in field of type {owner}")]
    EscapeThroughField { value: String, owner: String },
    #[error("reference to local instance of type {value} may escape function {function}")]
    EscapeThroughReturn { value: String, function: String },

    #[error("accessor for type {owner} cannot be used on type {ty}, which does not extend it")]
    NotExtended { owner: String, ty: String },
    #[error("accessor for type {owner} cannot be used on type {ty} because extension is ambiguous")]
    AmbiguousExtension { owner: String, ty: String },
    #[error("std::type does not embed another type")]
    TypeNotEmbedding,

    #[error("instance allocation expects a std::type instance, got {0} instead")]
    NewNotType(String),
    #[error("instance allocation needs a specific type target, but got a generic std::type")]
    NewGenericType,
    #[error("cannot dynamically allocate new std::type instances")]
    NewTypeInstance,
    #[error("cannot allocate instances of locked type {0}")]
    NewLockedType(String),

    #[error("no such function: {0}")]
    NoSuchFunction(String),
    #[error("no matching function for call {name} on: {types}")]
    NoMatchingFunction { name: String, types: String },
    #[error("multiple matching function for call {name} on: {types}{}", list_lines(.candidates))]
    AmbiguousCall {
        name: String,
        types: String,
        candidates: Vec<String>,
    },
    #[error("native function {0} cannot be compiled")]
    NotCompilable(String),
    #[error("possible infinite recursion on function {0}")]
    InfiniteRecursion(String),
    #[error("entry point {0} is not a zero-argument function")]
    NoEntryPoint(String),

    #[error("cannot make dispatcher for call to {callee} from {caller}")]
    NoDispatcher { callee: String, caller: String },
    #[error("length mismatch for local variable array")]
    LocalArrayLengthMismatch,
    #[error("length mismatch for local instance array")]
    LocalInstanceLengthMismatch,
    #[error("local variable storage size mismatch: {0} / {1}")]
    LocalStorageSizeMismatch(String, String),
    #[error("local variable storage type mismatch: {0} / {1}")]
    LocalStorageTypeMismatch(String, String),
}

fn list_lines(items: &[String]) -> String {
    items.iter().map(|item| format!("\n   {}", item)).collect()
}

impl ErrorKind {
    fn title(&self) -> &'static str {
        use ErrorKind::*;
        match self {
            ForbiddenMerge(..) | UnexpectedType { .. } | UninitializedLocal => "Type Error",
            LocalsMismatch(..) | StackUnderflow | StackDepthMismatch(..) | NonEmptyExit(_) => {
                "Stack Error"
            }
            EscapeThroughField { .. } | EscapeThroughReturn { .. } => "Escaping Reference",
            NotExtended { .. } | AmbiguousExtension { .. } | TypeNotEmbedding => {
                "Invalid Accessor Use"
            }
            NewNotType(_) | NewGenericType | NewTypeInstance | NewLockedType(_) => {
                "Invalid Allocation"
            }
            NoSuchFunction(_) | NoMatchingFunction { .. } | AmbiguousCall { .. } => {
                "Unresolved Call"
            }
            NotCompilable(_) | NoEntryPoint(_) => "Cannot Compile",
            InfiniteRecursion(_) => "Infinite Recursion",
            NoDispatcher { .. }
            | LocalArrayLengthMismatch
            | LocalInstanceLengthMismatch
            | LocalStorageSizeMismatch(..)
            | LocalStorageTypeMismatch(..) => "Specialization Failed",
        }
    }
}

/// An analysis failure, with the program point where it was detected when one is known.
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    site: Option<String>,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error { kind, site: None }
    }
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn site(&self) -> Option<&str> {
        self.site.as_deref()
    }

    /// Attaches a site unless a more precise one is already known.
    pub fn at(self, site: impl FnOnce() -> String) -> Self {
        Error {
            site: Some(self.site.unwrap_or_else(site)),
            ..self
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.site {
            Some(site) => write!(f, "{} (in {})", self.kind, site),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl Reportable for Error {
    fn report(&self, dest: &mut impl io::Write) -> io::Result<()> {
        report_error(
            dest,
            Report {
                path: None,
                site: self.site.as_deref(),
                title: self.kind.title(),
                message: Some(&self.kind.to_string()),
            },
        )
    }

    fn exit_status(&self) -> i32 {
        1
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn messages_list_offenders_on_their_own_lines() {
        let err = ErrorKind::UnexpectedType {
            expected: "std::bool".to_owned(),
            found: vec!["std::int".to_owned(), "std::i32".to_owned()],
        };
        assert_eq!(
            err.to_string(),
            "expecting std::bool, but may get:\n   std::int\n   std::i32"
        );

        let err: Error = ErrorKind::NoSuchFunction("def::foo".to_owned()).into();
        let err = err.at(|| "def::main @ 2".to_owned()).at(|| "outer".to_owned());
        assert_eq!(err.site(), Some("def::main @ 2"));
        assert_eq!(err.to_string(), "no such function: def::foo (in def::main @ 2)");
    }
}
