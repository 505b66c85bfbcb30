use crate::progress_ui::ProgressMode;

pub const DEFAULT_ENTRY_POINT: &str = "def::main";

/// Number of times a function may already appear among the ancestors of a new function-entry node
/// before the analysis gives up on a possibly unbounded recursion.
pub const DEFAULT_RECURSION_LIMIT: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Zero-argument functions the analysis starts from. When empty, the program's own entry
    /// points are used, and failing that `DEFAULT_ENTRY_POINT`.
    pub entry_points: Vec<String>,
    pub recursion_limit: usize,
    pub progress: ProgressMode,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            entry_points: Vec::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            progress: ProgressMode::Hidden,
        }
    }
}

impl AnalysisOptions {
    /// Picks the entry points for a run: explicit options win over the program's list.
    pub fn resolve_entry_points(&self, declared: &[String]) -> Vec<String> {
        if !self.entry_points.is_empty() {
            self.entry_points.clone()
        } else if !declared.is_empty() {
            declared.to_vec()
        } else {
            vec![DEFAULT_ENTRY_POINT.to_owned()]
        }
    }
}
