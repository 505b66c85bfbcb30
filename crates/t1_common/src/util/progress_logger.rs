/// A source of progress sessions. Each analysis phase takes one of these by value and opens a
/// session on it, so phases stay agnostic of how (or whether) progress is displayed.
pub trait ProgressLogger {
    type Session: ProgressSession;

    /// Opens a session. `total_count` is `None` for open-ended work such as a worklist whose size
    /// is not known in advance.
    fn start_session(self, total_count: Option<usize>) -> Self::Session;
}

pub trait ProgressSession {
    fn update(&mut self, progress: usize);

    /// Replaces the detail text shown next to the session, e.g. the function being analyzed.
    fn note(&mut self, detail: &str);

    fn finish(self);
}

#[derive(Clone, Copy, Debug)]
pub struct Hidden;

#[derive(Clone, Copy, Debug, Default)]
pub struct HiddenSession {
    pub ticks: usize,
}

impl ProgressLogger for Hidden {
    type Session = HiddenSession;

    fn start_session(self, _total_count: Option<usize>) -> Self::Session {
        HiddenSession::default()
    }
}

impl ProgressSession for HiddenSession {
    fn update(&mut self, progress: usize) {
        self.ticks += progress;
    }

    fn note(&mut self, _detail: &str) {}

    fn finish(self) {}
}
