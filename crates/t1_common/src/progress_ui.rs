use std::{borrow::Cow, time::Duration};

use crate::util::progress_logger::{ProgressLogger, ProgressSession};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProgressMode {
    Hidden,
    Visible,
}

impl Default for ProgressMode {
    fn default() -> Self {
        ProgressMode::Hidden
    }
}

#[derive(Clone, Debug)]
pub struct ProgressBarLogger {
    name: String,
    mode: ProgressMode,
}

pub fn bar(mode: ProgressMode, name: impl ToString) -> ProgressBarLogger {
    ProgressBarLogger {
        name: name.to_string(),
        mode,
    }
}

#[derive(Clone, Debug)]
pub struct ProgressBarSession {
    name: String,
    bar: indicatif::ProgressBar,
}

impl ProgressLogger for ProgressBarLogger {
    type Session = ProgressBarSession;

    fn start_session(self, count: Option<usize>) -> Self::Session {
        let bar = indicatif::ProgressBar::with_draw_target(
            count.map(|count| count as u64),
            match self.mode {
                ProgressMode::Hidden => indicatif::ProgressDrawTarget::hidden(),
                ProgressMode::Visible => indicatif::ProgressDrawTarget::stderr(),
            },
        );
        const TICK_STRINGS: &[&str] = &["⠉", "⠘", "⠰", "⠤", "⠆", "⠃", "✔"];
        // Templates are static; on a parse failure the default style is kept.
        let style = if count.is_some() {
            indicatif::ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{elapsed_precise}] [{bar:.cyan/blue}] {pos}/{len} {msg}")
                .map(|style| style.progress_chars("=> "))
        } else {
            indicatif::ProgressStyle::default_spinner()
                .template("{spinner:.cyan} [{elapsed_precise}] {pos} nodes {msg}")
        };
        if let Ok(style) = style {
            bar.set_style(style.tick_strings(TICK_STRINGS));
        }
        bar.set_message(Cow::Owned(self.name.clone()));
        if self.mode == ProgressMode::Visible {
            bar.enable_steady_tick(Duration::from_millis(100));
        }
        ProgressBarSession {
            name: self.name,
            bar,
        }
    }
}

impl ProgressSession for ProgressBarSession {
    fn update(&mut self, inc: usize) {
        self.bar.inc(inc as u64);
    }

    fn note(&mut self, detail: &str) {
        self.bar
            .set_message(Cow::Owned(format!("{} ({})", self.name, detail)));
    }

    fn finish(self) {
        self.bar.set_message(Cow::Owned(self.name));
        self.bar.finish();
    }
}
