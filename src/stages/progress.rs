use std::{fmt::Write, time::Instant};
use indicatif::{ProgressBar, ProgressState, ProgressStyle};

/// Console progress for frame inference, drawn to stderr.
pub struct Progress {
    progress_bar: ProgressBar,
    start_time: Instant,
    completed: usize,
}

impl Progress {
    const TEMPLATE: &'static str =
        "{prefix} [{elapsed_precise}] [{eta}] [{wide_bar:.white/green}] {pos}/{len} {percent} {msg}";

    pub fn new(total: usize, label: &str) -> Self {
        let progress_bar = ProgressBar::new(total as u64);
        let progress_style = ProgressStyle::default_bar()
            .template(Self::TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░-")
            .with_key("eta", |state: &ProgressState, w: &mut dyn Write| {
                let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
            })
            .with_key("percent", |state: &ProgressState, w: &mut dyn Write| {
                let _ = write!(w, "({:.0}%)", state.fraction() * 100.0);
            });
        progress_bar.set_style(progress_style);
        progress_bar.set_prefix(label.to_string());

        Self {
            progress_bar,
            start_time: Instant::now(),
            completed: 0,
        }
    }

    pub fn advance(&mut self) {
        self.completed += 1;
        self.progress_bar.set_position(self.completed as u64);

        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.progress_bar.set_message(format!("[fps: {:.1}]", self.completed as f64 / elapsed));
        }
    }

    pub fn finish(self) {
        self.progress_bar.finish();
        tracing::info!(
            frames = self.completed,
            seconds = self.start_time.elapsed().as_secs_f64(),
            "frame inference finished"
        );
    }
}
