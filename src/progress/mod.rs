use crate::format::preview;
use indicatif::{ProgressBar, ProgressStyle};
use mindcare::app::batch::BatchEvent;
use std::time::Duration;

pub struct Progress {
    spinner: Option<ProgressBar>,
}

impl Progress {
    pub fn new() -> Self {
        Self { spinner: None }
    }

    pub fn spinner(&mut self, message: &str) {
        self.stop_and_clear();

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    pub fn stop_and_clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.stop_and_clear();
    }
}

/// Per-item progress for a batch run.
pub struct Bar {
    progress: ProgressBar,
    failed: usize,
}

impl Bar {
    pub fn new(total: usize) -> Self {
        let progress = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{pos}/{len} [{bar:40.cyan/blue}] {elapsed_precise} {msg}")
        {
            progress.set_style(style.progress_chars("=> "));
        }

        Self { progress, failed: 0 }
    }

    pub fn update(&mut self, event: BatchEvent<'_>) {
        match event {
            BatchEvent::ItemStarted { question, .. } => {
                self.progress.set_message(preview(question, 48));
            }
            BatchEvent::ItemFinished { failed, .. } => {
                if failed {
                    self.failed += 1;
                }
                self.progress.inc(1);
            }
        }
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn finish(&self) {
        self.progress.finish_and_clear();
    }
}
