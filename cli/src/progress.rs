//! Progress reporting utilities

use indicatif::{ProgressBar, ProgressStyle};
use keyscope_core::pipeline::{ComparisonStage, Side};
use std::sync::Mutex;
use std::time::Duration;

/// Spinner per comparison stage, driven by the core's progress callback
#[derive(Debug)]
pub struct ProgressReporter {
    current: Mutex<Option<(ComparisonStage, ProgressBar)>>,
    show_progress: bool,
}

impl ProgressReporter {
    pub fn new(show_progress: bool) -> Self {
        Self {
            current: Mutex::new(None),
            show_progress,
        }
    }

    /// Report rows processed for `stage`, finishing the previous stage's spinner
    pub fn update(&self, stage: ComparisonStage, rows: u64) {
        if !self.show_progress {
            return;
        }
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        if let Some((active, pb)) = current.as_ref() {
            if *active == stage {
                pb.set_message(stage_message(stage, rows));
                return;
            }
        }
        if let Some((_, pb)) = current.take() {
            pb.finish();
        }
        *current = Some((stage, create_spinner(&stage_message(stage, rows))));
    }

    pub fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some((_, pb)) = current.take() {
                pb.finish();
            }
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        // Ensure all progress bars are cleaned up silently
        if let Ok(mut current) = self.current.lock() {
            if let Some((_, pb)) = current.take() {
                pb.finish_and_clear();
            }
        }
    }
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::A => "A",
        Side::B => "B",
    }
}

fn stage_message(stage: ComparisonStage, rows: u64) -> String {
    match stage {
        ComparisonStage::Extracting(side) => {
            format!("Extracting keys from {}: {rows} rows", side_label(side))
        }
        ComparisonStage::Exporting(side) => {
            format!("Exporting records from {}: {rows} rows written", side_label(side))
        }
    }
}

/// Create a spinner progress bar
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.green} {msg}")
            .expect("Invalid progress template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_messages() {
        assert_eq!(
            stage_message(ComparisonStage::Extracting(Side::B), 42),
            "Extracting keys from B: 42 rows"
        );
        assert!(stage_message(ComparisonStage::Exporting(Side::A), 0).contains("from A"));
    }

    #[test]
    fn test_hidden_reporter_ignores_updates() {
        let reporter = ProgressReporter::new(false);
        reporter.update(ComparisonStage::Extracting(Side::A), 10);
        assert!(reporter.current.lock().unwrap().is_none());
    }
}
