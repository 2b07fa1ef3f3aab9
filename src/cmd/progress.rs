//! Spinners for long-running Graph calls

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Finish a spinner with a green check
pub fn finish_spinner_success(spinner: &ProgressBar, message: &str) {
    finish_with(spinner, "{prefix:.green} {msg}", "✓", message);
}

/// Finish a spinner with a red cross
pub fn finish_spinner_error(spinner: &ProgressBar, message: &str) {
    finish_with(spinner, "{prefix:.red} {msg}", "✗", message);
}

fn finish_with(spinner: &ProgressBar, template: &str, prefix: &'static str, message: &str) {
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_prefix(prefix);
    spinner.finish_with_message(message.to_string());
}

/// Runs `work` behind a spinner and finishes it according to the result
pub async fn with_spinner<T, E, F>(message: &str, done: &str, work: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let spinner = create_spinner(message);
    let result = work.await;
    match &result {
        Ok(_) => finish_spinner_success(&spinner, done),
        Err(e) => finish_spinner_error(&spinner, &format!("{} failed: {}", message.trim_end_matches("..."), e)),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_spinner() {
        let spinner = create_spinner("Testing...");
        assert!(!spinner.is_finished());
        spinner.finish();
        assert!(spinner.is_finished());
    }

    #[test]
    fn test_finish_helpers() {
        let spinner = create_spinner("Working...");
        finish_spinner_success(&spinner, "Done");
        assert!(spinner.is_finished());

        let spinner = create_spinner("Working...");
        finish_spinner_error(&spinner, "Failed");
        assert!(spinner.is_finished());
    }

    #[tokio::test]
    async fn test_with_spinner_passes_result_through() {
        let ok: Result<u32, String> = with_spinner("Loading...", "Loaded", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u32, String> =
            with_spinner("Loading...", "Loaded", async { Err("boom".to_string()) }).await;
        assert!(err.is_err());
    }
}
