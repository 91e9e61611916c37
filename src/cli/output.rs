//! CLI output formatting utilities.

use crate::agent::{BatchReport, ToolCallRecord};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print one tool call from an agent run.
    pub fn tool_call(record: &ToolCallRecord) {
        let marker = if record.is_error {
            style("x").red()
        } else {
            style("*").cyan()
        };
        println!("  {} {}", marker, style(truncate(&record.to_string(), 100)).bold());
        println!("    {}", style(truncate(&record.result.replace('\n', " "), 120)).dim());
    }

    /// Print a batch report.
    pub fn batch_report(report: &BatchReport) {
        for (i, outcome) in report.results.iter().enumerate() {
            let marker = if outcome.success {
                style("ok").green().bold()
            } else {
                style("failed").red().bold()
            };
            println!("\n{} [{}] {}", style(format!("#{}", i + 1)).dim(), marker, style(&outcome.query).bold());

            match (&outcome.response, &outcome.error) {
                (Some(response), _) => println!("{}", response),
                (None, Some(error)) => println!("{}", style(error).red()),
                (None, None) => {}
            }
        }

        println!();
        Output::kv("Total", &report.total.to_string());
        Output::kv("Successful", &report.successful.to_string());
        Output::kv("Failed", &report.failed.to_string());
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Shorten `s` to `max_chars` characters with an ellipsis.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer line of text", 10), "a longe...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }
}
