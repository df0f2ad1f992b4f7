//! Terminal output utilities

use console::style;
use ghost_core::Error;
use ghost_tasks::TaskError;
use indicatif::{ProgressBar, ProgressStyle};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", style("✔").green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", style("✖").red().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a skipped step
pub fn skipped(title: &str, reason: Option<&str>) {
    let suffix = match reason {
        Some(reason) => format!("[skipped] {}", reason),
        None => "[skipped]".to_string(),
    };
    println!(
        "{} {} {}",
        style("↓").yellow().bold(),
        title,
        style(suffix).dim()
    );
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", style(key).dim(), value);
}

/// Create a spinner
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Present a failed command: the step that failed, the structured error
/// message and its remediation, and diagnostic detail when `verbose`
pub fn report_error(err: &anyhow::Error, verbose: bool) {
    let (step, cause) = match err.downcast_ref::<TaskError>().and_then(TaskError::failure) {
        Some(failure) => (Some(failure.title.as_str()), &failure.source),
        None => (None, err),
    };

    let structured = cause.chain().find_map(|e| e.downcast_ref::<Error>());
    let label = structured.map(Error::label).unwrap_or("Error");

    eprintln!();
    if let Some(step) = step {
        eprintln!("{} {}", style("A step failed:").red(), step);
    }
    eprintln!("{} {:#}", style(format!("{}:", label)).red().bold(), cause);

    let Some(structured) = structured else {
        return;
    };
    if let Some(help) = structured.help() {
        eprintln!("{} {}", style("Help:").cyan(), help);
    }
    if verbose || structured.is_application() {
        if let Some(details) = structured.details() {
            eprintln!("\n{}", style(details).dim());
        }
    } else if structured.details().is_some() {
        eprintln!("{}", style("Run again with --verbose for details").dim());
    }
}
