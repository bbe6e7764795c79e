//! Terminal output for the CLI
//!
//! Every command writes through an [`OutputFormatter`] so that `--json`
//! switches the whole run to machine-readable output on stdout.

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Sink for everything a command shows the user
///
/// `success`, `info` and `print_json` go to stdout; `warn` and `error` go
/// to stderr.
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Marked, indented lines for a terminal; structured payloads are dropped
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {message}");
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {message}");
    }
    fn info(&self, message: &str) {
        println!("  {message}");
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// One JSON document per event; free-form `info` lines are dropped
pub struct JsonFormatter;

impl JsonFormatter {
    fn event(level: &str, message: &str) -> serde_json::Value {
        serde_json::json!({ "level": level, "message": message })
    }
}

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", Self::event("success", message));
    }
    fn error(&self, message: &str) {
        eprintln!("{}", Self::event("error", message));
    }
    fn warn(&self, message: &str) {
        eprintln!("{}", Self::event("warning", message));
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("{}", Self::event("error", &e.to_string())),
        }
    }
}

pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(HumanFormatter)
    }
}

/// Plural suffix for a count ("" for one, "s" otherwise)
pub fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Formats a duration in milliseconds for display ("850ms", "2.4s", "3m 05s")
pub fn format_duration(ms: u64) -> String {
    match ms {
        0..=999 => format!("{ms}ms"),
        1_000..=59_999 => format!("{:.1}s", ms as f64 / 1000.0),
        _ => {
            let secs = ms / 1000;
            format!("{}m {:02}s", secs / 60, secs % 60)
        }
    }
}
