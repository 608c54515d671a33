//! Logging with colored module prefixes.
//!
//! ```ignore
//! log!("assemble"; "merged {} parts", count);
//! ```

use colored::{ColoredString, Colorize};
use std::io::{Write, stdout};

/// Log a message with a colored module prefix.
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Write `[module] message` to stdout.
pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module, &module.to_ascii_lowercase());
    let mut stdout = stdout().lock();
    writeln!(stdout, "{prefix} {message}").ok();
}

fn colorize_prefix(module: &str, module_lower: &str) -> ColoredString {
    let prefix = format!("[{module}]");
    match module_lower {
        "assemble" => prefix.bright_blue().bold(),
        "inspect" => prefix.bright_green().bold(),
        "error" => prefix.bright_red().bold(),
        _ => prefix.bright_yellow().bold(),
    }
}
