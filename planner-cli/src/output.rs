// Output formatting helpers for CLI commands

/// Print a status message: "  Status message"
pub fn status(action: &str, message: &str) {
    eprintln!("\x1b[1;36m{:>12}\x1b[0m {}", action, message);
}

/// Print a success message with checkmark
pub fn success(message: &str) {
    eprintln!("\x1b[1;32m  \u{2713}\x1b[0m {}", message);
}

/// Print a warning message
pub fn warning(message: &str) {
    eprintln!("\x1b[33m  !\x1b[0m {}", message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("\x1b[1;31merror:\x1b[0m {}", message);
}

/// Print an info message
pub fn info(message: &str) {
    eprintln!("\x1b[36m  i\x1b[0m {}", message);
}

/// Print a dim/muted message
pub fn dim(message: &str) {
    eprintln!("\x1b[2m{}\x1b[0m", message);
}

/// Print a header line
pub fn header(message: &str) {
    eprintln!("\x1b[1m==> {}\x1b[0m", message);
}

/// Print a job header
pub fn job_header(name: &str, executing: usize, total: usize) {
    println!("\x1b[1;34m  Job\x1b[0m '{}' ({}/{} steps)", name, executing, total);
}

/// Print one step line with its verdict
pub fn step(index: usize, name: &str, executes: bool, reason: &str) {
    if executes {
        println!("\x1b[32m    \u{2713}\x1b[0m {:>3}. {}", index, name);
    } else {
        println!(
            "\x1b[2m    \u{2717} {:>3}. {} ({})\x1b[0m",
            index, name, reason
        );
    }
}

/// Print a resolved command under a step (indented)
pub fn step_detail(line: &str) {
    println!("\x1b[2m           | {}\x1b[0m", line);
}
