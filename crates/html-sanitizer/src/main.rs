use std::process::ExitCode;
use std::time::Instant;

/// Sanitizes a file with the default policy and prints the result.
/// `--time` reports elapsed wall time on stderr instead of printing.
fn main() -> ExitCode {
    let mut timing_only = false;
    let mut path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--time" => timing_only = true,
            _ => path = Some(arg),
        }
    }

    let Some(path) = path else {
        eprintln!("usage: html-sanitizer [--time] <file.html>");
        return ExitCode::FAILURE;
    };

    let html = match std::fs::read_to_string(&path) {
        Ok(html) => html,
        Err(error) => {
            eprintln!("{path}: {error}");
            return ExitCode::FAILURE;
        }
    };

    let started = Instant::now();
    let sanitized = html_sanitizer::sanitize(&html);
    let elapsed = started.elapsed();

    if timing_only {
        eprintln!(
            "{path}: {} bytes in, {} bytes out, {elapsed:?}",
            html.len(),
            sanitized.len()
        );
    } else {
        println!("{sanitized}");
    }

    ExitCode::SUCCESS
}
