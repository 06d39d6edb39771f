use std::io::Write;

/// Writes `message` straight to stdout, escaping the output capture of the test harness.
pub fn test_print(message: &str) {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    let _ = handle.write_all(message.as_bytes());
    let _ = handle.flush();
}
