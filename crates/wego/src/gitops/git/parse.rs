//! Git output parsing helpers.

use std::process::Output;

/// Formats a git error with both stdout and stderr.
pub fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "Command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

/// Returns true when push output says the remote refused a non-fast-forward
/// update.
pub fn is_push_rejection(stderr: &str) -> bool {
    stderr.contains("[rejected]")
        || stderr.contains("non-fast-forward")
        || stderr.contains("fetch first")
}

/// Returns the `! [rejected] ...` line of push output, or the whole trimmed
/// output when there is none.
pub fn rejection_summary(stderr: &str) -> String {
    stderr
        .lines()
        .find(|l| l.contains("[rejected]"))
        .map(|l| l.trim().trim_start_matches('!').trim().to_string())
        .unwrap_or_else(|| stderr.trim().to_string())
}
