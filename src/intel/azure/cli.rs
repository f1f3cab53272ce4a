//! Azure CLI command execution.

use crate::error::{Error, Result};
use colored::Colorize;
use regex::Regex;
use std::process::Command;
use std::sync::OnceLock;

/// Larger responses mean a page size or query mistake.
const MAX_OUTPUT_BYTES: usize = 5_000_000;

/// Splits command strings while preserving quoted substrings.
static COMMAND_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_command_regex() -> &'static Regex {
    COMMAND_REGEX.get_or_init(|| {
        Regex::new(r#"'([^']*)'\s*|\"([^\"]*)\"\s*|([^'\s]*)\s*"#).expect("Invalid Regex")
    })
}

/// Runs `cmd` and returns its stdout.
///
/// The command string is split on spaces, with quoted substrings kept whole.
pub fn run(cmd: &str) -> Result<String> {
    log::debug!("run({cmd})", cmd = cmd.on_blue());

    let cmds: Vec<&str> = split_and_strip(cmd)
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    log::trace!("split cmds={:?}", cmds);
    let Some((program, args)) = cmds.split_first() else {
        return Err(Error::Vendor("empty command".to_string()));
    };

    let output = Command::new(program).args(args).output().map_err(|e| {
        log::error!("Command execution failed: {}", e);
        Error::Vendor(format!("Failed to execute {program}: {e}"))
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        log::trace!(
            "code={code:?}, status={status}\n┎######\nstderr=\n{stderr}\n┖######",
            code = output.status.code(),
            status = output.status,
            stderr = stderr.red()
        );
        log::warn!(
            "{failed} to run {program}",
            failed = "failed".on_red(),
            program = program.on_blue()
        );
        return Err(Error::Vendor(format!("ERROR running {program}: {stderr}")));
    }

    log::debug!("Success output.stdout.len(): {}", output.stdout.len());
    if output.stdout.len() > MAX_OUTPUT_BYTES {
        return Err(Error::Vendor(format!(
            "Response too large: {} bytes from {program}",
            output.stdout.len()
        )));
    }

    String::from_utf8(output.stdout).map_err(|e| Error::Vendor(format!("Invalid UTF-8: {e}")))
}

/// Split a command string on spaces, preserving quoted substrings without their quotes.
fn split_and_strip(input: &str) -> Vec<&str> {
    get_command_regex()
        .captures_iter(input)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3)))
        .map(|m| m.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_kql_query_whole() {
        let input = "az graph query --first 100 -q 'resources | where type =~ \"x\"' --output json";
        assert_eq!(
            split_and_strip(input),
            vec![
                "az",
                "graph",
                "query",
                "--first",
                "100",
                "-q",
                "resources | where type =~ \"x\"",
                "--output",
                "json",
            ]
        );
    }

    #[test]
    fn test_split_and_strip_empty_quotes() {
        let input = "Empty '' Single Quotes";
        assert_eq!(split_and_strip(input), vec!["Empty", "", "Single", "Quotes"]);
    }

    #[test]
    fn test_quoted_url() {
        let input = "curl \"https://mysite.com?\\$filter=name eq 'john'\"";
        assert_eq!(
            split_and_strip(input),
            vec!["curl", "https://mysite.com?\\$filter=name eq 'john'"]
        );
    }

    #[test]
    fn test_run_empty_command() {
        assert!(run("   ").is_err());
    }
}
