//! Derives a human-readable server name when the launch command doesn't
//! already carry one.
//!
//! Many MCP tool-servers are invoked through a generic wrapper script (often
//! literally named `cli.py` or `cli`), so the command/args alone don't tell
//! the user which server they're talking to. When that happens we scan the
//! target script for a `SERVER_NAME = "..."` assignment; failing that we
//! titleize the script's filename stem.

use std::path::Path;

const GENERIC_NAMES: &[&str] = &["cli", "cli.py", "main", "main.py", "__main__.py", "server"];

/// Derive a server name from an explicit override, the launch command, or
/// (as a last resort) the target script's contents.
pub async fn derive_server_name(command: &str, args: &[String]) -> String {
    let script_path = args
        .iter()
        .find(|a| !a.starts_with('-'))
        .map(String::as_str)
        .unwrap_or(command);

    let stem = Path::new(script_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(script_path);

    if !is_generic(stem) && !is_generic(command) {
        return titleize(stem);
    }

    if let Ok(contents) = tokio::fs::read_to_string(script_path).await {
        if let Some(name) = scan_server_name(&contents) {
            return name;
        }
    }

    titleize(stem)
}

/// Whether `name` is a generic placeholder (a bare wrapper-script name, or
/// an MCP server's self-reported name that never got set to anything more
/// specific) rather than an identifier that actually names the server.
pub fn is_generic(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    GENERIC_NAMES.iter().any(|g| *g == lower)
}

/// Look for a `SERVER_NAME = "..."` (or `'...'`) assignment anywhere in the
/// script source.
fn scan_server_name(source: &str) -> Option<String> {
    for line in source.lines() {
        let trimmed = line.trim();
        let rest = trimmed.strip_prefix("SERVER_NAME")?;
        let rest = rest.trim_start();
        let rest = rest.strip_prefix('=')?.trim_start();
        let quote = rest.chars().next()?;
        if quote != '"' && quote != '\'' {
            continue;
        }
        let body = &rest[1..];
        if let Some(end) = body.find(quote) {
            let value = &body[..end];
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn titleize(stem: &str) -> String {
    stem.split(|c: char| c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_double_quoted_assignment() {
        let source = "import os\nSERVER_NAME = \"brave-search\"\n";
        assert_eq!(scan_server_name(source), Some("brave-search".to_string()));
    }

    #[test]
    fn scans_single_quoted_assignment() {
        let source = "SERVER_NAME = 'filesystem'\n";
        assert_eq!(scan_server_name(source), Some("filesystem".to_string()));
    }

    #[test]
    fn ignores_empty_assignment() {
        let source = "SERVER_NAME = \"\"\n";
        assert_eq!(scan_server_name(source), None);
    }

    #[test]
    fn returns_none_when_absent() {
        let source = "def main():\n    pass\n";
        assert_eq!(scan_server_name(source), None);
    }

    #[test]
    fn titleizes_snake_case_stem() {
        assert_eq!(titleize("brave_web_search"), "Brave Web Search");
    }

    #[test]
    fn titleizes_kebab_case_stem() {
        assert_eq!(titleize("file-system"), "File System");
    }

    #[tokio::test]
    async fn falls_back_to_titleized_stem_for_nonexistent_script() {
        let name = derive_server_name("python3", &["weather_server.py".to_string()]).await;
        assert_eq!(name, "Weather Server");
    }

    #[tokio::test]
    async fn uses_titleized_command_when_not_generic_and_no_args() {
        let name = derive_server_name("brave-search-server", &[]).await;
        assert_eq!(name, "Brave Search Server");
    }
}
