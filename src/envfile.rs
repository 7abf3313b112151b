//! `.env` loading. Values already present in the process environment win.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    pub explicit: bool,
}

/// Load `explicit` if given (it must exist), otherwise `./.env` when present.
pub fn load(explicit: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    let (path, explicit) = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            (path, true)
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let path = cwd.join(".env");
            if !path.is_file() {
                return Ok(None);
            }
            (path, false)
        }
    };

    apply_file(&path)?;
    Ok(Some(LoadedEnvFile { path, explicit }))
}

fn apply_file(path: &Path) -> Result<(), String> {
    let content = fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    for (key, value) in parse(&content).map_err(|e| format!("{}:{}", path.display(), e))? {
        if std::env::var_os(&key).is_none() {
            // Mutating the process environment is unsafe on some targets; this
            // runs before logging or any other thread starts.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

/// Parse `KEY=value` lines. Errors are prefixed with the 1-based line number.
pub fn parse(content: &str) -> Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if let Some(pair) = parse_line(line).map_err(|e| format!("{}: {}", index + 1, e))? {
            out.push(pair);
        }
    }
    Ok(out)
}

fn parse_line(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let assignment = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);

    let (key, raw_value) = assignment
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.chars().any(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    let raw_value = raw_value.trim();
    let value = match raw_value.chars().next() {
        Some(q @ ('"' | '\'')) => unquote(&raw_value[1..], q)?,
        _ => raw_value.split('#').next().unwrap_or_default().trim_end().to_string(),
    };
    Ok(Some((key.to_string(), value)))
}

/// Read up to the closing `quote`. Escapes apply inside double quotes only.
fn unquote(input: &str, quote: char) -> Result<String, String> {
    let mut result = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        if ch == quote {
            let rest = chars.as_str().trim();
            return if rest.is_empty() || rest.starts_with('#') {
                Ok(result)
            } else {
                Err(format!("unexpected characters after closing {} quote", quote))
            };
        }
        if ch == '\\' && quote == '"' {
            let escaped = chars
                .next()
                .ok_or_else(|| "unterminated escape sequence in double-quoted value".to_string())?;
            result.push(match escaped {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
            continue;
        }
        result.push(ch);
    }

    Err(format!("unterminated {} quoted value", quote))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_quoted_and_exported_values() {
        let content = "\
# comment
DATABASE_URL=postgres://localhost/sensors # trailing
export RUN_MIGRATIONS = false
GREETING=\"hello\\tworld\" # ok
RAW='no \\n escapes'
EMPTY=
";
        let pairs = parse(content).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("DATABASE_URL".to_string(), "postgres://localhost/sensors".to_string()),
                ("RUN_MIGRATIONS".to_string(), "false".to_string()),
                ("GREETING".to_string(), "hello\tworld".to_string()),
                ("RAW".to_string(), "no \\n escapes".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn reports_line_numbers() {
        let err = parse("A=1\nB\n").unwrap_err();
        assert!(err.starts_with("2:"), "{err}");
        assert!(parse("A=\"open").is_err());
        assert!(parse("A='x' y").is_err());
        assert!(parse("BAD KEY=1").is_err());
    }
}
