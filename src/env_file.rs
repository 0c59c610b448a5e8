//! `.env` file support: `KEY=value` lines, optional `export`, quoting and `#` comments.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    /// Given on the command line rather than found in the working directory.
    pub explicit: bool,
}

/// Resolve the env file from CLI args (`--env-file <path>` or `--env-file=<path>`),
/// falling back to `./.env`, and load it. Variables already set win.
pub fn configure_env_from_args<I>(args: I) -> Result<Option<LoadedEnvFile>, String>
where
    I: IntoIterator<Item = std::ffi::OsString>,
{
    let explicit = env_file_from_args(args)?;
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

    for (key, value) in read_env_file(&path)? {
        if std::env::var_os(&key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(Some(LoadedEnvFile { path, explicit }))
}

fn env_file_from_args<I>(args: I) -> Result<Option<PathBuf>, String>
where
    I: IntoIterator<Item = std::ffi::OsString>,
{
    let mut args = args.into_iter();
    let mut env_file: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        let value = match arg.to_str() {
            Some("--env-file") => args
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| "`--env-file` requires a path argument".to_string())?,
            Some(s) if s.starts_with("--env-file=") => match &s["--env-file=".len()..] {
                "" => return Err("`--env-file` requires a path argument".to_string()),
                path => PathBuf::from(path),
            },
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        };
        if env_file.replace(value).is_some() {
            return Err("`--env-file` provided more than once".to_string());
        }
    }
    Ok(env_file)
}

/// Parse every assignment in `path`, in file order.
pub fn read_env_file(path: &Path) -> Result<Vec<(String, String)>, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let mut pairs = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if let Some(pair) = parse_line(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))? {
            pairs.push(pair);
        }
    }
    Ok(pairs)
}

pub fn parse_line(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let assignment = trimmed.strip_prefix("export ").map_or(trimmed, str::trim_start);
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.contains(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }
    Ok(Some((key.to_string(), parse_value(raw.trim())?)))
}

fn parse_value(raw: &str) -> Result<String, String> {
    let mut chars = raw.chars();
    let quote = match chars.next() {
        None => return Ok(String::new()),
        Some(q @ ('"' | '\'')) => q,
        Some(_) => {
            let unquoted = raw.split('#').next().unwrap_or_default();
            return Ok(unquoted.trim_end().to_string());
        }
    };

    let mut value = String::new();
    let mut escaped = false;
    for ch in chars.by_ref() {
        if escaped {
            value.push(match ch {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
            escaped = false;
        } else if ch == '\\' && quote == '"' {
            escaped = true;
        } else if ch == quote {
            let rest = chars.as_str().trim();
            return if rest.is_empty() || rest.starts_with('#') {
                Ok(value)
            } else {
                Err("unexpected characters after closing quote".to_string())
            };
        } else {
            value.push(ch);
        }
    }
    if escaped {
        Err("unterminated escape sequence in double-quoted value".to_string())
    } else {
        Err("unterminated quoted value".to_string())
    }
}
