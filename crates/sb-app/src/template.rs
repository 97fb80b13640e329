//! `{placeholder}` command templates and command-line splitting.

use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};

/// Template used when a profile carries no command of its own.
pub const DEFAULT_TEMPLATE: &str =
    r#"{python} "{script}" --grid {grid} --steps {steps}{seedOpt} --out "{outDir}""#;

/// Placeholder values, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placeholders {
    values: BTreeMap<String, String>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Grid and step values under both their short and long names.
    pub fn with_run_params(self, grid: &str, steps: &str) -> Self {
        self.with("grid", grid)
            .with("gridSize", grid)
            .with("steps", steps)
            .with("timeSteps", steps)
    }
}

/// `" --seed <n>"` when a seed is given, else empty.
pub fn seed_opt(seed: Option<i64>) -> String {
    seed.map(|s| format!(" --seed {}", s)).unwrap_or_default()
}

/// Replace every `{key}` whose key is known; unknown keys stay as written.
pub fn resolve_template(template: &str, vars: &Placeholders) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if close > 0 => {
                let key = &after[..close];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Placeholder keys used by `template`, lowercased, in order of appearance.
pub fn template_keys(template: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if close > 0 => {
                keys.push(after[..close].to_ascii_lowercase());
                rest = &after[close + 1..];
            }
            _ => rest = after,
        }
    }
    keys
}

pub fn requires_key(template: &str, key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    template_keys(template).iter().any(|k| *k == key)
}

/// Split a resolved command line into program and arguments.
///
/// Whitespace separates tokens; double quotes group text (including
/// whitespace) and are removed. Backslashes are literal so Windows paths
/// survive unchanged.
pub fn split_command_line(line: &str) -> AppResult<(String, Vec<String>)> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_quotes {
        return Err(AppError::InvalidInput(format!(
            "unbalanced quotes in command: {}",
            line
        )));
    }
    if in_token {
        tokens.push(current);
    }

    let mut iter = tokens.into_iter();
    match iter.next() {
        Some(program) if !program.is_empty() => Ok((program, iter.collect())),
        _ => Err(AppError::Config("resolved command is empty".to_string())),
    }
}
