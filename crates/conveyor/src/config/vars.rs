//! Environment variable interpolation for pipeline config files.
//!
//! Recognized forms:
//! - `$NAME` and `${NAME}` expand to the variable, which must be set
//! - `${NAME:-fallback}` uses `fallback` when the variable is unset or empty
//! - `$$` is a literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static VAR_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        | \$\{ (?P<braced>[A-Za-z_][A-Za-z0-9_]*) (?: :- (?P<fallback>[^}]*) )? \}
        | \$ (?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("variable reference pattern is valid")
});

/// Expand variable references in `input`.
///
/// On failure every unresolved reference is reported, not just the first.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    let mut errors = Vec::new();

    let expanded = VAR_REFERENCE.replace_all(input, |caps: &Captures<'_>| {
        let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
            return "$".to_string();
        };
        let name = name.as_str();
        let fallback = caps.name("fallback").map(|m| m.as_str());

        match (env::var(name), fallback) {
            (Ok(value), _) if value.contains(['\n', '\r']) => {
                errors.push(format!("environment variable '{name}' contains a newline"));
                String::new()
            }
            (Ok(value), Some(fallback)) if value.is_empty() => fallback.to_string(),
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.to_string(),
            (Err(_), None) => {
                errors.push(format!("environment variable '{name}' is not set"));
                String::new()
            }
        }
    });

    if errors.is_empty() {
        Ok(expanded.into_owned())
    } else {
        Err(errors)
    }
}
