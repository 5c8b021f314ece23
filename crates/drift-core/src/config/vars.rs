//! Environment variable interpolation for config files.
//!
//! Supported forms:
//! - `$VAR` or `${VAR}` - substitute, error if unset
//! - `${VAR:-default}` - default when VAR is unset or empty
//! - `${VAR-default}` - default only when VAR is unset
//! - `$$` - literal `$`
//!
//! Credentials such as the upstream access token are usually injected this
//! way rather than written into the file.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)
            (?:(?P<op>:?-)(?P<default>[^}]*))?
        \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Every problem found; all are collected so the operator sees them at once.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate variables from the process environment.
pub fn interpolate(input: &str) -> InterpolationResult {
    interpolate_with(input, |name| std::env::var(name).ok())
}

/// Interpolate variables using an arbitrary lookup function.
pub fn interpolate_with<F>(input: &str, lookup: F) -> InterpolationResult
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| match resolve(caps, &lookup) {
            Ok(value) => value,
            Err(message) => {
                errors.push(message);
                caps[0].to_string()
            }
        })
        .into_owned();

    InterpolationResult { text, errors }
}

fn resolve<F>(caps: &Captures, lookup: &F) -> Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
        // Only the `$$` escape has no name group.
        return Ok("$".to_string());
    };
    let name = name.as_str();
    let default = caps.name("default").map(|m| m.as_str());
    let empty_means_unset = caps.name("op").is_some_and(|op| op.as_str() == ":-");

    match lookup(name) {
        Some(value) if value.contains('\n') || value.contains('\r') => Err(format!(
            "environment variable '{name}' contains newlines, which is not allowed"
        )),
        Some(value) if value.is_empty() && empty_means_unset => {
            Ok(default.unwrap_or_default().to_string())
        }
        Some(value) => Ok(value),
        None => default
            .map(str::to_string)
            .ok_or_else(|| format!("environment variable '{name}' is not set")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_bare_and_braced_substitution() {
        let result = interpolate_with(
            "token: $GSC_TOKEN, user: ${GSC_USER}",
            env(&[("GSC_TOKEN", "abc"), ("GSC_USER", "all")]),
        );
        assert!(result.is_ok());
        assert_eq!(result.text, "token: abc, user: all");
    }

    #[test]
    fn test_missing_variable_is_reported() {
        let result = interpolate_with("token: ${GSC_TOKEN}", env(&[]));
        assert!(!result.is_ok());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("GSC_TOKEN"));
        assert_eq!(result.text, "token: ${GSC_TOKEN}");
    }

    #[test]
    fn test_all_missing_variables_are_collected() {
        let result = interpolate_with("$A $B ${C}", env(&[]));
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_colon_default_applies_to_empty() {
        let result = interpolate_with("${LEVEL:-info}", env(&[("LEVEL", "")]));
        assert_eq!(result.text, "info");
    }

    #[test]
    fn test_plain_default_keeps_empty() {
        let result = interpolate_with("[${LEVEL-info}]", env(&[("LEVEL", "")]));
        assert_eq!(result.text, "[]");

        let result = interpolate_with("[${LEVEL-info}]", env(&[]));
        assert_eq!(result.text, "[info]");
    }

    #[test]
    fn test_newline_values_rejected() {
        let result = interpolate_with("${TOKEN}", env(&[("TOKEN", "a\nb")]));
        assert!(!result.is_ok());
        assert!(result.errors[0].contains("newlines"));
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate_with("price: $$100", env(&[]));
        assert!(result.is_ok());
        assert_eq!(result.text, "price: $100");
    }
}
