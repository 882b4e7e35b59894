//!
//! Small helpers shared by the configuration loader and the controller.
//!
//! - [`replace_handlebars_with_env`] - Template substitution for environment variables
//! - [`next_anonymous_name`] - Unique names for synthesized groups and actions
//!

use {
    regex::{Captures, Regex},
    std::{
        env,
        sync::{
            LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
            atomic::{AtomicU64, Ordering},
        },
    },
};

/// Matches `{{ VAR_NAME }}` with optional whitespace around the variable name.
static HANDLEBAR_REGEXP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Z0-9_]+)\s*\}\}").unwrap());

/// Prefix of every synthesized group or action name.
pub const ANONYMOUS_PREFIX: &str = "anonymous-middleware-group-";

static ANONYMOUS_SEED: AtomicU64 = AtomicU64::new(0);

///
/// Replaces `{{ VAR_NAME }}` references with the value of the matching
/// environment variable. Unknown variables are replaced with an empty string
/// and reported with a warning.
///
/// # Examples
///
/// ```
/// use axum_scopes::replace_handlebars_with_env;
///
/// unsafe { std::env::set_var("SCOPES_DOC_PORT", "8080"); }
/// let out = replace_handlebars_with_env("bind_port = {{ SCOPES_DOC_PORT }}");
/// assert_eq!(out, "bind_port = 8080");
/// ```
pub fn replace_handlebars_with_env(input: &str) -> String {
    HANDLEBAR_REGEXP
        .replace_all(input, |caps: &Captures| {
            let var_name = &caps[1];
            env::var(var_name).unwrap_or_else(|_| {
                tracing::warn!(
                    variable = %var_name,
                    "Environment variable not found, substituting with empty string"
                );
                String::new()
            })
        })
        .to_string()
}

/// Returns a name that no earlier call in this process has returned.
///
/// Used for the groups given to inline middleware and for the actions
/// synthesized by `direct`. Uniqueness holds for the lifetime of the process
/// only.
pub fn next_anonymous_name() -> String {
    let seed = ANONYMOUS_SEED.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{ANONYMOUS_PREFIX}{seed}")
}

/// Returns true if `name` was produced by [`next_anonymous_name`].
pub fn is_anonymous_name(name: &str) -> bool {
    name.strip_prefix(ANONYMOUS_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

// Registries are only written during setup; a panic while one was held
// leaves data that is still structurally valid, so poisoning is ignored.
pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_replace_handlebars_with_env_no_variables() {
        let input = "This is a plain string with no variables";
        assert_eq!(replace_handlebars_with_env(input), input);
    }

    #[test]
    fn test_replace_handlebars_with_env_whitespace() {
        unsafe {
            env::set_var("SCOPES_SPACED_VAR", "value");
        }

        let input = "{{SCOPES_SPACED_VAR}} {{ SCOPES_SPACED_VAR }} {{  SCOPES_SPACED_VAR  }}";
        assert_eq!(replace_handlebars_with_env(input), "value value value");

        unsafe {
            env::remove_var("SCOPES_SPACED_VAR");
        }
    }

    #[test]
    fn test_replace_handlebars_with_env_missing_variable() {
        unsafe {
            env::remove_var("SCOPES_NONEXISTENT_VAR");
        }
        let output = replace_handlebars_with_env("Value: {{ SCOPES_NONEXISTENT_VAR }}");
        assert_eq!(output, "Value: ");
    }

    #[test]
    fn test_anonymous_names_are_unique() {
        let names: HashSet<String> = (0..1000).map(|_| next_anonymous_name()).collect();
        assert_eq!(names.len(), 1000);
        assert!(names.iter().all(|n| is_anonymous_name(n)));
    }

    #[test]
    fn test_is_anonymous_name() {
        assert!(is_anonymous_name("anonymous-middleware-group-42"));
        assert!(!is_anonymous_name("anonymous-middleware-group-"));
        assert!(!is_anonymous_name("anonymous-middleware-group-x1"));
        assert!(!is_anonymous_name("auth"));
    }
}
