//! Environment variable overrides.

use super::ConfigError;
use std::collections::HashMap;

/// Where environment overrides are read from.
///
/// Production reads the process environment; tests pass a map so they never
/// have to mutate global state.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl<S: std::hash::BuildHasher> EnvSource for HashMap<&str, &str, S> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).map(|v| (*v).to_string())
    }
}

impl<S: std::hash::BuildHasher> EnvSource for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Replace `target` when `key` is set
pub(super) fn override_string(source: &dyn EnvSource, key: &str, target: &mut String) {
    if let Some(value) = source.get(key) {
        *target = value;
    }
}

/// Replace `target` with the parsed value when `key` is set.
///
/// Booleans also accept `1/0`, `yes/no` and `on/off`.
pub(super) fn override_parsed<T: ParseLenient>(
    source: &dyn EnvSource,
    key: &'static str,
    target: &mut T,
) -> Result<(), ConfigError> {
    let Some(value) = source.get(key) else {
        return Ok(());
    };
    *target = T::parse_lenient(value.trim()).ok_or(ConfigError::InvalidEnv { key, value })?;
    Ok(())
}

pub(super) trait ParseLenient: Sized {
    fn parse_lenient(value: &str) -> Option<Self>;
}

impl ParseLenient for bool {
    fn parse_lenient(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

impl ParseLenient for u16 {
    fn parse_lenient(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}

impl ParseLenient for u64 {
    fn parse_lenient(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}
