//! Typed lookups over process environment variables with default fallback

use std::env;

/// Read an integer variable.
///
/// Falls back to `default` when the variable is unset, not a decimal
/// integer, or not strictly positive.
pub fn get_env_int(key: &str, default: i64) -> i64 {
    match env::var(key).ok().and_then(|v| v.parse::<i64>().ok()) {
        Some(value) if value > 0 => value,
        _ => default,
    }
}

/// Read a string variable, falling back to `default` when unset or empty.
pub fn get_env_string(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

/// Read a boolean variable.
///
/// Any non-empty value other than a case-insensitive `"true"` is `false`;
/// `default` only applies when the variable is unset or empty.
pub fn get_env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value.eq_ignore_ascii_case("true"),
        _ => default,
    }
}

#[cfg(test)]
static SERIAL_TEST: parking_lot::ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());

/// Sets environment variables for the duration of the closure and restores
/// the previous values afterwards, even if the closure panics.
#[cfg(test)]
pub(crate) fn with_env_vars<F>(kvs: &[(&str, Option<&str>)], closure: F)
where
    F: FnOnce() + std::panic::UnwindSafe,
{
    let _guard = SERIAL_TEST.lock();

    let old_kvs: Vec<(String, Option<String>)> = kvs
        .iter()
        .map(|(k, _)| (k.to_string(), env::var(k).ok()))
        .collect();

    for (k, v) in kvs {
        match v {
            Some(v) => env::set_var(k, v),
            None => env::remove_var(k),
        }
    }

    let outcome = std::panic::catch_unwind(closure);

    for (k, old) in old_kvs {
        match old {
            Some(v) => env::set_var(&k, v),
            None => env::remove_var(&k),
        }
    }

    if let Err(err) = outcome {
        std::panic::resume_unwind(err);
    }
}
