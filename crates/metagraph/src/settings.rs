//! Generation settings taken from the process environment.
//!
//! | variable | effect |
//! |---|---|
//! | `METAGRAPH_GRAD_FOR_SCALAR` | initial grad-for-scalar switch (`1`/`true`/`yes`/`on` or `0`/`false`/`no`/`off`) |
//! | `METAGRAPH_CACHE_CAPACITY` | signatures a [`GraphSession`](crate::GraphSession) keeps cached |
//!
//! The environment is read once, on first use. Values that do not parse are
//! logged and the default is kept.

use std::num::NonZeroUsize;

use log::warn;
use once_cell::sync::Lazy;

pub const GRAD_FOR_SCALAR_VAR: &str = "METAGRAPH_GRAD_FOR_SCALAR";
pub const CACHE_CAPACITY_VAR: &str = "METAGRAPH_CACHE_CAPACITY";

const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub grad_for_scalar: bool,
    pub cache_capacity: NonZeroUsize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            grad_for_scalar: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Settings resolved through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        if let Some(raw) = lookup(GRAD_FOR_SCALAR_VAR) {
            match parse_switch(&raw) {
                Some(enabled) => settings.grad_for_scalar = enabled,
                None => warn!("ignoring {GRAD_FOR_SCALAR_VAR}={raw:?}: expected a boolean"),
            }
        }
        if let Some(raw) = lookup(CACHE_CAPACITY_VAR) {
            match raw.trim().parse::<NonZeroUsize>() {
                Ok(capacity) => settings.cache_capacity = capacity,
                Err(err) => warn!("ignoring {CACHE_CAPACITY_VAR}={raw:?}: {err}"),
            }
        }
        settings
    }
}

/// Process-wide settings.
pub fn settings() -> &'static Settings {
    &SETTINGS
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Some(false),
        "1" | "true" | "yes" | "on" => Some(true),
        _ => None,
    }
}
