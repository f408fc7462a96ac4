//! Bridge configuration.
//!
//! Defaults can be overridden through the environment:
//!
//! - `MONO_RS_CLASS_CACHE`, `MONO_RS_METHOD_CACHE`, `MONO_RS_THUNK_CACHE`:
//!   capacities of the lookup caches. `inf` or `unbounded` disables eviction.
//! - `MONO_RS_STRING_CACHE`: capacity of the managed string intern cache;
//!   `0` turns interning off.
//! - `MONO_RS_THROW_ON_EXCEPTION`: whether managed exceptions raised by
//!   invocations surface as errors (`"1"` or `"true"`, default on).
//! - `MONO_RS_DETACH`: whether attach guards detach the thread they attached
//!   (default on).
use mono_utils::Capacity;
use std::env;

const DEFAULT_CLASS_CACHE: usize = 1024;
const DEFAULT_METHOD_CACHE: usize = 4096;
const DEFAULT_THUNK_CACHE: usize = 256;
const DEFAULT_STRING_CACHE: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub class_cache_capacity: Capacity,
    pub method_cache_capacity: Capacity,
    pub thunk_cache_capacity: Capacity,
    /// `None` disables string interning.
    pub string_intern_capacity: Option<Capacity>,
    pub throw_on_exception: bool,
    pub detach_on_exit: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            class_cache_capacity: Capacity::Bounded(DEFAULT_CLASS_CACHE),
            method_cache_capacity: Capacity::Bounded(DEFAULT_METHOD_CACHE),
            thunk_cache_capacity: Capacity::Bounded(DEFAULT_THUNK_CACHE),
            string_intern_capacity: Some(Capacity::Bounded(DEFAULT_STRING_CACHE)),
            throw_on_exception: true,
            detach_on_exit: true,
        }
    }
}

fn parse_capacity(raw: &str) -> Option<Capacity> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("inf") || raw.eq_ignore_ascii_case("unbounded") {
        return Some(Capacity::Unbounded);
    }
    raw.parse().ok().map(Capacity::Bounded)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup. Unparsable values
    /// keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let capacity = |key: &str, default: Capacity| {
            lookup(key)
                .and_then(|v| parse_capacity(&v))
                .unwrap_or(default)
        };

        config.class_cache_capacity = capacity("MONO_RS_CLASS_CACHE", config.class_cache_capacity);
        config.method_cache_capacity =
            capacity("MONO_RS_METHOD_CACHE", config.method_cache_capacity);
        config.thunk_cache_capacity = capacity("MONO_RS_THUNK_CACHE", config.thunk_cache_capacity);

        if let Some(strings) = lookup("MONO_RS_STRING_CACHE").and_then(|v| parse_capacity(&v)) {
            config.string_intern_capacity = match strings {
                Capacity::Bounded(0) => None,
                other => Some(other),
            };
        }

        if let Some(flag) = lookup("MONO_RS_THROW_ON_EXCEPTION").and_then(|v| parse_flag(&v)) {
            config.throw_on_exception = flag;
        }
        if let Some(flag) = lookup("MONO_RS_DETACH").and_then(|v| parse_flag(&v)) {
            config.detach_on_exit = flag;
        }
        config
    }
}
