//! Runtime settings for opening and writing crate files.
//!
//! Defaults can be overridden from the environment:
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `USDC_WRITE_NEW_FILES_AS_VERSION` | `0.7.0` | version for newly created files |
//! | `USDC_USE_PREAD` | off | positional reads instead of memory mapping |
//! | `USDC_ENABLE_ZERO_COPY_ARRAYS` | on | alias large arrays into mapped memory |
//! | `USDC_MMAP_PREFETCH_KB` | 0 | will-need hint size around mapped reads |
//!
//! Whatever version is chosen, compressed blocks are zlib streams, so the
//! files are only readable by this crate, not by other USD implementations.

use std::env;
use std::sync::OnceLock;

use tracing::warn;

use crate::format::Version;

/// Env var naming the version used for newly created files.
pub const ENV_WRITE_VERSION: &str = "USDC_WRITE_NEW_FILES_AS_VERSION";
/// Env var selecting the positional-read backend.
pub const ENV_USE_PREAD: &str = "USDC_USE_PREAD";
/// Env var toggling zero-copy arrays.
pub const ENV_ZERO_COPY: &str = "USDC_ENABLE_ZERO_COPY_ARRAYS";
/// Env var for mmap prefetch size in KiB.
pub const ENV_PREFETCH_KB: &str = "USDC_MMAP_PREFETCH_KB";

/// Settings chosen once per open store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrateConfig {
    /// Version written for files that have no prior version.
    pub default_write_version: Version,
    /// Read with positional reads instead of a memory map.
    pub use_pread: bool,
    /// Let large uncompressed arrays alias mapped file memory.
    pub zero_copy_arrays: bool,
    /// When non-zero, issue will-need hints of this many KiB around reads.
    pub mmap_prefetch_kb: usize,
}

impl Default for CrateConfig {
    fn default() -> Self {
        Self {
            default_write_version: Version::DEFAULT_NEW_FILE,
            use_pread: false,
            zero_copy_arrays: true,
            mmap_prefetch_kb: 0,
        }
    }
}

impl CrateConfig {
    /// Process-wide config read from the environment on first use.
    pub fn global() -> &'static CrateConfig {
        static GLOBAL: OnceLock<CrateConfig> = OnceLock::new();
        GLOBAL.get_or_init(Self::from_env)
    }

    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(s) = lookup(ENV_WRITE_VERSION) {
            cfg.default_write_version = parse_write_version(&s);
        }
        if let Some(s) = lookup(ENV_USE_PREAD) {
            cfg.use_pread = parse_flag(&s).unwrap_or(cfg.use_pread);
        }
        if let Some(s) = lookup(ENV_ZERO_COPY) {
            cfg.zero_copy_arrays = parse_flag(&s).unwrap_or(cfg.zero_copy_arrays);
        }
        if let Some(s) = lookup(ENV_PREFETCH_KB) {
            cfg.mmap_prefetch_kb = s.trim().parse().unwrap_or(0);
        }
        cfg
    }

    pub fn with_default_write_version(mut self, version: Version) -> Self {
        self.default_write_version = version;
        self
    }

    pub fn with_pread(mut self, enable: bool) -> Self {
        self.use_pread = enable;
        self
    }

    pub fn with_zero_copy_arrays(mut self, enable: bool) -> Self {
        self.zero_copy_arrays = enable;
        self
    }

    pub fn with_mmap_prefetch_kb(mut self, kb: usize) -> Self {
        self.mmap_prefetch_kb = kb;
        self
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a configured write version. Unparsable or unwritable versions fall
/// back to the default with a warning.
fn parse_write_version(s: &str) -> Version {
    match s.parse::<Version>() {
        Ok(v) if Version::SOFTWARE.can_write(v) => v,
        Ok(v) => {
            warn!(
                "{} is set to {} but this software can only write up to {}; using {}",
                ENV_WRITE_VERSION,
                v,
                Version::SOFTWARE,
                Version::DEFAULT_NEW_FILE
            );
            Version::DEFAULT_NEW_FILE
        }
        Err(_) => {
            warn!(
                "{} is set to '{}' which is not a valid version; using {}",
                ENV_WRITE_VERSION,
                s,
                Version::DEFAULT_NEW_FILE
            );
            Version::DEFAULT_NEW_FILE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = CrateConfig::from_lookup(|_| None);
        assert_eq!(cfg, CrateConfig::default());
        assert_eq!(cfg.default_write_version, Version::new(0, 7, 0));
        assert!(cfg.zero_copy_arrays);
        assert!(!cfg.use_pread);
    }

    #[test]
    fn test_overrides() {
        let cfg = CrateConfig::from_lookup(lookup(&[
            (ENV_WRITE_VERSION, "0.8.0"),
            (ENV_USE_PREAD, "1"),
            (ENV_ZERO_COPY, "false"),
            (ENV_PREFETCH_KB, "64"),
        ]));
        assert_eq!(cfg.default_write_version, Version::new(0, 8, 0));
        assert!(cfg.use_pread);
        assert!(!cfg.zero_copy_arrays);
        assert_eq!(cfg.mmap_prefetch_kb, 64);
    }

    #[test]
    fn test_bad_write_version_falls_back() {
        let cfg = CrateConfig::from_lookup(lookup(&[(ENV_WRITE_VERSION, "0.99.0")]));
        assert_eq!(cfg.default_write_version, Version::DEFAULT_NEW_FILE);
        let cfg = CrateConfig::from_lookup(lookup(&[(ENV_WRITE_VERSION, "garbage")]));
        assert_eq!(cfg.default_write_version, Version::DEFAULT_NEW_FILE);
    }
}
