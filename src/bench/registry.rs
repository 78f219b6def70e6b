//! Named benchmark registry

use std::collections::BTreeMap;

use crate::bench::Strategy;
use crate::engine::Options;
use crate::{KvBenchError, Result};

const KIB: usize = 1024;
const MIB: usize = 1024 * 1024;

/// Workers used by the `concurrent` tests
pub const CONCURRENT_WORKERS: usize = 8;

/// Maps test names to strategies
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tests: BTreeMap<String, Strategy>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The reference set of write benchmarks
    pub fn standard() -> Self {
        let notx = || Options::default().no_large_batch_transaction();
        Self::new()
            .with("nobatch", Strategy::sequential(Options::default()))
            .with("nobatch-nosync", Strategy::sequential(Options::default().no_sync()))
            .with("batch-100kb", Strategy::batched(100 * KIB, Options::default()))
            .with("batch-1mb", Strategy::batched(MIB, Options::default()))
            .with("batch-5mb", Strategy::batched(5 * MIB, Options::default()))
            .with(
                "batch-100kb-nosync",
                Strategy::batched(100 * KIB, Options::default().no_sync()),
            )
            .with("batch-notx-100kb", Strategy::batched(100 * KIB, notx()))
            .with("batch-notx-1mb", Strategy::batched(MIB, notx()))
            .with("batch-notx-5mb", Strategy::batched(5 * MIB, notx()))
            .with(
                "concurrent",
                Strategy::concurrent(CONCURRENT_WORKERS, true, Options::default()),
            )
            .with(
                "concurrent-nomerge",
                Strategy::concurrent(CONCURRENT_WORKERS, false, Options::default()),
            )
    }

    /// Add or replace a named strategy.
    pub fn register(&mut self, name: impl Into<String>, strategy: Strategy) -> Option<Strategy> {
        self.tests.insert(name.into(), strategy)
    }

    /// Builder form of [`Registry::register`]
    pub fn with(mut self, name: impl Into<String>, strategy: Strategy) -> Self {
        self.register(name, strategy);
        self
    }

    pub fn get(&self, name: &str) -> Result<&Strategy> {
        self.tests.get(name).ok_or_else(|| {
            KvBenchError::ConfigError(format!(
                "unknown test {:?} (available: {})",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tests.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.tests.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Resolve every name up front so that a typo fails before anything runs.
    pub fn select(&self, names: &[String]) -> Result<Vec<(String, Strategy)>> {
        if names.is_empty() {
            return Err(KvBenchError::ConfigError("no tests selected".to_string()));
        }
        names
            .iter()
            .map(|name| Ok((name.clone(), self.get(name)?.clone())))
            .collect()
    }

    /// Split a comma separated `--test` value, dropping empty entries.
    pub fn parse_selection(input: &str) -> Vec<String> {
        input
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_names() {
        let registry = Registry::standard();
        assert_eq!(
            registry.names(),
            vec![
                "batch-100kb",
                "batch-100kb-nosync",
                "batch-1mb",
                "batch-5mb",
                "batch-notx-100kb",
                "batch-notx-1mb",
                "batch-notx-5mb",
                "concurrent",
                "concurrent-nomerge",
                "nobatch",
                "nobatch-nosync",
            ]
        );
        assert_eq!(registry.len(), 11);
    }

    #[test]
    fn test_standard_parameters() {
        let registry = Registry::standard();

        match registry.get("batch-notx-100kb").unwrap() {
            Strategy::Batched(b) => {
                assert_eq!(b.batch_size, 100 * KIB);
                assert!(!b.options.large_batch_transaction);
            }
            other => panic!("unexpected strategy {:?}", other),
        }
        match registry.get("concurrent-nomerge").unwrap() {
            Strategy::Concurrent(c) => {
                assert_eq!(c.workers, 8);
                assert!(!c.write_merge);
            }
            other => panic!("unexpected strategy {:?}", other),
        }
        assert!(!registry.get("nobatch-nosync").unwrap().options().sync);
        assert!(registry.get("nobatch").unwrap().options().sync);
    }

    #[test]
    fn test_unknown_name_is_config_error() {
        let registry = Registry::standard();
        let err = registry.get("batch-2mb").unwrap_err();
        assert!(matches!(err, KvBenchError::ConfigError(_)));
        assert!(err.to_string().contains("nobatch"));
    }

    #[test]
    fn test_select_is_all_or_nothing() {
        let registry = Registry::standard();
        let picked = registry
            .select(&Registry::parse_selection("nobatch, concurrent"))
            .unwrap();
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[1].0, "concurrent");

        assert!(registry
            .select(&Registry::parse_selection("nobatch,nope"))
            .is_err());
        assert!(registry.select(&[]).is_err());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());
        assert!(registry
            .register("x", Strategy::sequential(Options::default()))
            .is_none());
        let previous = registry.register("x", Strategy::batched(10, Options::default()));
        assert!(matches!(previous, Some(Strategy::Sequential(_))));
        assert!(registry.contains("x"));
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(
            Registry::parse_selection("a,,b , c"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(Registry::parse_selection("").is_empty());
    }
}
