//! PID to process name resolution
//!
//! Names are looked up lazily and cached for the rest of the session. A PID
//! that gets recycled keeps its first name; profiling sessions are short
//! enough that this is accepted.

use crate::types::kernel::constants::UNKNOWN_PROCESS_NAME;
use anyhow::{Context, Result};
use std::collections::HashMap;

/// Live source of process names
pub trait ProcessTable {
    fn process_name(&self, pid: u32) -> Result<String>;
}

/// Reads names from `/proc/<pid>/comm`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsTable;

impl ProcessTable for ProcfsTable {
    fn process_name(&self, pid: u32) -> Result<String> {
        let path = format!("/proc/{pid}/comm");
        let data = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
        Ok(data.trim().to_string())
    }
}

/// Caching PID name resolver
pub struct PidNameResolver<T = ProcfsTable> {
    table: T,
    cache: HashMap<u32, String>,
}

impl PidNameResolver<ProcfsTable> {
    /// Create a resolver backed by procfs
    pub fn new() -> Self {
        Self::with_table(ProcfsTable)
    }
}

impl Default for PidNameResolver<ProcfsTable> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ProcessTable> PidNameResolver<T> {
    pub fn with_table(table: T) -> Self {
        Self {
            table,
            cache: HashMap::new(),
        }
    }

    /// Resolve a PID to its process name
    ///
    /// Failed lookups return `"unknown"` and are not cached, so the next
    /// occurrence of the same PID tries again.
    pub fn resolve(&mut self, pid: u32) -> String {
        if let Some(name) = self.cache.get(&pid) {
            return name.clone();
        }

        match self.table.process_name(pid) {
            Ok(name) => {
                self.cache.insert(pid, name.clone());
                name
            }
            Err(e) => {
                log::trace!("name lookup for pid {} failed: {:#}", pid, e);
                UNKNOWN_PROCESS_NAME.to_string()
            }
        }
    }

    /// Number of cached entries
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Table that answers from a fixed map and counts lookups
    #[derive(Default)]
    struct FakeTable {
        names: RefCell<HashMap<u32, String>>,
        lookups: Cell<u32>,
    }

    impl ProcessTable for FakeTable {
        fn process_name(&self, pid: u32) -> Result<String> {
            self.lookups.set(self.lookups.get() + 1);
            self.names
                .borrow()
                .get(&pid)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such process: {pid}"))
        }
    }

    #[test]
    fn test_resolve_caches_hits() {
        let table = FakeTable::default();
        table.names.borrow_mut().insert(42, "nginx".to_string());
        let mut resolver = PidNameResolver::with_table(table);

        assert_eq!(resolver.resolve(42), "nginx");
        assert_eq!(resolver.resolve(42), "nginx");
        assert_eq!(resolver.table.lookups.get(), 1);
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn test_resolve_failure_is_not_cached() {
        let mut resolver = PidNameResolver::with_table(FakeTable::default());

        assert_eq!(resolver.resolve(7), UNKNOWN_PROCESS_NAME);
        assert_eq!(resolver.cached(), 0);

        // Process shows up later
        resolver.table.names.borrow_mut().insert(7, "redis".to_string());
        assert_eq!(resolver.resolve(7), "redis");
        assert_eq!(resolver.table.lookups.get(), 2);
    }

    #[test]
    fn test_cached_name_survives_process_change() {
        let table = FakeTable::default();
        table.names.borrow_mut().insert(9, "first".to_string());
        let mut resolver = PidNameResolver::with_table(table);

        assert_eq!(resolver.resolve(9), "first");
        resolver.table.names.borrow_mut().insert(9, "second".to_string());
        assert_eq!(resolver.resolve(9), "first");
    }

    #[test]
    fn test_procfs_reads_own_process() {
        let pid = std::process::id();
        let name = ProcfsTable.process_name(pid).unwrap();

        assert!(!name.is_empty());
        assert!(!name.ends_with('\n'));
    }
}
