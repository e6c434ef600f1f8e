//! Rebase configuration

use std::time::Duration;

use crate::catalog::SystemTables;
use crate::diff::DEFAULT_DIFF_BUFFER;

/// Settings for history rewrites.
#[derive(Debug, Clone)]
pub struct RebaseConfig {
    /// system tables and their fixed tags
    pub system_tables: SystemTables,
    /// in-flight diffs per table replay
    pub diff_buffer_size: usize,
    /// how long one differ poll waits
    pub diff_poll_timeout: Duration,
    /// leave a backup ref at each branch's old head before retargeting it
    pub backup_refs: bool,
}

impl Default for RebaseConfig {
    fn default() -> Self {
        Self {
            system_tables: SystemTables::default(),
            diff_buffer_size: DEFAULT_DIFF_BUFFER,
            diff_poll_timeout: Duration::from_secs(1),
            backup_refs: true,
        }
    }
}

impl RebaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system_tables(mut self, system_tables: SystemTables) -> Self {
        self.system_tables = system_tables;
        self
    }

    pub fn diff_buffer_size(mut self, size: usize) -> Self {
        self.diff_buffer_size = size;
        self
    }

    pub fn diff_poll_timeout(mut self, timeout: Duration) -> Self {
        self.diff_poll_timeout = timeout;
        self
    }

    pub fn backup_refs(mut self, enabled: bool) -> Self {
        self.backup_refs = enabled;
        self
    }
}
