//! Per-unit progress notifications from the runner

/// Receives a call after each unit's change and ledger write are committed.
/// Failures are reported through the runner's error, not here.
pub trait MigrationObserver: Send + Sync {
    fn applied(&self, _name: &str, _batch: i64) {}

    fn rolled_back(&self, _name: &str, _batch: i64) {}
}
