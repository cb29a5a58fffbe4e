//! Ordered execution of versioned migrations.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use tracing::{error, info};

use super::error::MigrationError;
use super::state::{MigrationPhase, MigrationState};
use super::Migration;
use crate::storage::StorageEngine;

/// Versioned migration table: target version to migrations in registration
/// order.
pub type MigrationTable = BTreeMap<u32, Vec<Arc<dyn Migration>>>;

/// Summary of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version recorded before the run.
    pub from: u32,
    /// Version the run upgraded to.
    pub to: u32,
    /// Applied migrations as `(version, name)`, in execution order.
    pub applied: Vec<(u32, String)>,
}

impl MigrationReport {
    /// Number of migrations applied.
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    /// Check if nothing was applied.
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Runs the migrations of one database between two versions.
pub struct MigrationPipeline<'a> {
    database: &'a str,
    migrations: &'a MigrationTable,
}

impl<'a> MigrationPipeline<'a> {
    /// Create a pipeline over a migration table.
    pub fn new(database: &'a str, migrations: &'a MigrationTable) -> Self {
        Self {
            database,
            migrations,
        }
    }

    /// Migrations that upgrade `from` to `to`, in execution order.
    ///
    /// A fresh store (`from == 0`) takes every migration up to `to`,
    /// including those at version 0. Otherwise versions in `(from, to]`.
    pub fn pending(&self, from: u32, to: u32) -> Vec<(u32, &'a Arc<dyn Migration>)> {
        if to < from {
            return Vec::new();
        }
        let lower = if from == 0 {
            Bound::Included(0)
        } else {
            Bound::Excluded(from)
        };

        self.migrations
            .range((lower, Bound::Included(to)))
            .flat_map(|(version, list)| list.iter().map(move |m| (*version, m)))
            .collect()
    }

    /// Run every pending migration from `from` to `to`.
    ///
    /// Each migration completes `on_pre_migrate`, `migrate` and
    /// `on_post_migrate` before the next starts. The stored schema version
    /// advances after every fully-applied version. The first failure aborts
    /// the run; nothing is rolled back.
    pub fn run(
        &self,
        storage: &dyn StorageEngine,
        from: u32,
        to: u32,
    ) -> Result<MigrationReport, MigrationError> {
        if from > to {
            return Err(MigrationError::Downgrade {
                on_disk: from,
                declared: to,
            });
        }

        let mut report = MigrationReport {
            from,
            to,
            applied: Vec::new(),
        };
        let mut state = MigrationState::new();
        let pending = self.pending(from, to);

        for (index, (version, migration)) in pending.iter().enumerate() {
            let name = migration.name().to_string();

            state.begin(*version, name.clone())?;
            migration.on_pre_migrate();

            state.transition(MigrationPhase::Migrating)?;
            if let Err(e) = migration.migrate(storage) {
                state.abort();
                error!(
                    database = %self.database,
                    version = *version,
                    migration = %name,
                    error = %e,
                    "migration failed"
                );
                return Err(MigrationError::Failed {
                    version: *version,
                    name,
                    reason: e.to_string(),
                });
            }

            state.transition(MigrationPhase::PostMigrating)?;
            migration.on_post_migrate();
            state.finish()?;

            info!(
                database = %self.database,
                version = *version,
                migration = %name,
                "applied migration"
            );
            report.applied.push((*version, name));

            let version_done = pending
                .get(index + 1)
                .map(|(next, _)| next != version)
                .unwrap_or(true);
            if version_done && *version > 0 {
                storage.report_schema_version(*version)?;
            }
        }

        Ok(report)
    }
}
