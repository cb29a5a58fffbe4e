//! Migration phase tracking.

use std::fmt;

use super::error::MigrationError;

/// Lifecycle phase of the migration pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// No migration is running.
    Idle,
    /// `on_pre_migrate` is running.
    PreMigrating,
    /// `migrate` is running.
    Migrating,
    /// `on_post_migrate` is running.
    PostMigrating,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::Idle => write!(f, "idle"),
            MigrationPhase::PreMigrating => write!(f, "pre_migrating"),
            MigrationPhase::Migrating => write!(f, "migrating"),
            MigrationPhase::PostMigrating => write!(f, "post_migrating"),
        }
    }
}

impl MigrationPhase {
    /// The phase that follows this one.
    pub fn next(self) -> MigrationPhase {
        match self {
            MigrationPhase::Idle => MigrationPhase::PreMigrating,
            MigrationPhase::PreMigrating => MigrationPhase::Migrating,
            MigrationPhase::Migrating => MigrationPhase::PostMigrating,
            MigrationPhase::PostMigrating => MigrationPhase::Idle,
        }
    }
}

/// Tracks which migration is running and in which phase.
#[derive(Debug, Clone)]
pub struct MigrationState {
    phase: MigrationPhase,
    current: Option<(u32, String)>,
    completed: usize,
}

impl Default for MigrationState {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationState {
    /// Create an idle state.
    pub fn new() -> Self {
        Self {
            phase: MigrationPhase::Idle,
            current: None,
            completed: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    /// Version and name of the running migration.
    pub fn current(&self) -> Option<(u32, &str)> {
        self.current.as_ref().map(|(v, n)| (*v, n.as_str()))
    }

    /// Number of migrations that went through all three phases.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Move to `to`, rejecting anything but the next phase.
    pub fn transition(&mut self, to: MigrationPhase) -> Result<(), MigrationError> {
        if self.phase.next() != to {
            return Err(MigrationError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }

    /// Start a migration: `Idle -> PreMigrating`.
    pub fn begin(&mut self, version: u32, name: impl Into<String>) -> Result<(), MigrationError> {
        self.transition(MigrationPhase::PreMigrating)?;
        self.current = Some((version, name.into()));
        Ok(())
    }

    /// Finish the running migration: `PostMigrating -> Idle`.
    pub fn finish(&mut self) -> Result<(), MigrationError> {
        self.transition(MigrationPhase::Idle)?;
        self.current = None;
        self.completed += 1;
        Ok(())
    }

    /// Drop the running migration after a failure.
    pub fn abort(&mut self) {
        self.phase = MigrationPhase::Idle;
        self.current = None;
    }
}
