//! Schema migrations.
//!
//! A [`Migration`] upgrades a database to the version it is registered
//! under. Each one goes through three phases, tracked by [`MigrationState`]:
//!
//! | Phase | Hook | Storage access |
//! |-------|------|----------------|
//! | pre-migrate | `on_pre_migrate` | no |
//! | migrate | `migrate` | yes |
//! | post-migrate | `on_post_migrate` | no |
//!
//! [`MigrationPipeline`] runs every pending migration in ascending version,
//! then registration order, and advances the stored schema version as each
//! version completes.
//!
//! # Example
//!
//! ```ignore
//! struct AddEmail;
//!
//! impl Migration for AddEmail {
//!     fn migrate(&self, storage: &dyn StorageEngine) -> Result<(), MigrationError> {
//!         storage.execute_raw("ALTER TABLE users ADD COLUMN email TEXT")?;
//!         Ok(())
//!     }
//! }
//!
//! let declaration = DatabaseDeclaration::new("app", 2, storage)
//!     .with_migration(2, AddEmail);
//! ```

pub mod error;
pub mod pipeline;
pub mod state;

pub use error::MigrationError;
pub use pipeline::{MigrationPipeline, MigrationReport, MigrationTable};
pub use state::{MigrationPhase, MigrationState};

use crate::storage::StorageEngine;

/// A versioned schema change.
pub trait Migration: Send + Sync {
    /// Name used in logs and reports. Defaults to the Rust type name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs before `migrate`.
    fn on_pre_migrate(&self) {}

    /// Apply the change.
    fn migrate(&self, storage: &dyn StorageEngine) -> Result<(), MigrationError>;

    /// Runs after a successful `migrate`.
    fn on_post_migrate(&self) {}
}
