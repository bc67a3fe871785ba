//! SQLite database handle for the Gateline engine.

pub use gateline_core::db::DatabaseError;

gateline_core::define_database!(Database, "Engine database migrations complete");
