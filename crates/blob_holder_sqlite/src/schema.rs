//! Schema and migration definitions
//!
//! To create a new migration, add a new [`Migration`] to the `migrations` vec
//! of the schema. The `Migration` must specify the actual forward migration
//! script, as well as the schema which results from running it. The resulting
//! schema only serves as a point of reference.
//!
//! Applied migrations are tracked with the `user_version` pragma, which counts
//! how many migrations have been run.

use crate::error::{DatabaseError, DatabaseResult};
use once_cell::sync::Lazy;
use rusqlite::{Connection, Transaction};

pub static SCHEMA_HOLDERS: Lazy<Schema> = Lazy::new(|| Schema {
    migrations: vec![M::initial(include_str!("sql/holders/schema/0.sql"))],
});

/// An ordered list of migrations.
pub struct Schema {
    migrations: Vec<Migration>,
}

impl Schema {
    /// Run every migration the database has not seen yet, in one transaction.
    pub fn initialize(&self, conn: &mut Connection, name: &str) -> DatabaseResult<()> {
        let user_version: u16 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        let migrations_applied = user_version as usize;
        let num_migrations = self.migrations.len();
        match migrations_applied.cmp(&num_migrations) {
            std::cmp::Ordering::Less => {
                let mut txn = conn.transaction()?;
                for v in migrations_applied..num_migrations {
                    self.migrations[v].run_forward(&mut txn)?;
                    txn.pragma_update(None, "user_version", v + 1)?;
                }
                txn.commit()?;
                tracing::info!(
                    "database forward migrated: {} from {} to {}",
                    name,
                    migrations_applied,
                    num_migrations,
                );
            }
            std::cmp::Ordering::Equal => {
                tracing::debug!("database needed no migration, good to go: {}", name);
            }
            std::cmp::Ordering::Greater => {
                return Err(DatabaseError::UnknownSchemaVersion {
                    name: name.to_string(),
                    found: migrations_applied,
                    known: num_migrations,
                });
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Migration {
    _schema: Sql,
    forward: Sql,
}

impl Migration {
    /// The initial migration's forward migration is the entire schema
    pub fn initial(schema: &str) -> Self {
        Self {
            _schema: schema.into(),
            forward: schema.into(),
        }
    }

    pub fn run_forward(&self, txn: &mut Transaction) -> rusqlite::Result<()> {
        txn.execute_batch(&self.forward)?;
        Ok(())
    }
}
type M = Migration;

type Sql = String;
