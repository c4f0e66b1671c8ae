//! The module for migrating the database.
use std::fmt::Display;

use async_trait::async_trait;
use log::info;
use sea_orm::{prelude::*, DatabaseBackend, DatabaseTransaction, FromQueryResult, Statement};

use crate::db::{self, Database, PersistenceHandle};

mod v0_1;


/// The latest database version.
pub const LATEST_VERSION: Version = Version { major: 0, minor: 1 };


/// Fields are compared in order, so the major number weighs the most.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, FromQueryResult)]
pub struct Version {
	major: u32,
	minor: u32,
}

pub struct Migrations {
	/// A list of available migrations, ordered at version
	list: Vec<(Version, Box<dyn MigrationTrait + Send + Sync>)>,
}

#[async_trait]
trait MigrationTrait {
	async fn run(&self, tx: &DatabaseTransaction) -> Result<(), DbErr>;
}


impl Migrations {
	pub fn load() -> Self {
		Self {
			list: vec![(Version::new(0, 1), Box::new(v0_1::Migration))],
		}
	}

	pub async fn load_version(&self, db: &Database) -> db::Result<Version> {
		Version::find_by_statement(Statement::from_string(
			DatabaseBackend::Sqlite,
			"SELECT major, minor FROM version",
		))
		.one(db.inner())
		.await?
		.ok_or(db::Error::MissingVersion)
	}

	async fn store_version(&self, tx: &DatabaseTransaction, version: &Version) -> Result<(), DbErr> {
		tx.execute(Statement::from_sql_and_values(
			DatabaseBackend::Sqlite,
			"UPDATE version SET major = ?, minor = ?",
			[version.major.into(), version.minor.into()],
		))
		.await?;
		Ok(())
	}

	/// Runs every migration that is newer than the version of the database.
	pub async fn run(&self, db: &Database) -> db::Result<()> {
		let mut current_version = self.load_version(db).await?;

		for (new_version, migration) in &self.list {
			if new_version > &current_version {
				let tx = db.transaction().await?;
				info!(
					"Running database migration from {} to {}...",
					current_version, new_version
				);
				migration.run(&tx.0).await?;
				self.store_version(&tx.0, new_version).await?;
				tx.commit().await?;
				info!("Migrated database to {}.", new_version);
				current_version = new_version.clone();
			}
		}

		debug_assert_eq!(
			current_version, LATEST_VERSION,
			"not migrated to latest version"
		);
		Ok(())
	}
}

impl Version {
	pub fn new(major: u32, minor: u32) -> Self { Self { major, minor } }
}

impl Display for Version {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "v{}.{}", self.major, self.minor)
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::test;

	#[test]
	fn test_version_ordering() {
		assert!(Version::new(0, 1) > Version::new(0, 0));
		assert!(Version::new(1, 0) > Version::new(0, 9));
		assert!(Version::new(2, 0) > Version::new(1, 10));
		assert_eq!(Version::new(0, 1), Version::new(0, 1));
		assert_eq!(
			[Version::new(1, 0), Version::new(0, 2), Version::new(0, 10)]
				.iter()
				.max(),
			Some(&Version::new(1, 0))
		);
	}

	#[tokio::test]
	async fn test_fresh_database_is_migrated_to_latest() {
		let db = test::load_database("migration").await;
		let migrations = Migrations::load();
		assert_eq!(migrations.load_version(&db).await.unwrap(), LATEST_VERSION);

		// Running them again is a no-op
		migrations.run(&db).await.unwrap();
		assert_eq!(migrations.load_version(&db).await.unwrap(), LATEST_VERSION);
	}

	#[tokio::test]
	async fn test_stored_version_is_read_back() {
		let db = test::load_database("migration_store").await;
		let migrations = Migrations::load();
		let tx = db.transaction().await.unwrap();
		migrations
			.store_version(&tx.0, &Version::new(3, 7))
			.await
			.unwrap();
		tx.commit().await.unwrap();
		assert_eq!(migrations.load_version(&db).await.unwrap(), Version::new(3, 7));
	}
}
