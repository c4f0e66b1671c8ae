//! Makes the follow relation unique per (user, author) pair.
//! Databases of v0.0 could contain duplicates, which are removed first.

use async_trait::async_trait;
use sea_orm::{prelude::*, sea_query::*, DatabaseTransaction};

use super::MigrationTrait;


pub struct Migration;


#[async_trait]
impl MigrationTrait for Migration {
	async fn run(&self, tx: &DatabaseTransaction) -> Result<(), DbErr> {
		// Keep only the oldest record of each pair
		tx.execute_unprepared(
			"DELETE FROM follow WHERE id NOT IN (SELECT MIN(id) FROM follow GROUP BY user_id, \
			 author_id)",
		)
		.await?;

		let stat = Index::create()
			.name("follow_unique_following")
			.table(Alias::new("follow"))
			.col(Alias::new("user_id"))
			.col(Alias::new("author_id"))
			.unique()
			.to_owned();
		tx.execute_unprepared(&stat.build(SqliteQueryBuilder))
			.await?;

		// Lookups by followed author
		tx.execute_unprepared("CREATE INDEX follow_author_id ON follow(author_id)")
			.await?;
		Ok(())
	}
}
