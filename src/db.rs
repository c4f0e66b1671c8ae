mod install;

use std::{
	collections::HashMap,
	io,
	path::{Path, PathBuf},
	time::Duration,
};

use async_trait::async_trait;
use log::*;
use sea_orm::{prelude::*, sea_query::*, *};
use serde::Serialize;
use thiserror::Error;

use crate::{common::current_timestamp, entity::*};


#[derive(Clone)]
pub struct Database {
	path: PathBuf,
	orm: DatabaseConnection,
}

pub struct Transaction(pub(crate) DatabaseTransaction);

#[derive(Debug, Error)]
pub enum Error {
	#[error("{0}")]
	Orm(#[from] DbErr),
	#[error("{0}")]
	Io(#[from] io::Error),
	#[error("no version information in the database")]
	MissingVersion,
}

/// Selects the posts that are part of a listing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PostFilter {
	All,
	Group(i64),
	Author(i64),
	/// Posts of every author that the given user follows.
	FollowedBy(i64),
}

#[derive(Clone, Debug, Serialize)]
pub struct AuthorInfo {
	pub id: i64,
	pub username: String,
	pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct GroupInfo {
	pub id: i64,
	pub title: String,
	pub slug: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PostInfo {
	pub id: i64,
	pub text: String,
	pub label: String,
	pub pub_date: i64,
	pub author: AuthorInfo,
	pub group: Option<GroupInfo>,
	pub image: Option<String>,
	pub comment_count: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct CommentInfo {
	pub id: i64,
	pub text: String,
	pub created: i64,
	pub author: AuthorInfo,
}

pub type Result<T> = std::result::Result<T, self::Error>;


fn post_condition(filter: PostFilter) -> Condition {
	match filter {
		PostFilter::All => Condition::all(),
		PostFilter::Group(group_id) => Condition::all().add(post::Column::GroupId.eq(group_id)),
		PostFilter::Author(author_id) =>
			Condition::all().add(post::Column::AuthorId.eq(author_id)),
		PostFilter::FollowedBy(user_id) => Condition::all().add(
			post::Column::AuthorId.in_subquery(
				follow::Entity::find()
					.select_only()
					.column(follow::Column::AuthorId)
					.filter(follow::Column::UserId.eq(user_id))
					.into_query(),
			),
		),
	}
}


#[async_trait]
pub trait PersistenceHandle {
	type Inner: ConnectionTrait;

	fn inner(&self) -> &Self::Inner;

	fn backend(&self) -> DatabaseBackend { self.inner().get_database_backend() }


	async fn count_followers(&self, author_id: i64) -> Result<u64> {
		Ok(follow::Entity::find()
			.filter(follow::Column::AuthorId.eq(author_id))
			.count(self.inner())
			.await?)
	}

	async fn count_following(&self, user_id: i64) -> Result<u64> {
		Ok(follow::Entity::find()
			.filter(follow::Column::UserId.eq(user_id))
			.count(self.inner())
			.await?)
	}

	async fn count_posts(&self, filter: PostFilter) -> Result<u64> {
		Ok(post::Entity::find()
			.filter(post_condition(filter))
			.count(self.inner())
			.await?)
	}

	async fn delete_expired_sessions(&self, now: i64) -> Result<u64> {
		let result = session::Entity::delete_many()
			.filter(session::Column::Expires.lte(now))
			.exec(self.inner())
			.await?;
		Ok(result.rows_affected)
	}

	/// Removes the follow relation, if there was one. Returns whether anything
	/// was deleted.
	async fn delete_follow(&self, user_id: i64, author_id: i64) -> Result<bool> {
		let result = follow::Entity::delete_many()
			.filter(follow::Column::UserId.eq(user_id))
			.filter(follow::Column::AuthorId.eq(author_id))
			.exec(self.inner())
			.await?;
		Ok(result.rows_affected > 0)
	}

	async fn delete_session(&self, token: &str) -> Result<()> {
		session::Entity::delete_by_id(token.to_string())
			.exec(self.inner())
			.await?;
		Ok(())
	}

	async fn find_group(&self, id: i64) -> Result<Option<group::Model>> {
		Ok(group::Entity::find_by_id(id).one(self.inner()).await?)
	}

	async fn find_group_by_slug(&self, slug: &str) -> Result<Option<group::Model>> {
		Ok(group::Entity::find()
			.filter(group::Column::Slug.eq(slug))
			.one(self.inner())
			.await?)
	}

	/// Finds a post by its ID, but only if it has been written by the user with
	/// the given username.
	async fn find_post(
		&self, username: &str, post_id: i64,
	) -> Result<Option<(post::Model, user::Model)>> {
		let result = post::Entity::find_by_id(post_id)
			.find_also_related(user::Entity)
			.filter(user::Column::Username.eq(username))
			.one(self.inner())
			.await?;
		Ok(result.and_then(|(post, author)| author.map(|a| (post, a))))
	}

	/// Finds the user that belongs to the given session token, if the session
	/// hasn't expired yet.
	async fn find_session_user(&self, token: &str, now: i64) -> Result<Option<user::Model>> {
		let result = session::Entity::find_by_id(token.to_string())
			.find_also_related(user::Entity)
			.one(self.inner())
			.await?;

		match result {
			None => Ok(None),
			Some((session, user)) =>
				if session.expires <= now {
					debug!("Session of user {} has expired.", session.user_id);
					self.delete_session(token).await?;
					Ok(None)
				} else {
					Ok(user)
				},
		}
	}

	async fn find_user(&self, id: i64) -> Result<Option<user::Model>> {
		Ok(user::Entity::find_by_id(id).one(self.inner()).await?)
	}

	async fn find_user_by_username(&self, username: &str) -> Result<Option<user::Model>> {
		Ok(user::Entity::find()
			.filter(user::Column::Username.eq(username))
			.one(self.inner())
			.await?)
	}

	async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool> {
		let count = follow::Entity::find()
			.filter(follow::Column::UserId.eq(user_id))
			.filter(follow::Column::AuthorId.eq(author_id))
			.count(self.inner())
			.await?;
		Ok(count > 0)
	}

	/// Loads all comments of a post, newest first.
	async fn load_comments(&self, post_id: i64) -> Result<Vec<CommentInfo>> {
		let results = comment::Entity::find()
			.find_also_related(user::Entity)
			.filter(comment::Column::PostId.eq(post_id))
			.order_by_desc(comment::Column::Created)
			.order_by_desc(comment::Column::Id)
			.all(self.inner())
			.await?;

		let mut comments = Vec::with_capacity(results.len());
		for (comment, author_opt) in results {
			if let Some(author) = author_opt {
				comments.push(CommentInfo {
					id: comment.id,
					text: comment.text,
					created: comment.created,
					author: AuthorInfo::from(&author),
				});
			} else {
				warn!("Comment {} has no author.", comment.id);
			}
		}
		Ok(comments)
	}

	async fn load_groups(&self) -> Result<Vec<group::Model>> {
		Ok(group::Entity::find()
			.order_by_asc(group::Column::Title)
			.all(self.inner())
			.await?)
	}

	/// Loads a page of posts, newest first.
	async fn load_posts(&self, filter: PostFilter, limit: u64, offset: u64) -> Result<Vec<PostInfo>> {
		let posts = post::Entity::find()
			.filter(post_condition(filter))
			.order_by_desc(post::Column::PubDate)
			.order_by_desc(post::Column::Id)
			.limit(limit)
			.offset(offset)
			.all(self.inner())
			.await?;
		self.load_post_infos(posts).await
	}

	/// Completes the given posts with their author, group and comment count.
	async fn load_post_infos(&self, posts: Vec<post::Model>) -> Result<Vec<PostInfo>> {
		if posts.len() == 0 {
			return Ok(Vec::new());
		}

		let author_ids: Vec<i64> = posts.iter().map(|p| p.author_id).collect();
		let authors: HashMap<i64, user::Model> = user::Entity::find()
			.filter(user::Column::Id.is_in(author_ids))
			.all(self.inner())
			.await?
			.into_iter()
			.map(|u| (u.id, u))
			.collect();

		let group_ids: Vec<i64> = posts.iter().filter_map(|p| p.group_id).collect();
		let groups: HashMap<i64, group::Model> = if group_ids.len() > 0 {
			group::Entity::find()
				.filter(group::Column::Id.is_in(group_ids))
				.all(self.inner())
				.await?
				.into_iter()
				.map(|g| (g.id, g))
				.collect()
		} else {
			HashMap::new()
		};

		let post_ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
		let comment_counts: HashMap<i64, i64> = comment::Entity::find()
			.select_only()
			.column(comment::Column::PostId)
			.column_as(Expr::col(comment::Column::Id).count(), "count")
			.filter(comment::Column::PostId.is_in(post_ids))
			.group_by(comment::Column::PostId)
			.into_tuple::<(i64, i64)>()
			.all(self.inner())
			.await?
			.into_iter()
			.collect();

		let mut infos = Vec::with_capacity(posts.len());
		for post in posts {
			let author = match authors.get(&post.author_id) {
				Some(a) => a,
				None => {
					warn!("Post {} has a missing author {}.", post.id, post.author_id);
					continue;
				}
			};
			let group = post.group_id.and_then(|id| groups.get(&id));
			let comment_count = comment_counts.get(&post.id).cloned().unwrap_or(0);
			infos.push(PostInfo::new(post, author, group, comment_count));
		}
		Ok(infos)
	}

	async fn store_comment(&self, post_id: i64, author_id: i64, text: &str) -> Result<comment::Model> {
		let record = comment::ActiveModel {
			id: NotSet,
			post_id: Set(post_id),
			author_id: Set(author_id),
			text: Set(text.to_string()),
			created: Set(current_timestamp()),
		};
		Ok(record.insert(self.inner()).await?)
	}

	/// Stores the follow relation if it doesn't exist yet. Returns whether a
	/// new relation was created.
	async fn store_follow(&self, user_id: i64, author_id: i64) -> Result<bool> {
		let record = follow::ActiveModel {
			id: NotSet,
			user_id: Set(user_id),
			author_id: Set(author_id),
		};
		let inserted = follow::Entity::insert(record)
			.on_conflict(
				OnConflict::columns([follow::Column::UserId, follow::Column::AuthorId])
					.do_nothing()
					.to_owned(),
			)
			.exec_without_returning(self.inner())
			.await?;
		Ok(inserted > 0)
	}

	async fn store_group(&self, title: &str, slug: &str, description: &str) -> Result<group::Model> {
		let record = group::ActiveModel {
			id: NotSet,
			title: Set(title.to_string()),
			slug: Set(slug.to_string()),
			description: Set(description.to_string()),
		};
		Ok(record.insert(self.inner()).await?)
	}

	async fn store_post(
		&self, author_id: i64, text: &str, group_id: Option<i64>, image: Option<String>,
	) -> Result<post::Model> {
		let record = post::ActiveModel {
			id: NotSet,
			text: Set(text.to_string()),
			pub_date: Set(current_timestamp()),
			author_id: Set(author_id),
			group_id: Set(group_id),
			image: Set(image),
		};
		Ok(record.insert(self.inner()).await?)
	}

	async fn store_session(&self, token: &str, user_id: i64, lifetime: Duration) -> Result<()> {
		let now = current_timestamp();
		let record = session::ActiveModel {
			token: Set(token.to_string()),
			user_id: Set(user_id),
			created: Set(now),
			expires: Set(now + lifetime.as_millis() as i64),
		};
		session::Entity::insert(record)
			.exec_without_returning(self.inner())
			.await?;
		Ok(())
	}

	async fn store_user(
		&self, username: &str, first_name: &str, last_name: &str, email: &str,
		password_hash: &str,
	) -> Result<user::Model> {
		let record = user::ActiveModel {
			id: NotSet,
			username: Set(username.to_string()),
			first_name: Set(first_name.to_string()),
			last_name: Set(last_name.to_string()),
			email: Set(email.to_string()),
			password: Set(password_hash.to_string()),
			date_joined: Set(current_timestamp()),
		};
		Ok(record.insert(self.inner()).await?)
	}

	/// Overwrites the editable fields of a post. The author and publication
	/// date stay as they are.
	async fn update_post(
		&self, post: post::Model, text: &str, group_id: Option<i64>, image: Option<String>,
	) -> Result<post::Model> {
		let mut record: post::ActiveModel = post.into();
		record.text = Set(text.to_string());
		record.group_id = Set(group_id);
		record.image = Set(image);
		Ok(record.update(self.inner()).await?)
	}
}


impl Database {
	async fn install(&self) -> Result<()> {
		info!("Installing a new database at {}...", self.path.display());
		let tx = self.orm.begin().await?;
		tx.execute_unprepared(install::QUERY).await?;
		tx.commit().await?;
		Ok(())
	}

	async fn is_installed(&self) -> Result<bool> {
		let row = self
			.orm
			.query_one(Statement::from_string(
				DatabaseBackend::Sqlite,
				"SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'version'",
			))
			.await?;
		Ok(row.is_some())
	}

	/// Opens the database file, creating and installing it if it doesn't exist
	/// yet.
	pub async fn load(path: PathBuf) -> Result<Self> {
		let mut opts = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
		opts.idle_timeout(Duration::from_secs(10));
		opts.acquire_timeout(Duration::from_secs(5));
		opts.sqlx_logging_level(LevelFilter::Trace);
		let orm = sea_orm::Database::connect(opts).await?;

		let db = Self { path, orm };
		if !db.is_installed().await? {
			db.install().await?;
		}
		Ok(db)
	}

	pub fn path(&self) -> &Path { &self.path }

	pub async fn transaction(&self) -> Result<Transaction> {
		let tx = self.orm.begin().await?;
		Ok(Transaction(tx))
	}
}

impl PersistenceHandle for Database {
	type Inner = DatabaseConnection;

	fn inner(&self) -> &Self::Inner { &self.orm }
}

impl PersistenceHandle for Transaction {
	type Inner = DatabaseTransaction;

	fn inner(&self) -> &Self::Inner { &self.0 }
}

impl Transaction {
	pub async fn commit(self) -> Result<()> {
		self.0.commit().await?;
		Ok(())
	}
}

impl From<&user::Model> for AuthorInfo {
	fn from(user: &user::Model) -> Self {
		Self {
			id: user.id,
			username: user.username.clone(),
			name: user.display_name(),
		}
	}
}

impl From<&group::Model> for GroupInfo {
	fn from(group: &group::Model) -> Self {
		Self {
			id: group.id,
			title: group.title.clone(),
			slug: group.slug.clone(),
		}
	}
}

impl PostInfo {
	pub fn new(
		post: post::Model, author: &user::Model, group: Option<&group::Model>, comment_count: i64,
	) -> Self {
		Self {
			id: post.id,
			label: post.label().to_string(),
			text: post.text,
			pub_date: post.pub_date,
			author: AuthorInfo::from(author),
			group: group.map(GroupInfo::from),
			image: post.image,
			comment_count,
		}
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::test;

	#[tokio::test]
	async fn test_feed_only_contains_followed_authors() {
		let db = test::load_database("feed").await;
		let reader = test::create_user(&db, "reader").await;
		let followed = test::create_user(&db, "followed").await;
		let stranger = test::create_user(&db, "stranger").await;

		assert!(db.store_follow(reader.id, followed.id).await.unwrap());
		db.store_post(followed.id, "followed post", None, None)
			.await
			.unwrap();
		db.store_post(stranger.id, "stranger post", None, None)
			.await
			.unwrap();

		let feed = db
			.load_posts(PostFilter::FollowedBy(reader.id), 10, 0)
			.await
			.unwrap();
		assert_eq!(feed.len(), 1);
		assert_eq!(feed[0].text, "followed post");
		assert_eq!(feed[0].author.username, "followed");
		assert_eq!(
			db.count_posts(PostFilter::FollowedBy(reader.id))
				.await
				.unwrap(),
			1
		);

		let stranger_feed = db
			.load_posts(PostFilter::FollowedBy(stranger.id), 10, 0)
			.await
			.unwrap();
		assert_eq!(stranger_feed.len(), 0);
	}

	#[tokio::test]
	async fn test_posts_are_ordered_newest_first() {
		let db = test::load_database("order").await;
		let author = test::create_user(&db, "author").await;
		for i in 0..13 {
			db.store_post(author.id, &i.to_string(), None, None)
				.await
				.unwrap();
		}

		let first = db.load_posts(PostFilter::All, 10, 0).await.unwrap();
		let second = db.load_posts(PostFilter::All, 10, 10).await.unwrap();
		assert_eq!(first.len(), 10);
		assert_eq!(second.len(), 3);
		assert_eq!(first[0].text, "12");
		assert_eq!(second[2].text, "0");
	}

	#[tokio::test]
	async fn test_follow_is_unique() {
		let db = test::load_database("follow").await;
		let a = test::create_user(&db, "a").await;
		let b = test::create_user(&db, "b").await;

		assert!(db.store_follow(a.id, b.id).await.unwrap());
		assert!(!db.store_follow(a.id, b.id).await.unwrap());
		assert_eq!(db.count_followers(b.id).await.unwrap(), 1);
		assert_eq!(db.count_following(a.id).await.unwrap(), 1);

		assert!(db.delete_follow(a.id, b.id).await.unwrap());
		assert!(!db.delete_follow(a.id, b.id).await.unwrap());
		assert_eq!(db.count_followers(b.id).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_deleting_group_keeps_posts() {
		let db = test::load_database("group_delete").await;
		let author = test::create_user(&db, "author").await;
		let group = db.store_group("Cats", "cats", "All about cats").await.unwrap();
		let post = db
			.store_post(author.id, "a cat", Some(group.id), None)
			.await
			.unwrap();
		assert_eq!(db.count_posts(PostFilter::Group(group.id)).await.unwrap(), 1);

		group::Entity::delete_by_id(group.id)
			.exec(db.inner())
			.await
			.unwrap();
		let (post, _) = db.find_post("author", post.id).await.unwrap().unwrap();
		assert_eq!(post.group_id, None);
	}

	#[tokio::test]
	async fn test_deleting_user_cascades() {
		let db = test::load_database("user_delete").await;
		let author = test::create_user(&db, "author").await;
		let reader = test::create_user(&db, "reader").await;
		let post = db.store_post(author.id, "text", None, None).await.unwrap();
		db.store_comment(post.id, reader.id, "nice").await.unwrap();
		db.store_comment(post.id, author.id, "thanks").await.unwrap();
		db.store_follow(reader.id, author.id).await.unwrap();

		user::Entity::delete_by_id(author.id)
			.exec(db.inner())
			.await
			.unwrap();
		assert_eq!(db.count_posts(PostFilter::All).await.unwrap(), 0);
		assert_eq!(comment::Entity::find().count(db.inner()).await.unwrap(), 0);
		assert_eq!(db.count_following(reader.id).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_comments_are_newest_first() {
		let db = test::load_database("comments").await;
		let author = test::create_user(&db, "author").await;
		let post = db.store_post(author.id, "text", None, None).await.unwrap();
		db.store_comment(post.id, author.id, "first").await.unwrap();
		db.store_comment(post.id, author.id, "second").await.unwrap();

		let comments = db.load_comments(post.id).await.unwrap();
		assert_eq!(comments.len(), 2);
		assert_eq!(comments[0].text, "second");

		let posts = db.load_posts(PostFilter::All, 10, 0).await.unwrap();
		assert_eq!(posts[0].comment_count, 2);
	}

	#[tokio::test]
	async fn test_expired_session_is_anonymous() {
		let db = test::load_database("session").await;
		let user = test::create_user(&db, "user").await;
		db.store_session("token", user.id, Duration::from_secs(60))
			.await
			.unwrap();

		let now = current_timestamp();
		let found = db.find_session_user("token", now).await.unwrap();
		assert_eq!(found.map(|u| u.id), Some(user.id));

		let later = now + 61_000;
		assert!(db.find_session_user("token", later).await.unwrap().is_none());
		// The expired session has been cleaned up
		assert!(db.find_session_user("token", now).await.unwrap().is_none());
	}
}
