use std::{
	io,
	path::{Path, PathBuf},
	time::Duration,
};

use argon2::{
	password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
	Argon2,
};
use log::*;
use thiserror::Error;
use tokio::task::spawn_blocking;

use crate::{
	common::*,
	db::{self, Database, PersistenceHandle},
	entity::*,
	model::*,
};


#[derive(Clone)]
pub struct Api {
	pub db: Database,
	pub media_path: PathBuf,
	pub session_lifetime: Duration,
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("database error: {0}")]
	Db(#[from] db::Error),
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
	#[error("password hash error: {0}")]
	PasswordHash(String),
	#[error("{0} not found")]
	NotFound(&'static str),
	#[error("invalid form submission")]
	Invalid(FormErrors),
}

pub type Result<T> = std::result::Result<T, Error>;


/// Hashes the password into a PHC string.
pub async fn hash_password(password: &str) -> Result<String> {
	let password = password.to_string();
	spawn_blocking(move || -> Result<String> {
		let salt = SaltString::generate(rand::thread_rng());
		Argon2::default()
			.hash_password(password.as_bytes(), &salt)
			.map(|hash| hash.to_string())
			.map_err(|e| Error::PasswordHash(e.to_string()))
	})
	.await
	.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

pub async fn verify_password(password: &str, phc_string: &str) -> Result<bool> {
	let password = password.to_string();
	let phc_string = phc_string.to_string();
	spawn_blocking(move || -> Result<bool> {
		let hash = PasswordHash::new(&phc_string).map_err(|e| Error::PasswordHash(e.to_string()))?;
		Ok(Argon2::default()
			.verify_password(password.as_bytes(), &hash)
			.is_ok())
	})
	.await
	.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}


impl Api {
	pub fn new(db: Database, media_path: impl Into<PathBuf>, session_lifetime: Duration) -> Self {
		Self {
			db,
			media_path: media_path.into(),
			session_lifetime,
		}
	}

	/// Adds a comment to a post. Returns `None` when the comment was empty and
	/// therefore dropped.
	pub async fn add_comment(
		&self, author: &user::Model, username: &str, post_id: i64, form: &CommentForm,
	) -> Result<Option<comment::Model>> {
		let (post, _) = self
			.db
			.find_post(username, post_id)
			.await?
			.ok_or(Error::NotFound("post"))?;

		let text = match form.clean() {
			Ok(t) => t,
			Err(_) => {
				debug!("Dropping empty comment on post {}.", post.id);
				return Ok(None);
			}
		};
		let comment = self.db.store_comment(post.id, author.id, text).await?;
		Ok(Some(comment))
	}

	/// Makes sure the submitted group exists, if any.
	async fn check_group(&self, group_id: Option<i64>) -> Result<()> {
		if let Some(id) = group_id {
			if self.db.find_group(id).await?.is_none() {
				return Err(Error::Invalid(FormErrors::single(
					"group",
					"Select a valid choice. That choice is not one of the available choices.",
				)));
			}
		}
		Ok(())
	}

	pub async fn create_group(&self, title: &str, slug: &str, description: &str) -> Result<group::Model> {
		let form = GroupForm {
			title: title.trim().to_string(),
			slug: slug.to_string(),
			description: description.to_string(),
		};
		form.clean().map_err(Error::Invalid)?;
		if self.db.find_group_by_slug(slug).await?.is_some() {
			return Err(Error::Invalid(FormErrors::single(
				"slug",
				"Group with this slug already exists.",
			)));
		}

		let group = self.db.store_group(&form.title, slug, description).await?;
		info!("Created group {} ({}).", group.slug, group.id);
		Ok(group)
	}

	pub async fn create_post(&self, author: &user::Model, form: &PostForm) -> Result<post::Model> {
		let clean = form.clean().map_err(Error::Invalid)?;
		self.check_group(clean.group_id).await?;

		let image = match clean.image {
			None => None,
			Some((format, file)) => Some(self.store_image(format, file).await?),
		};
		let post = match self
			.db
			.store_post(author.id, clean.text, clean.group_id, image.clone())
			.await
		{
			Ok(p) => p,
			Err(e) => {
				if let Some(new) = image.as_deref() {
					self.remove_image(new).await;
				}
				return Err(e.into());
			}
		};
		debug!("User {} published post {}.", author.username, post.id);
		Ok(post)
	}

	/// Edits a post of the given author. Fails with `NotFound` if the author
	/// hasn't written a post with that ID.
	pub async fn edit_post(
		&self, author: &user::Model, post_id: i64, form: &PostForm,
	) -> Result<post::Model> {
		let (post, _) = self
			.db
			.find_post(&author.username, post_id)
			.await?
			.ok_or(Error::NotFound("post"))?;

		let clean = form.clean().map_err(Error::Invalid)?;
		self.check_group(clean.group_id).await?;

		let old_image = post.image.clone();
		let new_image = match clean.image {
			Some((format, file)) => Some(self.store_image(format, file).await?),
			None => None,
		};
		let image = match &new_image {
			Some(_) => new_image.clone(),
			None if clean.clear_image => None,
			None => old_image.clone(),
		};

		// The old image is only removed once the post no longer refers to it
		let edited = match self
			.db
			.update_post(post, clean.text, clean.group_id, image.clone())
			.await
		{
			Ok(p) => p,
			Err(e) => {
				if let Some(new) = new_image.as_deref() {
					self.remove_image(new).await;
				}
				return Err(e.into());
			}
		};
		if let Some(old) = old_image.as_deref() {
			if image.as_deref() != Some(old) {
				self.remove_image(old).await;
			}
		}
		Ok(edited)
	}

	/// Starts following the author. Returns whether a new follow relation has
	/// been created. Following yourself is silently ignored.
	pub async fn follow(&self, user: &user::Model, username: &str) -> Result<bool> {
		let author = self
			.db
			.find_user_by_username(username)
			.await?
			.ok_or(Error::NotFound("user"))?;
		if author.id == user.id {
			return Ok(false);
		}
		Ok(self.db.store_follow(user.id, author.id).await?)
	}

	/// Checks the credentials and opens a new session. Returns `None` if the
	/// username or password is wrong.
	pub async fn login(
		&self, username: &str, password: &str,
	) -> Result<Option<(user::Model, String)>> {
		let user = match self.db.find_user_by_username(username.trim()).await? {
			Some(u) => u,
			None => return Ok(None),
		};
		if !verify_password(password, &user.password).await? {
			info!("Failed login attempt for user {}.", user.username);
			return Ok(None);
		}

		let token = self.open_session(&user).await?;
		Ok(Some((user, token)))
	}

	pub async fn logout(&self, token: &str) -> Result<()> {
		self.db.delete_session(token).await?;
		Ok(())
	}

	async fn open_session(&self, user: &user::Model) -> Result<String> {
		let now = current_timestamp();
		let removed = self.db.delete_expired_sessions(now).await?;
		if removed > 0 {
			debug!("Removed {} expired sessions.", removed);
		}

		let token = generate_token();
		self.db
			.store_session(&token, user.id, self.session_lifetime)
			.await?;
		Ok(token)
	}

	async fn remove_image(&self, relative_path: &str) {
		let path = self.media_path.join(relative_path);
		if let Err(e) = tokio::fs::remove_file(&path).await {
			warn!("Unable to remove image {}: {}", path.display(), e);
		}
	}

	/// Finds the user that is logged in with the given session token.
	pub async fn session_user(&self, token: &str) -> Result<Option<user::Model>> {
		Ok(self
			.db
			.find_session_user(token, current_timestamp())
			.await?)
	}

	/// Registers a new user and logs them in right away.
	pub async fn signup(&self, form: &SignupForm) -> Result<(user::Model, String)> {
		form.clean().map_err(Error::Invalid)?;
		let username = form.username.trim();
		if self.db.find_user_by_username(username).await?.is_some() {
			return Err(Error::Invalid(FormErrors::single(
				"username",
				"A user with that username already exists.",
			)));
		}

		let password_hash = hash_password(&form.password1).await?;
		let user = self
			.db
			.store_user(
				username,
				form.first_name.trim(),
				form.last_name.trim(),
				form.email.trim(),
				&password_hash,
			)
			.await?;
		info!("New user {} signed up.", user.username);

		let token = self.open_session(&user).await?;
		Ok((user, token))
	}

	/// Writes the image to the media folder under a new random name, and
	/// returns its path relative to that folder.
	async fn store_image(&self, format: ImageFormat, file: &FileData) -> Result<String> {
		let relative_path = format!("posts/{}.{}", generate_token(), format.extension());
		let path = self.media_path.join(&relative_path);
		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		tokio::fs::write(&path, &file.data).await?;
		debug!(
			"Stored image {} ({} bytes) as {}.",
			file.file_name,
			file.data.len(),
			path.display()
		);
		Ok(relative_path)
	}

	pub async fn unfollow(&self, user: &user::Model, username: &str) -> Result<bool> {
		let author = self
			.db
			.find_user_by_username(username)
			.await?
			.ok_or(Error::NotFound("user"))?;
		if author.id == user.id {
			return Ok(false);
		}
		Ok(self.db.delete_follow(user.id, author.id).await?)
	}

	pub fn media_path(&self) -> &Path { &self.media_path }
}
