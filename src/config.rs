use std::{fmt, io, path::Path};

use log::*;
use serde::*;
use thiserror::Error;

use crate::util::read_text_file;


/// The file path of the configuration file
pub const CONFIG_FILE_PATH: &str = "/etc/yatube/config.toml";
/// The environment variable that overrides `CONFIG_FILE_PATH`
pub const CONFIG_FILE_ENV: &str = "YATUBE_CONFIG";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
	pub database_path: String,

	pub bind_address: String,
	pub port: u16,
	/// Absolute URL the site is reachable at, used for links in the RSS feed.
	pub url_base: String,

	pub templates_path: String,
	pub static_path: String,
	pub media_path: String,

	pub posts_per_page: u64,
	/// How long a rendered index page is served from the cache.
	pub index_cache_seconds: u64,
	/// How long a login stays valid, in seconds.
	pub session_lifetime: u64,
}

#[derive(Debug, Error)]
pub enum LoadError {
	#[error("unable to read config file: {0}")]
	Io(#[from] io::Error),
	#[error("unable to parse config file: {0}")]
	Parse(#[from] toml::de::Error),
}


impl Config {
	pub async fn load<P>(path: P) -> Result<Self, LoadError>
	where
		P: AsRef<Path> + fmt::Debug,
	{
		let content = read_text_file(&path).await?;
		let config: Config = toml::from_str(&content)?;
		if config.database_path.is_empty() {
			warn!("No database_path set in {:?}, using an in-directory file.", path);
		}
		Ok(config)
	}

	pub fn database_path(&self) -> &str {
		if self.database_path.is_empty() {
			"yatube.sqlite"
		} else {
			&self.database_path
		}
	}
}

impl Default for Config {
	fn default() -> Self {
		Self {
			database_path: String::default(),
			bind_address: "127.0.0.1".to_string(),
			port: 8000,
			url_base: "http://localhost:8000".to_string(),
			templates_path: "templates".to_string(),
			static_path: "static".to_string(),
			media_path: "media".to_string(),
			posts_per_page: 10,
			index_cache_seconds: 20,
			session_lifetime: 14 * 24 * 3600,
		}
	}
}
