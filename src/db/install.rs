//! The schema of a freshly created database, at version v0.0.
//! Everything after that is handled by the migrations.

pub const QUERY: &'static str = r#"
	CREATE TABLE version (
		major INTEGER NOT NULL,
		minor INTEGER NOT NULL
	);
	INSERT INTO version VALUES (0, 0);

	CREATE TABLE user (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		username TEXT NOT NULL,
		first_name TEXT NOT NULL DEFAULT '',
		last_name TEXT NOT NULL DEFAULT '',
		email TEXT NOT NULL DEFAULT '',
		password TEXT NOT NULL,
		date_joined INTEGER NOT NULL,
		UNIQUE(username)
	);

	CREATE TABLE post_group (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		title TEXT NOT NULL,
		slug TEXT NOT NULL,
		description TEXT NOT NULL,
		UNIQUE(slug)
	);

	CREATE TABLE post (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		text TEXT NOT NULL,
		pub_date INTEGER NOT NULL,
		author_id INTEGER NOT NULL,
		group_id INTEGER,
		image TEXT,
		FOREIGN KEY(author_id) REFERENCES user(id) ON DELETE CASCADE,
		FOREIGN KEY(group_id) REFERENCES post_group(id) ON DELETE SET NULL
	);
	CREATE INDEX post_pub_date ON post(pub_date);
	CREATE INDEX post_author_id ON post(author_id);
	CREATE INDEX post_group_id ON post(group_id);

	CREATE TABLE comment (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		post_id INTEGER NOT NULL,
		author_id INTEGER NOT NULL,
		text TEXT NOT NULL,
		created INTEGER NOT NULL,
		FOREIGN KEY(post_id) REFERENCES post(id) ON DELETE CASCADE,
		FOREIGN KEY(author_id) REFERENCES user(id) ON DELETE CASCADE
	);
	CREATE INDEX comment_post_id ON comment(post_id);

	CREATE TABLE follow (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		user_id INTEGER NOT NULL,
		author_id INTEGER NOT NULL,
		FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE,
		FOREIGN KEY(author_id) REFERENCES user(id) ON DELETE CASCADE
	);

	CREATE TABLE session (
		token TEXT PRIMARY KEY,
		user_id INTEGER NOT NULL,
		created INTEGER NOT NULL,
		expires INTEGER NOT NULL,
		FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
	);
"#;
