use std::sync::Arc;

use axum::{
	extract::{Multipart, Path, Query, State},
	http::Uri,
	response::Response,
	Extension, Form,
};
use log::*;
use serde::{Deserialize, Serialize};
use tera::Context;

use super::{common::*, paginator::*, Global, Viewer};
use crate::{
	api,
	db::{self, CommentInfo, PersistenceHandle, PostFilter, PostInfo},
	entity::*,
	model::{CommentForm, FormErrors, PostForm},
};


#[derive(Default, Deserialize)]
pub struct PaginationQuery {
	page: Option<String>,
}

#[derive(Serialize)]
struct GroupChoice {
	id: i64,
	title: String,
}

#[derive(Serialize)]
struct ProfileInfo {
	id: i64,
	username: String,
	name: String,
	posts_count: u64,
	followers_count: u64,
	following_count: u64,
}


/// Parses the post ID in the URL. Anything that isn't a number can't be a
/// post.
fn parse_post_id(string: &str) -> Option<i64> { string.parse().ok() }

async fn load_page(
	g: &Global, filter: PostFilter, page_number: Option<&str>,
) -> db::Result<(Page, Vec<Dated<PostInfo>>)> {
	let count = g.api.db.count_posts(filter).await?;
	let page = Paginator::new(count, g.config.posts_per_page).get_page(page_number);
	let posts = g
		.api
		.db
		.load_posts(filter, page.limit, page.offset)
		.await?
		.into_iter()
		.map(|p| {
			let pub_date = p.pub_date;
			dated(p, pub_date)
		})
		.collect();
	Ok((page, posts))
}

async fn load_group_choices(g: &Global) -> db::Result<Vec<GroupChoice>> {
	Ok(g.api
		.db
		.load_groups()
		.await?
		.into_iter()
		.map(|group| GroupChoice {
			id: group.id,
			title: group.title,
		})
		.collect())
}

/// Renders the form to write a new post, or to edit an existing one.
async fn render_post_form(
	g: &Global, viewer: &Viewer, form: &PostForm, errors: &FormErrors, post: Option<&post::Model>,
) -> Response {
	let groups = match load_group_choices(g).await {
		Ok(r) => r,
		Err(e) => return g.server_error(viewer, e, "Unable to load groups"),
	};

	let mut context = Context::new();
	context.insert("form", form);
	insert_form_errors(&mut context, errors, &["text", "group", "image"]);
	context.insert("groups", &groups);
	context.insert("edit", &post.is_some());
	if let Some(p) = post {
		context.insert("post_id", &p.id);
		context.insert("image", &p.image);
	}
	g.render(viewer, "new.html.tera", context)
}


pub async fn index(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Query(query): Query<PaginationQuery>,
) -> Response {
	let cache_key = (viewer.id(), query.page.clone());
	if let Some(html) = g.index_cache.find(&cache_key).await {
		trace!("Serving index page from cache.");
		return super::html_response(200, html);
	}

	let (page, posts) = match load_page(&g, PostFilter::All, query.page.as_deref()).await {
		Ok(r) => r,
		Err(e) => return g.server_error(&viewer, e, "Unable to load posts"),
	};

	let mut context = Context::new();
	context.insert("page", &page);
	context.insert("posts", &posts);
	match g.render_string(&viewer, "index.html.tera", context) {
		Err(e) => g.server_error(&viewer, e, "Unable to render index page"),
		Ok(html) => {
			if g.index_cache.is_enabled() {
				g.index_cache.insert(cache_key, html.clone()).await;
			}
			super::html_response(200, html)
		}
	}
}

pub async fn group_posts(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
	Path(slug): Path<String>, Query(query): Query<PaginationQuery>,
) -> Response {
	let group = match g.api.db.find_group_by_slug(&slug).await {
		Ok(Some(group)) => group,
		Ok(None) => return g.not_found(&viewer, &uri),
		Err(e) => return g.server_error(&viewer, e, "Unable to load group"),
	};

	let (page, posts) = match load_page(&g, PostFilter::Group(group.id), query.page.as_deref()).await
	{
		Ok(r) => r,
		Err(e) => return g.server_error(&viewer, e, "Unable to load group posts"),
	};

	let mut context = Context::new();
	context.insert("group", &group);
	context.insert("page", &page);
	context.insert("posts", &posts);
	g.render(&viewer, "group.html.tera", context)
}

pub async fn new_post(State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>) -> Response {
	render_post_form(&g, &viewer, &PostForm::default(), &FormErrors::default(), None).await
}

pub async fn new_post_post(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
	multipart: Multipart,
) -> Response {
	let Some(user) = viewer.user.as_ref() else {
		return login_redirect(uri.path());
	};
	let form = match read_post_form(multipart).await {
		Ok(f) => f,
		Err(response) => return response,
	};

	match g.api.create_post(user, &form).await {
		Ok(_) => redirect("/"),
		Err(api::Error::Invalid(errors)) =>
			render_post_form(&g, &viewer, &form, &errors, None).await,
		Err(e) => g.api_error(&viewer, &uri, e, "Unable to publish post"),
	}
}

pub async fn profile(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
	Path(username): Path<String>, Query(query): Query<PaginationQuery>,
) -> Response {
	let author = match g.api.db.find_user_by_username(&username).await {
		Ok(Some(u)) => u,
		Ok(None) => return g.not_found(&viewer, &uri),
		Err(e) => return g.server_error(&viewer, e, "Unable to load user"),
	};

	let result: db::Result<_> = async {
		let (page, posts) = load_page(&g, PostFilter::Author(author.id), query.page.as_deref()).await?;
		let following = match viewer.id() {
			Some(id) => g.api.db.is_following(id, author.id).await?,
			None => false,
		};
		let info = ProfileInfo {
			id: author.id,
			username: author.username.clone(),
			name: author.display_name(),
			posts_count: page.count,
			followers_count: g.api.db.count_followers(author.id).await?,
			following_count: g.api.db.count_following(author.id).await?,
		};
		Ok((page, posts, following, info))
	}
	.await;
	let (page, posts, following, info) = match result {
		Ok(r) => r,
		Err(e) => return g.server_error(&viewer, e, "Unable to load profile"),
	};

	let mut context = Context::new();
	context.insert("author", &info);
	context.insert("page", &page);
	context.insert("posts", &posts);
	context.insert("following", &following);
	g.render(&viewer, "profile.html.tera", context)
}

pub async fn post_view(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
	Path((username, post_id)): Path<(String, String)>,
) -> Response {
	let Some(post_id) = parse_post_id(&post_id) else {
		return g.not_found(&viewer, &uri);
	};

	let result: db::Result<_> = async {
		let Some((post, author)) = g.api.db.find_post(&username, post_id).await? else {
			return Ok(None);
		};
		let group = match post.group_id {
			Some(id) => g.api.db.find_group(id).await?,
			None => None,
		};
		let comments: Vec<Dated<CommentInfo>> = g
			.api
			.db
			.load_comments(post.id)
			.await?
			.into_iter()
			.map(|c| {
				let created = c.created;
				dated(c, created)
			})
			.collect();
		let posts_count = g.api.db.count_posts(PostFilter::Author(author.id)).await?;
		let post = PostInfo::new(post, &author, group.as_ref(), comments.len() as i64);
		Ok(Some((post, comments, posts_count)))
	}
	.await;
	let (post, comments, posts_count) = match result {
		Ok(Some(r)) => r,
		Ok(None) => return g.not_found(&viewer, &uri),
		Err(e) => return g.server_error(&viewer, e, "Unable to load post"),
	};

	let pub_date = post.pub_date;
	let mut context = Context::new();
	context.insert("post", &dated(post, pub_date));
	context.insert("comments", &comments);
	context.insert("posts_count", &posts_count);
	context.insert("form", &CommentForm::default());
	g.render(&viewer, "post.html.tera", context)
}

pub async fn post_edit(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
	Path((username, post_id)): Path<(String, String)>,
) -> Response {
	let Some(post_id) = parse_post_id(&post_id) else {
		return g.not_found(&viewer, &uri);
	};
	if !viewer.is(&username) {
		return redirect(&post_url(&username, post_id));
	}

	let post = match g.api.db.find_post(&username, post_id).await {
		Ok(Some((post, _))) => post,
		Ok(None) => return g.not_found(&viewer, &uri),
		Err(e) => return g.server_error(&viewer, e, "Unable to load post"),
	};
	let form = PostForm {
		text: post.text.clone(),
		group: post.group_id.map(|id| id.to_string()),
		..Default::default()
	};
	render_post_form(&g, &viewer, &form, &FormErrors::default(), Some(&post)).await
}

pub async fn post_edit_post(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
	Path((username, post_id)): Path<(String, String)>, multipart: Multipart,
) -> Response {
	let Some(post_id) = parse_post_id(&post_id) else {
		return g.not_found(&viewer, &uri);
	};
	let user = match viewer.user.as_ref() {
		Some(u) if u.username == username => u,
		_ => {
			info!("Refusing edit of post {} by someone else.", post_id);
			return redirect(&post_url(&username, post_id));
		}
	};
	let form = match read_post_form(multipart).await {
		Ok(f) => f,
		Err(response) => return response,
	};

	match g.api.edit_post(user, post_id, &form).await {
		Ok(post) => redirect(&post_url(&username, post.id)),
		Err(api::Error::Invalid(errors)) => {
			let post = match g.api.db.find_post(&username, post_id).await {
				Ok(Some((post, _))) => post,
				Ok(None) => return g.not_found(&viewer, &uri),
				Err(e) => return g.server_error(&viewer, e, "Unable to load post"),
			};
			render_post_form(&g, &viewer, &form, &errors, Some(&post)).await
		}
		Err(e) => g.api_error(&viewer, &uri, e, "Unable to edit post"),
	}
}

pub async fn add_comment(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
	Path((username, post_id)): Path<(String, String)>, Form(form): Form<CommentForm>,
) -> Response {
	let Some(post_id) = parse_post_id(&post_id) else {
		return g.not_found(&viewer, &uri);
	};
	let Some(user) = viewer.user.as_ref() else {
		return login_redirect(uri.path());
	};

	match g.api.add_comment(user, &username, post_id, &form).await {
		Ok(_) => redirect(&post_url(&username, post_id)),
		Err(e) => g.api_error(&viewer, &uri, e, "Unable to add comment"),
	}
}

pub async fn follow_index(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
	Query(query): Query<PaginationQuery>,
) -> Response {
	let Some(user_id) = viewer.id() else {
		return login_redirect(uri.path());
	};

	let (page, posts) =
		match load_page(&g, PostFilter::FollowedBy(user_id), query.page.as_deref()).await {
			Ok(r) => r,
			Err(e) => return g.server_error(&viewer, e, "Unable to load follow feed"),
		};

	let mut context = Context::new();
	context.insert("page", &page);
	context.insert("posts", &posts);
	context.insert("follow", &true);
	g.render(&viewer, "follow.html.tera", context)
}

pub async fn profile_follow(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
	Path(username): Path<String>,
) -> Response {
	let Some(user) = viewer.user.as_ref() else {
		return login_redirect(uri.path());
	};

	match g.api.follow(user, &username).await {
		Ok(created) => {
			if created {
				debug!("{} now follows {}.", user.username, username);
			}
			redirect(&profile_url(&username))
		}
		Err(e) => g.api_error(&viewer, &uri, e, "Unable to follow"),
	}
}

pub async fn profile_unfollow(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
	Path(username): Path<String>,
) -> Response {
	let Some(user) = viewer.user.as_ref() else {
		return login_redirect(uri.path());
	};

	match g.api.unfollow(user, &username).await {
		Ok(_) => redirect(&profile_url(&username)),
		Err(e) => g.api_error(&viewer, &uri, e, "Unable to unfollow"),
	}
}
