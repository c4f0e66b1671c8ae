mod about;
mod auth;
pub mod cache;
pub mod common;
pub mod paginator;
mod posts;

use std::{
	fmt::{Debug, Display},
	io,
	sync::{atomic::*, Arc},
	time::Duration,
};

use ::serde::Serialize;
use axum::{
	body::Body,
	extract::{DefaultBodyLimit, Request, State},
	http::Uri,
	middleware::{from_fn, from_fn_with_state, Next},
	response::Response,
	routing::get,
	Extension, Router,
};
use axum_extra::extract::CookieJar;
use chrono::{TimeZone, Utc};
use log::*;
#[cfg(debug_assertions)]
use rss::validation::Validate;
use rss::{ChannelBuilder, ItemBuilder};
use tera::{Context, Tera};
use tokio::{net::TcpListener, time::sleep};
use tower_http::services::ServeDir;

use self::{cache::PageCache, common::*};
use crate::{
	api::{self, Api},
	config::Config,
	db::{PersistenceHandle, PostFilter},
	entity::*,
};


/// The name of the cookie that holds the session token.
pub const SESSION_COOKIE: &str = "sessionid";
/// Uploads bigger than this are refused.
const MAX_BODY_SIZE: usize = 10_000_000;
const INDEX_CACHE_LIMIT: usize = 1000;
const RSS_ITEM_COUNT: u64 = 20;

pub struct Global {
	pub config: Config,
	pub api: Api,
	pub template_engine: Tera,
	pub index_cache: PageCache,
}

/// The user that is making the request, if any.
#[derive(Clone, Debug, Default)]
pub struct Viewer {
	pub user: Option<user::Model>,
	pub session: Option<String>,
}

#[derive(Serialize)]
struct ViewerInfo<'a> {
	is_authenticated: bool,
	id: Option<i64>,
	username: &'a str,
	name: String,
}

#[derive(Serialize)]
struct SiteInfo<'a> {
	url_base: &'a str,
	year: String,
}


impl Global {
	pub fn load(config: Config, api: Api) -> tera::Result<Self> {
		let mut template_engine = Tera::new(&format!("{}/**/*.tera", config.templates_path))?;
		template_engine.autoescape_on(vec![".html.tera", ".html"]);
		let index_cache = PageCache::new(
			INDEX_CACHE_LIMIT,
			Duration::from_secs(config.index_cache_seconds),
		);

		Ok(Self {
			config,
			api,
			template_engine,
			index_cache,
		})
	}

	/// Responds with an error page for the failed API call.
	pub fn api_error(&self, viewer: &Viewer, uri: &Uri, e: api::Error, message: &str) -> Response {
		match e {
			api::Error::NotFound(what) => {
				debug!("{}: {} not found", message, what);
				self.not_found(viewer, uri)
			}
			other => self.server_error(viewer, other, message),
		}
	}

	pub fn not_found(&self, viewer: &Viewer, uri: &Uri) -> Response {
		let mut context = Context::new();
		context.insert("path", uri.path());
		match self.render_string(viewer, "misc/404.html.tera", context) {
			Ok(html) => html_response(404, html),
			Err(e) => server_error_response(e, "Unable to render not found page"),
		}
	}

	pub fn render(&self, viewer: &Viewer, template_name: &str, context: Context) -> Response {
		match self.render_string(viewer, template_name, context) {
			Err(e) => self.server_error(
				viewer,
				e,
				&format!("Unable to render template \"{}\"", template_name),
			),
			Ok(html) => html_response(200, html),
		}
	}

	pub fn render_string(
		&self, viewer: &Viewer, template_name: &str, context: Context,
	) -> tera::Result<String> {
		let mut complete_context = Context::new();
		complete_context.insert("viewer", &viewer.info());
		complete_context.insert(
			"site",
			&SiteInfo {
				url_base: &self.config.url_base,
				year: Utc::now().format("%Y").to_string(),
			},
		);
		complete_context.extend(context);
		self.template_engine
			.render(template_name, &complete_context)
	}

	/// Logs the error and responds with the generic error page.
	pub fn server_error<E>(&self, viewer: &Viewer, e: E, message: &str) -> Response
	where
		E: Debug + Display,
	{
		error!("{}: {:?}", message, e);
		match self.render_string(viewer, "misc/500.html.tera", Context::new()) {
			Ok(html) => html_response(500, html),
			Err(e2) => server_error_response(e2, "Unable to render server error page"),
		}
	}
}

impl Viewer {
	fn info(&self) -> ViewerInfo<'_> {
		ViewerInfo {
			is_authenticated: self.user.is_some(),
			id: self.user.as_ref().map(|u| u.id),
			username: self.user.as_ref().map(|u| u.username.as_str()).unwrap_or(""),
			name: self.user.as_ref().map(|u| u.display_name()).unwrap_or_default(),
		}
	}

	pub fn id(&self) -> Option<i64> { self.user.as_ref().map(|u| u.id) }

	pub fn is(&self, username: &str) -> bool {
		self.user
			.as_ref()
			.map(|u| u.username == username)
			.unwrap_or(false)
	}
}


fn html_response(status_code: u16, html: String) -> Response {
	Response::builder()
		.status(status_code)
		.header("Content-Type", "text/html; charset=utf-8")
		.body(Body::from(html))
		.unwrap()
}

/// Figures out who is making the request, by their session cookie.
async fn viewer_middleware(
	State(g): State<Arc<Global>>, cookies: CookieJar, mut request: Request, next: Next,
) -> Response {
	let mut viewer = Viewer::default();
	if let Some(cookie) = cookies.get(SESSION_COOKIE) {
		match g.api.session_user(cookie.value()).await {
			Ok(Some(user)) => {
				viewer.user = Some(user);
				viewer.session = Some(cookie.value().to_string());
			}
			Ok(None) => debug!("Ignoring unknown or expired session."),
			Err(e) => return g.server_error(&viewer, e, "Unable to load session"),
		}
	}

	request.extensions_mut().insert(viewer);
	next.run(request).await
}

/// Sends anonymous visitors to the login page, and brings them back here
/// afterwards.
async fn login_required(
	Extension(viewer): Extension<Viewer>, request: Request, next: Next,
) -> Response {
	if viewer.user.is_none() {
		let uri = request.uri();
		let next_path = uri
			.path_and_query()
			.map(|p| p.as_str())
			.unwrap_or(uri.path());
		return login_redirect(next_path);
	}
	next.run(request).await
}

async fn not_found(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
) -> Response {
	g.not_found(&viewer, &uri)
}

async fn rss_feed(State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>) -> Response {
	let posts = match g.api.db.load_posts(PostFilter::All, RSS_ITEM_COUNT, 0).await {
		Ok(p) => p,
		Err(e) => return g.server_error(&viewer, e, "Unable to load posts for RSS feed"),
	};

	let url_base = g.config.url_base.trim_end_matches('/');
	let mut channel_builder = ChannelBuilder::default();
	channel_builder
		.title("Yatube")
		.link(format!("{}/", url_base))
		.description("The latest posts on Yatube.");

	let mut items = Vec::with_capacity(posts.len());
	for post in posts {
		let link = format!("{}{}", url_base, post_url(&post.author.username, post.id));
		let pub_date = Utc
			.timestamp_millis_opt(post.pub_date)
			.single()
			.unwrap_or_default();
		let item = ItemBuilder::default()
			.title(post.label.clone())
			.link(link)
			.author(post.author.name.clone())
			.pub_date(pub_date.to_rfc2822())
			.description(post.text)
			.build();
		items.push(item);
	}
	channel_builder.items(items);
	let channel = channel_builder.build();

	#[cfg(debug_assertions)]
	if let Err(e) = channel.validate() {
		warn!("RSS feed doesn't validate: {}", e);
	}

	Response::builder()
		.header("Content-Type", "application/rss+xml")
		.body(Body::from(channel.to_string()))
		.unwrap()
}

pub fn router(g: Arc<Global>) -> Router {
	let protected = Router::new()
		.route("/new/", get(posts::new_post).post(posts::new_post_post))
		.route("/follow/", get(posts::follow_index))
		.route(
			"/:username/:post_id/edit/",
			get(posts::post_edit).post(posts::post_edit_post),
		)
		.route(
			"/:username/:post_id/comment/",
			axum::routing::post(posts::add_comment),
		)
		.route("/:username/follow/", get(posts::profile_follow))
		.route("/:username/unfollow/", get(posts::profile_unfollow))
		.route_layer(from_fn(login_required));

	Router::new()
		.route("/", get(posts::index))
		.route("/group/:slug", get(posts::group_posts))
		.route("/group/:slug/", get(posts::group_posts))
		.route("/:username/", get(posts::profile))
		.route("/:username/:post_id/", get(posts::post_view))
		.route("/rss", get(rss_feed))
		.merge(protected)
		.merge(about::router())
		.merge(auth::router())
		.nest_service("/static", ServeDir::new(&g.config.static_path))
		.nest_service("/media", ServeDir::new(&g.config.media_path))
		.fallback(not_found)
		.layer(from_fn_with_state(g.clone(), viewer_middleware))
		.layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
		.with_state(g)
}

pub async fn serve(stop_flag: Arc<AtomicBool>, global: Arc<Global>) -> io::Result<()> {
	let addr = format!("{}:{}", global.config.bind_address, global.config.port);
	let app = router(global);

	let listener = TcpListener::bind(&addr).await?;
	info!("Listening on http://{}", addr);
	axum::serve(listener, app)
		.with_graceful_shutdown(async move {
			while !stop_flag.load(Ordering::Relaxed) {
				sleep(Duration::from_secs(1)).await;
			}
			info!("Shutting down web server...");
		})
		.await
}
