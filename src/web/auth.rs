use std::sync::Arc;

use axum::{
	extract::{Query, State},
	http::Uri,
	response::{IntoResponse, Response},
	routing::get,
	Extension, Form, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use log::*;
use serde::Deserialize;
use tera::Context;

use super::{common::*, Global, Viewer, SESSION_COOKIE};
use crate::{
	api,
	model::{FormErrors, LoginForm, SignupForm},
};


#[derive(Default, Deserialize)]
struct NextQuery {
	next: Option<String>,
}


pub fn router() -> Router<Arc<Global>> {
	Router::new()
		.route("/auth/login/", get(login).post(login_post))
		.route("/auth/logout/", get(logout))
		.route("/auth/signup/", get(signup).post(signup_post))
}


fn session_cookie(token: String) -> Cookie<'static> {
	Cookie::build((SESSION_COOKIE, token))
		.path("/")
		.http_only(true)
		.same_site(SameSite::Lax)
		.build()
}

fn render_login(
	g: &Global, viewer: &Viewer, username: &str, next: Option<&str>, failed: bool,
) -> Response {
	let mut context = Context::new();
	context.insert("username", username);
	context.insert("next", &next);
	context.insert("failed", &failed);
	g.render(viewer, "auth/login.html.tera", context)
}

fn render_signup(g: &Global, viewer: &Viewer, form: &SignupForm, errors: &FormErrors) -> Response {
	let mut context = Context::new();
	context.insert("form", form);
	insert_form_errors(
		&mut context,
		errors,
		&["username", "email", "password1", "password2"],
	);
	g.render(viewer, "auth/signup.html.tera", context)
}


async fn login(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Query(query): Query<NextQuery>,
) -> Response {
	render_login(&g, &viewer, "", query.next.as_deref(), false)
}

async fn login_post(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, cookies: CookieJar,
	Form(form): Form<LoginForm>,
) -> Response {
	match g.api.login(&form.username, &form.password).await {
		Ok(Some((user, token))) => {
			debug!("User {} logged in.", user.username);
			let target = safe_redirect_target(form.next.as_deref());
			(cookies.add(session_cookie(token)), redirect(target)).into_response()
		}
		Ok(None) => render_login(&g, &viewer, &form.username, form.next.as_deref(), true),
		Err(e) => g.server_error(&viewer, e, "Unable to log in"),
	}
}

async fn logout(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, cookies: CookieJar,
) -> Response {
	if let Some(token) = &viewer.session {
		if let Err(e) = g.api.logout(token).await {
			return g.server_error(&viewer, e, "Unable to log out");
		}
	}

	let anonymous = Viewer::default();
	let page = g.render(&anonymous, "auth/logged_out.html.tera", Context::new());
	(
		cookies.remove(Cookie::build(SESSION_COOKIE).path("/")),
		page,
	)
		.into_response()
}

async fn signup(State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>) -> Response {
	render_signup(&g, &viewer, &SignupForm::default(), &FormErrors::default())
}

async fn signup_post(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
	cookies: CookieJar, Form(form): Form<SignupForm>,
) -> Response {
	match g.api.signup(&form).await {
		Ok((_, token)) => (cookies.add(session_cookie(token)), redirect("/")).into_response(),
		Err(api::Error::Invalid(errors)) => render_signup(&g, &viewer, &form, &errors),
		Err(e) => g.api_error(&viewer, &uri, e, "Unable to sign up"),
	}
}
