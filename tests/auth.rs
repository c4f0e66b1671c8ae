use axum::http::{header, StatusCode};
use yatube::{db::PersistenceHandle, test::*, web};


#[ctor::ctor]
fn initialize() { env_logger::init(); }

fn session_cookie(response: &axum::response::Response) -> String {
	let set_cookie = response
		.headers()
		.get(header::SET_COOKIE)
		.expect("no session cookie set")
		.to_str()
		.unwrap();
	set_cookie.split(';').next().unwrap().to_string()
}


#[tokio::test]
async fn test_signup_logs_in() {
	let g = load_global("auth-signup").await;
	let router = web::router(g.clone());

	let response = post_form(
		&router,
		"/auth/signup/",
		None,
		&[
			("first_name", "Leo"),
			("last_name", "Tolstoy"),
			("username", "leo"),
			("email", "leo@example.com"),
			("password1", "war and peace"),
			("password2", "war and peace"),
		],
	)
	.await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), "/");
	let cookie = session_cookie(&response);
	assert!(cookie.starts_with("sessionid="));

	let user = g
		.api
		.db
		.find_user_by_username("leo")
		.await
		.unwrap()
		.expect("user not created");
	assert_eq!(user.email, "leo@example.com");

	let html = body_text(get(&router, "/", Some(&cookie)).await).await;
	assert!(html.contains("Leo Tolstoy"));
	assert!(html.contains("/auth/logout/"));
}

#[tokio::test]
async fn test_signup_with_mismatching_passwords() {
	let g = load_global("auth-signup-invalid").await;
	let router = web::router(g.clone());

	let response = post_form(
		&router,
		"/auth/signup/",
		None,
		&[
			("username", "leo"),
			("password1", "war and peace"),
			("password2", "anna karenina"),
		],
	)
	.await;
	assert_eq!(response.status(), StatusCode::OK);
	assert!(response.headers().get(header::SET_COOKIE).is_none());
	assert!(g
		.api
		.db
		.find_user_by_username("leo")
		.await
		.unwrap()
		.is_none());
}

#[tokio::test]
async fn test_signup_with_taken_username() {
	let g = load_global("auth-signup-taken").await;
	let router = web::router(g.clone());
	create_user(&g.api.db, "leo").await;

	let response = post_form(
		&router,
		"/auth/signup/",
		None,
		&[
			("username", "leo"),
			("password1", "war and peace"),
			("password2", "war and peace"),
		],
	)
	.await;
	assert_eq!(response.status(), StatusCode::OK);
	assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_login_redirects_to_next() {
	let g = load_global("auth-login").await;
	let router = web::router(g.clone());
	create_user(&g.api.db, "leo").await;

	let response = post_form(
		&router,
		"/auth/login/",
		None,
		&[
			("username", "leo"),
			("password", TEST_PASSWORD),
			("next", "/new/"),
		],
	)
	.await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), "/new/");

	let cookie = session_cookie(&response);
	let response = get(&router, "/new/", Some(&cookie)).await;
	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_ignores_offsite_next() {
	let g = load_global("auth-login-offsite").await;
	let router = web::router(g.clone());
	create_user(&g.api.db, "leo").await;

	let response = post_form(
		&router,
		"/auth/login/",
		None,
		&[
			("username", "leo"),
			("password", TEST_PASSWORD),
			("next", "//evil.example.com/"),
		],
	)
	.await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_login_with_wrong_password() {
	let g = load_global("auth-login-wrong").await;
	let router = web::router(g.clone());
	create_user(&g.api.db, "leo").await;

	let response = post_form(
		&router,
		"/auth/login/",
		None,
		&[("username", "leo"), ("password", "not the password")],
	)
	.await;
	assert_eq!(response.status(), StatusCode::OK);
	assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_logout_ends_session() {
	let g = load_global("auth-logout").await;
	let router = web::router(g.clone());
	let user = create_user(&g.api.db, "leo").await;
	let cookie = login(&g.api, &user).await;

	let response = get(&router, "/new/", Some(&cookie)).await;
	assert_eq!(response.status(), StatusCode::OK);

	let response = get(&router, "/auth/logout/", Some(&cookie)).await;
	assert_eq!(response.status(), StatusCode::OK);

	// The old cookie doesn't work anymore
	let response = get(&router, "/new/", Some(&cookie)).await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert!(location(&response).starts_with("/auth/login/"));
}
