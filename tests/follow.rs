use axum::http::StatusCode;
use yatube::{
	db::{PersistenceHandle, PostFilter},
	test::*,
	web,
};


#[ctor::ctor]
fn initialize() { env_logger::init(); }


#[tokio::test]
async fn test_follow_and_unfollow() {
	let g = load_global("follow-toggle").await;
	let router = web::router(g.clone());
	let reader = create_user(&g.api.db, "reader").await;
	let author = create_user(&g.api.db, "author").await;
	let cookie = login(&g.api, &reader).await;

	let response = get(&router, "/author/follow/", Some(&cookie)).await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), "/author/");
	assert_eq!(g.api.db.count_followers(author.id).await.unwrap(), 1);
	assert!(g.api.db.is_following(reader.id, author.id).await.unwrap());

	// Following twice doesn't make a second relation
	get(&router, "/author/follow/", Some(&cookie)).await;
	assert_eq!(g.api.db.count_followers(author.id).await.unwrap(), 1);

	let response = get(&router, "/author/unfollow/", Some(&cookie)).await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(location(&response), "/author/");
	assert_eq!(g.api.db.count_followers(author.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cannot_follow_yourself() {
	let g = load_global("follow-self").await;
	let router = web::router(g.clone());
	let user = create_user(&g.api.db, "narcissus").await;
	let cookie = login(&g.api, &user).await;

	let response = get(&router, "/narcissus/follow/", Some(&cookie)).await;
	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(g.api.db.count_followers(user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_following_unknown_user() {
	let g = load_global("follow-unknown").await;
	let router = web::router(g.clone());
	let user = create_user(&g.api.db, "reader").await;
	let cookie = login(&g.api, &user).await;

	let response = get(&router, "/nobody/follow/", Some(&cookie)).await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_feed_shows_followed_authors_only() {
	let g = load_global("follow-feed").await;
	let router = web::router(g.clone());
	let reader = create_user(&g.api.db, "reader").await;
	let bystander = create_user(&g.api.db, "bystander").await;
	let author = create_user(&g.api.db, "author").await;
	let other = create_user(&g.api.db, "other").await;
	g.api
		.db
		.store_post(author.id, "Worth following", None, None)
		.await
		.unwrap();
	g.api
		.db
		.store_post(other.id, "Not followed by anyone", None, None)
		.await
		.unwrap();

	let reader_cookie = login(&g.api, &reader).await;
	get(&router, "/author/follow/", Some(&reader_cookie)).await;

	let html = body_text(get(&router, "/follow/", Some(&reader_cookie)).await).await;
	assert!(html.contains("Worth following"));
	assert!(!html.contains("Not followed by anyone"));

	let bystander_cookie = login(&g.api, &bystander).await;
	let html = body_text(get(&router, "/follow/", Some(&bystander_cookie)).await).await;
	assert!(!html.contains("Worth following"));
	assert!(!html.contains("Not followed by anyone"));

	assert_eq!(
		g.api
			.db
			.count_posts(PostFilter::FollowedBy(reader.id))
			.await
			.unwrap(),
		1
	);
}

#[tokio::test]
async fn test_profile_shows_follow_button() {
	let g = load_global("follow-profile").await;
	let router = web::router(g.clone());
	let reader = create_user(&g.api.db, "reader").await;
	create_user(&g.api.db, "author").await;
	let cookie = login(&g.api, &reader).await;

	let html = body_text(get(&router, "/author/", Some(&cookie)).await).await;
	assert!(html.contains(">Follow</a>"));

	get(&router, "/author/follow/", Some(&cookie)).await;
	let html = body_text(get(&router, "/author/", Some(&cookie)).await).await;
	assert!(html.contains(">Unfollow</a>"));

	// Nobody to follow on your own profile
	let html = body_text(get(&router, "/reader/", Some(&cookie)).await).await;
	assert!(!html.contains(">Follow</a>"));
	assert!(!html.contains(">Unfollow</a>"));
}
