use std::sync::Arc;

use axum::{extract::State, response::Response, routing::get, Extension, Router};
use tera::Context;

use super::{Global, Viewer};


pub fn router() -> Router<Arc<Global>> {
	Router::new()
		.route("/about/author/", get(author))
		.route("/about/tech/", get(tech))
}


async fn author(State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>) -> Response {
	g.render(&viewer, "about/author.html.tera", Context::new())
}

async fn tech(State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>) -> Response {
	g.render(&viewer, "about/tech.html.tera", Context::new())
}
