use std::fmt::{Debug, Display};

use ::serde::Serialize;
use axum::{
	body::Body,
	extract::Multipart,
	http::{header::LOCATION, HeaderValue},
	response::Response,
};
use chrono::*;
use log::*;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tera::Context;

use crate::model::{FileData, FormErrors, PostForm};


/// The characters that are left as they are in a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
	.remove(b'-')
	.remove(b'.')
	.remove(b'_')
	.remove(b'~')
	.remove(b'@')
	.remove(b'+');


/// Anything shown on a page together with the moment it was made.
#[derive(Debug, Serialize)]
pub struct Dated<T> {
	#[serde(flatten)]
	pub inner: T,
	pub date: String,
	pub time_ago: String,
}


pub fn dated<T>(inner: T, timestamp: i64) -> Dated<T> {
	let moment = Utc
		.timestamp_millis_opt(timestamp)
		.single()
		.unwrap_or_default();
	let time_ago = human_readable_duration(&Utc::now().signed_duration_since(moment));
	Dated {
		inner,
		date: format!("{}", moment.format("%d %b %Y %H:%M")),
		time_ago,
	}
}

pub fn human_readable_duration(duration: &Duration) -> String {
	fn plural(count: i64, unit: &str) -> String {
		if count == 1 {
			format!("{} {}", count, unit)
		} else {
			format!("{} {}s", count, unit)
		}
	}

	if duration.num_weeks() > 0 {
		plural(duration.num_weeks(), "week")
	} else if duration.num_days() > 0 {
		plural(duration.num_days(), "day")
	} else if duration.num_hours() > 0 {
		plural(duration.num_hours(), "hour")
	} else if duration.num_minutes() > 0 {
		plural(duration.num_minutes(), "minute")
	} else {
		plural(duration.num_seconds().max(0), "second")
	}
}

/// Makes the errors of each field available to the template as
/// `<field>_errors`.
pub fn insert_form_errors(context: &mut Context, errors: &FormErrors, fields: &[&str]) {
	for field in fields {
		context.insert(format!("{}_errors", field), errors.get(field));
	}
}

/// Collects the fields of a submitted post form.
pub async fn read_post_form(mut form: Multipart) -> Result<PostForm, Response> {
	let mut post_form = PostForm::default();

	loop {
		let field = match form.next_field().await {
			Ok(Some(f)) => f,
			Ok(None) => break,
			Err(e) => return Err(error_response(400, format!("malformed form data: {}", e))),
		};
		let name = field.name().unwrap_or_default().to_string();

		match name.as_str() {
			"text" => match field.text().await {
				Ok(text) => post_form.text = text,
				Err(e) => return Err(error_response(400, format!("unreadable text: {}", e))),
			},
			"group" => match field.text().await {
				Ok(group) => post_form.group = Some(group),
				Err(e) => return Err(error_response(400, format!("unreadable group: {}", e))),
			},
			"image" => {
				let file_name = field.file_name().unwrap_or_default().to_string();
				let mime_type = field
					.content_type()
					.unwrap_or("application/octet-stream")
					.to_string();
				let data = match field.bytes().await {
					Ok(b) => b,
					Err(e) => return Err(error_response(413, format!("image too large: {}", e))),
				};
				// Browsers send an empty file field when nothing was selected
				if data.len() == 0 {
					continue;
				}
				post_form.image = Some(FileData {
					file_name,
					mime_type,
					data: data.to_vec(),
				});
			}
			"image-clear" => post_form.clear_image = true,
			other => warn!("Unrecognized post form field: {}", other),
		}
	}
	Ok(post_form)
}

/// Only allows redirects to paths on this site.
pub fn safe_redirect_target(next: Option<&str>) -> &str {
	match next {
		Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') =>
			path,
		_ => "/",
	}
}

/// Percent-encodes a value so that it can be used as a single path segment,
/// like usernames in URLs.
pub fn encode_path_segment(segment: &str) -> String {
	utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

pub fn post_url(username: &str, post_id: i64) -> String {
	format!("/{}/{}/", encode_path_segment(username), post_id)
}

pub fn profile_url(username: &str) -> String { format!("/{}/", encode_path_segment(username)) }

pub fn redirect(location: &str) -> Response {
	let value = match HeaderValue::from_str(location) {
		Ok(v) => v,
		Err(_) => {
			warn!("Not redirecting to invalid location {:?}.", location);
			HeaderValue::from_static("/")
		}
	};
	Response::builder()
		.status(302)
		.header(LOCATION, value)
		.body(Body::empty())
		.unwrap()
}

pub fn login_redirect(next: &str) -> Response {
	let query = serde_urlencoded::to_string([("next", next)]).unwrap_or_default();
	redirect(&format!("/auth/login/?{}", query))
}

pub fn error_response<S>(status_code: u16, message: S) -> Response
where
	S: Into<String>,
{
	let string: String = message.into();
	if status_code >= 400 {
		warn!("HTTP {} error: {}", status_code, &string);
	}
	Response::builder()
		.status(status_code)
		.header("Content-Type", "text/plain")
		.body(Body::from(string))
		.unwrap()
}

pub fn server_error_response<E>(e: E, message: &str) -> Response
where
	E: Debug + Display,
{
	error!("{}: {:?}", message, e);
	error_response(500, format!("{}: {}", message, e))
}
