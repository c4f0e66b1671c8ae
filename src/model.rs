//! The forms that users submit, and the validation that can be done on them
//! without consulting the database.

use std::collections::BTreeMap;

use garde::Validate;
use img_parts::{Bytes, DynImage};
use serde::{Deserialize, Serialize};


const REQUIRED: &str = "This field is required.";

pub const USERNAME_MAX_LENGTH: usize = 150;
pub const GROUP_TITLE_MAX_LENGTH: usize = 200;
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Usernames that would be shadowed by the site's own routes.
pub const RESERVED_USERNAMES: &[&str] =
	&["about", "auth", "follow", "group", "media", "new", "rss", "static"];


#[derive(Clone, Debug, Default)]
pub struct FileData {
	pub file_name: String,
	pub mime_type: String,
	pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ImageFormat {
	Jpeg,
	Png,
	Webp,
}

/// The validation errors of a form, listed per field name.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

#[derive(Clone, Debug, Default, Serialize, Validate)]
pub struct PostForm {
	#[garde(custom(not_blank))]
	pub text: String,
	/// The ID of the selected group, as submitted.
	#[garde(custom(optional_id))]
	pub group: Option<String>,
	#[serde(skip)]
	#[garde(skip)]
	pub image: Option<FileData>,
	/// Set when the user wants to remove the current image.
	#[serde(skip)]
	#[garde(skip)]
	pub clear_image: bool,
}

/// The result of a `PostForm` that has passed validation.
#[derive(Debug)]
pub struct CleanPostForm<'a> {
	pub text: &'a str,
	pub group_id: Option<i64>,
	pub image: Option<(ImageFormat, &'a FileData)>,
	pub clear_image: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, Validate)]
pub struct CommentForm {
	#[serde(default)]
	#[garde(custom(not_blank))]
	pub text: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoginForm {
	#[serde(default)]
	pub username: String,
	#[serde(default)]
	pub password: String,
	pub next: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, Validate)]
pub struct SignupForm {
	#[serde(default)]
	#[garde(skip)]
	pub first_name: String,
	#[serde(default)]
	#[garde(skip)]
	pub last_name: String,
	#[serde(default)]
	#[garde(
		custom(not_blank),
		length(chars, max = USERNAME_MAX_LENGTH),
		pattern(r"^[\w.@+-]*$"),
		custom(not_reserved)
	)]
	pub username: String,
	#[serde(default)]
	#[garde(custom(optional_email))]
	pub email: String,
	#[serde(default, skip_serializing)]
	#[garde(length(chars, min = PASSWORD_MIN_LENGTH))]
	pub password1: String,
	#[serde(default, skip_serializing)]
	#[garde(skip)]
	pub password2: String,
}

/// A new group, as made by the administrator.
#[derive(Clone, Debug, Default, Validate)]
pub struct GroupForm {
	#[garde(custom(not_blank), length(chars, max = GROUP_TITLE_MAX_LENGTH))]
	pub title: String,
	#[garde(custom(not_blank), pattern(r"^[-a-zA-Z0-9_]*$"))]
	pub slug: String,
	#[garde(skip)]
	pub description: String,
}


fn not_blank(value: &str, _ctx: &()) -> garde::Result {
	if value.trim().is_empty() {
		Err(garde::Error::new(REQUIRED))
	} else {
		Ok(())
	}
}

fn not_reserved(value: &str, _ctx: &()) -> garde::Result {
	if RESERVED_USERNAMES.contains(&value.to_lowercase().as_str()) {
		Err(garde::Error::new("This username is not available."))
	} else {
		Ok(())
	}
}

#[allow(clippy::ref_option)]
fn optional_id(value: &Option<String>, _ctx: &()) -> garde::Result {
	match value.as_deref().map(str::trim) {
		None | Some("") => Ok(()),
		Some(id) => id
			.parse::<i64>()
			.map(|_| ())
			.map_err(|_| garde::Error::new("Select a valid choice.")),
	}
}

/// The email address is optional, but has to be valid when given.
fn optional_email(value: &str, _ctx: &()) -> garde::Result {
	if value.is_empty() {
		return Ok(());
	}
	garde::rules::email::apply(&value, ())
}


impl FormErrors {
	pub fn add(&mut self, field: &str, message: impl Into<String>) {
		self.0
			.entry(field.to_string())
			.or_insert_with(Vec::new)
			.push(message.into());
	}

	pub fn get(&self, field: &str) -> &[String] {
		self.0.get(field).map(|v| v.as_slice()).unwrap_or(&[])
	}

	pub fn is_empty(&self) -> bool { self.0.is_empty() }

	pub fn single(field: &str, message: impl Into<String>) -> Self {
		let mut errors = Self::default();
		errors.add(field, message);
		errors
	}
}

impl From<garde::Report> for FormErrors {
	fn from(report: garde::Report) -> Self {
		let mut errors = Self::default();
		for (path, error) in report.iter() {
			errors.add(&path.to_string(), error.to_string());
		}
		errors
	}
}

impl ImageFormat {
	/// Parses the file as an image. Anything that isn't a complete JPEG, PNG
	/// or WebP image is refused.
	pub fn detect(data: &[u8]) -> Option<Self> {
		match DynImage::from_bytes(Bytes::copy_from_slice(data)) {
			Ok(Some(DynImage::Jpeg(_))) => Some(Self::Jpeg),
			Ok(Some(DynImage::Png(_))) => Some(Self::Png),
			Ok(Some(DynImage::WebP(_))) => Some(Self::Webp),
			Ok(None) | Err(_) => None,
		}
	}

	pub fn extension(&self) -> &'static str {
		match self {
			Self::Jpeg => "jpg",
			Self::Png => "png",
			Self::Webp => "webp",
		}
	}
}

impl PostForm {
	/// Checks everything that can be checked without the database. Whether the
	/// selected group exists is up to the caller.
	pub fn clean(&self) -> Result<CleanPostForm<'_>, FormErrors> {
		let mut errors = match self.validate(&()) {
			Ok(()) => FormErrors::default(),
			Err(report) => FormErrors::from(report),
		};

		let image = match &self.image {
			None => None,
			Some(file) => match ImageFormat::detect(&file.data) {
				Some(format) => Some((format, file)),
				None => {
					errors.add(
						"image",
						"Upload a valid image. The file you uploaded was either not an image or a \
						 corrupted image.",
					);
					None
				}
			},
		};
		if !errors.is_empty() {
			return Err(errors);
		}

		Ok(CleanPostForm {
			text: self.text.trim(),
			group_id: self
				.group
				.as_deref()
				.and_then(|id| id.trim().parse().ok()),
			image,
			clear_image: self.clear_image,
		})
	}
}

impl CommentForm {
	pub fn clean(&self) -> Result<&str, FormErrors> {
		self.validate(&())?;
		Ok(self.text.trim())
	}
}

impl GroupForm {
	pub fn clean(&self) -> Result<(), FormErrors> { Ok(self.validate(&())?) }
}

impl SignupForm {
	/// Checks everything except whether the username is already taken.
	pub fn clean(&self) -> Result<(), FormErrors> {
		let mut errors = match self.validate(&()) {
			Ok(()) => FormErrors::default(),
			Err(report) => FormErrors::from(report),
		};
		if self.password1 != self.password2 {
			errors.add("password2", "The two password fields didn't match.");
		}

		if errors.is_empty() {
			Ok(())
		} else {
			Err(errors)
		}
	}
}
