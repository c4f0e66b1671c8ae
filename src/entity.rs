//! The database entities, as seen by sea-orm.

pub mod comment;
pub mod follow;
pub mod group;
pub mod post;
pub mod session;
pub mod user;

pub mod prelude {
	pub use super::{
		comment::Entity as Comment, follow::Entity as Follow, group::Entity as Group,
		post::Entity as Post, session::Entity as Session, user::Entity as User,
	};
}
