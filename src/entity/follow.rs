//! A follow is a subscription of one user (`user_id`) to the posts of another
//! (`author_id`).

use sea_orm::entity::prelude::*;


#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "follow")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = true)]
	pub id: i64,
	/// The follower.
	pub user_id: i64,
	/// The user being followed.
	pub author_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::user::Entity",
		from = "Column::UserId",
		to = "super::user::Column::Id",
		on_delete = "Cascade"
	)]
	Follower,
	#[sea_orm(
		belongs_to = "super::user::Entity",
		from = "Column::AuthorId",
		to = "super::user::Column::Id",
		on_delete = "Cascade"
	)]
	Author,
}

impl ActiveModelBehavior for ActiveModel {}
