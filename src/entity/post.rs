use sea_orm::entity::prelude::*;

use crate::util::truncate_chars;


#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "post")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = true)]
	pub id: i64,
	#[sea_orm(column_type = "Text")]
	pub text: String,
	/// Milliseconds since the Unix epoch, set on creation.
	pub pub_date: i64,
	pub author_id: i64,
	pub group_id: Option<i64>,
	/// Path of the image, relative to the media directory.
	pub image: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::user::Entity",
		from = "Column::AuthorId",
		to = "super::user::Column::Id",
		on_delete = "Cascade"
	)]
	Author,
	#[sea_orm(
		belongs_to = "super::group::Entity",
		from = "Column::GroupId",
		to = "super::group::Column::Id",
		on_delete = "SetNull"
	)]
	Group,
	#[sea_orm(has_many = "super::comment::Entity")]
	Comment,
}

impl Model {
	/// A short label for the post, being the start of its text.
	pub fn label(&self) -> &str { truncate_chars(&self.text, 15) }
}

impl Related<super::user::Entity> for Entity {
	fn to() -> RelationDef { Relation::Author.def() }
}

impl Related<super::group::Entity> for Entity {
	fn to() -> RelationDef { Relation::Group.def() }
}

impl Related<super::comment::Entity> for Entity {
	fn to() -> RelationDef { Relation::Comment.def() }
}

impl ActiveModelBehavior for ActiveModel {}
