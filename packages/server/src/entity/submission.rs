use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submission")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    pub language: String,
    /// Object path of the uploaded source file.
    pub source_path: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub compilation_log: Option<String>,

    /// Owning user; live updates are pushed to this user.
    pub user_id: i64,

    pub assignment_id: i64,
    #[sea_orm(belongs_to, from = "assignment_id", to = "id")]
    pub assignment: HasOne<super::assignment::Entity>,

    #[sea_orm(has_many)]
    pub results: HasMany<super::submission_result::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
