use common::ResultStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per (submission, testcase), created as `GRADING` together with the
/// submission and moved to a terminal status by the result consumer.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submission_result")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub submission_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub testcase_id: i64,

    pub status: ResultStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub status_detail: Option<String>,

    pub memory_usage: Option<i64>, // in KiB
    pub time_usage: Option<i64>,   // in milliseconds

    #[sea_orm(belongs_to, from = "submission_id", to = "id")]
    pub submission: HasOne<super::submission::Entity>,
    #[sea_orm(belongs_to, from = "testcase_id", to = "id")]
    pub testcase: HasOne<super::testcase::Entity>,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
