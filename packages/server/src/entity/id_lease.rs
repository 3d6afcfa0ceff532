use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Instance slot held by a running process for its machine tag.
///
/// A row is live until `expires_at`; the holder renews it periodically and
/// any process may take over an expired slot.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "id_lease")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub machine_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub instance: i32,

    /// Random token identifying the owning process.
    pub holder: String,
    pub expires_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
