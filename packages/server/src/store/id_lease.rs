use chrono::{Duration, Utc};
use common::id::MAX_INSTANCE;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DbErr, EntityTrait, QueryFilter, Set};
use tracing::{debug, info};

use super::{ResultStore, StoreError};
use crate::entity::id_lease;

impl ResultStore {
    /// Claim a free or expired instance slot under `machine_id`.
    ///
    /// Each attempt is a single conditional statement, so two processes racing
    /// for the same slot cannot both win it.
    pub async fn claim_id_instance(
        &self,
        machine_id: u16,
        holder: &str,
        ttl: Duration,
    ) -> Result<u16, StoreError> {
        for instance in 0..=MAX_INSTANCE {
            let now = Utc::now();
            let expires_at = now + ttl;

            let row = id_lease::ActiveModel {
                machine_id: Set(machine_id as i32),
                instance: Set(instance as i32),
                holder: Set(holder.to_string()),
                expires_at: Set(expires_at),
            };
            let inserted = match id_lease::Entity::insert(row)
                .on_conflict(
                    OnConflict::columns([id_lease::Column::MachineId, id_lease::Column::Instance])
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&self.db)
                .await
            {
                Ok(rows) => rows,
                Err(DbErr::RecordNotInserted) => 0,
                Err(e) => return Err(e.into()),
            };

            let claimed = inserted == 1
                || id_lease::Entity::update_many()
                    .col_expr(id_lease::Column::Holder, Expr::value(holder))
                    .col_expr(id_lease::Column::ExpiresAt, Expr::value(expires_at))
                    .filter(id_lease::Column::MachineId.eq(machine_id as i32))
                    .filter(id_lease::Column::Instance.eq(instance as i32))
                    .filter(id_lease::Column::ExpiresAt.lt(now))
                    .exec(&self.db)
                    .await?
                    .rows_affected
                    == 1;

            if claimed {
                info!(machine_id, instance, "Claimed id instance");
                return Ok(instance);
            }
        }

        Err(StoreError::NoFreeIdInstance(machine_id))
    }

    /// Push the lease's expiry forward. Returns `false` if `holder` no longer
    /// owns the slot.
    pub async fn renew_id_lease(
        &self,
        machine_id: u16,
        instance: u16,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let res = id_lease::Entity::update_many()
            .col_expr(id_lease::Column::ExpiresAt, Expr::value(Utc::now() + ttl))
            .filter(id_lease::Column::MachineId.eq(machine_id as i32))
            .filter(id_lease::Column::Instance.eq(instance as i32))
            .filter(id_lease::Column::Holder.eq(holder))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    pub async fn release_id_lease(
        &self,
        machine_id: u16,
        instance: u16,
        holder: &str,
    ) -> Result<(), StoreError> {
        id_lease::Entity::delete_many()
            .filter(id_lease::Column::MachineId.eq(machine_id as i32))
            .filter(id_lease::Column::Instance.eq(instance as i32))
            .filter(id_lease::Column::Holder.eq(holder))
            .exec(&self.db)
            .await?;
        debug!(machine_id, instance, "Released id instance");
        Ok(())
    }
}
