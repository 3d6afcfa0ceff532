//! Instance-slot leasing for the id generator.
//!
//! Processes sharing a machine tag would mint the same ids in the same
//! millisecond, so each one leases a distinct instance slot from the database
//! before it starts minting and keeps renewing it while it runs.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use common::IdGenerator;
use common::id::{IdError, MAX_MACHINE_ID};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::IdConfig;
use crate::store::{ResultStore, StoreError};

/// A held instance slot.
#[derive(Debug)]
pub struct IdLease {
    store: ResultStore,
    machine_id: u16,
    instance: u16,
    holder: String,
    ttl: Duration,
    claimed_at: DateTime<Utc>,
}

impl IdLease {
    /// Claim a slot for `config.machine_id` and build a generator on it.
    ///
    /// Fails with [`StoreError::NoFreeIdInstance`] when every slot under the
    /// tag is held by a live process.
    pub async fn acquire(
        store: ResultStore,
        config: &IdConfig,
    ) -> Result<(IdGenerator, Self), StoreError> {
        if config.machine_id > MAX_MACHINE_ID {
            return Err(IdError::MachineIdOutOfRange(config.machine_id).into());
        }

        let holder = Uuid::new_v4().to_string();
        let ttl = Duration::seconds(config.lease_ttl_secs as i64);
        let claimed_at = Utc::now();
        let instance = store
            .claim_id_instance(config.machine_id, &holder, ttl)
            .await?;

        let generator = IdGenerator::new(config.machine_id, instance)?;

        Ok((
            generator,
            Self {
                store,
                machine_id: config.machine_id,
                instance,
                holder,
                ttl,
                claimed_at,
            },
        ))
    }

    pub fn instance(&self) -> u16 {
        self.instance
    }

    /// Renew the lease every third of its TTL until it is lost.
    ///
    /// Returns once another process owns the slot or the lease ran out while
    /// the database was unreachable. Ids must not be minted after that.
    pub async fn keep_alive(&self) -> StoreError {
        let period = (self.ttl / 3)
            .to_std()
            .unwrap_or_default()
            .max(StdDuration::from_millis(100));
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        let mut valid_until = self.claimed_at + self.ttl;

        loop {
            interval.tick().await;

            let attempted_at = Utc::now();
            match self
                .store
                .renew_id_lease(self.machine_id, self.instance, &self.holder, self.ttl)
                .await
            {
                Ok(true) => valid_until = attempted_at + self.ttl,
                Ok(false) => {
                    error!(
                        machine_id = self.machine_id,
                        instance = self.instance,
                        "Id instance lease taken over by another process"
                    );
                    return StoreError::IdLeaseLost(self.machine_id, self.instance);
                }
                Err(e) => {
                    warn!(error = %e, instance = self.instance, "Failed to renew id instance lease");
                    if Utc::now() >= valid_until {
                        error!(
                            machine_id = self.machine_id,
                            instance = self.instance,
                            "Id instance lease expired before it could be renewed"
                        );
                        return StoreError::IdLeaseLost(self.machine_id, self.instance);
                    }
                }
            }
        }
    }

    /// Give the slot back so a restarted process can reuse it right away.
    pub async fn release(&self) {
        match self
            .store
            .release_id_lease(self.machine_id, self.instance, &self.holder)
            .await
        {
            Ok(()) => info!(instance = self.instance, "Released id instance lease"),
            Err(e) => warn!(error = %e, "Failed to release id instance lease"),
        }
    }
}
