use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use autograde_server::auth::JwtAuthenticator;
use autograde_server::config::{AppConfig, StorageConfig};
use autograde_server::consumers::ResultConsumer;
use autograde_server::database::init_db;
use autograde_server::grading::{GradingDispatcher, SubmissionService};
use autograde_server::hub::{self, Hub, Notifier, PingHandler};
use autograde_server::ids::IdLease;
use autograde_server::state::AppState;
use autograde_server::store::ResultStore;
use common::storage::ObjectStore;
use common::storage::filesystem::FilesystemObjectStore;
use mq::{Broker, MqConfig, RedisBroker};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

async fn build_object_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    #[cfg(feature = "object-storage")]
    if let Some(settings) = &config.s3 {
        let store = common::storage::s3::S3ObjectStore::new(settings)?;
        info!(bucket = %settings.bucket, "Using S3 object store");
        return Ok(Arc::new(store));
    }

    let store =
        FilesystemObjectStore::new(PathBuf::from(&config.root), config.max_object_size).await?;
    info!(root = %config.root, "Using filesystem object store");
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    let db = init_db(&config.database)
        .await
        .context("failed to connect to database")?;
    let store = ResultStore::new(db);

    let broker: Arc<dyn Broker> = Arc::new(
        RedisBroker::connect(&MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await
        .context("failed to connect to message broker")?,
    );

    let objects = build_object_store(&config.storage).await?;
    let (ids, lease) = IdLease::acquire(store.clone(), &config.ids)
        .await
        .context("failed to lease an id instance")?;
    info!(
        machine_id = config.ids.machine_id,
        instance = lease.instance(),
        "Minting ids"
    );
    let dispatcher = Arc::new(GradingDispatcher::new(
        Arc::clone(&broker),
        &config.storage.public_base_url,
        config.mq.request_queue.clone(),
    )?);
    let submissions = SubmissionService::new(store.clone(), objects, dispatcher, Arc::new(ids));

    let hub = Arc::new(Hub::new(&config.hub));
    hub.register_handler("ping", Arc::new(PingHandler));
    let (notifier, notifications) = Notifier::channel(config.hub.notification_buffer);
    tokio::spawn(hub::run_dispatcher(Arc::clone(&hub), notifications));

    let consumer = Arc::new(ResultConsumer::new(
        store.clone(),
        Arc::clone(&broker),
        notifier,
        config.mq.response_queue.clone(),
        config.consumer.max_in_flight,
    ));
    tokio::spawn(async move {
        if let Err(e) = consumer.run().await {
            error!(error = %e, "Grading result consumer stopped unexpectedly");
        }
    });

    let state = AppState {
        store,
        submissions,
        hub,
        authenticator: Arc::new(JwtAuthenticator::new(&config.auth.jwt_secret)),
    };
    let app = autograde_server::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    info!("Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .into_future();

    // Stop serving once the id lease is gone: another process may be minting
    // on the same instance slot.
    tokio::select! {
        res = server => {
            lease.release().await;
            res?;
        }
        err = lease.keep_alive() => {
            return Err(err).context("stopped minting ids");
        }
    }

    Ok(())
}
