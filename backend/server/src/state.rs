use std::sync::Arc;

use bank::store::{Database, RedisStore};
use tokio::sync::watch;

use super::{
    auth::AuthService,
    config::{Config, StoreBackend},
    runtime::SurveyRuns,
    storage::AvatarStore,
};

pub struct State {
    pub config: Config,
    pub db: Database,
    pub auth: AuthService,
    pub avatars: AvatarStore,
    pub runs: SurveyRuns,
    shutdown: watch::Sender<bool>,
}

impl State {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let db = match config.store_backend {
            StoreBackend::Redis => {
                let store = RedisStore::connect(&config.redis_url)
                    .await
                    .expect("Failed to connect to Redis");
                Database::new(Arc::new(store))
            }
            StoreBackend::Memory => Database::memory(),
        };

        Self::with_database(config, db)
    }

    pub fn with_database(config: Config, db: Database) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);

        Arc::new(Self {
            auth: AuthService::new(db.clone()),
            avatars: AvatarStore::new(config.avatar_dir.clone()),
            runs: SurveyRuns::default(),
            shutdown,
            config,
            db,
        })
    }

    /// Ends every open profile stream so graceful shutdown can finish.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once [`State::shutdown`] has been called, even if that was
    /// before this future was created.
    pub fn on_shutdown(&self) -> impl Future<Output = ()> + Send + 'static + use<> {
        let mut rx = self.shutdown.subscribe();

        async move {
            let _ = rx.wait_for(|stopped| *stopped).await;
        }
    }
}
