use crate::api::v1::AuthGate;
use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::logger::*;
use crate::server::Sweeper;
use crate::settings::Settings;
use sqlx::{MySql, Pool};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SIGNING_KEY_ENV: &str = "JWT_SIGNING_KEY";

pub struct Server {
    pub account_service: Arc<dyn AccountService>,
    pub token_service: Arc<dyn TokenService>,
    pub auth_gate: Arc<AuthGate>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<Pool<MySql>>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let (user_repo, refresh_repo, pool): (
            Arc<dyn UserRepo>,
            Arc<dyn RefreshTokenRepo>,
            Option<Pool<MySql>>,
        ) = match settings.store.backend.as_str() {
            "memory" => (
                Arc::new(MemoryUserRepo::new()),
                Arc::new(MemoryRefreshTokenRepo::new()),
                None,
            ),
            "mysql" => {
                let pool = Pool::<MySql>::connect(&settings.store.mysql_dsn).await?;
                (
                    Arc::new(MySqlUserRepo::new(pool.clone())),
                    Arc::new(MySqlRefreshTokenRepo::new(pool.clone())),
                    Some(pool),
                )
            }
            other => return Err(anyhow::anyhow!("Unknown store backend: {}", other)),
        };

        let key = std::env::var(SIGNING_KEY_ENV)
            .unwrap_or_else(|_| "my-dev-secret-key".to_string())
            .into_bytes();
        let access_ttl = Duration::from_secs(settings.token.access_ttl_minutes * 60);
        let refresh_ttl = Duration::from_secs(settings.token.refresh_ttl_days * 24 * 60 * 60);
        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: settings.token.issuer.clone(),
            audience: settings.token.audience.clone(),
            access_ttl,
            refresh_ttl,
            signing_key: key,
        }));

        let credential_hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2PasswordHasher {});
        let account_service: Arc<dyn AccountService> = Arc::new(RealAccountService::new(
            user_repo.clone(),
            credential_hasher,
        ));
        let token_service: Arc<dyn TokenService> = Arc::new(RealTokenService::new(
            token_codec.clone(),
            refresh_repo.clone(),
            user_repo.clone(),
            refresh_ttl,
        ));
        let auth_gate = Arc::new(AuthGate::new(
            token_codec,
            user_repo.clone(),
            settings.gate.public_paths.iter().cloned(),
        ));

        let cancel = CancellationToken::new();
        let sweeper = Sweeper::new(
            refresh_repo.clone(),
            Duration::from_secs(settings.token.sweep_interval_secs),
            cancel.clone(),
        );
        let sweeper_handle = tokio::spawn(sweeper.run());

        info!("server started");

        Ok(Self {
            account_service,
            token_service,
            auth_gate,
            sweeper_handle: Mutex::new(Some(sweeper_handle)),
            cancel,
            pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        if let Ok(mut lock) = self.sweeper_handle.lock() {
            if let Some(handle) = lock.take() {
                let r = handle.await;
                info!("sweeper handle dropped: {:?}", r);
            }
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
