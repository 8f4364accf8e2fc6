//! fhescore App
//!
//! Startup for a ledger process: logging, settings, the ledger itself with
//! its configured providers, and the service task that owns it.

use std::path::PathBuf;
use std::sync::Arc;

use fhescore_core::{ActorId, DecryptionOracle, HomomorphicEngine, ProofVerifier};
use fhescore_ledger::{
    Clock, Ledger, LedgerError, LedgerHandle, LedgerService, LedgerSettings, SystemClock,
};
use fhescore_logging::LogLevel;
use fhescore_settings::{Settings, SettingsError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

pub const DEFAULT_SERVICE: &str = "fhescore";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("ledger task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// External systems the ledger talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub engine: Arc<dyn HomomorphicEngine>,
    pub oracle: Arc<dyn DecryptionOracle>,
    pub verifier: Arc<dyn ProofVerifier>,
}

/// A running ledger service.
pub struct App {
    pub service: String,
    pub settings: Settings<LedgerSettings>,
    pub handle: LedgerHandle,
    task: JoinHandle<Ledger>,
}

impl App {
    /// Drop the app's handle and wait for the service to drain.
    ///
    /// Clones of [`App::handle`] held elsewhere keep the service alive.
    pub async fn shutdown(self) -> Result<Ledger, AppError> {
        drop(self.handle);
        let ledger = self.task.await?;
        info!(service = %self.service, "ledger service shut down");
        Ok(ledger)
    }
}

pub struct AppBuilder {
    service: String,
    log_level: LogLevel,
    skip_logging: bool,
    skip_banner: bool,
    config_path: Option<PathBuf>,
    owner: Option<ActorId>,
    clock: Arc<dyn Clock>,
}

impl AppBuilder {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            log_level: LogLevel::Info,
            skip_logging: false,
            skip_banner: false,
            config_path: None,
            owner: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.log_level = LogLevel::from_verbose(verbose);
        self
    }

    pub fn skip_logging(mut self) -> Self {
        self.skip_logging = true;
        self
    }

    pub fn skip_banner(mut self) -> Self {
        self.skip_banner = true;
        self
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Owner to record in the settings file when it names none.
    pub fn owner(mut self, owner: ActorId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Load settings, build the ledger and spawn its service.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self, collaborators: Collaborators) -> Result<App, AppError> {
        if !self.skip_logging {
            fhescore_logging::init(self.log_level);
        }

        let mut settings: Settings<LedgerSettings> =
            Settings::load_or_default(&self.service, self.config_path.as_deref())?;
        if let (None, Some(owner)) = (settings.config.owner, self.owner) {
            settings.update(|c| c.owner = Some(owner))?;
        }

        let config = settings.config.to_config()?;
        let owner = config.owner;
        let mut ledger = Ledger::new(
            config,
            collaborators.engine,
            collaborators.oracle,
            collaborators.verifier,
            self.clock.now(),
        )?;
        for provider in &settings.config.providers {
            ledger.add_provider(&owner, *provider)?;
        }

        if !self.skip_banner {
            info!(
                service = %self.service,
                version = env!("CARGO_PKG_VERSION"),
                owner = %owner,
                providers = settings.config.providers.len(),
                settings = %settings.path().display(),
                "ledger starting"
            );
        }

        let (handle, task) = LedgerService::spawn(ledger, self.clock);
        Ok(App {
            service: self.service,
            settings,
            handle,
            task,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhescore_crypto::mock::{MockEngine, MockOracle};
    use fhescore_ledger::ManualClock;

    const OWNER: ActorId = ActorId::new([1u8; 32]);
    const PROVIDER: ActorId = ActorId::new([2u8; 32]);

    fn mocks() -> (Arc<MockEngine>, Arc<MockOracle>, Collaborators) {
        let engine = Arc::new(MockEngine::new());
        let oracle = Arc::new(MockOracle::new(engine.clone()));
        let collaborators = Collaborators {
            engine: engine.clone(),
            oracle: oracle.clone(),
            verifier: Arc::new(oracle.verifier()),
        };
        (engine, oracle, collaborators)
    }

    #[test]
    fn test_default_service_name() {
        let builder = AppBuilder::default();
        assert_eq!(builder.service, DEFAULT_SERVICE);
        assert_eq!(builder.log_level, LogLevel::Info);
    }

    #[tokio::test]
    async fn test_build_without_owner_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, collaborators) = mocks();
        let result = AppBuilder::new("fhescore-test")
            .skip_logging()
            .skip_banner()
            .config_path(dir.path().join("settings.json"))
            .build(collaborators);
        assert!(matches!(
            result,
            Err(AppError::Ledger(LedgerError::InvalidConfig(_)))
        ));
    }

    #[tokio::test]
    async fn test_builder_records_owner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let (_, _, collaborators) = mocks();

        let app = AppBuilder::new("fhescore-test")
            .skip_logging()
            .skip_banner()
            .config_path(&path)
            .owner(OWNER)
            .build(collaborators)
            .unwrap();
        assert_eq!(app.service, "fhescore-test");
        assert_eq!(app.settings.config.owner, Some(OWNER));

        let saved: Settings<LedgerSettings> = Settings::load(&path).unwrap();
        assert_eq!(saved.config.owner, Some(OWNER));
        app.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_configured_providers_can_submit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings: Settings<LedgerSettings> =
            Settings::load_or_default("fhescore-test", Some(&path)).unwrap();
        settings
            .update(|c| {
                c.owner = Some(OWNER);
                c.providers = vec![PROVIDER];
                c.cooldown_secs = 0;
            })
            .unwrap();

        let (engine, oracle, collaborators) = mocks();
        let app = AppBuilder::new("fhescore-test")
            .skip_logging()
            .skip_banner()
            .config_path(&path)
            .clock(Arc::new(ManualClock::new(500)))
            .build(collaborators)
            .unwrap();

        app.handle.submit(PROVIDER, 1, engine.encrypt(6)).await.unwrap();
        app.handle.submit(PROVIDER, 1, engine.encrypt(7)).await.unwrap();
        let request_id = app.handle.request_decryption(PROVIDER, 1).await.unwrap();
        let result = oracle.fulfill(request_id).unwrap();
        app.handle
            .deliver_decryption(PROVIDER, request_id, result.cleartext, result.proof)
            .await
            .unwrap();

        let ledger = app.shutdown().await.unwrap();
        assert_eq!(ledger.providers(), vec![PROVIDER]);
        let request = ledger.decryption_request(request_id).unwrap();
        assert_eq!(request.aggregate_score, Some(13));
        assert_eq!(request.requested_at, 500);
        assert_eq!(ledger.batch(1).unwrap().opened_at, 500);
    }
}
