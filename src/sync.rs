//! Runs intel modules in order against one graph session.

use crate::client::{GraphSession, Neo4jSession};
use crate::config::Config;
use crate::error::Result;
use crate::intel::azure::start_azure_ingestion;
use crate::util::timeit;
use async_trait::async_trait;
use colored::Colorize;

/// One step of a [`Sync`], usually an intel module.
#[async_trait]
pub trait SyncStage: Send + std::marker::Sync {
    async fn run(&self, session: &dyn GraphSession, config: &Config, update_tag: i64)
        -> Result<()>;
}

pub struct AzureStage;

#[async_trait]
impl SyncStage for AzureStage {
    async fn run(
        &self,
        session: &dyn GraphSession,
        config: &Config,
        update_tag: i64,
    ) -> Result<()> {
        start_azure_ingestion(session, config, update_tag).await
    }
}

/// Ordered, named stages. Stage names are unique; adding a name again replaces that stage in place.
#[derive(Default)]
pub struct Sync {
    stages: Vec<(String, Box<dyn SyncStage>)>,
}

impl Sync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(&mut self, name: impl Into<String>, stage: Box<dyn SyncStage>) {
        let name = name.into();
        match self.stages.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = stage,
            None => self.stages.push((name, stage)),
        }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Runs every stage in order; the first failure stops the sync.
    pub async fn run(&self, session: &dyn GraphSession, config: &Config, update_tag: i64) -> Result<()> {
        log::info!("Starting sync with update tag '{update_tag}'");
        for (name, stage) in &self.stages {
            log::info!("Starting sync stage '{}'", name.cyan());
            if let Err(e) = timeit(name, stage.run(session, config, update_tag)).await {
                log::error!("{} in sync stage '{name}': {e}", "Unhandled exception".on_red());
                return Err(e);
            }
            log::info!("Finishing sync stage '{name}'");
        }
        log::info!("Finishing sync with update tag '{update_tag}'");
        Ok(())
    }
}

pub fn build_default_sync() -> Sync {
    let mut sync = Sync::new();
    sync.add_stage("azure", Box::new(AzureStage));
    sync
}

/// The configured tag, or the current epoch seconds.
pub fn update_tag(config: &Config) -> i64 {
    config
        .update_tag
        .unwrap_or_else(|| chrono::Utc::now().timestamp())
}

/// Connects to Neo4j and runs `sync`.
pub async fn run_with_config(sync: &Sync, config: &Config) -> Result<()> {
    let session = Neo4jSession::connect(config).await?;
    sync.run(&session, config, update_tag(config)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::recording::RecordingSession;
    use crate::error::Error;
    use std::sync::{Arc, Mutex};

    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<(&'static str, i64)>>>,
        fail: bool,
    }

    #[async_trait]
    impl SyncStage for Probe {
        async fn run(&self, _: &dyn GraphSession, _: &Config, update_tag: i64) -> Result<()> {
            self.log.lock().unwrap().push((self.name, update_tag));
            if self.fail {
                return Err(Error::Vendor(format!("{} failed", self.name)));
            }
            Ok(())
        }
    }

    fn recorder_stage(name: &'static str, log: &Arc<Mutex<Vec<(&'static str, i64)>>>, fail: bool) -> Box<dyn SyncStage> {
        Box::new(Probe {
            name,
            log: Arc::clone(log),
            fail,
        })
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sync = Sync::new();
        sync.add_stage("first", recorder_stage("first", &log, false));
        sync.add_stage("second", recorder_stage("second", &log, false));
        sync.run(&RecordingSession::new(), &Config::default(), 42)
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec![("first", 42), ("second", 42)]);
    }

    #[tokio::test]
    async fn test_first_failure_stops_sync() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sync = Sync::new();
        sync.add_stage("first", recorder_stage("first", &log, true));
        sync.add_stage("second", recorder_stage("second", &log, false));
        let err = sync
            .run(&RecordingSession::new(), &Config::default(), 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("first failed"));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_add_stage_replaces_by_name() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sync = build_default_sync();
        sync.add_stage("extra", recorder_stage("extra", &log, false));
        sync.add_stage("azure", recorder_stage("azure", &log, false));
        assert_eq!(sync.stage_names(), vec!["azure", "extra"]);
    }

    #[test]
    fn test_update_tag_from_config() {
        let config = Config {
            update_tag: Some(123),
            ..Config::default()
        };
        assert_eq!(update_tag(&config), 123);
        assert!(update_tag(&Config::default()) > 1_600_000_000);
    }
}
