//! Fixtures shared by unit tests.

use std::sync::Arc;

use tempfile::TempDir;

use crate::config::Config;
use crate::db::Database;
use crate::landing::LandingPage;
use crate::retention::Retention;
use crate::App;

/// A fresh database in a temporary directory. Keep the directory alive for
/// as long as the database is used.
pub async fn test_database() -> (Database, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("pastes.db").display());
    let database = Database::connect(&url).await.expect("open database");
    (database, dir)
}

pub async fn test_app() -> (App, TempDir) {
    test_app_with(|_| ()).await
}

pub async fn test_app_with(configure: impl FnOnce(&mut Config)) -> (App, TempDir) {
    let mut config = Config::default();
    configure(&mut config);
    config.validate().expect("valid test config");

    let (database, dir) = test_database().await;
    let app = App {
        retention: Arc::new(Retention::new(&config.pastes).expect("retention")),
        landing: Arc::new(LandingPage::render(&config).expect("landing page")),
        config: Arc::new(config),
        database,
    };
    (app, dir)
}
