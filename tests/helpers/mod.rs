/// Test helpers and fixtures for model integration tests
///
/// This module provides common test utilities, fixtures, and helper functions
/// used across all integration tests.
pub mod fixtures;

pub use dynamo_model::setup;
pub use dynamo_model::store::{MemoryStore, Operation};
pub use dynamo_model::{Error, Model, ModelConfig};
pub use serde::{Deserialize, Serialize};

// Re-export common fixtures
pub use fixtures::{edit, edit_schema, song, song_schema, user, user_schema};

#[allow(unused_imports)]
pub use fixtures::{Edit, Song};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

static LOGGING: Once = Once::new();

/// Install a fmt subscriber once per test binary
///
/// Output goes through the test writer, so it only shows for failing tests.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_line_number(true)
            .with_file(true)
            .with_target(false)
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Model over a fresh in-memory store with every fixture table created
pub async fn memory_model(store: MemoryStore, config: ModelConfig) -> Model<MemoryStore> {
    init_logging();
    let model = Model::connect(store, [song_schema(), edit_schema(), user_schema()], config)
        .unwrap();
    setup::create_all(&model).await.unwrap();
    model
}

/// Model over a fresh in-memory store with default settings
#[allow(dead_code)]
pub async fn default_model() -> Model<MemoryStore> {
    memory_model(MemoryStore::new(), ModelConfig::default()).await
}

/// Generate a unique test prefix for isolation
///
/// Returns a ULID-based prefix to avoid test data conflicts
#[allow(dead_code)]
pub fn unique_test_prefix(name: &str) -> String {
    format!("{}_{}_", name, rusty_ulid::generate_ulid_string().to_lowercase())
}

/// Model over LocalStack or AWS, with freshly created tables
///
/// Set `AWS_PROFILE=localstack` to run against a local endpoint.
#[allow(dead_code)]
pub async fn remote_model(name: &str) -> Model {
    init_logging();
    let config = ModelConfig::default()
        .with_prefix(unique_test_prefix(name))
        .with_poll_interval(std::time::Duration::from_millis(500));
    let model = Model::from_env([song_schema(), edit_schema(), user_schema()], config)
        .await
        .unwrap();
    setup::create_all(&model).await.unwrap();
    model
}

/// Delete every fixture table of a remote model
#[allow(dead_code)]
pub async fn drop_tables(model: &Model) {
    for alias in ["song", "edit", "user"] {
        let _ = setup::delete_table(model, alias).await;
    }
}
