//! # DynamoDB Data Models
//!
//! Schema-driven records on top of DynamoDB with:
//! - Declarative schemas and typed field marshaling
//! - Single-item get, put, delete, update and query builders
//! - Multi-alias batches chunked to the 25-request write limit and sent concurrently
//! - Fan-out batch reads returned in request order
//! - Conditional inserts that upgrade to bulk inserts
//! - Table provisioning for tests
//!
//! ## Features
//!
//! - **Explicit context**: every operation goes through a [`Model`] holding the
//!   store, the schemas and their table bindings; there is no global client
//! - **Pluggable store**: [`Model`] works with `aws_sdk_dynamodb::Client` or the
//!   in-memory [`MemoryStore`] used by tests
//! - **Partial results**: unprocessed writes and keys are reported, never dropped
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynamo_model::schema::{FieldKind, Schema};
//! use dynamo_model::{Error, Model, ModelConfig, setup};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let song = Schema::builder("song", "songs")
//!         .hash("id", FieldKind::Number)
//!         .field("title", FieldKind::String)
//!         .field("loved", FieldKind::Boolean)
//!         .build()?;
//!
//!     let model = Model::from_env([song], ModelConfig::default().with_prefix("dev_")).await?;
//!     setup::create_all(&model).await?;
//!
//!     // Insert unless it already exists
//!     model
//!         .inserter("song")
//!         .set("id", 1)
//!         .set("title", "Silent Running")
//!         .should_not_exist("id")
//!         .commit()
//!         .await?;
//!
//!     // Read it back
//!     let song = model.get("song", 1, Default::default()).await?;
//!     println!("{song:?}");
//!
//!     Ok(())
//! }
//! ```
#![deny(
    bad_style,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unknown_lints,
    unreachable_code
)]
#![warn(
    dead_code,
    unused,
    unused_mut,
    unused_results,
    unused_qualifications,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    unreachable_pub,
    deprecated
)]

mod error;
pub use error::Error;

/// Schemas, fields and typed values
pub mod schema;

/// Store interface and the in-memory store
pub mod store;

/// Model context, options and the batch engine
pub mod model;

/// Table setup utilities for testing
pub mod setup;

mod inserter;
mod query;

// Re-export main types for convenience
pub use inserter::{BulkInserter, Inserter};
pub use model::{
    AttributeUpdate, Batch, BatchGetRequest, BatchGetResult, Chunk, CommitResult, DeleteOptions,
    Expectation, Expectations, GetOptions, Model, ModelConfig, PartialCommit, PutOptions,
    QueryOptions, QueryPage, RangeCondition, ResolvedBatch, Table, UpdateOptions, WriteOperation,
};
pub use query::{Query, UpdateQuery};
pub use schema::{Field, FieldKind, Record, Schema, Value};
pub use store::{MemoryStore, Store, StoreError};

// Re-export aws-config types for configuration
pub use aws_config::{
    BehaviorVersion, Region, SdkConfig, defaults,
    meta::region::{ProvideRegion, RegionProviderChain},
    retry::{RetryConfig, RetryMode},
    timeout::TimeoutConfig,
};

// Re-export aws-types for advanced configuration
pub use aws_types::sdk_config::Builder as SdkConfigBuilder;

use aws_sdk_dynamodb::Client as DynamoDbClient;

/// Load the AWS config with the crate's defaults
///
/// It configures:
/// - Adaptive retry mode with 3 max attempts
/// - Exponential backoff starting at 1 second
/// - Connect timeout: 3 seconds
/// - Read timeout: 20 seconds
/// - Operation timeout: 60 seconds
/// - LocalStack support via AWS_PROFILE=localstack
///
/// Throttled requests are only retried here, by the SDK; the crate itself
/// reports unprocessed items instead of resending them.
pub async fn sdk_config_from_env() -> SdkConfig {
    use std::time::Duration;

    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(3))
        .read_timeout(Duration::from_secs(20))
        .operation_timeout(Duration::from_secs(60))
        .build();

    let mut loader = defaults(BehaviorVersion::latest())
        .retry_config(
            RetryConfig::adaptive()
                .with_max_attempts(3)
                .with_initial_backoff(Duration::from_secs(1)),
        )
        .timeout_config(timeout_config);

    // Support LocalStack via AWS_PROFILE=localstack
    if std::env::var("AWS_PROFILE").unwrap_or_default() == "localstack" {
        loader = loader.endpoint_url("http://127.0.0.1:4566");
    }

    loader.load().await
}

/// Build a DynamoDB client from [`sdk_config_from_env`]
///
/// For custom configuration, build the client yourself and pass it to
/// [`Model::connect`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() {
/// let config = dynamo_model::defaults(dynamo_model::BehaviorVersion::latest())
///     .region(dynamo_model::Region::new("us-west-2"))
///     .load()
///     .await;
/// let client = aws_sdk_dynamodb::Client::new(&config);
/// # let _ = client;
/// # }
/// ```
pub async fn client_from_env() -> DynamoDbClient {
    let config = sdk_config_from_env().await;
    DynamoDbClient::new(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sdk_config_defaults() {
        let config = sdk_config_from_env().await;

        let retry = config.retry_config().unwrap();
        assert_eq!(retry.mode(), RetryMode::Adaptive);
        assert_eq!(retry.max_attempts(), 3);

        let timeouts = config.timeout_config().unwrap();
        assert_eq!(
            timeouts.connect_timeout(),
            Some(std::time::Duration::from_secs(3))
        );
        assert_eq!(
            timeouts.operation_timeout(),
            Some(std::time::Duration::from_secs(60))
        );
    }
}
