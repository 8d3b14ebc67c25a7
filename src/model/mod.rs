//! Connection context, table bindings and per-alias operations
//!
//! A [`Model`] is built once from a store and the application's schemas. Every
//! builder ([`Batch`], [`Inserter`](crate::Inserter), [`Query`](crate::Query),
//! [`UpdateQuery`](crate::UpdateQuery)) borrows it; nothing in the crate keeps a
//! global client or registry.

mod batch;
pub(crate) mod helpers;
pub(crate) mod operations;
pub mod request;
mod types;

pub use batch::{Batch, Chunk, ResolvedBatch};
pub use types::{
    AttributeUpdate, BatchGetRequest, BatchGetResult, CommitResult, DeleteOptions, Expectation,
    Expectations, GetOptions, PartialCommit, PutOptions, QueryOptions, QueryPage, RangeCondition,
    UpdateOptions, WriteOperation,
};

use aws_sdk_dynamodb::Client;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

use crate::error::Error;
use crate::schema::{Schema, WireTag};
use crate::store::Store;

/// Runtime settings shared by every request built through a [`Model`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelConfig {
    prefix: String,
    chunk_size: usize,
    max_concurrency: Option<usize>,
    poll_interval: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            chunk_size: helpers::BATCH_WRITE_SIZE,
            max_concurrency: None,
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl ModelConfig {
    /// Prepend `prefix` to every schema's table name
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Default chunk size for batch commits, clamped to `1..=25`
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = helpers::clamp_chunk_size(chunk_size);
        self
    }

    /// Cap the number of batch requests in flight during one commit
    ///
    /// Without a cap every chunk and every required scan is issued at once.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency.max(1));
        self
    }

    /// Interval between table status checks in [`setup`](crate::setup)
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Table name prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Default chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// In-flight request cap, `None` when unbounded
    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// Table status poll interval
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Physical table an alias is bound to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    alias: String,
    name: String,
    hash_name: String,
    hash_tag: WireTag,
    range_name: Option<String>,
    range_tag: Option<WireTag>,
}

impl Table {
    fn bind(schema: &Schema, prefix: &str) -> Self {
        Self {
            alias: schema.alias().to_string(),
            name: format!("{prefix}{}", schema.table_name()),
            hash_name: schema.hash().name().to_string(),
            hash_tag: schema.hash().wire_tag(),
            range_name: schema.range().map(|f| f.name().to_string()),
            range_tag: schema.range().map(|f| f.wire_tag()),
        }
    }

    /// Logical name
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Physical table name, including the prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hash key attribute name
    pub fn hash_name(&self) -> &str {
        &self.hash_name
    }

    /// Hash key wire tag
    pub fn hash_tag(&self) -> WireTag {
        self.hash_tag
    }

    /// Range key attribute name
    pub fn range_name(&self) -> Option<&str> {
        self.range_name.as_deref()
    }

    /// Range key wire tag
    pub fn range_tag(&self) -> Option<WireTag> {
        self.range_tag
    }
}

/// Explicit connection context: store, schemas, table bindings and settings
#[derive(Debug)]
pub struct Model<S = Client> {
    store: S,
    schemas: BTreeMap<String, Schema>,
    tables: BTreeMap<String, Table>,
    aliases_by_table: HashMap<String, String>,
    config: ModelConfig,
}

impl<S: Store> Model<S> {
    /// Bind `schemas` to their tables and wrap `store`
    ///
    /// Fails with [`Error::InvalidSchema`] when two schemas share an alias or a
    /// physical table.
    ///
    /// # Example
    ///
    /// ```
    /// use dynamo_model::schema::{FieldKind, Schema};
    /// use dynamo_model::store::MemoryStore;
    /// use dynamo_model::{Model, ModelConfig};
    ///
    /// let song = Schema::builder("song", "songs")
    ///     .hash("id", FieldKind::Number)
    ///     .field("title", FieldKind::String)
    ///     .build()
    ///     .unwrap();
    ///
    /// let model = Model::connect(
    ///     MemoryStore::new(),
    ///     [song],
    ///     ModelConfig::default().with_prefix("test_"),
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(model.table("song").unwrap().name(), "test_songs");
    /// ```
    pub fn connect(
        store: S,
        schemas: impl IntoIterator<Item = Schema>,
        config: ModelConfig,
    ) -> Result<Self, Error> {
        let mut model = Self {
            store,
            schemas: BTreeMap::new(),
            tables: BTreeMap::new(),
            aliases_by_table: HashMap::new(),
            config,
        };

        for schema in schemas {
            let alias = schema.alias().to_string();
            let table = Table::bind(&schema, &model.config.prefix);
            if model.schemas.contains_key(&alias) {
                return Err(Error::InvalidSchema {
                    alias,
                    reason: "alias is registered twice".to_string(),
                });
            }
            if let Some(other) = model.aliases_by_table.get(table.name()) {
                return Err(Error::InvalidSchema {
                    alias,
                    reason: format!("table `{}` is already bound to `{other}`", table.name()),
                });
            }

            debug!(alias = %alias, table = %table.name(), "binding schema");
            let _ = model
                .aliases_by_table
                .insert(table.name().to_string(), alias.clone());
            let _ = model.tables.insert(alias.clone(), table);
            let _ = model.schemas.insert(alias, schema);
        }

        Ok(model)
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runtime settings
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Registered aliases in lexical order
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Schema registered for `alias`
    pub fn schema(&self, alias: &str) -> Result<&Schema, Error> {
        self.schemas
            .get(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))
    }

    /// Table binding for `alias`
    pub fn table(&self, alias: &str) -> Result<&Table, Error> {
        self.tables
            .get(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))
    }

    /// Physical table name for `alias`
    pub fn table_name(&self, alias: &str) -> Result<&str, Error> {
        Ok(self.table(alias)?.name())
    }

    /// Alias bound to a physical table name
    pub fn alias_for_table(&self, table_name: &str) -> Option<&str> {
        self.aliases_by_table.get(table_name).map(String::as_str)
    }

    pub(crate) fn binding(&self, alias: &str) -> Result<(&Table, &Schema), Error> {
        Ok((self.table(alias)?, self.schema(alias)?))
    }
}

impl Model<Client> {
    /// Connect with a client built from the environment
    ///
    /// The client uses the crate's defaults, see [`client_from_env`](crate::client_from_env).
    pub async fn from_env(
        schemas: impl IntoIterator<Item = Schema>,
        config: ModelConfig,
    ) -> Result<Self, Error> {
        Self::connect(crate::client_from_env().await, schemas, config)
    }
}
