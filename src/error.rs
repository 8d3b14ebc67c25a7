use aws_sdk_dynamodb::error::BuildError;
use serde_dynamo::Error as SerdeDynamoError;
use serde_json::Error as JsonError;
use std::error::Error as StdError;
use std::fmt;

use crate::model::PartialCommit;
use crate::schema::FieldKind;
use crate::store::{Operation, StoreError};

/// Data access error
#[derive(Debug)]
pub enum Error {
    /// A table alias that no registered schema declares
    UnknownAlias(String),
    /// A field name the alias' schema does not declare
    UnknownField {
        /// Schema alias
        alias: String,
        /// Requested field name
        field: String,
    },
    /// A required hash or range value is absent
    MissingKey {
        /// Schema alias
        alias: String,
        /// Key field whose value is missing
        field: String,
    },
    /// A value could not be converted to the field's wire representation
    FieldExport {
        /// Field name
        field: String,
        /// Semantic type of the field
        kind: FieldKind,
        /// What was wrong with the value
        reason: String,
    },
    /// A wire value could not be converted back to the field's semantic type
    FieldImport {
        /// Field name
        field: String,
        /// Semantic type of the field
        kind: FieldKind,
        /// What was wrong with the wire value
        reason: String,
    },
    /// A request that cannot be chunked exceeds the store's per-request cap
    BatchTooLarge {
        /// Operations or keys in the request
        operations: usize,
        /// Maximum the store accepts in one request
        limit: usize,
    },
    /// A conditional insert cannot be upgraded to a bulk insert
    UnsupportedUpgrade {
        /// Alias of the conditional insert
        alias: String,
    },
    /// A schema definition violates its invariants
    InvalidSchema {
        /// Schema alias
        alias: String,
        /// Violated invariant
        reason: String,
    },
    /// The store rejected or failed a request
    StoreRequest {
        /// Store operation that failed
        operation: Operation,
        /// Aliases the request was built for
        aliases: Vec<String>,
        /// Error reported by the store
        source: StoreError,
    },
    /// A multi-chunk batch commit failed after some chunks were applied
    PartialCommit(Box<PartialCommit>),
    /// DynamoDB request builder error
    BuildError(BuildError),
    /// Serde DynamoDB serialization/deserialization error
    SerdeDynamo(SerdeDynamoError),
    /// JSON serialization/deserialization error
    Json(JsonError),
}

impl Error {
    pub(crate) fn store(
        operation: Operation,
        aliases: impl IntoIterator<Item = impl Into<String>>,
        source: StoreError,
    ) -> Self {
        Error::StoreRequest {
            operation,
            aliases: aliases.into_iter().map(Into::into).collect(),
            source,
        }
    }

    /// Check if the store rejected a request because a conditional expectation failed
    ///
    /// This is how a `should_not_exist` insert on an existing item, or an update
    /// guarded by `should_equal`, reports the conflict.
    ///
    /// # Example
    /// ```no_run
    /// # use dynamo_model::Error;
    /// # fn example(error: Error) {
    /// if error.is_conditional_check_failed() {
    ///     println!("Item was modified by another process");
    /// }
    /// # }
    /// ```
    pub fn is_conditional_check_failed(&self) -> bool {
        match self {
            Error::StoreRequest { source, .. } => source.is_conditional_check_failed(),
            Error::PartialCommit(partial) => partial.source.is_conditional_check_failed(),
            _ => false,
        }
    }

    /// Check if the store reported that the table does not exist
    pub fn is_resource_not_found(&self) -> bool {
        match self {
            Error::StoreRequest { source, .. } => source.is_resource_not_found(),
            Error::PartialCommit(partial) => partial.source.is_resource_not_found(),
            _ => false,
        }
    }

    /// Check if the error is a marshaling error
    ///
    /// Returns `true` for field conversion and serde errors, all of which are
    /// detected before any request is sent.
    pub fn is_serialization_error(&self) -> bool {
        matches!(
            self,
            Error::FieldExport { .. }
                | Error::FieldImport { .. }
                | Error::SerdeDynamo(_)
                | Error::Json(_)
        )
    }

    /// Check if the error came back from the store
    ///
    /// Returns `true` for failed requests, including partially applied batches.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::StoreRequest { .. } | Error::PartialCommit(_))
    }
}

macro_rules! impl_from_error {
    ($name:ident, $variant:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$variant(e)
            }
        }
    };
    ($name:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$name(e)
            }
        }
    };
}

impl_from_error!(SerdeDynamoError, SerdeDynamo);
impl_from_error!(JsonError, Json);
impl_from_error!(BuildError);

impl From<PartialCommit> for Error {
    fn from(partial: PartialCommit) -> Self {
        Error::PartialCommit(Box::new(partial))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownAlias(alias) => write!(f, "unknown table alias `{alias}`"),
            Error::UnknownField { alias, field } => {
                write!(f, "unknown field `{field}` for alias `{alias}`")
            }
            Error::MissingKey { alias, field } => {
                write!(f, "missing key value `{field}` for alias `{alias}`")
            }
            Error::FieldExport {
                field,
                kind,
                reason,
            } => write!(f, "cannot export field `{field}` as {kind}: {reason}"),
            Error::FieldImport {
                field,
                kind,
                reason,
            } => write!(f, "cannot import field `{field}` as {kind}: {reason}"),
            Error::BatchTooLarge { operations, limit } => write!(
                f,
                "{operations} is too many for one batch request (limit {limit})"
            ),
            Error::UnsupportedUpgrade { alias } => write!(
                f,
                "can't upgrade insert into `{alias}` to a batch with expectations"
            ),
            Error::InvalidSchema { alias, reason } => {
                write!(f, "invalid schema `{alias}`: {reason}")
            }
            Error::StoreRequest {
                operation,
                aliases,
                source,
            } => write!(
                f,
                "DynamoDB {operation} operation failed for [{}]: {source}",
                aliases.join(", ")
            ),
            Error::PartialCommit(partial) => write!(
                f,
                "batch commit failed on chunk {} after {} chunk(s) were applied: {}",
                partial.failed_chunk,
                partial.applied_chunks.len(),
                partial.source
            ),
            Error::BuildError(e) => write!(f, "DynamoDB request builder error: {e}"),
            Error::SerdeDynamo(e) => write!(f, "DynamoDB serialization error: {e}"),
            Error::Json(e) => write!(f, "JSON serialization error: {e}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::StoreRequest { source, .. } => Some(source),
            Error::PartialCommit(partial) => Some(&partial.source),
            Error::BuildError(e) => Some(e),
            Error::SerdeDynamo(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}
