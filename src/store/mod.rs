//! The remote item store seam
//!
//! Every request the crate issues goes through the [`Store`] trait. It is
//! implemented for the AWS SDK [`Client`] and for the in-process [`MemoryStore`],
//! so request construction and batch orchestration can run without a live table.

mod memory;

pub use memory::MemoryStore;

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::batch_get_item::{BatchGetItemInput, BatchGetItemOutput};
use aws_sdk_dynamodb::operation::batch_write_item::{BatchWriteItemInput, BatchWriteItemOutput};
use aws_sdk_dynamodb::operation::create_table::{CreateTableInput, CreateTableOutput};
use aws_sdk_dynamodb::operation::delete_item::{DeleteItemInput, DeleteItemOutput};
use aws_sdk_dynamodb::operation::delete_table::{DeleteTableInput, DeleteTableOutput};
use aws_sdk_dynamodb::operation::describe_table::{DescribeTableInput, DescribeTableOutput};
use aws_sdk_dynamodb::operation::get_item::{GetItemInput, GetItemOutput};
use aws_sdk_dynamodb::operation::put_item::{PutItemInput, PutItemOutput};
use aws_sdk_dynamodb::operation::query::{QueryInput, QueryOutput};
use aws_sdk_dynamodb::operation::update_item::{UpdateItemInput, UpdateItemOutput};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;

/// Store request kinds, used to label failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Single item read
    GetItem,
    /// Single item write
    PutItem,
    /// Single item delete
    DeleteItem,
    /// Attribute-level update
    UpdateItem,
    /// Key-condition query
    Query,
    /// Multi-table read
    BatchGetItem,
    /// Multi-table put/delete
    BatchWriteItem,
    /// Table status lookup
    DescribeTable,
    /// Table creation
    CreateTable,
    /// Table deletion
    DeleteTable,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::GetItem => "GetItem",
            Operation::PutItem => "PutItem",
            Operation::DeleteItem => "DeleteItem",
            Operation::UpdateItem => "UpdateItem",
            Operation::Query => "Query",
            Operation::BatchGetItem => "BatchGetItem",
            Operation::BatchWriteItem => "BatchWriteItem",
            Operation::DescribeTable => "DescribeTable",
            Operation::CreateTable => "CreateTable",
            Operation::DeleteTable => "DeleteTable",
        };
        f.write_str(name)
    }
}

/// Failure reported by a [`Store`]
#[derive(Debug)]
pub enum StoreError {
    /// Error returned by the AWS SDK
    DynamoDB(Box<aws_sdk_dynamodb::Error>),
    /// Service error carrying only the DynamoDB error code and message
    Service {
        /// DynamoDB error code, e.g. `ConditionalCheckFailedException`
        code: String,
        /// Human readable message
        message: String,
    },
}

impl StoreError {
    /// Service error with the given DynamoDB error code
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    /// DynamoDB error code, if the service returned one
    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::DynamoDB(e) => e.code(),
            StoreError::Service { code, .. } => Some(code),
        }
    }

    /// A conditional expectation did not hold
    pub fn is_conditional_check_failed(&self) -> bool {
        match self {
            StoreError::DynamoDB(e) => matches!(
                **e,
                aws_sdk_dynamodb::Error::ConditionalCheckFailedException(_)
            ),
            StoreError::Service { code, .. } => code == "ConditionalCheckFailedException",
        }
    }

    /// The table does not exist
    pub fn is_resource_not_found(&self) -> bool {
        match self {
            StoreError::DynamoDB(e) => {
                matches!(**e, aws_sdk_dynamodb::Error::ResourceNotFoundException(_))
            }
            StoreError::Service { code, .. } => code == "ResourceNotFoundException",
        }
    }

    /// The table already exists or is being created or deleted
    pub fn is_resource_in_use(&self) -> bool {
        match self {
            StoreError::DynamoDB(e) => {
                matches!(**e, aws_sdk_dynamodb::Error::ResourceInUseException(_))
            }
            StoreError::Service { code, .. } => code == "ResourceInUseException",
        }
    }
}

impl<E, R> From<SdkError<E, R>> for StoreError
where
    aws_sdk_dynamodb::Error: From<SdkError<E, R>>,
{
    fn from(e: SdkError<E, R>) -> Self {
        StoreError::DynamoDB(Box::new(e.into()))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DynamoDB(e) => write!(f, "{e}"),
            StoreError::Service { code, message } => write!(f, "{code}: {message}"),
        }
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StoreError::DynamoDB(e) => Some(e.as_ref()),
            StoreError::Service { .. } => None,
        }
    }
}

/// Asynchronous DynamoDB-shaped item store
///
/// Requests and responses are the SDK's operation input and output shapes, so
/// an implementation only has to answer them; it never sees schemas or records.
pub trait Store: Send + Sync {
    /// Read one item by key
    fn get_item(
        &self,
        input: GetItemInput,
    ) -> impl Future<Output = Result<GetItemOutput, StoreError>> + Send;

    /// Write one item, replacing any item with the same key
    fn put_item(
        &self,
        input: PutItemInput,
    ) -> impl Future<Output = Result<PutItemOutput, StoreError>> + Send;

    /// Delete one item by key
    fn delete_item(
        &self,
        input: DeleteItemInput,
    ) -> impl Future<Output = Result<DeleteItemOutput, StoreError>> + Send;

    /// Apply attribute updates to one item
    fn update_item(
        &self,
        input: UpdateItemInput,
    ) -> impl Future<Output = Result<UpdateItemOutput, StoreError>> + Send;

    /// Read items sharing a hash key
    fn query(&self, input: QueryInput)
    -> impl Future<Output = Result<QueryOutput, StoreError>> + Send;

    /// Read items from several tables
    fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> impl Future<Output = Result<BatchGetItemOutput, StoreError>> + Send;

    /// Put and delete items across several tables
    fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> impl Future<Output = Result<BatchWriteItemOutput, StoreError>> + Send;

    /// Look up a table's description and status
    fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> impl Future<Output = Result<DescribeTableOutput, StoreError>> + Send;

    /// Create a table
    fn create_table(
        &self,
        input: CreateTableInput,
    ) -> impl Future<Output = Result<CreateTableOutput, StoreError>> + Send;

    /// Delete a table
    fn delete_table(
        &self,
        input: DeleteTableInput,
    ) -> impl Future<Output = Result<DeleteTableOutput, StoreError>> + Send;
}

impl Store for Client {
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, StoreError> {
        Ok(Client::get_item(self)
            .set_table_name(input.table_name)
            .set_key(input.key)
            .set_attributes_to_get(input.attributes_to_get)
            .set_consistent_read(input.consistent_read)
            .send()
            .await?)
    }

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError> {
        Ok(Client::put_item(self)
            .set_table_name(input.table_name)
            .set_item(input.item)
            .set_expected(input.expected)
            .set_return_values(input.return_values)
            .send()
            .await?)
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, StoreError> {
        Ok(Client::delete_item(self)
            .set_table_name(input.table_name)
            .set_key(input.key)
            .set_expected(input.expected)
            .set_return_values(input.return_values)
            .send()
            .await?)
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, StoreError> {
        Ok(Client::update_item(self)
            .set_table_name(input.table_name)
            .set_key(input.key)
            .set_attribute_updates(input.attribute_updates)
            .set_expected(input.expected)
            .set_return_values(input.return_values)
            .send()
            .await?)
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError> {
        Ok(Client::query(self)
            .set_table_name(input.table_name)
            .set_key_conditions(input.key_conditions)
            .set_attributes_to_get(input.attributes_to_get)
            .set_limit(input.limit)
            .set_consistent_read(input.consistent_read)
            .set_scan_index_forward(input.scan_index_forward)
            .set_exclusive_start_key(input.exclusive_start_key)
            .send()
            .await?)
    }

    async fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> Result<BatchGetItemOutput, StoreError> {
        Ok(Client::batch_get_item(self)
            .set_request_items(input.request_items)
            .send()
            .await?)
    }

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, StoreError> {
        Ok(Client::batch_write_item(self)
            .set_request_items(input.request_items)
            .send()
            .await?)
    }

    async fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> Result<DescribeTableOutput, StoreError> {
        Ok(Client::describe_table(self)
            .set_table_name(input.table_name)
            .send()
            .await?)
    }

    async fn create_table(&self, input: CreateTableInput) -> Result<CreateTableOutput, StoreError> {
        Ok(Client::create_table(self)
            .set_table_name(input.table_name)
            .set_attribute_definitions(input.attribute_definitions)
            .set_key_schema(input.key_schema)
            .set_provisioned_throughput(input.provisioned_throughput)
            .set_billing_mode(input.billing_mode)
            .send()
            .await?)
    }

    async fn delete_table(&self, input: DeleteTableInput) -> Result<DeleteTableOutput, StoreError> {
        Ok(Client::delete_table(self)
            .set_table_name(input.table_name)
            .send()
            .await?)
    }
}
