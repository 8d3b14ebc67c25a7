//! Table provisioning for tests and local development
//!
//! Tables are created from the key fields of a registered schema. The wait
//! functions poll `DescribeTable` at [`ModelConfig::poll_interval`] until the
//! table reaches the wanted state; they have no attempt cap.
//!
//! [`ModelConfig::poll_interval`]: crate::ModelConfig::poll_interval

use aws_sdk_dynamodb::operation::create_table::CreateTableInput;
use aws_sdk_dynamodb::operation::delete_table::DeleteTableInput;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableInput;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, KeySchemaElement, KeyType, ProvisionedThroughput, TableDescription,
    TableStatus,
};
use tracing::{debug, info};

use crate::error::Error;
use crate::model::Model;
use crate::model::operations::store_failure;
use crate::schema::{Field, Schema, Throughput};
use crate::store::{Operation, Store};

fn key_element(field: &Field, key_type: KeyType) -> Result<KeySchemaElement, Error> {
    Ok(KeySchemaElement::builder()
        .attribute_name(field.name())
        .key_type(key_type)
        .build()?)
}

fn attribute_definition(schema: &Schema, field: &Field) -> Result<AttributeDefinition, Error> {
    let attribute_type = field
        .wire_tag()
        .scalar_type()
        .ok_or_else(|| Error::InvalidSchema {
            alias: schema.alias().to_string(),
            reason: format!("key field `{}` is not a scalar", field.name()),
        })?;
    Ok(AttributeDefinition::builder()
        .attribute_name(field.name())
        .attribute_type(attribute_type)
        .build()?)
}

fn provisioned_throughput(throughput: Throughput) -> Result<ProvisionedThroughput, Error> {
    Ok(ProvisionedThroughput::builder()
        .read_capacity_units(throughput.read)
        .write_capacity_units(throughput.write)
        .build()?)
}

/// `CreateTable` for the table bound to `alias`
pub fn create_table_input<S: Store>(
    model: &Model<S>,
    alias: &str,
) -> Result<CreateTableInput, Error> {
    let (table, schema) = model.binding(alias)?;

    let mut builder = CreateTableInput::builder()
        .table_name(table.name())
        .key_schema(key_element(schema.hash(), KeyType::Hash)?)
        .attribute_definitions(attribute_definition(schema, schema.hash())?)
        .provisioned_throughput(provisioned_throughput(schema.throughput())?);

    if let Some(range) = schema.range() {
        builder = builder
            .key_schema(key_element(range, KeyType::Range)?)
            .attribute_definitions(attribute_definition(schema, range)?);
    }

    Ok(builder.build()?)
}

async fn create(
    model: &Model<impl Store>,
    alias: &str,
    input: CreateTableInput,
) -> Result<Option<TableDescription>, Error> {
    let table = input.table_name.clone().unwrap_or_default();
    match model.store().create_table(input).await {
        Ok(output) => {
            info!(alias, table = %table, "created table");
            Ok(output.table_description)
        }
        // Table already exists
        Err(e) if e.is_resource_in_use() => {
            debug!(alias, table = %table, "table already exists");
            Ok(None)
        }
        Err(e) => Err(store_failure(Operation::CreateTable, [alias], e)),
    }
}

/// Create the table bound to `alias`
///
/// Returns the new table's description, or `None` when the table already
/// existed.
pub async fn create_table<S: Store>(
    model: &Model<S>,
    alias: &str,
) -> Result<Option<TableDescription>, Error> {
    let input = create_table_input(model, alias)?;
    create(model, alias, input).await
}

/// Create the tables of every registered alias, then wait for all of them
pub async fn create_all<S: Store>(model: &Model<S>) -> Result<(), Error> {
    let aliases: Vec<String> = model.aliases().map(str::to_string).collect();
    for alias in &aliases {
        let _ = create_table(model, alias).await?;
    }
    for alias in &aliases {
        let _ = wait_until_active(model, alias).await?;
    }
    Ok(())
}

/// Describe the table bound to `alias`
pub async fn describe_table<S: Store>(
    model: &Model<S>,
    alias: &str,
) -> Result<TableDescription, Error> {
    let input = DescribeTableInput::builder()
        .table_name(model.table_name(alias)?)
        .build()?;
    let output = model
        .store()
        .describe_table(input)
        .await
        .map_err(|e| store_failure(Operation::DescribeTable, [alias], e))?;
    Ok(output.table.unwrap_or_else(|| TableDescription::builder().build()))
}

/// Poll until the table bound to `alias` is `ACTIVE`
pub async fn wait_until_active<S: Store>(
    model: &Model<S>,
    alias: &str,
) -> Result<TableDescription, Error> {
    loop {
        let description = describe_table(model, alias).await?;
        if description.table_status == Some(TableStatus::Active) {
            debug!(alias, "table is active");
            return Ok(description);
        }
        debug!(alias, status = ?description.table_status, "waiting for table");
        tokio::time::sleep(model.config().poll_interval()).await;
    }
}

/// Delete the table bound to `alias`
pub async fn delete_table<S: Store>(model: &Model<S>, alias: &str) -> Result<(), Error> {
    let input = DeleteTableInput::builder()
        .table_name(model.table_name(alias)?)
        .build()?;
    let _ = model
        .store()
        .delete_table(input)
        .await
        .map_err(|e| store_failure(Operation::DeleteTable, [alias], e))?;
    info!(alias, "deleted table");
    Ok(())
}

/// Poll until the table bound to `alias` no longer exists
///
/// `ResourceNotFound` is the awaited outcome here and is not reported as a
/// store failure.
pub async fn wait_until_deleted<S: Store>(model: &Model<S>, alias: &str) -> Result<(), Error> {
    let table_name = model.table_name(alias)?;
    loop {
        let input = DescribeTableInput::builder()
            .table_name(table_name)
            .build()?;
        match model.store().describe_table(input).await {
            Err(e) if e.is_resource_not_found() => {
                debug!(alias, "table is gone");
                return Ok(());
            }
            Err(e) => return Err(store_failure(Operation::DescribeTable, [alias], e)),
            Ok(output) => {
                let status = output.table.and_then(|table| table.table_status);
                debug!(alias, status = ?status, "waiting for table deletion");
                tokio::time::sleep(model.config().poll_interval()).await;
            }
        }
    }
}

/// Drop every item of the table bound to `alias` by deleting and recreating it
///
/// The new table copies the key schema and attribute definitions of the old
/// one; throughput falls back to the schema's when the description has none.
pub async fn recreate_table<S: Store>(
    model: &Model<S>,
    alias: &str,
) -> Result<TableDescription, Error> {
    let description = describe_table(model, alias).await?;
    let throughput = description
        .provisioned_throughput
        .as_ref()
        .and_then(|t| Some(Throughput {
            read: t.read_capacity_units.filter(|units| *units > 0)?,
            write: t.write_capacity_units.filter(|units| *units > 0)?,
        }))
        .unwrap_or(model.schema(alias)?.throughput());

    let input = CreateTableInput::builder()
        .table_name(model.table_name(alias)?)
        .set_key_schema(description.key_schema)
        .set_attribute_definitions(description.attribute_definitions)
        .provisioned_throughput(provisioned_throughput(throughput)?)
        .build()?;

    delete_table(model, alias).await?;
    wait_until_deleted(model, alias).await?;
    let _ = create(model, alias, input).await?;
    wait_until_active(model, alias).await
}
