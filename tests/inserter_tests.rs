/// Inserter and bulk inserter tests
///
/// Tests conditional inserts, upgrading to a bulk insert and typed records.
use chrono::DateTime;
use dynamo_model::GetOptions;
use dynamo_model::schema::{Record, Value};

mod helpers;
use helpers::*;

/// Test a plain insert stores and returns the record
#[tokio::test]
async fn test_insert_returns_record() {
    let model = default_model().await;

    let stored = model
        .inserter("song")
        .set("id", 1)
        .set("title", "Silent Running")
        .set("loved", true)
        .commit()
        .await
        .unwrap();
    assert_eq!(stored["loved"], Value::Bool(true));

    let got = model
        .get("song", 1, GetOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, stored);
}

/// Test a conditional insert on an existing item fails and keeps the item
#[tokio::test]
async fn test_insert_should_not_exist() {
    let model = default_model().await;
    let _ = model
        .inserter("song")
        .set_all(song(1, "A"))
        .commit()
        .await
        .unwrap();

    let err = model
        .inserter("song")
        .set_all(song(1, "B"))
        .should_not_exist("id")
        .commit()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StoreRequest { .. }));
    assert!(err.is_conditional_check_failed());

    let stored = model
        .get("song", 1, GetOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["title"], Value::from("A"));
}

/// Test should_equal and should_exist guards
#[tokio::test]
async fn test_insert_should_equal() {
    let model = default_model().await;
    let _ = model
        .inserter("song")
        .set_all(song(1, "A"))
        .commit()
        .await
        .unwrap();

    let err = model
        .inserter("song")
        .set_all(song(1, "B"))
        .should_exist("loved")
        .commit()
        .await
        .unwrap_err();
    assert!(err.is_conditional_check_failed());

    let stored = model
        .inserter("song")
        .set_all(song(1, "B"))
        .should_equal("title", "A")
        .commit()
        .await
        .unwrap();
    assert_eq!(stored, song(1, "B"));
}

/// Test from copies only declared fields
#[tokio::test]
async fn test_insert_from_filters_fields() {
    let model = default_model().await;

    let mut source = song(1, "A");
    let _ = source.insert("album".to_string(), Value::from("Unknown"));
    let stored = model.inserter("song").from(&source).commit().await.unwrap();

    assert_eq!(stored, song(1, "A"));
}

/// Test upgrading to a bulk insert across aliases
#[tokio::test]
async fn test_upgrade_to_bulk_insert() {
    let model = default_model().await;

    let mut bulk = model
        .inserter("song")
        .set_all(song(1, "A"))
        .insert("edit")
        .unwrap();
    for created in 0..29 {
        bulk = bulk.set(edit(1, created));
    }
    let bulk = bulk.insert("user").set(user("lucas"));
    assert_eq!(bulk.len(), 31);

    let result = bulk.chunk(10).commit().await.unwrap();
    assert_eq!(result.success("song"), 1);
    assert_eq!(result.success("edit"), 29);
    assert_eq!(result.success("user"), 1);
    assert_eq!(model.store().calls(Operation::BatchWriteItem), 4);
    assert_eq!(model.store().calls(Operation::PutItem), 0);
}

/// Test expectations block the upgrade
#[tokio::test]
async fn test_upgrade_with_expectations_fails() {
    let model = default_model().await;

    let err = model
        .inserter("song")
        .set_all(song(1, "A"))
        .should_not_exist("id")
        .insert("song")
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedUpgrade { ref alias } if alias == "song"));
}

/// Test unknown aliases surface at commit
#[tokio::test]
async fn test_insert_unknown_alias() {
    let model = default_model().await;

    let err = model
        .inserter("album")
        .set("id", 1)
        .commit()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownAlias(_)));
}

/// Test typed structs round trip through the schema
#[tokio::test]
async fn test_typed_records() {
    let model = default_model().await;
    let schema = model.schema("edit").unwrap();

    let typed = Edit {
        song_id: 3,
        created: 1_700_000_000,
        by: "maria".to_string(),
        at: DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
    };
    let stored = model
        .inserter("edit")
        .from_value(&typed)
        .commit()
        .await
        .unwrap();

    let options = GetOptions {
        range: Some(Value::from(1_700_000_000i64)),
        ..GetOptions::default()
    };
    let got: Record = model.get("edit", 3, options).await.unwrap().unwrap();
    assert_eq!(got, stored);

    let back: Edit = schema.record_into(&got).unwrap();
    assert_eq!(back, typed);

    let typed_song: Song = model
        .schema("song")
        .unwrap()
        .record_into(&song(4, "D"))
        .unwrap();
    assert_eq!(typed_song.title, "D");
    assert_eq!(typed_song.loved, None);
}
