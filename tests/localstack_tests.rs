/// End-to-end tests against LocalStack or AWS
///
/// Ignored by default. Run with `AWS_PROFILE=localstack cargo test -- --ignored`
/// against a running LocalStack; every run uses freshly prefixed tables.
use dynamo_model::GetOptions;
use dynamo_model::schema::Value;
use serial_test::serial;

mod helpers;
use helpers::*;

/// Test conditional insert and read back
#[tokio::test]
#[serial]
#[ignore = "needs LocalStack or AWS credentials"]
async fn test_remote_insert_and_get() {
    let model = remote_model("crud").await;

    let _ = model
        .inserter("song")
        .set_all(song(1, "A"))
        .should_not_exist("id")
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
    assert!(err.is_conditional_check_failed());

    let options = GetOptions {
        consistent_read: true,
        ..GetOptions::default()
    };
    let got = model.get("song", 1, options).await.unwrap().unwrap();
    assert_eq!(got["title"], Value::from("A"));

    drop_tables(&model).await;
}

/// Test chunked batch writes, range scans and ordered batch reads
#[tokio::test]
#[serial]
#[ignore = "needs LocalStack or AWS credentials"]
async fn test_remote_batch_round_trip() {
    let model = remote_model("batch").await;

    let mut batch = model.batch();
    for id in 0..30 {
        batch = batch.insert("song", song(id, "bulk"));
    }
    for created in 0..5 {
        batch = batch.insert("edit", edit(1, created));
    }
    let result = batch.commit().await.unwrap();
    assert_eq!(result.total_success() + result.unprocessed_count(), 35);

    let fetched = model
        .batch()
        .get_list("song", [7i64, 3, 21], None)
        .fetch()
        .await
        .unwrap();
    let ids: Vec<i64> = fetched
        .items("song")
        .iter()
        .map(|record| record["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![7, 3, 21]);

    let _ = model
        .batch()
        .remove("edit", 1, None)
        .commit()
        .await
        .unwrap();
    let left = model.objects("edit", 1).consistent().fetch_all().await.unwrap();
    assert!(left.is_empty());

    drop_tables(&model).await;
}

/// Test a table can be recreated empty
#[tokio::test]
#[serial]
#[ignore = "needs LocalStack or AWS credentials"]
async fn test_remote_recreate_table() {
    let model = remote_model("recreate").await;

    let _ = model
        .inserter("user")
        .set_all(user(&rusty_ulid::generate_ulid_string()))
        .commit()
        .await
        .unwrap();
    let _ = setup::recreate_table(&model, "user").await.unwrap();

    let page = model.objects("user", "nobody").fetch().await.unwrap();
    assert!(page.items.is_empty());

    drop_tables(&model).await;
}
