mod common;

use common::{client, numbers_of, seed_numbers};
use doclink::{
    bson::{Bson, doc},
    prelude::*,
};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn count_after_insert() {
    let (client, _) = client();
    let numbers = client.database("crud").collection("numbers");

    assert_eq!(numbers.count(&Filter::match_all()).await.unwrap(), 0);
    seed_numbers(&numbers, 1..=11).await;

    assert_eq!(numbers.count(&Filter::match_all()).await.unwrap(), 11);
    assert_eq!(numbers.count(&Filter::gt("number", 8)).await.unwrap(), 3);
}

#[tokio::test]
async fn update_then_delete_scenario() {
    let (client, _) = client();
    let numbers = client.database("crud").collection("numbers");
    seed_numbers(&numbers, 1..=11).await;

    let updated = numbers
        .update_many(
            &Filter::lte("number", 5),
            &Update::inc("number", 10),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert!(updated.acknowledged());
    assert_eq!(updated.matched_count(), 5);
    assert_eq!(updated.modified_count(), 5);
    assert_eq!(updated.upserted_id(), None);

    let all = numbers
        .find(&Filter::match_all(), FindOptions::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(all.len(), 11);

    let deleted = numbers
        .delete_many(&Filter::gte("number", 10))
        .await
        .unwrap();
    assert_eq!(deleted.deleted_count(), 7);

    let remaining = numbers
        .find(&Filter::match_all(), FindOptions::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(numbers_of(&remaining), vec![6, 7, 8, 9]);
    assert_eq!(numbers.count(&Filter::match_all()).await.unwrap(), 4);
}

#[tokio::test]
async fn filter_results_are_exact_and_stable() {
    let (client, _) = client();
    let numbers = client.database("crud").collection("numbers");
    seed_numbers(&numbers, [7, 3, 11, 1, 5, 9, 2, 10, 4, 8, 6]).await;

    let filter = Filter::lte("number", 5);
    let first = numbers
        .find(&filter, FindOptions::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let second = numbers
        .find(&filter, FindOptions::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(numbers_of(&first), vec![3, 1, 5, 2, 4]);
    assert_eq!(first, second);
}

#[tokio::test]
async fn combined_filters() {
    let (client, _) = client();
    let people = client.database("crud").collection("people");
    people
        .insert_many(
            vec![
                doc! { "name": "ada", "age": 36, "tags": ["math", "engines"] },
                doc! { "name": "alan", "age": 41, "tags": ["math"] },
                doc! { "name": "grace", "age": 85 },
            ],
            InsertManyOptions::default(),
        )
        .await
        .unwrap();

    let filter = Filter::or([
        Filter::eq("tags", "engines"),
        Filter::not_exists("tags").and_also(Filter::gt("age", 80)),
    ])
    .unwrap();
    let found = people
        .find(&filter, FindOptions::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let names: Vec<&str> = found
        .iter()
        .map(|person| person.get_str("name").unwrap())
        .collect();
    assert_eq!(names, vec!["ada", "grace"]);

    let not_math = people
        .count(&Filter::not(Filter::in_values("tags", ["math"])))
        .await
        .unwrap();
    assert_eq!(not_math, 1);
}

#[tokio::test]
async fn find_one_and_update_returns_requested_image() {
    let (client, _) = client();
    let counters = client.database("crud").collection("counters");
    counters
        .insert_one(doc! { "_id": "visits", "count": 0 })
        .await
        .unwrap();
    let visits = Filter::eq("_id", "visits");

    let before = counters
        .find_one_and_update(&visits, &Update::inc("count", 1), FindOneAndUpdateOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.get_i32("count").unwrap(), 0);

    let after = counters
        .find_one_and_update(
            &visits,
            &Update::inc("count", 1),
            FindOneAndUpdateOptions::return_after(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.get_i32("count").unwrap(), 2);

    let missing = counters
        .find_one_and_update(
            &Filter::eq("_id", "clicks"),
            &Update::inc("count", 1),
            FindOneAndUpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(missing, None);

    let upserted = counters
        .find_one_and_update(
            &Filter::eq("_id", "clicks"),
            &Update::inc("count", 1),
            FindOneAndUpdateOptions {
                return_document: ReturnDocument::After,
                upsert: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(upserted, Some(doc! { "_id": "clicks", "count": 1 }));
}

#[tokio::test]
async fn find_one_and_delete_and_delete_one() {
    let (client, _) = client();
    let numbers = client.database("crud").collection("numbers");
    seed_numbers(&numbers, 1..=4).await;

    let removed = numbers
        .find_one_and_delete(&Filter::gt("number", 2))
        .await
        .unwrap();
    assert_eq!(removed, Some(doc! { "_id": 3, "number": 3 }));
    assert_eq!(numbers.find_one_and_delete(&Filter::eq("number", 3)).await.unwrap(), None);

    let deleted = numbers.delete_one(&Filter::match_all()).await.unwrap();
    assert_eq!(deleted.deleted_count(), 1);
    assert_eq!(numbers.count(&Filter::match_all()).await.unwrap(), 2);
}

#[tokio::test]
async fn update_one_and_upsert() {
    let (client, _) = client();
    let numbers = client.database("crud").collection("numbers");
    seed_numbers(&numbers, 1..=3).await;

    let updated = numbers
        .update_one(
            &Filter::match_all(),
            &Update::set("first", true),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(updated.matched_count(), 1);
    assert_eq!(updated.modified_count(), 1);

    let upserted = numbers
        .update_one(
            &Filter::eq("number", 42),
            &Update::builder().set("answer", true).build(),
            UpdateOptions::upsert(),
        )
        .await
        .unwrap();
    assert_eq!(upserted.matched_count(), 0);
    assert_eq!(upserted.modified_count(), 0);
    assert!(matches!(upserted.upserted_id(), Some(Bson::ObjectId(_))));

    let answer = numbers
        .find_one(&Filter::eq("answer", true), Projection::exclude(["_id"]))
        .await
        .unwrap();
    assert_eq!(answer, Some(doc! { "number": 42, "answer": true }));
}

#[tokio::test]
async fn duplicate_key_is_reported() {
    let (client, _) = client();
    let numbers = client.database("crud").collection("numbers");
    numbers.insert_one(doc! { "_id": 1 }).await.unwrap();

    let err = numbers.insert_one(doc! { "_id": 1 }).await.unwrap_err();

    assert!(matches!(err, ClientError::DuplicateKey { .. }));
    assert_eq!(err.kind(), ErrorKind::DuplicateKey);
}

#[tokio::test]
async fn validation_failure_is_reported() {
    let (client, transport) = client();
    transport
        .server()
        .set_validator("crud", "people", Filter::exists("name"))
        .await;
    let people = client.database("crud").collection("people");

    let err = people.insert_one(doc! { "age": 3 }).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);

    people.insert_one(doc! { "name": "ada" }).await.unwrap();
    let err = people
        .update_many(&Filter::match_all(), &Update::unset("name"), UpdateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
}

#[tokio::test]
async fn ordered_bulk_insert_stops_at_first_failure() {
    let (client, _) = client();
    let numbers = client.database("crud").collection("numbers");
    seed_numbers(&numbers, [2]).await;

    let err = numbers
        .insert_many(
            vec![doc! { "_id": 1 }, doc! { "_id": 2 }, doc! { "_id": 3 }],
            InsertManyOptions::ordered(true),
        )
        .await
        .unwrap_err();

    let ClientError::BulkWrite(bulk) = err else {
        panic!("expected a bulk write error, got {err:?}");
    };
    assert!(bulk.ordered);
    assert_eq!(bulk.inserted_count, 1);
    assert_eq!(bulk.outcomes[0], InsertOutcome::Inserted);
    assert!(matches!(bulk.outcomes[1], InsertOutcome::Failed { code: 11000, .. }));
    assert_eq!(bulk.outcomes[2], InsertOutcome::NotAttempted);
    assert_eq!(numbers.count(&Filter::match_all()).await.unwrap(), 2);
}

#[tokio::test]
async fn unordered_bulk_insert_attempts_every_document() {
    let (client, _) = client();
    let numbers = client.database("crud").collection("numbers");
    seed_numbers(&numbers, [2]).await;

    let err = numbers
        .insert_many(
            vec![doc! { "_id": 1 }, doc! { "_id": 2 }, doc! { "_id": 3 }],
            InsertManyOptions::ordered(false),
        )
        .await
        .unwrap_err();

    let ClientError::BulkWrite(bulk) = err else {
        panic!("expected a bulk write error, got {err:?}");
    };
    assert!(!bulk.ordered);
    assert_eq!(bulk.inserted_count, 2);
    assert_eq!(bulk.failed_count(), 1);
    assert_eq!(bulk.failures().map(|(index, _)| index).collect::<Vec<_>>(), vec![1]);
    assert_eq!(bulk.outcomes[2], InsertOutcome::Inserted);
    assert_eq!(numbers.count(&Filter::match_all()).await.unwrap(), 3);
}

#[tokio::test]
async fn projection_and_limit() {
    let (client, _) = client();
    let numbers = client.database("crud").collection("numbers");
    seed_numbers(&numbers, 1..=10).await;

    let options = FindOptions::builder()
        .projection(Projection::include(["number"]))
        .limit(3)
        .batch_size(2)
        .build();
    let found = numbers
        .find(&Filter::gt("number", 4), options)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(found, vec![
        doc! { "_id": 5, "number": 5 },
        doc! { "_id": 6, "number": 6 },
        doc! { "_id": 7, "number": 7 },
    ]);

    let found = numbers
        .find_one(&Filter::eq("number", 9), Projection::exclude(["_id"]))
        .await
        .unwrap();
    assert_eq!(found, Some(doc! { "number": 9 }));
    assert_eq!(
        numbers
            .find_one(&Filter::eq("number", 99), Projection::all_fields())
            .await
            .unwrap(),
        None,
    );
}

#[tokio::test]
async fn invalid_arguments_fail_before_any_network_traffic() {
    let (client, transport) = client();
    let numbers = client.database("crud").collection("numbers");

    let err = numbers
        .insert_many(Vec::new(), InsertManyOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = numbers
        .update_many(&Filter::match_all(), &Update::noop(), UpdateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = numbers
        .find_one_and_update(
            &Filter::match_all(),
            &Update::noop(),
            FindOneAndUpdateOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let mixed = Projection::include(["a"]).and_exclude(["b"]);
    let err = numbers
        .find(&Filter::match_all(), FindOptions { projection: mixed, ..FindOptions::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidProjection(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = numbers
        .count(&Filter::And(Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::EmptyCombinator("and")));

    let err = numbers.count(&Filter::eq("$where", 1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = client
        .database("crud")
        .collection("")
        .count(&Filter::match_all())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(transport.commands_sent(), 0);
    assert_eq!(transport.sessions_opened(), 0);
}

#[tokio::test]
async fn unacknowledged_writes_report_no_counts() {
    let config = ClientConfig::builder()
        .write_concern(WriteConcern::unacknowledged())
        .build()
        .unwrap();
    let (client, transport) = common::client_with(config);
    let numbers = client.database("crud").collection("numbers");

    let result = numbers.insert_one(doc! { "number": 1 }).await.unwrap();

    assert!(!result.acknowledged());
    assert_eq!(result.inserted_count(), 0);
    assert_eq!(transport.server().documents("crud", "numbers").await.len(), 1);
}

#[tokio::test]
async fn typed_collections_round_trip_models() {
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Person {
        name: String,
        age: i32,
    }

    let (client, _) = client();
    let people = client
        .database("crud")
        .collection("people")
        .typed::<Person>();
    let ada = Person { name: "ada".to_string(), age: 36 };

    people.insert_one(&ada).await.unwrap();
    people
        .insert_many(
            &[Person { name: "alan".to_string(), age: 41 }],
            InsertManyOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(people.count(&Filter::match_all()).await.unwrap(), 2);
    assert_eq!(people.find_one(&Filter::eq("name", "ada")).await.unwrap(), Some(ada));
    let older = people
        .find(&Filter::gt("age", 40), FindOptions::default())
        .await
        .unwrap();
    assert_eq!(older.len(), 1);
    assert_eq!(older[0].name, "alan");
}

#[tokio::test]
async fn namespace_management() {
    let (client, _) = client();
    let database = client.database("catalog");

    database.create_collection("books").await.unwrap();
    let err = database.create_collection("books").await.unwrap_err();
    assert!(matches!(err, ClientError::BackendError { code: 48, .. }));

    database
        .collection("films")
        .insert_one(doc! { "title": "Metropolis" })
        .await
        .unwrap();
    assert_eq!(
        database.list_collection_names().await.unwrap(),
        vec!["books".to_string(), "films".to_string()],
    );
    assert_eq!(client.list_database_names().await.unwrap(), vec!["catalog".to_string()]);

    let descriptors = client.list_databases().await.unwrap();
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].get_str("name").unwrap(), "catalog");
    assert!(!descriptors[0].get_bool("empty").unwrap());

    database.drop_collection("books").await.unwrap();
    database.drop_collection("books").await.unwrap();
    assert_eq!(database.list_collection_names().await.unwrap(), vec!["films".to_string()]);

    client.ping().await.unwrap();
}
