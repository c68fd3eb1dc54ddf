use std::{collections::BTreeMap, fmt, sync::Arc};

use doclink::{bson::doc, memory::MemoryTransport, prelude::*};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{
    Layer, Registry,
    layer::{Context, SubscriberExt},
};

type Fields = BTreeMap<String, String>;

/// Records the fields of every operation event.
#[derive(Clone, Default)]
struct OperationEvents(Arc<Mutex<Vec<Fields>>>);

impl OperationEvents {
    fn take(&self) -> Vec<Fields> {
        std::mem::take(&mut *self.0.lock())
    }
}

#[derive(Default)]
struct FieldRecorder(Fields);

impl Visit for FieldRecorder {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for OperationEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        if recorder.0.contains_key("operation") {
            self.0.lock().push(recorder.0);
        }
    }
}

fn summary(events: &[Fields]) -> Vec<(String, String)> {
    events
        .iter()
        .map(|fields| (fields["operation"].clone(), fields["outcome"].clone()))
        .collect()
}

#[tokio::test]
async fn every_operation_emits_one_structured_event() {
    let events = OperationEvents::default();
    let _guard = tracing::subscriber::set_default(Registry::default().with(events.clone()));

    let client = Client::new(MemoryTransport::new(), ClientConfig::default()).unwrap();
    let entries = client.database("logs").collection("entries");

    entries.insert_one(doc! { "_id": 1, "level": "info" }).await.unwrap();
    entries
        .insert_one(doc! { "_id": 1, "level": "warn" })
        .await
        .unwrap_err();
    assert_eq!(entries.count(&Filter::match_all()).await.unwrap(), 1);
    let found = entries
        .find(&Filter::match_all(), FindOptions::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    entries
        .update_many(
            &Filter::eq("level", "info"),
            &Update::set("level", "debug"),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    entries.delete_many(&Filter::match_all()).await.unwrap();

    let events = events.take();
    assert_eq!(
        summary(&events),
        [
            ("insert_one", "ok"),
            ("insert_one", "duplicate_key"),
            ("count", "ok"),
            ("find", "ok"),
            ("update_many", "ok"),
            ("delete_many", "ok"),
        ]
        .map(|(operation, outcome)| (operation.to_string(), outcome.to_string()))
        .to_vec()
    );
    for fields in &events {
        assert_eq!(fields["namespace"], "logs.entries");
        assert!(fields["duration_ms"].parse::<u64>().is_ok());
    }
}

#[tokio::test]
async fn invalid_arguments_are_logged_as_failures() {
    let events = OperationEvents::default();
    let _guard = tracing::subscriber::set_default(Registry::default().with(events.clone()));

    let client = Client::new(MemoryTransport::new(), ClientConfig::default()).unwrap();
    let entries = client.database("logs").collection("entries");

    let err = entries
        .update_many(&Filter::match_all(), &Update::noop(), UpdateOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let events = events.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["operation"], "update_many");
    assert_eq!(events[0]["outcome"], "invalid_argument");
    assert!(events[0].contains_key("error"));
}
