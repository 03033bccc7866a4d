//! Multi-subscriber delivery scenarios driven through the public API.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::{Arc, Mutex};

use verdant_events::{Event, EventCategory, EventKind, HandlerError, Scheduler, priority};

type Log = Arc<Mutex<Vec<String>>>;

fn record(scheduler: &Scheduler, kind: &str, label: &'static str, log: &Log) {
    let log = Arc::clone(log);
    scheduler.subscribe(EventKind::custom(kind), move |_event| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(label.to_owned());
            Ok::<(), HandlerError>(())
        }
    });
}

/// A handler that reacts to `spark` by publishing `fire`, which reacts by
/// publishing `ash`. Each generation lands in the following drain.
#[tokio::test]
async fn chain_reactions_advance_one_generation_per_drain() {
    let scheduler = Scheduler::default();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    for (from, to) in [("spark", "fire"), ("fire", "ash")] {
        let publisher = scheduler.publisher();
        let log = Arc::clone(&log);
        scheduler.subscribe(EventKind::custom(from), move |_event| {
            let publisher = publisher.clone();
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(from.to_owned());
                publisher.publish(Event::custom(to, serde_json::Value::Null));
                Ok(())
            }
        });
    }
    record(&scheduler, "ash", "ash", &log);

    scheduler.publish(Event::custom("spark", serde_json::Value::Null));

    let reports = [
        scheduler.drain().await,
        scheduler.drain().await,
        scheduler.drain().await,
        scheduler.drain().await,
    ];

    let delivered: Vec<_> = reports.iter().map(|r| r.delivered).collect();
    assert_eq!(delivered, vec![1, 1, 1, 0]);
    assert_eq!(*log.lock().unwrap(), vec!["spark", "fire", "ash"]);
    assert_eq!(scheduler.pending_len(), 0);
}

#[tokio::test]
async fn priorities_interleave_across_publishers() {
    let scheduler = Scheduler::default();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    for kind in ["storm", "breeze", "quake", "drizzle"] {
        record(&scheduler, kind, kind, &log);
    }

    let a = scheduler.publisher();
    let b = scheduler.publisher();
    a.publish(Event::custom("drizzle", serde_json::Value::Null).with_priority(priority::LOW));
    b.publish(Event::custom("storm", serde_json::Value::Null).with_priority(priority::HIGH));
    a.publish(Event::custom("breeze", serde_json::Value::Null));
    b.publish(Event::custom("quake", serde_json::Value::Null).with_priority(priority::CRITICAL));

    scheduler.drain().await;
    assert_eq!(*log.lock().unwrap(), vec!["quake", "storm", "breeze", "drizzle"]);
}

#[tokio::test]
async fn one_event_reaches_kind_and_category_audiences() {
    let scheduler = Scheduler::default();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    record(&scheduler, "bloom", "bloom", &log);
    record(&scheduler, "pollen", "pollen", &log);

    let audit = Arc::clone(&log);
    scheduler.subscribe_category(EventCategory::custom("ecology"), move |event| {
        let audit = Arc::clone(&audit);
        async move {
            audit.lock().unwrap().push(format!("ecology:{}", event.kind()));
            Ok(())
        }
    });

    scheduler.publish(
        Event::custom("bloom", serde_json::json!({ "x": 3 }))
            .also_to_kind(EventKind::custom("pollen"))
            .also_to_category(EventCategory::custom("ecology")),
    );
    let report = scheduler.drain().await;

    assert_eq!(report.events, 1);
    assert_eq!(report.delivered, 3);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["bloom", "pollen", "ecology:bloom"]
    );
}

#[tokio::test]
async fn failing_subscriber_does_not_starve_the_rest_of_the_queue() {
    let scheduler = Scheduler::default();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    scheduler.subscribe(EventKind::custom("flood"), |_event| async {
        Err(HandlerError::msg("levee broke"))
    });
    record(&scheduler, "flood", "flood", &log);
    record(&scheduler, "drought", "drought", &log);

    scheduler.publish(Event::custom("flood", serde_json::Value::Null).with_priority(priority::HIGH));
    scheduler.publish(Event::custom("drought", serde_json::Value::Null));
    let report = scheduler.drain().await;

    assert_eq!(report.failures, 1);
    assert_eq!(report.delivered, 2);
    assert_eq!(*log.lock().unwrap(), vec!["flood", "drought"]);
}
