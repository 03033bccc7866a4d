//! End-to-end behaviour of a world across several ticks.

#![allow(clippy::unwrap_used, clippy::float_cmp, clippy::indexing_slicing)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use verdant_core::request::serve;
use verdant_core::{
    Component, MemorySnapshotSink, Node, RequestBridge, Subsystem, SubsystemError, World,
};
use verdant_events::{Event, EventKind};
use verdant_types::{Layer, NodeId};

/// Population counts per species.
struct Census {
    counts: Arc<Mutex<BTreeMap<String, u32>>>,
}

impl Component for Census {
    fn kind(&self) -> &str {
        "census"
    }

    fn version(&self) -> u32 {
        2
    }

    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&*self.counts.lock().unwrap())
    }
}

/// Grows vegetation wherever there is soil moisture and reports the total.
struct Growth;

impl Subsystem for Growth {
    fn name(&self) -> &str {
        "growth"
    }

    fn run<'a>(&'a self, world: &'a World, tick: u64) -> BoxFuture<'a, Result<(), SubsystemError>> {
        async move {
            let grown = world.with_field_mut(|field| {
                let mut grown = 0_u32;
                field.for_each_active_chunk_mut(|_, chunk| {
                    chunk.for_each_cell_mut(|_, _, cell| {
                        let moisture = cell.get(Layer::SoilMoisture.index()).copied().unwrap_or(0.0);
                        if moisture > 0.0 {
                            if let Some(vegetation) = cell.get_mut(Layer::Vegetation.index()) {
                                *vegetation += 0.1;
                                grown = grown.saturating_add(1);
                            }
                        }
                    });
                });
                grown
            });
            world.scheduler().publish(Event::custom(
                "growth_report",
                serde_json::json!({ "tick": tick, "cells": grown }),
            ));
            Ok(())
        }
        .boxed()
    }
}

fn world_with(sink: Arc<MemorySnapshotSink>) -> World {
    World::builder()
        .dimensions(40, 40)
        .chunk_size(16)
        .sink(sink)
        .build()
        .unwrap()
}

#[tokio::test]
async fn ticks_snapshot_nodes_and_deliver_subsystem_events() {
    let sink = Arc::new(MemorySnapshotSink::new());
    let world = world_with(Arc::clone(&sink));

    // One partial edge chunk: cells 32..40 in both axes.
    world.with_field_mut(|field| field.set(35, 35, Layer::SoilMoisture, 0.5));
    world.register_subsystem(Arc::new(Growth));

    let counts = Arc::new(Mutex::new(BTreeMap::new()));
    counts.lock().unwrap().insert("fern".to_owned(), 3);
    let id = NodeId::new(world.next_id("region"));
    world
        .insert_node(Node::new(id.clone(), "region").with_component(Census {
            counts: Arc::clone(&counts),
        }))
        .unwrap();

    let reports = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&reports);
    world
        .scheduler()
        .subscribe(EventKind::custom("growth_report"), move |event| {
            let log = Arc::clone(&log);
            async move {
                let cells = event.custom_data().and_then(|d| d["cells"].as_u64());
                log.lock().unwrap().push(cells);
                Ok(())
            }
        });

    let first = world.tick().await.unwrap();
    counts.lock().unwrap().insert("moss".to_owned(), 1);
    let second = world.tick().await.unwrap();

    // Only the 8x8 in-world part of the edge chunk is visited.
    assert_eq!(first.environment.unwrap().cells_visited, 64);
    assert_eq!(second.tick, 2);
    assert_eq!(*reports.lock().unwrap(), vec![Some(1), Some(1)]);
    assert!(world.with_field(|f| f.get(35, 35, Layer::Vegetation)) > 0.0);

    let snapshots = sink.snapshots();
    assert_eq!(snapshots.len(), 2);
    let first_census = snapshots[0].node(&id).unwrap().component("census").unwrap();
    let second_census = snapshots[1].node(&id).unwrap().component("census").unwrap();
    assert_eq!(first_census.version, 2);
    assert_eq!(first_census.data, serde_json::json!({ "fern": 3 }));
    assert_eq!(second_census.data, serde_json::json!({ "fern": 3, "moss": 1 }));
}

#[tokio::test]
async fn requests_are_answered_by_the_next_tick() {
    let world = Arc::new(world_with(Arc::new(MemorySnapshotSink::new())));
    world.with_field_mut(|field| field.set(5, 5, Layer::Temperature, 21.0));

    let reader = Arc::clone(&world);
    serve(world.scheduler(), "temperature", move |data| {
        let x = data["x"].as_i64().ok_or("missing x")?;
        let y = data["y"].as_i64().ok_or("missing y")?;
        let value = reader.with_field(|field| field.get(x, y, Layer::Temperature));
        Ok(serde_json::json!(value))
    });

    let bridge = RequestBridge::new(world.scheduler(), "narrator");
    let (answer, report) = tokio::join!(
        bridge.request("temperature", serde_json::json!({ "x": 45, "y": 5 })),
        async {
            while world.scheduler().pending_len() == 0 {
                tokio::task::yield_now().await;
            }
            world.tick().await.unwrap()
        }
    );

    // x = 45 wraps to 5; the request is answered before the environment runs.
    assert_eq!(answer.unwrap(), serde_json::json!(21.0));
    assert_eq!(report.drains[0].events, 2);
}
