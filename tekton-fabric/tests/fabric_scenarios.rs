//! End-to-end scenarios across the assembled fabric.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use tekton_fabric::FabricRuntime;
use tekton_fabric::bus::{Headers, MessageBus, handler, topics};
use tekton_fabric::lifecycle::{ComponentState, MonitorConfig};
use tekton_fabric::primitives::{
    AvailabilityStatus, CapabilitySet, ComponentDescriptor, ComponentId,
};
use tekton_fabric::registry::RegistryConfig;
use tekton_fabric::store::{DbBackend, StoreConfig};

fn descriptor(id: &str, capability: &str) -> ComponentDescriptor {
    ComponentDescriptor::builder(ComponentId::new(id).unwrap())
        .name(id.to_uppercase())
        .unwrap()
        .version("1.0.0")
        .unwrap()
        .component_type("test")
        .unwrap()
        .capabilities(CapabilitySet::from_names([capability]))
        .build()
        .unwrap()
}

fn runtime(data_dir: &TempDir) -> FabricRuntime {
    FabricRuntime::builder(b"integration-secret".to_vec())
        .with_registry_config(RegistryConfig::new(Duration::from_millis(30), 3))
        .with_monitor_config(MonitorConfig::new(
            Duration::from_millis(200),
            Duration::from_millis(80),
            Duration::from_millis(20),
        ))
        .with_store_config(StoreConfig::new(data_dir.path()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn happy_path_registration() {
    let data = TempDir::new().unwrap();
    let fabric = runtime(&data);

    let completed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&completed);
    fabric
        .bus()
        .subscribe(
            topics::REGISTRATION_COMPLETED,
            handler(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .await
        .unwrap();

    let token = fabric
        .registration()
        .register(descriptor("athena", "plan"), None)
        .await
        .unwrap()
        .encode()
        .unwrap();

    let athena = ComponentId::new("athena").unwrap();
    assert!(fabric.registry().get(&athena).await.is_some());

    let by_capability = fabric.registry().find_by_capability("plan").await;
    assert_eq!(by_capability.len(), 1);
    assert_eq!(by_capability[0].id(), &athena);

    assert!(fabric.registration().validate(&athena, &token).await);
    assert_eq!(completed.load(Ordering::SeqCst), 1);

    fabric.shutdown().await;
}

#[tokio::test]
async fn heartbeat_keeps_component_available_then_offline_once() {
    let data = TempDir::new().unwrap();
    let fabric = runtime(&data);
    let athena = ComponentId::new("athena").unwrap();

    let offline_events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&offline_events);
    fabric.registry().on_updated(Arc::new(move |_, descriptor| {
        if descriptor.availability().status == AvailabilityStatus::Offline {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }));

    let token = fabric
        .registration()
        .register(descriptor("athena", "plan"), None)
        .await
        .unwrap()
        .encode()
        .unwrap();

    // Heartbeat through one full offline window; the component stays
    // available the whole time.
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(12)).await;
        fabric
            .registration()
            .heartbeat(&athena, &token, None)
            .await
            .unwrap();
        fabric.registry().sweep_once().await;
        assert_eq!(
            fabric.registry().get(&athena).await.unwrap().availability().status,
            AvailabilityStatus::Available
        );
    }

    // Silence past 3x the check interval: exactly one offline callback,
    // and repeated sweeps do not re-fire it.
    tokio::time::sleep(Duration::from_millis(120)).await;
    fabric.registry().sweep_once().await;
    fabric.registry().sweep_once().await;
    assert_eq!(offline_events.load(Ordering::SeqCst), 1);
    assert_eq!(
        fabric.registry().get(&athena).await.unwrap().availability().status,
        AvailabilityStatus::Offline
    );
    // Offline components are retained, not removed.
    assert_eq!(fabric.registry().len().await, 1);

    fabric.shutdown().await;
}

#[tokio::test]
async fn register_unregister_register_rotates_tokens() {
    let data = TempDir::new().unwrap();
    let fabric = runtime(&data);
    let athena = ComponentId::new("athena").unwrap();

    let first = fabric
        .registration()
        .register(descriptor("athena", "plan"), None)
        .await
        .unwrap()
        .encode()
        .unwrap();
    fabric
        .registration()
        .unregister(&athena, &first)
        .await
        .unwrap();

    let second = fabric
        .registration()
        .register(descriptor("athena", "plan"), None)
        .await
        .unwrap()
        .encode()
        .unwrap();

    assert!(!fabric.registration().validate(&athena, &first).await);
    assert!(fabric.registration().validate(&athena, &second).await);

    fabric.shutdown().await;
}

#[tokio::test]
async fn stuck_startup_degrades_dependent_component() {
    let data = TempDir::new().unwrap();
    let fabric = Arc::new(runtime(&data));
    let engram = ComponentId::new("engram").unwrap();
    let athena = ComponentId::new("athena").unwrap();

    fabric
        .supervisor()
        .register_component(engram.clone(), Vec::new(), serde_json::Map::new())
        .await;
    fabric
        .supervisor()
        .register_component(athena.clone(), vec![engram.clone()], serde_json::Map::new())
        .await;

    let for_engram = Arc::clone(&fabric);
    let engram_id = engram.clone();
    let engram_start = tokio::spawn(async move {
        for_engram
            .supervisor()
            .start_component(
                &engram_id,
                async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    true
                },
                Duration::from_millis(400),
            )
            .await
    });

    let for_athena = Arc::clone(&fabric);
    let athena_id = athena.clone();
    let athena_start = tokio::spawn(async move {
        for_athena
            .supervisor()
            .start_component(
                &athena_id,
                async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    true
                },
                Duration::from_millis(400),
            )
            .await
    });

    // Both exceed the initializing window; the monitor arbitrates.
    tokio::time::sleep(Duration::from_millis(120)).await;
    fabric.supervisor().monitor().sweep_once().await;

    let (athena_state, metadata) = fabric.supervisor().status(&athena).await;
    assert_eq!(athena_state, ComponentState::Degraded);
    assert_eq!(metadata["blocked_by"][0], "engram");
    assert_eq!(metadata["degraded_reason"], "dependency_timeout");

    let (engram_state, metadata) = fabric.supervisor().status(&engram).await;
    assert_eq!(engram_state, ComponentState::Failed);
    assert_eq!(metadata["failure_reason"], "start_timeout");

    let _ = athena_start.await.unwrap();
    let _ = engram_start.await.unwrap();
    fabric.shutdown().await;
}

#[tokio::test]
async fn dependency_cycle_is_broken_and_announced() {
    let data = TempDir::new().unwrap();
    let fabric = runtime(&data);

    let deadlocks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&deadlocks);
    fabric
        .bus()
        .subscribe(
            topics::LIFECYCLE_DEADLOCK,
            handler(move |envelope| {
                let counter = Arc::clone(&counter);
                async move {
                    assert_eq!(
                        envelope.payload()["removed_edges"].as_array().unwrap().len(),
                        1
                    );
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .await
        .unwrap();

    let monitor = fabric.supervisor().monitor();
    let (x, y, z) = (
        ComponentId::new("x").unwrap(),
        ComponentId::new("y").unwrap(),
        ComponentId::new("z").unwrap(),
    );
    monitor.register_dependency(x.clone(), vec![y.clone()]).await;
    monitor.register_dependency(y.clone(), vec![z.clone()]).await;
    monitor.register_dependency(z.clone(), vec![x.clone()]).await;

    let removed = monitor.resolve_cycles().await;
    assert_eq!(removed.len(), 1);
    assert!(monitor.detect_cycles().await.is_empty());
    assert_eq!(deadlocks.load(Ordering::SeqCst), 1);

    fabric.shutdown().await;
}

#[tokio::test]
async fn vector_round_trip_with_filter() {
    let data = TempDir::new().unwrap();
    let fabric = runtime(&data);

    let vectors = fabric.database().get_vector_db("n", None).await.unwrap();
    vectors
        .store(
            "u1",
            vec![1.0, 0.0],
            Some(json!({"kind": "test"}).as_object().unwrap().clone()),
            None,
        )
        .await
        .unwrap();

    let filter = json!({"kind": "test"}).as_object().unwrap().clone();
    let hits = vectors
        .search(&[0.9, 0.1], 1, Some(&filter))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "u1");
    assert!(hits[0].relevance >= 0.99);

    assert_eq!(vectors.delete(Some("u1"), None).await.unwrap(), 1);
    assert!(vectors.get("u1").await.unwrap().is_none());

    fabric.shutdown().await;
}

#[tokio::test]
async fn unreachable_kv_backend_falls_back_to_file() {
    let data = TempDir::new().unwrap();
    let fabric = FabricRuntime::builder(b"integration-secret".to_vec())
        .with_store_config(
            StoreConfig::new(data.path()).with_redis_url("redis://127.0.0.1:1"),
        )
        .build()
        .unwrap();

    let kv = fabric.database().get_key_value_db("cfg", None).await.unwrap();
    assert_eq!(kv.backend(), DbBackend::File);

    kv.set("k", json!("v"), None).await.unwrap();
    assert_eq!(kv.get("k").await.unwrap(), Some(json!("v")));

    fabric.shutdown().await;
}

#[tokio::test]
async fn bus_driven_registration_round_trip() {
    let data = TempDir::new().unwrap();
    let fabric = runtime(&data);
    fabric.start().await.unwrap();

    let responses = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&responses);
    fabric
        .bus()
        .subscribe(
            "tekton.registration.response.#",
            handler(move |envelope| {
                let counter = Arc::clone(&counter);
                async move {
                    assert_eq!(envelope.payload()["success"], true);
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .await
        .unwrap();

    fabric
        .bus()
        .publish(
            topics::REGISTRATION_REQUEST,
            json!({
                "component_id": "ergon",
                "name": "Ergon",
                "version": "2.0.0",
                "type": "agent",
                "capabilities": ["task.execute"],
            }),
            Headers::new(),
        )
        .await
        .unwrap();

    assert_eq!(responses.load(Ordering::SeqCst), 1);
    let ergon = ComponentId::new("ergon").unwrap();
    assert!(fabric.registry().get(&ergon).await.is_some());

    fabric.shutdown().await;
}
