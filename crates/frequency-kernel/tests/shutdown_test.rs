//! End-to-end tests: clients cycling through their adapters, client stops
//! and the shutdown coordinator.

mod common;

use acton_reactive::prelude::*;
use tokio::sync::mpsc;
use tokio::time::Duration;

use frequency_kernel::actors::allocator;
use frequency_kernel::messages::StopClient;
use frequency_kernel::{
    ActorRef, AllocatorShutdown, Client, ClientConfig, ClientReport, Role, ShutdownConfig,
    ShutdownCoordinator, System, ALLOCATOR_NAME,
};

use common::{pool_config, settle, spawn_allocator};

const UNIVERSE: [u32; 6] = [10, 11, 12, 13, 14, 15];

fn shutdown_config() -> ShutdownConfig {
    ShutdownConfig {
        max_retries: 40,
        retry_interval_ms: 25,
    }
}

async fn collect_reports(rx: &mut mpsc::Receiver<ClientReport>, count: usize) -> Vec<ClientReport> {
    let mut reports = Vec::new();
    while reports.len() < count {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(report)) => reports.push(report),
            _ => break,
        }
    }
    reports
}

#[tokio::test]
async fn test_clients_cycle_and_shutdown_completes() {
    let mut runtime = ActonApp::launch_async().await;
    let system = System::new();
    let alloc = spawn_allocator(&mut runtime, &system, pool_config(&UNIVERSE, 0)).await;

    let (tx, mut rx) = mpsc::channel(16);
    let config = ClientConfig {
        hold_ms: 20,
        pause_ms: 5,
    };
    for _ in 0..3 {
        Client::new(config.clone(), system.clone())
            .with_observer(tx.clone())
            .spawn(&mut runtime)
            .await;
    }

    tokio::time::sleep(Duration::from_millis(300)).await;

    let snapshot = allocator::inspect(&alloc.handle).await.unwrap();
    assert_eq!(snapshot.total(), UNIVERSE.len());
    for (_, holder) in &snapshot.assigned {
        assert!(system.is_alive(holder), "holders are live adapters");
    }

    let report = ShutdownCoordinator::new(system.clone(), shutdown_config())
        .run()
        .await;
    assert_eq!(report.allocator, AllocatorShutdown::Stopped);
    assert_eq!(report.clients_signalled, 3);
    assert!(report.lingering.is_empty(), "lingering: {:?}", report.lingering);
    assert!(report.is_complete());

    assert!(system.live_with_role(Role::Client).is_empty());
    assert!(system.live_with_role(Role::Adapter).is_empty());
    assert!(system.whereis(ALLOCATOR_NAME).is_none());

    let reports = collect_reports(&mut rx, 3).await;
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.stats.grants > 0));

    let _ = runtime.shutdown_all().await;
}

#[tokio::test]
async fn test_shutdown_reports_already_stopped() {
    let _runtime = ActonApp::launch_async().await;
    let system = System::new();

    let report = ShutdownCoordinator::new(system, shutdown_config()).run().await;
    assert_eq!(report.allocator, AllocatorShutdown::AlreadyStopped);
    assert_eq!(report.clients_signalled, 0);
    assert!(report.lingering.is_empty());
    assert_eq!(report.attempts, 0);
}

#[tokio::test]
async fn test_second_shutdown_finds_allocator_gone() {
    let mut runtime = ActonApp::launch_async().await;
    let system = System::new();
    spawn_allocator(&mut runtime, &system, pool_config(&UNIVERSE, 0)).await;

    let coordinator = ShutdownCoordinator::new(system.clone(), shutdown_config());
    assert_eq!(coordinator.run().await.allocator, AllocatorShutdown::Stopped);
    settle().await;
    assert_eq!(
        coordinator.run().await.allocator,
        AllocatorShutdown::AlreadyStopped
    );

    let _ = runtime.shutdown_all().await;
}

#[tokio::test]
async fn test_client_stop_mid_hold_reclaims_frequency() {
    let mut runtime = ActonApp::launch_async().await;
    let system = System::new();
    let alloc = spawn_allocator(&mut runtime, &system, pool_config(&UNIVERSE, 0)).await;

    let (tx, mut rx) = mpsc::channel(4);
    let (client, adapter) = Client::new(
        ClientConfig {
            hold_ms: 10_000,
            pause_ms: 10,
        },
        system.clone(),
    )
    .with_observer(tx)
    .spawn(&mut runtime)
    .await;

    settle().await;
    let snapshot = allocator::inspect(&alloc.handle).await.unwrap();
    assert_eq!(snapshot.holder_of(10), Some(&adapter.id));

    client.handle.send(StopClient).await;
    let reports = collect_reports(&mut rx, 1).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].held, Some(10));
    settle().await;

    assert!(!system.is_alive(&client.id));
    assert!(!system.is_alive(&adapter.id));

    let snapshot = allocator::inspect(&alloc.handle).await.unwrap();
    assert!(snapshot.assigned.is_empty(), "reclaimed through the adapter link");
    assert_eq!(snapshot.free.len(), UNIVERSE.len());

    let _ = runtime.shutdown_all().await;
}

#[tokio::test]
async fn test_shutdown_during_slow_releases() {
    let mut runtime = ActonApp::launch_async().await;
    let system = System::new();
    spawn_allocator(&mut runtime, &system, pool_config(&UNIVERSE[..2], 40)).await;

    let config = ClientConfig {
        hold_ms: 5,
        pause_ms: 0,
    };
    for _ in 0..4 {
        Client::new(config.clone(), system.clone())
            .spawn(&mut runtime)
            .await;
    }

    tokio::time::sleep(Duration::from_millis(200)).await;

    let report = ShutdownCoordinator::new(system.clone(), shutdown_config())
        .run()
        .await;
    assert_eq!(report.allocator, AllocatorShutdown::Stopped);
    assert!(report.lingering.is_empty(), "lingering: {:?}", report.lingering);
    assert!(system.live_with_role(Role::Adapter).is_empty());

    let _ = runtime.shutdown_all().await;
}

#[tokio::test]
async fn test_client_stop_while_waiting_on_release() {
    let mut runtime = ActonApp::launch_async().await;
    let system = System::new();
    let alloc = spawn_allocator(&mut runtime, &system, pool_config(&[10, 11], 300)).await;

    let (tx, mut rx) = mpsc::channel(4);
    let (client, adapter) = Client::new(
        ClientConfig {
            hold_ms: 20,
            pause_ms: 10_000,
        },
        system.clone(),
    )
    .with_observer(tx)
    .spawn(&mut runtime)
    .await;

    // Granted at once, release sent at ~20ms, answer held back until ~320ms
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(system.links_of(&adapter.id).is_empty(), "release already applied");

    client.handle.send(StopClient).await;
    let reports = collect_reports(&mut rx, 1).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].stats.grants, 1);
    assert_eq!(reports[0].stats.releases, 0);
    settle().await;

    assert!(!system.is_alive(&client.id));
    assert!(!system.is_alive(&adapter.id));

    let snapshot = allocator::inspect(&alloc.handle).await.unwrap();
    assert!(snapshot.assigned.is_empty());
    assert_eq!(snapshot.free, vec![10, 11]);

    let _ = runtime.shutdown_all().await;
}

#[tokio::test]
async fn test_client_stop_while_waiting_on_grant() {
    let mut runtime = ActonApp::launch_async().await;
    let system = System::new();
    let alloc = spawn_allocator(&mut runtime, &system, pool_config(&[10, 11], 300)).await;

    // The first client's delayed release keeps the allocator busy
    let (busy, _busy_adapter) = Client::new(
        ClientConfig {
            hold_ms: 20,
            pause_ms: 10_000,
        },
        system.clone(),
    )
    .spawn(&mut runtime)
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (tx, mut rx) = mpsc::channel(4);
    let (waiting, waiting_adapter) = Client::new(
        ClientConfig {
            hold_ms: 10_000,
            pause_ms: 10_000,
        },
        system.clone(),
    )
    .with_observer(tx)
    .spawn(&mut runtime)
    .await;

    // Its allocate is queued behind the release
    tokio::time::sleep(Duration::from_millis(50)).await;
    waiting.handle.send(StopClient).await;
    let reports = collect_reports(&mut rx, 1).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].stats.grants, 0);
    assert_eq!(reports[0].held, None);
    settle().await;

    assert!(!system.is_alive(&waiting.id));
    assert!(!system.is_alive(&waiting_adapter.id));
    assert!(system.is_alive(&busy.id));

    // Served after the delay: the dead adapter gets nothing
    let snapshot = allocator::inspect(&alloc.handle).await.unwrap();
    assert!(snapshot.assigned.is_empty());
    assert_eq!(snapshot.free, vec![10, 11]);

    let _ = runtime.shutdown_all().await;
}

#[tokio::test]
async fn test_unreachable_release_clears_held_frequency() {
    let mut runtime = ActonApp::launch_async().await;
    let system = System::new();
    let alloc = spawn_allocator(&mut runtime, &system, pool_config(&[10], 0)).await;

    let (tx, mut rx) = mpsc::channel(4);
    let (client, adapter) = Client::new(
        ClientConfig {
            hold_ms: 150,
            pause_ms: 10_000,
        },
        system.clone(),
    )
    .with_observer(tx)
    .spawn(&mut runtime)
    .await;

    // A normal stop leaves the linked adapter running
    tokio::time::sleep(Duration::from_millis(50)).await;
    allocator::stop(&alloc.handle, ActorRef::named(Role::Coordinator, "test"))
        .await
        .unwrap();
    settle().await;
    assert!(system.is_alive(&adapter.id));

    // The release finds no allocator
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!system.is_alive(&adapter.id));

    client.handle.send(StopClient).await;
    let reports = collect_reports(&mut rx, 1).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].stats.grants, 1);
    assert_eq!(reports[0].stats.failures, 1);
    assert_eq!(reports[0].held, None);

    let _ = runtime.shutdown_all().await;
}
