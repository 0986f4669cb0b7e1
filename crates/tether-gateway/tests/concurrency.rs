mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tether_gateway::{ClientId, EventDispatcher, IdentityRegistry, NetworkServer, PeerHandle};
use tokio_test::assert_ok;

use common::*;

#[test]
fn registry_stays_consistent_under_concurrent_writers() {
    const WRITERS: u32 = 4;
    const ROUNDS: u32 = 500;

    let registry = IdentityRegistry::new();
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut checks = 0usize;
            while !done.load(Ordering::SeqCst) {
                assert!(registry.is_consistent());
                for (client, peer) in registry.snapshot_pairs() {
                    // a pair may vanish between snapshot and lookup, but never half of it
                    if let Some(found) = registry.resolve_peer(&client) {
                        assert_eq!(found, peer);
                    }
                    if let Some(found) = registry.resolve_identity(peer) {
                        assert_eq!(found, client);
                    }
                }
                checks += 1;
            }
            checks
        });

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let registry = &registry;
                scope.spawn(move || {
                    for round in 0..ROUNDS {
                        let peer = PeerHandle::new(w * ROUNDS + round);
                        let client = ClientId::generate();
                        registry.add_session(client, peer).unwrap();
                        if round % 2 == 0 {
                            assert_eq!(registry.remove_peer(peer), Some(client));
                        } else {
                            assert_eq!(registry.remove_session(&client), Some(peer));
                        }
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        assert!(reader.join().unwrap() > 0);
    });

    assert!(registry.is_empty());
    assert!(registry.is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn publishing_tolerates_concurrent_subscription_changes() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let stable = Arc::new(Recorder::default());
    dispatcher.subscribe(stable.clone());

    let churn = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            for _ in 0..200 {
                let transient: Arc<dyn tether_gateway::NetworkEventHandler> =
                    Arc::new(Recorder::default());
                dispatcher.subscribe(Arc::clone(&transient));
                tokio::task::yield_now().await;
                dispatcher.unsubscribe(&transient);
            }
        })
    };

    for _ in 0..200 {
        dispatcher
            .notify_connected(ClientId::generate(), "127.0.0.1:4000")
            .await;
    }
    churn.await.unwrap();

    assert_eq!(stable.count(), 200);
    assert_eq!(dispatcher.handler_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sends_racing_with_stop_are_harmless() {
    let (gateway, network) = gateway();
    let mut events = gateway.event_receiver();
    assert_ok!(gateway.start(9050).await);

    let mut clients = Vec::new();
    for port in 4000..4008 {
        network.connect_peer(endpoint(port)).unwrap();
        clients.push(expect_connected(&mut events).await.client_id);
    }

    let senders: Vec<_> = clients
        .iter()
        .map(|client| {
            let gateway = gateway.clone();
            let client = *client;
            tokio::spawn(async move {
                for _ in 0..50 {
                    gateway.send_to_client(client, b"x").await;
                    gateway.send_to_all_clients(b"y").await;
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    gateway.stop().await;
    for sender in senders {
        sender.await.unwrap();
    }

    assert!(gateway.connected_clients().is_empty());
    let mut shut_down = 0;
    while let Ok(event) = events.try_recv() {
        if let tether_gateway::GatewayEvent::ClientDisconnected(e) = event {
            assert_eq!(e.reason, tether_gateway::DisconnectReason::ServerShutdown);
            shut_down += 1;
        }
    }
    assert_eq!(shut_down, clients.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_stop_cycles_from_many_tasks_settle_cleanly() {
    let (gateway, network) = gateway();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    if i % 2 == 0 {
                        let _ = gateway.start(9050).await;
                    } else {
                        gateway.stop().await;
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    gateway.stop().await;
    assert!(!gateway.is_running());
    assert!(!network.is_running());
    assert_ok!(gateway.start(9050).await);
    assert!(network.is_running());
    gateway.stop().await;
}
