//! Model sharing, event fan-out and offloaded work across a live swarm

use crate::common::{directory, roomy_memory, spawner, CountingLoader};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use warden::spawner::SpawnerConfig;

#[tokio::test]
async fn test_swarm_loads_each_model_once() {
    let loader = Arc::new(CountingLoader::slow(40));
    let dir = directory(64, loader.clone());
    let spawner = spawner(dir.clone(), roomy_memory(), SpawnerConfig::default());

    let result = spawner.spawn_agents(40, "standard").await;
    assert_eq!(result.spawned, 40);
    assert_eq!(result.degraded, 0);
    // price_predictor and pattern_recognizer, once each
    assert_eq!(loader.calls(), 2);
    assert_eq!(dir.models().loads_started(), 2);

    let a = dir.get_model("price_predictor").await.unwrap();
    let b = dir.get_model("price_predictor").await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    spawner.shutdown().await;
}

#[tokio::test]
async fn test_events_reach_agents_subscribed_before_publish() {
    let dir = directory(16, Arc::new(CountingLoader::default()));
    let spawner = spawner(dir.clone(), roomy_memory(), SpawnerConfig::default());

    dir.publish(json!({"mint": "early"}));
    let ids = spawner.spawn_agents(3, "standard").await.agent_ids;
    let delivery = dir.publish(json!({"mint": "late", "px": 42}));
    assert_eq!(delivery.delivered, 3);
    assert_eq!(delivery.failed, 0);

    tokio::time::sleep(Duration::from_millis(80)).await;
    for id in &ids {
        let agent = spawner.agent(id).unwrap();
        assert_eq!(agent.feed().received(), 1);
        let (seq, body) = agent.latest_event_digest().unwrap();
        assert_eq!(seq, delivery.seq);
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["mint"], "late");
    }
    spawner.shutdown().await;
    assert_eq!(dir.stream().subscriber_count(), 0);
}

#[tokio::test]
async fn test_stream_keeps_most_recent_events() {
    let dir = directory(4, Arc::new(CountingLoader::default()));
    for i in 0..100 {
        dir.publish(json!({ "i": i }));
    }
    let retained = dir.stream().snapshot();
    assert_eq!(retained.len(), 64);
    assert_eq!(retained[0].payload["i"], 36);
    assert_eq!(retained[63].payload["i"], 99);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_offloaded_work_runs_off_the_async_workers() {
    let dir = directory(4, Arc::new(CountingLoader::default()));
    let tasks: Vec<_> = (0..16u64)
        .map(|n| {
            let dir = dir.clone();
            tokio::spawn(async move {
                dir.execute_offloaded(move || (0..=n * 1000).sum::<u64>())
                    .await
            })
        })
        .collect();

    for (n, task) in tasks.into_iter().enumerate() {
        let n = n as u64 * 1000;
        assert_eq!(task.await.unwrap().unwrap(), n * (n + 1) / 2);
    }
    let stats = dir.offload().stats();
    assert_eq!(stats.completed, 16);
    assert_eq!(stats.in_flight, 0);
}
