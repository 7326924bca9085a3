//! Watermark-driven eviction and scale-up

use crate::common::{directory, roomy_memory, spawner, CountingLoader};
use std::collections::HashSet;
use std::sync::Arc;
use warden::spawner::{ScalingDecision, SpawnerConfig};
use warden::AgentId;

#[tokio::test]
async fn test_high_watermark_evicts_twenty_heaviest_of_one_twenty() {
    let dir = directory(200, Arc::new(CountingLoader::default()));
    let memory = roomy_memory();
    let config = SpawnerConfig {
        target_agents: 100,
        ..SpawnerConfig::default()
    };
    let spawner = spawner(dir.clone(), memory.clone(), config);

    let result = spawner.spawn_agents(120, "idle").await;
    assert_eq!(result.spawned, 120);

    // twenty agents hold extra memory outside their slabs
    let heavy: HashSet<AgentId> = result.agent_ids.iter().take(20).cloned().collect();
    for (i, id) in result.agent_ids.iter().take(20).enumerate() {
        let record = dir.record(id).unwrap();
        record.report_usage(1024 * (i + 1));
    }

    memory.set_utilization(95.0);
    let report = spawner.monitor_once().await;
    assert_eq!(report.decision, ScalingDecision::Evict(20));
    assert_eq!(report.evicted, 20);
    assert_eq!(report.unhealthy, 0);

    assert_eq!(spawner.agent_count(), 100);
    assert_eq!(dir.agent_count(), 100);
    for id in &heavy {
        assert!(spawner.agent(id).is_none());
        assert!(dir.record(id).is_none());
    }
    let snapshot = spawner.snapshot();
    assert_eq!(snapshot.evicted_total, 20);
    assert_eq!(snapshot.system_utilization_pct, 95.0);

    // still above the watermark, but already at target: one pass only
    let again = spawner.monitor_once().await;
    assert_eq!(again.decision, ScalingDecision::Hold);
    assert_eq!(spawner.agent_count(), 100);
    spawner.shutdown().await;
}

#[tokio::test]
async fn test_no_action_between_watermarks() {
    let dir = directory(50, Arc::new(CountingLoader::default()));
    let memory = roomy_memory();
    let config = SpawnerConfig {
        target_agents: 5,
        scale_up_step: 5,
        default_agent_type: "idle".to_string(),
        ..SpawnerConfig::default()
    };
    let spawner = spawner(dir, memory.clone(), config);
    spawner.spawn_agents(10, "idle").await;

    for pct in [55.0, 89.0, 51.0, 88.0] {
        memory.set_utilization(pct);
        let report = spawner.monitor_once().await;
        assert_eq!(report.decision, ScalingDecision::Hold);
    }
    assert_eq!(spawner.agent_count(), 10);

    memory.set_utilization(30.0);
    let report = spawner.monitor_once().await;
    assert_eq!(report.decision, ScalingDecision::Admit(5));
    assert_eq!(spawner.agent_count(), 15);
    spawner.shutdown().await;
}
