//! Queue manager property tests: range allocation, persistence and clamping

mod helpers;

use helpers::prompts;
use sbm_common::events::QueueStatus;
use sbm_studio::queue::QueueManager;
use std::collections::HashMap;
use tempfile::TempDir;

#[tokio::test]
async fn test_ranges_are_disjoint_and_within_pool() {
    let dir = TempDir::new().unwrap();
    let manager = QueueManager::load(&dir.path().join("queue_state.json")).unwrap();
    let pool = prompts(40);

    let mut entries = Vec::new();
    for (account, size) in [("a", 7), ("b", 1), ("c", 12), ("a", 5), ("d", 9)] {
        entries.push(manager.add_queue_entry(account, size, 1, pool.clone()).await.unwrap());
    }
    // Exceeds the 6 prompts left
    assert!(manager.add_queue_entry("e", 7, 1, pool.clone()).await.is_err());

    let mut ranges: Vec<(usize, usize)> = entries.iter().map(|e| e.prompts_range).collect();
    ranges.sort();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "overlap: {:?}", pair);
    }
    assert!(ranges.iter().all(|(s, e)| s < e && *e <= pool.len()));
    assert_eq!(manager.prompt_cursor().await, 34);
}

#[tokio::test]
async fn test_cursor_never_decreases_until_clear() {
    let dir = TempDir::new().unwrap();
    let manager = QueueManager::load(&dir.path().join("queue_state.json")).unwrap();
    let pool = prompts(20);

    let mut last = 0;
    let first = manager.add_queue_entry("a", 5, 5, pool.clone()).await.unwrap();
    for step in 0..4 {
        match step {
            0 => {
                manager.add_queue_entry("b", 3, 1, pool.clone()).await.unwrap();
            }
            1 => {
                manager.remove_queue_entry(first.id).await.unwrap();
            }
            2 => {
                manager
                    .update_queue_progress(first.id, Some(2), Some(QueueStatus::Completed))
                    .await
                    .unwrap();
            }
            _ => {
                let _ = manager.add_queue_entry("c", 50, 1, pool.clone()).await;
            }
        }
        let cursor = manager.prompt_cursor().await;
        assert!(cursor >= last);
        last = cursor;
    }
    assert_eq!(last, 8);

    manager.clear().await.unwrap();
    assert_eq!(manager.prompt_cursor().await, 0);
    assert!(manager.get_all_queues().await.is_empty());
}

#[tokio::test]
async fn test_capacity_failure_leaves_state_unchanged() {
    let dir = TempDir::new().unwrap();
    let manager = QueueManager::load(&dir.path().join("queue_state.json")).unwrap();
    let pool = prompts(10);
    manager.add_queue_entry("a", 8, 4, pool.clone()).await.unwrap();

    let before = (manager.prompt_cursor().await, manager.get_all_queues().await);
    assert_eq!(manager.available_prompt_slots().await, 2);

    let err = manager.add_queue_entry("b", 3, 1, pool).await.unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_PROMPTS");
    assert_eq!((manager.prompt_cursor().await, manager.get_all_queues().await), before);
    assert!(!manager.validate_total_prompts(3).await);
    assert!(manager.validate_total_prompts(2).await);
}

#[tokio::test]
async fn test_persistence_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queue_state.json");
    let pool = prompts(15);

    let manager = QueueManager::load(&path).unwrap();
    for (account, size) in [("a", 4), ("b", 6), ("c", 2)] {
        manager.add_queue_entry(account, size, 2, pool.clone()).await.unwrap();
    }
    let originals: HashMap<_, _> = manager
        .get_all_queues()
        .await
        .into_iter()
        .map(|q| (q.id, q))
        .collect();

    let reloaded = QueueManager::load(&path).unwrap();
    assert_eq!(reloaded.prompts().await, pool);
    assert_eq!(reloaded.prompt_cursor().await, 12);
    let reloaded_queues: HashMap<_, _> = reloaded
        .get_all_queues()
        .await
        .into_iter()
        .map(|q| (q.id, q))
        .collect();
    assert_eq!(reloaded_queues, originals);
}

#[tokio::test]
async fn test_progress_is_clamped_to_total() {
    let dir = TempDir::new().unwrap();
    let manager = QueueManager::load(&dir.path().join("queue_state.json")).unwrap();
    let entry = manager.add_queue_entry("a", 5, 5, prompts(5)).await.unwrap();

    assert!(manager.update_queue_progress(entry.id, Some(99), None).await.unwrap());
    let stored = manager.get_queue(entry.id).await.unwrap();
    assert_eq!(stored.completed_count, 5);
    assert_eq!(stored.status, QueueStatus::Pending);
}

#[tokio::test]
async fn test_failed_write_keeps_prior_state() {
    // Given: a manager whose state file path is taken by a directory
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queue_state.json");
    let manager = QueueManager::load(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    // When: an entry is added
    let err = manager.add_queue_entry("a", 2, 1, prompts(4)).await.unwrap_err();

    // Then: the write fails and nothing was committed in memory
    assert_eq!(err.code(), "PERSISTENCE_FAILED");
    assert_eq!(manager.prompt_cursor().await, 0);
    assert!(manager.get_all_queues().await.is_empty());
    assert!(manager.prompts().await.is_empty());
}
