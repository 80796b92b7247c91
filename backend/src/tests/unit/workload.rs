use quoteflow_shared::UserRole;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::automation::{AutomationError, BestEffortBalancer, WorkloadBalancer};
use crate::store::MemoryStore;
use crate::tests::fixtures::*;

#[tokio::test]
async fn test_balanced_pick_uses_lowest_workload() {
    let store = MemoryStore::new();
    let busy = user(UserRole::Tech);
    let idle = user(UserRole::Tech);
    store.add_user(busy.clone()).await;
    store.add_user(idle.clone()).await;
    insert_open_items(&store, busy.id, 3).await;
    insert_open_items(&store, idle.id, 1).await;

    let balancer = BestEffortBalancer::new(Arc::new(store));
    let picked = balancer.select_assignee(UserRole::Tech, true).await.unwrap();

    assert_eq!(picked.id, idle.id);
}

#[tokio::test]
async fn test_pending_cost_calculations_count_as_workload() {
    let store = MemoryStore::new();
    let first = user(UserRole::Vpp);
    let second = user(UserRole::Vpp);
    store.add_user(first.clone()).await;
    store.add_user(second.clone()).await;

    let mut pending = cost_calculation(uuid::Uuid::new_v4(), Decimal::new(100, 0));
    pending.calculated_by_id = Some(first.id);
    store.add_cost_calculation(pending).await;

    let balancer = BestEffortBalancer::new(Arc::new(store));
    let picked = balancer.select_assignee(UserRole::Vpp, true).await.unwrap();

    assert_eq!(picked.id, second.id);
}

#[tokio::test]
async fn test_closed_items_do_not_count() {
    let store = MemoryStore::new();
    let first = user(UserRole::Tech);
    let second = user(UserRole::Tech);
    store.add_user(first.clone()).await;
    store.add_user(second.clone()).await;

    let (_, mut done) = insert_inquiry_with_item(&store).await;
    done.id = uuid::Uuid::new_v4();
    done.assigned_to_id = Some(first.id);
    done.status = "COMPLETED".to_string();
    store.add_item(done).await;
    insert_open_items(&store, second.id, 1).await;

    let balancer = BestEffortBalancer::new(Arc::new(store));
    let picked = balancer.select_assignee(UserRole::Tech, true).await.unwrap();

    assert_eq!(picked.id, first.id);
}

#[tokio::test]
async fn test_random_pick_stays_within_role() {
    let store = MemoryStore::new();
    let tech = user(UserRole::Tech);
    let mut retired = user(UserRole::Tech);
    retired.is_active = false;
    store.add_user(tech.clone()).await;
    store.add_user(retired).await;
    store.add_user(user(UserRole::Sales)).await;

    let balancer = BestEffortBalancer::new(Arc::new(store));
    for _ in 0..10 {
        let picked = balancer.select_assignee(UserRole::Tech, false).await.unwrap();
        assert_eq!(picked.id, tech.id);
    }
}

#[tokio::test]
async fn test_no_candidates_is_an_error() {
    let store = MemoryStore::new();
    store.add_user(user(UserRole::Sales)).await;

    let balancer = BestEffortBalancer::new(Arc::new(store));
    let result = balancer.select_assignee(UserRole::Vp, true).await;

    assert!(matches!(result, Err(AutomationError::NoUserForRole(UserRole::Vp))));
}
