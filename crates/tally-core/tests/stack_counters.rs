//! Stack counters must not depend on the order increments arrive in.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use tally_core::domain::{OrganizationId, ProjectId, Stack, StackId};
use tally_core::impls::InMemoryStackRepository;
use tally_core::ports::StackRepository;

#[derive(Debug, Clone, Copy)]
struct Batch {
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    count: u64,
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn batch() -> impl Strategy<Value = Batch> {
    (0i64..100_000, -500i64..5_000, 1u64..1_000).prop_map(|(start, span, count)| Batch {
        first: base() + Duration::minutes(start),
        // negative spans arrive reversed
        last: base() + Duration::minutes(start + span),
        count,
    })
}

fn batches_and_permutation() -> impl Strategy<Value = (Vec<Batch>, Vec<Batch>)> {
    prop::collection::vec(batch(), 1..20).prop_flat_map(|batches| {
        let shuffled = Just(batches.clone()).prop_shuffle();
        (Just(batches), shuffled)
    })
}

fn fresh_stack() -> Stack {
    Stack::new(
        StackId::generate(),
        OrganizationId::generate(),
        ProjectId::generate(),
        "sig",
    )
}

async fn apply_through_repository(stack: &Stack, batches: &[Batch]) -> Stack {
    let repo = InMemoryStackRepository::new();
    repo.add(stack.clone()).await.unwrap();
    let mut latest = stack.clone();
    for b in batches {
        latest = repo
            .increment_event_counter(
                stack.organization_id,
                stack.project_id,
                stack.id,
                b.first,
                b.last,
                b.count,
            )
            .await
            .unwrap();
    }
    latest
}

proptest! {
    #[test]
    fn any_order_gives_the_same_counters((batches, shuffled) in batches_and_permutation()) {
        let template = fresh_stack();

        let mut in_order = template.clone();
        for b in &batches {
            in_order.apply_occurrences(b.first, b.last, b.count);
        }
        let mut reordered = template.clone();
        for b in &shuffled {
            reordered.apply_occurrences(b.first, b.last, b.count);
        }
        prop_assert_eq!(&in_order, &reordered);

        let expected_total: u64 = batches.iter().map(|b| b.count).sum();
        prop_assert_eq!(in_order.total_occurrences, expected_total);
        let min = batches.iter().map(|b| b.first.min(b.last)).min();
        let max = batches.iter().map(|b| b.first.max(b.last)).max();
        prop_assert_eq!(in_order.first_occurrence, min);
        prop_assert_eq!(in_order.last_occurrence, max);

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let stored = rt.block_on(apply_through_repository(&template, &shuffled));
        prop_assert_eq!(&stored, &in_order);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_are_not_lost() {
    let repo = Arc::new(InMemoryStackRepository::new());
    let stack = repo.add(fresh_stack()).await.unwrap();

    let mut tasks = Vec::new();
    for n in 0..16i64 {
        let repo = Arc::clone(&repo);
        let stack = stack.clone();
        tasks.push(tokio::spawn(async move {
            let at = base() + Duration::hours(n);
            repo.increment_event_counter(
                stack.organization_id,
                stack.project_id,
                stack.id,
                at,
                at + Duration::minutes(30),
                10,
            )
            .await
            .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stored = repo.get_by_id(stack.id).await.unwrap().unwrap();
    assert_eq!(stored.total_occurrences, 160);
    assert_eq!(stored.first_occurrence, Some(base()));
    assert_eq!(
        stored.last_occurrence,
        Some(base() + Duration::hours(15) + Duration::minutes(30))
    );
}

#[tokio::test]
async fn increment_for_wrong_project_is_rejected() {
    let repo = InMemoryStackRepository::new();
    let stack = repo.add(fresh_stack()).await.unwrap();

    let err = repo
        .increment_event_counter(
            stack.organization_id,
            ProjectId::generate(),
            stack.id,
            base(),
            base(),
            1,
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let stored = repo.get_by_id(stack.id).await.unwrap().unwrap();
    assert_eq!(stored.total_occurrences, 0);
}
