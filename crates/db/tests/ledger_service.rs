use std::sync::Arc;
use std::time::Duration;

use goodpoint_core::chrono::{DateTime, Utc};
use goodpoint_core::{
    GrantReceipt, GrantRequest, LedgerError, LedgerService, TransactionId, UserId,
};
use goodpoint_db::{connect_with_settings, migrations, InMemoryLedgerStore, SqlLedgerStore};

async fn sqlite_service() -> LedgerService<SqlLedgerStore> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("run migrations");
    LedgerService::new(SqlLedgerStore::new(pool))
}

fn single_point(sender: &str, receiver: &str, reason: &str) -> GrantRequest {
    GrantRequest::single_point(
        UserId(sender.to_string()),
        UserId(receiver.to_string()),
        reason,
    )
}

#[tokio::test]
async fn grant_reverse_rank_history_scenario() {
    let service = sqlite_service().await;

    let first = service.grant(single_point("U1", "U2", "great demo")).await.expect("first grant");
    assert_eq!(first.total, 1);

    let second = service.grant(single_point("U3", "U2", "nice work")).await.expect("second grant");
    assert_eq!(second.total, 2);

    let ranking = service.rank(10).await.expect("rank");
    assert_eq!(ranking.len(), 1);
    assert_eq!(ranking[0].user_id, UserId("U2".to_string()));
    assert_eq!(ranking[0].points, 2);

    let reversed = service
        .reverse(&first.transaction.id)
        .await
        .expect("reverse")
        .expect("first grant should be found");
    assert_eq!(reversed.total, 1);
    assert_eq!(reversed.transaction.reason, "great demo");

    let history = service.history(DateTime::<Utc>::UNIX_EPOCH).await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender_id, UserId("U3".to_string()));
    assert_eq!(history[0].receiver_id, UserId("U2".to_string()));
}

#[tokio::test]
async fn grant_totals_grow_monotonically() {
    let service = sqlite_service().await;

    let mut previous = 0;
    for round in 1..=5 {
        let receipt =
            service.grant(single_point("U1", "U2", "keeping the build green")).await.expect("grant");
        assert_eq!(receipt.total, previous + 1, "round {round} total");
        previous = receipt.total;
    }
}

#[tokio::test]
async fn reverse_is_idempotent() {
    let service = sqlite_service().await;

    let receipt = service.grant(single_point("U1", "U2", "great demo")).await.expect("grant");

    let first = service.reverse(&receipt.transaction.id).await.expect("first reverse");
    assert!(first.is_some(), "first reversal should find the grant");
    assert_eq!(first.expect("reversal outcome").total, 0);

    let second = service.reverse(&receipt.transaction.id).await.expect("second reverse");
    assert!(second.is_none(), "second reversal of the same id is a no-op");

    let ranking = service.rank(10).await.expect("rank");
    assert_eq!(ranking[0].points, 0, "tally decremented exactly once");
}

#[tokio::test]
async fn reverse_of_unknown_id_is_not_an_error() {
    let service = sqlite_service().await;

    let outcome =
        service.reverse(&TransactionId("no-such-id".to_string())).await.expect("reverse");
    assert!(outcome.is_none());
}

#[tokio::test]
async fn reverse_reports_inconsistent_state_and_rolls_back() {
    let service = sqlite_service().await;

    let receipt = service.grant(single_point("U1", "U2", "great demo")).await.expect("grant");

    // Simulate a legacy partial write: the tally row vanishes while the
    // transaction stays live.
    sqlx::query("DELETE FROM user_tally WHERE user_id = ?")
        .bind("U2")
        .execute(service.store().pool())
        .await
        .expect("drop tally row");

    let error = service
        .reverse(&receipt.transaction.id)
        .await
        .expect_err("reversal against missing tally must fail");
    assert!(matches!(error, LedgerError::InconsistentState { .. }));

    // The failed unit rolled back: the transaction is still in the log.
    let history = service.history(DateTime::<Utc>::UNIX_EPOCH).await.expect("history");
    assert_eq!(history.len(), 1, "failed reversal must not delete the transaction");
}

#[tokio::test]
async fn validation_failures_touch_no_state() {
    let service = sqlite_service().await;

    let error = service
        .grant(GrantRequest {
            sender: UserId("U1".to_string()),
            receiver: UserId("U2".to_string()),
            reason: "  ".to_string(),
            amount: 1,
        })
        .await
        .expect_err("blank reason must be rejected");
    assert!(matches!(error, LedgerError::Validation(_)));

    let history = service.history(DateTime::<Utc>::UNIX_EPOCH).await.expect("history");
    assert!(history.is_empty());
    let ranking = service.rank(10).await.expect("rank");
    assert!(ranking.is_empty());
}

#[tokio::test]
async fn rank_orders_by_points_and_respects_limit() {
    let service = sqlite_service().await;

    for _ in 0..3 {
        service.grant(single_point("U1", "U2", "review marathon")).await.expect("grant");
    }
    for _ in 0..2 {
        service.grant(single_point("U1", "U3", "incident response")).await.expect("grant");
    }
    service.grant(single_point("U2", "U1", "docs sweep")).await.expect("grant");

    let top_two = service.rank(2).await.expect("rank");
    assert_eq!(top_two.len(), 2);
    assert_eq!(top_two[0].user_id, UserId("U2".to_string()));
    assert_eq!(top_two[0].points, 3);
    assert_eq!(top_two[1].user_id, UserId("U3".to_string()));
    assert_eq!(top_two[1].points, 2);

    let none = service.rank(0).await.expect("rank zero");
    assert!(none.is_empty());
}

#[tokio::test]
async fn rank_on_empty_store_is_empty() {
    let service = sqlite_service().await;
    let ranking = service.rank(10).await.expect("rank");
    assert!(ranking.is_empty());
}

#[tokio::test]
async fn history_filters_by_since_and_orders_newest_first() {
    let service = sqlite_service().await;

    service.grant(single_point("U1", "U2", "before the window")).await.expect("grant");
    tokio::time::sleep(Duration::from_millis(5)).await;
    let window_start = Utc::now();
    tokio::time::sleep(Duration::from_millis(5)).await;
    service.grant(single_point("U1", "U3", "inside the window")).await.expect("grant");
    tokio::time::sleep(Duration::from_millis(5)).await;
    service.grant(single_point("U1", "U4", "also inside")).await.expect("grant");

    let history = service.history(window_start).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].receiver_id, UserId("U4".to_string()), "newest first");
    assert_eq!(history[1].receiver_id, UserId("U3".to_string()));

    let future = service
        .history(Utc::now() + goodpoint_core::chrono::Duration::days(1))
        .await
        .expect("future history");
    assert!(future.is_empty());
}

/// Conservation: after any sequence of grants and reversals, every tally
/// equals the sum of live transactions addressed to that user.
#[tokio::test]
async fn tallies_conserve_the_transaction_log() {
    let service = sqlite_service().await;

    let mut recorded: Vec<TransactionId> = Vec::new();
    for (sender, receiver, reason) in [
        ("U1", "U2", "great demo"),
        ("U3", "U2", "nice work"),
        ("U2", "U1", "thanks for the review"),
        ("U1", "U3", "pager duty"),
        ("U3", "U1", "release notes"),
    ] {
        let receipt = service.grant(single_point(sender, receiver, reason)).await.expect("grant");
        recorded.push(receipt.transaction.id.clone());
    }

    service.reverse(&recorded[1]).await.expect("reverse").expect("found");
    service.reverse(&recorded[3]).await.expect("reverse").expect("found");

    let history = service.history(DateTime::<Utc>::UNIX_EPOCH).await.expect("history");
    let ranking = service.rank(100).await.expect("rank");

    for tally in &ranking {
        let live_sum: i64 = history
            .iter()
            .filter(|transaction| transaction.receiver_id == tally.user_id)
            .map(|transaction| transaction.points)
            .sum();
        assert_eq!(
            tally.points, live_sum,
            "tally for {} must equal its live transactions",
            tally.user_id
        );
    }
}

async fn grant_with_retry(
    service: &LedgerService<SqlLedgerStore>,
    request: GrantRequest,
) -> GrantReceipt {
    loop {
        match service.grant(request.clone()).await {
            Ok(receipt) => return receipt,
            // Contention the store could not resolve; the whole operation
            // rolled back, so retrying is safe.
            Err(LedgerError::Store(_)) => tokio::time::sleep(Duration::from_millis(10)).await,
            Err(other) => panic!("unexpected ledger error: {other}"),
        }
    }
}

#[tokio::test]
async fn concurrent_grants_do_not_lose_updates() {
    const WRITERS: usize = 8;

    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("ledger.db").display());
    let pool = connect_with_settings(&url, WRITERS as u32, 5).await.expect("connect");
    migrations::run_pending(&pool).await.expect("run migrations");
    let service = Arc::new(LedgerService::new(SqlLedgerStore::new(pool)));

    let mut handles = Vec::with_capacity(WRITERS);
    for writer in 0..WRITERS {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            grant_with_retry(&service, single_point(&format!("U{writer}"), "U2", "sprint push"))
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("writer task");
    }

    let ranking = service.rank(10).await.expect("rank");
    assert_eq!(ranking.len(), 1);
    assert_eq!(ranking[0].points, WRITERS as i64, "no grant may be lost");

    let history = service.history(DateTime::<Utc>::UNIX_EPOCH).await.expect("history");
    assert_eq!(history.len(), WRITERS);
}

#[tokio::test]
async fn in_memory_store_matches_sql_semantics() {
    let service = LedgerService::new(InMemoryLedgerStore::new());

    let first = service.grant(single_point("U1", "U2", "great demo")).await.expect("grant");
    assert_eq!(first.total, 1);
    let second = service.grant(single_point("U3", "U2", "nice work")).await.expect("grant");
    assert_eq!(second.total, 2);

    let reversed = service
        .reverse(&first.transaction.id)
        .await
        .expect("reverse")
        .expect("grant should be found");
    assert_eq!(reversed.total, 1);

    let ranking = service.rank(10).await.expect("rank");
    assert_eq!(ranking.len(), 1);
    assert_eq!(ranking[0].points, 1);

    let history = service.history(DateTime::<Utc>::UNIX_EPOCH).await.expect("history");
    assert_eq!(history.len(), 1);
}
