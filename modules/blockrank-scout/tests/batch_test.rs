//! Batch orchestrator tests against in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use blockrank_common::{Actor, BlockRankError, RecordFilter, Timeouts, ACTION_RANK_UPDATED};
use blockrank_scout::testing::{
    block, blog_item, record, InMemoryRecordStore, MockRankSource, MockVolumeSource,
    ScrapeFailure,
};
use blockrank_scout::{BatchDeps, BatchUpdater};

const KEYWORD: &str = "사회복지사2급";

fn updater(
    ranks: MockRankSource,
    volumes: MockVolumeSource,
    store: Arc<InMemoryRecordStore>,
) -> (BatchUpdater, Arc<MockRankSource>) {
    let ranks = Arc::new(ranks);
    let deps = BatchDeps::builder()
        .ranks(ranks.clone())
        .volumes(Arc::new(volumes))
        .store(store)
        .build();
    (BatchUpdater::new(deps), ranks)
}

fn popular_blocks() -> Vec<blockrank_common::Block> {
    vec![block(
        "사회복지사2급 인기글",
        vec![
            blog_item("사회복지사 공부법", "someone", "누군가"),
            blog_item("2급 실습 후기", "windusj", "윈드"),
        ],
    )]
}

#[tokio::test(start_paused = true)]
async fn profile_link_match_is_persisted_with_activity() {
    let store = Arc::new(InMemoryRecordStore::new(vec![record("windusj", KEYWORD)]));
    let (updater, _) = updater(
        MockRankSource::new().on_keyword(KEYWORD, popular_blocks()),
        MockVolumeSource::new().on_keyword(KEYWORD, 26700),
        store.clone(),
    );

    let outcomes = updater
        .refresh(&RecordFilter::default(), &Actor::system())
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert!(outcome.success);
    assert_eq!(outcome.rank, Some(2));
    assert_eq!(outcome.search_volume, Some(26700));
    assert_eq!(outcome.nickname.as_deref(), Some("윈드"));

    let stored = store.stored("windusj", KEYWORD).unwrap();
    assert_eq!(stored.rank, Some(2));
    assert_eq!(stored.search_volume, Some(26700));

    let activity = store.activity();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].action, ACTION_RANK_UPDATED);
    assert_eq!(activity[0].actor_id, "system");
    assert_eq!(activity[0].metadata["rank"], 2);
    assert_eq!(activity[0].metadata["blockTitle"], "사회복지사2급 인기글");
    assert_eq!(activity[0].metadata["matchKind"], "exact");
}

#[tokio::test(start_paused = true)]
async fn not_exposed_is_a_successful_outcome() {
    let store = Arc::new(InMemoryRecordStore::new(vec![record("nobody", KEYWORD)]));
    let (updater, _) = updater(
        MockRankSource::new().on_keyword(KEYWORD, popular_blocks()),
        MockVolumeSource::new(),
        store.clone(),
    );

    let outcomes = updater
        .run(&[record("nobody", KEYWORD)], &Actor::system())
        .await
        .unwrap();

    assert!(outcomes[0].success);
    assert_eq!(outcomes[0].rank, None);
    assert_eq!(outcomes[0].error, None);
    assert_eq!(store.stored("nobody", KEYWORD).unwrap().writes, 1);
}

#[tokio::test(start_paused = true)]
async fn scrape_failure_degrades_to_not_exposed() {
    let store = Arc::new(InMemoryRecordStore::new(vec![record("windusj", KEYWORD)]));
    let (updater, _) = updater(
        MockRankSource::new().failing(KEYWORD, ScrapeFailure::Scrape("navigation failed".into())),
        MockVolumeSource::new().on_keyword(KEYWORD, 100),
        store.clone(),
    );

    let outcomes = updater
        .run(&[record("windusj", KEYWORD)], &Actor::system())
        .await
        .unwrap();

    assert!(outcomes[0].success);
    assert_eq!(outcomes[0].rank, None);
    assert_eq!(outcomes[0].search_volume, Some(100));
}

#[tokio::test(start_paused = true)]
async fn slow_volume_leaves_rank_intact_and_keeps_stored_volume() {
    let store = Arc::new(
        InMemoryRecordStore::new(vec![record("windusj", KEYWORD)]).with_volume("windusj", KEYWORD, 500),
    );
    let (updater, _) = updater(
        MockRankSource::new().on_keyword(KEYWORD, popular_blocks()),
        MockVolumeSource::new()
            .on_keyword(KEYWORD, 26700)
            .with_delay(Duration::from_secs(60)),
        store.clone(),
    );

    let outcomes = updater
        .run(&[record("windusj", KEYWORD)], &Actor::system())
        .await
        .unwrap();

    assert!(outcomes[0].success);
    assert_eq!(outcomes[0].rank, Some(2));
    assert_eq!(outcomes[0].search_volume, None);

    let stored = store.stored("windusj", KEYWORD).unwrap();
    assert_eq!(stored.rank, Some(2));
    assert_eq!(stored.search_volume, Some(500));
}

#[tokio::test(start_paused = true)]
async fn one_failure_never_aborts_the_batch() {
    let records = vec![
        record("windusj", KEYWORD),
        record("broken", "터지는키워드"),
        record("rejected", KEYWORD),
        record("windusj", "요양보호사"),
    ];
    let store = Arc::new(InMemoryRecordStore::new(records.clone()).failing_saves_for("rejected"));
    let (updater, _) = updater(
        MockRankSource::new()
            .on_keyword(KEYWORD, popular_blocks())
            .failing("터지는키워드", ScrapeFailure::Panic)
            .on_keyword(
                "요양보호사",
                vec![block("VIEW", vec![blog_item("요양보호사 합격", "windusj", "윈드")])],
            ),
        MockVolumeSource::new(),
        store.clone(),
    );

    let outcomes = updater.run(&records, &Actor::system()).await.unwrap();

    let summary: Vec<_> = outcomes
        .iter()
        .map(|o| (o.id.as_str(), o.keyword.as_str(), o.success, o.rank))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("windusj", KEYWORD, true, Some(2)),
            ("broken", "터지는키워드", false, None),
            ("rejected", KEYWORD, false, None),
            ("windusj", "요양보호사", true, Some(1)),
        ]
    );
    assert!(outcomes[1].error.as_deref().unwrap().starts_with("panic:"));
    assert!(outcomes[2].error.as_deref().unwrap().contains("write rejected"));
    assert_eq!(store.activity().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn non_fatal_errors_fail_only_their_record() {
    let records = vec![record("a", "k1"), record("b", "k2")];
    let store = Arc::new(InMemoryRecordStore::new(records.clone()));
    let (updater, _) = updater(
        MockRankSource::new().failing("k1", ScrapeFailure::Other("browser crashed".into())),
        MockVolumeSource::new(),
        store,
    );

    let outcomes = updater.run(&records, &Actor::system()).await.unwrap();

    assert!(!outcomes[0].success);
    assert!(outcomes[0].error.as_deref().unwrap().contains("browser crashed"));
    assert!(outcomes[1].success);
}

#[tokio::test(start_paused = true)]
async fn exhausted_browser_pool_aborts_the_run() {
    let records = vec![record("a", "k1"), record("b", "k2"), record("c", "k3")];
    let store = Arc::new(InMemoryRecordStore::new(records.clone()));
    let (updater, ranks) = updater(
        MockRankSource::new().failing("k2", ScrapeFailure::Unavailable),
        MockVolumeSource::new(),
        store.clone(),
    );

    let err = updater.run(&records, &Actor::system()).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, BlockRankError::Session(_)));
    assert_eq!(ranks.calls().len(), 2, "third record must not be attempted");
    assert!(store.stored("c", "k3").is_none());
}

#[tokio::test(start_paused = true)]
async fn records_are_paced_and_budgeted() {
    let records = vec![record("a", "k1"), record("b", "k2"), record("c", "k3")];
    let store = Arc::new(InMemoryRecordStore::new(records.clone()));
    let (updater, ranks) = updater(MockRankSource::new(), MockVolumeSource::new(), store);
    let start = tokio::time::Instant::now();

    updater.run(&records, &Actor::system()).await.unwrap();

    assert_eq!(start.elapsed(), Duration::from_secs(4));
    let budgets: Vec<_> = ranks.calls().into_iter().map(|(_, budget)| budget).collect();
    assert_eq!(budgets, vec![Duration::from_secs(30); 3]);
}

#[tokio::test(start_paused = true)]
async fn single_record_uses_single_budget_and_no_delay() {
    let store = Arc::new(InMemoryRecordStore::new(vec![record("a", "k1")]));
    let ranks = Arc::new(MockRankSource::new());
    let deps = BatchDeps::builder()
        .ranks(ranks.clone())
        .volumes(Arc::new(MockVolumeSource::new()))
        .store(store)
        .timeouts(Timeouts {
            scrape_single: Duration::from_secs(15),
            ..Timeouts::default()
        })
        .build();
    let start = tokio::time::Instant::now();

    BatchUpdater::new(deps)
        .run(&[record("a", "k1")], &Actor::system())
        .await
        .unwrap();

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(ranks.calls()[0].1, Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn activity_failure_does_not_fail_the_record() {
    let store = Arc::new(InMemoryRecordStore::new(vec![record("windusj", KEYWORD)]).failing_activity());
    let (updater, _) = updater(
        MockRankSource::new().on_keyword(KEYWORD, popular_blocks()),
        MockVolumeSource::new(),
        store.clone(),
    );

    let outcomes = updater
        .run(&[record("windusj", KEYWORD)], &Actor::system())
        .await
        .unwrap();

    assert!(outcomes[0].success);
    assert_eq!(store.stored("windusj", KEYWORD).unwrap().rank, Some(2));
}

#[tokio::test(start_paused = true)]
async fn actor_is_stamped_on_activity() {
    let store = Arc::new(InMemoryRecordStore::new(vec![record("windusj", KEYWORD)]));
    let (updater, _) = updater(MockRankSource::new(), MockVolumeSource::new(), store.clone());
    let actor = Actor {
        id: "admin-7".into(),
        role: "admin".into(),
    };

    updater
        .refresh(
            &RecordFilter {
                id: Some("windusj".into()),
                ..RecordFilter::default()
            },
            &actor,
        )
        .await
        .unwrap();

    let activity = store.activity();
    assert_eq!(activity[0].actor_id, "admin-7");
    assert_eq!(activity[0].actor_role, "admin");
}

#[tokio::test(start_paused = true)]
async fn empty_selection_returns_no_outcomes() {
    let store = Arc::new(InMemoryRecordStore::new(vec![record("windusj", KEYWORD)]));
    let (updater, ranks) = updater(MockRankSource::new(), MockVolumeSource::new(), store);

    let outcomes = updater
        .refresh(
            &RecordFilter {
                keyword: Some("없는키워드".into()),
                ..RecordFilter::default()
            },
            &Actor::system(),
        )
        .await
        .unwrap();

    assert!(outcomes.is_empty());
    assert!(ranks.calls().is_empty());
}
