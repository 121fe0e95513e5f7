use chrono::{Duration, Utc};
use telemetry_core::config::AppConfig;
use telemetry_core::types::{ChatRecord, ChatThread, MembershipSnapshot, UserId};
use telemetry_core::{Clock, ManualClock};
use telemetry_service::TelemetryService;

fn config_in(dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.data_dir = Some(dir.to_path_buf());
    config
}

fn chat(thread_id: u64, senders: &[u64]) -> ChatThread {
    ChatThread::new(
        thread_id,
        senders.iter().map(|s| ChatRecord::new(*s)).collect(),
    )
}

#[tokio::test]
async fn test_full_session_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let service = TelemetryService::from_config(config_in(dir.path()));

    let t0 = Utc::now();
    let clock = ManualClock::new(t0);
    let session = service.start_session("design review", clock.clone());

    // Three users join a minute apart.
    session
        .notify_membership(MembershipSnapshot::new([1u64]))
        .await
        .unwrap();
    clock.advance(Duration::minutes(1));
    session
        .notify_membership(MembershipSnapshot::new([1u64, 2]))
        .await
        .unwrap();
    clock.advance(Duration::minutes(1));
    let t2 = clock.now();
    session
        .notify_membership(MembershipSnapshot::new([1u64, 2, 3]))
        .await
        .unwrap();

    // A leaves after 20 minutes, B after 40.
    clock.set(t2 + Duration::minutes(20));
    session
        .notify_membership(MembershipSnapshot::new([2u64, 3]))
        .await
        .unwrap();
    clock.set(t2 + Duration::minutes(40));
    session
        .notify_membership(MembershipSnapshot::new([3u64]))
        .await
        .unwrap();

    let history = vec![chat(1, &[1, 2, 2, 3]), chat(2, &[3, 3])];

    let live = session.analytics(history.clone()).await.unwrap();
    assert_eq!(live.user_count_samples.len(), 5);

    let report = session.end_session(history).await.unwrap();

    assert_eq!(report.snapshot, live);
    assert_eq!(
        report.snapshot.insincere_members.iter().copied().collect::<Vec<_>>(),
        vec![UserId(1)]
    );
    assert_eq!(report.snapshot.chat_counts.get(&UserId(3)), Some(&3));
    assert_eq!(report.summary.user_count, 3);
    assert_eq!(report.summary.chat_count, 6);
    assert_eq!(report.summary.score, 18);
    assert_eq!(report.history.session_count, 1);

    // Persisted history and per-session archive both exist.
    assert!(dir.path().join("server_data.json").exists());
    let archived = service
        .load_archived(session.session_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(archived.name, "design review");
    assert_eq!(archived.summary, report.summary);
}

#[tokio::test]
async fn test_concurrent_session_ends_do_not_lose_updates() {
    let dir = tempfile::tempdir().unwrap();
    let service = TelemetryService::from_config(config_in(dir.path()));

    let mut tasks = Vec::new();
    for i in 0..6u64 {
        let session = service.start_session(format!("s{}", i), ManualClock::new(Utc::now()));
        tasks.push(tokio::spawn(async move {
            session
                .notify_membership(MembershipSnapshot::new([i]))
                .await
                .unwrap();
            session.end_session(vec![chat(1, &[i])]).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let history = service.history().await.unwrap();
    assert_eq!(history.session_count, 6);
    assert_eq!(history.summaries.len(), 6);
    assert!(history.summaries.iter().all(|s| s.score == 1));
}

#[tokio::test]
async fn test_history_survives_service_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let service = TelemetryService::from_config(config_in(dir.path()));
        let session = service.start_session("first", ManualClock::new(Utc::now()));
        session.end_session(Vec::new()).await.unwrap();
    }

    let service = TelemetryService::from_config(config_in(dir.path()));
    let session = service.start_session("second", ManualClock::new(Utc::now()));
    let report = session.end_session(vec![chat(1, &[7, 8])]).await.unwrap();

    assert_eq!(report.history.session_count, 2);
    assert_eq!(report.history.summaries[0].score, 0);
    assert_eq!(report.history.summaries[1].score, 4);
}
