//! End-to-end lifecycle behaviour through the public API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use township_lifecycle::{
    LifecycleConfig, LifecycleError, MasterVoteDecision, MasterVoteStatus, ModerationGate,
    Notification, NotificationKind, NotificationSink, ReportInput, ReportLifecycleEngine,
    ReportStatus, SubscriberError, VoteCount, VoteDirection,
};

fn pothole() -> ReportInput {
    ReportInput::new(
        "Pothole near bus stand",
        "Two-foot wide pothole filling with rain water",
        "Station Road",
    )
}

fn kinds(log: &Mutex<Vec<Notification>>) -> Vec<NotificationKind> {
    log.lock().unwrap().iter().map(|n| n.kind).collect()
}

fn record_all(engine: &ReportLifecycleEngine) -> Arc<Mutex<Vec<Notification>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    engine.fanout().subscribe_all(move |n| {
        sink.lock().unwrap().push(n.clone());
        Ok(())
    });
    log
}

#[tokio::test]
async fn community_threshold_crossing() {
    let engine = ReportLifecycleEngine::new();
    let log = record_all(&engine);

    let report = engine.submit_report(pothole()).await.unwrap();
    assert_eq!(report.status, ReportStatus::Open);
    assert_eq!(report.votes, VoteCount::new(0, 0));
    assert_eq!(report.master_vote, MasterVoteStatus::Pending);

    for _ in 0..49 {
        engine.cast_vote(report.id, VoteDirection::Up).await.unwrap();
    }
    assert_eq!(kinds(&log), vec![NotificationKind::AppReportCreated]);

    let report = engine.cast_vote(report.id, VoteDirection::Up).await.unwrap();
    assert_eq!(report.status, ReportStatus::Voting);
    assert_eq!(
        kinds(&log),
        vec![
            NotificationKind::AppReportCreated,
            NotificationKind::CommunityThresholdReached
        ]
    );
}

#[tokio::test]
async fn rejected_report_refuses_votes() {
    let engine = ReportLifecycleEngine::new();
    let id = engine.submit_report(pothole()).await.unwrap().id;

    let report = engine
        .decide_master_vote(id, MasterVoteDecision::Rejected, "admin")
        .await
        .unwrap();
    assert_eq!(report.status, ReportStatus::Rejected);
    assert_eq!(report.master_vote, MasterVoteStatus::Rejected);

    let err = engine.cast_vote(id, VoteDirection::Up).await.unwrap_err();
    assert!(matches!(err, LifecycleError::TerminalState { .. }));
}

#[tokio::test]
async fn conclude_twice_on_voting_report() {
    let engine = ReportLifecycleEngine::new();
    let log = record_all(&engine);
    let id = engine.submit_report(pothole()).await.unwrap().id;
    engine.update_status(id, ReportStatus::Voting).await.unwrap();

    let first = engine.mark_concluded(id).await.unwrap();
    let second = engine.mark_concluded(id).await.unwrap();

    assert_eq!(first.status, ReportStatus::Completed);
    assert_eq!(first, second);
    let concluded = kinds(&log)
        .into_iter()
        .filter(|k| *k == NotificationKind::ReportConcluded)
        .count();
    assert_eq!(concluded, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_master_votes_agree() {
    for _ in 0..20 {
        let engine = Arc::new(ReportLifecycleEngine::new());
        let gate = ModerationGate::new(engine.clone());
        let id = engine.submit_report(pothole()).await.unwrap().id;

        let g1 = gate.clone();
        let g2 = gate.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { g1.decide(id, MasterVoteDecision::Approved, "a").await }),
            tokio::spawn(async move { g2.decide(id, MasterVoteDecision::Rejected, "b").await }),
        );
        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();

        assert_ne!(a.was_recorded(), b.was_recorded());
        assert_eq!(a.report().master_vote, b.report().master_vote);
        assert_eq!(engine.get(id).await.unwrap().master_vote, a.report().master_vote);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_votes_are_not_lost() {
    let engine = Arc::new(ReportLifecycleEngine::new());
    let log = record_all(&engine);
    let id = engine.submit_report(pothole()).await.unwrap().id;

    let mut handles = Vec::new();
    for i in 0..200u32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let direction = if i % 4 == 0 {
                VoteDirection::Down
            } else {
                VoteDirection::Up
            };
            engine.cast_vote(id, direction).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let report = engine.get(id).await.unwrap();
    assert_eq!(report.votes, VoteCount::new(150, 50));
    let crossings = kinds(&log)
        .into_iter()
        .filter(|k| *k == NotificationKind::CommunityThresholdReached)
        .count();
    assert_eq!(crossings, 1);
}

#[tokio::test]
async fn decline_and_recross_does_not_refire() {
    let engine = ReportLifecycleEngine::with_config(LifecycleConfig::with_threshold(2));
    let log = record_all(&engine);
    let id = engine.submit_report(pothole()).await.unwrap().id;

    engine.cast_ballot(id, "ravi", VoteDirection::Up).await.unwrap();
    engine.cast_ballot(id, "meera", VoteDirection::Up).await.unwrap();
    let down = engine.cast_ballot(id, "meera", VoteDirection::Down).await.unwrap();
    assert_eq!(down.votes, VoteCount::new(1, 1));
    assert!(down.community_threshold_crossed);

    let back = engine.cast_ballot(id, "meera", VoteDirection::Up).await.unwrap();
    assert_eq!(back.votes.up, 2);

    let crossings = kinds(&log)
        .into_iter()
        .filter(|k| *k == NotificationKind::CommunityThresholdReached)
        .count();
    assert_eq!(crossings, 1);
}

struct SlowSink {
    seen: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl NotificationSink for SlowSink {
    fn name(&self) -> &str {
        "slow-dashboard"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), SubscriberError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.seen.lock().unwrap().push(notification.sequence);
        Ok(())
    }
}

#[tokio::test]
async fn slow_subscriber_keeps_order() {
    let engine = ReportLifecycleEngine::with_config(LifecycleConfig::with_threshold(3));
    let fast = record_all(&engine);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let queue = engine.fanout().subscribe_all_queue();
    let forward = tokio::spawn(queue.forward_to(
        SlowSink { seen: seen.clone() },
        Duration::from_secs(1),
    ));

    let id = engine.submit_report(pothole()).await.unwrap().id;
    for _ in 0..3 {
        engine.cast_vote(id, VoteDirection::Up).await.unwrap();
    }
    engine.mark_concluded(id).await.unwrap();

    // The fast subscriber has everything as soon as the calls return.
    assert_eq!(
        kinds(&fast),
        vec![
            NotificationKind::AppReportCreated,
            NotificationKind::CommunityThresholdReached,
            NotificationKind::ReportConcluded
        ]
    );

    drop(engine);
    forward.await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn engine_works_on_a_current_thread_runtime() {
    let engine = ReportLifecycleEngine::new();
    tokio_test::block_on(async {
        let id = engine.submit_report(pothole()).await.unwrap().id;
        let report = engine.cast_vote(id, VoteDirection::Down).await.unwrap();
        assert_eq!(report.votes, VoteCount::new(0, 1));
    });
}
