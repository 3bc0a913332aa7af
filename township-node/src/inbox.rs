//! Per-report notification history.
//!
//! Backs `GET /reports/{id}/notifications`. Keeps the newest
//! `max_per_report` notifications of each report in publish order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use township_lifecycle::{Notification, NotificationFanout, ReportId, Subscription};

pub struct NotificationInbox {
    max_per_report: usize,
    entries: RwLock<HashMap<ReportId, VecDeque<Notification>>>,
}

impl NotificationInbox {
    pub fn new(max_per_report: usize) -> Self {
        Self {
            max_per_report: max_per_report.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register the inbox as a subscriber of every kind.
    pub fn attach(self: &Arc<Self>, fanout: &NotificationFanout) -> Subscription {
        let inbox = Arc::clone(self);
        fanout.subscribe_all(move |notification| {
            inbox.record(notification);
            Ok(())
        })
    }

    pub fn record(&self, notification: &Notification) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let history = entries.entry(notification.report_id()).or_default();
        if history.len() == self.max_per_report {
            history.pop_front();
        }
        history.push_back(notification.clone());
    }

    /// Retained notifications for `id`, oldest first.
    pub fn for_report(&self, id: ReportId) -> Vec<Notification> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use township_lifecycle::{
        LifecycleConfig, NotificationKind, ReportInput, ReportLifecycleEngine, VoteDirection,
    };

    #[tokio::test]
    async fn test_history_is_bounded() {
        let engine = ReportLifecycleEngine::with_config(LifecycleConfig::with_threshold(1));
        let inbox = Arc::new(NotificationInbox::new(2));
        let _subscription = inbox.attach(engine.fanout());

        let id = engine
            .submit_report(ReportInput::new("Leak", "Main pipe", "Ward 2"))
            .await
            .unwrap()
            .id;
        engine.cast_vote(id, VoteDirection::Up).await.unwrap();
        engine.mark_concluded(id).await.unwrap();
        engine.mark_concluded(id).await.unwrap();

        let kinds: Vec<_> = inbox.for_report(id).iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NotificationKind::CommunityThresholdReached,
                NotificationKind::ReportConcluded
            ]
        );

        let other = engine
            .submit_report(ReportInput::new("Dark lane", "No light", "Ward 5"))
            .await
            .unwrap()
            .id;
        assert_eq!(inbox.for_report(other).len(), 1);
        assert_eq!(inbox.for_report(id).len(), 2);
        assert!(inbox.for_report(ReportId::new()).is_empty());
    }
}
