use crate::{
    api::GenerationService,
    error::GenerationError,
    types::{HistoryEntry, JobStatus},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 100;

pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_HISTORY_LIMIT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

/// The last history list the service reported, newest first.
///
/// The list is only ever replaced wholesale, duplicates included. Every
/// refresh takes a ticket and a response is dropped when a newer refresh has
/// already been applied.
#[derive(Debug, Default)]
pub struct HistoryView {
    entries: Vec<HistoryEntry>,
    issued: u64,
    applied: u64,
}

impl HistoryView {
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.issued += 1;
        RefreshTicket(self.issued)
    }

    pub fn apply(
        &mut self,
        ticket: RefreshTicket,
        limit: usize,
        mut entries: Vec<HistoryEntry>,
    ) -> bool {
        if ticket.0 <= self.applied {
            return false;
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        self.entries = entries;
        self.applied = ticket.0;
        true
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.clone()
    }

    /// Status of the newest entry for `job_id`.
    pub fn status_of(&self, job_id: &str) -> Option<JobStatus> {
        self.entries.iter().find(|entry| entry.job_id == job_id).map(|entry| entry.status)
    }
}

pub struct HistoryReconciler {
    service: Arc<dyn GenerationService>,
    view: Mutex<HistoryView>,
}

impl HistoryReconciler {
    pub fn new(service: Arc<dyn GenerationService>) -> Self {
        Self { service, view: Mutex::new(HistoryView::default()) }
    }

    pub async fn refresh(&self, limit: usize) -> Result<Vec<HistoryEntry>, GenerationError> {
        let limit = clamp_limit(limit);
        let ticket = self.view.lock().await.begin_refresh();
        match self.service.generation_history(limit).await {
            Ok(entries) => {
                let mut view = self.view.lock().await;
                if !view.apply(ticket, limit, entries) {
                    debug!(?ticket, "discarding stale history response");
                }
                Ok(view.entries())
            }
            Err(err) => {
                let err = GenerationError::history(err);
                warn!(?ticket, "history refresh failed, keeping previous list: {err}");
                Err(err)
            }
        }
    }

    pub async fn status_of(&self, job_id: &str) -> Option<JobStatus> {
        self.view.lock().await.status_of(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{Call, FakeService},
        types::{JobParameters, MusicStyle},
    };
    use chrono::{Duration, TimeZone, Utc};

    fn entry(job_id: &str, minutes: i64, status: JobStatus) -> HistoryEntry {
        HistoryEntry {
            job_id: job_id.into(),
            status,
            parameters: JobParameters {
                valence: Some(0.5),
                arousal: Some(0.5),
                duration: 30,
                tempo: Some(120),
                style: MusicStyle::Auto,
            },
            created_at: Utc.with_ymd_and_hms(2024, 5, 24, 12, 0, 0).unwrap()
                + Duration::minutes(minutes),
            download_url: None,
        }
    }

    #[test]
    fn apply_orders_newest_first_and_truncates() {
        let mut view = HistoryView::default();
        let ticket = view.begin_refresh();
        let entries = (0..15).map(|i| entry(&format!("j{i}"), i, JobStatus::Completed)).collect();
        assert!(view.apply(ticket, 10, entries));

        let ids: Vec<_> = view.entries().into_iter().map(|e| e.job_id).collect();
        assert_eq!(ids.len(), 10);
        assert_eq!(ids.first().map(String::as_str), Some("j14"));
        assert_eq!(ids.last().map(String::as_str), Some("j5"));
    }

    #[test]
    fn refresh_replaces_the_whole_list() {
        let mut view = HistoryView::default();
        let first = view.begin_refresh();
        view.apply(first, 10, vec![entry("a", 0, JobStatus::Completed)]);
        let second = view.begin_refresh();
        view.apply(second, 10, vec![entry("b", 1, JobStatus::Processing)]);

        assert_eq!(view.entries().len(), 1);
        assert_eq!(view.status_of("a"), None);
        assert_eq!(view.status_of("b"), Some(JobStatus::Processing));
    }

    #[test]
    fn stale_refresh_is_discarded() {
        let mut view = HistoryView::default();
        let older = view.begin_refresh();
        let newer = view.begin_refresh();
        assert!(view.apply(newer, 10, vec![entry("new", 5, JobStatus::Completed)]));
        assert!(!view.apply(older, 10, vec![entry("old", 1, JobStatus::Completed)]));
        assert_eq!(view.status_of("new"), Some(JobStatus::Completed));
        assert_eq!(view.status_of("old"), None);
    }

    #[test]
    fn duplicate_ids_are_kept_as_reported() {
        let mut view = HistoryView::default();
        let ticket = view.begin_refresh();
        view.apply(
            ticket,
            10,
            vec![entry("a", 0, JobStatus::Failed), entry("a", 3, JobStatus::Completed)],
        );
        assert_eq!(view.entries().len(), 2);
        assert_eq!(view.status_of("a"), Some(JobStatus::Completed));
    }

    #[tokio::test]
    async fn reconciler_clamps_the_requested_limit() {
        let service = Arc::new(FakeService::new());
        let reconciler = HistoryReconciler::new(service.clone());
        reconciler.refresh(500).await.unwrap();
        reconciler.refresh(0).await.unwrap();
        assert_eq!(service.calls(), vec![Call::History(MAX_HISTORY_LIMIT), Call::History(1)]);
    }

    #[tokio::test]
    async fn reconciler_surfaces_failures_without_clearing() {
        let service = Arc::new(FakeService::new());
        service.set_history(vec![entry("a", 0, JobStatus::Completed)]);
        let reconciler = HistoryReconciler::new(service.clone());
        assert_eq!(reconciler.refresh(10).await.unwrap().len(), 1);

        service.fail_history(true);
        let err = reconciler.refresh(10).await.unwrap_err();
        assert!(matches!(err, GenerationError::HistoryLoad { .. }));
        assert_eq!(reconciler.status_of("a").await, Some(JobStatus::Completed));
    }
}
