use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::models::job::{Job, JobId};
use crate::models::project::ProjectId;
use crate::services::api::ServiceError;
use crate::services::jobs::MosaicJobService;

struct Listing {
    jobs: Arc<[Job]>,
    ticket: u64,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Previously generated mosaics for one project, newest first.
///
/// Readers get an `Arc` snapshot; a refresh swaps the whole list in one
/// step, so nobody ever sees a half-updated list.
pub struct JobHistoryCache {
    project_id: ProjectId,
    listing: RwLock<Listing>,
    next_ticket: AtomicU64,
    in_flight: AtomicU64,
    loading: AtomicBool,
}

impl JobHistoryCache {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            listing: RwLock::new(Listing {
                jobs: Arc::from(Vec::new()),
                ticket: 0,
                refreshed_at: None,
            }),
            next_ticket: AtomicU64::new(1),
            in_flight: AtomicU64::new(0),
            loading: AtomicBool::new(false),
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn snapshot(&self) -> Arc<[Job]> {
        Arc::clone(&self.read().jobs)
    }

    pub fn get(&self, job_id: &JobId) -> Option<Job> {
        self.read().jobs.iter().find(|job| &job.id == job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.read().refreshed_at
    }

    /// Fetch the project's jobs and replace the cached list.
    ///
    /// Overlapping refreshes are ordered by issue time: a response that comes
    /// back after a later-issued refresh has already landed is dropped.
    /// `is_loading` stays set until the new list is in place.
    pub async fn refresh(&self, jobs: &dyn MosaicJobService) -> Result<usize, ServiceError> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::AcqRel);
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.loading.store(true, Ordering::Release);

        let result = jobs
            .list_jobs(self.project_id)
            .await
            .map(|fetched| self.install(ticket, fetched));

        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.loading.store(false, Ordering::Release);
        }
        result
    }

    fn install(&self, ticket: u64, mut fetched: Vec<Job>) -> usize {
        fetched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let count = fetched.len();

        let mut listing = self
            .listing
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if ticket < listing.ticket {
            debug!(
                project_id = self.project_id,
                ticket,
                current = listing.ticket,
                "Discarding out-of-date history listing"
            );
            return listing.jobs.len();
        }
        *listing = Listing {
            jobs: Arc::from(fetched),
            ticket,
            refreshed_at: Some(Utc::now()),
        };
        drop(listing);

        metrics::counter!("mosaic_history_refreshes_total").increment(1);
        info!(project_id = self.project_id, count, "Mosaic history refreshed");
        count
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Listing> {
        self.listing.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{JobParameters, JobStatus, SubmittedJob};
    use crate::models::settings::GenerationRequest;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;
    use std::time::Duration;

    fn job(id: &str, minutes_ago: i64) -> Job {
        let at = Utc::now() - ChronoDuration::minutes(minutes_ago);
        Job {
            id: JobId::from(id),
            status: JobStatus::Completed,
            progress: 100,
            sd_url: Some(format!("/out/{}.jpg", id)),
            hd_url: None,
            error: None,
            created_at: at,
            updated_at: at,
            parameters: JobParameters::default(),
        }
    }

    /// Hands out queued listings, each after its own delay.
    struct Listings {
        queue: Mutex<Vec<(Duration, Result<Vec<Job>, ServiceError>)>>,
    }

    impl Listings {
        fn new(mut listings: Vec<(Duration, Result<Vec<Job>, ServiceError>)>) -> Self {
            listings.reverse();
            Self {
                queue: Mutex::new(listings),
            }
        }
    }

    #[async_trait]
    impl MosaicJobService for Listings {
        async fn submit(
            &self,
            _project_id: ProjectId,
            _request: &GenerationRequest,
        ) -> Result<SubmittedJob, ServiceError> {
            unreachable!()
        }

        async fn get_status(&self, _job_id: &JobId) -> Result<Job, ServiceError> {
            unreachable!()
        }

        async fn list_jobs(&self, _project_id: ProjectId) -> Result<Vec<Job>, ServiceError> {
            let (delay, result) = self.queue.lock().unwrap().pop().unwrap();
            tokio::time::sleep(delay).await;
            result
        }
    }

    #[tokio::test]
    async fn test_refresh_sorts_newest_first() {
        let cache = JobHistoryCache::new(1);
        let service = Listings::new(vec![(
            Duration::ZERO,
            Ok(vec![job("old", 60), job("new", 1), job("mid", 30)]),
        )]);

        assert_eq!(cache.refresh(&service).await.unwrap(), 3);
        let ids: Vec<_> = cache.snapshot().iter().map(|j| j.id.to_string()).collect();
        assert_eq!(ids, ["new", "mid", "old"]);
        assert!(cache.last_refreshed().is_some());
        assert!(!cache.is_loading());
        assert_eq!(cache.get(&JobId::from("mid")).unwrap().progress, 100);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_list() {
        let cache = JobHistoryCache::new(1);
        let service = Listings::new(vec![
            (Duration::ZERO, Ok(vec![job("a", 5)])),
            (Duration::ZERO, Err(ServiceError::Unauthorized)),
        ]);

        cache.refresh(&service).await.unwrap();
        assert!(cache.refresh(&service).await.is_err());
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_loading());
    }

    #[tokio::test]
    async fn test_snapshot_survives_replacement() {
        let cache = JobHistoryCache::new(1);
        let service = Listings::new(vec![
            (Duration::ZERO, Ok(vec![job("a", 5), job("b", 4)])),
            (Duration::ZERO, Ok(vec![job("c", 1), job("d", 2), job("e", 3)])),
        ]);

        cache.refresh(&service).await.unwrap();
        let before = cache.snapshot();
        cache.refresh(&service).await.unwrap();

        assert_eq!(before.len(), 2);
        assert_eq!(cache.snapshot().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_refresh_does_not_overwrite_newer() {
        let cache = JobHistoryCache::new(1);
        // First refresh is slow and returns the older view.
        let service = Listings::new(vec![
            (Duration::from_secs(5), Ok(vec![job("a", 5)])),
            (Duration::from_secs(1), Ok(vec![job("a", 5), job("b", 1)])),
        ]);

        let (slow, fast) = tokio::join!(cache.refresh(&service), cache.refresh(&service));
        assert!(slow.is_ok() && fast.is_ok());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_loading_clears_only_after_new_list_is_visible() {
        let cache = Arc::new(JobHistoryCache::new(1));
        let service = Arc::new(Listings::new(vec![
            (Duration::ZERO, Ok(vec![job("a", 5)])),
            (
                Duration::from_millis(20),
                Ok(vec![job("b", 1), job("c", 2), job("d", 3)]),
            ),
        ]));
        cache.refresh(service.as_ref()).await.unwrap();

        let watcher = {
            let cache = Arc::clone(&cache);
            tokio::task::spawn_blocking(move || {
                while !cache.is_loading() {
                    if cache.len() == 3 {
                        // Refresh finished before the watcher got going
                        return 3;
                    }
                    std::hint::spin_loop();
                }
                loop {
                    let loading = cache.is_loading();
                    let len = cache.len();
                    if !loading {
                        return len;
                    }
                }
            })
        };

        // Give the watcher a head start so it sees the refresh begin
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.refresh(service.as_ref()).await.unwrap();

        assert_eq!(watcher.await.unwrap(), 3);
    }
}
