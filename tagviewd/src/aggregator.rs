use std::sync::Arc;
use futures::TryStreamExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;
use shared::types::{Row, TrafficTarget, TrafficTagBinding};
use crate::cloud::{CloudRun, EndpointGroups};
use crate::error::ListingError;
use crate::resolve::neg::{build_mask_table, NegUrlMaskTable};
use crate::resolve::revision::{resolve_binding, DisplayZone};

/// Picks up to `max` tagged bindings, most recently declared first.
pub fn select_bindings(traffic: &[TrafficTarget], max: usize) -> Vec<TrafficTagBinding> {
    traffic
        .iter()
        .rev()
        .filter(|target| !target.tag.is_empty())
        .take(max)
        .map(|target| TrafficTagBinding {
            revision_name: target.revision.clone(),
            tag: target.tag.clone(),
        })
        .collect()
}

/// Lists services, resolves their tagged revisions concurrently and collects
/// the resulting rows.
#[derive(Clone)]
pub struct Aggregator {
    run: Arc<dyn CloudRun>,
    negs: Arc<dyn EndpointGroups>,
    zone: DisplayZone,
    max_concurrent_lookups: Option<usize>,
}

impl Aggregator {
    pub fn new(run: Arc<dyn CloudRun>, negs: Arc<dyn EndpointGroups>, zone: DisplayZone) -> Self {
        Self {
            run,
            negs,
            zone,
            max_concurrent_lookups: None,
        }
    }

    /// Caps the number of revision lookups in flight during one run
    pub fn with_max_concurrent_lookups(mut self, limit: Option<usize>) -> Self {
        self.max_concurrent_lookups = limit.filter(|n| *n > 0);
        self
    }

    /// Builds one row per tagged revision that resolves successfully.
    ///
    /// Only a failure while listing services is returned as an error. NEG
    /// lookup failures degrade to an empty mask table and per-revision
    /// failures drop that revision; both are logged.
    pub async fn aggregate(
        &self,
        project: &str,
        location: &str,
        identifying_label: &str,
        max_revisions: usize,
    ) -> Result<Vec<Row>, ListingError> {
        let span = tracing::info_span!("aggregate", project = %project, location = %location);
        self.run_aggregation(project, location, identifying_label, max_revisions)
            .instrument(span)
            .await
    }

    async fn run_aggregation(
        &self,
        project: &str,
        location: &str,
        identifying_label: &str,
        max_revisions: usize,
    ) -> Result<Vec<Row>, ListingError> {
        let masks = match build_mask_table(self.negs.as_ref(), project, location).await {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get serverless NEGs, continuing without url masks");
                NegUrlMaskTable::default()
            }
        };
        let masks = Arc::new(masks);

        let rows = Arc::new(Mutex::new(Vec::new()));
        let label: Arc<str> = Arc::from(identifying_label);
        let limit = self.max_concurrent_lookups.map(|n| Arc::new(Semaphore::new(n)));
        let mut tasks = JoinSet::new();

        let parent = format!("projects/{}/locations/{}", project, location);
        let mut services = self.run.list_services(project, location);

        loop {
            let service = match services.try_next().await {
                Ok(Some(service)) => service,
                Ok(None) => break,
                Err(source) => {
                    // Dropping the join set aborts lookups already in flight
                    return Err(ListingError { parent, source });
                }
            };

            if service.base_url().is_none() && service.serverless_neg().is_none() {
                tracing::info!(
                    service = %service.name,
                    "Service has no baseurl or serverless-neg annotation, it is ignored"
                );
                continue;
            }

            let bindings = select_bindings(&service.traffic, max_revisions);
            if bindings.is_empty() {
                tracing::debug!(service = %service.name, "Service has no tagged revisions");
                continue;
            }

            let service = Arc::new(service);
            for binding in bindings {
                let run = Arc::clone(&self.run);
                let service = Arc::clone(&service);
                let masks = Arc::clone(&masks);
                let label = Arc::clone(&label);
                let rows = Arc::clone(&rows);
                let limit = limit.clone();
                let zone = self.zone;

                tasks.spawn(
                    async move {
                        let _permit = match limit {
                            Some(semaphore) => match semaphore.acquire_owned().await {
                                Ok(permit) => Some(permit),
                                Err(_) => return,
                            },
                            None => None,
                        };

                        match resolve_binding(run.as_ref(), &service, &binding, &label, &masks, zone)
                            .await
                        {
                            Ok(row) => rows.lock().await.push(row),
                            Err(e) => {
                                tracing::warn!(
                                    revision = %binding.revision_name,
                                    tag = %binding.tag,
                                    error = %e,
                                    "Dropping tagged revision"
                                );
                            }
                        }
                    }
                    .in_current_span(),
                );
            }
        }

        let launched = tasks.len();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Revision lookup task failed");
            }
        }

        let rows = std::mem::take(&mut *rows.lock().await);
        tracing::info!(launched, rows = rows.len(), "Aggregation complete");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use futures::stream::{self, BoxStream, StreamExt};
    use shared::types::{RevisionMetadata, ServiceDescriptor};
    use crate::cloud::EndpointGroup;
    use crate::error::CloudError;
    use crate::resolve::neg::tests::FakeNegs;

    #[derive(Default)]
    struct FakeRun {
        services: Vec<ServiceDescriptor>,
        /// Listing fails after yielding this many services
        fail_listing_after: Option<usize>,
        /// Revisions that fail to fetch
        missing: Vec<String>,
        delay: Duration,
        requested: std::sync::Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[async_trait]
    impl CloudRun for FakeRun {
        fn list_services<'a>(
            &'a self,
            _project: &'a str,
            _location: &'a str,
        ) -> BoxStream<'a, Result<ServiceDescriptor, CloudError>> {
            let mut items: Vec<Result<ServiceDescriptor, CloudError>> = Vec::new();
            for (i, service) in self.services.iter().enumerate() {
                if self.fail_listing_after == Some(i) {
                    items.push(Err(CloudError::Auth("listing failed".to_string())));
                    return stream::iter(items).boxed();
                }
                items.push(Ok(service.clone()));
            }
            if self.fail_listing_after == Some(self.services.len()) {
                items.push(Err(CloudError::Auth("listing failed".to_string())));
            }
            stream::iter(items).boxed()
        }

        async fn get_revision(
            &self,
            _service_name: &str,
            revision_name: &str,
        ) -> Result<RevisionMetadata, CloudError> {
            self.requested.lock().unwrap().push(revision_name.to_string());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.missing.iter().any(|m| m == revision_name) {
                return Err(CloudError::Status {
                    url: revision_name.to_string(),
                    status: reqwest::StatusCode::NOT_FOUND,
                    body: String::new(),
                });
            }
            Ok(RevisionMetadata {
                revision_name: revision_name.to_string(),
                created_at: created_at(),
            })
        }
    }

    impl FakeRun {
        fn requested(&self) -> Vec<String> {
            let mut requested = self.requested.lock().unwrap().clone();
            requested.sort();
            requested
        }
    }

    fn test_service(name: &str, annotations: &[(&str, &str)], tags: &[(&str, &str)]) -> ServiceDescriptor {
        ServiceDescriptor {
            name: format!("projects/p/locations/us-central1/services/{name}"),
            annotations: annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            labels: HashMap::from([("team".to_string(), "core".to_string())]),
            traffic: tags
                .iter()
                .map(|(revision, tag)| TrafficTarget {
                    revision: revision.to_string(),
                    tag: tag.to_string(),
                })
                .collect(),
        }
    }

    fn no_negs() -> Arc<FakeNegs> {
        Arc::new(FakeNegs {
            groups: Vec::new(),
            fail_after: false,
        })
    }

    fn aggregator(run: &Arc<FakeRun>, negs: Arc<FakeNegs>) -> Aggregator {
        Aggregator::new(
            Arc::clone(run) as Arc<dyn CloudRun>,
            negs,
            DisplayZone::Named(chrono_tz::UTC),
        )
    }

    #[test]
    fn test_select_bindings_takes_most_recent_tags() {
        let service = test_service(
            "svc1",
            &[],
            &[("rev1", "v1"), ("rev2", ""), ("rev3", "v3"), ("rev4", "v4"), ("rev5", "")],
        );

        let selected = select_bindings(&service.traffic, 2);
        let tags: Vec<&str> = selected.iter().map(|b| b.tag.as_str()).collect();
        assert_eq!(tags, vec!["v4", "v3"]);

        assert_eq!(select_bindings(&service.traffic, 10).len(), 3, "min(k, m) with k=3");
        assert!(select_bindings(&service.traffic, 0).is_empty());
    }

    #[tokio::test]
    async fn test_cap_keeps_most_recent_tag() {
        let run = Arc::new(FakeRun {
            services: vec![test_service(
                "svc1",
                &[("baseurl", "example.com")],
                &[("rev1", "v1"), ("rev2", "v2")],
            )],
            ..Default::default()
        });

        let rows = aggregator(&run, no_negs())
            .aggregate("p", "us-central1", "team", 1)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].revision_tag, "v2");
        assert_eq!(rows[0].base_url, "example.com");
        assert!(rows[0].url.contains("href=\"https://v2.example.com\""));
        assert_eq!(rows[0].identifying_label, "team=core");
        assert_eq!(rows[0].date, "2024-01-02 03:04:05");
        assert_eq!(run.requested(), vec!["rev2"]);
    }

    #[tokio::test]
    async fn test_neg_mask_resolution_end_to_end() {
        let run = Arc::new(FakeRun {
            services: vec![test_service(
                "svc1",
                &[("serverless-neg", "grp1"), ("baseurl", "example.com")],
                &[("rev3", "v3")],
            )],
            ..Default::default()
        });
        let negs = Arc::new(FakeNegs {
            groups: vec![EndpointGroup {
                name: "grp1".to_string(),
                url_mask: Some("<tag>---svc1.a.run.app".to_string()),
            }],
            fail_after: false,
        });

        let rows = aggregator(&run, negs)
            .aggregate("p", "us-central1", "team", 100)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert!(rows[0].url.contains("href=\"https://v3---svc1.a.run.app\""));
    }

    #[tokio::test]
    async fn test_neg_failure_degrades_to_baseurl() {
        let run = Arc::new(FakeRun {
            services: vec![
                test_service(
                    "svc1",
                    &[("serverless-neg", "grp1"), ("baseurl", "example.com")],
                    &[("rev1", "v1")],
                ),
                test_service("svc2", &[("serverless-neg", "grp2")], &[("rev2", "v2")]),
            ],
            ..Default::default()
        });
        let negs = Arc::new(FakeNegs {
            groups: vec![EndpointGroup {
                name: "grp1".to_string(),
                url_mask: Some("<tag>---svc1.a.run.app".to_string()),
            }],
            fail_after: true,
        });

        let rows = aggregator(&run, negs)
            .aggregate("p", "us-central1", "team", 100)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1, "Only the baseurl service can still resolve");
        assert_eq!(rows[0].base_url, "example.com");
    }

    #[tokio::test]
    async fn test_unannotated_services_are_skipped() {
        let run = Arc::new(FakeRun {
            services: vec![
                test_service("plain", &[], &[("rev1", "v1")]),
                test_service("blank", &[("baseurl", ""), ("serverless-neg", "")], &[("rev2", "v2")]),
                test_service("svc1", &[("baseurl", "example.com")], &[("rev3", "v3")]),
            ],
            ..Default::default()
        });

        let rows = aggregator(&run, no_negs())
            .aggregate("p", "us-central1", "team", 100)
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(run.requested(), vec!["rev3"], "No lookups for unannotated services");
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal() {
        let run = Arc::new(FakeRun {
            services: vec![
                test_service("svc1", &[("baseurl", "example.com")], &[("rev1", "v1")]),
                test_service("svc2", &[("baseurl", "example.com")], &[("rev2", "v2")]),
            ],
            fail_listing_after: Some(1),
            ..Default::default()
        });

        let err = aggregator(&run, no_negs())
            .aggregate("p", "us-central1", "team", 100)
            .await
            .unwrap_err();

        assert_eq!(err.parent, "projects/p/locations/us-central1");
        assert!(err.to_string().contains("listing failed"));
    }

    #[tokio::test]
    async fn test_failed_lookups_are_dropped() {
        let run = Arc::new(FakeRun {
            services: vec![
                test_service(
                    "svc1",
                    &[("baseurl", "example.com")],
                    &[("rev1", "v1"), ("rev2", "v2"), ("rev3", "v3")],
                ),
                test_service("svc2", &[("serverless-neg", "unknown")], &[("rev4", "v4")]),
            ],
            missing: vec!["rev2".to_string()],
            ..Default::default()
        });

        let rows = aggregator(&run, no_negs())
            .aggregate("p", "us-central1", "team", 100)
            .await
            .unwrap();

        let mut tags: Vec<&str> = rows.iter().map(|r| r.revision_tag.as_str()).collect();
        tags.sort();
        assert_eq!(tags, vec!["v1", "v3"]);
        assert_eq!(run.requested().len(), 4, "Every selected binding is looked up");
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let tags: Vec<(String, String)> = (0..300)
            .map(|i| (format!("rev{i}"), format!("t{i}")))
            .collect();
        let tag_refs: Vec<(&str, &str)> = tags.iter().map(|(r, t)| (r.as_str(), t.as_str())).collect();
        let missing: Vec<String> = (0..300).step_by(7).map(|i| format!("rev{i}")).collect();
        let expected = 300 - missing.len();

        let run = Arc::new(FakeRun {
            services: vec![test_service("svc1", &[("baseurl", "example.com")], &tag_refs)],
            missing,
            delay: Duration::from_millis(5),
            ..Default::default()
        });

        let rows = aggregator(&run, no_negs())
            .aggregate("p", "us-central1", "team", 1000)
            .await
            .unwrap();

        assert_eq!(rows.len(), expected);
        let mut seen: Vec<&str> = rows.iter().map(|r| r.revision_tag.as_str()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), expected, "No duplicate rows");
    }

    #[tokio::test]
    async fn test_concurrency_limit_bounds_lookups() {
        let tags: Vec<(String, String)> = (0..40)
            .map(|i| (format!("rev{i}"), format!("t{i}")))
            .collect();
        let tag_refs: Vec<(&str, &str)> = tags.iter().map(|(r, t)| (r.as_str(), t.as_str())).collect();

        let run = Arc::new(FakeRun {
            services: vec![test_service("svc1", &[("baseurl", "example.com")], &tag_refs)],
            delay: Duration::from_millis(10),
            ..Default::default()
        });

        let rows = aggregator(&run, no_negs())
            .with_max_concurrent_lookups(Some(4))
            .aggregate("p", "us-central1", "team", 100)
            .await
            .unwrap();

        assert_eq!(rows.len(), 40);
        assert!(run.max_in_flight.load(Ordering::SeqCst) <= 4);
    }
}
