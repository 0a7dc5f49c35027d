// src/aggregator.rs
use log::{debug, error};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

use crate::models::server::{Category, EndpointDescriptor, ServerStatus};
use crate::models::snapshot::ServerStatusSnapshot;
use crate::probe::probe;

pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 16;

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("probe task for {name} did not complete: {source}")]
    Task {
        name: String,
        #[source]
        source: JoinError,
    },
}

/// Fans probes out over the configured endpoints and merges the results.
#[derive(Clone)]
pub struct Aggregator {
    client: Client,
    timeout: Duration,
    limiter: Arc<Semaphore>,
    category_order: Vec<Category>,
}

impl Aggregator {
    pub fn new(
        client: Client,
        timeout: Duration,
        max_concurrent: usize,
        category_order: Vec<Category>,
    ) -> Self {
        Self {
            client,
            timeout,
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            category_order,
        }
    }

    /// Probes every descriptor and waits for all of them. Results are matched
    /// back to their descriptor by position, so completion order never affects
    /// the snapshot.
    pub async fn aggregate(
        &self,
        descriptors: &[Arc<EndpointDescriptor>],
    ) -> Result<ServerStatusSnapshot, AggregationError> {
        let mut handles = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let descriptor = Arc::clone(descriptor);
            let client = self.client.clone();
            let limiter = Arc::clone(&self.limiter);
            let timeout = self.timeout;
            let name = descriptor.name.clone();

            handles.push((
                name,
                tokio::spawn(async move {
                    // Never closed; acquire cannot fail.
                    let _permit = limiter.acquire_owned().await.ok();
                    probe(descriptor, &client, timeout).await
                }),
            ));
        }

        let mut statuses: Vec<ServerStatus> = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(status) => statuses.push(status),
                Err(source) => {
                    error!("Probe task for {} failed: {}", name, source);
                    return Err(AggregationError::Task { name, source });
                }
            }
        }

        let online = statuses.iter().filter(|s| s.is_online()).count();
        debug!(
            "Probed {} servers ({} online, {} offline)",
            statuses.len(),
            online,
            statuses.len() - online
        );

        Ok(ServerStatusSnapshot::build(&self.category_order, statuses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn game_server(clients: u32, delay: Duration) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "clients": clients,
                        "maxclients": 16,
                        "track": "content/tracks/ks_vallelunga"
                    }))
                    .set_delay(delay),
            )
            .mount(&server)
            .await;
        server
    }

    fn descriptor(name: &str, category: &str, server: &MockServer) -> Arc<EndpointDescriptor> {
        Arc::new(EndpointDescriptor {
            name: name.to_string(),
            address: "127.0.0.1".to_string(),
            port: server.address().port(),
            category: Category::from(category),
        })
    }

    fn aggregator(max_concurrent: usize) -> Aggregator {
        Aggregator::new(
            Client::new(),
            Duration::from_secs(2),
            max_concurrent,
            vec!["Drift".into(), "Touge".into(), "Track".into()],
        )
    }

    #[tokio::test]
    async fn order_follows_configuration_not_completion() {
        // The first endpoint answers last.
        let slow = game_server(1, Duration::from_millis(300)).await;
        let medium = game_server(2, Duration::from_millis(150)).await;
        let fast = game_server(3, Duration::ZERO).await;

        let descriptors = vec![
            descriptor("slow", "Drift", &slow),
            descriptor("medium", "Drift", &medium),
            descriptor("fast", "Drift", &fast),
        ];

        let snapshot = aggregator(8).aggregate(&descriptors).await.unwrap();
        let names: Vec<&str> = snapshot.groups[0]
            .servers
            .iter()
            .map(|s| s.descriptor.name.as_str())
            .collect();
        assert_eq!(names, vec!["slow", "medium", "fast"]);
        assert_eq!(snapshot.groups[0].total_players, 6);
        assert_eq!(snapshot.total_players, 6);
    }

    #[tokio::test]
    async fn concurrency_cap_of_one_runs_requests_one_at_a_time() {
        let delay = Duration::from_millis(100);
        let a = game_server(4, delay).await;
        let b = game_server(5, delay).await;
        let c = game_server(0, delay).await;

        let descriptors = vec![
            descriptor("a", "Touge", &a),
            descriptor("b", "Track", &b),
            descriptor("c", "Track", &c),
        ];

        let started = Instant::now();
        let snapshot = aggregator(1).aggregate(&descriptors).await.unwrap();
        let serial = started.elapsed();

        // Three 100ms answers that never overlap.
        assert!(serial >= Duration::from_millis(300), "took {:?}", serial);
        assert_eq!(snapshot.server_count(), 3);
        assert_eq!(snapshot.group(&"Touge".into()).unwrap().total_players, 4);
        assert_eq!(snapshot.group(&"Track".into()).unwrap().total_players, 5);
        assert!(snapshot.group(&"Track".into()).unwrap().servers[1].is_online());
        assert_eq!(snapshot.total_players, 9);

        let started = Instant::now();
        aggregator(3).aggregate(&descriptors).await.unwrap();
        let parallel = started.elapsed();
        assert!(parallel < serial, "cap 3 took {:?}, cap 1 took {:?}", parallel, serial);
    }

    #[tokio::test]
    async fn no_descriptors_yields_empty_groups() {
        let snapshot = aggregator(4).aggregate(&[]).await.unwrap();
        assert_eq!(snapshot.groups.len(), 3);
        assert_eq!(snapshot.server_count(), 0);
        assert_eq!(snapshot.total_players, 0);
    }
}
