// src/scheduler.rs
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};

use crate::aggregator::{AggregationError, Aggregator};
use crate::models::server::EndpointDescriptor;
use crate::presenter::Presenter;
use crate::publisher::{
    cleanup_previous_messages, publish, BotUser, ChatPlatform, PlatformError, PublishError,
    PublishOutcome, PublishState,
};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("channel {0} not found")]
    ChannelUnresolved(u64),
    #[error("channel lookup failed: {0}")]
    ChannelLookup(#[source] PlatformError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Drives poll, render and publish on a fixed interval. Cycles never overlap:
/// the next tick is only awaited once the current cycle has settled.
pub struct Scheduler<P: ChatPlatform> {
    platform: P,
    aggregator: Aggregator,
    presenter: Presenter,
    descriptors: Vec<Arc<EndpointDescriptor>>,
    channel_id: u64,
    period: Duration,
    state: PublishState,
}

impl<P: ChatPlatform> Scheduler<P> {
    pub fn new(
        platform: P,
        aggregator: Aggregator,
        presenter: Presenter,
        descriptors: Vec<Arc<EndpointDescriptor>>,
        channel_id: u64,
        period: Duration,
    ) -> Self {
        Self {
            platform,
            aggregator,
            presenter,
            descriptors,
            channel_id,
            period,
            state: PublishState::Absent,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn state(&self) -> &PublishState {
        &self.state
    }

    /// Removes status messages left by earlier runs. Never fatal.
    pub async fn cleanup(&self, bot: &BotUser) {
        let channel = match self.platform.resolve_channel(self.channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                warn!("Skipping cleanup, channel {} not found", self.channel_id);
                return;
            }
            Err(e) => {
                warn!("Skipping cleanup, channel lookup failed: {}", e);
                return;
            }
        };

        if let Err(e) = cleanup_previous_messages(&self.platform, &channel, bot).await {
            warn!("Cleanup failed: {}", e);
        }
    }

    /// One full pass. On error the publish state is left as `publish` left it.
    pub async fn run_cycle(&mut self) -> Result<PublishOutcome, CycleError> {
        let channel = self
            .platform
            .resolve_channel(self.channel_id)
            .await
            .map_err(CycleError::ChannelLookup)?
            .ok_or(CycleError::ChannelUnresolved(self.channel_id))?;

        let snapshot = self.aggregator.aggregate(&self.descriptors).await?;
        let document = self.presenter.render(&snapshot);
        debug!(
            "Publishing {} players across {} servers to #{}",
            snapshot.total_players,
            snapshot.server_count(),
            channel.name.as_deref().unwrap_or("unknown")
        );

        let outcome = publish(&self.platform, &channel, &document, &mut self.state).await?;
        Ok(outcome)
    }

    /// Runs a cycle immediately, then once per period until `shutdown`
    /// resolves. Cycle errors are logged and never stop the loop.
    pub async fn run<F>(mut self, shutdown: F) -> PublishState
    where
        F: Future<Output = ()>,
    {
        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            "Publishing status for {} servers every {}s",
            self.descriptors.len(),
            self.period.as_secs()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping updates");
                    break;
                }
                _ = timer.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!("Error updating status: {}", e);
                    }
                }
            }
        }

        self.state
    }
}
