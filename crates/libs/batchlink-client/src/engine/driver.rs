use std::sync::Arc;

use tokio::time::{self, Instant, MissedTickBehavior};

use crate::status::ClientStatus;

use super::session::{Session, SessionEnd};
use super::Shared;

pub(crate) struct Driver {
    shared: Arc<Shared>,
    session: Session,
}

impl Driver {
    pub(crate) fn new(shared: Arc<Shared>, session: Session) -> Self {
        Self { shared, session }
    }

    pub(crate) async fn run(mut self) {
        let end = self.drive().await;
        self.teardown(end).await;
    }

    async fn drive(&mut self) -> SessionEnd {
        let config = &self.shared.config;
        let start = Instant::now();

        let mut poll = time::interval_at(start + config.initial_poll_delay, config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let heartbeat = config.heartbeat_interval();
        let mut refresh = time::interval_at(start + heartbeat, heartbeat);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let cancel = self.shared.cancel.clone();
        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SessionEnd::Closed),
                // Refresh first: a slow poll pass must not starve heartbeats.
                _ = refresh.tick() => self.session.refresh(&self.shared),
                _ = poll.tick() => self.session.poll(&self.shared).await,
            };
            if let Err(end) = outcome {
                return end;
            }
        }
    }

    /// Runs exactly once per connection. Each step runs regardless of how the
    /// previous one went.
    async fn teardown(&mut self, end: SessionEnd) {
        let shared = &self.shared;
        let linger = shared.config.close_linger;

        match end {
            SessionEnd::Closed => {
                if !shared.status.latest().is_terminal() {
                    shared.status.publish(ClientStatus::Disconnected);
                }
            }
            SessionEnd::Terminated => {
                // Later host close() calls become no-ops.
                shared.begin_close();
                shared.status.publish(ClientStatus::Terminated);
            }
            SessionEnd::Disrupted(err) => {
                shared.begin_close();
                log::warn!("client({}): session disrupted: {err}", shared.label());
                shared.errors.publish(err);
                shared.status.publish(ClientStatus::Disrupted);
            }
        }

        self.session.say_goodbye(shared, linger).await;
        self.session.release(linger).await;

        shared.batches.complete();
        shared.lambdas.complete();
        shared.errors.complete();
        shared.status.complete();

        shared.cancel.cancel();
        shared.finished.cancel();
        log::debug!("client({}): closed", shared.label());
    }
}
