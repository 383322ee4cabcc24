// Scheduler: periodic `EverySecond` ticks for every open session
//
// Layered onto the session lifecycle as a `SessionHook`. Ticks are injected into
// each session's inbox rather than dispatched here, so they run inside the
// session's own task and a slow session never holds up the others.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use crate::app::SessionHook;
use crate::message::{EverySecond, Event, Message, Payload};
use crate::session::{Session, SessionId};
use crate::Result;

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

pub struct Scheduler {
    period: Duration,
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_PERIOD)
    }
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            sessions: DashMap::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn register(&self, session: Arc<Session>) {
        self.sessions.insert(session.id(), session);
    }

    pub fn deregister(&self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Ids of the sessions currently receiving ticks, sorted.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Inject one tick into every registered session. Returns how many accepted it.
    pub fn tick(&self) -> usize {
        let event = Event::new(EverySecond::KIND, Payload::new());
        let sessions: Vec<Arc<Session>> = self.sessions.iter().map(|e| Arc::clone(e.value())).collect();
        sessions
            .iter()
            .filter(|session| session.inject(event.clone()))
            .count()
    }

    /// Run `tick` every period until the returned handle is aborted.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        info!(target: "sundash", period_ms = scheduler.period.as_millis() as u64, "Scheduler started");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let delivered = scheduler.tick();
                trace!(target: "sundash", delivered, sessions = scheduler.len(), "Tick");
            }
        })
    }
}

#[async_trait]
impl SessionHook for Scheduler {
    async fn on_session_open(&self, session: &Arc<Session>) -> Result<()> {
        self.register(Arc::clone(session));
        debug!(target: "sundash", session = %session.id(), "Scheduled");
        Ok(())
    }

    async fn on_session_close(&self, session: &Arc<Session>) {
        if self.deregister(session.id()) {
            debug!(target: "sundash", session = %session.id(), "Unscheduled");
        }
    }
}
