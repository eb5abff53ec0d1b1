//! Per-process map from session id to live conversation agent.
//!
//! Sessions are created lazily on first use and constructed exactly once per id even when
//! several requests for a new id race. Messages within one session are serialized by the
//! session's own lock; different sessions run independently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::factory::AgentFactory;
use crate::runtime::{AgentReply, ConversationAgent};

pub struct Session {
    id: String,
    agent: Mutex<Box<dyn ConversationAgent>>,
    created_at: DateTime<Utc>,
    last_accessed_ms: AtomicI64,
}

impl Session {
    fn new(id: &str, agent: Box<dyn ConversationAgent>) -> Self {
        // Millisecond precision on both timestamps keeps last access >= creation.
        let now = Utc::now().trunc_subsecs(3);
        Self {
            id: id.to_string(),
            agent: Mutex::new(agent),
            created_at: now,
            last_accessed_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        let millis = self.last_accessed_ms.load(Ordering::Relaxed);
        Utc.timestamp_millis_opt(millis).single().unwrap_or(self.created_at)
    }

    pub fn touch(&self) {
        self.last_accessed_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_accessed()).to_std().unwrap_or(Duration::ZERO)
    }

    fn is_busy(&self) -> bool {
        self.agent.try_lock().is_err()
    }

    /// Runs one message through the agent. Concurrent callers on the same session queue here.
    pub async fn invoke(&self, message: &str) -> Result<AgentReply, AgentError> {
        let mut agent = self.agent.lock().await;
        self.touch();
        let reply = agent.invoke(message).await;
        self.touch();
        reply
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Default)]
struct SessionSlot {
    session: OnceCell<Arc<Session>>,
}

pub struct SessionRegistry {
    factory: Arc<dyn AgentFactory>,
    slots: RwLock<HashMap<String, Arc<SessionSlot>>>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self { factory, slots: RwLock::new(HashMap::new()) }
    }

    async fn slot(&self, session_id: &str) -> Arc<SessionSlot> {
        if let Some(slot) = self.slots.read().await.get(session_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(session_id.to_string()).or_default())
    }

    pub async fn get_or_create(&self, session_id: &str) -> Result<Arc<Session>, AgentError> {
        let slot = self.slot(session_id).await;
        let mut constructed = false;
        let constructed_flag = &mut constructed;

        let created = slot
            .session
            .get_or_try_init(move || async move {
                info!(event_name = "session.create", session_id, "creating new session");
                let agent = self.factory.create(session_id).await?;
                *constructed_flag = true;
                Ok::<_, AgentError>(Arc::new(Session::new(session_id, agent)))
            })
            .await;

        match created {
            Ok(session) => {
                let session = Arc::clone(session);
                if constructed {
                    self.reinstate(session_id, &slot).await;
                }
                session.touch();
                Ok(session)
            }
            Err(error) => {
                warn!(
                    event_name = "session.create.failed",
                    session_id,
                    error = %error,
                    "agent construction failed"
                );
                let mut slots = self.slots.write().await;
                let dangling = slots
                    .get(session_id)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot) && !current.session.initialized());
                if dangling {
                    slots.remove(session_id);
                }
                Err(error)
            }
        }
    }

    /// A `clear` that ran while this slot was still being built removed it from the map.
    /// The freshly built session is put back so later messages reuse it.
    async fn reinstate(&self, session_id: &str, slot: &Arc<SessionSlot>) {
        let mut slots = self.slots.write().await;
        if !slots.contains_key(session_id) {
            debug!(event_name = "session.reinstated", session_id, "re-registered session after clear");
            slots.insert(session_id.to_string(), Arc::clone(slot));
        }
    }

    /// Drops the session's agent. The next message for this id starts from a fresh agent.
    pub async fn clear(&self, session_id: &str) -> bool {
        let removed = self.slots.write().await.remove(session_id);
        let existed = removed.is_some_and(|slot| slot.session.initialized());
        if existed {
            info!(event_name = "session.cleared", session_id, "session cleared");
        }
        existed
    }

    pub async fn count(&self) -> usize {
        self.slots.read().await.values().filter(|slot| slot.session.initialized()).count()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let slots = self.slots.read().await;
        let mut ids = slots
            .iter()
            .filter(|(_, slot)| slot.session.initialized())
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    pub async fn info(&self, session_id: &str) -> Option<SessionInfo> {
        let slots = self.slots.read().await;
        let session = slots.get(session_id)?.session.get()?;
        Some(SessionInfo {
            session_id: session.id().to_string(),
            created_at: session.created_at(),
            last_accessed: session.last_accessed(),
        })
    }

    /// Removes sessions idle for at least `max_idle`. Sessions still being constructed or
    /// currently processing a message are kept.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| match slot.session.get() {
            Some(session) => session.is_busy() || session.idle_for(now) < max_idle,
            None => true,
        });
        let evicted = before - slots.len();
        if evicted > 0 {
            info!(event_name = "session.evicted", evicted, remaining = slots.len(), "evicted idle sessions");
        }
        evicted
    }

    pub fn spawn_idle_sweeper(self: &Arc<Self>, idle_timeout: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = (idle_timeout / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = registry.evict_idle(idle_timeout).await;
                debug!(event_name = "session.sweep", evicted, "idle session sweep finished");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::SessionRegistry;
    use crate::error::AgentError;
    use crate::factory::AgentFactory;
    use crate::runtime::{AgentReply, ConversationAgent};

    struct EchoAgent {
        generation: usize,
        seen: usize,
    }

    #[async_trait]
    impl ConversationAgent for EchoAgent {
        async fn invoke(&mut self, message: &str) -> Result<AgentReply, AgentError> {
            self.seen += 1;
            Ok(AgentReply::Text(format!("agent{}#{}: {message}", self.generation, self.seen)))
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl AgentFactory for CountingFactory {
        async fn create(&self, _session_id: &str) -> Result<Box<dyn ConversationAgent>, AgentError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(AgentError::Model("credentials rejected".into()));
            }
            let generation = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Box::new(EchoAgent { generation, seen: 0 }))
        }
    }

    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    struct SlowAgent {
        in_flight: Arc<InFlight>,
    }

    #[async_trait]
    impl ConversationAgent for SlowAgent {
        async fn invoke(&mut self, message: &str) -> Result<AgentReply, AgentError> {
            let now = self.in_flight.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.in_flight.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.current.fetch_sub(1, Ordering::SeqCst);
            Ok(AgentReply::Text(format!("done: {message}")))
        }
    }

    struct SlowFactory {
        in_flight: Arc<InFlight>,
    }

    #[async_trait]
    impl AgentFactory for SlowFactory {
        async fn create(&self, _session_id: &str) -> Result<Box<dyn ConversationAgent>, AgentError> {
            Ok(Box::new(SlowAgent { in_flight: Arc::clone(&self.in_flight) }))
        }
    }

    fn registry(factory: CountingFactory) -> (Arc<SessionRegistry>, Arc<CountingFactory>) {
        let factory = Arc::new(factory);
        (Arc::new(SessionRegistry::new(factory.clone())), factory)
    }

    #[tokio::test]
    async fn same_id_returns_same_session() {
        let (registry, factory) = registry(CountingFactory::default());

        let first = registry.get_or_create("a").await.expect("first");
        let second = registry.get_or_create("a").await.expect("second");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_first_messages_construct_once() {
        let (registry, factory) = registry(CountingFactory {
            delay: Duration::from_millis(25),
            ..CountingFactory::default()
        });

        let handles = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get_or_create("race").await.map(|_| ()) })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await.expect("join").expect("session");
        }

        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_messages_in_one_session_run_one_at_a_time() {
        let in_flight = Arc::new(InFlight::default());
        let registry =
            Arc::new(SessionRegistry::new(Arc::new(SlowFactory { in_flight: Arc::clone(&in_flight) })));

        let handles = (0..6)
            .map(|n| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    let session = registry.get_or_create("shared").await?;
                    session.invoke(&format!("m{n}")).await
                })
            })
            .collect::<Vec<_>>();
        let mut replies = Vec::new();
        for handle in handles {
            replies.push(handle.await.expect("join").expect("reply").into_text());
        }

        replies.sort();
        let expected = (0..6).map(|n| format!("done: m{n}")).collect::<Vec<_>>();
        assert_eq!(replies, expected);
        assert_eq!(in_flight.peak.load(Ordering::SeqCst), 1);
        assert_eq!(in_flight.current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clear_during_construction_keeps_the_new_session() {
        let (registry, factory) = registry(CountingFactory {
            delay: Duration::from_millis(50),
            ..CountingFactory::default()
        });

        let pending = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_or_create("a").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!registry.clear("a").await);

        let first = pending.await.expect("join").expect("session");
        let second = registry.get_or_create("a").await.expect("session again");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn clear_after_construction_is_not_undone() {
        let (registry, factory) = registry(CountingFactory::default());
        let before = registry.get_or_create("a").await.expect("a");

        assert!(registry.clear("a").await);
        let after = registry.get_or_create("a").await.expect("a again");

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn last_access_never_precedes_creation() {
        let (registry, _) = registry(CountingFactory::default());

        for n in 0..50 {
            let session = registry.get_or_create(&format!("s{n}")).await.expect("session");
            assert!(session.last_accessed() >= session.created_at());
        }
    }

    #[tokio::test]
    async fn sessions_are_isolated_and_keep_their_agent() {
        let (registry, _) = registry(CountingFactory::default());

        let a = registry.get_or_create("a").await.expect("a");
        let b = registry.get_or_create("b").await.expect("b");

        assert_eq!(a.invoke("one").await.expect("reply").into_text(), "agent1#1: one");
        assert_eq!(b.invoke("two").await.expect("reply").into_text(), "agent2#1: two");
        assert_eq!(a.invoke("three").await.expect("reply").into_text(), "agent1#2: three");
        assert_eq!(registry.session_ids().await, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn clear_reports_existence_and_next_use_builds_fresh_agent() {
        let (registry, factory) = registry(CountingFactory::default());

        assert!(!registry.clear("missing").await);

        let before = registry.get_or_create("a").await.expect("a");
        assert!(registry.clear("a").await);
        assert_eq!(registry.count().await, 0);

        let after = registry.get_or_create("a").await.expect("a again");
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(after.invoke("hi").await.expect("reply").into_text(), "agent2#1: hi");
    }

    #[tokio::test]
    async fn failed_construction_leaves_no_entry() {
        let (registry, _) = registry(CountingFactory { fail: true, ..CountingFactory::default() });

        assert!(registry.get_or_create("a").await.is_err());
        assert_eq!(registry.count().await, 0);
        assert!(registry.session_ids().await.is_empty());
        assert!(registry.info("a").await.is_none());
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let (registry, _) = registry(CountingFactory::default());
        registry.get_or_create("a").await.expect("a");
        registry.get_or_create("b").await.expect("b");

        assert_eq!(registry.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(registry.evict_idle(Duration::ZERO).await, 2);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn info_reports_timestamps() {
        let (registry, _) = registry(CountingFactory::default());
        registry.get_or_create("a").await.expect("a");

        let info = registry.info("a").await.expect("info");

        assert_eq!(info.session_id, "a");
        assert!(info.last_accessed >= info.created_at);
    }
}
