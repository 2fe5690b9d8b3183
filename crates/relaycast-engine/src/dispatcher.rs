//! The dispatch loop — sequential, paced, ledger-backed.
//!
//! One campaign pass at a time: a per-campaign async mutex makes every
//! dispatch/retry pass single-flight, so a unit in `sending` can never be
//! picked up by a second concurrent invocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use relaycast_channels::ChannelSender;
use relaycast_core::config::LinksConfig;
use relaycast_core::error::{RelaycastError, Result};
use relaycast_core::types::{ChannelKind, DispatchSummary, RecipientSeed, SendError, TenantCtx};
use relaycast_ledger::{Campaign, CampaignLedger, DispatchUnit};
use tokio::sync::{Mutex, Notify};

use crate::pacer::Pacer;
use crate::template;

/// Cooperative stop signal. Takes effect at the next unit boundary —
/// an in-flight send is never interrupted, only the pacing delay is.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.inner.notify.notified().await;
        }
    }
}

/// Outcome of one pass over a unit list.
struct PassOutcome {
    attempted: usize,
    succeeded: usize,
    failed: usize,
}

/// The campaign dispatch engine.
pub struct DispatchEngine {
    ledger: Arc<CampaignLedger>,
    chat: Arc<dyn ChannelSender>,
    email: Arc<dyn ChannelSender>,
    pacer: Arc<dyn Pacer>,
    links: LinksConfig,
    send_timeout: Duration,
    cancel: CancelToken,
    /// Single-flight guard per campaign id.
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DispatchEngine {
    pub fn new(
        ledger: Arc<CampaignLedger>,
        chat: Arc<dyn ChannelSender>,
        email: Arc<dyn ChannelSender>,
        pacer: Arc<dyn Pacer>,
        links: LinksConfig,
        send_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            chat,
            email,
            pacer,
            links,
            send_timeout,
            cancel: CancelToken::new(),
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<CampaignLedger> {
        &self.ledger
    }

    /// Stop token — cancelling it halts in-progress passes at the next
    /// unit boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub(crate) fn campaign_lock(&self, campaign_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Prune entries no in-flight pass holds, keeping the map bounded
        // by the number of concurrent passes.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(campaign_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    fn campaign_lock_entries(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    fn sender_for(&self, channel: ChannelKind) -> &dyn ChannelSender {
        match channel {
            ChannelKind::Chat => self.chat.as_ref(),
            ChannelKind::Email => self.email.as_ref(),
        }
    }

    /// Dispatch a campaign to a resolved recipient set.
    ///
    /// Inserts the seeds into the ledger, then runs every `pending` unit
    /// through the paced sequential loop. Callers must expect latency
    /// proportional to the unit count.
    pub async fn dispatch(
        &self,
        tenant: &TenantCtx,
        campaign_id: &str,
        seeds: Vec<RecipientSeed>,
    ) -> Result<DispatchSummary> {
        if campaign_id.is_empty() {
            return Err(RelaycastError::InvalidRequest("empty campaign id".into()));
        }
        let campaign = self.ledger.get_campaign(tenant, campaign_id)?;

        let lock = self.campaign_lock(campaign_id);
        let _guard = lock.lock().await;

        self.ledger.add_recipients(&campaign, &seeds)?;
        let units = self.ledger.list_dispatchable(campaign_id)?;
        tracing::info!(
            "🚀 Dispatching campaign '{}': {} unit(s) over {} recipient(s)",
            campaign.name,
            units.len(),
            seeds.len()
        );

        let outcome = self.run_units(&campaign, &units).await?;

        // Roll-up always runs, even after a partial pass.
        self.ledger.recompute(campaign_id)?;

        tracing::info!(
            "✅ Dispatch pass done for '{}': {} attempted, {} sent, {} failed",
            campaign.name,
            outcome.attempted,
            outcome.succeeded,
            outcome.failed
        );
        Ok(DispatchSummary {
            dispatched: outcome.attempted,
            succeeded: outcome.succeeded,
            failed: outcome.failed,
        })
    }

    /// Run units strictly sequentially: pace (except the first), mark
    /// sending, render, send with a bounded timeout, record the result.
    /// A unit's send failure never aborts the loop.
    async fn run_units(&self, campaign: &Campaign, units: &[DispatchUnit]) -> Result<PassOutcome> {
        let mut outcome = PassOutcome { attempted: 0, succeeded: 0, failed: 0 };

        for (i, unit) in units.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(
                    "⏹ Pass cancelled for campaign {} after {} unit(s)",
                    campaign.id,
                    outcome.attempted
                );
                break;
            }
            if i > 0 {
                tokio::select! {
                    _ = self.pacer.pause() => {}
                    _ = self.cancel.cancelled() => {
                        tracing::warn!("⏹ Pass cancelled for campaign {} during pacing", campaign.id);
                        break;
                    }
                }
            }

            self.ledger.mark_sending(&unit.recipient_id, unit.channel)?;

            let vars = template::unit_variables(unit, &self.links);
            let body = template::render(&campaign.template, &vars);
            let subject = match unit.channel {
                ChannelKind::Email => {
                    campaign.email_subject.as_deref().map(|s| template::render(s, &vars))
                }
                ChannelKind::Chat => None,
            };

            let result = self.send_with_timeout(unit, &body, subject.as_deref()).await;
            self.ledger.mark_result(&unit.recipient_id, unit.channel, &result)?;

            outcome.attempted += 1;
            match &result {
                Ok(()) => outcome.succeeded += 1,
                Err(err) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        "✉️ Unit failed ({} via {}): {}",
                        unit.name,
                        unit.channel,
                        err
                    );
                }
            }
        }

        Ok(outcome)
    }

    async fn send_with_timeout(
        &self,
        unit: &DispatchUnit,
        body: &str,
        subject: Option<&str>,
    ) -> std::result::Result<(), SendError> {
        let sender = self.sender_for(unit.channel);
        match tokio::time::timeout(self.send_timeout, sender.send(&unit.address, body, subject))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SendError::timeout(format!(
                "send timed out after {}s",
                self.send_timeout.as_secs()
            ))),
        }
    }

    /// Shared retry-pass body; the public entry point lives in `retry.rs`.
    pub(crate) async fn run_retry_units(
        &self,
        campaign: &Campaign,
        units: &[DispatchUnit],
    ) -> Result<(usize, usize, usize)> {
        let outcome = self.run_units(campaign, units).await?;
        Ok((outcome.attempted, outcome.succeeded, outcome.failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacer::NoDelayPacer;
    use async_trait::async_trait;
    use relaycast_ledger::NewCampaign;
    use std::sync::atomic::AtomicUsize;

    /// Scripted sender: the nth send (1-based) succeeds when `n` is odd.
    struct OddIndexSender {
        kind: ChannelKind,
        calls: AtomicUsize,
        addresses: std::sync::Mutex<Vec<String>>,
    }

    impl OddIndexSender {
        fn new(kind: ChannelKind) -> Self {
            Self {
                kind,
                calls: AtomicUsize::new(0),
                addresses: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChannelSender for OddIndexSender {
        fn kind(&self) -> ChannelKind {
            self.kind
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn send(
            &self,
            to: &str,
            _body: &str,
            _subject: Option<&str>,
        ) -> std::result::Result<(), SendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.addresses.lock().unwrap().push(to.to_string());
            if n % 2 == 1 {
                Ok(())
            } else {
                Err(SendError::rejected(format!("scripted failure #{n}")))
            }
        }
    }

    /// Always succeeds; records calls.
    struct OkSender {
        kind: ChannelKind,
        calls: AtomicUsize,
    }

    impl OkSender {
        fn new(kind: ChannelKind) -> Self {
            Self { kind, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl ChannelSender for OkSender {
        fn kind(&self) -> ChannelKind {
            self.kind
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn send(
            &self,
            _to: &str,
            _body: &str,
            _subject: Option<&str>,
        ) -> std::result::Result<(), SendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Never resolves — exercises the per-send timeout.
    struct HangingSender;

    #[async_trait]
    impl ChannelSender for HangingSender {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Chat
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn send(
            &self,
            _to: &str,
            _body: &str,
            _subject: Option<&str>,
        ) -> std::result::Result<(), SendError> {
            futures::future::pending().await
        }
    }

    struct CountingPacer {
        pauses: AtomicUsize,
    }

    #[async_trait]
    impl Pacer for CountingPacer {
        async fn pause(&self) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn seed(name: &str, phone: Option<&str>, email: Option<&str>) -> RecipientSeed {
        RecipientSeed {
            source_ref: None,
            name: name.into(),
            phone: phone.map(String::from),
            email: email.map(String::from),
            variables: HashMap::new(),
            link_token: None,
        }
    }

    fn engine_with(
        chat: Arc<dyn ChannelSender>,
        email: Arc<dyn ChannelSender>,
        pacer: Arc<dyn Pacer>,
    ) -> DispatchEngine {
        DispatchEngine::new(
            Arc::new(CampaignLedger::in_memory().unwrap()),
            chat,
            email,
            pacer,
            LinksConfig::default(),
            Duration::from_secs(5),
        )
    }

    fn chat_campaign(engine: &DispatchEngine, tenant: &TenantCtx) -> Campaign {
        engine
            .ledger()
            .create_campaign(
                tenant,
                &NewCampaign {
                    name: "launch".into(),
                    template: "Hi {first_name}, see {confirm_link}".into(),
                    email_subject: None,
                    chat_enabled: true,
                    email_enabled: false,
                },
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_chat_only_pass() {
        let chat = Arc::new(OddIndexSender::new(ChannelKind::Chat));
        let engine = engine_with(
            chat.clone(),
            Arc::new(OkSender::new(ChannelKind::Email)),
            Arc::new(NoDelayPacer),
        );
        let tenant = TenantCtx::new("t1");
        let campaign = chat_campaign(&engine, &tenant);

        // 5 recipients, 2 without a phone number.
        let seeds = vec![
            seed("Ana", Some("+551"), None),
            seed("Bruno", None, Some("b@example.com")),
            seed("Carla", Some("+553"), None),
            seed("Davi", None, None),
            seed("Elisa", Some("+555"), None),
        ];
        // The contactless recipient would normally be dropped by the
        // resolver; the ledger marks it not_applicable either way.
        let summary = engine.dispatch(&tenant, &campaign.id, seeds).await.unwrap();

        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);

        let reloaded = engine.ledger().get_campaign(&tenant, &campaign.id).unwrap();
        assert_eq!(reloaded.sent_count, 2);
        assert_eq!(reloaded.failed_count, 1);

        // Deterministic pass order: resolver/input order.
        let addresses = chat.addresses.lock().unwrap().clone();
        assert_eq!(addresses, ["+551", "+553", "+555"]);
    }

    #[tokio::test]
    async fn test_pacer_skipped_for_first_unit() {
        let pacer = Arc::new(CountingPacer { pauses: AtomicUsize::new(0) });
        let engine = engine_with(
            Arc::new(OkSender::new(ChannelKind::Chat)),
            Arc::new(OkSender::new(ChannelKind::Email)),
            pacer.clone(),
        );
        let tenant = TenantCtx::new("t1");
        let campaign = chat_campaign(&engine, &tenant);

        let seeds = vec![
            seed("A", Some("+1"), None),
            seed("B", Some("+2"), None),
            seed("C", Some("+3"), None),
        ];
        let summary = engine.dispatch(&tenant, &campaign.id, seeds).await.unwrap();
        assert_eq!(summary.dispatched, 3);
        // Delay before every unit except the first.
        assert_eq!(pacer.pauses.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_recorded_as_failure() {
        let engine = DispatchEngine::new(
            Arc::new(CampaignLedger::in_memory().unwrap()),
            Arc::new(HangingSender),
            Arc::new(OkSender::new(ChannelKind::Email)),
            Arc::new(NoDelayPacer),
            LinksConfig::default(),
            Duration::from_secs(2),
        );
        let tenant = TenantCtx::new("t1");
        let campaign = chat_campaign(&engine, &tenant);

        let summary = engine
            .dispatch(&tenant, &campaign.id, vec![seed("Ana", Some("+551"), None)])
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);

        let rows = engine.ledger().recipients_for(&campaign.id).unwrap();
        let error = rows[0].chat.error.as_deref().unwrap();
        assert!(error.starts_with("timeout:"), "unexpected error: {error}");
    }

    #[tokio::test]
    async fn test_cancel_stops_at_unit_boundary() {
        let chat = Arc::new(OkSender::new(ChannelKind::Chat));
        let engine = engine_with(
            chat.clone(),
            Arc::new(OkSender::new(ChannelKind::Email)),
            Arc::new(NoDelayPacer),
        );
        let tenant = TenantCtx::new("t1");
        let campaign = chat_campaign(&engine, &tenant);

        engine.cancel_token().cancel();
        let summary = engine
            .dispatch(&tenant, &campaign.id, vec![seed("Ana", Some("+551"), None)])
            .await
            .unwrap();
        assert_eq!(summary.dispatched, 0);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
        // The roll-up still ran.
        let reloaded = engine.ledger().get_campaign(&tenant, &campaign.id).unwrap();
        assert_eq!(reloaded.sent_count, 0);
    }

    #[tokio::test]
    async fn test_empty_campaign_id_is_invalid() {
        let engine = engine_with(
            Arc::new(OkSender::new(ChannelKind::Chat)),
            Arc::new(OkSender::new(ChannelKind::Email)),
            Arc::new(NoDelayPacer),
        );
        let err = engine
            .dispatch(&TenantCtx::new("t1"), "", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, RelaycastError::InvalidRequest(_)));
    }

    #[test]
    fn test_campaign_lock_is_shared_per_id() {
        let engine = engine_with(
            Arc::new(OkSender::new(ChannelKind::Chat)),
            Arc::new(OkSender::new(ChannelKind::Email)),
            Arc::new(NoDelayPacer),
        );
        let a = engine.campaign_lock("c1");
        let b = engine.campaign_lock("c1");
        let c = engine.campaign_lock("c2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_campaign_lock_map_drops_released_entries() {
        let engine = engine_with(
            Arc::new(OkSender::new(ChannelKind::Chat)),
            Arc::new(OkSender::new(ChannelKind::Email)),
            Arc::new(NoDelayPacer),
        );
        let held = engine.campaign_lock("c1");
        drop(engine.campaign_lock("c2"));
        drop(engine.campaign_lock("c3"));

        // Only the still-held entry survives the next acquisition's prune.
        let _other = engine.campaign_lock("c4");
        assert_eq!(engine.campaign_lock_entries(), 2);
        drop(held);
    }
}
