// ── Account facade ──
//
// Full lifecycle management for one Zaptec cloud account: login,
// discovery of the installation/charger hierarchy, the polling loop,
// and command routing with the local operation-mode gate. This is the
// surface the smart-home host consumes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use zaplink_api::models::to_attribute_object;
use zaplink_api::{ApiClient, ApiError, RateLimiter, TransportConfig};

use crate::catalog::{ConstantsCatalog, EXCLUDED_OBSERVATIONS, UPDATE_PARAMS, to_snake_case};
use crate::config::AccountConfig;
use crate::error::CoreError;
use crate::model::{Device, DeviceKind};
use crate::modes::{ChargerCommand, CommandDecision, decide};
use crate::poll::{PollClass, PollScheduler};
use crate::store::DeviceStore;

/// Installation-wide current limit request: either the total, or all
/// three phases, exclusively.
#[derive(Debug, Clone, Default)]
pub struct AvailableCurrent {
    pub total: Option<f64>,
    pub phase1: Option<f64>,
    pub phase2: Option<f64>,
    pub phase3: Option<f64>,
}

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc`. [`login()`](Self::login) authenticates,
/// [`build()`](Self::build) discovers devices and the constants
/// catalog, [`start()`](Self::start) spawns the polling loop.
#[derive(Clone)]
pub struct Account {
    inner: Arc<AccountInner>,
}

struct AccountInner {
    config: AccountConfig,
    client: ApiClient,
    catalog: ArcSwap<ConstantsCatalog>,
    store: DeviceStore,
    scheduler: PollScheduler,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Account {
    /// Create an account handle. Does not authenticate.
    pub fn new(config: AccountConfig) -> Result<Self, CoreError> {
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window,
        ));
        let transport = TransportConfig {
            timeout: config.timeout,
        };
        let client = ApiClient::new(
            config.credentials.clone(),
            limiter,
            &transport,
            config.api.clone(),
        )?;
        let scheduler = PollScheduler::new(config.cadence.clone());

        Ok(Self {
            inner: Arc::new(AccountInner {
                config,
                client,
                catalog: ArcSwap::from_pointee(ConstantsCatalog::empty()),
                store: DeviceStore::new(),
                scheduler,
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    /// The shared device store.
    pub fn store(&self) -> &DeviceStore {
        &self.inner.store
    }

    /// The current constants catalog.
    pub fn catalog(&self) -> Arc<ConstantsCatalog> {
        self.inner.catalog.load_full()
    }

    /// Authenticate against the cloud.
    pub async fn login(&self) -> Result<(), CoreError> {
        self.inner.client.login().await?;
        Ok(())
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Fetch the constants catalog and discover the device hierarchy:
    /// installations, their circuits' chargers, and standalone chargers
    /// the account can see. Safe to call again to refresh the topology.
    pub async fn build(&self) -> Result<(), CoreError> {
        debug!("discovering account hierarchy");
        let doc = self.inner.client.constants().await?;
        self.inner
            .catalog
            .store(Arc::new(ConstantsCatalog::from_document(&doc, None)));

        let known_before: HashSet<String> = self.inner.store.uids().into_iter().collect();
        let mut seen: HashSet<String> = HashSet::new();

        let installations = self.inner.client.installations().await?;
        for inst in installations.data {
            seen.insert(inst.id.clone());
            let name = inst.name.clone().unwrap_or_else(|| inst.id.clone());
            self.register_device(&inst.id, DeviceKind::Installation, &name, None, None);
            self.merge_object(&inst.id, to_attribute_object(&inst))?;
            self.discover_hierarchy(&inst.id, &mut seen).await?;
        }

        // Standalone chargers. Users without service access cannot read
        // the installation object at all, so every charger the account
        // lists must be registered here if discovery didn't find it.
        let chargers = self.inner.client.chargers().await?;
        for charger in chargers.data {
            seen.insert(charger.id.clone());
            if self.inner.store.contains(&charger.id) {
                self.merge_object(&charger.id, to_attribute_object(&charger))?;
                continue;
            }
            let installation_id = charger
                .installation_id
                .clone()
                .filter(|id| self.inner.store.contains(id));
            self.register_device(
                &charger.id,
                DeviceKind::Charger,
                &charger.name,
                installation_id,
                Some(charger.device_type),
            );
            self.merge_object(&charger.id, to_attribute_object(&charger))?;
        }

        for vanished in known_before.difference(&seen) {
            warn!(uid = %vanished, "device is no longer reported by the cloud but remains tracked");
        }

        self.apply_allowlist();

        // Rebuild the catalog with the schema tables of the device
        // types we actually own.
        let device_types: HashSet<i64> = self
            .inner
            .store
            .chargers()
            .iter()
            .filter_map(|c| c.device_type)
            .collect();
        if !device_types.is_empty() {
            self.inner
                .catalog
                .store(Arc::new(ConstantsCatalog::from_document(
                    &doc,
                    Some(&device_types),
                )));
        }
        for device in self
            .inner
            .store
            .installations()
            .into_iter()
            .chain(self.inner.store.chargers())
        {
            self.inner.scheduler.register_device(&device.uid, device.kind);
        }

        info!(
            installations = self.inner.store.installations().len(),
            chargers = self.inner.store.chargers().len(),
            "account hierarchy built"
        );
        Ok(())
    }

    /// Walk one installation's circuit hierarchy, registering chargers
    /// with their circuit metadata injected as attributes.
    async fn discover_hierarchy(
        &self,
        installation_uid: &str,
        seen: &mut HashSet<String>,
    ) -> Result<(), CoreError> {
        let hierarchy = match self.inner.client.installation_hierarchy(installation_uid).await {
            Ok(h) => h,
            Err(ApiError::RequestFailed { status: 403, .. }) => {
                warn!(
                    uid = %installation_uid,
                    "access denied to installation hierarchy, user may lack access"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        for circuit in hierarchy.circuits {
            debug!(circuit = %circuit.id, "discovered circuit");
            for charger in circuit.chargers {
                seen.insert(charger.id.clone());
                self.register_device(
                    &charger.id,
                    DeviceKind::Charger,
                    &charger.name,
                    Some(installation_uid.to_owned()),
                    Some(charger.device_type),
                );
                let mut attrs = to_attribute_object(&charger);
                attrs.insert("InstallationId".into(), json!(installation_uid));
                attrs.insert("CircuitId".into(), json!(&circuit.id));
                attrs.insert("CircuitName".into(), json!(&circuit.name));
                if let Some(max) = circuit.max_current {
                    attrs.insert("CircuitMaxCurrent".into(), json!(max));
                }
                self.merge_object(&charger.id, attrs)?;
            }
        }
        Ok(())
    }

    fn register_device(
        &self,
        uid: &str,
        kind: DeviceKind,
        name: &str,
        installation_id: Option<String>,
        device_type: Option<i64>,
    ) {
        let mut device = Device::new(
            uid,
            kind,
            format!("{}{name}", self.inner.config.name_prefix),
        );
        device.installation_id = installation_id;
        device.device_type = device_type;
        self.inner.store.register(device);
    }

    /// Drop devices outside the configured charger allowlist.
    /// Installations survive when they own at least one kept charger.
    fn apply_allowlist(&self) {
        let Some(wanted) = self.inner.config.tracked_chargers.as_ref() else {
            return;
        };
        for missing in wanted {
            if !self.inner.store.contains(missing) {
                warn!(uid = %missing, "configured charger not found in account");
            }
        }

        let mut keep: HashSet<String> = HashSet::new();
        for charger in self.inner.store.chargers() {
            if wanted.contains(&charger.uid) {
                keep.insert(charger.uid.clone());
                if let Some(inst) = charger.installation_id {
                    keep.insert(inst);
                }
            }
        }
        if keep.is_empty() {
            warn!("charger allowlist matches no devices, nothing will be tracked");
        }
        for uid in self.inner.store.uids() {
            if !keep.contains(&uid) {
                self.inner.store.remove(&uid);
                self.inner.scheduler.unregister_device(&uid);
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the polling loop.
    pub async fn start(&self) {
        let cancel = self.inner.cancel.child_token();
        let handle = tokio::spawn(poll_loop(self.clone(), cancel));
        self.inner.tasks.lock().await.push(handle);
    }

    /// Cancel all background work. In-flight polls finish or are
    /// abandoned; neither corrupts cached state.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.scheduler.abort_sweeps();
        let mut tasks = self.inner.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        debug!("account shut down");
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Fetch one data class for one device and merge it into the store.
    pub async fn poll_device(&self, uid: &str, class: PollClass) -> Result<(), CoreError> {
        let device = self
            .inner
            .store
            .get(uid)
            .ok_or_else(|| CoreError::DeviceNotFound {
                uid: uid.to_owned(),
            })?;
        debug!(uid, kind = %device.kind, %class, "polling");

        match (device.kind, class) {
            (DeviceKind::Charger, PollClass::State) => self.poll_charger_state(uid).await?,
            (DeviceKind::Charger, PollClass::Info | PollClass::Firmware) => {
                self.poll_charger_info(uid).await?;
            }
            (DeviceKind::Installation, PollClass::State | PollClass::Info) => {
                self.poll_installation_info(uid).await?;
            }
            (DeviceKind::Installation, PollClass::Firmware) => {
                self.poll_firmware_info(uid).await?;
            }
        }

        self.inner.store.record_poll(uid, class);
        Ok(())
    }

    async fn poll_charger_state(&self, uid: &str) -> Result<(), CoreError> {
        let entries = match self.inner.client.charger_state(uid).await {
            Ok(entries) => entries,
            Err(ApiError::RequestFailed { status: 403, .. }) => {
                debug!(uid, "access denied to charger state");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let catalog = self.catalog();
        let observations: Vec<(String, Value)> = entries
            .iter()
            .filter(|e| !EXCLUDED_OBSERVATIONS.contains(&e.state_id))
            .filter_map(|e| {
                let payload = e.payload()?;
                let key = catalog.observation_key(e.state_id);
                let value = catalog.convert_attribute(&key, payload);
                Some((key, value))
            })
            .collect();
        self.inner.store.merge(uid, observations)?;
        Ok(())
    }

    async fn poll_charger_info(&self, uid: &str) -> Result<(), CoreError> {
        match self.inner.client.charger(uid).await {
            Ok(charger) => self.merge_object(uid, to_attribute_object(&charger)),
            Err(ApiError::RequestFailed { status: 403, .. }) => {
                // Unprivileged users cannot read the charger object but
                // still see it in the account-wide listing.
                debug!(uid, "access denied to charger info, falling back to listing");
                let listing = self.inner.client.chargers().await?;
                for charger in listing.data {
                    if charger.id == uid {
                        self.merge_object(uid, to_attribute_object(&charger))?;
                        break;
                    }
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn poll_installation_info(&self, uid: &str) -> Result<(), CoreError> {
        let installation = self.inner.client.installation(uid).await?;
        let mut attrs = to_attribute_object(&installation);
        // The support-group logo is a base64 blob far larger than any
        // host state store appreciates.
        if let Some(Value::Object(group)) = attrs.get_mut("SupportGroup") {
            if let Some(logo) = group.get_mut("LogoBase64") {
                let size = logo.as_str().map_or(0, str::len);
                *logo = json!(format!("<removed, was {size} bytes>"));
            }
        }
        self.merge_object(uid, attrs)
    }

    /// Firmware status arrives per installation and fans out to its
    /// chargers' attribute maps.
    async fn poll_firmware_info(&self, uid: &str) -> Result<(), CoreError> {
        let firmware = match self.inner.client.installation_firmware(uid).await {
            Ok(fw) => fw,
            Err(ApiError::RequestFailed { status: 403, .. }) => {
                debug!(uid, "access denied to installation firmware info");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        for fm in firmware {
            let (Some(current), Some(available), Some(up_to_date)) = (
                fm.current_version,
                fm.available_version,
                fm.is_up_to_date,
            ) else {
                // Chargers registered on the platform but never
                // initialized have no firmware info yet.
                warn!(charger = %fm.charger_id, "firmware info incomplete, charger not initialized");
                continue;
            };
            let observations = vec![
                ("firmware_current_version".to_owned(), json!(current)),
                ("firmware_available_version".to_owned(), json!(available)),
                ("firmware_up_to_date".to_owned(), json!(up_to_date)),
            ];
            if self.inner.store.contains(&fm.charger_id) {
                self.inner.store.merge(&fm.charger_id, observations)?;
            }
        }
        Ok(())
    }

    /// Snake-case, type-convert, and merge a raw attribute object.
    fn merge_object(
        &self,
        uid: &str,
        attrs: serde_json::Map<String, Value>,
    ) -> Result<(), CoreError> {
        let catalog = self.catalog();
        let observations: Vec<(String, Value)> = attrs
            .into_iter()
            .map(|(key, value)| {
                let key = to_snake_case(&key);
                let value = catalog.convert_attribute(&key, value);
                (key, value)
            })
            .collect();
        self.inner.store.merge(uid, observations)?;
        Ok(())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Whether `command` is legal for the charger right now. A false
    /// answer means `issue_command` would reject locally, without any
    /// network round trip.
    pub fn can_issue(&self, uid: &str, command: ChargerCommand) -> bool {
        self.command_decision(uid, command)
            .map(|d| d.allowed)
            .unwrap_or(false)
    }

    fn command_decision(
        &self,
        uid: &str,
        command: ChargerCommand,
    ) -> Result<CommandDecision, CoreError> {
        let device = self
            .inner
            .store
            .get(uid)
            .ok_or_else(|| CoreError::DeviceNotFound {
                uid: uid.to_owned(),
            })?;
        if device.kind != DeviceKind::Charger {
            return Err(CoreError::CommandRejected {
                reason: format!("{} is not a charger", device.uid),
            });
        }
        Ok(decide(
            device.operation_mode(),
            command,
            device.requires_authorization(),
        ))
    }

    /// Send a command to a charger, gated by the operation-mode table.
    ///
    /// On success the decision's optimistic mode is applied as pending
    /// state, the required followup (authorize, for a two-step resume)
    /// is sent, and an accelerated confirmation sweep is scheduled.
    pub async fn issue_command(&self, uid: &str, command: ChargerCommand) -> Result<(), CoreError> {
        let decision = self.command_decision(uid, command)?;
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or("command not allowed in the current mode");
            warn!(uid, %command, reason, "command rejected locally");
            return Err(CoreError::CommandRejected {
                reason: reason.to_owned(),
            });
        }

        info!(uid, %command, "sending command");
        self.send_charger_command(uid, command).await?;

        if let Some(mode) = decision.optimistic_mode {
            self.inner.store.apply_optimistic(
                uid,
                "charger_operation_mode",
                json!(mode.to_string()),
            )?;
        }
        if let Some(followup) = decision.followup {
            debug!(uid, %followup, "sending required followup command");
            self.send_charger_command(uid, followup).await?;
        }

        self.trigger_confirmation(uid);
        Ok(())
    }

    async fn send_charger_command(
        &self,
        uid: &str,
        command: ChargerCommand,
    ) -> Result<(), CoreError> {
        if command == ChargerCommand::AuthorizeCharge {
            self.inner.client.authorize_charge(uid).await?;
            return Ok(());
        }

        let code = self
            .catalog()
            .command_code(command)
            .ok_or_else(|| CoreError::UnknownCommand {
                name: command.to_string(),
            })?;
        match self.inner.client.send_command(uid, code).await {
            Ok(()) => Ok(()),
            // The cloud reports 500 for deauthorize-and-stop while still
            // performing the action. Documented vendor asymmetry; do not
            // generalize to other commands.
            Err(ApiError::RequestFailed { status: 500, .. })
                if command == ChargerCommand::DeauthorizeAndStop =>
            {
                warn!(uid, "deauthorize-and-stop reported failure but takes effect, continuing");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Settings ─────────────────────────────────────────────────────

    /// Update charger settings, whitelisted against the vendor's
    /// accepted update parameters.
    pub async fn set_charger_settings(
        &self,
        uid: &str,
        settings: serde_json::Map<String, Value>,
    ) -> Result<(), CoreError> {
        for key in settings.keys() {
            if !UPDATE_PARAMS.contains(&key.as_str()) {
                return Err(CoreError::InvalidSetting {
                    message: format!("unknown charger setting '{key}'"),
                });
            }
        }
        self.inner
            .client
            .update_charger(uid, &Value::Object(settings))
            .await?;
        self.trigger_confirmation(uid);
        Ok(())
    }

    /// Set the installation-wide current limit: either the total or all
    /// three phases, each within `0..=max_current`.
    pub async fn set_available_current(
        &self,
        uid: &str,
        request: AvailableCurrent,
    ) -> Result<(), CoreError> {
        let device = self
            .inner
            .store
            .get(uid)
            .ok_or_else(|| CoreError::DeviceNotFound {
                uid: uid.to_owned(),
            })?;

        let phases = [request.phase1, request.phase2, request.phase3];
        let has_total = request.total.is_some();
        let all_phases = phases.iter().all(Option::is_some);
        let any_phase = phases.iter().any(Option::is_some);
        if has_total == all_phases {
            return Err(CoreError::InvalidSetting {
                message: "either availableCurrent or all of availableCurrentPhase1..3 must be set"
                    .into(),
            });
        }
        if any_phase && !all_phases {
            return Err(CoreError::InvalidSetting {
                message: "if any phase current is set, all three must be set".into(),
            });
        }

        let max_current = device
            .attributes
            .effective("max_current")
            .and_then(Value::as_f64)
            .unwrap_or(32.0);
        let mut body = serde_json::Map::new();
        let named = [
            ("availableCurrent", request.total),
            ("availableCurrentPhase1", request.phase1),
            ("availableCurrentPhase2", request.phase2),
            ("availableCurrentPhase3", request.phase3),
        ];
        for (key, value) in named {
            if let Some(amps) = value {
                if !(0.0..=max_current).contains(&amps) {
                    return Err(CoreError::InvalidSetting {
                        message: format!("{key} must be between 0 and {max_current:.0} amps"),
                    });
                }
                body.insert(key.to_owned(), json!(amps));
            }
        }

        self.inner
            .client
            .update_installation(uid, &Value::Object(body))
            .await?;
        self.trigger_confirmation(uid);
        Ok(())
    }

    /// Set the current threshold for automatic 3-to-1 phase switching.
    pub async fn set_three_to_one_phase_switch_current(
        &self,
        uid: &str,
        amps: f64,
    ) -> Result<(), CoreError> {
        if !(0.0..=32.0).contains(&amps) {
            return Err(CoreError::InvalidSetting {
                message: "current must be between 0 and 32 amps".into(),
            });
        }
        self.inner
            .client
            .update_installation(uid, &json!({ "threeToOnePhaseSwitchCurrent": amps }))
            .await?;
        self.trigger_confirmation(uid);
        Ok(())
    }

    /// Set the permanent cable lock on a charger.
    pub async fn set_permanent_cable_lock(&self, uid: &str, lock: bool) -> Result<(), CoreError> {
        self.inner
            .client
            .update_local_settings(uid, &json!({ "Cable": { "PermanentLock": lock } }))
            .await?;
        self.inner
            .store
            .apply_optimistic(uid, "permanent_cable_lock", json!(lock))?;
        self.trigger_confirmation(uid);
        Ok(())
    }

    /// Set the display brightness on a charger.
    pub async fn set_hmi_brightness(&self, uid: &str, brightness: f64) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&brightness) {
            return Err(CoreError::InvalidSetting {
                message: "brightness must be between 0.0 and 1.0".into(),
            });
        }
        self.inner
            .client
            .update_local_settings(uid, &json!({ "Device": { "HmiBrightness": brightness } }))
            .await?;
        self.trigger_confirmation(uid);
        Ok(())
    }

    // ── Host read path ───────────────────────────────────────────────

    /// Effective value of one attribute (pending over confirmed).
    pub fn get_value(&self, uid: &str, key: &str) -> Option<Value> {
        self.inner.store.get_value(uid, key)
    }

    /// Serializable snapshot of all cached state, for diagnostics
    /// packaging outside the core.
    pub fn diagnostics_snapshot(&self) -> Value {
        self.inner.store.snapshot()
    }

    // ── Confirmation sweeps ──────────────────────────────────────────

    /// Kick off the accelerated post-command poll sequence for a
    /// device, replacing any sweep already running for it. The sweep
    /// goes through the normal poll path -- and thus the rate limiter.
    fn trigger_confirmation(&self, uid: &str) {
        let Some(device) = self.inner.store.get(uid) else {
            return;
        };
        let delays = match device.kind {
            DeviceKind::Charger => self.inner.scheduler.policy().charger_trigger_delays.clone(),
            DeviceKind::Installation => self
                .inner
                .scheduler
                .policy()
                .installation_trigger_delays
                .clone(),
        };
        debug!(uid, ?delays, "scheduling confirmation sweep");

        let account = self.clone();
        let kind = device.kind;
        let task_uid = uid.to_owned();
        let cancel = self.inner.cancel.child_token();
        let task = tokio::spawn(async move {
            let mut elapsed = Duration::ZERO;
            for (i, deadline) in delays.iter().enumerate() {
                let delta = deadline.saturating_sub(elapsed);
                elapsed = *deadline;
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(delta) => {}
                }
                if let Err(e) = account.poll_device(&task_uid, PollClass::State).await {
                    debug!(uid = %task_uid, error = %e, "confirmation poll failed");
                }
                // An installation update affects its chargers too.
                if i == 0 && kind == DeviceKind::Installation {
                    for charger in account.store().chargers_of(&task_uid) {
                        account.trigger_confirmation(&charger.uid);
                    }
                }
            }
        });
        self.inner.scheduler.install_sweep(uid, task);
    }
}

/// The recurring scheduler tick: compute due (device, class) pairs,
/// launch their fetches concurrently (all funneling through the shared
/// rate limiter), then reschedule each by outcome.
async fn poll_loop(account: Account, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let due = account.inner.scheduler.due(Instant::now());
                if due.is_empty() {
                    continue;
                }
                debug!(count = due.len(), "poll tick, launching due fetches");

                let fetches = due.into_iter().map(|(uid, class)| {
                    let account = account.clone();
                    async move {
                        let result = account.poll_device(&uid, class).await;
                        (uid, class, result)
                    }
                });
                let results = futures_util::future::join_all(fetches).await;

                // Cadence is recomputed from the post-fetch snapshot, so a
                // charge session starting shrinks the interval right here.
                let any_charging = account.inner.store.any_charging();
                for (uid, class, result) in results {
                    match result {
                        Ok(()) => {
                            account.inner.scheduler.on_success(&uid, class, any_charging);
                            account.inner.store.set_available(&uid, true);
                        }
                        Err(e) => {
                            warn!(uid, %class, error = %e, "poll failed");
                            let failures =
                                account.inner.scheduler.on_failure(&uid, class, any_charging);
                            if failures >= account.inner.scheduler.policy().max_consecutive_failures {
                                account.inner.store.set_available(&uid, false);
                            }
                        }
                    }
                }
            }
        }
    }
}
