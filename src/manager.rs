//! Session registry and per-session polling loops.
//!
//! Every submitted scan gets its own spawned task driven by an interval timer and a
//! `CancellationToken`. Session state lives in a `watch` channel: the loop and `stop`
//! mutate it through `send_if_modified`, readers borrow snapshots, and waiters
//! subscribe until the status becomes terminal.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ScanApi;
use crate::config::PollPolicy;
use crate::error::{ApiError, ConfigError, ManagerError, PollStage, SubmitError};
use crate::render::{self, RenderStyle};
use crate::session::{ScanSession, StatusStep};
use crate::sink::{StatusSink, StatusUpdate};
use crate::types::{
    ConnectionReply, HealthReply, ScanStatus, StartScanRequest, TaskId, ERROR_STATUS,
};

/// Correlates UI entries with a tracked session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    task_id: TaskId,
}

impl SessionHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }
}

struct SessionSlot {
    state: watch::Sender<ScanSession>,
    cancel: CancellationToken,
}

/// Owns all scan sessions of one client.
#[derive(Clone)]
pub struct ScanManager {
    api: Arc<dyn ScanApi>,
    sink: Arc<dyn StatusSink>,
    policy: PollPolicy,
    style: RenderStyle,
    sessions: Arc<RwLock<HashMap<TaskId, Arc<SessionSlot>>>>,
}

impl ScanManager {
    /// Fails when `policy` has a zero interval or zero attempts.
    pub fn new(
        api: Arc<dyn ScanApi>,
        sink: Arc<dyn StatusSink>,
        policy: PollPolicy,
    ) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            api,
            sink,
            policy,
            style: RenderStyle::default(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn with_style(mut self, style: RenderStyle) -> Self {
        self.style = style;
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Start a scan and begin polling it.
    pub async fn submit(
        &self,
        target: &str,
        scan_type: Option<&str>,
    ) -> Result<SessionHandle, SubmitError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(SubmitError::EmptyTarget);
        }
        let request = StartScanRequest {
            target: target.to_string(),
            scan_type: scan_type.map(str::to_string),
        };

        let reply = match self.api.start_scan(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(host = target, error = %e, "scan submission failed");
                return Err(e.into());
            }
        };
        if reply.status == ERROR_STATUS {
            let message = reply
                .message
                .unwrap_or_else(|| "scan service rejected the request".to_string());
            warn!(host = target, %message, "scan rejected by service");
            return Err(SubmitError::Rejected(message));
        }
        let task_id = reply.task_id.ok_or(SubmitError::MissingTaskId)?;

        let session = ScanSession::new(
            target,
            request.scan_type,
            task_id.clone(),
            reply.status,
            self.policy.max_attempts,
        );
        let slot = {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&task_id) {
                return Err(SubmitError::DuplicateTaskId(task_id));
            }
            let (state, _) = watch::channel(session);
            let slot = Arc::new(SessionSlot {
                state,
                cancel: CancellationToken::new(),
            });
            sessions.insert(task_id.clone(), slot.clone());
            slot
        };

        info!(%task_id, host = target, "scan submitted");
        let submitted = slot.state.borrow().clone();
        self.publish(&submitted);

        let manager = self.clone();
        tokio::spawn(async move { manager.poll_loop(slot).await });

        Ok(SessionHandle { task_id })
    }

    /// Stop a session on user request.
    ///
    /// Polling halts before the stop request is sent. Calling this on a session
    /// that already ended returns its snapshot unchanged.
    pub async fn stop(&self, handle: &SessionHandle) -> Result<ScanSession, ManagerError> {
        let slot = self.slot(handle).await?;
        slot.cancel.cancel();
        if !slot.state.send_if_modified(ScanSession::mark_stopped) {
            debug!(task_id = %handle.task_id, "stop ignored, session already ended");
            return Ok(slot.state.borrow().clone());
        }
        info!(task_id = %handle.task_id, "stopping scan");

        let outcome = self.api.stop_scan(&handle.task_id).await;
        let message = match &outcome {
            Ok(reply) if reply.message.is_empty() => "Scan stopped.".to_string(),
            Ok(reply) => reply.message.clone(),
            Err(e) => format!("error stopping scan: {e}"),
        };
        slot.state.send_modify(|s| s.record_stop_reply(message));
        let snapshot = slot.state.borrow().clone();
        self.publish(&snapshot);

        match outcome {
            Ok(_) => Ok(snapshot),
            Err(source) => {
                warn!(task_id = %handle.task_id, error = %source, "stop request failed");
                Err(ManagerError::Stop {
                    task_id: handle.task_id.clone(),
                    source,
                })
            }
        }
    }

    /// Stop every session that is still live.
    pub async fn stop_all(&self) -> Vec<Result<ScanSession, ManagerError>> {
        let live: Vec<TaskId> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, slot)| !slot.state.borrow().is_terminal())
                .map(|(id, _)| id.clone())
                .collect()
        };
        let mut out = Vec::with_capacity(live.len());
        for task_id in live {
            out.push(self.stop(&SessionHandle { task_id }).await);
        }
        out
    }

    pub async fn snapshot(&self, handle: &SessionHandle) -> Result<ScanSession, ManagerError> {
        Ok(self.slot(handle).await?.state.borrow().clone())
    }

    /// Snapshots of all tracked sessions, ordered by task id.
    pub async fn sessions(&self) -> Vec<ScanSession> {
        let sessions = self.sessions.read().await;
        let mut out: Vec<ScanSession> =
            sessions.values().map(|slot| slot.state.borrow().clone()).collect();
        out.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        out
    }

    /// Resolve once the session reaches a terminal status.
    pub async fn wait(&self, handle: &SessionHandle) -> Result<ScanSession, ManagerError> {
        let slot = self.slot(handle).await?;
        let mut rx = slot.state.subscribe();
        let finished = match rx.wait_for(ScanSession::is_terminal).await {
            Ok(session) => session.clone(),
            // The sender lives in the slot we hold, so this only happens on shutdown.
            Err(_) => slot.state.borrow().clone(),
        };
        Ok(finished)
    }

    /// Drop terminal sessions from the registry. Returns how many were removed.
    pub async fn prune_finished(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| !slot.state.borrow().is_terminal());
        before - sessions.len()
    }

    pub async fn test_connection(&self) -> Result<(ConnectionReply, String), ApiError> {
        let reply = self.api.test_connection().await?;
        let text = render::render_connection(&reply);
        Ok((reply, text))
    }

    pub async fn health(&self) -> Result<(HealthReply, String), ApiError> {
        let reply = self.api.health().await?;
        let text = render::render_health(&reply);
        Ok((reply, text))
    }

    async fn slot(&self, handle: &SessionHandle) -> Result<Arc<SessionSlot>, ManagerError> {
        self.sessions
            .read()
            .await
            .get(&handle.task_id)
            .cloned()
            .ok_or_else(|| ManagerError::UnknownSession(handle.task_id.clone()))
    }

    async fn poll_loop(self, slot: Arc<SessionSlot>) {
        let task_id = slot.state.borrow().task_id.clone();
        let cadence = self.policy.interval;
        let mut ticker = time::interval_at(Instant::now() + cadence, cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = slot.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if slot.cancel.is_cancelled() || !self.tick(&slot, &task_id).await {
                break;
            }
        }
        slot.cancel.cancel();

        let final_state = slot.state.borrow().clone();
        info!(
            %task_id,
            status = %final_state.status,
            attempts = final_state.attempts,
            "polling finished"
        );
    }

    /// Run one poll tick. Returns whether polling should continue.
    async fn tick(&self, slot: &SessionSlot, task_id: &TaskId) -> bool {
        let mut attempt = None;
        slot.state.send_if_modified(|s| {
            attempt = s.begin_tick();
            attempt.is_some()
        });
        let Some(attempt) = attempt else {
            return false;
        };
        debug!(%task_id, attempt, "polling scan status");

        let Some(status) = cancellable(&slot.cancel, self.api.get_status(task_id)).await else {
            return false;
        };
        let step = match status {
            Ok(reply) => self.transition(slot, |s| s.apply_status(&reply)),
            Err(e) => {
                warn!(%task_id, attempt, error = %e, "status poll failed");
                self.transition(slot, |s| {
                    s.fail_transport(PollStage::Status, e.to_string());
                    StatusStep::Finished
                })
            }
        };
        match step {
            Some(StatusStep::Continue) => return true,
            Some(StatusStep::FetchResults) => {}
            Some(StatusStep::Finished) | None => return false,
        }

        debug!(%task_id, "scan done, fetching results");
        let Some(results) = cancellable(&slot.cancel, self.api.get_results(task_id)).await else {
            return false;
        };
        match results {
            Ok(reply) => {
                self.transition(slot, |s| s.apply_results(reply));
            }
            Err(e) => {
                warn!(%task_id, error = %e, "results fetch failed");
                self.transition(slot, |s| s.fail_transport(PollStage::Results, e.to_string()));
            }
        }
        false
    }

    /// Apply `f` unless the session already ended, then publish the new state.
    /// Returns `None` when the session was terminal and nothing changed.
    fn transition<R>(&self, slot: &SessionSlot, f: impl FnOnce(&mut ScanSession) -> R) -> Option<R> {
        let mut out = None;
        slot.state.send_if_modified(|s| {
            if s.is_terminal() {
                return false;
            }
            out = Some(f(s));
            true
        });
        if out.is_some() {
            let snapshot = slot.state.borrow().clone();
            if snapshot.is_terminal() {
                info!(task_id = %snapshot.task_id, status = %snapshot.status, "scan finished");
            }
            self.publish(&snapshot);
        }
        out
    }

    fn publish(&self, session: &ScanSession) {
        let vulnerabilities = match session.status {
            ScanStatus::Done => session.vulnerabilities.clone(),
            _ => None,
        };
        self.sink.update(StatusUpdate {
            task_id: session.task_id.clone(),
            target: session.target.clone(),
            status: session.status,
            text: render::render_session(session, self.style),
            vulnerabilities,
        });
    }
}

/// Race `fut` against cancellation; `None` if the token fired first.
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}
