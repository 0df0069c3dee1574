//! Scan loop.
//!
//! The scanner owns all mutable state: the pause flag, the widget corner, the
//! session's dedup store and the set of fingerprints with a send in flight.
//! Ticks, dispatch completions and control commands are all handled from one
//! task, so none of them ever run at the same time. A completion can still
//! land between two ticks, which is why a send in flight is tracked
//! separately from a send that finished.

use crate::config::Config;
use crate::dedup::DedupStore;
use crate::dispatcher::{
    DispatchCompletion, DispatchFailure, DispatchOutcome, SyncDispatcher, Transport,
};
use crate::extractor::{extract_blocks, BlockRecord};
use crate::filter::{text_len, ValidityFilter};
use crate::fingerprint::Fingerprint;
use crate::source::TextSource;
use crate::status::{Corner, Status, StatusSink};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Mutable state of one scanner
pub struct ScannerState {
    pub paused: bool,
    pub corner: Corner,
    pub store: DedupStore,
    in_flight: HashSet<Fingerprint>,
    /// Suspicious blocks already warned about, limited to those on the last snapshot
    warned: HashSet<Fingerprint>,
}

impl ScannerState {
    pub fn new(store: DedupStore, paused: bool, corner: Corner) -> Self {
        Self {
            paused,
            corner,
            store,
            in_flight: HashSet::new(),
            warned: HashSet::new(),
        }
    }

    /// Number of sends started but not yet resolved
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Tunables for a scanner
#[derive(Debug, Clone)]
pub struct ScannerOptions {
    pub interval: Duration,
    pub synced_revert: Duration,
    pub track_in_flight: bool,
    pub filter: ValidityFilter,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ScannerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.scan.interval(),
            synced_revert: config.status.synced_revert(),
            track_in_flight: config.dispatch.track_in_flight,
            filter: ValidityFilter::new(config.scan.max_single_line_chars),
        }
    }
}

/// Control input from the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerCommand {
    Toggle,
    Pause,
    Resume,
    MoveCorner,
    ScanNow,
    Shutdown,
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub candidates: usize,
    pub dispatched: usize,
    pub suspicious: usize,
    pub already_sent: usize,
    pub in_flight: usize,
}

enum CandidateAction {
    Dispatched,
    Suspicious,
    AlreadySent,
    InFlight,
}

/// Periodic scanner over one text source
pub struct Scanner {
    state: ScannerState,
    source: Box<dyn TextSource>,
    dispatcher: SyncDispatcher,
    completions: mpsc::UnboundedReceiver<DispatchCompletion>,
    sink: Box<dyn StatusSink>,
    options: ScannerOptions,
    status: Option<Status>,
    revert_at: Option<Instant>,
}

impl Scanner {
    pub fn new(
        state: ScannerState,
        source: Box<dyn TextSource>,
        transport: Arc<dyn Transport>,
        sink: Box<dyn StatusSink>,
        options: ScannerOptions,
    ) -> Self {
        let (dispatcher, completions) = SyncDispatcher::new(transport);
        Self {
            state,
            source,
            dispatcher,
            completions,
            sink,
            options,
            status: None,
            revert_at: None,
        }
    }

    pub fn state(&self) -> &ScannerState {
        &self.state
    }

    /// Last status shown, if any
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    /// Scan the current snapshot once and dispatch every new block.
    ///
    /// Does nothing while paused. A source error skips this tick only.
    pub async fn tick(&mut self) -> ScanReport {
        let mut report = ScanReport::default();
        if self.state.paused {
            return report;
        }

        let text = match self.source.snapshot().await {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to read {}: {}", self.source.describe(), e);
                return report;
            }
        };

        let mut suspicious = HashSet::new();
        for block in extract_blocks(&text) {
            report.candidates += 1;
            match self.process_candidate(&block) {
                CandidateAction::Dispatched => report.dispatched += 1,
                CandidateAction::Suspicious => {
                    report.suspicious += 1;
                    suspicious.insert(block.fingerprint());
                }
                CandidateAction::AlreadySent => report.already_sent += 1,
                CandidateAction::InFlight => report.in_flight += 1,
            }
        }

        self.state.warned.retain(|fp| suspicious.contains(fp));

        if report.dispatched > 0 {
            debug!("Tick: {:?}", report);
        } else {
            trace!("Tick: {:?}", report);
        }
        report
    }

    fn process_candidate(&mut self, block: &BlockRecord) -> CandidateAction {
        let fp = block.fingerprint();

        if self.options.filter.is_suspicious(block) {
            if self.state.warned.insert(fp) {
                warn!(
                    "Skipping suspicious flattened block for {} ({} chars on one line)",
                    block.file_path,
                    text_len(&block.search_content)
                );
            } else {
                debug!("Still skipping flattened block for {}", block.file_path);
            }
            return CandidateAction::Suspicious;
        }

        if self.state.store.has(fp) {
            return CandidateAction::AlreadySent;
        }

        if self.options.track_in_flight && self.state.in_flight.contains(&fp) {
            trace!("Send for {} ({}) still in flight", block.file_path, fp);
            return CandidateAction::InFlight;
        }

        info!("Sending {} ({})", block.file_path, fp);
        self.set_status(Status::Sending);
        self.state.in_flight.insert(fp);
        self.dispatcher.dispatch(block, fp);
        CandidateAction::Dispatched
    }

    /// Apply the outcome of a finished dispatch.
    ///
    /// This is the only place the dedup store is written, and it is written
    /// even while paused; only the status update is suppressed.
    pub fn handle_completion(&mut self, completion: DispatchCompletion) {
        self.state.in_flight.remove(&completion.fingerprint);

        match completion.outcome {
            DispatchOutcome::Success => {
                if let Err(e) = self.state.store.record(completion.fingerprint) {
                    error!(
                        "Delivered {} but failed to persist it, it will be sent again after a restart: {}",
                        completion.file_path, e
                    );
                }
                info!("Synced {} ({})", completion.file_path, completion.fingerprint);
                self.set_status(Status::Synced);
                if self.status == Some(Status::Synced) {
                    self.revert_at = Some(Instant::now() + self.options.synced_revert);
                }
            }
            DispatchOutcome::Failure(DispatchFailure::Backend(status)) => {
                debug!("{} not recorded, backend returned {}", completion.file_path, status);
                self.set_status(Status::ErrBackend);
            }
            DispatchOutcome::Failure(DispatchFailure::Connect(reason)) => {
                debug!("{} not recorded, {}", completion.file_path, reason);
                self.set_status(Status::ErrConnect);
            }
        }
    }

    /// Wait for the next dispatch to finish and apply it
    pub async fn await_completion(&mut self) -> Option<DispatchCompletion> {
        let completion = self.completions.recv().await?;
        self.handle_completion(completion.clone());
        Some(completion)
    }

    /// Pause or resume. Resuming shows "Idle" and scans right away.
    pub async fn set_paused(&mut self, paused: bool) {
        if self.state.paused == paused {
            return;
        }

        self.state.paused = paused;
        if paused {
            info!("Scanner paused");
            self.revert_at = None;
            self.show(Status::Paused);
        } else {
            info!("Scanner resumed");
            self.set_status(Status::Idle);
            self.tick().await;
        }
    }

    pub async fn toggle(&mut self) {
        self.set_paused(!self.state.paused).await;
    }

    /// Move the widget to the next corner
    pub fn move_corner(&mut self) -> Corner {
        self.state.corner = self.state.corner.next();
        info!("Status widget moved to {:?}", self.state.corner);
        self.state.corner
    }

    pub async fn handle_command(&mut self, command: ScannerCommand) {
        match command {
            ScannerCommand::Toggle => self.toggle().await,
            ScannerCommand::Pause => self.set_paused(true).await,
            ScannerCommand::Resume => self.set_paused(false).await,
            ScannerCommand::MoveCorner => {
                self.move_corner();
            }
            ScannerCommand::ScanNow => {
                self.tick().await;
            }
            ScannerCommand::Shutdown => {}
        }
    }

    /// Run until `Shutdown` arrives or the command channel closes, then hand
    /// back the state so the caller can end the session if it wants to.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ScannerCommand>) -> ScannerState {
        info!(
            "Scanning {} every {:?} ({})",
            self.source.describe(),
            self.options.interval,
            if self.state.paused { "paused" } else { "active" }
        );
        self.show(if self.state.paused {
            Status::Paused
        } else {
            Status::Idle
        });

        let mut interval = tokio::time::interval(self.options.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let revert_at = self.revert_at;
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                Some(completion) = self.completions.recv() => {
                    self.handle_completion(completion);
                }
                _ = sleep_until(revert_at) => {
                    self.revert_to_idle();
                }
                command = commands.recv() => match command {
                    Some(ScannerCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
            }
        }

        if self.state.in_flight() > 0 {
            info!(
                "Stopping with {} send(s) in flight; their outcomes are dropped",
                self.state.in_flight()
            );
        }
        self.state
    }

    fn revert_to_idle(&mut self) {
        self.revert_at = None;
        // An error or a newer send since the success takes precedence.
        if self.status == Some(Status::Synced) {
            self.set_status(Status::Idle);
        }
    }

    /// Status write, dropped while paused
    fn set_status(&mut self, status: Status) {
        if self.state.paused {
            return;
        }
        self.show(status);
    }

    fn show(&mut self, status: Status) {
        self.status = Some(status);
        self.sink.report(status, status.default_hint());
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
