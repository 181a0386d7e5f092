use super::core::{TransactionOptions, TransactionOutcome, TransactionState, Vote};
use super::record::{OutcomeRecord, ParticipantRecord, TokenPayload, TransactionRecord};
use super::signal::{completion_channel, CompletionSignal};
use super::transaction::{Origin, Transaction};
use super::transaction_coordinator::CoordinatorProvider;
use crate::channel::PropagationToken;
use crate::common::{
    async_task, bounded_sleep, read_if_exists, remove_if_exists, write_exclusive,
    write_replacing, DEFAULT_RESOLUTION_POLL, OUTCOME_RECORD_FILE, PARTICIPANTS_DIR,
    SEALED_MARKER_FILE, TRANSACTION_RECORD_FILE,
};
use crate::errors::{ErrorKind, HandoffError, HandoffResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Coordinator that agrees on outcomes through a directory shared by the participants.
///
/// The directory is the coordinator's address; it travels inside every exported token so
/// the importing process finds the same transaction. Each transaction gets its own
/// sub-directory:
///
/// ```text
/// <address>/<id>/transaction.json          root's record (isolation, deadline)
/// <address>/<id>/participants/<pid>.json   one record per participant, holding its vote
/// <address>/<id>/sealed                    root stopped accepting participants
/// <address>/<id>/outcome.json              the decision, created exactly once
/// ```
///
/// # Resolution
/// - The root aborts a scope disposed without being marked complete.
/// - Otherwise it seals enlistment and waits, until the transaction deadline, for every
///   registered participant to vote. All prepared before the deadline commits; anything
///   else aborts.
/// - The outcome file is created with first-writer-wins semantics, so a participant that
///   presumes abort after the deadline and a late root can never disagree.
#[derive(Debug, Clone)]
pub struct FileCoordinator {
    address: PathBuf,
    resolution_poll: Duration,
}

impl FileCoordinator {
    pub fn new(address: impl Into<PathBuf>) -> Self {
        FileCoordinator {
            address: address.into(),
            resolution_poll: DEFAULT_RESOLUTION_POLL,
        }
    }

    /// Sets how often votes and outcomes are re-read while waiting.
    pub fn with_resolution_poll(mut self, resolution_poll: Duration) -> Self {
        self.resolution_poll = resolution_poll;
        self
    }

    pub fn address(&self) -> &Path {
        &self.address
    }

    /// Reads the published outcome of transaction `id`, if decided.
    pub fn outcome_of(&self, id: Uuid) -> HandoffResult<Option<TransactionOutcome>> {
        let dir = Self::transaction_dir(&self.address, id);
        Ok(Self::read_outcome(&dir)?.map(|record| record.outcome))
    }

    /// Lists the participants registered on transaction `id`.
    pub fn participants_of(&self, id: Uuid) -> HandoffResult<Vec<ParticipantRecord>> {
        Self::read_participants(&Self::transaction_dir(&self.address, id))
    }

    fn transaction_dir(address: &Path, id: Uuid) -> PathBuf {
        address.join(id.to_string())
    }

    fn participant_path(dir: &Path, participant: Uuid) -> PathBuf {
        dir.join(PARTICIPANTS_DIR).join(format!("{}.json", participant))
    }

    fn dir_of(transaction: &Transaction) -> PathBuf {
        Self::transaction_dir(transaction.address(), transaction.id())
    }

    fn read_json<T: DeserializeOwned>(path: &Path) -> HandoffResult<Option<T>> {
        match read_if_exists(path)? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> HandoffResult<()> {
        write_replacing(path, &serde_json::to_vec_pretty(value)?)
    }

    fn read_outcome(dir: &Path) -> HandoffResult<Option<OutcomeRecord>> {
        Self::read_json(&dir.join(OUTCOME_RECORD_FILE))
    }

    fn is_sealed(dir: &Path) -> HandoffResult<bool> {
        Ok(dir.join(SEALED_MARKER_FILE).try_exists()?)
    }

    fn read_participants(dir: &Path) -> HandoffResult<Vec<ParticipantRecord>> {
        let entries = match fs::read_dir(dir.join(PARTICIPANTS_DIR)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut participants = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && !path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            if !is_record {
                continue;
            }
            // a participant may withdraw between listing and reading
            if let Some(record) = Self::read_json::<ParticipantRecord>(&path)? {
                participants.push(record);
            }
        }
        Ok(participants)
    }

    fn publish_outcome(
        dir: &Path,
        id: Uuid,
        decision: TransactionOutcome,
        decided_by: &str,
        reason: &str,
    ) -> HandoffResult<TransactionOutcome> {
        let record = OutcomeRecord {
            outcome: decision,
            decided_by: decided_by.to_string(),
            decided_at: Utc::now(),
            reason: reason.to_string(),
        };
        let bytes = serde_json::to_vec_pretty(&record)?;
        if write_exclusive(&dir.join(OUTCOME_RECORD_FILE), &bytes)? {
            log::info!(
                "Transaction {} resolved as {} by {}: {}",
                id,
                decision,
                decided_by,
                reason
            );
            return Ok(decision);
        }

        match Self::read_outcome(dir)? {
            Some(existing) => {
                if existing.outcome != decision {
                    log::warn!(
                        "Transaction {} was already resolved as {} by {}; {} wanted {}",
                        id,
                        existing.outcome,
                        existing.decided_by,
                        decided_by,
                        decision
                    );
                }
                Ok(existing.outcome)
            }
            None => Err(HandoffError::new(
                &format!("Outcome of transaction {} disappeared", id),
                ErrorKind::CoordinatorError,
            )),
        }
    }

    fn collect_votes(
        &self,
        dir: &Path,
        deadline: DateTime<Utc>,
    ) -> HandoffResult<(TransactionOutcome, String)> {
        loop {
            let participants = Self::read_participants(dir)?;
            if let Some(aborting) = participants.iter().find(|p| p.vote == Vote::Aborted) {
                return Ok((
                    TransactionOutcome::Aborted,
                    format!("participant {} voted to abort", aborting.id),
                ));
            }

            let pending = participants
                .iter()
                .filter(|p| p.vote == Vote::Pending)
                .count();
            let now = Utc::now();
            if now > deadline {
                let reason = if pending > 0 {
                    format!("{} participant(s) did not vote before the deadline", pending)
                } else {
                    "transaction timed out".to_string()
                };
                return Ok((TransactionOutcome::Aborted, reason));
            }
            if pending == 0 {
                return Ok((
                    TransactionOutcome::Committed,
                    format!("{} participant(s) prepared", participants.len()),
                ));
            }

            log::debug!("Waiting for {} participant vote(s)", pending);
            bounded_sleep(self.resolution_poll, remaining_until(deadline, now));
        }
    }

    fn dispose_root(&self, transaction: &Transaction) -> HandoffResult<TransactionOutcome> {
        let dir = Self::dir_of(transaction);
        if let Some(existing) = Self::read_outcome(&dir)? {
            return Ok(existing.outcome);
        }

        let (decision, reason) = if !transaction.is_completed() {
            (
                TransactionOutcome::Aborted,
                "scope disposed without being marked complete".to_string(),
            )
        } else {
            write_exclusive(&dir.join(SEALED_MARKER_FILE), b"")?;
            self.collect_votes(&dir, transaction.deadline())?
        };
        Self::publish_outcome(&dir, transaction.id(), decision, "root", &reason)
    }

    fn dispose_participant(&self, transaction: &Transaction, participant: Uuid) -> HandoffResult<()> {
        let dir = Self::dir_of(transaction);
        let path = Self::participant_path(&dir, participant);
        let now = Utc::now();

        let vote = if !transaction.is_completed() {
            Vote::Aborted
        } else if transaction.is_expired(now) {
            log::warn!(
                "Participant {} exceeded its scope timeout on transaction {}",
                participant,
                transaction.id()
            );
            Vote::Aborted
        } else {
            Vote::Prepared
        };

        let mut record: ParticipantRecord = Self::read_json(&path)?.ok_or_else(|| {
            HandoffError::new(
                &format!(
                    "Participant {} is not registered on transaction {}",
                    participant,
                    transaction.id()
                ),
                ErrorKind::CoordinatorError,
            )
        })?;
        record.vote = vote;
        record.voted_at = Some(now);
        Self::write_json(&path, &record)?;
        transaction.set_state(TransactionState::Prepared);

        log::info!(
            "Participant {} voted {:?} on transaction {}",
            participant,
            vote,
            transaction.id()
        );
        Ok(())
    }
}

impl CoordinatorProvider for FileCoordinator {
    fn begin_scope(&self, options: &TransactionOptions) -> HandoffResult<Transaction> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let deadline = deadline_after(now, options.timeout)?;
        let dir = Self::transaction_dir(&self.address, id);

        let record = TransactionRecord {
            id,
            isolation_level: options.isolation_level,
            timeout_millis: options.timeout.as_millis() as u64,
            created_at: now,
            deadline,
            root_pid: std::process::id(),
        };
        fs::create_dir_all(dir.join(PARTICIPANTS_DIR))
            .map_err(HandoffError::from)
            .and_then(|_| Self::write_json(&dir.join(TRANSACTION_RECORD_FILE), &record))
            .map_err(|e| {
                HandoffError::new_with_cause(
                    &format!("Failed to record transaction {} at {}", id, dir.display()),
                    ErrorKind::CoordinatorError,
                    e,
                )
            })?;

        log::info!(
            "Started transaction {} ({}, timeout {:?})",
            id,
            options.isolation_level,
            options.timeout
        );
        Ok(Transaction::new(
            id,
            Origin::Root,
            self.address.clone(),
            options.isolation_level,
            options.timeout,
            deadline,
        ))
    }

    fn export_token(&self, transaction: &Transaction) -> HandoffResult<PropagationToken> {
        if transaction.state() != TransactionState::Active {
            return Err(HandoffError::new(
                &format!(
                    "Cannot export transaction {} in state {:?}",
                    transaction.id(),
                    transaction.state()
                ),
                ErrorKind::InvalidOperation,
            ));
        }
        let payload = TokenPayload::new(
            transaction.id(),
            transaction.address().to_string_lossy().into_owned(),
            transaction.isolation_level(),
            transaction.deadline(),
        );
        Ok(PropagationToken::from_bytes(payload.encode()?))
    }

    fn import_token(
        &self,
        token: &PropagationToken,
        timeout: Duration,
    ) -> HandoffResult<Transaction> {
        let payload = TokenPayload::decode(token.as_bytes())
            .map_err(|e| resume_error("Propagation token is malformed", e.into()))?;
        let id = payload.transaction_id();
        let address = PathBuf::from(&payload.address);
        let dir = Self::transaction_dir(&address, id);

        let record: TransactionRecord = Self::read_json(&dir.join(TRANSACTION_RECORD_FILE))
            .and_then(|record| {
                record.ok_or_else(|| {
                    HandoffError::new("transaction record not found", ErrorKind::FileNotFound)
                })
            })
            .map_err(|e| {
                resume_error(
                    &format!(
                        "Transaction {} is unknown to coordinator {}",
                        id,
                        address.display()
                    ),
                    e,
                )
            })?;

        if payload.isolation_level != record.isolation_level
            || payload.deadline() != Some(truncate_millis(record.deadline))
        {
            return Err(HandoffError::new(
                &format!("Propagation token does not match the record of transaction {}", id),
                ErrorKind::TransactionResumeError,
            ));
        }
        if let Some(outcome) = Self::read_outcome(&dir)? {
            return Err(HandoffError::new(
                &format!("Transaction {} is already resolved as {}", id, outcome.outcome),
                ErrorKind::TransactionResumeError,
            ));
        }
        let now = Utc::now();
        if now > record.deadline {
            return Err(HandoffError::new(
                &format!("Transaction {} timed out at {}", id, record.deadline),
                ErrorKind::TransactionResumeError,
            ));
        }
        if Self::is_sealed(&dir)? {
            return Err(HandoffError::new(
                &format!("Transaction {} no longer accepts participants", id),
                ErrorKind::TransactionResumeError,
            ));
        }

        let participant = Uuid::new_v4();
        let path = Self::participant_path(&dir, participant);
        let registration = ParticipantRecord {
            id: participant,
            pid: std::process::id(),
            joined_at: now,
            vote: Vote::Pending,
            voted_at: None,
        };
        Self::write_json(&path, &registration)
            .map_err(|e| resume_error(&format!("Failed to join transaction {}", id), e))?;

        // the root may have sealed or resolved while we registered
        if Self::is_sealed(&dir)? || Self::read_outcome(&dir)?.is_some() {
            remove_if_exists(&path)?;
            return Err(HandoffError::new(
                &format!("Transaction {} closed enlistment while joining", id),
                ErrorKind::TransactionResumeError,
            ));
        }

        let deadline = deadline_after(now, timeout)?.min(record.deadline);
        log::info!(
            "Joined transaction {} as participant {} ({})",
            id,
            participant,
            record.isolation_level
        );
        Ok(Transaction::new(
            id,
            Origin::Participant(participant),
            address,
            record.isolation_level,
            timeout,
            deadline,
        ))
    }

    fn mark_complete(&self, transaction: &Transaction) -> HandoffResult<()> {
        transaction.set_completed()?;
        log::info!("Transaction {} marked as complete", transaction.id());
        Ok(())
    }

    fn dispose_scope(&self, transaction: &Transaction) -> HandoffResult<Option<TransactionOutcome>> {
        match transaction.state() {
            TransactionState::Committed => return Ok(Some(TransactionOutcome::Committed)),
            TransactionState::Aborted => return Ok(Some(TransactionOutcome::Aborted)),
            TransactionState::Prepared => return Ok(None),
            TransactionState::Active => {}
        }

        match transaction.origin() {
            Origin::Root => self.dispose_root(transaction).map(Some),
            Origin::Participant(participant) => {
                self.dispose_participant(transaction, participant)?;
                Ok(None)
            }
        }
    }

    fn on_completed(&self, transaction: &Transaction) -> HandoffResult<CompletionSignal> {
        let (sender, signal) = completion_channel();
        let dir = Self::dir_of(transaction);
        let id = transaction.id();
        let poll = self.resolution_poll;

        async_task(&format!("handoff-watch-{}", id), move || loop {
            if sender.is_cancelled() {
                log::debug!("Stopped watching transaction {}", id);
                break;
            }
            match FileCoordinator::read_outcome(&dir) {
                Ok(Some(record)) => {
                    log::info!("Observed outcome {} of transaction {}", record.outcome, id);
                    sender.notify(record.outcome);
                    break;
                }
                Ok(None) => {}
                Err(e) => log::warn!("Failed to read outcome of transaction {}: {}", id, e),
            }
            std::thread::sleep(poll);
        });
        Ok(signal)
    }

    fn resolve_in_doubt(&self, transaction: &Transaction) -> HandoffResult<TransactionOutcome> {
        let decided_by = match transaction.origin() {
            Origin::Root => "root".to_string(),
            Origin::Participant(participant) => format!("participant {}", participant),
        };
        Self::publish_outcome(
            &Self::dir_of(transaction),
            transaction.id(),
            TransactionOutcome::Aborted,
            &decided_by,
            "no outcome before the deadline, presumed abort",
        )
    }
}

fn deadline_after(now: DateTime<Utc>, timeout: Duration) -> HandoffResult<DateTime<Utc>> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| now.checked_add_signed(timeout))
        .ok_or_else(|| {
            HandoffError::new(
                &format!("Transaction timeout {:?} is out of range", timeout),
                ErrorKind::InvalidConfiguration,
            )
        })
}

/// Token payloads carry the deadline to the millisecond.
fn truncate_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(instant.timestamp_millis()).unwrap_or(instant)
}

fn remaining_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (deadline - now).to_std().unwrap_or(Duration::ZERO)
}

fn resume_error(message: &str, cause: HandoffError) -> HandoffError {
    HandoffError::new_with_cause(message, ErrorKind::TransactionResumeError, cause)
}
