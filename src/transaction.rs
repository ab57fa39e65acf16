//! Transaction coordinator.
//!
//! Changes to outputs and views become visible all at once. Starting a transaction captures the
//! pending state of every active output; the transaction commits once all of them settled, or
//! when the timeout expires, whichever comes first. At most one transaction is in flight; changes
//! requested in the meantime start the next one as soon as it commits.

use std::time::Duration;

use crate::output::{OutputId, TransactionParticipant, TxContext};

#[derive(Debug)]
pub struct Transactions {
    timeout: Duration,
    /// Whether some pending state changed since the last capture.
    requested: bool,
    inflight: Option<Inflight>,
}

#[derive(Debug)]
struct Inflight {
    participants: Vec<OutputId>,
    deadline: Duration,
}

impl Transactions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            requested: false,
            inflight: None,
        }
    }

    /// Notes that pending state changed and a transaction is needed.
    pub fn request(&mut self) {
        self.requested = true;
    }

    pub fn is_requested(&self) -> bool {
        self.requested
    }

    pub fn is_inflight(&self) -> bool {
        self.inflight.is_some()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.inflight.as_ref().map(|inflight| inflight.deadline)
    }

    pub fn participants(&self) -> &[OutputId] {
        match &self.inflight {
            Some(inflight) => &inflight.participants,
            None => &[],
        }
    }

    /// Starts a transaction if one was requested and none is in flight.
    ///
    /// Returns whether a transaction was started. It may have committed right away if every
    /// participant settled during capture.
    pub fn start<P: TransactionParticipant>(
        &mut self,
        participants: &mut [P],
        cx: &mut TxContext<'_>,
        now: Duration,
    ) -> bool {
        if !self.requested || self.inflight.is_some() {
            return false;
        }

        let _span = tracy_client::span!("Transactions::start");

        self.requested = false;

        let mut ids = Vec::new();
        for participant in participants.iter_mut().filter(|p| p.is_active()) {
            participant.begin_capture(cx);
            ids.push(participant.id());
        }

        if ids.is_empty() {
            trace!("no active outputs, nothing to capture");
            return false;
        }

        trace!("started transaction with {} outputs", ids.len());
        self.inflight = Some(Inflight {
            participants: ids,
            deadline: now + self.timeout,
        });

        self.notify(participants, cx);
        true
    }

    /// Commits the transaction if every participant settled.
    ///
    /// Returns whether the transaction committed.
    pub fn notify<P: TransactionParticipant>(
        &mut self,
        participants: &mut [P],
        cx: &mut TxContext<'_>,
    ) -> bool {
        let Some(inflight) = &self.inflight else {
            return false;
        };

        let settled = participants
            .iter()
            .filter(|p| inflight.participants.contains(&p.id()))
            .all(|p| p.is_settled(cx.views));
        if !settled {
            return false;
        }

        self.commit(participants, cx);
        true
    }

    /// Commits the transaction regardless of settlement once its deadline passed.
    ///
    /// Returns whether the transaction committed.
    pub fn timeout<P: TransactionParticipant>(
        &mut self,
        participants: &mut [P],
        cx: &mut TxContext<'_>,
        now: Duration,
    ) -> bool {
        let Some(inflight) = &self.inflight else {
            return false;
        };
        if now < inflight.deadline {
            return false;
        }

        warn!("transaction timed out, committing anyway");
        self.commit(participants, cx);
        true
    }

    /// Removes an output from the transaction in flight.
    ///
    /// The output must cancel its inflight state itself. The remaining outputs may have settled;
    /// call [`Transactions::notify`] afterwards.
    pub fn detach(&mut self, output: OutputId) {
        let Some(inflight) = &mut self.inflight else {
            return;
        };

        inflight.participants.retain(|id| *id != output);
        if inflight.participants.is_empty() {
            debug!("last participant detached, dropping transaction");
            self.inflight = None;
        }
    }

    fn commit<P: TransactionParticipant>(&mut self, participants: &mut [P], cx: &mut TxContext<'_>) {
        let _span = tracy_client::span!("Transactions::commit");

        let Some(inflight) = self.inflight.take() else {
            return;
        };

        for participant in participants
            .iter_mut()
            .filter(|p| inflight.participants.contains(&p.id()))
        {
            participant.commit_inflight(cx);
        }

        trace!("committed transaction");
    }
}
