//! Session lock management.
//!
//! Locking is only reported as done once every output is known to have stopped showing normal
//! content. Outputs track what is actually on screen in their [`LockRenderState`] and ask the
//! lock manager to re-check whenever that state settles.

use std::time::Duration;

/// Lock progress of the session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LockManagerState {
    #[default]
    Unlocked,
    /// Waiting for the locker to map a lock surface on every output.
    WaitingForLockSurfaces,
    /// The locker took too long, waiting for every output to show the blank fill.
    WaitingForBlank,
    Locked,
}

/// What the last presented frame of an output contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRenderState {
    /// A frame with normal content was submitted but not presented yet.
    PendingUnlock,
    /// The output shows normal content.
    Unlocked,
    /// A blank locked frame was submitted but not presented yet.
    PendingBlank,
    /// The output shows the blank locked fill.
    Blanked,
    /// A locked frame with a lock surface was submitted but not presented yet.
    PendingLockSurface,
    /// The output shows the lock surface.
    LockSurface,
}

impl LockRenderState {
    /// Whether the screen is known to show no normal content.
    pub fn is_locked(self) -> bool {
        matches!(self, LockRenderState::Blanked | LockRenderState::LockSurface)
    }
}

/// Lock manager as seen by an output.
pub trait LockManager {
    fn state(&self) -> LockManagerState;

    /// Asks the manager to check whether locking can complete.
    fn request_recheck(&mut self);
}

#[derive(Debug)]
pub struct SessionLock {
    state: LockManagerState,
    /// When to stop waiting for lock surfaces.
    deadline: Option<Duration>,
    surface_timeout: Duration,
    recheck: bool,
}

impl SessionLock {
    pub fn new(surface_timeout: Duration) -> Self {
        Self {
            state: LockManagerState::Unlocked,
            deadline: None,
            surface_timeout,
            recheck: false,
        }
    }

    pub fn state(&self) -> LockManagerState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state == LockManagerState::Locked
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Starts locking the session.
    ///
    /// Returns `false` if the request was refused because the session is already locking or
    /// locked.
    pub fn lock(&mut self, now: Duration, has_outputs: bool) -> bool {
        if self.state != LockManagerState::Unlocked {
            info!("refusing lock as the session is already {:?}", self.state);
            return false;
        }

        info!("locking session");

        if has_outputs {
            self.state = LockManagerState::WaitingForLockSurfaces;
            self.deadline = Some(now + self.surface_timeout);
        } else {
            // Nothing to redraw, lock right away.
            self.state = LockManagerState::Locked;
        }

        true
    }

    /// Gives up on waiting for lock surfaces once the deadline passed.
    ///
    /// Returns whether the manager moved on to waiting for blank outputs.
    pub fn surface_timeout(&mut self, now: Duration) -> bool {
        if self.state != LockManagerState::WaitingForLockSurfaces {
            return false;
        }
        if self.deadline.is_some_and(|deadline| now < deadline) {
            return false;
        }

        trace!("lock surface deadline expired, blanking outputs");
        self.state = LockManagerState::WaitingForBlank;
        self.deadline = None;
        true
    }

    /// Completes locking if every enabled output shows locked content.
    pub fn maybe_lock(&mut self, mut render_states: impl Iterator<Item = LockRenderState>) {
        let done = match self.state {
            LockManagerState::WaitingForLockSurfaces => {
                render_states.all(|state| state == LockRenderState::LockSurface)
            }
            LockManagerState::WaitingForBlank => render_states.all(LockRenderState::is_locked),
            LockManagerState::Unlocked | LockManagerState::Locked => return,
        };

        if done {
            info!("session locked");
            self.state = LockManagerState::Locked;
            self.deadline = None;
        }
    }

    pub fn unlock(&mut self) {
        info!("unlocking session");
        self.state = LockManagerState::Unlocked;
        self.deadline = None;
        self.recheck = false;
    }

    /// Returns and clears the recheck request.
    pub fn take_recheck(&mut self) -> bool {
        std::mem::take(&mut self.recheck)
    }
}

impl LockManager for SessionLock {
    fn state(&self) -> LockManagerState {
        self.state
    }

    fn request_recheck(&mut self) {
        self.recheck = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LockRenderState::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn locking() -> SessionLock {
        let mut lock = SessionLock::new(TIMEOUT);
        assert!(lock.lock(Duration::ZERO, true));
        lock
    }

    #[test]
    fn no_outputs_locks_immediately() {
        let mut lock = SessionLock::new(TIMEOUT);
        assert!(lock.lock(Duration::ZERO, false));
        assert!(lock.is_locked());
        assert_eq!(lock.deadline(), None);
    }

    #[test]
    fn refuses_second_lock() {
        let mut lock = locking();
        assert!(!lock.lock(Duration::ZERO, true));
        assert_eq!(lock.state(), LockManagerState::WaitingForLockSurfaces);
    }

    #[test]
    fn waits_for_lock_surfaces_everywhere() {
        let mut lock = locking();

        lock.maybe_lock([LockSurface, Blanked].into_iter());
        assert_eq!(lock.state(), LockManagerState::WaitingForLockSurfaces);

        lock.maybe_lock([LockSurface, LockSurface].into_iter());
        assert!(lock.is_locked());
    }

    #[test]
    fn timeout_accepts_blank_outputs() {
        let mut lock = locking();

        assert!(!lock.surface_timeout(Duration::from_millis(999)));
        assert!(lock.surface_timeout(TIMEOUT));
        assert_eq!(lock.state(), LockManagerState::WaitingForBlank);
        assert!(!lock.surface_timeout(TIMEOUT * 2));

        lock.maybe_lock([LockSurface, PendingBlank].into_iter());
        assert_eq!(lock.state(), LockManagerState::WaitingForBlank);

        lock.maybe_lock([LockSurface, Blanked].into_iter());
        assert!(lock.is_locked());
    }

    #[test]
    fn recheck_flag() {
        let mut lock = locking();
        assert!(!lock.take_recheck());
        lock.request_recheck();
        assert!(lock.take_recheck());
        assert!(!lock.take_recheck());
    }

    #[test]
    fn unlock_resets() {
        let mut lock = locking();
        lock.unlock();
        assert_eq!(lock.state(), LockManagerState::Unlocked);
        assert_eq!(lock.deadline(), None);

        // Unlocked managers ignore the output states.
        lock.maybe_lock([Blanked].into_iter());
        assert_eq!(lock.state(), LockManagerState::Unlocked);
    }
}
