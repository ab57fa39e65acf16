//! Tracking what the output actually shows while the session locks and unlocks.
//!
//! The render state only changes when a frame is submitted and when it is presented, so the lock
//! manager can tell when every screen really stopped showing normal content.

use super::Output;
use crate::lock::{LockManager, LockManagerState, LockRenderState};
use crate::scene::Scene;

impl Output {
    pub fn lock_render_state(&self) -> LockRenderState {
        self.lock_render_state
    }

    /// Submits a frame to the device and advances the lock render state.
    ///
    /// Returns whether the frame was submitted.
    pub fn render_frame(&mut self, scene: &Scene, lock: &dyn LockManager) -> bool {
        let _span = tracy_client::span!("Output::render_frame");

        if !self.enabled {
            return false;
        }

        if let Err(err) = self.device.submit_frame() {
            warn!("{}: error submitting frame: {err:?}", self.name);
            return false;
        }

        self.frame_submitted(scene, lock.state());
        true
    }

    fn frame_submitted(&mut self, scene: &Scene, lock_state: LockManagerState) {
        let shows_locked = match lock_state {
            LockManagerState::Locked | LockManagerState::WaitingForBlank => true,
            LockManagerState::WaitingForLockSurfaces => {
                self.tree.is_locked_content_enabled(scene)
            }
            LockManagerState::Unlocked => false,
        };

        let prev = self.lock_render_state;
        if shows_locked {
            if lock_state == LockManagerState::Locked {
                assert!(
                    prev.is_locked(),
                    "{}: lock render state {prev:?} while the session is locked",
                    self.name
                );
            }

            if !prev.is_locked() {
                self.lock_render_state = if self.lock_surface.is_some() {
                    LockRenderState::PendingLockSurface
                } else {
                    LockRenderState::PendingBlank
                };
            }
        } else if prev != LockRenderState::Unlocked {
            self.lock_render_state = LockRenderState::PendingUnlock;
        }

        if self.lock_render_state != prev {
            trace!(
                "{}: lock render state {prev:?} -> {:?}",
                self.name,
                self.lock_render_state
            );
        }
    }

    /// Handles presentation feedback for the last submitted frame.
    pub fn frame_presented(&mut self, presented: bool, lock: &mut dyn LockManager) {
        let _span = tracy_client::span!("Output::frame_presented");

        if !presented {
            return;
        }

        let prev = self.lock_render_state;
        match prev {
            LockRenderState::PendingUnlock => {
                assert_ne!(
                    lock.state(),
                    LockManagerState::Locked,
                    "{}: normal content presented while the session is locked",
                    self.name
                );
                self.lock_render_state = LockRenderState::Unlocked;
            }
            LockRenderState::PendingBlank | LockRenderState::PendingLockSurface => {
                self.lock_render_state = if prev == LockRenderState::PendingBlank {
                    LockRenderState::Blanked
                } else {
                    LockRenderState::LockSurface
                };

                if lock.state() != LockManagerState::Locked {
                    lock.request_recheck();
                }
            }
            LockRenderState::Unlocked | LockRenderState::Blanked | LockRenderState::LockSurface => {
                return;
            }
        }

        trace!(
            "{}: lock render state {prev:?} -> {:?}",
            self.name,
            self.lock_render_state
        );
    }

    /// Forces the output to locked content, as happens when it is disabled.
    pub(super) fn blank(&mut self, scene: &mut Scene) {
        self.lock_render_state = LockRenderState::Blanked;
        self.tree.show_locked(scene, true);
    }
}
