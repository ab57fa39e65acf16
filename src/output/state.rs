//! Staged output state.
//!
//! `pending` collects changes from commands, `inflight` is frozen for the duration of a
//! transaction and `current` is what the scene graph shows.

use smithay::utils::{Logical, Rectangle};

use crate::layout::LayoutId;
use crate::stack::ViewStack;
use crate::view::ViewId;

#[derive(Debug, Default)]
pub struct PendingState {
    pub tags: u32,
    /// Views in focus order, most recently focused first.
    pub focus_stack: ViewStack,
    /// Views in window-management order, the order tiled views are laid out in.
    pub wm_stack: ViewStack,
}

#[derive(Debug, Default)]
pub struct InflightState {
    pub tags: u32,
    pub focus_stack: ViewStack,
    pub wm_stack: ViewStack,
    pub fullscreen: Option<ViewId>,
    pub layout_demand: Option<InflightDemand>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CurrentState {
    pub tags: u32,
    pub fullscreen: Option<ViewId>,
}

/// Layout demand the output is waiting on.
#[derive(Debug, Clone, PartialEq)]
pub struct InflightDemand {
    pub serial: u32,
    pub layout: LayoutId,
    pub views: Vec<ViewId>,
    pub usable_area: Rectangle<i32, Logical>,
}

impl PendingState {
    pub fn new(tags: u32) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }
}

impl InflightState {
    pub fn new(tags: u32) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }
}
