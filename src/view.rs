//! Views and their staged state.
//!
//! A view is a toplevel window. Like outputs, views keep three copies of their state: `pending`
//! is mutated by commands, `inflight` is captured when a transaction starts and `current` is what
//! the scene graph shows. Outputs refer to views only by [`ViewId`].

use std::collections::HashMap;

use rill_config::Color;
use smithay::utils::{Logical, Rectangle, Size};

use crate::output::OutputId;
use crate::scene::{NodeId, Scene};
use crate::utils::id::IdCounter;

static VIEW_ID_COUNTER: IdCounter = IdCounter::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

impl ViewId {
    fn next() -> ViewId {
        ViewId(VIEW_ID_COUNTER.next())
    }

    #[cfg(test)]
    pub fn new(id: u64) -> ViewId {
        ViewId(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub tags: u32,
    pub float: bool,
    pub fullscreen: bool,
    /// Position relative to the output, and size.
    pub geometry: Rectangle<i32, Logical>,
}

#[derive(Debug)]
pub struct View {
    id: ViewId,
    pub pending: ViewState,
    pub inflight: ViewState,
    pub current: ViewState,
    /// Output whose stacks this view is linked into.
    pub output: Option<OutputId>,
    node: NodeId,
    /// Serial of the configure the client has not acked yet.
    awaiting_ack: Option<u32>,
    /// Size and fullscreen state sent in the last configure.
    configured: Option<(Size<i32, Logical>, bool)>,
    title: Option<String>,
}

impl View {
    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Sets the window title, ignoring titles that cannot be represented.
    pub fn set_title(&mut self, title: &str) {
        if title.contains('\0') {
            warn!("ignoring title with interior NUL for {:?}", self.id);
            return;
        }

        self.title = Some(title.to_owned());
    }

    /// Whether the inflight state differs from what the client was last told.
    pub fn needs_configure(&self) -> bool {
        let wanted = (self.inflight.geometry.size, self.inflight.fullscreen);
        self.configured != Some(wanted)
    }

    pub fn is_awaiting_ack(&self) -> bool {
        self.awaiting_ack.is_some()
    }

    /// Serial of the configure the client still has to ack.
    pub fn awaiting_serial(&self) -> Option<u32> {
        self.awaiting_ack
    }
}

#[derive(Debug, Default)]
pub struct Views {
    views: HashMap<ViewId, View>,
    last_serial: u32,
}

impl Views {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a view with its scene node under `parent`.
    ///
    /// The node starts out disabled; it is shown once a transaction commits the view.
    pub fn add(&mut self, scene: &mut Scene, parent: NodeId, tags: u32) -> anyhow::Result<ViewId> {
        let id = ViewId::next();
        let node = scene.create_rect(parent, Size::default(), Color::BLACK)?;
        scene.set_label(node, format!("view-{}", id.get()));
        scene.set_enabled(node, false);

        let state = ViewState {
            tags,
            ..ViewState::default()
        };
        let view = View {
            id,
            pending: state,
            inflight: state,
            current: state,
            output: None,
            node,
            awaiting_ack: None,
            configured: None,
            title: None,
        };
        self.views.insert(id, view);

        debug!("added {id:?}");
        Ok(id)
    }

    /// Removes the view and destroys its scene node.
    ///
    /// The view must already be unlinked from every output stack.
    pub fn remove(&mut self, scene: &mut Scene, id: ViewId) -> Option<View> {
        let view = self.views.remove(&id)?;
        scene.destroy(view.node);
        debug!("removed {id:?}");
        Some(view)
    }

    pub fn get(&self, id: ViewId) -> Option<&View> {
        self.views.get(&id)
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.views.get_mut(&id)
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.views.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &View> + '_ {
        self.views.values()
    }

    pub fn view(&self, id: ViewId) -> &View {
        self.views
            .get(&id)
            .unwrap_or_else(|| panic!("{id:?} is linked but no longer exists"))
    }

    pub fn view_mut(&mut self, id: ViewId) -> &mut View {
        self.views
            .get_mut(&id)
            .unwrap_or_else(|| panic!("{id:?} is linked but no longer exists"))
    }

    /// Copies the pending state of the view into inflight.
    pub fn capture(&mut self, id: ViewId) {
        let view = self.view_mut(id);
        view.inflight = view.pending;
    }

    /// Copies the inflight state of the view into current.
    pub fn commit(&mut self, id: ViewId) {
        let view = self.view_mut(id);
        view.current = view.inflight;
    }

    /// Sends a configure for the inflight state if the client has not seen it yet.
    ///
    /// Returns the serial of the configure, if one was sent.
    pub fn configure(&mut self, id: ViewId) -> Option<u32> {
        if !self.view(id).needs_configure() {
            return None;
        }

        self.last_serial = self.last_serial.wrapping_add(1);
        let serial = self.last_serial;

        let view = self.view_mut(id);
        view.configured = Some((view.inflight.geometry.size, view.inflight.fullscreen));
        view.awaiting_ack = Some(serial);
        trace!(
            "configuring {id:?} to {}x{} serial={serial}",
            view.inflight.geometry.size.w,
            view.inflight.geometry.size.h
        );

        Some(serial)
    }

    /// Handles a client acknowledging a configure.
    ///
    /// Returns whether this ack settled the view.
    pub fn ack(&mut self, id: ViewId, serial: u32) -> bool {
        let Some(view) = self.views.get_mut(&id) else {
            debug!("ignoring ack for unknown {id:?}");
            return false;
        };

        if view.awaiting_ack != Some(serial) {
            trace!(
                "ignoring stale ack for {id:?}: serial={serial} awaiting={:?}",
                view.awaiting_ack
            );
            return false;
        }

        view.awaiting_ack = None;
        true
    }

    /// Drops any outstanding configure so the view no longer blocks a transaction.
    pub fn forget_configure(&mut self, id: ViewId) {
        if let Some(view) = self.views.get_mut(&id) {
            view.awaiting_ack = None;
        }
    }
}
