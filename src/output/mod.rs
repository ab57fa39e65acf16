//! Outputs.
//!
//! An output owns its scene subtree, its staged state and the layout generators registered on
//! it. All cross-output coordination goes through the root.

use anyhow::ensure;
use rill_config::Color;
use smithay::utils::{Logical, Rectangle, Size};

use crate::backend::{OutputConfig, OutputDevice, Registration};
use crate::layer::{LayerSurface, LayerSurfaceId};
use crate::layout::{Layout, LayoutGenerator, LayoutId};
use crate::lock::{LockManagerState, LockRenderState};
use crate::mode::{self, ModeSetup, OutputMode};
use crate::scene::{NodeId, Scene};
use crate::utils::id::IdCounter;
use crate::utils::{logical_size, rect_from_size};
use crate::view::ViewId;

mod layers;
mod lock;
pub mod state;
pub mod transaction;
pub mod tree;

pub use self::state::{CurrentState, InflightDemand, InflightState, PendingState};
pub use self::transaction::{TransactionParticipant, TxContext};
pub use self::tree::{OutputTree, SceneLayer};

static OUTPUT_ID_COUNTER: IdCounter = IdCounter::new();

/// Tags a new output starts out showing.
const DEFAULT_TAGS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(u64);

impl OutputId {
    pub fn next() -> OutputId {
        OutputId(OUTPUT_ID_COUNTER.next())
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

pub struct Output {
    id: OutputId,
    name: String,
    device: Box<dyn OutputDevice>,
    registration: Registration,
    tree: OutputTree,

    enabled: bool,
    mode: Option<OutputMode>,
    scale: f64,
    /// Area left after layer surfaces reserved their exclusive zones, relative to the output.
    usable_area: Rectangle<i32, Logical>,

    lock_render_state: LockRenderState,
    /// Lock surface node inside the locked content, if the locker mapped one.
    lock_surface: Option<NodeId>,

    pending: PendingState,
    inflight: InflightState,
    current: CurrentState,
    /// Tags shown before the last tag change, for toggling back.
    previous_tags: u32,
    /// Whether `inflight` was captured and is not committed yet.
    in_transaction: bool,

    /// Registered layout generators, oldest first.
    layouts: Vec<Layout>,
    active_layout: Option<LayoutId>,
    /// Overrides the default layout namespace.
    layout_namespace: Option<String>,
    last_layout_serial: u32,

    /// Mapped layer surfaces, in mapping order.
    layer_surfaces: Vec<LayerSurface>,
}

impl Output {
    pub fn new(
        device: Box<dyn OutputDevice>,
        registration: Registration,
        tree: OutputTree,
        scale: f64,
        layout_namespace: Option<String>,
    ) -> Self {
        Self {
            id: registration.output(),
            name: registration.name().to_owned(),
            device,
            registration,
            tree,
            enabled: false,
            mode: None,
            scale,
            usable_area: Rectangle::default(),
            lock_render_state: LockRenderState::Blanked,
            lock_surface: None,
            pending: PendingState::new(DEFAULT_TAGS),
            inflight: InflightState::new(DEFAULT_TAGS),
            current: CurrentState {
                tags: DEFAULT_TAGS,
                fullscreen: None,
            },
            previous_tags: DEFAULT_TAGS,
            in_transaction: false,
            layouts: Vec::new(),
            active_layout: None,
            layout_namespace,
            last_layout_serial: 0,
            layer_surfaces: Vec::new(),
        }
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tree(&self) -> &OutputTree {
        &self.tree
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn mode(&self) -> Option<OutputMode> {
        self.mode
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Effective resolution of the output.
    pub fn size(&self) -> Size<i32, Logical> {
        match self.mode {
            Some(mode) => logical_size(mode.size, self.scale),
            None => Size::default(),
        }
    }

    pub fn usable_area(&self) -> Rectangle<i32, Logical> {
        self.usable_area
    }

    pub fn pending(&self) -> &PendingState {
        &self.pending
    }

    pub fn inflight(&self) -> &InflightState {
        &self.inflight
    }

    pub fn current(&self) -> &CurrentState {
        &self.current
    }

    pub fn previous_tags(&self) -> u32 {
        self.previous_tags
    }

    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn lock_surface(&self) -> Option<NodeId> {
        self.lock_surface
    }

    pub fn layer_surfaces(&self) -> &[LayerSurface] {
        &self.layer_surfaces
    }

    pub fn layer_surface(&self, id: LayerSurfaceId) -> Option<&LayerSurface> {
        self.layer_surfaces.iter().find(|surface| surface.id() == id)
    }

    // =========================================================================
    // Device configuration
    // =========================================================================

    /// Enables the output with the mode picked for new outputs.
    pub fn configure_initial_mode(&mut self, scene: &mut Scene) {
        match mode::configure_initial_mode(self.device.as_mut(), self.scale) {
            ModeSetup::Enabled(mode) => {
                self.enabled = true;
                self.tree.set_enabled(scene, true);
                self.set_mode(scene, mode);
            }
            ModeSetup::Disabled => {
                self.enabled = false;
                self.tree.set_enabled(scene, false);
            }
        }
    }

    /// Handles the device switching modes.
    ///
    /// The caller must request a transaction afterwards since the usable area may change.
    pub fn set_mode(&mut self, scene: &mut Scene, mode: Option<OutputMode>) {
        self.mode = mode;
        self.resize(scene);
    }

    /// Changes the output scale.
    ///
    /// The caller must request a transaction afterwards since the usable area may change.
    pub fn set_scale(&mut self, scene: &mut Scene, scale: f64) -> anyhow::Result<()> {
        ensure!(
            scale.is_finite() && scale > 0.,
            "{}: invalid scale {scale}",
            self.name
        );

        let config = OutputConfig {
            enabled: self.enabled,
            mode: self.mode,
            scale,
        };
        self.device.commit(&config)?;

        self.scale = scale;
        self.resize(scene);
        Ok(())
    }

    /// Handles the output getting enabled or disabled.
    pub fn set_enabled(&mut self, scene: &mut Scene, enabled: bool, lock_state: LockManagerState) {
        if self.enabled == enabled {
            return;
        }

        self.enabled = enabled;
        self.tree.set_enabled(scene, enabled);

        if enabled {
            self.tree
                .show_locked(scene, lock_state != LockManagerState::Unlocked);
            self.resize(scene);
        } else {
            self.blank(scene);
        }
    }

    /// Updates everything sized after the effective resolution.
    fn resize(&mut self, scene: &mut Scene) {
        let size = self.size();
        self.tree.resize(scene, size);
        if let Some(node) = self.lock_surface {
            scene.set_size(node, size);
        }
        self.arrange_layers(scene);
    }

    pub fn submit_frame(&mut self) -> anyhow::Result<()> {
        self.device.submit_frame()
    }

    // =========================================================================
    // Pending state
    // =========================================================================

    /// Links a new view on top of both pending stacks.
    pub fn add_view(&mut self, view: ViewId) {
        self.pending.focus_stack.push_front(view);
        self.pending.wm_stack.push_front(view);
    }

    pub fn focus_view(&mut self, view: ViewId) {
        self.pending.focus_stack.move_to_front(view);
    }

    /// Unlinks the view from the pending and inflight stacks.
    ///
    /// An outstanding layout demand keeps listing the view, so the generator's answer still
    /// lines up with what it was sent.
    ///
    /// Returns whether the view was linked into this output.
    pub fn remove_view(&mut self, view: ViewId) -> bool {
        let mut linked = self.pending.focus_stack.remove(view);
        linked |= self.pending.wm_stack.remove(view);
        linked |= self.inflight.focus_stack.remove(view);
        linked |= self.inflight.wm_stack.remove(view);

        if self.inflight.fullscreen == Some(view) {
            self.inflight.fullscreen = None;
        }

        linked
    }

    /// Unlinks every view from the pending stacks, returning them in focus order.
    ///
    /// Must not be called while a transaction is outstanding.
    pub fn take_pending_views(&mut self) -> Vec<ViewId> {
        assert!(
            !self.in_transaction,
            "cannot take the views of {:?} while a transaction is outstanding",
            self.id
        );

        let views = self.pending.focus_stack.iter().collect();
        self.pending.focus_stack.clear();
        self.pending.wm_stack.clear();
        views
    }

    /// Shows a new set of tags, remembering the old one.
    ///
    /// Empty tag sets are ignored. Returns whether the pending tags changed.
    pub fn set_pending_tags(&mut self, tags: u32) -> bool {
        if tags == 0 {
            debug!("ignoring empty tag set for {}", self.name);
            return false;
        }
        if tags == self.pending.tags {
            return false;
        }

        self.previous_tags = self.pending.tags;
        self.pending.tags = tags;
        true
    }

    pub fn toggle_pending_tags(&mut self, mask: u32) -> bool {
        self.set_pending_tags(self.pending.tags ^ mask)
    }

    pub fn focus_previous_tags(&mut self) -> bool {
        self.set_pending_tags(self.previous_tags)
    }

    // =========================================================================
    // Layout generators
    // =========================================================================

    /// Namespace the active layout must have.
    pub fn effective_layout_namespace<'a>(&'a self, default: &'a str) -> &'a str {
        self.layout_namespace.as_deref().unwrap_or(default)
    }

    pub fn layout_namespace(&self) -> Option<&str> {
        self.layout_namespace.as_deref()
    }

    pub fn active_layout(&self) -> Option<LayoutId> {
        self.active_layout
    }

    pub fn layouts(&self) -> impl Iterator<Item = &Layout> + '_ {
        self.layouts.iter()
    }

    pub fn add_layout(&mut self, generator: Box<dyn LayoutGenerator>, default_ns: &str) -> LayoutId {
        let layout = Layout::new(generator);
        let id = layout.id();
        debug!(
            "registering layout {:?} with namespace {} on {}",
            id,
            layout.namespace(),
            self.name
        );

        self.layouts.push(layout);
        self.select_layout(default_ns);
        id
    }

    /// Unregisters a layout generator.
    ///
    /// A demand sent to it is dropped so it cannot block the transaction.
    pub fn remove_layout(&mut self, id: LayoutId, default_ns: &str) -> bool {
        let Some(idx) = self.layouts.iter().position(|layout| layout.id() == id) else {
            return false;
        };
        self.layouts.remove(idx);

        if self
            .inflight
            .layout_demand
            .as_ref()
            .is_some_and(|demand| demand.layout == id)
        {
            debug!("dropping demand of unregistered layout {id:?}");
            self.inflight.layout_demand = None;
        }

        self.select_layout(default_ns);
        true
    }

    /// Unregisters every layout generator.
    pub fn take_layouts(&mut self) -> Vec<Layout> {
        self.active_layout = None;
        self.inflight.layout_demand = None;
        std::mem::take(&mut self.layouts)
    }

    pub fn set_layout_namespace(&mut self, namespace: Option<String>, default_ns: &str) {
        self.layout_namespace = namespace;
        self.select_layout(default_ns);
    }

    /// Picks the oldest layout with the effective namespace.
    pub fn select_layout(&mut self, default_ns: &str) {
        let namespace = self.effective_layout_namespace(default_ns);
        let active = self
            .layouts
            .iter()
            .find(|layout| layout.namespace() == namespace)
            .map(Layout::id);

        if active != self.active_layout {
            match active {
                Some(id) => debug!("{}: using layout {id:?} ({namespace})", self.name),
                None => debug!("{}: no layout with namespace {namespace}", self.name),
            }
            self.active_layout = active;
        }
    }

    // =========================================================================
    // Lock surface
    // =========================================================================

    /// Maps the lock surface of this output and switches to locked content.
    pub fn map_lock_surface(&mut self, scene: &mut Scene) -> anyhow::Result<()> {
        if self.lock_surface.is_none() {
            let node = scene.create_rect(self.tree.lock_surface(), self.size(), Color::BLACK)?;
            scene.set_label(node, "lock-surface-content");
            self.lock_surface = Some(node);
        }

        self.tree.show_locked(scene, true);
        Ok(())
    }

    pub fn destroy_lock_surface(&mut self, scene: &mut Scene) {
        if let Some(node) = self.lock_surface.take() {
            scene.destroy(node);
        }
    }

    pub fn show_locked(&mut self, scene: &mut Scene, locked: bool) {
        self.tree.show_locked(scene, locked);
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Destroys the scene subtree of the output and hands back its device registration.
    ///
    /// Every view must have been unlinked and every layout unregistered beforehand.
    pub fn destroy(self, scene: &mut Scene) -> Registration {
        assert!(
            self.pending.focus_stack.is_empty() && self.pending.wm_stack.is_empty(),
            "destroying {:?} with views in its pending stacks",
            self.id
        );
        assert!(
            self.inflight.focus_stack.is_empty() && self.inflight.wm_stack.is_empty(),
            "destroying {:?} with views in its inflight stacks",
            self.id
        );
        assert!(
            self.inflight.layout_demand.is_none(),
            "destroying {:?} with an outstanding layout demand",
            self.id
        );
        assert!(
            self.layouts.is_empty(),
            "destroying {:?} with registered layouts",
            self.id
        );

        debug!("destroying output {}", self.name);
        self.tree.destroy(scene);
        self.registration
    }

    fn full_area(&self) -> Rectangle<i32, Logical> {
        rect_from_size(self.size())
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("mode", &self.mode)
            .field("lock_render_state", &self.lock_render_state)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
