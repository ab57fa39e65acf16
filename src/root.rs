//! The root of the compositor state.
//!
//! `Root` owns the scene, the outputs, the views, the lock manager and the transaction
//! coordinator, and is passed explicitly to everything that needs more than one of them. Commands
//! only mutate pending state and request a transaction; [`Root::refresh`] must run before control
//! returns to the event loop so that the request is acted on.

use std::time::Duration;

use anyhow::{bail, Context as _};
use rill_config::Config;
use smithay::utils::{Logical, Rectangle};

use crate::backend::{DeviceEvent, DeviceRegistry, OutputDevice};
use crate::layer::{LayerSurfaceId, LayerSurfaceState};
use crate::layout::{LayoutGenerator, LayoutId};
use crate::lock::{LockManager, LockManagerState, SessionLock};
use crate::output::{Output, OutputId, OutputTree, SceneLayer, TransactionParticipant, TxContext};
use crate::scene::{NodeId, Scene};
use crate::transaction::Transactions;
use crate::view::{ViewId, Views};

pub struct Root {
    config: Config,
    scene: Scene,
    /// Holds the nodes of views that have no output.
    orphans: NodeId,
    /// Outputs in the order they were added.
    outputs: Vec<Output>,
    registry: DeviceRegistry,
    views: Views,
    /// Views without an output, most recently focused first.
    orphan_views: Vec<ViewId>,
    lock: SessionLock,
    transactions: Transactions,
}

impl Root {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let mut scene = Scene::new();
        let root = scene.root();
        let orphans = scene
            .create_tree(root)
            .context("error creating the orphan view tree")?;
        scene.set_label(orphans, "orphans");
        scene.set_enabled(orphans, false);

        Ok(Self {
            lock: SessionLock::new(config.lock.surface_timeout()),
            transactions: Transactions::new(config.transactions.timeout()),
            config,
            scene,
            orphans,
            outputs: Vec::new(),
            registry: DeviceRegistry::new(),
            views: Views::new(),
            orphan_views: Vec::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn views(&self) -> &Views {
        &self.views
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn output(&self, id: OutputId) -> Option<&Output> {
        self.outputs.iter().find(|output| output.id() == id)
    }

    pub fn output_by_name(&self, name: &str) -> Option<&Output> {
        self.registry.find(name).and_then(|id| self.output(id))
    }

    pub fn orphan_views(&self) -> &[ViewId] {
        &self.orphan_views
    }

    pub fn lock_state(&self) -> LockManagerState {
        self.lock.state()
    }

    pub fn transactions(&self) -> &Transactions {
        &self.transactions
    }

    fn output_idx(&self, id: OutputId) -> anyhow::Result<usize> {
        self.outputs
            .iter()
            .position(|output| output.id() == id)
            .with_context(|| format!("no output with id {}", id.get()))
    }

    fn output_mut(&mut self, id: OutputId) -> anyhow::Result<&mut Output> {
        let idx = self.output_idx(id)?;
        Ok(&mut self.outputs[idx])
    }

    // =========================================================================
    // Output lifecycle
    // =========================================================================

    /// Sets up a newly discovered display device.
    ///
    /// If the scene nodes for the output cannot be created, the error is returned and the device
    /// is not registered.
    pub fn add_output(&mut self, device: Box<dyn OutputDevice>) -> anyhow::Result<OutputId> {
        let _span = tracy_client::span!("Root::add_output");

        let name = device.name().to_owned();
        let output_config = self.config.output(&name).cloned().unwrap_or_default();

        let root = self.scene.root();
        let tree = OutputTree::new(
            &mut self.scene,
            root,
            Default::default(),
            output_config.background_color(),
            self.config.lock.color(),
        )
        .with_context(|| format!("error creating scene nodes for output {name}"))?;
        tree.show_locked(&mut self.scene, self.lock.state() != LockManagerState::Unlocked);

        let id = OutputId::next();
        let registration = self.registry.register(&name, id);
        let mut output = Output::new(
            device,
            registration,
            tree,
            output_config.scale(),
            output_config.layout_namespace.clone(),
        );

        if output_config.off {
            info!("output {name} is turned off in the config");
            output.tree().set_enabled(&mut self.scene, false);
        } else {
            output.configure_initial_mode(&mut self.scene);
        }
        info!(
            "added output {name}, enabled={} mode={:?}",
            output.is_enabled(),
            output.mode()
        );

        let orphans = std::mem::take(&mut self.orphan_views);
        for view in orphans.into_iter().rev() {
            adopt_view(&mut self.scene, &mut self.views, &mut output, view);
        }

        self.outputs.push(output);
        self.transactions.request();
        Ok(id)
    }

    /// Tears down an output, moving its views to another output.
    pub fn remove_output(&mut self, id: OutputId) -> anyhow::Result<()> {
        let _span = tracy_client::span!("Root::remove_output");

        let idx = self.output_idx(id)?;
        self.transactions.detach(id);

        let output = &mut self.outputs[idx];
        output.cancel_inflight(&mut self.views);
        let views = output.take_pending_views();
        for layout in output.take_layouts() {
            debug!("dropping layout {:?} ({})", layout.id(), layout.namespace());
        }

        let output = self.outputs.remove(idx);
        let target = self.outputs.iter().position(Output::is_enabled);
        match target {
            Some(target) => {
                // Linking pushes to the front, so go from the least recently focused view.
                for view in views.into_iter().rev() {
                    adopt_view(&mut self.scene, &mut self.views, &mut self.outputs[target], view);
                }
            }
            None => {
                for view in views {
                    self.orphan_view(view);
                }
            }
        }

        info!("removing output {}", output.name());
        let registration = output.destroy(&mut self.scene);
        self.registry.unregister(registration);

        self.lock.request_recheck();
        self.transactions.request();
        let mut cx = TxContext {
            scene: &mut self.scene,
            views: &mut self.views,
        };
        self.transactions.notify(&mut self.outputs, &mut cx);
        Ok(())
    }

    fn orphan_view(&mut self, id: ViewId) {
        let view = self.views.view_mut(id);
        view.output = None;
        self.scene.reparent(view.node(), self.orphans);
        self.orphan_views.push(id);
    }

    /// Handles an event reported by the backend for one of the outputs.
    pub fn dispatch(&mut self, event: DeviceEvent, now: Duration) -> anyhow::Result<()> {
        let _span = tracy_client::span!("Root::dispatch");

        let id = event.output();
        match event {
            DeviceEvent::ModeChanged { mode, .. } => {
                let idx = self.output_idx(id)?;
                self.outputs[idx].set_mode(&mut self.scene, Some(mode));
                self.transactions.request();
            }
            DeviceEvent::Frame { .. } => {
                let idx = self.output_idx(id)?;
                self.outputs[idx].render_frame(&self.scene, &self.lock);
            }
            DeviceEvent::Presented { presented, .. } => {
                let idx = self.output_idx(id)?;
                self.outputs[idx].frame_presented(presented, &mut self.lock);
            }
            DeviceEvent::EnableChanged { enabled, .. } => {
                self.set_output_enabled(id, enabled)?;
            }
            DeviceEvent::Removed { .. } => {
                self.remove_output(id)?;
            }
        }

        self.refresh(now);
        Ok(())
    }

    fn set_output_enabled(&mut self, id: OutputId, enabled: bool) -> anyhow::Result<()> {
        let lock_state = self.lock.state();
        let idx = self.output_idx(id)?;
        let output = &mut self.outputs[idx];
        if output.is_enabled() == enabled {
            return Ok(());
        }

        info!("output {} is now {}", output.name(), if enabled { "enabled" } else { "disabled" });
        output.set_enabled(&mut self.scene, enabled, lock_state);

        if !enabled {
            output.cancel_inflight(&mut self.views);
            self.transactions.detach(id);
            self.lock.request_recheck();

            let mut cx = TxContext {
                scene: &mut self.scene,
                views: &mut self.views,
            };
            self.transactions.notify(&mut self.outputs, &mut cx);
        }

        self.transactions.request();
        Ok(())
    }

    /// Changes the scale of an output.
    pub fn set_output_scale(&mut self, id: OutputId, scale: f64) -> anyhow::Result<()> {
        let idx = self.output_idx(id)?;
        self.outputs[idx].set_scale(&mut self.scene, scale)?;
        self.transactions.request();
        Ok(())
    }

    /// Acts on requested transactions and expired deadlines.
    ///
    /// Must run before control returns to the event loop.
    pub fn refresh(&mut self, now: Duration) {
        let _span = tracy_client::span!("Root::refresh");

        if self.lock.surface_timeout(now) {
            for output in &mut self.outputs {
                output.show_locked(&mut self.scene, true);
            }
            // Outputs that already show locked content will not present a settling frame.
            self.lock.request_recheck();
        }
        if self.lock.take_recheck() {
            let states = self
                .outputs
                .iter()
                .filter(|output| output.is_enabled())
                .map(Output::lock_render_state);
            self.lock.maybe_lock(states);
        }

        let mut cx = TxContext {
            scene: &mut self.scene,
            views: &mut self.views,
        };
        self.transactions.timeout(&mut self.outputs, &mut cx, now);
        self.transactions.start(&mut self.outputs, &mut cx, now);
    }

    /// Next time [`Root::refresh`] has work to do on its own.
    pub fn next_deadline(&self) -> Option<Duration> {
        match (self.transactions.deadline(), self.lock.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn notify_transactions(&mut self) {
        let mut cx = TxContext {
            scene: &mut self.scene,
            views: &mut self.views,
        };
        self.transactions.notify(&mut self.outputs, &mut cx);
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Creates a view on an output, on top of its stacks.
    pub fn add_view(&mut self, output: OutputId, tags: u32) -> anyhow::Result<ViewId> {
        if tags == 0 {
            bail!("a view needs at least one tag");
        }

        let idx = self.output_idx(output)?;
        let parent = self.outputs[idx].tree().layer(SceneLayer::Layout);
        let id = self.views.add(&mut self.scene, parent, tags)?;
        self.views.view_mut(id).output = Some(output);
        self.outputs[idx].add_view(id);

        self.transactions.request();
        Ok(id)
    }

    /// Unlinks a view from its output and destroys it.
    pub fn remove_view(&mut self, id: ViewId) {
        let Some(view) = self.views.get(id) else {
            return;
        };

        match view.output {
            Some(output) => {
                if let Ok(output) = self.output_mut(output) {
                    output.remove_view(id);
                }
            }
            None => self.orphan_views.retain(|view| *view != id),
        }

        self.views.remove(&mut self.scene, id);
        self.transactions.request();
        self.notify_transactions();
    }

    pub fn focus_view(&mut self, id: ViewId) -> anyhow::Result<()> {
        let output = self.view_output(id)?;
        self.output_mut(output)?.focus_view(id);
        self.transactions.request();
        Ok(())
    }

    pub fn set_view_tags(&mut self, id: ViewId, tags: u32) -> anyhow::Result<()> {
        if tags == 0 {
            debug!("ignoring empty tag set for {id:?}");
            return Ok(());
        }

        self.view_pending(id, |state| state.tags = tags)
    }

    pub fn set_view_float(&mut self, id: ViewId, float: bool) -> anyhow::Result<()> {
        self.view_pending(id, |state| state.float = float)
    }

    pub fn set_view_fullscreen(&mut self, id: ViewId, fullscreen: bool) -> anyhow::Result<()> {
        self.view_pending(id, |state| state.fullscreen = fullscreen)
    }

    /// Sets the geometry a floating view asks for.
    pub fn set_view_geometry(
        &mut self,
        id: ViewId,
        geometry: Rectangle<i32, Logical>,
    ) -> anyhow::Result<()> {
        self.view_pending(id, |state| state.geometry = geometry)
    }

    pub fn set_view_title(&mut self, id: ViewId, title: &str) {
        if let Some(view) = self.views.get_mut(id) {
            view.set_title(title);
        }
    }

    /// Moves a view to another output.
    pub fn send_view_to_output(&mut self, id: ViewId, output: OutputId) -> anyhow::Result<()> {
        let target = self.output_idx(output)?;
        let view = self.views.get(id).context("no such view")?;
        if view.output == Some(output) {
            return Ok(());
        }

        match view.output {
            Some(current) => {
                if let Ok(current) = self.output_mut(current) {
                    current.remove_view(id);
                }
            }
            None => self.orphan_views.retain(|view| *view != id),
        }

        adopt_view(
            &mut self.scene,
            &mut self.views,
            &mut self.outputs[target],
            id,
        );

        self.transactions.request();
        self.notify_transactions();
        Ok(())
    }

    /// Handles a client acknowledging a configure.
    pub fn ack_configure(&mut self, id: ViewId, serial: u32) {
        if self.views.ack(id, serial) {
            self.notify_transactions();
        }
    }

    fn view_output(&self, id: ViewId) -> anyhow::Result<OutputId> {
        let view = self.views.get(id).context("no such view")?;
        view.output.context("view has no output")
    }

    fn view_pending(
        &mut self,
        id: ViewId,
        f: impl FnOnce(&mut crate::view::ViewState),
    ) -> anyhow::Result<()> {
        let view = self.views.get_mut(id).context("no such view")?;
        f(&mut view.pending);
        self.transactions.request();
        Ok(())
    }

    // =========================================================================
    // Tags
    // =========================================================================

    pub fn set_tags(&mut self, output: OutputId, tags: u32) -> anyhow::Result<()> {
        if self.output_mut(output)?.set_pending_tags(tags) {
            self.transactions.request();
        }
        Ok(())
    }

    pub fn toggle_tags(&mut self, output: OutputId, mask: u32) -> anyhow::Result<()> {
        if self.output_mut(output)?.toggle_pending_tags(mask) {
            self.transactions.request();
        }
        Ok(())
    }

    pub fn focus_previous_tags(&mut self, output: OutputId) -> anyhow::Result<()> {
        if self.output_mut(output)?.focus_previous_tags() {
            self.transactions.request();
        }
        Ok(())
    }

    // =========================================================================
    // Layouts
    // =========================================================================

    pub fn register_layout(
        &mut self,
        output: OutputId,
        generator: Box<dyn LayoutGenerator>,
    ) -> anyhow::Result<LayoutId> {
        let default_ns = self.config.layout.default_namespace().to_owned();
        let id = self.output_mut(output)?.add_layout(generator, &default_ns);
        self.transactions.request();
        Ok(id)
    }

    pub fn unregister_layout(&mut self, output: OutputId, layout: LayoutId) -> anyhow::Result<()> {
        let default_ns = self.config.layout.default_namespace().to_owned();
        if self.output_mut(output)?.remove_layout(layout, &default_ns) {
            self.transactions.request();
            self.notify_transactions();
        }
        Ok(())
    }

    pub fn set_layout_namespace(
        &mut self,
        output: OutputId,
        namespace: Option<String>,
    ) -> anyhow::Result<()> {
        let default_ns = self.config.layout.default_namespace().to_owned();
        self.output_mut(output)?
            .set_layout_namespace(namespace, &default_ns);
        self.transactions.request();
        Ok(())
    }

    /// Handles a layout generator answering a demand.
    pub fn commit_layout(
        &mut self,
        output: OutputId,
        serial: u32,
        boxes: &[Rectangle<i32, Logical>],
    ) -> anyhow::Result<()> {
        let idx = self.output_idx(output)?;
        if self.outputs[idx].commit_layout(&mut self.views, serial, boxes) {
            self.notify_transactions();
        }
        Ok(())
    }

    // =========================================================================
    // Layer surfaces
    // =========================================================================

    pub fn map_layer_surface(
        &mut self,
        output: OutputId,
        state: LayerSurfaceState,
    ) -> anyhow::Result<LayerSurfaceId> {
        let idx = self.output_idx(output)?;
        let output = &mut self.outputs[idx];
        let id = output.map_layer_surface(&mut self.scene, state)?;
        output.arrange_layers(&mut self.scene);
        self.transactions.request();
        Ok(id)
    }

    /// Applies new client state to a layer surface, such as a new size or exclusive zone.
    pub fn commit_layer_surface(
        &mut self,
        output: OutputId,
        id: LayerSurfaceId,
        state: LayerSurfaceState,
    ) -> anyhow::Result<()> {
        let idx = self.output_idx(output)?;
        let output = &mut self.outputs[idx];
        if !output.commit_layer_surface(&mut self.scene, id, state) {
            bail!("no layer surface {} on output {}", id.get(), output.name());
        }
        output.arrange_layers(&mut self.scene);
        self.transactions.request();
        Ok(())
    }

    pub fn unmap_layer_surface(&mut self, output: OutputId, id: LayerSurfaceId) -> anyhow::Result<()> {
        let idx = self.output_idx(output)?;
        let output = &mut self.outputs[idx];
        if output.unmap_layer_surface(&mut self.scene, id) {
            output.arrange_layers(&mut self.scene);
            self.transactions.request();
        }
        Ok(())
    }

    // =========================================================================
    // Session lock
    // =========================================================================

    /// Starts locking the session. Returns `false` if the request was refused.
    pub fn lock(&mut self, now: Duration) -> bool {
        let has_outputs = self.outputs.iter().any(Output::is_enabled);
        self.lock.lock(now, has_outputs)
    }

    /// Maps the lock surface for an output.
    pub fn map_lock_surface(&mut self, output: OutputId) -> anyhow::Result<()> {
        if self.lock.state() == LockManagerState::Unlocked {
            error!("tried to add a lock surface on an unlocked session");
            return Ok(());
        }

        let idx = self.output_idx(output)?;
        self.outputs[idx].map_lock_surface(&mut self.scene)
    }

    pub fn unlock(&mut self) {
        self.lock.unlock();
        for output in &mut self.outputs {
            output.destroy_lock_surface(&mut self.scene);
            output.show_locked(&mut self.scene, false);
        }
    }
}

/// Links a view into the pending state of an output, making sure it is shown there.
fn adopt_view(scene: &mut Scene, views: &mut Views, output: &mut Output, id: ViewId) {
    let tags = output.pending().tags;
    let layer = output.tree().layer(SceneLayer::Layout);

    let view = views.view_mut(id);
    if view.pending.tags & tags == 0 {
        view.pending.tags = tags;
    }
    view.output = Some(output.id());
    scene.reparent(view.node(), layer);
    scene.set_enabled(view.node(), false);
    output.add_view(id);
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root")
            .field("outputs", &self.outputs)
            .field("views", &self.views.len())
            .field("lock", &self.lock)
            .field("transactions", &self.transactions)
            .finish_non_exhaustive()
    }
}
