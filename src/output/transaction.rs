//! The output side of transactions.
//!
//! A transaction moves an output from `pending` through `inflight` to `current`. Capturing
//! freezes the pending state and sends the layout demand and configures; once the layout
//! generator and every configured view answered, the output is settled, and the coordinator
//! commits all participating outputs together.

use smithay::utils::{Logical, Rectangle};

use super::{InflightDemand, Output, OutputId, SceneLayer};
use crate::layout::LayoutDemand;
use crate::scene::Scene;
use crate::view::{View, ViewId, Views};

/// State shared by all participants of a transaction.
pub struct TxContext<'a> {
    pub scene: &'a mut Scene,
    pub views: &'a mut Views,
}

/// Contract between a participant and the transaction coordinator.
pub trait TransactionParticipant {
    fn id(&self) -> OutputId;

    /// Whether the participant takes part in new transactions.
    fn is_active(&self) -> bool;

    /// Freezes the pending state into inflight and asks everyone involved to catch up.
    ///
    /// Must not be called while a previous capture is not committed.
    fn begin_capture(&mut self, cx: &mut TxContext<'_>);

    /// Whether everything the inflight state waits on has answered.
    fn is_settled(&self, views: &Views) -> bool;

    /// Makes the inflight state current and updates the scene to match.
    fn commit_inflight(&mut self, cx: &mut TxContext<'_>);

    /// Drops the inflight state without committing it.
    fn cancel_inflight(&mut self, views: &mut Views);
}

impl TransactionParticipant for Output {
    fn id(&self) -> OutputId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.enabled
    }

    fn begin_capture(&mut self, cx: &mut TxContext<'_>) {
        let _span = tracy_client::span!("Output::begin_capture");

        assert!(
            !self.in_transaction,
            "{}: capture started while a transaction is outstanding",
            self.name
        );
        assert!(self.inflight.layout_demand.is_none());

        self.inflight.tags = self.pending.tags;
        self.inflight.focus_stack.relink_from(&self.pending.focus_stack);
        self.inflight.wm_stack.relink_from(&self.pending.wm_stack);
        for view in &self.inflight.focus_stack {
            cx.views.capture(view);
        }
        self.in_transaction = true;

        let tags = self.inflight.tags;
        let fullscreen = self.inflight.focus_stack.iter().find(|id| {
            let view = cx.views.view(*id);
            view.inflight.tags & tags != 0 && view.inflight.fullscreen
        });
        self.inflight.fullscreen = fullscreen;
        if let Some(id) = fullscreen {
            cx.views.view_mut(id).inflight.geometry = self.full_area();
        }

        trace!(
            "{}: captured tags={tags:#b} views={} fullscreen={fullscreen:?}",
            self.name,
            self.inflight.focus_stack.len()
        );

        self.send_layout_demand(cx);
        if self.inflight.layout_demand.is_none() {
            self.send_configures(cx.views);
        }
    }

    fn is_settled(&self, views: &Views) -> bool {
        if self.inflight.layout_demand.is_some() {
            return false;
        }

        self.inflight
            .wm_stack
            .iter()
            .all(|id| !views.get(id).is_some_and(View::is_awaiting_ack))
    }

    fn commit_inflight(&mut self, cx: &mut TxContext<'_>) {
        let _span = tracy_client::span!("Output::commit_inflight");

        if let Some(demand) = self.inflight.layout_demand.take() {
            warn!(
                "{}: layout demand {} timed out, committing without it",
                self.name, demand.serial
            );
        }

        self.current.tags = self.inflight.tags;
        self.current.fullscreen = self.inflight.fullscreen;

        let scene = &mut *cx.scene;
        // Stacking goes bottom to top, so that the most recently focused view ends up on top.
        for id in self.inflight.focus_stack.iter().rev() {
            cx.views.commit(id);
            cx.views.forget_configure(id);

            let view = cx.views.view(id);
            let layer = if self.current.fullscreen == Some(id) {
                SceneLayer::Fullscreen
            } else if view.current.float {
                SceneLayer::Float
            } else {
                SceneLayer::Layout
            };

            let node = view.node();
            scene.reparent(node, self.tree.layer(layer));
            scene.raise_to_top(node);
            scene.set_position(node, view.current.geometry.loc);
            scene.set_size(node, view.current.geometry.size);
            scene.set_enabled(node, view.current.tags & self.current.tags != 0);
        }

        self.tree
            .set_fullscreen_backdrop(scene, self.current.fullscreen.is_some());

        self.inflight.focus_stack.clear();
        self.inflight.wm_stack.clear();
        self.in_transaction = false;

        trace!(
            "{}: committed tags={:#b} fullscreen={:?}",
            self.name,
            self.current.tags,
            self.current.fullscreen
        );
    }

    fn cancel_inflight(&mut self, views: &mut Views) {
        if !self.in_transaction {
            return;
        }

        debug!("{}: cancelling inflight state", self.name);
        for id in &self.inflight.wm_stack {
            views.forget_configure(id);
        }
        self.inflight.focus_stack.clear();
        self.inflight.wm_stack.clear();
        self.inflight.layout_demand = None;
        self.in_transaction = false;
    }
}

impl Output {
    fn send_layout_demand(&mut self, cx: &mut TxContext<'_>) {
        let Some(layout_id) = self.active_layout else {
            return;
        };

        let tags = self.inflight.tags;
        let fullscreen = self.inflight.fullscreen;
        let views: Vec<ViewId> = self
            .inflight
            .wm_stack
            .iter()
            .filter(|id| {
                let view = cx.views.view(*id);
                view.inflight.tags & tags != 0 && !view.inflight.float && fullscreen != Some(*id)
            })
            .collect();
        if views.is_empty() {
            return;
        }

        self.last_layout_serial = self.last_layout_serial.wrapping_add(1);
        let demand = LayoutDemand {
            serial: self.last_layout_serial,
            output: self.id,
            tags,
            usable_area: self.usable_area,
            views,
        };

        let Some(layout) = self.layouts.iter_mut().find(|l| l.id() == layout_id) else {
            error!("{}: active layout {layout_id:?} is not registered", self.name);
            return;
        };

        trace!(
            "{}: sending layout demand {} for {} views",
            self.name,
            demand.serial,
            demand.views.len()
        );
        let answer = layout.demand(&demand);

        self.inflight.layout_demand = Some(InflightDemand {
            serial: demand.serial,
            layout: layout_id,
            views: demand.views,
            usable_area: demand.usable_area,
        });

        if let Some(boxes) = answer {
            let serial = self.last_layout_serial;
            self.commit_layout(cx.views, serial, &boxes);
        }
    }

    /// Applies the answer of the layout generator to the inflight demand.
    ///
    /// Boxes are relative to the usable area. Answers to stale demands and answers with the wrong
    /// number of boxes are ignored. Returns whether the answer was accepted.
    pub fn commit_layout(
        &mut self,
        views: &mut Views,
        serial: u32,
        boxes: &[Rectangle<i32, Logical>],
    ) -> bool {
        let Some(demand) = &self.inflight.layout_demand else {
            warn!("{}: ignoring layout commit without a demand", self.name);
            return false;
        };

        if demand.serial != serial {
            warn!(
                "{}: ignoring layout commit for stale serial {serial}, expected {}",
                self.name, demand.serial
            );
            return false;
        }

        if demand.views.len() != boxes.len() {
            warn!(
                "{}: layout proposed {} boxes for {} views",
                self.name,
                boxes.len(),
                demand.views.len()
            );
            return false;
        }

        let offset = demand.usable_area.loc;
        for (id, rect) in demand.views.iter().zip(boxes) {
            // Gone or moved elsewhere since the demand was sent.
            if !self.inflight.wm_stack.contains(*id) {
                continue;
            }
            let Some(view) = views.get_mut(*id) else {
                continue;
            };

            let geometry = Rectangle::new(rect.loc + offset, rect.size);
            view.pending.geometry = geometry;
            view.inflight.geometry = geometry;
        }

        self.inflight.layout_demand = None;
        self.send_configures(views);
        true
    }

    fn send_configures(&self, views: &mut Views) {
        let tags = self.inflight.tags;
        for id in &self.inflight.wm_stack {
            if views.view(id).inflight.tags & tags != 0 {
                views.configure(id);
            }
        }
    }
}
