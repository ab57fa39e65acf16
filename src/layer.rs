//! Layer-shell style surfaces.
//!
//! A layer surface is anchored to edges of an output, lives in one of four shell layers and may
//! reserve an exclusive zone along one edge. The geometry negotiation follows the layer-shell
//! protocol: the surface gets a box computed from its anchors, margins and desired size against
//! the area it is allowed to occupy, and, if it is exclusive, shrinks the usable area of the
//! output.

use bitflags::bitflags;
use smithay::utils::{Logical, Point, Rectangle, Size};

use crate::scene::NodeId;
use crate::utils::id::IdCounter;

static LAYER_SURFACE_ID_COUNTER: IdCounter = IdCounter::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerSurfaceId(u64);

impl LayerSurfaceId {
    pub fn next() -> LayerSurfaceId {
        LayerSurfaceId(LAYER_SURFACE_ID_COUNTER.next())
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Background,
    Bottom,
    Top,
    Overlay,
}

impl Layer {
    /// Shell layers in the order they are arranged.
    pub const ALL: [Layer; 4] = [Layer::Background, Layer::Bottom, Layer::Top, Layer::Overlay];
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Anchor: u32 {
        const TOP = 1;
        const BOTTOM = 2;
        const LEFT = 4;
        const RIGHT = 8;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Margins {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

/// Client-requested state of a layer surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerSurfaceState {
    pub layer: Layer,
    pub anchor: Anchor,
    /// Positive values reserve space, zero means "avoid other exclusive zones", -1 means
    /// "extend under other exclusive zones".
    pub exclusive_zone: i32,
    pub margin: Margins,
    /// Zero on an axis means "stretch between the anchors on that axis".
    pub desired_size: Size<i32, Logical>,
}

impl LayerSurfaceState {
    pub fn new(layer: Layer) -> Self {
        Self {
            layer,
            anchor: Anchor::empty(),
            exclusive_zone: 0,
            margin: Margins::default(),
            desired_size: Size::default(),
        }
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive_zone > 0
    }

    /// Edge along which the exclusive zone is reserved.
    ///
    /// Only surfaces anchored to a single edge, or to one edge and both perpendicular ones,
    /// reserve space.
    pub fn exclusive_edge(&self) -> Option<Anchor> {
        if !self.is_exclusive() {
            return None;
        }

        let horiz = Anchor::LEFT | Anchor::RIGHT;
        let vert = Anchor::TOP | Anchor::BOTTOM;
        let anchor = self.anchor;

        if anchor == Anchor::TOP || anchor == Anchor::TOP | horiz {
            Some(Anchor::TOP)
        } else if anchor == Anchor::BOTTOM || anchor == Anchor::BOTTOM | horiz {
            Some(Anchor::BOTTOM)
        } else if anchor == Anchor::LEFT || anchor == Anchor::LEFT | vert {
            Some(Anchor::LEFT)
        } else if anchor == Anchor::RIGHT || anchor == Anchor::RIGHT | vert {
            Some(Anchor::RIGHT)
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct LayerSurface {
    id: LayerSurfaceId,
    state: LayerSurfaceState,
    /// Geometry negotiated during the last arrangement, relative to the output.
    geometry: Rectangle<i32, Logical>,
    /// Size sent in the last configure, if any.
    configured_size: Option<Size<i32, Logical>>,
    /// Set when the surface asked for an impossible geometry.
    closed: bool,
    node: NodeId,
    popups: NodeId,
}

impl LayerSurface {
    pub fn new(state: LayerSurfaceState, node: NodeId, popups: NodeId) -> Self {
        Self {
            id: LayerSurfaceId::next(),
            state,
            geometry: Rectangle::default(),
            configured_size: None,
            closed: false,
            node,
            popups,
        }
    }

    pub fn id(&self) -> LayerSurfaceId {
        self.id
    }

    pub fn state(&self) -> &LayerSurfaceState {
        &self.state
    }

    pub fn set_state(&mut self, state: LayerSurfaceState) {
        self.state = state;
    }

    pub fn layer(&self) -> Layer {
        self.state.layer
    }

    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        self.geometry
    }

    pub fn configured_size(&self) -> Option<Size<i32, Logical>> {
        self.configured_size
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn popups(&self) -> NodeId {
        self.popups
    }

    /// Negotiates the surface geometry and shrinks `usable_area` by its exclusive zone.
    ///
    /// Returns `false` if the requested geometry cannot be satisfied, in which case the surface
    /// is marked as closed and `usable_area` is left alone.
    pub fn configure(
        &mut self,
        full_area: Rectangle<i32, Logical>,
        usable_area: &mut Rectangle<i32, Logical>,
    ) -> bool {
        let state = &self.state;
        let bounds = if state.exclusive_zone == -1 {
            full_area
        } else {
            *usable_area
        };

        let Some(geometry) = compute_geometry(state, bounds) else {
            self.closed = true;
            return false;
        };

        self.geometry = geometry;
        if self.configured_size != Some(geometry.size) {
            trace!(
                "configuring layer surface {:?} to {}x{}",
                self.id,
                geometry.size.w,
                geometry.size.h
            );
            self.configured_size = Some(geometry.size);
        }

        apply_exclusive_zone(state, usable_area);

        true
    }
}

/// Margins and sizes come from clients, so all arithmetic here saturates.
fn compute_geometry(
    state: &LayerSurfaceState,
    bounds: Rectangle<i32, Logical>,
) -> Option<Rectangle<i32, Logical>> {
    let anchor = state.anchor;
    let margin = state.margin;
    let mut size = state.desired_size;
    let mut loc = Point::<i32, Logical>::default();

    let both_horiz = Anchor::LEFT | Anchor::RIGHT;
    if size.w == 0 {
        loc.x = bounds.loc.x;
    } else if anchor.contains(both_horiz) {
        loc.x = centered(bounds.loc.x, bounds.size.w, size.w);
    } else if anchor.contains(Anchor::LEFT) {
        loc.x = bounds.loc.x;
    } else if anchor.contains(Anchor::RIGHT) {
        loc.x = bounds.loc.x.saturating_add(bounds.size.w.saturating_sub(size.w));
    } else {
        loc.x = centered(bounds.loc.x, bounds.size.w, size.w);
    }

    let both_vert = Anchor::TOP | Anchor::BOTTOM;
    if size.h == 0 {
        loc.y = bounds.loc.y;
    } else if anchor.contains(both_vert) {
        loc.y = centered(bounds.loc.y, bounds.size.h, size.h);
    } else if anchor.contains(Anchor::TOP) {
        loc.y = bounds.loc.y;
    } else if anchor.contains(Anchor::BOTTOM) {
        loc.y = bounds.loc.y.saturating_add(bounds.size.h.saturating_sub(size.h));
    } else {
        loc.y = centered(bounds.loc.y, bounds.size.h, size.h);
    }

    if size.w == 0 {
        loc.x = loc.x.saturating_add(margin.left);
        size.w = bounds
            .size
            .w
            .saturating_sub(margin.left.saturating_add(margin.right));
    } else if anchor.contains(both_horiz) {
        // Centered between both edges, margins do not apply.
    } else if anchor.contains(Anchor::LEFT) {
        loc.x = loc.x.saturating_add(margin.left);
    } else if anchor.contains(Anchor::RIGHT) {
        loc.x = loc.x.saturating_sub(margin.right);
    }

    if size.h == 0 {
        loc.y = loc.y.saturating_add(margin.top);
        size.h = bounds
            .size
            .h
            .saturating_sub(margin.top.saturating_add(margin.bottom));
    } else if anchor.contains(both_vert) {
        // Centered between both edges, margins do not apply.
    } else if anchor.contains(Anchor::TOP) {
        loc.y = loc.y.saturating_add(margin.top);
    } else if anchor.contains(Anchor::BOTTOM) {
        loc.y = loc.y.saturating_sub(margin.bottom);
    }

    if size.w <= 0 || size.h <= 0 {
        return None;
    }

    Some(Rectangle::new(loc, size))
}

fn centered(start: i32, available: i32, size: i32) -> i32 {
    start.saturating_add((available / 2).saturating_sub(size / 2))
}

fn apply_exclusive_zone(state: &LayerSurfaceState, usable_area: &mut Rectangle<i32, Logical>) {
    let Some(edge) = state.exclusive_edge() else {
        return;
    };

    // Never reserve more than what is left, nor give space back through negative margins.
    let reserve = |margin: i32, available: i32| {
        state
            .exclusive_zone
            .saturating_add(margin)
            .clamp(0, available.max(0))
    };

    let margin = state.margin;
    if edge == Anchor::TOP {
        let amount = reserve(margin.top, usable_area.size.h);
        usable_area.loc.y += amount;
        usable_area.size.h -= amount;
    } else if edge == Anchor::BOTTOM {
        usable_area.size.h -= reserve(margin.bottom, usable_area.size.h);
    } else if edge == Anchor::LEFT {
        let amount = reserve(margin.left, usable_area.size.w);
        usable_area.loc.x += amount;
        usable_area.size.w -= amount;
    } else if edge == Anchor::RIGHT {
        usable_area.size.w -= reserve(margin.right, usable_area.size.w);
    }
}
