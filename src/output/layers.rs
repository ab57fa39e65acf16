use super::{Output, SceneLayer};
use crate::layer::{Layer, LayerSurface, LayerSurfaceId, LayerSurfaceState};
use crate::scene::Scene;

impl Output {
    /// Maps a layer surface on this output.
    ///
    /// The caller must re-arrange the layers and request a transaction afterwards.
    pub fn map_layer_surface(
        &mut self,
        scene: &mut Scene,
        state: LayerSurfaceState,
    ) -> anyhow::Result<LayerSurfaceId> {
        let node = scene.create_tree(self.tree.shell_layer(state.layer))?;
        let popups = match scene.create_tree(self.tree.layer(SceneLayer::Popups)) {
            Ok(popups) => popups,
            Err(err) => {
                scene.destroy(node);
                return Err(err);
            }
        };

        let surface = LayerSurface::new(state, node, popups);
        scene.set_label(node, format!("layer-surface-{}", surface.id().get()));
        scene.set_label(popups, format!("layer-popups-{}", surface.id().get()));

        let id = surface.id();
        debug!("{}: mapped layer surface {id:?} on {:?}", self.name, state.layer);
        self.layer_surfaces.push(surface);
        Ok(id)
    }

    /// Applies new client state to a layer surface.
    pub fn commit_layer_surface(
        &mut self,
        scene: &mut Scene,
        id: LayerSurfaceId,
        state: LayerSurfaceState,
    ) -> bool {
        let Some(surface) = self.layer_surfaces.iter_mut().find(|s| s.id() == id) else {
            return false;
        };

        if surface.layer() != state.layer {
            scene.reparent(surface.node(), self.tree.shell_layer(state.layer));
        }
        surface.set_state(state);
        true
    }

    pub fn unmap_layer_surface(&mut self, scene: &mut Scene, id: LayerSurfaceId) -> bool {
        let Some(idx) = self.layer_surfaces.iter().position(|s| s.id() == id) else {
            return false;
        };

        let surface = self.layer_surfaces.remove(idx);
        scene.destroy(surface.node());
        scene.destroy(surface.popups());
        debug!("{}: unmapped layer surface {id:?}", self.name);
        true
    }

    /// Negotiates the geometry of every layer surface and recomputes the usable area.
    ///
    /// Exclusive surfaces claim their zones first so that the rest are arranged against what is
    /// left, whatever layer they are on. Surfaces that cannot be satisfied are closed.
    pub fn arrange_layers(&mut self, scene: &mut Scene) {
        let _span = tracy_client::span!("Output::arrange_layers");

        let full_area = self.full_area();
        let mut usable_area = full_area;

        for exclusive in [true, false] {
            for layer in Layer::ALL {
                for surface in &mut self.layer_surfaces {
                    if surface.layer() != layer || surface.state().is_exclusive() != exclusive {
                        continue;
                    }

                    if !surface.configure(full_area, &mut usable_area) {
                        continue;
                    }

                    let loc = surface.geometry().loc;
                    scene.set_position(surface.node(), loc);
                    scene.set_position(surface.popups(), loc);
                }
            }
        }

        let name = &self.name;
        self.layer_surfaces.retain(|surface| {
            if surface.is_closed() {
                warn!("{name}: closing layer surface {:?} with impossible geometry", surface.id());
                scene.destroy(surface.node());
                scene.destroy(surface.popups());
                false
            } else {
                true
            }
        });

        if usable_area != self.usable_area {
            trace!("{name}: usable area {:?} -> {usable_area:?}", self.usable_area);
            self.usable_area = usable_area;
        }
    }
}
