//! Fixed scene subtree of an output.
//!
//! ```text
//! output
//! ├── normal-content
//! │   ├── background-color   (full-size rect)
//! │   ├── background         (shell layer)
//! │   ├── bottom             (shell layer)
//! │   ├── layout             (tiled views)
//! │   ├── float              (floating views)
//! │   ├── top                (shell layer)
//! │   ├── fullscreen         (backdrop rect + fullscreen view)
//! │   ├── overlay            (shell layer)
//! │   └── popups
//! └── locked-content
//!     ├── lock-color         (full-size rect)
//!     └── lock-surface
//! ```
//!
//! The nodes are created once and only toggled, resized or reordered afterwards.

use rill_config::Color;
use smithay::utils::{Logical, Size};

use crate::layer::Layer;
use crate::scene::{NodeId, Scene};

/// Rendering layers of the normal content, in paint order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneLayer {
    Background,
    Bottom,
    Layout,
    Float,
    Top,
    Fullscreen,
    Overlay,
    Popups,
}

impl SceneLayer {
    pub const ALL: [SceneLayer; 8] = [
        SceneLayer::Background,
        SceneLayer::Bottom,
        SceneLayer::Layout,
        SceneLayer::Float,
        SceneLayer::Top,
        SceneLayer::Fullscreen,
        SceneLayer::Overlay,
        SceneLayer::Popups,
    ];

    fn idx(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            SceneLayer::Background => "background",
            SceneLayer::Bottom => "bottom",
            SceneLayer::Layout => "layout",
            SceneLayer::Float => "float",
            SceneLayer::Top => "top",
            SceneLayer::Fullscreen => "fullscreen",
            SceneLayer::Overlay => "overlay",
            SceneLayer::Popups => "popups",
        }
    }
}

impl From<Layer> for SceneLayer {
    fn from(layer: Layer) -> Self {
        match layer {
            Layer::Background => SceneLayer::Background,
            Layer::Bottom => SceneLayer::Bottom,
            Layer::Top => SceneLayer::Top,
            Layer::Overlay => SceneLayer::Overlay,
        }
    }
}

#[derive(Debug)]
pub struct OutputTree {
    root: NodeId,
    normal_content: NodeId,
    locked_content: NodeId,
    background_color: NodeId,
    layers: [NodeId; 8],
    /// Opaque backdrop behind a fullscreen view, disabled while nothing is fullscreen.
    fullscreen_backdrop: NodeId,
    lock_color: NodeId,
    lock_surface: NodeId,
}

impl OutputTree {
    /// Builds the subtree under `parent`.
    ///
    /// On failure nothing is left behind in the scene.
    pub fn new(
        scene: &mut Scene,
        parent: NodeId,
        size: Size<i32, Logical>,
        background_color: Color,
        lock_color: Color,
    ) -> anyhow::Result<Self> {
        let root = scene.create_tree(parent)?;
        scene.set_label(root, "output");

        match Self::populate(scene, root, size, background_color, lock_color) {
            Ok(tree) => Ok(tree),
            Err(err) => {
                scene.destroy(root);
                Err(err)
            }
        }
    }

    fn populate(
        scene: &mut Scene,
        root: NodeId,
        size: Size<i32, Logical>,
        background_color: Color,
        lock_color: Color,
    ) -> anyhow::Result<Self> {
        let normal_content = scene.create_tree(root)?;
        scene.set_label(normal_content, "normal-content");
        let locked_content = scene.create_tree(root)?;
        scene.set_label(locked_content, "locked-content");

        let background = scene.create_rect(normal_content, size, background_color)?;
        scene.set_label(background, "background-color");

        let mut layers = [normal_content; 8];
        for layer in SceneLayer::ALL {
            let node = scene.create_tree(normal_content)?;
            scene.set_label(node, layer.name());
            layers[layer.idx()] = node;
        }

        let fullscreen_backdrop = scene.create_rect(
            layers[SceneLayer::Fullscreen.idx()],
            size,
            Color::BLACK,
        )?;
        scene.set_label(fullscreen_backdrop, "fullscreen-backdrop");
        scene.set_enabled(fullscreen_backdrop, false);

        let lock_color = scene.create_rect(locked_content, size, lock_color)?;
        scene.set_label(lock_color, "lock-color");
        let lock_surface = scene.create_tree(locked_content)?;
        scene.set_label(lock_surface, "lock-surface");

        // The first frame has not been shown yet, so start out blanked.
        scene.set_enabled(normal_content, false);

        Ok(Self {
            root,
            normal_content,
            locked_content,
            background_color: background,
            layers,
            fullscreen_backdrop,
            lock_color,
            lock_surface,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn normal_content(&self) -> NodeId {
        self.normal_content
    }

    pub fn locked_content(&self) -> NodeId {
        self.locked_content
    }

    pub fn layer(&self, layer: SceneLayer) -> NodeId {
        self.layers[layer.idx()]
    }

    /// Subtree holding layer surfaces of the given shell layer.
    pub fn shell_layer(&self, layer: Layer) -> NodeId {
        self.layer(SceneLayer::from(layer))
    }

    pub fn fullscreen_backdrop(&self) -> NodeId {
        self.fullscreen_backdrop
    }

    pub fn lock_surface(&self) -> NodeId {
        self.lock_surface
    }

    /// Must be called whenever the effective resolution of the output changes.
    pub fn resize(&self, scene: &mut Scene, size: Size<i32, Logical>) {
        scene.set_size(self.background_color, size);
        scene.set_size(self.fullscreen_backdrop, size);
        scene.set_size(self.lock_color, size);
    }

    pub fn set_fullscreen_backdrop(&self, scene: &mut Scene, enabled: bool) {
        scene.set_enabled(self.fullscreen_backdrop, enabled);
    }

    /// Switches between showing normal content and locked content.
    pub fn show_locked(&self, scene: &mut Scene, locked: bool) {
        scene.set_enabled(self.normal_content, !locked);
        scene.set_enabled(self.locked_content, locked);
    }

    pub fn is_locked_content_enabled(&self, scene: &Scene) -> bool {
        scene.is_enabled(self.locked_content)
    }

    pub fn set_enabled(&self, scene: &mut Scene, enabled: bool) {
        scene.set_enabled(self.root, enabled);
    }

    pub fn destroy(self, scene: &mut Scene) {
        scene.destroy(self.root);
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    fn tree(scene: &mut Scene) -> OutputTree {
        let root = scene.root();
        OutputTree::new(
            scene,
            root,
            Size::from((1920, 1080)),
            Color::BLACK,
            Color::BLACK,
        )
        .unwrap()
    }

    #[test]
    fn topology() {
        let mut scene = Scene::new();
        let tree = tree(&mut scene);

        assert_snapshot!(scene.dump(tree.root()), @r"
        output
          normal-content [disabled]
            background-color 1920x1080
            background
            bottom
            layout
            float
            top
            fullscreen
              fullscreen-backdrop 1920x1080 [disabled]
            overlay
            popups
          locked-content
            lock-color 1920x1080
            lock-surface
        ");
    }

    #[test]
    fn resize_updates_rects() {
        let mut scene = Scene::new();
        let tree = tree(&mut scene);

        tree.resize(&mut scene, Size::from((1280, 720)));
        assert_eq!(
            scene.size(tree.fullscreen_backdrop()),
            Some(Size::from((1280, 720)))
        );
        assert_eq!(
            scene.size(tree.background_color),
            Some(Size::from((1280, 720)))
        );
        assert_eq!(scene.size(tree.lock_color), Some(Size::from((1280, 720))));
    }

    #[test]
    fn shell_layer_lookup() {
        let mut scene = Scene::new();
        let tree = tree(&mut scene);

        assert_eq!(
            tree.shell_layer(Layer::Top),
            tree.layer(SceneLayer::Top)
        );
        assert_eq!(
            tree.shell_layer(Layer::Overlay),
            tree.layer(SceneLayer::Overlay)
        );
        assert_eq!(scene.label(tree.shell_layer(Layer::Bottom)), Some("bottom"));
    }

    #[test]
    fn show_locked_is_exclusive() {
        let mut scene = Scene::new();
        let tree = tree(&mut scene);

        tree.show_locked(&mut scene, false);
        assert!(scene.is_enabled(tree.normal_content()));
        assert!(!tree.is_locked_content_enabled(&scene));

        tree.show_locked(&mut scene, true);
        assert!(!scene.is_enabled(tree.normal_content()));
        assert!(tree.is_locked_content_enabled(&scene));
    }

    #[test]
    fn failed_build_leaves_nothing_behind() {
        // Root plus a few nodes, not enough for the full subtree.
        let mut scene = Scene::with_node_limit(6);
        let root = scene.root();
        let res = OutputTree::new(
            &mut scene,
            root,
            Size::from((100, 100)),
            Color::BLACK,
            Color::BLACK,
        );

        assert!(res.is_err());
        assert_eq!(scene.len(), 1);
    }
}
