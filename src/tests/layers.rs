use smithay::utils::{Point, Size};

use super::fixture::*;
use crate::backend::DeviceEvent;
use crate::layer::{Anchor, Layer, LayerSurfaceId, LayerSurfaceState};

fn top_bar(height: i32) -> LayerSurfaceState {
    LayerSurfaceState {
        anchor: Anchor::TOP | Anchor::LEFT | Anchor::RIGHT,
        exclusive_zone: height,
        desired_size: Size::from((0, height)),
        ..LayerSurfaceState::new(Layer::Top)
    }
}

fn wallpaper() -> LayerSurfaceState {
    LayerSurfaceState {
        anchor: Anchor::all(),
        exclusive_zone: -1,
        ..LayerSurfaceState::new(Layer::Background)
    }
}

#[test]
fn bar_shrinks_the_layout_area() {
    let mut f = Fixture::new();
    let id = f.add_output("DP-1");
    f.register_remote_layout(id, "rivertile");

    let bar = f.root.map_layer_surface(id, top_bar(40)).unwrap();
    f.refresh();
    assert_eq!(f.output(id).usable_area(), rect(0, 40, 1920, 1040));
    let surface = f.output(id).layer_surface(bar).unwrap();
    assert_eq!(surface.geometry(), rect(0, 0, 1920, 40));
    let top = f.output(id).tree().shell_layer(Layer::Top);
    assert_eq!(f.root.scene().parent(surface.node()), Some(top));

    let view = f.add_view(id, 1);
    let demands = f.take_demands();
    assert_eq!(demands[0].usable_area, rect(0, 40, 1920, 1040));
    f.root
        .commit_layout(id, demands[0].serial, &[rect(0, 0, 1920, 1040)])
        .unwrap();
    f.ack(view);

    let node = f.root.views().view(view).node();
    assert_eq!(f.root.views().view(view).current.geometry, rect(0, 40, 1920, 1040));
    assert_eq!(f.root.scene().position(node), Point::from((0, 40)));
}

#[test]
fn dropping_the_exclusive_zone_gives_space_back() {
    let mut f = Fixture::new();
    let id = f.add_output("DP-1");
    f.register_remote_layout(id, "rivertile");
    let bar = f.root.map_layer_surface(id, top_bar(40)).unwrap();
    let view = f.add_view(id, 1);
    f.settle();
    assert_eq!(f.root.views().view(view).current.geometry, rect(0, 40, 1920, 1040));

    let state = LayerSurfaceState {
        exclusive_zone: 0,
        ..top_bar(40)
    };
    f.root.commit_layer_surface(id, bar, state).unwrap();
    assert_eq!(f.output(id).usable_area(), rect(0, 0, 1920, 1080));

    f.refresh();
    f.settle();
    assert_eq!(f.root.views().view(view).current.geometry, rect(0, 0, 1920, 1080));
}

#[test]
fn unmapping_gives_space_back() {
    let mut f = Fixture::new();
    let id = f.add_output("DP-1");
    let bar = f.root.map_layer_surface(id, top_bar(40)).unwrap();
    let node = f.output(id).layer_surface(bar).unwrap().node();

    f.root.unmap_layer_surface(id, bar).unwrap();
    assert_eq!(f.output(id).usable_area(), rect(0, 0, 1920, 1080));
    assert!(f.output(id).layer_surface(bar).is_none());
    assert!(!f.root.scene().contains(node));

    // Unmapping twice is harmless.
    f.root.unmap_layer_surface(id, bar).unwrap();
}

#[test]
fn wallpaper_ignores_exclusive_zones() {
    let mut f = Fixture::new();
    let id = f.add_output("DP-1");
    f.root.map_layer_surface(id, top_bar(40)).unwrap();
    let wallpaper = f.root.map_layer_surface(id, wallpaper()).unwrap();

    let surface = f.output(id).layer_surface(wallpaper).unwrap();
    assert_eq!(surface.geometry(), rect(0, 0, 1920, 1080));
    assert_eq!(f.output(id).usable_area(), rect(0, 40, 1920, 1040));
}

#[test]
fn mode_change_rearranges_layers() {
    let mut f = Fixture::new();
    let id = f.add_output("DP-1");
    let bar = f.root.map_layer_surface(id, top_bar(40)).unwrap();

    f.dispatch(DeviceEvent::ModeChanged {
        output: id,
        mode: mode(1280, 720, 60),
    });
    assert_eq!(f.output(id).usable_area(), rect(0, 40, 1280, 680));
    let surface = f.output(id).layer_surface(bar).unwrap();
    assert_eq!(surface.geometry(), rect(0, 0, 1280, 40));
    assert_eq!(surface.configured_size(), Some(Size::from((1280, 40))));
}

#[test]
fn unknown_layer_surface_is_an_error() {
    let mut f = Fixture::new();
    let id = f.add_output("DP-1");

    let res = f
        .root
        .commit_layer_surface(id, LayerSurfaceId::next(), top_bar(40));
    assert!(res.is_err());
}

#[test]
fn layer_surfaces_go_away_with_their_output() {
    let mut f = Fixture::new();
    let a = f.add_output("DP-1");
    let b = f.add_output("DP-2");
    let bar = f.root.map_layer_surface(b, top_bar(40)).unwrap();
    let node = f.output(b).layer_surface(bar).unwrap().node();

    f.dispatch(DeviceEvent::Removed { output: b });
    assert!(!f.root.scene().contains(node));
    assert_eq!(f.output(a).usable_area(), rect(0, 0, 1920, 1080));
}
