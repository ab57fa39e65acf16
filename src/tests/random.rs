use std::time::Duration;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use smithay::utils::Size;

use super::fixture::*;
use crate::backend::DeviceEvent;
use crate::layer::{Anchor, Layer, LayerSurfaceId, LayerSurfaceState};
use crate::layout::{LayoutId, TileLayout};
use crate::lock::LockManagerState;
use crate::output::OutputId;
use crate::view::ViewId;

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Op {
    AddOutput(#[proptest(strategy = "0..3usize")] usize),
    RemoveOutput(#[proptest(strategy = "0..3usize")] usize),
    EnableOutput {
        #[proptest(strategy = "0..3usize")]
        output: usize,
        enabled: bool,
    },
    ChangeMode {
        #[proptest(strategy = "0..3usize")]
        output: usize,
        small: bool,
    },
    SetScale {
        #[proptest(strategy = "0..3usize")]
        output: usize,
        #[proptest(strategy = "1..=2u8")]
        scale: u8,
    },
    AddView {
        #[proptest(strategy = "0..3usize")]
        output: usize,
        #[proptest(strategy = "0..8u32")]
        tags: u32,
    },
    RemoveView(#[proptest(strategy = "0..6usize")] usize),
    FocusView(#[proptest(strategy = "0..6usize")] usize),
    SetViewTags {
        #[proptest(strategy = "0..6usize")]
        view: usize,
        #[proptest(strategy = "0..8u32")]
        tags: u32,
    },
    SetViewFloat {
        #[proptest(strategy = "0..6usize")]
        view: usize,
        float: bool,
    },
    SetViewFullscreen {
        #[proptest(strategy = "0..6usize")]
        view: usize,
        fullscreen: bool,
    },
    SendViewToOutput {
        #[proptest(strategy = "0..6usize")]
        view: usize,
        #[proptest(strategy = "0..3usize")]
        output: usize,
    },
    AckView(#[proptest(strategy = "0..6usize")] usize),
    AckAll,
    SetTags {
        #[proptest(strategy = "0..3usize")]
        output: usize,
        #[proptest(strategy = "0..8u32")]
        tags: u32,
    },
    ToggleTags {
        #[proptest(strategy = "0..3usize")]
        output: usize,
        #[proptest(strategy = "0..8u32")]
        mask: u32,
    },
    FocusPreviousTags(#[proptest(strategy = "0..3usize")] usize),
    RegisterLayout {
        #[proptest(strategy = "0..3usize")]
        output: usize,
        remote: bool,
    },
    UnregisterLayout(#[proptest(strategy = "0..4usize")] usize),
    SetLayoutNamespace {
        #[proptest(strategy = "0..3usize")]
        output: usize,
        custom: bool,
    },
    AnswerLayouts,
    MapBar {
        #[proptest(strategy = "0..3usize")]
        output: usize,
        #[proptest(strategy = "0..60i32")]
        height: i32,
    },
    UnmapLayerSurface(#[proptest(strategy = "0..4usize")] usize),
    Frame {
        #[proptest(strategy = "0..3usize")]
        output: usize,
        presented: bool,
    },
    Lock,
    MapLockSurface(#[proptest(strategy = "0..3usize")] usize),
    Unlock,
    Advance(#[proptest(strategy = "0..1500u64")] u64),
}

#[derive(Default)]
struct Handles {
    outputs: [Option<OutputId>; 3],
    views: Vec<ViewId>,
    layouts: Vec<(OutputId, LayoutId)>,
    layer_surfaces: Vec<(OutputId, LayerSurfaceId)>,
}

impl Handles {
    /// Output handle for the index, stale if the output was removed.
    fn output(&self, idx: usize) -> OutputId {
        self.outputs[idx].unwrap_or(OutputId::next())
    }

    fn view(&self, idx: usize) -> Option<ViewId> {
        self.views.get(idx).copied()
    }
}

fn output_name(idx: usize) -> String {
    format!("DP-{idx}")
}

fn bar(height: i32) -> LayerSurfaceState {
    LayerSurfaceState {
        anchor: Anchor::TOP | Anchor::LEFT | Anchor::RIGHT,
        exclusive_zone: height,
        desired_size: Size::from((0, height)),
        ..LayerSurfaceState::new(Layer::Top)
    }
}

impl Op {
    fn apply(self, f: &mut Fixture, h: &mut Handles) {
        match self {
            Op::AddOutput(idx) => {
                if h.outputs[idx].is_some() {
                    return;
                }

                let state = DeviceState {
                    modes: vec![mode(1920, 1080, 60), mode(1280, 720, 60)],
                    ..DeviceState::default()
                };
                h.outputs[idx] = Some(f.add_output_with(&output_name(idx), state));
            }
            Op::RemoveOutput(idx) => {
                if let Some(id) = h.outputs[idx].take() {
                    f.dispatch(DeviceEvent::Removed { output: id });
                }
            }
            Op::EnableOutput { output, enabled } => {
                let output = h.output(output);
                let _ = f
                    .root
                    .dispatch(DeviceEvent::EnableChanged { output, enabled }, f.now);
            }
            Op::ChangeMode { output, small } => {
                let mode = if small {
                    mode(1280, 720, 60)
                } else {
                    mode(1920, 1080, 60)
                };
                let output = h.output(output);
                let _ = f
                    .root
                    .dispatch(DeviceEvent::ModeChanged { output, mode }, f.now);
            }
            Op::SetScale { output, scale } => {
                let _ = f.root.set_output_scale(h.output(output), f64::from(scale));
            }
            Op::AddView { output, tags } => {
                if let Ok(id) = f.root.add_view(h.output(output), tags) {
                    h.views.push(id);
                }
            }
            Op::RemoveView(idx) => {
                if let Some(id) = h.view(idx) {
                    f.root.remove_view(id);
                }
            }
            Op::FocusView(idx) => {
                if let Some(id) = h.view(idx) {
                    let _ = f.root.focus_view(id);
                }
            }
            Op::SetViewTags { view, tags } => {
                if let Some(id) = h.view(view) {
                    let _ = f.root.set_view_tags(id, tags);
                }
            }
            Op::SetViewFloat { view, float } => {
                if let Some(id) = h.view(view) {
                    let _ = f.root.set_view_float(id, float);
                }
            }
            Op::SetViewFullscreen { view, fullscreen } => {
                if let Some(id) = h.view(view) {
                    let _ = f.root.set_view_fullscreen(id, fullscreen);
                }
            }
            Op::SendViewToOutput { view, output } => {
                if let Some(id) = h.view(view) {
                    let _ = f.root.send_view_to_output(id, h.output(output));
                }
            }
            Op::AckView(idx) => {
                let Some(id) = h.view(idx) else {
                    return;
                };
                let serial = f.root.views().get(id).and_then(|view| view.awaiting_serial());
                if let Some(serial) = serial {
                    f.root.ack_configure(id, serial);
                }
            }
            Op::AckAll => f.ack_all(),
            Op::SetTags { output, tags } => {
                let _ = f.root.set_tags(h.output(output), tags);
            }
            Op::ToggleTags { output, mask } => {
                let _ = f.root.toggle_tags(h.output(output), mask);
            }
            Op::FocusPreviousTags(output) => {
                let _ = f.root.focus_previous_tags(h.output(output));
            }
            Op::RegisterLayout { output, remote } => {
                let output = h.output(output);
                if f.root.output(output).is_none() {
                    return;
                }

                let id = if remote {
                    f.register_remote_layout(output, "rivertile")
                } else {
                    let layout = TileLayout::new("rivertile");
                    match f.root.register_layout(output, Box::new(layout)) {
                        Ok(id) => id,
                        Err(_) => return,
                    }
                };
                h.layouts.push((output, id));
            }
            Op::UnregisterLayout(idx) => {
                if idx < h.layouts.len() {
                    let (output, layout) = h.layouts.remove(idx);
                    let _ = f.root.unregister_layout(output, layout);
                }
            }
            Op::SetLayoutNamespace { output, custom } => {
                let namespace = custom.then(|| String::from("custom"));
                let _ = f.root.set_layout_namespace(h.output(output), namespace);
            }
            Op::AnswerLayouts => f.answer_layouts(),
            Op::MapBar { output, height } => {
                let output = h.output(output);
                if let Ok(id) = f.root.map_layer_surface(output, bar(height)) {
                    h.layer_surfaces.push((output, id));
                }
            }
            Op::UnmapLayerSurface(idx) => {
                if idx < h.layer_surfaces.len() {
                    let (output, id) = h.layer_surfaces.remove(idx);
                    let _ = f.root.unmap_layer_surface(output, id);
                }
            }
            Op::Frame { output, presented } => {
                let output = h.output(output);
                let _ = f.root.dispatch(DeviceEvent::Frame { output }, f.now);
                let _ = f
                    .root
                    .dispatch(DeviceEvent::Presented { output, presented }, f.now);
            }
            Op::Lock => {
                f.root.lock(f.now);
            }
            Op::MapLockSurface(output) => {
                let _ = f.root.map_lock_surface(h.output(output));
            }
            Op::Unlock => f.root.unlock(),
            Op::Advance(ms) => f.advance(Duration::from_millis(ms)),
        }

        f.refresh();
    }
}

fn check_invariants(f: &Fixture) {
    let root = &f.root;

    for view in root.views().iter() {
        let id = view.id();
        let linked: Vec<_> = root
            .outputs()
            .iter()
            .filter(|output| output.pending().focus_stack.contains(id))
            .map(|output| output.id())
            .collect();

        match view.output {
            Some(output) => {
                assert_eq!(linked, [output], "{id:?} must be linked into its output only");
                let output = root.output(output).unwrap();
                assert!(output.pending().wm_stack.contains(id));
                assert!(!root.orphan_views().contains(&id));
            }
            None => {
                assert!(linked.is_empty());
                assert!(root.orphan_views().contains(&id));
            }
        }
    }

    for id in root.orphan_views() {
        assert_eq!(root.views().view(*id).output, None);
    }

    for output in root.outputs() {
        let pending = output.pending();
        assert_eq!(pending.focus_stack.len(), pending.wm_stack.len());
        assert_ne!(pending.tags, 0);
        for id in &pending.focus_stack {
            assert!(root.views().contains(id));
        }

        if output.is_in_transaction() {
            assert!(output.is_enabled());
            assert!(root.transactions().participants().contains(&output.id()));
        } else {
            assert!(output.inflight().focus_stack.is_empty());
            assert!(output.inflight().wm_stack.is_empty());
            assert!(output.inflight().layout_demand.is_none());
        }

        let by_name = root.output_by_name(output.name()).unwrap();
        assert_eq!(by_name.id(), output.id());
    }

    for id in root.transactions().participants() {
        assert!(root.output(*id).unwrap().is_in_transaction());
    }

    if root.lock_state() == LockManagerState::Locked {
        for output in root.outputs().iter().filter(|output| output.is_enabled()) {
            assert!(output.lock_render_state().is_locked());
        }
    }
}

fn check_ops(ops: &[Op]) -> Fixture {
    let mut f = Fixture::new();
    let mut handles = Handles::default();

    for op in ops {
        op.apply(&mut f, &mut handles);
        check_invariants(&f);
    }

    // Whatever happened, well-behaved clients and the timeout get everything committed.
    for _ in 0..5 {
        f.answer_layouts();
        f.ack_all();
        let outputs: Vec<_> = f.root.outputs().iter().map(|output| output.id()).collect();
        for output in outputs {
            f.frame(output);
        }
        f.advance(Duration::from_secs(1));
    }
    assert!(!f.root.transactions().is_inflight());
    // Presenting frames everywhere always lets a started lock complete.
    let lock_state = f.root.lock_state();
    assert!(
        matches!(lock_state, LockManagerState::Unlocked | LockManagerState::Locked),
        "lock stuck in {lock_state:?}"
    );
    check_invariants(&f);

    f
}

#[test]
fn views_survive_output_shuffling() {
    let ops = [
        Op::AddOutput(0),
        Op::AddView { output: 0, tags: 1 },
        Op::AddView { output: 0, tags: 2 },
        Op::RemoveOutput(0),
        Op::AddOutput(1),
        Op::AddOutput(2),
        Op::SendViewToOutput { view: 0, output: 2 },
        Op::RemoveOutput(1),
        Op::AckAll,
    ];

    let f = check_ops(&ops);
    assert!(f.root.orphan_views().is_empty());
    assert_eq!(f.root.outputs().len(), 1);
    assert_eq!(f.root.views().len(), 2);
}

#[test]
fn lock_across_output_changes() {
    let ops = [
        Op::AddOutput(0),
        Op::AddOutput(1),
        Op::Frame {
            output: 0,
            presented: true,
        },
        Op::Lock,
        Op::EnableOutput {
            output: 1,
            enabled: false,
        },
        Op::MapLockSurface(0),
        Op::Frame {
            output: 0,
            presented: true,
        },
        Op::EnableOutput {
            output: 1,
            enabled: true,
        },
        Op::Frame {
            output: 1,
            presented: true,
        },
    ];

    let f = check_ops(&ops);
    assert_eq!(f.root.lock_state(), LockManagerState::Locked);
}

#[test]
fn layout_goes_away_mid_transaction() {
    let ops = [
        Op::AddOutput(0),
        Op::RegisterLayout {
            output: 0,
            remote: true,
        },
        Op::AddView { output: 0, tags: 1 },
        Op::AddView { output: 0, tags: 1 },
        Op::RemoveView(0),
        Op::UnregisterLayout(0),
        Op::RegisterLayout {
            output: 0,
            remote: false,
        },
        Op::AddView { output: 0, tags: 1 },
        Op::AckAll,
    ];

    check_ops(&ops);
}

fn proptest_config() -> ProptestConfig {
    let cases = if std::env::var_os("RUN_SLOW_TESTS").is_some() {
        2048
    } else {
        64
    };

    ProptestConfig {
        cases,
        ..ProptestConfig::default()
    }
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn random_operations_keep_invariants(ops: Vec<Op>) {
        check_ops(&ops);
    }
}
