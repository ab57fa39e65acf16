//! Initial video mode selection.

use smithay::utils::{Physical, Size};

use crate::backend::{OutputConfig, OutputDevice};

/// Largest mode picked automatically for a new output.
const MAX_INITIAL_SIZE: (i32, i32) = (1920, 1080);
/// Highest refresh rate picked automatically, in mHz.
const MAX_INITIAL_REFRESH: i32 = 60_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AspectRatio {
    /// The device did not report a picture aspect ratio.
    #[default]
    None,
    R4_3,
    R16_9,
    R16_10,
    R64_27,
    R256_135,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputMode {
    pub size: Size<i32, Physical>,
    /// Refresh rate in mHz.
    pub refresh: i32,
    pub aspect_ratio: AspectRatio,
    pub preferred: bool,
}

/// Outcome of configuring a new output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModeSetup {
    /// The device accepted a configuration. The mode is `None` for devices without modes.
    Enabled(Option<OutputMode>),
    /// Every candidate was rejected; the output stays disabled.
    Disabled,
}

impl OutputMode {
    pub fn new(w: i32, h: i32, refresh: i32) -> Self {
        Self {
            size: Size::from((w, h)),
            refresh,
            aspect_ratio: AspectRatio::None,
            preferred: false,
        }
    }

    /// Whether the mode is 16:9.
    ///
    /// Uses the reported picture aspect ratio, or the pixel dimensions when none was reported.
    pub fn is_16_9(&self) -> bool {
        match self.aspect_ratio {
            AspectRatio::R16_9 => true,
            AspectRatio::None => {
                let (w, h) = (i64::from(self.size.w), i64::from(self.size.h));
                h > 0 && w * 9 == h * 16
            }
            _ => false,
        }
    }

    fn fits_initial_limits(&self) -> bool {
        self.size.w <= MAX_INITIAL_SIZE.0
            && self.size.h <= MAX_INITIAL_SIZE.1
            && self.refresh <= MAX_INITIAL_REFRESH
    }
}

/// Picks the mode to try first on a new output.
///
/// The first mode no larger than 1920x1080 at no more than 60 Hz with a 16:9 aspect ratio wins.
/// Failing that, the aspect ratio is ignored. Failing that, the preferred mode is used.
pub fn pick_initial_mode(
    modes: &[OutputMode],
    preferred: Option<OutputMode>,
) -> Option<OutputMode> {
    if let Some(mode) = modes
        .iter()
        .find(|mode| mode.fits_initial_limits() && mode.is_16_9())
    {
        return Some(*mode);
    }

    if let Some(mode) = modes.iter().find(|mode| mode.fits_initial_limits()) {
        return Some(*mode);
    }

    preferred
}

/// Enables a new output with its initial mode.
///
/// If the device rejects the picked mode, every other mode is tried in enumeration order. Failures
/// are logged; an output that accepts no mode stays disabled.
pub fn configure_initial_mode(device: &mut dyn OutputDevice, scale: f64) -> ModeSetup {
    let _span = tracy_client::span!("configure_initial_mode");

    let name = device.name().to_owned();
    let modes = device.modes();

    if modes.is_empty() {
        // Virtual and nested outputs have no modes and pick a size themselves.
        let config = OutputConfig {
            enabled: true,
            mode: None,
            scale,
        };
        return match device.commit(&config) {
            Ok(()) => ModeSetup::Enabled(None),
            Err(err) => {
                warn!("error enabling output {name}: {err:?}");
                ModeSetup::Disabled
            }
        };
    }

    let picked = pick_initial_mode(&modes, device.preferred_mode());
    let candidates = picked
        .into_iter()
        .chain(modes.iter().copied().filter(|mode| Some(*mode) != picked));

    for mode in candidates {
        let config = OutputConfig {
            enabled: true,
            mode: Some(mode),
            scale,
        };
        match device.commit(&config) {
            Ok(()) => {
                debug!(
                    "output {name}: using mode {}x{}@{}",
                    mode.size.w, mode.size.h, mode.refresh
                );
                return ModeSetup::Enabled(Some(mode));
            }
            Err(err) => {
                warn!(
                    "output {name}: error applying mode {}x{}@{}: {err:?}",
                    mode.size.w, mode.size.h, mode.refresh
                );
            }
        }
    }

    warn!("output {name}: no mode could be applied, leaving it disabled");
    ModeSetup::Disabled
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use proptest::prelude::*;

    use super::*;

    fn mode_16_9(w: i32, h: i32, refresh: i32) -> OutputMode {
        OutputMode {
            aspect_ratio: AspectRatio::R16_9,
            ..OutputMode::new(w, h, refresh)
        }
    }

    struct Device {
        modes: Vec<OutputMode>,
        preferred: Option<OutputMode>,
        rejected: Vec<OutputMode>,
        reject_modeless: bool,
        attempts: Vec<Option<OutputMode>>,
    }

    impl Device {
        fn new(modes: Vec<OutputMode>) -> Self {
            Self {
                modes,
                preferred: None,
                rejected: Vec::new(),
                reject_modeless: false,
                attempts: Vec::new(),
            }
        }
    }

    impl OutputDevice for Device {
        fn name(&self) -> &str {
            "test"
        }

        fn modes(&self) -> Vec<OutputMode> {
            self.modes.clone()
        }

        fn preferred_mode(&self) -> Option<OutputMode> {
            self.preferred
        }

        fn commit(&mut self, config: &OutputConfig) -> anyhow::Result<()> {
            self.attempts.push(config.mode);
            match config.mode {
                Some(mode) if self.rejected.contains(&mode) => bail!("mode rejected"),
                None if self.reject_modeless => bail!("no mode"),
                _ => Ok(()),
            }
        }

        fn submit_frame(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn prefers_1080p_over_4k() {
        let fhd = mode_16_9(1920, 1080, 60_000);
        let uhd = mode_16_9(3840, 2160, 60_000);

        assert_eq!(pick_initial_mode(&[uhd, fhd], Some(uhd)), Some(fhd));

        let mut device = Device::new(vec![uhd, fhd]);
        device.preferred = Some(uhd);
        assert_eq!(
            configure_initial_mode(&mut device, 1.),
            ModeSetup::Enabled(Some(fhd))
        );
        assert_eq!(device.attempts, [Some(fhd)]);
    }

    #[test]
    fn aspect_ratio_from_dimensions() {
        assert!(OutputMode::new(1280, 720, 60_000).is_16_9());
        assert!(!OutputMode::new(1280, 1024, 60_000).is_16_9());
        assert!(!OutputMode::new(0, 0, 60_000).is_16_9());

        let reported = OutputMode {
            aspect_ratio: AspectRatio::R16_10,
            ..OutputMode::new(1280, 720, 60_000)
        };
        assert!(!reported.is_16_9());
    }

    #[test]
    fn relaxes_aspect_ratio() {
        let sxga = OutputMode::new(1280, 1024, 60_000);
        let uhd = mode_16_9(3840, 2160, 60_000);
        assert_eq!(pick_initial_mode(&[uhd, sxga], None), Some(sxga));
    }

    #[test]
    fn falls_back_to_preferred() {
        let fast = mode_16_9(1920, 1080, 144_000);
        let uhd = mode_16_9(3840, 2160, 60_000);
        assert_eq!(pick_initial_mode(&[fast, uhd], Some(uhd)), Some(uhd));
        assert_eq!(pick_initial_mode(&[fast, uhd], None), None);
    }

    #[test]
    fn retries_other_modes_in_order() {
        let fhd = mode_16_9(1920, 1080, 60_000);
        let uhd = mode_16_9(3840, 2160, 60_000);
        let qhd = mode_16_9(2560, 1440, 60_000);

        let mut device = Device::new(vec![uhd, fhd, qhd]);
        device.rejected = vec![fhd, uhd];
        assert_eq!(
            configure_initial_mode(&mut device, 1.),
            ModeSetup::Enabled(Some(qhd))
        );
        assert_eq!(device.attempts, [Some(fhd), Some(uhd), Some(qhd)]);
    }

    #[test]
    fn all_rejected_leaves_disabled() {
        let fhd = mode_16_9(1920, 1080, 60_000);
        let mut device = Device::new(vec![fhd]);
        device.rejected = vec![fhd];
        assert_eq!(configure_initial_mode(&mut device, 1.), ModeSetup::Disabled);
    }

    #[test]
    fn modeless_device() {
        let mut device = Device::new(Vec::new());
        assert_eq!(
            configure_initial_mode(&mut device, 2.),
            ModeSetup::Enabled(None)
        );

        device.reject_modeless = true;
        assert_eq!(configure_initial_mode(&mut device, 2.), ModeSetup::Disabled);
    }

    fn arbitrary_mode() -> impl Strategy<Value = OutputMode> {
        let size = prop_oneof![
            Just((1280, 720)),
            Just((1280, 1024)),
            Just((1920, 1080)),
            Just((1920, 1200)),
            Just((2560, 1080)),
            Just((3840, 2160)),
            (1..4000, 1..3000),
        ];
        let refresh = prop_oneof![Just(59_940), Just(60_000), Just(75_000), Just(144_000)];
        let aspect_ratio = prop_oneof![
            Just(AspectRatio::None),
            Just(AspectRatio::R4_3),
            Just(AspectRatio::R16_9),
            Just(AspectRatio::R16_10),
        ];

        (size, refresh, aspect_ratio, any::<bool>()).prop_map(
            |((w, h), refresh, aspect_ratio, preferred)| OutputMode {
                aspect_ratio,
                preferred,
                ..OutputMode::new(w, h, refresh)
            },
        )
    }

    proptest! {
        #[test]
        fn picks_by_priority(
            modes in prop::collection::vec(arbitrary_mode(), 0..8),
            preferred in prop::option::of(arbitrary_mode()),
        ) {
            let picked = pick_initial_mode(&modes, preferred);

            let fitting: Vec<_> = modes.iter().filter(|m| m.fits_initial_limits()).collect();
            if let Some(first) = fitting.iter().find(|m| m.is_16_9()) {
                prop_assert_eq!(picked, Some(**first));
            } else if let Some(first) = fitting.first() {
                prop_assert_eq!(picked, Some(**first));
            } else {
                prop_assert_eq!(picked, preferred);
            }
        }
    }
}
