//! Capability interface of the display backend.
//!
//! The backend owns the real display devices. Each one is handed to the core as a boxed
//! [`OutputDevice`] when it shows up; afterwards the backend reports what happens to it through
//! [`DeviceEvent`]s dispatched by the root.

use std::collections::HashMap;

use crate::mode::OutputMode;
use crate::output::OutputId;

/// Configuration to test and apply to a device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputConfig {
    pub enabled: bool,
    /// `None` lets the device pick, for devices that do not report modes.
    pub mode: Option<OutputMode>,
    pub scale: f64,
}

pub trait OutputDevice {
    /// Connector name, such as `eDP-1`.
    fn name(&self) -> &str;

    /// Modes the device reports as supported, in enumeration order.
    fn modes(&self) -> Vec<OutputMode>;

    fn preferred_mode(&self) -> Option<OutputMode>;

    /// Tests and applies the configuration atomically.
    ///
    /// On error the device keeps its previous configuration.
    fn commit(&mut self, config: &OutputConfig) -> anyhow::Result<()>;

    /// Submits the current scene contents as the next frame.
    fn submit_frame(&mut self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceEvent {
    /// The device switched modes on its own, or confirmed a requested mode.
    ModeChanged { output: OutputId, mode: OutputMode },
    /// The device is ready for a new frame.
    Frame { output: OutputId },
    /// Presentation feedback for the last submitted frame.
    ///
    /// `presented` is false when the frame was discarded without reaching the screen.
    Presented { output: OutputId, presented: bool },
    EnableChanged { output: OutputId, enabled: bool },
    Removed { output: OutputId },
}

impl DeviceEvent {
    pub fn output(&self) -> OutputId {
        match *self {
            DeviceEvent::ModeChanged { output, .. }
            | DeviceEvent::Frame { output }
            | DeviceEvent::Presented { output, .. }
            | DeviceEvent::EnableChanged { output, .. }
            | DeviceEvent::Removed { output } => output,
        }
    }
}

/// Proof that a device is registered with the root.
///
/// Obtained exactly once per device from [`DeviceRegistry::register`] and given back exactly once
/// to [`DeviceRegistry::unregister`].
#[derive(Debug)]
pub struct Registration {
    name: String,
    output: OutputId,
    released: bool,
}

impl Registration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output(&self) -> OutputId {
        self.output
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.released {
            error!(
                "registration of {} ({:?}) dropped without unregistering",
                self.name, self.output
            );
        }
    }
}

/// Maps device names to the outputs created for them.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    by_name: HashMap<String, OutputId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, output: OutputId) -> Registration {
        let prev = self.by_name.insert(name.to_owned(), output);
        assert!(prev.is_none(), "device {name} is already registered");

        Registration {
            name: name.to_owned(),
            output,
            released: false,
        }
    }

    pub fn unregister(&mut self, mut registration: Registration) {
        let removed = self.by_name.remove(&registration.name);
        assert_eq!(
            removed,
            Some(registration.output),
            "device {} is not registered",
            registration.name
        );
        registration.released = true;
    }

    pub fn find(&self, name: &str) -> Option<OutputId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
