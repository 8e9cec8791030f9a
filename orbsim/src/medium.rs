//! Shared radio medium and per-device link properties.
//!
//! All devices hear each other (single hop). A datagram from `a` to `b`
//! survives only if it survives both radios, and arrives after the larger
//! of the two delays.

use hashbrown::HashMap;
use orbnet::{Duration, PeerAddr};

/// Radio properties of one device.
#[derive(Debug, Clone)]
pub struct Link {
    /// Packet loss rate (0.0 to 1.0).
    pub loss_rate: f64,
    /// Air time plus processing delay.
    pub delay: Duration,
    /// Whether the device is currently on the air.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay: Duration::from_millis(2),
            active: true,
        }
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Path properties between two devices, derived from both links.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Path {
    pub loss_rate: f64,
    pub delay: Duration,
}

/// The shared medium.
#[derive(Debug, Clone)]
pub struct Medium {
    links: HashMap<PeerAddr, Link>,
    default_link: Link,
}

impl Default for Medium {
    fn default() -> Self {
        Self::new()
    }
}

impl Medium {
    pub fn new() -> Self {
        Self {
            links: HashMap::new(),
            default_link: Link::default(),
        }
    }

    /// Properties given to devices attached later.
    pub fn with_default_link(mut self, link: Link) -> Self {
        self.default_link = link;
        self
    }

    /// Attach a device with the default link, keeping any existing link.
    pub fn attach(&mut self, device: PeerAddr) {
        let default = self.default_link.clone();
        self.links.entry(device).or_insert(default);
    }

    pub fn set_link(&mut self, device: PeerAddr, link: Link) {
        self.links.insert(device, link);
    }

    pub fn link(&self, device: PeerAddr) -> Option<&Link> {
        self.links.get(&device)
    }

    pub fn link_mut(&mut self, device: PeerAddr) -> Option<&mut Link> {
        self.links.get_mut(&device)
    }

    /// Apply a loss rate to every attached device.
    pub fn set_global_loss_rate(&mut self, rate: f64) {
        let rate = rate.clamp(0.0, 1.0);
        self.default_link.loss_rate = rate;
        for link in self.links.values_mut() {
            link.loss_rate = rate;
        }
    }

    /// Path from one device to another, or None if either is off the air.
    pub fn path(&self, from: PeerAddr, to: PeerAddr) -> Option<Path> {
        if from == to {
            return None;
        }
        let a = self.links.get(&from)?;
        let b = self.links.get(&to)?;
        if !a.active || !b.active {
            return None;
        }
        Some(Path {
            loss_rate: 1.0 - (1.0 - a.loss_rate) * (1.0 - b.loss_rate),
            delay: a.delay.max(b.delay),
        })
    }

    pub fn is_connected(&self, from: PeerAddr, to: PeerAddr) -> bool {
        self.path(from, to).is_some()
    }
}
