//! Radio Connectivity
//!
//! Scanning needs both the Bluetooth and the location radio. Each radio is a
//! two-state automaton fed by platform signals; the combined state is
//! published on a `watch` channel the client loop selects on.

use serde::{Serialize, Deserialize};
use tokio::sync::watch;
use tracing::info;

/// Radios that gate scanning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Radio {
    /// Bluetooth (beacon ranging).
    Bluetooth,
    /// Location services.
    Location,
}

/// Stable radio state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioState {
    /// Radio is on.
    #[default]
    Enabled,
    /// Radio is off.
    Disabled,
}

/// Raw platform signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioSignal {
    /// Radio turned on.
    On,
    /// Radio turned off.
    Off,
    /// Transitioning on.
    TurningOn,
    /// Transitioning off.
    TurningOff,
}

impl RadioState {
    /// Next state after `signal`. Transitional signals leave the state unchanged.
    pub fn on_signal(self, signal: RadioSignal) -> RadioState {
        match signal {
            RadioSignal::On => RadioState::Enabled,
            RadioSignal::Off => RadioState::Disabled,
            RadioSignal::TurningOn | RadioSignal::TurningOff => self,
        }
    }
}

/// Combined radio state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectivity {
    /// Bluetooth radio.
    pub bluetooth: RadioState,
    /// Location radio.
    pub location: RadioState,
}

impl Connectivity {
    /// Both radios on.
    pub const ENABLED: Connectivity = Connectivity {
        bluetooth: RadioState::Enabled,
        location: RadioState::Enabled,
    };

    /// True when scanning is allowed.
    pub fn can_scan(&self) -> bool {
        self.bluetooth == RadioState::Enabled && self.location == RadioState::Enabled
    }

    fn radio_mut(&mut self, radio: Radio) -> &mut RadioState {
        match radio {
            Radio::Bluetooth => &mut self.bluetooth,
            Radio::Location => &mut self.location,
        }
    }
}

/// Publishes radio transitions.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    /// Monitor starting from `initial`.
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Feed a platform signal. Returns true if the combined state changed.
    pub fn apply(&self, radio: Radio, signal: RadioSignal) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            let slot = state.radio_mut(radio);
            let next = slot.on_signal(signal);
            let changed = *slot != next;
            *slot = next;
            changed
        });
        if changed {
            info!(?radio, ?signal, can_scan = self.current().can_scan(), "radio state changed");
        }
        changed
    }

    /// Current combined state.
    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    /// Receiver for the client loop.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Connectivity::ENABLED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitional_signals_ignored() {
        let state = RadioState::Enabled;
        assert_eq!(state.on_signal(RadioSignal::TurningOff), RadioState::Enabled);
        assert_eq!(state.on_signal(RadioSignal::Off), RadioState::Disabled);
        assert_eq!(RadioState::Disabled.on_signal(RadioSignal::TurningOn), RadioState::Disabled);
        assert_eq!(RadioState::Disabled.on_signal(RadioSignal::On), RadioState::Enabled);
    }

    #[test]
    fn test_either_radio_blocks_scanning() {
        let monitor = ConnectivityMonitor::default();
        assert!(monitor.current().can_scan());

        assert!(monitor.apply(Radio::Location, RadioSignal::Off));
        assert!(!monitor.current().can_scan());
        assert!(!monitor.apply(Radio::Location, RadioSignal::Off));

        assert!(monitor.apply(Radio::Bluetooth, RadioSignal::Off));
        assert!(monitor.apply(Radio::Location, RadioSignal::On));
        assert!(!monitor.current().can_scan());
        assert!(monitor.apply(Radio::Bluetooth, RadioSignal::On));
        assert!(monitor.current().can_scan());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes_only() {
        let monitor = ConnectivityMonitor::default();
        let mut rx = monitor.subscribe();

        monitor.apply(Radio::Bluetooth, RadioSignal::TurningOff);
        assert!(!rx.has_changed().unwrap());

        monitor.apply(Radio::Bluetooth, RadioSignal::Off);
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().can_scan());
    }
}
