//! Behavioral device models hosted by the native simulator.
//!
//! A [`Design`] declares its ports once and is then evaluated by the kernel in
//! every delta cycle. Evaluation must be idempotent for unchanged inputs: the
//! model detects clock edges itself by remembering the last sampled clock.

mod cookie_dac;

pub use cookie_dac::{CookieDac, MAGIC_COOKIE};

/// Direction of a design port, seen from the design.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortDir {
    Input,
    Output,
}

/// A named port of a design.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
    pub name: &'static str,
    pub width: u32,
    pub dir: PortDir,
}

impl Port {
    pub const fn input(name: &'static str, width: u32) -> Self {
        Self { name, width, dir: PortDir::Input }
    }
    pub const fn output(name: &'static str, width: u32) -> Self {
        Self { name, width, dir: PortDir::Output }
    }
}

/// A two-state device model.
pub trait Design {
    /// Name of the top level scope, signals are reachable as `<top>.<port>`.
    fn top_name(&self) -> &str;
    /// Ports in index order. The index is used to address [`PinBank`] slots.
    fn ports(&self) -> Vec<Port>;
    /// Recomputes outputs and, on clock edges, state from the current pins.
    fn evaluate(&mut self, pins: &mut PinBank);
}

/// Current values of all design ports.
#[derive(Debug, Clone)]
pub struct PinBank {
    values: Vec<u32>,
    masks: Vec<u32>,
    changed: Vec<bool>,
}

impl PinBank {
    pub fn new(ports: &[Port]) -> Self {
        Self {
            values: vec![0; ports.len()],
            masks: ports.iter().map(|p| width_mask(p.width)).collect(),
            changed: vec![false; ports.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        self.values[index]
    }

    #[inline]
    pub fn bit(&self, index: usize, bit: u32) -> bool {
        (self.values[index] >> bit) & 1 == 1
    }

    /// Drives a port, truncating the value to the port width.
    #[inline]
    pub fn drive(&mut self, index: usize, value: u32) {
        let value = value & self.masks[index];
        if self.values[index] != value {
            self.values[index] = value;
            self.changed[index] = true;
        }
    }

    pub(crate) fn mask(&self, index: usize) -> u32 {
        self.masks[index]
    }

    /// Returns and clears the indices of ports that changed since the last call.
    pub(crate) fn take_changes(&mut self) -> Vec<usize> {
        let mut out = Vec::new();
        for (i, c) in self.changed.iter_mut().enumerate() {
            if *c {
                *c = false;
                out.push(i);
            }
        }
        out
    }
}

pub(crate) fn width_mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_truncates_and_tracks_changes() {
        let ports = [Port::input("a", 1), Port::output("b", 8)];
        let mut pins = PinBank::new(&ports);
        pins.drive(1, 0x1ab);
        pins.drive(0, 0);
        assert_eq!(pins.get(1), 0xab);
        assert_eq!(pins.take_changes(), vec![1]);
        assert!(pins.take_changes().is_empty());
        pins.drive(1, 0xab);
        assert!(pins.take_changes().is_empty());
    }
}
