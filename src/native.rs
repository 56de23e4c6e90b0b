//! Native event-driven simulator hosting a behavioral [`Design`].
//!
//! The kernel lives in a thread local, so tasks, triggers and the design of one
//! simulation all run on the thread that called [`crate::run_tests`]. Every time
//! step runs through these phases:
//!
//! 1. timer callbacks due at the current time,
//! 2. delta cycles: evaluate the design, report value changes to edge callbacks,
//!    run read-write callbacks, repeat until nothing changes,
//! 3. read-only callbacks, during which writes are rejected,
//! 4. advance to the earliest pending timer, or end the run if there is none.

use intmap::IntMap;
use num_format::{Locale, ToFormattedString};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufWriter;

use crate::config::{TbConfig, DEFAULT_PRECISION};
use crate::dut::{width_mask, Design, PinBank, Port};
use crate::error::SimError;
use crate::signal::{ObjectKind, SimObject};
use crate::sim_if::{scale_time, SimCallback, SimIf, SIM_IF};
use crate::trigger::{self, EdgeKind};
use crate::waves::VcdWriter;

pub const MAX_DELTAS: u32 = 1000;
const ROOT_HANDLE: usize = 0;

thread_local! {
    static KERNEL: RefCell<Option<Kernel>> = RefCell::new(None);
}

enum CbKind {
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

struct Watch {
    cb_hdl: usize,
    last: u32,
}

pub(crate) struct Kernel {
    design: Box<dyn Design>,
    top: String,
    ports: Vec<Port>,
    pins: PinBank,
    time: u64,
    precision: i8,
    next_cb: usize,
    callbacks: IntMap<CbKind>,
    // absolute time -> callback handles
    timers: BTreeMap<u64, Vec<usize>>,
    // signal handle -> watch
    watches: IntMap<Watch>,
    read_write: Option<usize>,
    read_only: Option<usize>,
    in_read_only: bool,
    dirty: bool,
    waves: Option<VcdWriter<BufWriter<File>>>,
}

impl Kernel {
    pub(crate) fn new(design: Box<dyn Design>, config: &TbConfig) -> Result<Self, SimError> {
        let ports = design.ports();
        let mut seen = HashSet::new();
        for port in &ports {
            if !seen.insert(port.name) {
                return Err(SimError::DuplicatePort(port.name.to_string()));
            }
            if port.width == 0 || port.width > 32 {
                return Err(SimError::PortTooWide {
                    name: port.name.to_string(),
                    width: port.width,
                });
            }
        }
        let top = design.top_name().to_string();
        let waves = match &config.waves_file {
            Some(path) => {
                let timescale = format!("1{}", scale_time(config.precision)?);
                let mut vcd = VcdWriter::new(BufWriter::new(File::create(path)?), &top, &timescale);
                for port in &ports {
                    vcd.add_signal(port.name, port.width);
                }
                Some(vcd)
            }
            None => None,
        };
        Ok(Self {
            design,
            top,
            pins: PinBank::new(&ports),
            ports,
            time: 0,
            precision: config.precision,
            next_cb: 1,
            callbacks: IntMap::new(),
            timers: BTreeMap::new(),
            watches: IntMap::new(),
            read_write: None,
            read_only: None,
            in_read_only: false,
            dirty: true,
            waves,
        })
    }

    fn port_index(&self, handle: usize) -> Result<usize, SimError> {
        match handle {
            ROOT_HANDLE => Err(SimError::NotAValue { name: self.top.clone() }),
            h if h <= self.ports.len() => Ok(h - 1),
            h => Err(SimError::InvalidHandle(h)),
        }
    }

    fn full_name(&self, handle: usize) -> Result<String, SimError> {
        match handle {
            ROOT_HANDLE => Ok(self.top.clone()),
            h => Ok(format!("{}.{}", self.top, self.ports[self.port_index(h)?].name)),
        }
    }

    fn read(&self, handle: usize) -> Result<u32, SimError> {
        Ok(self.pins.get(self.port_index(handle)?))
    }

    fn write(&mut self, handle: usize, value: u64) -> Result<(), SimError> {
        let index = self.port_index(handle)?;
        if self.in_read_only {
            return Err(SimError::ReadOnlyWrite { name: self.full_name(handle)? });
        }
        if value > self.pins.mask(index) as u64 {
            return Err(SimError::ValueOutOfRange {
                name: self.full_name(handle)?,
                value,
                width: self.ports[index].width,
            });
        }
        self.pins.drive(index, value as u32);
        self.dirty = true;
        Ok(())
    }

    fn new_cb(&mut self, kind: CbKind) -> usize {
        let hdl = self.next_cb;
        self.next_cb += 1;
        self.callbacks.insert(hdl as u64, kind);
        hdl
    }

    fn register(&mut self, cb: SimCallback) -> Result<usize, SimError> {
        match cb {
            SimCallback::Time(t) => {
                let t_abs = self
                    .time
                    .checked_add(t)
                    .ok_or(SimError::TimeOverflow { now: self.time, delay: t })?;
                let hdl = self.new_cb(CbKind::Time(t_abs));
                self.timers.entry(t_abs).or_default().push(hdl);
                Ok(hdl)
            }
            SimCallback::Edge(sig_hdl) => {
                if sig_hdl == ROOT_HANDLE {
                    return Err(SimError::NotWatchable { name: self.top.clone() });
                }
                let last = self.read(sig_hdl)?;
                let hdl = self.new_cb(CbKind::Edge(sig_hdl));
                self.watches.insert(sig_hdl as u64, Watch { cb_hdl: hdl, last });
                Ok(hdl)
            }
            SimCallback::ReadWrite => {
                let hdl = self.new_cb(CbKind::ReadWrite);
                self.read_write = Some(hdl);
                Ok(hdl)
            }
            SimCallback::ReadOnly => {
                let hdl = self.new_cb(CbKind::ReadOnly);
                self.read_only = Some(hdl);
                Ok(hdl)
            }
        }
    }

    fn cancel(&mut self, cb_hdl: usize) -> Result<(), SimError> {
        let kind = self
            .callbacks
            .remove(cb_hdl as u64)
            .ok_or(SimError::CallbackNotFound(cb_hdl))?;
        match kind {
            CbKind::Time(t_abs) => {
                if let Some(handles) = self.timers.get_mut(&t_abs) {
                    handles.retain(|h| *h != cb_hdl);
                    if handles.is_empty() {
                        self.timers.remove(&t_abs);
                    }
                }
            }
            CbKind::Edge(sig_hdl) => {
                let owned = self
                    .watches
                    .get(sig_hdl as u64)
                    .is_some_and(|w| w.cb_hdl == cb_hdl);
                if owned {
                    self.watches.remove(sig_hdl as u64);
                }
            }
            CbKind::ReadWrite => {
                if self.read_write == Some(cb_hdl) {
                    self.read_write = None;
                }
            }
            CbKind::ReadOnly => {
                if self.read_only == Some(cb_hdl) {
                    self.read_only = None;
                }
            }
        }
        Ok(())
    }

    fn evaluate(&mut self) -> Result<(), SimError> {
        self.dirty = false;
        self.design.evaluate(&mut self.pins);
        self.record_changes()
    }

    fn record_changes(&mut self) -> Result<(), SimError> {
        let changes = self.pins.take_changes();
        if let Some(vcd) = self.waves.as_mut() {
            for index in changes {
                vcd.change(self.time, index, self.pins.get(index))?;
            }
        }
        Ok(())
    }

    fn collect_edges(&mut self) -> Vec<(usize, EdgeKind)> {
        let mut handles: Vec<u64> = self.watches.keys().copied().collect();
        handles.sort_unstable();
        let mut edges = Vec::new();
        for sig_hdl in handles {
            let index = sig_hdl as usize - 1;
            let current = self.pins.get(index);
            let Some(watch) = self.watches.get_mut(sig_hdl) else { continue };
            if current != watch.last {
                let kind = match self.ports[index].width {
                    1 if current == 1 => EdgeKind::Rising,
                    1 => EdgeKind::Falling,
                    _ => EdgeKind::Any,
                };
                watch.last = current;
                edges.push((sig_hdl as usize, kind));
            }
        }
        edges
    }

    fn take_due_timers(&mut self) -> bool {
        match self.timers.remove(&self.time) {
            Some(handles) => {
                for hdl in handles {
                    self.callbacks.remove(hdl as u64);
                }
                true
            }
            None => false,
        }
    }

    fn take_single(&mut self, read_only: bool) -> bool {
        let slot = match read_only {
            true => self.read_only.take(),
            false => self.read_write.take(),
        };
        match slot {
            Some(hdl) => {
                self.callbacks.remove(hdl as u64);
                true
            }
            None => false,
        }
    }

    fn finish(mut self) -> Result<(), SimError> {
        self.record_changes()?;
        if let Some(vcd) = self.waves.take() {
            vcd.finish()?;
        }
        Ok(())
    }
}

fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> Result<R, SimError>) -> Result<R, SimError> {
    KERNEL.with(|k| match k.borrow_mut().as_mut() {
        Some(kernel) => f(kernel),
        None => Err(SimError::NoActiveSimulation),
    })
}

pub(crate) fn install(kernel: Kernel) -> Result<(), SimError> {
    KERNEL.with(|k| {
        let mut k = k.borrow_mut();
        if k.is_some() {
            return Err(SimError::SimulationActive);
        }
        *k = Some(kernel);
        Ok(())
    })
}

#[cfg(test)]
fn is_active() -> bool {
    KERNEL.with(|k| k.borrow().is_some())
}

/// Removes the kernel of this thread and flushes its waveform.
pub(crate) fn uninstall() -> Result<(), SimError> {
    let kernel = KERNEL.with(|k| k.borrow_mut().take());
    match kernel {
        Some(kernel) => kernel.finish(),
        None => Err(SimError::NoActiveSimulation),
    }
}

fn settle() -> Result<(), SimError> {
    for _ in 0..MAX_DELTAS {
        let edges = with_kernel(|k| {
            k.evaluate()?;
            Ok(k.collect_edges())
        })?;
        for (sig_hdl, kind) in &edges {
            trigger::react(SimCallback::Edge(*sig_hdl), Some(*kind));
        }
        let rw = with_kernel(|k| Ok(k.take_single(false)))?;
        if rw {
            trigger::react(SimCallback::ReadWrite, None);
        }
        if edges.is_empty() && !rw && !with_kernel(|k| Ok(k.dirty))? {
            return Ok(());
        }
    }
    Err(SimError::DeltaCycleLimit {
        steps: SIM_IF.get_sim_time_steps(),
        max_deltas: MAX_DELTAS,
    })
}

/// Runs the simulation until no timer is pending or the time limit is passed.
pub(crate) fn run_sim(time_limit_ns: Option<u64>) -> Result<(), SimError> {
    let limit = match time_limit_ns {
        Some(ns) => Some(SIM_IF.get_sim_steps(ns as f64, "ns")?),
        None => None,
    };
    loop {
        let now = SIM_IF.get_sim_time_steps();
        if with_kernel(|k| Ok(k.take_due_timers()))? {
            trigger::react(SimCallback::Time(now), None);
        }
        settle()?;

        if with_kernel(|k| {
            let ro = k.take_single(true);
            k.in_read_only = ro;
            Ok(ro)
        })? {
            trigger::react(SimCallback::ReadOnly, None);
            with_kernel(|k| {
                k.in_read_only = false;
                Ok(())
            })?;
        }

        // callbacks registered during read-only may still be due now
        let next = with_kernel(|k| {
            if k.read_write.is_some() || k.dirty {
                return Ok(Some(k.time));
            }
            Ok(k.timers.keys().next().copied())
        })?;
        match next {
            Some(t) => {
                if let (Some(limit), Some(ns)) = (limit, time_limit_ns) {
                    if t > limit {
                        return Err(SimError::TimeLimitExceeded { limit_ns: ns });
                    }
                }
                with_kernel(|k| {
                    k.time = t;
                    Ok(())
                })?;
            }
            None => return Ok(()),
        }
    }
}

/// [`SimIf`] implementation backed by the kernel of the current thread.
pub(crate) struct Native;

impl SimIf for Native {
    fn set_value(&self, obj: &SimObject, value: u32) -> Result<(), SimError> {
        with_kernel(|k| k.write(obj.handle, value as u64))
    }
    fn get_value(&self, obj: &SimObject) -> Result<u32, SimError> {
        with_kernel(|k| k.read(obj.handle))
    }
    fn set_value_i32(&self, obj: &SimObject, value: i32) -> Result<(), SimError> {
        let width = obj.size();
        if width == 0 {
            return Err(SimError::NotAValue { name: obj.name() });
        }
        if width < 32 {
            // accept both the signed and the unsigned range of the signal
            let min = -(1i64 << (width - 1));
            let max = width_mask(width) as i64;
            if (value as i64) < min || (value as i64) > max {
                return Err(SimError::ValueOutOfRange {
                    name: obj.name(),
                    value: value as u32 as u64,
                    width,
                });
            }
        }
        self.set_value(obj, value as u32 & width_mask(width))
    }
    fn get_value_i32(&self, obj: &SimObject) -> Result<i32, SimError> {
        Ok(self.get_value(obj)? as i32)
    }
    fn set_value_bin(&self, obj: &SimObject, value: &str) -> Result<(), SimError> {
        let parsed = u32::from_str_radix(value, 2).map_err(|_| SimError::InvalidBinStr {
            name: obj.name(),
            value: value.to_string(),
            reason: "invalid characters",
        })?;
        self.set_value(obj, parsed)
    }
    fn get_value_bin(&self, obj: &SimObject) -> Result<String, SimError> {
        let value = self.get_value(obj)?;
        Ok(format!("{:0w$b}", value, w = obj.size() as usize))
    }
    fn get_object_by_name(&self, name: &str) -> Result<SimObject, SimError> {
        with_kernel(|k| {
            if name == k.top {
                return Ok(SimObject {
                    handle: ROOT_HANDLE,
                    kind: ObjectKind::Hier,
                });
            }
            name.strip_prefix(k.top.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .and_then(|port| k.ports.iter().position(|p| p.name == port))
                .map(|index| SimObject {
                    handle: index + 1,
                    kind: ObjectKind::Int(k.ports[index].width),
                })
                .ok_or_else(|| SimError::ObjectNotFound { name: name.to_string() })
        })
    }
    fn get_root_object(&self) -> Result<SimObject, SimError> {
        with_kernel(|_| {
            Ok(SimObject {
                handle: ROOT_HANDLE,
                kind: ObjectKind::Hier,
            })
        })
    }
    fn get_full_name(&self, obj: &SimObject) -> Result<String, SimError> {
        with_kernel(|k| k.full_name(obj.handle))
    }
    fn get_sim_time_steps(&self) -> u64 {
        with_kernel(|k| Ok(k.time)).unwrap_or(0)
    }
    fn get_sim_precision(&self) -> i8 {
        with_kernel(|k| Ok(k.precision)).unwrap_or(DEFAULT_PRECISION)
    }
    fn log(&self, msg: &str) {
        let t = self.get_sim_time("ns").unwrap_or(0.0);
        let int = t.floor() as u64;
        let mut frac_str = format!("{:.3}", t % 1.0);
        frac_str.remove(0);
        println!("{}{}ns {}", int.to_formatted_string(&Locale::en), frac_str, msg);
    }
    fn register_callback(&self, cb: SimCallback) -> Result<usize, SimError> {
        with_kernel(|k| k.register(cb))
    }
    fn cancel_callback(&self, cb_hdl: usize) -> Result<(), SimError> {
        with_kernel(|k| k.cancel(cb_hdl))
    }
}
