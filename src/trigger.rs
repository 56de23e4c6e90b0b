use intmap::IntMap;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::SimError;
use crate::executor;
use crate::{
    signal::{ObjectKind, SimObject},
    sim_if::{SimCallback, SIM_IF},
    value::Val,
    TbResult,
};

// IntMap specializes on u64 keys and doesn't need to hash at all
thread_local! {
    static TRIGGERS: RefCell<TriggerState> = RefCell::new(TriggerState::new());
}

struct TriggerState {
    // key is signal handle
    edges: IntMap<CallbackHandles>,
    // key is absolute callback time in steps
    timers: IntMap<CallbackHandles>,
    read_only: CallbackHandles,
    read_write: CallbackHandles,
}

impl TriggerState {
    fn new() -> Self {
        Self {
            edges: IntMap::new(),
            timers: IntMap::new(),
            read_only: CallbackHandles::default(),
            read_write: CallbackHandles::default(),
        }
    }
}

#[derive(Default)]
struct CallbackHandles {
    handle: Option<usize>,
    callbacks: VecDeque<TrigShared>,
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

pub(crate) fn cancel_all_triggers() {
    let mut state = TRIGGERS.with(|t| std::mem::replace(&mut *t.borrow_mut(), TriggerState::new()));
    let mut handles: Vec<usize> = Vec::new();
    handles.extend(state.read_only.handle.take());
    handles.extend(state.read_write.handle.take());
    handles.extend(state.timers.drain().filter_map(|(_, cb)| cb.handle));
    handles.extend(state.edges.drain().filter_map(|(_, cb)| cb.handle));
    for handle in handles {
        // the simulator may already be gone at the end of a run
        let _ = SIM_IF.cancel_callback(handle);
    }
}

#[derive(Debug, Clone)]
struct TrigShared {
    waker: Waker,
    fired: Rc<Cell<bool>>,
    // If trigger is an edge, react needs to know if it waits on a rising or falling edge
    // so an existing callback does not have to be rescheduled.
    edge_kind: EdgeKind,
}

impl TrigShared {
    fn fire(self) {
        self.fired.set(true);
        self.waker.wake();
    }
}

#[derive(Clone, Debug)]
pub enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(u64),
    ReadWrite,
    ReadOnly,
    Invalid(String),
}

#[derive(Clone)]
pub struct Trigger {
    kind: TrigKind,
    fired: Option<Rc<Cell<bool>>>,
}

impl Trigger {
    fn new(kind: TrigKind) -> Self {
        Trigger { kind, fired: None }
    }
    pub fn timer(time: u64, unit: &str) -> Self {
        match SIM_IF.get_sim_steps(time as f64, unit) {
            Ok(steps) => Trigger::new(TrigKind::Timer(steps)),
            Err(e) => Trigger::new(TrigKind::Invalid(e.to_string())),
        }
    }
    pub fn timer_steps(steps: u64) -> Self {
        Trigger::new(TrigKind::Timer(steps))
    }
    pub async fn timer_ro(time: u64, unit: &str) -> TbResult {
        Trigger::timer(time, unit).await?;
        Trigger::read_only().await?;
        Ok(Val::None)
    }
    pub async fn timer_rw(time: u64, unit: &str) -> TbResult {
        Trigger::timer(time, unit).await?;
        Trigger::read_write().await?;
        Ok(Val::None)
    }
    fn edge_kind(signal: SimObject, edge: EdgeKind) -> Self {
        match signal.kind() {
            ObjectKind::Int(_) => Trigger::new(TrigKind::Edge(signal.handle(), edge)),
            ObjectKind::Hier => Trigger::new(TrigKind::Invalid(
                SimError::NotWatchable { name: signal.name() }.to_string(),
            )),
        }
    }
    pub fn edge(signal: SimObject) -> Self {
        Trigger::edge_kind(signal, EdgeKind::Any)
    }
    pub fn rising_edge(signal: SimObject) -> Self {
        Trigger::edge_kind(signal, EdgeKind::Rising)
    }
    pub fn falling_edge(signal: SimObject) -> Self {
        Trigger::edge_kind(signal, EdgeKind::Falling)
    }
    pub fn read_write() -> Self {
        Trigger::new(TrigKind::ReadWrite)
    }
    pub fn read_only() -> Self {
        Trigger::new(TrigKind::ReadOnly)
    }

    fn register(&self, shared: TrigShared) -> Result<(), SimError> {
        match self.kind {
            TrigKind::ReadWrite => register_single(shared, SimCallback::ReadWrite, |s| &mut s.read_write),
            TrigKind::ReadOnly => register_single(shared, SimCallback::ReadOnly, |s| &mut s.read_only),
            TrigKind::Timer(t) => {
                // the simulator reports absolute time, not the delta
                let now = SIM_IF.get_sim_time_steps();
                let abs_time = now
                    .checked_add(t)
                    .ok_or(SimError::TimeOverflow { now, delay: t })?;
                register_keyed(shared, abs_time, SimCallback::Time(t), |s| &mut s.timers)
            }
            TrigKind::Edge(sig_hdl, _) => {
                register_keyed(shared, sig_hdl as u64, SimCallback::Edge(sig_hdl), |s| &mut s.edges)
            }
            TrigKind::Invalid(_) => unreachable!("invalid triggers resolve without registering"),
        }
    }
}

fn register_single(
    shared: TrigShared,
    cb: SimCallback,
    slot: fn(&mut TriggerState) -> &mut CallbackHandles,
) -> Result<(), SimError> {
    let has_handle = TRIGGERS.with(|t| {
        let mut t = t.borrow_mut();
        let handles = slot(&mut t);
        handles.callbacks.push_back(shared);
        handles.handle.is_some()
    });
    if !has_handle {
        let cb_hdl = SIM_IF.register_callback(cb)?;
        TRIGGERS.with(|t| slot(&mut t.borrow_mut()).handle.replace(cb_hdl));
    }
    Ok(())
}

fn register_keyed(
    shared: TrigShared,
    key: u64,
    cb: SimCallback,
    map: fn(&mut TriggerState) -> &mut IntMap<CallbackHandles>,
) -> Result<(), SimError> {
    let pending = TRIGGERS.with(|t| {
        let mut t = t.borrow_mut();
        match map(&mut t).get_mut(key) {
            Some(callbacks) => {
                callbacks.callbacks.push_back(shared);
                None
            }
            None => Some(shared),
        }
    });
    if let Some(shared) = pending {
        let handle = SIM_IF.register_callback(cb)?;
        let mut callbacks = VecDeque::new();
        callbacks.push_back(shared);
        TRIGGERS.with(|t| {
            map(&mut t.borrow_mut()).insert(
                key,
                CallbackHandles {
                    handle: Some(handle),
                    callbacks,
                },
            )
        });
    }
    Ok(())
}

impl Future for Trigger {
    type Output = TbResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let TrigKind::Invalid(msg) = &self.kind {
            return Poll::Ready(Err(Val::String(msg.clone())));
        }
        if let Some(fired) = &self.fired {
            return match fired.get() {
                true => Poll::Ready(Ok(Val::None)),
                false => Poll::Pending,
            };
        }
        let fired = Rc::new(Cell::new(false));
        let edge_kind = match self.kind {
            TrigKind::Edge(_, kind) => kind,
            _ => EdgeKind::Any,
        };
        let shared = TrigShared {
            waker: cx.waker().clone(),
            fired: fired.clone(),
            edge_kind,
        };
        self.fired = Some(fired);
        match self.register(shared) {
            Ok(()) => Poll::Pending,
            Err(e) => Poll::Ready(Err(e.into())),
        }
    }
}

#[inline]
pub(crate) fn react(cb: SimCallback, edge: Option<EdgeKind>) {
    let vec_wake = match cb {
        SimCallback::ReadWrite => TRIGGERS.with(|t| {
            let mut t = t.borrow_mut();
            // remove handle, since CB is now done
            t.read_write.handle = None;
            std::mem::take(&mut t.read_write.callbacks)
        }),
        SimCallback::ReadOnly => TRIGGERS.with(|t| {
            let mut t = t.borrow_mut();
            t.read_only.handle = None;
            std::mem::take(&mut t.read_only.callbacks)
        }),
        SimCallback::Time(t_abs) => TRIGGERS.with(|t| {
            t.borrow_mut()
                .timers
                .remove(t_abs)
                .map(|cb| cb.callbacks)
                .unwrap_or_default()
        }),
        SimCallback::Edge(sig_hdl) => react_edge(sig_hdl, edge.unwrap_or(EdgeKind::Any)),
    };

    if !vec_wake.is_empty() {
        for shared in vec_wake {
            shared.fire();
        }
        // execute woken tasks
        executor::run_once();
    }
}

fn react_edge(sig_hdl: usize, edge: EdgeKind) -> VecDeque<TrigShared> {
    let Some(mut callbacks) = TRIGGERS.with(|t| t.borrow_mut().edges.remove(sig_hdl as u64)) else {
        return VecDeque::new();
    };
    let (wake, resched): (VecDeque<TrigShared>, VecDeque<TrigShared>) = callbacks
        .callbacks
        .drain(..)
        .partition(|trig| edge == EdgeKind::Any || trig.edge_kind == EdgeKind::Any || trig.edge_kind == edge);
    if resched.is_empty() {
        // if no callbacks are remaining, cancel
        if let Some(handle) = callbacks.handle {
            let _ = SIM_IF.cancel_callback(handle);
        }
    } else {
        callbacks.callbacks = resched;
        TRIGGERS.with(|t| t.borrow_mut().edges.insert(sig_hdl as u64, callbacks));
    }
    wake
}
