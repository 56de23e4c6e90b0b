use futures::{
    future::{FutureExt, LocalBoxFuture},
    task::{waker, ArcWake, Context, Poll},
};
use futures_channel::oneshot;
use intmap::IntMap;
use queues::{IsQueue, Queue};
use std::{cell::RefCell, future::Future, pin::Pin, sync::Arc};

use crate::sim_if::SIM_IF;
use crate::value::Val;
use crate::TbResult;

thread_local! {
    static EXECUTOR: RefCell<Executor> = RefCell::new(Executor::new());
}

struct Executor {
    ready: Queue<u64>,
    tasks: IntMap<TaskSlot>,
    next_id: u64,
}

impl Executor {
    fn new() -> Self {
        Self {
            ready: Queue::new(),
            tasks: IntMap::new(),
            next_id: 0,
        }
    }
}

/// Tasks forked by a test die with the test, system tasks outlive it.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub(crate) enum TaskScope {
    Test,
    System,
}

struct TaskSlot {
    // None while the future is being polled
    future: Option<LocalBoxFuture<'static, TbResult>>,
    name: String,
    scope: TaskScope,
    queued: bool,
    join_tx: Option<oneshot::Sender<TbResult>>,
}

struct TaskWaker {
    id: u64,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        schedule_task(arc_self.id);
    }
}

pub(crate) fn schedule_task(id: u64) {
    EXECUTOR.with(|e| {
        let mut e = e.borrow_mut();
        let queued = match e.tasks.get_mut(id) {
            Some(slot) if !slot.queued => {
                slot.queued = true;
                true
            }
            _ => false,
        };
        if queued {
            // Queue::add only fails on a capacity limit, the default queue has none
            let _ = e.ready.add(id);
        }
    });
}

fn next_task() -> Option<u64> {
    EXECUTOR.with(|e| e.borrow_mut().ready.remove().ok())
}

#[inline]
pub fn run_once() {
    while let Some(id) = next_task() {
        process_task(id);
    }
}

#[inline]
fn process_task(id: u64) {
    let fut = EXECUTOR.with(|e| {
        let mut e = e.borrow_mut();
        e.tasks.get_mut(id).and_then(|slot| {
            slot.queued = false;
            slot.future.take()
        })
    });
    // woken after completion or cancellation
    let Some(mut fut) = fut else { return };

    let waker = waker(Arc::new(TaskWaker { id }));
    let mut cx = Context::from_waker(&waker);
    match fut.as_mut().poll(&mut cx) {
        Poll::Pending => {
            // task may have been cancelled while it was polled, the future is dropped then
            let rest = EXECUTOR.with(|e| match e.borrow_mut().tasks.get_mut(id) {
                Some(slot) => {
                    slot.future = Some(fut);
                    None
                }
                None => Some(fut),
            });
            drop(rest);
        }
        Poll::Ready(result) => {
            let Some(mut slot) = EXECUTOR.with(|e| e.borrow_mut().tasks.remove(id)) else {
                return;
            };
            let unobserved = match slot.join_tx.take() {
                Some(tx) => tx.send(result).err(),
                None => Some(result),
            };
            // nobody awaits this task, so its error would otherwise go unseen
            if let Some(Err(e)) = unobserved {
                SIM_IF.log(&format!("Task {} failed: {:?}", slot.name, e));
            }
        }
    }
}

fn cancel_task(id: u64) {
    // slot is dropped outside the borrow, dropping the join sender wakes the awaiting task
    let slot = EXECUTOR.with(|e| e.borrow_mut().tasks.remove(id));
    drop(slot);
}

pub(crate) fn clear_ready_queue() {
    EXECUTOR.with(|e| {
        let mut e = e.borrow_mut();
        e.ready = Queue::new();
        for slot in e.tasks.values_mut() {
            slot.queued = false;
        }
    });
}

/// Cancels every task of the given scope.
pub(crate) fn cancel_scope(scope: TaskScope) {
    let ids: Vec<u64> = EXECUTOR.with(|e| {
        e.borrow()
            .tasks
            .iter()
            .filter(|(_, slot)| slot.scope == scope)
            .map(|(id, _)| *id)
            .collect()
    });
    for id in ids {
        cancel_task(id);
    }
}

/// Drops all tasks. Only used once a simulation ended.
pub(crate) fn reset() {
    let old = EXECUTOR.with(|e| std::mem::replace(&mut *e.borrow_mut(), Executor::new()));
    drop(old);
}

#[cfg(test)]
fn task_name(id: u64) -> Option<String> {
    EXECUTOR.with(|e| e.borrow().tasks.get(id).map(|s| s.name.clone()))
}

pub struct Task;

impl Task {
    pub fn fork(future: impl Future<Output = TbResult> + 'static) -> JoinHandle {
        Task::spawn_from_future(future, "forked")
    }
    pub fn spawn_from_future(future: impl Future<Output = TbResult> + 'static, name: &str) -> JoinHandle {
        Task::spawn(future.boxed_local(), name, TaskScope::Test)
    }
    pub(crate) fn spawn_system(future: impl Future<Output = TbResult> + 'static, name: &str) -> JoinHandle {
        Task::spawn(future.boxed_local(), name, TaskScope::System)
    }
    fn spawn(fut: LocalBoxFuture<'static, TbResult>, name: &str, scope: TaskScope) -> JoinHandle {
        let (tx, rx) = oneshot::channel::<TbResult>();
        let id = EXECUTOR.with(|e| {
            let mut e = e.borrow_mut();
            let id = e.next_id;
            e.next_id += 1;
            e.tasks.insert(
                id,
                TaskSlot {
                    future: Some(fut),
                    name: name.to_string(),
                    scope,
                    queued: false,
                    join_tx: Some(tx),
                },
            );
            id
        });
        schedule_task(id);
        JoinHandle { task: id, join_rx: rx }
    }
}

pub struct JoinHandle {
    task: u64,
    join_rx: oneshot::Receiver<TbResult>,
}

impl JoinHandle {
    #[cfg(test)]
    pub(crate) fn task_id(&self) -> u64 {
        self.task
    }
    pub fn cancel(self) {
        cancel_task(self.task);
    }
}

impl Future for JoinHandle {
    type Output = TbResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => {
                Poll::Ready(Err(Val::String(format!("task {} was cancelled", self.task))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tb_obj::TbObj;

    #[test]
    fn join_handle_yields_task_result() {
        reset();
        let seen = TbObj::new(None);
        let seen_c = seen.clone();
        Task::fork(async move {
            let inner = Task::fork(async { Ok(Val::Int(7)) });
            let r = inner.await;
            *seen_c.get_mut() = Some(r.clone());
            r
        });
        run_once();
        assert_eq!(*seen.get(), Some(Ok(Val::Int(7))));
        reset();
    }

    #[test]
    fn cancelled_task_resolves_join_with_error() {
        reset();
        let (tx, rx) = oneshot::channel::<()>();
        let pending = Task::fork(async move {
            let _ = rx.await;
            Ok(Val::None)
        });
        let pending_id = pending.task_id();
        let seen = TbObj::new(None);
        let seen_c = seen.clone();
        Task::fork(async move {
            *seen_c.get_mut() = Some(pending.await);
            Ok(Val::None)
        });
        run_once();
        assert!(seen.get().is_none());

        cancel_task(pending_id);
        run_once();
        assert!(matches!(*seen.get(), Some(Err(_))));
        drop(tx);
        reset();
    }

    #[test]
    fn cancel_scope_keeps_system_tasks() {
        reset();
        let sys = Task::spawn_system(futures::future::pending(), "system");
        let test = Task::fork(futures::future::pending());
        run_once();
        cancel_scope(TaskScope::Test);
        assert!(task_name(sys.task_id()).is_some());
        assert!(task_name(test.task_id()).is_none());
        reset();
    }
}
