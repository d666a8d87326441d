//! Deterministic test doubles: a manual clock/timer runtime, a scripted transport and a
//! single-threaded driver that runs spawned tasks until they stall.

use crate::api::{HttpRequest, HttpResponse, Transport, TransportError};
use crate::runtime::Runtime;
use futures::channel::oneshot;
use futures::executor::LocalPool;
use futures::future::{self, LocalBoxFuture};
use futures::task::LocalSpawnExt;
use futures::{Future, FutureExt};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

thread_local! {
    static SPAWNED: RefCell<Vec<LocalBoxFuture<'static, ()>>> = RefCell::new(Vec::new());
}

struct Timer {
    deadline: i64,
    seq: u64,
    tx: oneshot::Sender<()>,
}

#[derive(Default)]
struct Clock {
    now: i64,
    next_seq: u64,
    timers: Vec<Timer>,
    sleeps: Vec<u32>,
}

/// Clock that only moves when the test says so.
#[derive(Default)]
pub(crate) struct ManualRuntime {
    clock: Mutex<Clock>,
}

impl ManualRuntime {
    /// Every sleep duration requested so far, in order.
    pub fn sleeps(&self) -> Vec<u32> {
        self.clock.lock().unwrap().sleeps.clone()
    }

    pub fn set_now(&self, now: i64) {
        self.clock.lock().unwrap().now = now;
    }

    /// Fire the earliest live timer with `deadline <= until`, moving the clock to it.
    fn fire_next(&self, until: Option<i64>) -> bool {
        let mut clock = self.clock.lock().unwrap();
        clock.timers.retain(|t| !t.tx.is_canceled());

        let Some(idx) = clock
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| until.map_or(true, |u| t.deadline <= u))
            .min_by_key(|(_, t)| (t.deadline, t.seq))
            .map(|(i, _)| i)
        else {
            return false;
        };

        let timer = clock.timers.remove(idx);
        clock.now = clock.now.max(timer.deadline);
        drop(clock);
        let _ = timer.tx.send(());
        true
    }

    pub fn pending_timers(&self) -> usize {
        let mut clock = self.clock.lock().unwrap();
        clock.timers.retain(|t| !t.tx.is_canceled());
        clock.timers.len()
    }
}

impl Runtime for ManualRuntime {
    fn now_ms(&self) -> i64 {
        self.clock.lock().unwrap().now
    }

    fn sleep(&self, ms: u32) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        let mut clock = self.clock.lock().unwrap();
        let deadline = clock.now + i64::from(ms);
        let seq = clock.next_seq;
        clock.next_seq += 1;
        clock.sleeps.push(ms);
        clock.timers.push(Timer { deadline, seq, tx });
        rx.map(|_| ()).boxed_local()
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        SPAWNED.with(|q| q.borrow_mut().push(task));
    }
}

/// Runs everything on one thread, like the browser event loop.
pub(crate) struct Driver {
    pool: LocalPool,
    pub runtime: Arc<ManualRuntime>,
}

impl Driver {
    pub fn new() -> Self {
        SPAWNED.with(|q| q.borrow_mut().clear());
        Self {
            pool: LocalPool::new(),
            runtime: Arc::new(ManualRuntime::default()),
        }
    }

    /// Run until no task can make progress without a timer firing.
    pub fn settle(&mut self) {
        loop {
            let tasks = SPAWNED.with(|q| std::mem::take(&mut *q.borrow_mut()));
            let spawner = self.pool.spawner();
            for task in tasks {
                spawner.spawn_local(task).expect("spawn task");
            }
            self.pool.run_until_stalled();
            if SPAWNED.with(|q| q.borrow().is_empty()) {
                break;
            }
        }
    }

    /// Move the clock forward by `ms`, firing due timers in order.
    pub fn advance(&mut self, ms: i64) {
        self.settle();
        let target = self.runtime.now_ms() + ms;
        while self.runtime.fire_next(Some(target)) {
            self.settle();
        }
        self.runtime.set_now(target);
        self.settle();
    }

    pub fn spawn_result<T: 'static>(
        &mut self,
        fut: impl Future<Output = T> + 'static,
    ) -> Rc<RefCell<Option<T>>> {
        let slot = Rc::new(RefCell::new(None));
        let out = slot.clone();
        self.pool
            .spawner()
            .spawn_local(async move {
                *out.borrow_mut() = Some(fut.await);
            })
            .expect("spawn future");
        slot
    }

    /// Drive `fut` to completion, jumping the clock to each pending timer as needed.
    pub fn block_on<T: 'static>(&mut self, fut: impl Future<Output = T> + 'static) -> T {
        let slot = self.spawn_result(fut);
        loop {
            self.settle();
            if let Some(v) = slot.borrow_mut().take() {
                return v;
            }
            assert!(self.runtime.fire_next(None), "future stalled with no pending timers");
        }
    }
}

enum Reply {
    Ready(Result<HttpResponse, TransportError>),
    Gated(oneshot::Receiver<Result<HttpResponse, TransportError>>),
    Hang,
}

pub(crate) type Gate = oneshot::Sender<Result<HttpResponse, TransportError>>;

/// Transport that answers from a queue and records every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn push(&self, reply: Result<HttpResponse, TransportError>) {
        self.replies.lock().unwrap().push_back(Reply::Ready(reply));
    }

    /// Queue a reply that stays pending until the returned gate is sent.
    pub fn push_gated(&self) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().unwrap().push_back(Reply::Gated(rx));
        tx
    }

    pub fn push_hang(&self) {
        self.replies.lock().unwrap().push_back(Reply::Hang);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, req: HttpRequest) -> LocalBoxFuture<'static, Result<HttpResponse, TransportError>> {
        let url = req.url.clone();
        self.requests.lock().unwrap().push(req);

        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Ready(reply)) => future::ready(reply).boxed_local(),
            Some(Reply::Gated(rx)) => rx
                .map(|r| r.unwrap_or_else(|_| Err(TransportError::Failed("gate dropped".into()))))
                .boxed_local(),
            Some(Reply::Hang) => future::pending().boxed_local(),
            None => future::ready(Err(TransportError::Failed(format!("unscripted request to {url}"))))
                .boxed_local(),
        }
    }
}

pub(crate) fn json_response(status: u16, value: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status,
        content_type: Some("application/json".to_string()),
        body: value.to_string(),
    }
}

pub(crate) fn text_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        content_type: Some("text/plain".to_string()),
        body: body.to_string(),
    }
}

pub(crate) fn no_content() -> HttpResponse {
    HttpResponse {
        status: 204,
        content_type: None,
        body: String::new(),
    }
}

pub(crate) fn unreachable_reply() -> Result<HttpResponse, TransportError> {
    Err(TransportError::Unreachable("Failed to fetch".to_string()))
}
