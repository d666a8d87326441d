use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

/// Clock, timers and task spawning for the sync core.
///
/// The controller and client only suspend on futures handed out here, so a test clock can
/// drive them deterministically.
pub(crate) trait Runtime: Send + Sync + 'static {
    fn now_ms(&self) -> i64;

    /// Resolves after `ms` milliseconds.
    fn sleep(&self, ms: u32) -> LocalBoxFuture<'static, ()>;

    /// Run a task on the current (single) logical thread.
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

/// Browser event loop: `Date.now()`, `setTimeout`, `spawn_local`.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct BrowserRuntime;

impl Runtime for BrowserRuntime {
    fn now_ms(&self) -> i64 {
        crate::util::now_ms()
    }

    fn sleep(&self, ms: u32) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel::<()>();

        // Without a window the sender is dropped and the sleep resolves immediately.
        let Some(win) = web_sys::window() else {
            return rx.map(|_| ()).boxed_local();
        };
        let callback: Closure<dyn FnMut()> = Closure::once(move || {
            let _ = tx.send(());
        });
        let timeout = i32::try_from(ms).unwrap_or(i32::MAX);
        let Ok(handle) = win.set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.as_ref().unchecked_ref(),
            timeout,
        ) else {
            // Dropping the callback drops the sender, so this resolves right away.
            return rx.map(|_| ()).boxed_local();
        };

        TimerFuture {
            rx,
            handle: Some(handle),
            _callback: callback,
        }
        .boxed_local()
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        leptos::task::spawn_local(task);
    }
}

/// A pending `setTimeout`. Dropped before it fires, it clears the browser timer and frees
/// the callback.
struct TimerFuture {
    rx: oneshot::Receiver<()>,
    handle: Option<i32>,
    _callback: Closure<dyn FnMut()>,
}

impl Future for TimerFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.rx.poll_unpin(cx) {
            Poll::Ready(_) => {
                self.handle = None;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TimerFuture {
    fn drop(&mut self) {
        if let (Some(handle), Some(win)) = (self.handle.take(), web_sys::window()) {
            win.clear_timeout_with_handle(handle);
            log::trace!("event=timer_cleared module=runtime status=ok");
        }
    }
}
