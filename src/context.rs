//! Request-scoped cancellation
//!
//! A `Context` is handed to every lifecycle method. It carries the
//! cancellation signal propagated from the RPC call and an optional
//! deadline; the engine itself never enforces timeouts, it passes the
//! token through and returns when the user method returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time;

#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    deadline: Option<Instant>,
    done: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, done) = watch::channel(false);
        Self {
            inner: Arc::new(ContextInner {
                deadline: None,
                done,
                done_tx,
            }),
        }
    }

    /// A context that cancels itself after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let (done_tx, done) = watch::channel(false);

        let expire_tx = done_tx.clone();
        tokio::spawn(async move {
            time::sleep_until(deadline.into()).await;
            let _ = expire_tx.send(true);
        });

        Self {
            inner: Arc::new(ContextInner {
                deadline: Some(deadline),
                done,
                done_tx,
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.done.borrow()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// A channel that flips to `true` when work done on behalf of this
    /// context should stop.
    pub fn done(&self) -> watch::Receiver<bool> {
        self.inner.done.clone()
    }

    pub fn cancel(&self) {
        let _ = self.inner.done_tx.send(true);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn manual_cancel() {
        let ctx = Context::new();
        assert!(!ctx.is_cancelled());

        ctx.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn timeout_cancels() {
        let ctx = Context::with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_some());

        sleep(Duration::from_millis(100)).await;
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn done_channel_observes_cancellation() {
        let ctx = Context::new();
        let mut done = ctx.done();

        ctx.cancel();
        done.changed().await.unwrap();
        assert!(*done.borrow());
    }
}
