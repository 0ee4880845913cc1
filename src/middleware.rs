//! The generic onion middleware stack (spec.md §4.3).
//!
//! Parameterized over a context type `C` and a result type `R`. A handler is
//! `C -> R`; a middleware is `(C, next) -> R`. `build()` composes the
//! registered middlewares around a terminal handler so that the first
//! registered middleware is outermost — closest existing pattern in the
//! teacher is `EventHandler` (an async trait object invoked at lifecycle
//! points in `agent.rs`); this generalizes that shape from a fixed event
//! enum to an arbitrary context/result pair and a chain-of-responsibility
//! instead of a flat notification.

use futures_util::future::BoxFuture;
use std::sync::Arc;

/// A terminal or composed handler: consumes the context and produces a
/// result. Boxed so stacks over different `(C, R)` pairs have a uniform
/// storage representation.
pub type Handler<C, R> = Arc<dyn Fn(C) -> BoxFuture<'static, R> + Send + Sync>;

/// The continuation passed to a middleware. Calling it zero times
/// short-circuits the chain (spec.md §4.3: "short-circuit by producing a
/// result without calling next"); calling it more than once isn't prevented
/// by the type but isn't a meaningful operation either — `next` consumes its
/// `FnOnce` closure on first call.
pub type Next<C, R> = Box<dyn FnOnce(C) -> BoxFuture<'static, R> + Send>;

pub type MiddlewareFn<C, R> = Arc<dyn Fn(C, Next<C, R>) -> BoxFuture<'static, R> + Send + Sync>;

/// An ordered list of middlewares over one `(C, R)` pair.
///
/// Registration is append-only and expected to happen at startup, before the
/// stack's owner (e.g. [`crate::engine::Engine`]) begins serving calls —
/// spec.md §5 explicitly does not require stacks to be safe for mutation
/// concurrent with a call.
pub struct MiddlewareStack<C, R> {
    middlewares: Vec<MiddlewareFn<C, R>>,
}

impl<C, R> Default for MiddlewareStack<C, R> {
    fn default() -> Self {
        Self { middlewares: Vec::new() }
    }
}

impl<C, R> MiddlewareStack<C, R>
where
    C: Send + 'static,
    R: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware. The first one appended ends up outermost.
    pub fn use_mw(&mut self, mw: MiddlewareFn<C, R>) -> &mut Self {
        self.middlewares.push(mw);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Compose the registered middlewares around `terminal`, first-registered
    /// outermost. With `middlewares = [A, B]` and terminal `T`, the built
    /// handler calls `A_enter -> B_enter -> T -> B_exit -> A_exit`
    /// (property 8 in spec.md §8).
    pub fn build(&self, terminal: Handler<C, R>) -> Handler<C, R> {
        let mut handler = terminal;
        for mw in self.middlewares.iter().rev() {
            let mw = mw.clone();
            let inner = handler.clone();
            handler = Arc::new(move |ctx: C| {
                let mw = mw.clone();
                let inner = inner.clone();
                let next: Next<C, R> = Box::new(move |ctx2: C| inner(ctx2));
                mw(ctx, next)
            });
        }
        handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    fn terminal_handler(log: StdArc<std::sync::Mutex<Vec<&'static str>>>) -> Handler<(), ()> {
        Arc::new(move |_ctx| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push("terminal");
            })
        })
    }

    fn tracing_mw(name: &'static str, log: StdArc<std::sync::Mutex<Vec<&'static str>>>) -> MiddlewareFn<(), ()> {
        Arc::new(move |ctx, next| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(name);
                next(ctx).await;
                log.lock().unwrap().push(name);
            })
        })
    }

    #[tokio::test]
    async fn outermost_first_registration_order() {
        let log = StdArc::new(std::sync::Mutex::new(Vec::new()));
        let mut stack: MiddlewareStack<(), ()> = MiddlewareStack::new();
        stack.use_mw(tracing_mw("A", log.clone()));
        stack.use_mw(tracing_mw("B", log.clone()));
        let handler = stack.build(terminal_handler(log.clone()));
        handler(()).await;
        let events = log.lock().unwrap().clone();
        assert_eq!(events, vec!["A", "B", "terminal", "B", "A"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_terminal() {
        let calls = StdArc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let mut stack: MiddlewareStack<(), i32> = MiddlewareStack::new();
        stack.use_mw(Arc::new(move |_ctx, _next| {
            let calls = calls2.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                42
            })
        }));
        let terminal: Handler<(), i32> = Arc::new(|_ctx| Box::pin(async move { panic!("terminal must not run") }));
        let handler = stack.build(terminal);
        let result = handler(()).await;
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
