//! Middleware around method handlers.
//!
//! A [`Middleware`] maps a handler to a handler. Each session role keeps
//! one [`HandlerChain`] for incoming traffic and one for outgoing traffic;
//! middleware added to a chain wraps everything already there.
//!
//! Within one [`HandlerChain::add`] call the first middleware listed runs
//! outermost.

use std::sync::Arc;

use crate::method::MethodHandler;

/// A function from handler to handler.
pub type Middleware<S> = Arc<dyn Fn(MethodHandler<S>) -> MethodHandler<S> + Send + Sync>;

/// Wrap `handler` with `middleware`, the first entry outermost.
#[must_use]
pub fn apply<S>(handler: MethodHandler<S>, middleware: &[Middleware<S>]) -> MethodHandler<S> {
    middleware.iter().rev().fold(handler, |inner, m| m(inner))
}

/// The current handler for one direction of a session role.
pub struct HandlerChain<S> {
    current: MethodHandler<S>,
}

impl<S> HandlerChain<S> {
    /// Start from the default handler.
    pub fn new(base: MethodHandler<S>) -> Self {
        Self { current: base }
    }

    /// Wrap the current handler.
    pub fn add(&mut self, middleware: &[Middleware<S>]) {
        self.current = apply(Arc::clone(&self.current), middleware);
    }

    /// The handler to dispatch through.
    #[must_use]
    pub fn handler(&self) -> MethodHandler<S> {
        Arc::clone(&self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct Session;

    fn recording(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Middleware<Session> {
        Arc::new(move |next: MethodHandler<Session>| {
            let log = Arc::clone(&log);
            let wrapped: MethodHandler<Session> = Arc::new(move |ctx, session, method, params| {
                log.lock().unwrap().push(format!("{name}>"));
                let next = Arc::clone(&next);
                let log = Arc::clone(&log);
                Box::pin(async move {
                    let result = next(ctx, session, method, params).await;
                    log.lock().unwrap().push(format!("<{name}"));
                    result
                })
            });
            wrapped
        })
    }

    #[tokio::test]
    async fn test_first_listed_runs_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let base: MethodHandler<Session> = {
            let log = Arc::clone(&log);
            Arc::new(move |_, _, _, _| {
                log.lock().unwrap().push("handler".to_string());
                Box::pin(async { Ok(json!({})) })
            })
        };

        let mut chain = HandlerChain::new(base);
        chain.add(&[
            recording("a", Arc::clone(&log)),
            recording("b", Arc::clone(&log)),
        ]);
        chain.add(&[recording("c", Arc::clone(&log))]);

        chain.handler()(Context::new(), Arc::new(Session), "ping".to_string(), Value::Null)
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["c>", "a>", "b>", "handler", "<b", "<a", "<c"]
        );
    }
}
