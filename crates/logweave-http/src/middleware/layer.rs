//! Middleware chain
//!
//! Layers wrap a [`BoxedNext`] continuation. A stack is folded from the
//! inside out so the first layer pushed runs first on the way in and last
//! on the way out.

use crate::error::{BoxError, HandlerResult};
use crate::request::Request;
use crate::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_service::Service;

/// Future produced by handlers and layers
pub type ResponseFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// A boxed next function for middleware chains
pub type BoxedNext = Arc<dyn Fn(Request) -> ResponseFuture + Send + Sync>;

/// Wrap an async function as the innermost handler of a chain
pub fn handler_fn<F, Fut>(f: F) -> BoxedNext
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |req: Request| Box::pin(f(req)) as ResponseFuture)
}

/// A middleware around the rest of the chain
pub trait MiddlewareLayer: Send + Sync + 'static {
    /// Handle `req`, calling `next` to continue the chain
    fn call(&self, req: Request, next: BoxedNext) -> ResponseFuture;

    /// Clone this middleware into a boxed trait object
    fn clone_box(&self) -> Box<dyn MiddlewareLayer>;
}

impl Clone for Box<dyn MiddlewareLayer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A stack of middleware layers
#[derive(Clone, Default)]
pub struct LayerStack {
    layers: Vec<Box<dyn MiddlewareLayer>>,
}

impl LayerStack {
    /// Create a new empty layer stack
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add a layer; layers run in the order they are added (outermost first)
    pub fn push(&mut self, layer: Box<dyn MiddlewareLayer>) {
        self.layers.push(layer);
    }

    /// Add a layer that runs before every other one
    pub fn prepend(&mut self, layer: Box<dyn MiddlewareLayer>) {
        self.layers.insert(0, layer);
    }

    /// Builder form of [`LayerStack::push`]
    pub fn layer<L: MiddlewareLayer>(mut self, layer: L) -> Self {
        self.push(Box::new(layer));
        self
    }

    /// Check if the stack is empty
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Get the number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Fold the stack around `handler` into a single continuation
    pub fn into_next(&self, handler: BoxedNext) -> BoxedNext {
        let mut next = handler;
        for layer in self.layers.iter().rev() {
            let layer: Arc<dyn MiddlewareLayer> = Arc::from(layer.clone_box());
            let current_next = next;
            next = Arc::new(move |req: Request| layer.call(req, current_next.clone()));
        }
        next
    }

    /// Run `req` through the stack and `handler`
    pub fn execute(&self, req: Request, handler: BoxedNext) -> ResponseFuture {
        if self.layers.is_empty() {
            return handler(req);
        }
        self.into_next(handler)(req)
    }

    /// The stack around `handler` as a tower service
    pub fn service(&self, handler: BoxedNext) -> NextService {
        NextService::new(self.into_next(handler))
    }
}

/// Tower adapter over a continuation
pub struct NextService {
    next: BoxedNext,
}

impl NextService {
    /// Wrap `next`
    pub fn new(next: BoxedNext) -> Self {
        Self { next }
    }
}

impl Clone for NextService {
    fn clone(&self) -> Self {
        Self {
            next: self.next.clone(),
        }
    }
}

impl Service<Request> for NextService {
    type Response = Response;
    type Error = BoxError;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        (self.next)(req)
    }
}
