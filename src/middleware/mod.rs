//! Middleware pipeline: composable before/after request handler logic.
//!
//! This module defines the core types for building an ordered middleware stack
//! that ends in a single endpoint handler. Each middleware wraps the next
//! layer, enabling request inspection, short-circuit responses, and response
//! decoration without coupling handlers to infrastructure concerns.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer. Once every middleware has run, `run` invokes
//!   the endpoint.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`Handler`]: the type-erased endpoint.
//! - [`Pipeline`]: the assembled stack; [`Pipeline::dispatch`] serves one request.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{Request, Response, context::Context};

/// Type-erased, heap-allocated async endpoint that processes a [`Context`] and
/// returns a [`Response`].
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// A type-erased, reference-counted middleware function.
///
/// Every entry in the middleware stack is stored as a `MiddlewareHandler`.
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is the pass-through signal given to each middleware: calling
/// [`Next::run`] hands the request to the following layer. It is consumed on
/// each call, so a middleware can forward a request at most once.
///
/// # Examples
///
/// ```rust,no_run
/// use std::pin::Pin;
/// use rttp_cache::{Response, context::Context, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         ctx: Context,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Response> + Send>> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    endpoint: Handler,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

impl Next {
    /// Creates a new `Next` positioned at the start of `middlewares`, ending in
    /// `endpoint`.
    pub fn new(middlewares: Vec<MiddlewareHandler>, endpoint: Handler) -> Self {
        Self {
            middlewares,
            endpoint,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain, or the endpoint once the
    /// chain is exhausted, and returns its response.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through**: call `next.run(ctx).await` without modification.
/// - **Short-circuit**: return a [`Response`] directly without calling `next`.
/// - **Decorate**: call `next.run(ctx).await`, inspect the response, and return
///   a modified copy.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync` because middleware is shared across
///   Tokio tasks.
/// - `handle` **must** return a pinned, `Send` future so it can be awaited across
///   `.await` points in multi-threaded runtimes.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// An ordered middleware stack terminating in an endpoint handler.
///
/// Middleware added with [`layer`](Self::layer) runs outermost-first in the
/// order it was added.
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_cache::{Request, Response, StatusCode, middleware::Pipeline};
///
/// # async fn example() {
/// let pipeline = Pipeline::new(|_ctx| async { Response::new(StatusCode::Ok).body("hi") });
/// let response = pipeline.dispatch(Request::get("/")).await;
/// assert_eq!(response.status(), StatusCode::Ok);
/// # }
/// ```
pub struct Pipeline {
    middlewares: Vec<MiddlewareHandler>,
    endpoint: Handler,
}

impl Pipeline {
    /// Creates a pipeline with no middleware around `endpoint`.
    pub fn new<H, F>(endpoint: H) -> Self
    where
        H: Fn(Context) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let endpoint: Handler = Arc::new(
            move |ctx: Context| -> Pin<Box<dyn Future<Output = Response> + Send>> {
                Box::pin(endpoint(ctx))
            },
        );
        Self {
            middlewares: Vec::new(),
            endpoint,
        }
    }

    /// Appends `middleware` to the stack.
    #[must_use]
    pub fn layer<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.middlewares.push(from_middleware(Arc::new(middleware)));
        self
    }

    /// Returns the number of middleware layers.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if the endpoint is called directly.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs `request` through every layer and the endpoint.
    pub async fn dispatch(&self, request: Request) -> Response {
        let next = Next::new(self.middlewares.clone(), Arc::clone(&self.endpoint));
        next.run(Context::new(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            let tag = self.0;
            Box::pin(async move {
                let mut response = next.run(ctx).await;
                response.add_header("X-Layer", tag);
                response
            })
        }
    }

    struct Deny;

    impl Middleware for Deny {
        fn handle(&self, _ctx: Context, _next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(async { Response::new(StatusCode::Forbidden) })
        }
    }

    #[tokio::test]
    async fn empty_pipeline_calls_endpoint() {
        let pipeline = Pipeline::new(|ctx: Context| async move {
            Response::new(StatusCode::Ok).body(ctx.request().path().to_owned())
        });
        assert!(pipeline.is_empty());

        let response = pipeline.dispatch(Request::get("/echo")).await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.body_ref(), b"/echo");
    }

    #[tokio::test]
    async fn layers_wrap_in_order() {
        let pipeline = Pipeline::new(|_ctx: Context| async { Response::new(StatusCode::Ok) })
            .layer(Tag("outer"))
            .layer(Tag("inner"));
        assert_eq!(pipeline.len(), 2);

        let response = pipeline.dispatch(Request::get("/")).await;
        let layers: Vec<_> = response.headers().get_all("x-layer").collect();
        // the inner layer decorates first on the way out
        assert_eq!(layers, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_endpoint() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pipeline = Pipeline::new(move |_ctx: Context| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Response::new(StatusCode::Ok) }
        })
        .layer(Deny);

        let response = pipeline.dispatch(Request::get("/")).await;
        assert_eq!(response.status(), StatusCode::Forbidden);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
