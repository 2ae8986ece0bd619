use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{Layer, Service};

use super::RouteResolver;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 出站调用中间件：发出请求前用路由决策改写请求 URI
#[derive(Debug, Clone)]
pub struct IsolationLayer {
    resolver: Arc<RouteResolver>,
}

impl IsolationLayer {
    pub fn new(resolver: Arc<RouteResolver>) -> Self {
        Self { resolver }
    }
}

impl<S> Layer<S> for IsolationLayer {
    type Service = IsolationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IsolationService {
            inner,
            resolver: self.resolver.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationService<S> {
    inner: S,
    resolver: Arc<RouteResolver>,
}

impl<S, B> Service<http::Request<B>> for IsolationService<S>
where
    S: Service<http::Request<B>> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        // 使用已就绪的 inner，留下克隆供下一次 poll_ready
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let resolver = self.resolver.clone();

        Box::pin(async move {
            let original = req.uri().to_string();
            let resolved = match resolver.resolve(&original).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::error!(destination = %original, error = %e, "Refusing outbound call");
                    return Err(e.into());
                }
            };

            if resolved != original {
                *req.uri_mut() = resolved.parse::<http::Uri>()?;
            }

            inner.call(req).await.map_err(Into::into)
        })
    }
}
