//! Response body that queues post-response hooks once the transport is done
//! with it.

use crate::hooks::{HookContext, HookDispatcher};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::{Body, Frame, SizeHint};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

pub struct HookedBody {
    inner: Full<Bytes>,
    pending: Option<(Arc<HookDispatcher>, HookContext)>,
}

impl HookedBody {
    pub fn new(bytes: Bytes) -> Self {
        Self {
            inner: Full::new(bytes),
            pending: None,
        }
    }

    /// Dispatch `context` when this body is dropped, which hyper does after
    /// the last frame is written (or when the connection goes away).
    pub fn with_hook(mut self, dispatcher: Arc<HookDispatcher>, context: HookContext) -> Self {
        self.pending = Some((dispatcher, context));
        self
    }
}

impl Body for HookedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for HookedBody {
    fn drop(&mut self) {
        if let Some((dispatcher, context)) = self.pending.take() {
            dispatcher.dispatch(context);
        }
    }
}
