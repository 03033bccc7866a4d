//! Tick-aligned request/response over the event scheduler.
//!
//! Callers outside the tick (a narration service, an HTTP front end) ask a
//! question by publishing an `AsyncRequest` event that carries a one-shot
//! [`Responder`]. A subscriber answers it when the event is delivered during
//! the next drain, and the caller's future resolves with that answer. If no
//! subscriber replies, every clone of the responder is dropped once the
//! drain finishes and the caller sees [`RequestError::Unanswered`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;
use verdant_events::{
    AsyncRequest, Event, EventKind, EventPayload, Publisher, Responder, Scheduler, SubscriptionId,
};

/// Errors a bridged request can end with.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Delivery finished without any subscriber replying.
    #[error("request {request_id} ({label}) was not answered")]
    Unanswered {
        /// The request id.
        request_id: u64,
        /// The request label.
        label: String,
    },

    /// The answering subscriber reported a failure.
    #[error("request {request_id} was rejected: {message}")]
    Rejected {
        /// The request id.
        request_id: u64,
        /// The subscriber's failure message.
        message: String,
    },

    /// No reply arrived within the caller's time budget.
    #[error("request {request_id} timed out after {}ms", after.as_millis())]
    TimedOut {
        /// The request id.
        request_id: u64,
        /// The budget that elapsed.
        after: Duration,
    },
}

/// Publishes requests and awaits their replies.
#[derive(Debug, Clone)]
pub struct RequestBridge {
    publisher: Publisher,
    source: String,
    next_request: Arc<AtomicU64>,
}

impl RequestBridge {
    /// Create a bridge publishing onto `scheduler`.
    pub fn new(scheduler: &Scheduler, source: impl Into<String>) -> Self {
        Self {
            publisher: scheduler.publisher(),
            source: source.into(),
            next_request: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Publish a request and wait for its reply.
    ///
    /// The reply arrives when the scheduler is next drained, so this future
    /// must be polled concurrently with the tick loop.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Unanswered`] if no subscriber replied, or
    /// [`RequestError::Rejected`] if the subscriber answered with a failure.
    pub async fn request(&self, label: impl Into<String>, data: serde_json::Value) -> Result<serde_json::Value, RequestError> {
        self.request_inner(label.into(), data, None).await
    }

    /// Like [`request`](Self::request), giving up after `after`.
    ///
    /// # Errors
    ///
    /// Additionally returns [`RequestError::TimedOut`].
    pub async fn request_with_timeout(
        &self,
        label: impl Into<String>,
        data: serde_json::Value,
        after: Duration,
    ) -> Result<serde_json::Value, RequestError> {
        self.request_inner(label.into(), data, Some(after)).await
    }

    async fn request_inner(
        &self,
        label: String,
        data: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value, RequestError> {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (responder, reply) = Responder::channel();
        debug!(request_id, label = %label, "Publishing request");
        self.publisher.publish(
            Event::new(EventPayload::AsyncRequest(AsyncRequest {
                request_id,
                label: label.clone(),
                data,
                responder,
            }))
            .with_source(self.source.clone()),
        );

        let received = match timeout {
            Some(after) => tokio::time::timeout(after, reply)
                .await
                .map_err(|_elapsed| RequestError::TimedOut { request_id, after })?,
            None => reply.await,
        };

        match received {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(RequestError::Rejected {
                request_id,
                message,
            }),
            Err(_closed) => Err(RequestError::Unanswered { request_id, label }),
        }
    }
}

/// Answer requests labelled `label` with `answer`.
///
/// The first subscriber to reply wins; later replies to the same request are
/// ignored.
pub fn serve<F>(scheduler: &Scheduler, label: impl Into<String>, answer: F) -> SubscriptionId
where
    F: Fn(&serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync + 'static,
{
    let label = label.into();
    let answer = Arc::new(answer);
    scheduler.subscribe_filtered(
        EventKind::AsyncRequest,
        move |event| {
            let answer = Arc::clone(&answer);
            async move {
                if let Some(request) = event.as_request() {
                    let sent = match answer(&request.data) {
                        Ok(value) => request.responder.respond(value),
                        Err(message) => request.responder.fail(message),
                    };
                    debug!(request_id = request.request_id, sent, "Request answered");
                }
                Ok(())
            }
        },
        move |event| event.as_request().is_some_and(|request| request.label == label),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_is_answered_during_drain() {
        let scheduler = Scheduler::default();
        serve(&scheduler, "describe", |data| {
            Ok(serde_json::json!({ "summary": format!("region {}", data["region"]) }))
        });
        let bridge = RequestBridge::new(&scheduler, "narrator");

        let pending = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.request("describe", serde_json::json!({ "region": 4 })).await }
        });
        while scheduler.pending_len() == 0 {
            tokio::task::yield_now().await;
        }
        let report = scheduler.drain().await;
        assert_eq!(report.delivered, 1);

        let value = pending.await.unwrap().unwrap();
        assert_eq!(value["summary"], "region 4");
    }

    #[tokio::test]
    async fn other_labels_are_ignored() {
        let scheduler = Scheduler::default();
        serve(&scheduler, "describe", |_| Ok(serde_json::Value::Null));
        let bridge = RequestBridge::new(&scheduler, "narrator");

        let (result, report) = tokio::join!(bridge.request("forecast", serde_json::Value::Null), async {
            while scheduler.pending_len() == 0 {
                tokio::task::yield_now().await;
            }
            scheduler.drain().await
        });

        assert_eq!(report.filtered, 1);
        assert!(matches!(result, Err(RequestError::Unanswered { .. })));
    }

    #[tokio::test]
    async fn failures_are_reported_as_rejections() {
        let scheduler = Scheduler::default();
        serve(&scheduler, "describe", |_| Err("no data".to_owned()));
        let bridge = RequestBridge::new(&scheduler, "narrator");

        let (result, _) = tokio::join!(bridge.request("describe", serde_json::Value::Null), async {
            while scheduler.pending_len() == 0 {
                tokio::task::yield_now().await;
            }
            scheduler.drain().await
        });

        match result {
            Err(RequestError::Rejected { message, .. }) => assert_eq!(message, "no data"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn undrained_request_times_out() {
        let scheduler = Scheduler::default();
        let bridge = RequestBridge::new(&scheduler, "narrator");
        let result = bridge
            .request_with_timeout("describe", serde_json::Value::Null, Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(RequestError::TimedOut { .. })));
        assert_eq!(scheduler.pending_len(), 1);
    }
}
