//! Request/reply loop shared by the NATS front end.
//!
//! Requests are answered on worker tasks bounded by a semaphore. Stopping the
//! responder ends the subscription, waits for every in-flight reply and
//! flushes the sink before returning.

use crate::pipeline::GradePredictor;
use crate::request::handle_payload;
use anyhow::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One prediction request as received from the bus
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRequest {
    pub subject: String,
    /// Subject to answer on; requests without one are processed and logged only
    pub reply: Option<String>,
    pub payload: Vec<u8>,
}

impl From<async_nats::Message> for IncomingRequest {
    fn from(message: async_nats::Message) -> Self {
        Self {
            subject: message.subject.to_string(),
            reply: message.reply.map(|s| s.to_string()),
            payload: message.payload.to_vec(),
        }
    }
}

/// Destination for serialized responses
#[async_trait]
pub trait ReplySink: Clone + Send + Sync + 'static {
    async fn reply(&self, reply_to: String, request_id: &str, body: Vec<u8>) -> Result<()>;

    /// Push out anything still buffered
    async fn flush(&self) -> Result<()>;
}

/// Handle to a running responder
pub struct Responder {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Responder {
    /// Answer `requests` until [`Responder::stop`] is called or the stream ends.
    pub fn spawn<S, R>(
        requests: S,
        sink: R,
        predictor: Arc<GradePredictor>,
        workers: usize,
        max_batch_size: usize,
    ) -> Self
    where
        S: Stream<Item = IncomingRequest> + Unpin + Send + 'static,
        R: ReplySink,
    {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(
            requests,
            shutdown_rx,
            sink,
            predictor,
            workers,
            max_batch_size,
        ));
        Self { shutdown, handle }
    }

    /// Stop accepting requests and wait until every accepted one is answered.
    pub async fn stop(self) {
        // The loop may already have exited on its own
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            error!(error = %e, "Responder task failed");
        }
    }
}

async fn run<S, R>(
    mut requests: S,
    mut shutdown: oneshot::Receiver<()>,
    sink: R,
    predictor: Arc<GradePredictor>,
    workers: usize,
    max_batch_size: usize,
) where
    S: Stream<Item = IncomingRequest> + Unpin + Send + 'static,
    R: ReplySink,
{
    let permits = u32::try_from(workers.max(1)).unwrap_or(u32::MAX);
    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(permits as usize));
    let answered = Arc::new(AtomicU64::new(0));

    loop {
        let request = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            next = requests.next() => match next {
                Some(request) => request,
                None => break,
            },
        };

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };

        let predictor = predictor.clone();
        let sink = sink.clone();
        let answered = answered.clone();

        tokio::spawn(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            let start_time = Instant::now();

            let body = handle_payload(&predictor, &request.payload, max_batch_size);
            match request.reply {
                Some(reply_to) => match sink.reply(reply_to, &request_id, body).await {
                    Ok(()) => debug!(
                        request_id = %request_id,
                        processing_time_us = start_time.elapsed().as_micros(),
                        "Prediction request answered"
                    ),
                    Err(e) => {
                        error!(request_id = %request_id, error = %e, "Failed to publish reply")
                    }
                },
                None => warn!(
                    request_id = %request_id,
                    subject = %request.subject,
                    response = %String::from_utf8_lossy(&body),
                    "Prediction request without reply subject"
                ),
            }

            let count = answered.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                let metrics = predictor.metrics();
                info!(
                    answered = count,
                    throughput = format!("{:.1} rec/s", metrics.get_throughput()),
                    avg_latency_us = metrics.get_processing_stats().mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    // Dropping the subscription unsubscribes
    drop(requests);

    // Every permit back means every accepted request was answered
    match semaphore.acquire_many(permits).await {
        Ok(_all) => info!(
            answered = answered.load(Ordering::Relaxed),
            "In-flight requests drained"
        ),
        Err(e) => warn!(error = %e, "Could not wait for in-flight requests"),
    }

    if let Err(e) = sink.flush().await {
        warn!(error = %e, "Failed to flush pending replies");
    }
    info!("Responder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::test_predictor;
    use crate::validator::tests::sample_record;
    use futures::channel::mpsc;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records replies after a delay, like a slow broker.
    #[derive(Clone, Default)]
    struct RecordingSink {
        replies: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
        flushed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn reply(&self, reply_to: String, _request_id: &str, body: Vec<u8>) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(
                !self.flushed.load(Ordering::SeqCst),
                "reply published after flush"
            );
            self.replies.lock().unwrap().push((reply_to, body));
            Ok(())
        }

        async fn flush(&self) -> Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn request(reply: Option<&str>) -> IncomingRequest {
        IncomingRequest {
            subject: "grades.predict".to_string(),
            reply: reply.map(str::to_string),
            payload: serde_json::to_vec(&sample_record()).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_replies() {
        let (tx, rx) = mpsc::unbounded();
        let sink = RecordingSink::default();
        let responder = Responder::spawn(rx, sink.clone(), Arc::new(test_predictor()), 4, 100);

        for i in 0..3 {
            tx.unbounded_send(request(Some(&format!("_INBOX.{i}")))).unwrap();
        }
        // Let the loop pick the requests up; their replies are still pending
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sink.replies.lock().unwrap().is_empty());

        responder.stop().await;

        let replies = sink.replies.lock().unwrap();
        assert_eq!(replies.len(), 3);
        assert!(sink.flushed.load(Ordering::SeqCst));
        let body: Value = serde_json::from_slice(&replies[0].1).unwrap();
        assert_eq!(body["predicted_grade"], "B");
    }

    #[tokio::test]
    async fn test_request_without_reply_subject_is_not_published() {
        let (tx, rx) = mpsc::unbounded();
        let sink = RecordingSink::default();
        let predictor = Arc::new(test_predictor());
        let responder = Responder::spawn(rx, sink.clone(), predictor.clone(), 2, 100);

        tx.unbounded_send(request(None)).unwrap();
        tx.unbounded_send(request(Some("_INBOX.1"))).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        responder.stop().await;

        let replies = sink.replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, "_INBOX.1");
        assert_eq!(predictor.metrics().snapshot().predictions_succeeded, 2);
    }

    #[tokio::test]
    async fn test_stream_end_flushes() {
        let (tx, rx) = mpsc::unbounded::<IncomingRequest>();
        let sink = RecordingSink::default();
        let responder = Responder::spawn(rx, sink.clone(), Arc::new(test_predictor()), 1, 100);

        drop(tx);
        responder.stop().await;

        assert!(sink.flushed.load(Ordering::SeqCst));
        assert!(sink.replies.lock().unwrap().is_empty());
    }
}
