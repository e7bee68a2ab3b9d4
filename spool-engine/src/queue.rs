//! Fire-and-forget print path
//!
//! Requests go through a bounded channel to a single consumer that loads,
//! renders and sends once. No job row, no printer lock and no retry: a
//! failure is reported on the receipt and logged, nothing more.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::dispatch::{DispatchError, Dispatcher, PrintTarget};
use crate::job::JobType;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Print queue is closed")]
    Closed,

    #[error("Print request dropped before completion")]
    Dropped,

    #[error(transparent)]
    Failed(#[from] DispatchError),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// One print to perform
#[derive(Debug, Clone)]
pub struct PrintRequest {
    pub job_type: JobType,
    pub printer_ip: String,
    pub printer_port: u16,
    /// Reference into the job type's subject table
    pub data: String,
}

impl PrintRequest {
    pub fn target(&self) -> PrintTarget {
        PrintTarget {
            ip: self.printer_ip.clone(),
            port: self.printer_port,
            protocol: self.job_type.protocol(),
        }
    }
}

struct Envelope {
    request: PrintRequest,
    reply: oneshot::Sender<QueueResult<()>>,
}

/// Completion handle for an enqueued request; safe to drop
pub struct QueueReceipt {
    rx: oneshot::Receiver<QueueResult<()>>,
}

impl QueueReceipt {
    /// Wait for the consumer's result
    pub async fn outcome(self) -> QueueResult<()> {
        self.rx.await.unwrap_or(Err(QueueError::Dropped))
    }
}

#[derive(Clone)]
pub struct PrintProducer {
    tx: mpsc::Sender<Envelope>,
}

impl PrintProducer {
    /// Queue a request, waiting for space when the channel is full
    pub async fn enqueue(&self, request: PrintRequest) -> QueueResult<QueueReceipt> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| QueueError::Closed)?;
        Ok(QueueReceipt { rx })
    }
}

pub struct PrintConsumer {
    rx: mpsc::Receiver<Envelope>,
    dispatcher: Dispatcher,
}

/// Bounded queue feeding one consumer
pub fn print_queue(capacity: usize, dispatcher: Dispatcher) -> (PrintProducer, PrintConsumer) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PrintProducer { tx }, PrintConsumer { rx, dispatcher })
}

impl PrintConsumer {
    /// Consume until shutdown or until every producer is dropped
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Print queue consumer started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Print queue consumer received shutdown signal");
                    break;
                }
                envelope = self.rx.recv() => {
                    let Some(Envelope { request, reply }) = envelope else {
                        info!("Print queue closed, consumer stopping");
                        break;
                    };
                    let result = self.handle(&request).await;
                    if let Err(e) = &result {
                        error!(
                            job_type = %request.job_type,
                            data = %request.data,
                            printer = %format!("{}:{}", request.printer_ip, request.printer_port),
                            error = %e,
                            "Queued print failed"
                        );
                    }
                    // Receiver may have been dropped; that's fine
                    let _ = reply.send(result.map_err(QueueError::from));
                }
            }
        }
    }

    async fn handle(&self, request: &PrintRequest) -> Result<(), DispatchError> {
        let subject = self.dispatcher.load(request.job_type, &request.data).await?;
        let payloads = self.dispatcher.prepare(request.job_type, &subject).await?;
        if payloads.is_empty() {
            return Ok(());
        }
        self.dispatcher.send(&request.target(), &payloads).await?;
        debug!(job_type = %request.job_type, data = %request.data, "Queued print sent");
        Ok(())
    }
}
