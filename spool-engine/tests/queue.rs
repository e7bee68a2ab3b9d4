mod common;

use std::sync::Arc;

use common::{FixedRenderer, ScriptedSender, StaticSource, png};
use serde_json::json;
use spool_engine::{
    DispatchError, Dispatcher, JobType, PrintRequest, Protocol, QueueError, print_queue,
};
use tokio_util::sync::CancellationToken;

fn request(job_type: JobType, data: &str) -> PrintRequest {
    PrintRequest {
        job_type,
        printer_ip: "10.0.0.8".to_string(),
        printer_port: 9100,
        data: data.to_string(),
    }
}

fn dispatcher(sender: Arc<ScriptedSender>) -> Dispatcher {
    Dispatcher::new(
        Arc::new(StaticSource::default().with("order-1", json!({"id": 1}))),
        Arc::new(FixedRenderer::new(vec![png(32, 32, 0)])),
        sender,
    )
}

#[tokio::test]
async fn test_queued_request_is_sent_once() {
    let sender = Arc::new(ScriptedSender::default());
    let (producer, consumer) = print_queue(8, dispatcher(sender.clone()));
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(consumer.run(shutdown.clone()));

    let receipt = producer
        .enqueue(request(JobType::ChefOrder, "order-1"))
        .await
        .unwrap();
    receipt.outcome().await.unwrap();

    let sends = sender.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0.protocol, Protocol::EscPos);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_device_failure_is_terminal() {
    let sender = Arc::new(ScriptedSender::failing(&["offline"]));
    let (producer, consumer) = print_queue(8, dispatcher(sender.clone()));
    let handle = tokio::spawn(consumer.run(CancellationToken::new()));

    let receipt = producer
        .enqueue(request(JobType::ChefOrder, "order-1"))
        .await
        .unwrap();
    let result = receipt.outcome().await;
    assert!(matches!(result, Err(QueueError::Failed(DispatchError::Connection(_)))));
    assert_eq!(sender.send_count(), 1);

    // Dropping the last producer stops the consumer
    drop(producer);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_missing_subject_is_reported() {
    let sender = Arc::new(ScriptedSender::default());
    let (producer, consumer) = print_queue(8, dispatcher(sender.clone()));
    let handle = tokio::spawn(consumer.run(CancellationToken::new()));

    let receipt = producer
        .enqueue(request(JobType::LabelTicket, "order-404"))
        .await
        .unwrap();
    assert!(matches!(
        receipt.outcome().await,
        Err(QueueError::Failed(DispatchError::SubjectNotFound { .. }))
    ));
    assert_eq!(sender.send_count(), 0);

    drop(producer);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_enqueue_after_consumer_stopped() {
    let sender = Arc::new(ScriptedSender::default());
    let (producer, consumer) = print_queue(8, dispatcher(sender));
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    consumer.run(shutdown).await;

    let result = producer.enqueue(request(JobType::ChefOrder, "order-1")).await;
    assert!(matches!(result, Err(QueueError::Closed)));
}
