//! Fakes shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use parking_lot::Mutex;
use spool_engine::dispatch::DispatchResult;
use spool_engine::job::JobType;
use spool_engine::source::SourceResult;
use spool_engine::{
    AcquireRetry, ConnectionError, DeviceSender, DispatchError, Dispatcher, MemoryJobStore,
    MemoryLockCoordinator, PrintSubject, PrintTarget, PrintWorker, StaticSettings, SubjectSource,
    TicketRenderer, WorkerConfig,
};
use spool_printer::PrintError;

/// Encoded PNG filled with one gray level
pub fn png(width: u32, height: u32, level: u8) -> Vec<u8> {
    let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([level])));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Subjects keyed by reference
#[derive(Default)]
pub struct StaticSource {
    subjects: Mutex<HashMap<String, serde_json::Value>>,
}

impl StaticSource {
    pub fn with(self, reference: &str, payload: serde_json::Value) -> Self {
        self.subjects.lock().insert(reference.to_string(), payload);
        self
    }
}

#[async_trait]
impl SubjectSource for StaticSource {
    async fn load(
        &self,
        _job_type: JobType,
        reference: &str,
    ) -> SourceResult<Option<PrintSubject>> {
        Ok(self.subjects.lock().get(reference).map(|payload| PrintSubject {
            reference: reference.to_string(),
            payload: payload.clone(),
        }))
    }
}

/// Returns the same images for every subject
pub struct FixedRenderer {
    images: Vec<Vec<u8>>,
    pub calls: AtomicUsize,
}

impl FixedRenderer {
    pub fn new(images: Vec<Vec<u8>>) -> Self {
        Self {
            images,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TicketRenderer for FixedRenderer {
    async fn render(
        &self,
        _job_type: JobType,
        _subject: &PrintSubject,
    ) -> SourceResult<Vec<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.images.clone())
    }
}

/// Device fake: pops one scripted result per send, succeeds once the
/// script runs out
#[derive(Default)]
pub struct ScriptedSender {
    script: Mutex<VecDeque<Option<String>>>,
    sends: Mutex<Vec<(PrintTarget, Vec<Vec<u8>>)>>,
}

impl ScriptedSender {
    /// Fail the next sends with the given messages, in order
    pub fn failing(messages: &[&str]) -> Self {
        let sender = Self::default();
        sender
            .script
            .lock()
            .extend(messages.iter().map(|m| Some(m.to_string())));
        sender
    }

    /// Fail every send
    pub fn always_failing(message: &str, count: usize) -> Self {
        let messages: Vec<&str> = std::iter::repeat_n(message, count).collect();
        Self::failing(&messages)
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().len()
    }

    pub fn sends(&self) -> Vec<(PrintTarget, Vec<Vec<u8>>)> {
        self.sends.lock().clone()
    }
}

#[async_trait]
impl DeviceSender for ScriptedSender {
    async fn send(&self, target: &PrintTarget, payloads: &[Vec<u8>]) -> DispatchResult<()> {
        self.sends.lock().push((target.clone(), payloads.to_vec()));
        match self.script.lock().pop_front().flatten() {
            Some(message) => Err(DispatchError::Connection(ConnectionError::Device(
                PrintError::Timeout(message),
            ))),
            None => Ok(()),
        }
    }
}

/// Worker wired to in-memory collaborators
pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub locks: Arc<MemoryLockCoordinator>,
    pub sender: Arc<ScriptedSender>,
    pub renderer: Arc<FixedRenderer>,
    pub worker: PrintWorker,
}

pub fn quick_lock_retry() -> AcquireRetry {
    AcquireRetry {
        retry_count: 2,
        retry_delay: Duration::from_millis(10),
    }
}

impl Harness {
    pub fn new(
        source: StaticSource,
        renderer: FixedRenderer,
        sender: ScriptedSender,
        settings: StaticSettings,
    ) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let locks = Arc::new(MemoryLockCoordinator::new(quick_lock_retry()));
        let sender = Arc::new(sender);
        let renderer = Arc::new(renderer);
        let dispatcher = Dispatcher::new(Arc::new(source), renderer.clone(), sender.clone());
        let worker = PrintWorker::new(
            store.clone(),
            locks.clone(),
            dispatcher,
            Arc::new(settings),
            WorkerConfig {
                tick_interval: Duration::from_secs(2),
                max_attempts: 3,
            },
        );
        Self {
            store,
            locks,
            sender,
            renderer,
            worker,
        }
    }
}
