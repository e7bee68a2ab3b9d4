//! From job reference to device bytes
//!
//! [`Dispatcher`] bundles the collaborators shared by the worker and the
//! queue consumer: subject lookup, rendering, per-type encoding and the
//! device sender.

use std::sync::Arc;

use async_trait::async_trait;
use spool_printer::{bitmap, label_command};
use thiserror::Error;
use tracing::debug;

use crate::connection::{ConnectionError, Protocol};
use crate::job::{JobType, PrintJob};
use crate::source::{PrintSubject, SourceError, SubjectSource, TicketRenderer};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Print subject not found: {job_type} {reference}")]
    SubjectNotFound { job_type: JobType, reference: String },
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Printer endpoint plus the protocol it speaks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintTarget {
    pub ip: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl PrintTarget {
    pub fn for_job(job: &PrintJob) -> Self {
        Self {
            ip: job.printer_ip.clone(),
            port: job.printer_port,
            protocol: job.job_type.protocol(),
        }
    }
}

/// Delivers payloads to a printer, in order
#[async_trait]
pub trait DeviceSender: Send + Sync {
    async fn send(&self, target: &PrintTarget, payloads: &[Vec<u8>]) -> DispatchResult<()>;
}

/// Label stock size in printer dots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelGeometry {
    pub width: u32,
    pub height: u32,
}

impl Default for LabelGeometry {
    /// 50 x 30 mm at 203 dpi, less the printer margins
    fn default() -> Self {
        Self {
            width: 400,
            height: 240,
        }
    }
}

/// Encode rendered images into device payloads for `job_type`
///
/// - label-ticket: one TSPL label per image
/// - chef-order: images pass through once they decode; the ESC/POS
///   connection rasterises them
/// - invoice: nothing to print
///
/// An image that does not decode fails the whole batch before any send.
pub fn encode_payloads(
    job_type: JobType,
    images: Vec<Vec<u8>>,
    label: LabelGeometry,
) -> DispatchResult<Vec<Vec<u8>>> {
    match job_type {
        JobType::LabelTicket => images
            .iter()
            .map(|bytes| {
                let image = image::load_from_memory(bytes)?;
                let bits = bitmap::encode(&image, label.width, label.height);
                Ok(label_command(&bits, label.width, label.height))
            })
            .collect(),
        JobType::ChefOrder => {
            for bytes in &images {
                image::load_from_memory(bytes)?;
            }
            Ok(images)
        }
        JobType::Invoice => Ok(Vec::new()),
    }
}

/// Load, render, encode and send
#[derive(Clone)]
pub struct Dispatcher {
    source: Arc<dyn SubjectSource>,
    renderer: Arc<dyn TicketRenderer>,
    sender: Arc<dyn DeviceSender>,
    label: LabelGeometry,
}

impl Dispatcher {
    pub fn new(
        source: Arc<dyn SubjectSource>,
        renderer: Arc<dyn TicketRenderer>,
        sender: Arc<dyn DeviceSender>,
    ) -> Self {
        Self {
            source,
            renderer,
            sender,
            label: LabelGeometry::default(),
        }
    }

    pub fn with_label(mut self, label: LabelGeometry) -> Self {
        self.label = label;
        self
    }

    /// Resolve the job reference; a missing record is `SubjectNotFound`
    pub async fn load(&self, job_type: JobType, reference: &str) -> DispatchResult<PrintSubject> {
        self.source
            .load(job_type, reference)
            .await?
            .ok_or_else(|| DispatchError::SubjectNotFound {
                job_type,
                reference: reference.to_string(),
            })
    }

    /// Render and encode; invoices skip the render call entirely
    pub async fn prepare(
        &self,
        job_type: JobType,
        subject: &PrintSubject,
    ) -> DispatchResult<Vec<Vec<u8>>> {
        if job_type == JobType::Invoice {
            return Ok(Vec::new());
        }
        let images = self.renderer.render(job_type, subject).await?;
        let payloads = encode_payloads(job_type, images, self.label)?;
        debug!(job_type = %job_type, payloads = payloads.len(), "Payloads encoded");
        Ok(payloads)
    }

    pub async fn send(&self, target: &PrintTarget, payloads: &[Vec<u8>]) -> DispatchResult<()> {
        self.sender.send(target, payloads).await
    }
}
