//! # spool-printer
//!
//! Network printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - Monochrome bitmap encoding for label printers
//! - TSPL label command building
//! - ESC/POS raster command building (image strips, cut)
//! - Network printing over TCP (one-shot and persistent sockets)
//!
//! Job scheduling, locking and retries (WHEN and WHERE to print) live in
//! `spool-engine`.
//!
//! ## Example
//!
//! ```ignore
//! use spool_printer::{bitmap, NetworkPrinter, Printer, TsplBuilder};
//!
//! let image = image::open("label.png")?;
//! let data = bitmap::encode(&image, 400, 240);
//!
//! let mut label = TsplBuilder::new();
//! label.size(50, 30).gap(2, 0).cls().bitmap(0, 0, 400, 240, &data).print(1, 1);
//!
//! let printer = NetworkPrinter::new("10.0.0.5", 9100)?;
//! printer.print(&label.build()).await?;
//! ```

pub mod bitmap;
mod error;
mod escpos;
mod printer;
mod tspl;

// Re-exports
pub use error::{PrintError, PrintResult};
pub use escpos::{EscPosBuilder, raster_strips};
pub use printer::{NetworkPrinter, PersistentPrinter, Printer};
pub use tspl::{TsplBuilder, label_command};
