//! Tracing setup with optional OTLP file export.
//!
//! ```text
//! tracing macros → EnvFilter ─┬→ fmt layer → stderr
//!                             └→ OpenTelemetryLayer → FileSpanExporter → RotatingFile
//! ```
//!
//! The filter comes from `RUST_LOG`, then `Config::trace_level`, then
//! `"info"`. Spans are exported only when `Config::trace_file` is set; each
//! export is one OTLP JSON document per line.
//!
//! # Modules
//!
//! - [`init`]: subscriber assembly
//! - [`export`]: span exporter and OTLP JSON encoding
//! - [`rotation`]: size-rotated trace file

mod export;
mod init;
mod rotation;

pub use init::init_tracing;
pub use rotation::RotatingFile;
