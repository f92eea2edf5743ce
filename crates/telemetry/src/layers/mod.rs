//! Tracing subscriber layers.

use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::{DefaultFields, Format};

/// Bunyan JSON output on stderr.
pub struct JsonLayer;

impl JsonLayer {
    /// Storage layer (collects span fields) and formatting layer.
    pub fn layers(
        name: &str,
    ) -> (
        JsonStorageLayer,
        BunyanFormattingLayer<fn() -> std::io::Stderr>,
    ) {
        let writer: fn() -> std::io::Stderr = std::io::stderr;
        (
            JsonStorageLayer,
            BunyanFormattingLayer::new(name.to_string(), writer),
        )
    }
}

/// Compact terminal output on stderr.
pub fn pretty_layer<S>() -> fmt::Layer<S, DefaultFields, Format, fn() -> std::io::Stderr> {
    let writer: fn() -> std::io::Stderr = std::io::stderr;
    fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(writer)
}
