//! Event tracing for framework code.
//!
//! Not for application logging: this path exists so that configuration and
//! initialization problems surface even when the regular logging stack is
//! the thing that is broken. The primary sink is pluggable; when it fails,
//! the entry is written to a last-resort error file under the domain log
//! path. A tracing call must never raise out of an initialization path, so
//! only the file fallback may propagate, and only when the tracer is
//! configured to not fail silently.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::error::{FrameworkError, Result};

/// Event ID for initialization progress entries.
pub const EVENT_INFORMATION: i32 = 1000;
/// Configuration failed to initialize.
pub const EVENT_INIT_FAILURE: i32 = 1049;
/// A required node is missing from the domain config file.
pub const EVENT_CONFIG_NODE_MISSING: i32 = 1050;
/// Company credentials are incompletely defined.
pub const EVENT_CREDENTIALS_INCOMPLETE: i32 = 1051;
/// The primary sink itself failed.
pub const EVENT_SINK_FAILURE: i32 = 1055;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Information,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Information => "INFO",
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Primary trace transport.
pub trait TraceSink: Send + Sync {
    fn write_entry(
        &self,
        source: &str,
        message: &str,
        severity: Severity,
        event_id: i32,
    ) -> anyhow::Result<()>;
}

/// Default sink forwarding entries to the `tracing` subscriber. Never fails.
#[derive(Debug, Default)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn write_entry(
        &self,
        source: &str,
        message: &str,
        severity: Severity,
        event_id: i32,
    ) -> anyhow::Result<()> {
        match severity {
            Severity::Information => tracing::info!(source, event_id, "{message}"),
            Severity::Warning => tracing::warn!(source, event_id, "{message}"),
            Severity::Error => tracing::error!(source, event_id, "{message}"),
        }
        Ok(())
    }
}

/// Writes framework trace entries with a file-based last resort.
pub struct Tracer {
    sink: Box<dyn TraceSink>,
    product_name: String,
    domain_name: String,
    log_path: PathBuf,
    fail_silently: bool,
}

impl Tracer {
    pub fn new(
        product_name: &str,
        domain_name: &str,
        log_path: impl Into<PathBuf>,
        sink: Box<dyn TraceSink>,
        fail_silently: bool,
    ) -> Self {
        Tracer {
            sink,
            product_name: product_name.to_string(),
            domain_name: domain_name.to_string(),
            log_path: log_path.into(),
            fail_silently,
        }
    }

    /// Write an information entry for system initialization progress.
    pub fn write_info(&self, message: &str) -> Result<()> {
        self.write_entry("", message, Severity::Information, EVENT_INFORMATION)
    }

    /// Write an error entry with a specific event ID, bypassing normal
    /// application logging to show configuration problems.
    pub fn write_error(&self, event_id: i32, message: &str) -> Result<()> {
        self.write_entry("", message, Severity::Error, event_id)
    }

    /// Write an entry of the given severity. A blank source is replaced by
    /// the product name. Sink failures fall back to the error file.
    pub fn write_entry(
        &self,
        source: &str,
        message: &str,
        severity: Severity,
        event_id: i32,
    ) -> Result<()> {
        let source = if source.is_empty() {
            self.product_name.as_str()
        } else {
            source
        };
        match self.sink.write_entry(source, message, severity, event_id) {
            Ok(()) => Ok(()),
            Err(sink_error) => self.log_to_file(message, &format!("{sink_error:#}")),
        }
    }

    /// Last resort for recording an entry together with the sink error that
    /// forced the fallback. The fallback failure propagates only when the
    /// tracer is configured to not fail silently.
    fn log_to_file(&self, event_message: &str, sink_error: &str) -> Result<()> {
        let filename = self.log_path.join(format!(
            "{}_{}.err",
            self.domain_name,
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ));
        let outcome = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)
            .and_then(|mut file| {
                writeln!(file, "===============================================================")?;
                writeln!(file, "{event_message}")?;
                writeln!(file, "===============================================================")?;
                writeln!(file, "{sink_error}")
            });
        match outcome {
            Ok(()) => Ok(()),
            Err(_) if self.fail_silently => Ok(()),
            Err(e) => Err(FrameworkError::Configuration(format!(
                "failed to write trace fallback file '{}': {e}",
                filename.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink(AtomicUsize);

    impl TraceSink for FailingSink {
        fn write_entry(&self, _: &str, _: &str, _: Severity, _: i32) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("event source unavailable")
        }
    }

    #[test]
    fn sink_failure_falls_back_to_error_file() {
        let dir = tempfile::tempdir().unwrap();
        let tracer = Tracer::new(
            "CreditSuite",
            "CREDIT",
            dir.path(),
            Box::new(FailingSink(AtomicUsize::new(0))),
            false,
        );
        tracer.write_error(EVENT_CONFIG_NODE_MISSING, "node missing").unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name();
        let name = name.to_string_lossy().into_owned();
        assert!(name.starts_with("CREDIT_"));
        assert!(name.ends_with(".err"));
    }

    #[test]
    fn fallback_failure_propagates_only_when_loud() {
        let missing = PathBuf::from("/nonexistent/credit-framework-trace");
        let silent = Tracer::new(
            "CreditSuite",
            "CREDIT",
            &missing,
            Box::new(FailingSink(AtomicUsize::new(0))),
            true,
        );
        assert!(silent.write_info("hello").is_ok());

        let loud = Tracer::new(
            "CreditSuite",
            "CREDIT",
            &missing,
            Box::new(FailingSink(AtomicUsize::new(0))),
            false,
        );
        assert!(loud.write_info("hello").is_err());
    }

    #[test]
    fn blank_source_uses_product_name() {
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct CapturingSink(Arc<Mutex<Vec<String>>>);
        impl TraceSink for CapturingSink {
            fn write_entry(&self, source: &str, _: &str, _: Severity, _: i32) -> anyhow::Result<()> {
                self.0.lock().unwrap().push(source.to_string());
                Ok(())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let sink = CapturingSink::default();
        let tracer = Tracer::new("CreditSuite", "CREDIT", dir.path(), Box::new(sink.clone()), true);
        tracer.write_info("starting").unwrap();
        tracer
            .write_entry("CreditListener", "started", Severity::Information, EVENT_INFORMATION)
            .unwrap();
        let sources = sink.0.lock().unwrap().clone();
        assert_eq!(sources, vec!["CreditSuite".to_string(), "CreditListener".to_string()]);
    }
}
