//! Deprecation warning handlers
//!
//! A render collects the deprecation warnings of its root descriptor and
//! hands them, when there are any, to exactly one [`WarningHandler`]. The
//! handler either lets the render continue or rejects it.

use std::io::Write;
use std::sync::{Arc, Mutex};

use log::warn;

use crate::error::{Error, Result};

/// Decides what happens when a descriptor uses deprecated fields.
pub type WarningHandler = Arc<dyn Fn(&[String]) -> Result<()> + Send + Sync>;

/// Drop warnings silently.
pub fn warning_ignore() -> WarningHandler {
    Arc::new(|_| Ok(()))
}

/// Emit each warning through the `log` facade at warn level. The default.
pub fn warning_log() -> WarningHandler {
    Arc::new(|warnings| {
        for message in warnings {
            warn!("{}", message);
        }
        Ok(())
    })
}

/// Write each warning on its own line to `writer`. A failed write fails the render.
pub fn warning_log_to<W>(writer: W) -> WarningHandler
where
    W: Write + Send + 'static,
{
    let writer = Mutex::new(writer);
    Arc::new(move |warnings| {
        let mut writer = writer.lock().map_err(|_| Error::LockPoisoned {
            context: "warning writer".to_string(),
        })?;
        for message in warnings {
            writeln!(writer, "{}", message).map_err(|source| Error::WarningWrite { source })?;
        }
        Ok(())
    })
}

/// Reject the render whenever warnings are present.
pub fn warning_fail() -> WarningHandler {
    Arc::new(|warnings| {
        if warnings.is_empty() {
            Ok(())
        } else {
            Err(Error::WarningRejected {
                warnings: warnings.to_vec(),
            })
        }
    })
}
