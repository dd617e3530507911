//! One-writer output gate.
//!
//! While the page UI owns the terminal every stray write to stdout or stderr
//! corrupts the screen. The gate records whether a session is rendering;
//! the logging layer writes through [`TuiAwareWriter`], which discards
//! stderr output while the gate is active. File logging is unaffected.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GatePhase {
    /// Nothing owns the terminal.
    Inactive = 0,
    /// The UI is rendering; do not write to stdout/stderr.
    Active = 1,
}

impl GatePhase {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Active,
            _ => Self::Inactive,
        }
    }
}

// Advisory only, so relaxed ordering is enough.
static GATE: AtomicU8 = AtomicU8::new(GatePhase::Inactive as u8);

pub fn set_phase(phase: GatePhase) {
    GATE.store(phase as u8, Ordering::Relaxed);
}

pub fn phase() -> GatePhase {
    GatePhase::from_u8(GATE.load(Ordering::Relaxed))
}

#[must_use]
pub fn is_output_suppressed() -> bool {
    phase() == GatePhase::Active
}

/// `MakeWriter` that forwards to stderr unless the gate is active.
#[derive(Debug, Clone, Copy)]
pub struct TuiAwareWriter;

/// Writer handed out by [`TuiAwareWriter`].
pub enum TuiAwareWriterInner {
    Stderr(std::io::Stderr),
    Suppressed,
}

impl std::io::Write for TuiAwareWriterInner {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Stderr(w) => w.write(buf),
            Self::Suppressed => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stderr(w) => w.flush(),
            Self::Suppressed => Ok(()),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for TuiAwareWriter {
    type Writer = TuiAwareWriterInner;

    fn make_writer(&'a self) -> Self::Writer {
        if is_output_suppressed() {
            TuiAwareWriterInner::Suppressed
        } else {
            TuiAwareWriterInner::Stderr(std::io::stderr())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    // The gate is process-global; tests that flip it hold this lock.
    pub(crate) static GATE_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn unknown_values_map_to_inactive() {
        assert_eq!(GatePhase::from_u8(1), GatePhase::Active);
        assert_eq!(GatePhase::from_u8(0), GatePhase::Inactive);
        assert_eq!(GatePhase::from_u8(200), GatePhase::Inactive);
    }

    #[test]
    fn active_gate_discards_writes() {
        let _lock = GATE_TEST_LOCK.lock().unwrap();
        set_phase(GatePhase::Active);
        let mut writer = TuiAwareWriter.make_writer();
        assert!(matches!(writer, TuiAwareWriterInner::Suppressed));
        assert_eq!(writer.write(b"hidden").unwrap(), 6);
        set_phase(GatePhase::Inactive);
        assert!(matches!(
            TuiAwareWriter.make_writer(),
            TuiAwareWriterInner::Stderr(_)
        ));
    }
}
