//! Call metadata recorded by the interception shim
//!
//! One `CallRecord` per intercepted `MPI_Send`/`MPI_Recv`, kept in call order
//! and serialized at finalize as `<tag> <start> <duration>` lines.

/// Which communication primitive a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Send,
    Recv,
}

impl Operation {
    /// Single-character tag used in the on-disk log format
    pub fn tag(self) -> char {
        match self {
            Operation::Send => 's',
            Operation::Recv => 'r',
        }
    }

    /// Inverse of [`Operation::tag`]; `None` for unknown tags
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            's' => Some(Operation::Send),
            'r' => Some(Operation::Recv),
            _ => None,
        }
    }
}

/// One timed send or recv call
///
/// Times are process-local: `start_us` is measured from the shim's init-time
/// monotonic epoch, `duration_us` spans the forwarded call. Both include
/// clock resolution and forwarding overhead; that is part of the measurement
/// contract, not an error term to subtract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallRecord {
    pub op: Operation,
    /// Microseconds from process init to call entry
    pub start_us: f64,
    /// Microseconds from call entry to call return
    pub duration_us: f64,
}

impl CallRecord {
    pub fn new(op: Operation, start_us: f64, duration_us: f64) -> Self {
        Self {
            op,
            start_us,
            duration_us,
        }
    }
}
