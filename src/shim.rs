//! Interception shim: the substitute MPI entry points
//!
//! Built as a `cdylib`, this module exports `MPI_Init`, `MPI_Finalize`,
//! `MPI_Send` and `MPI_Recv`. Each export forwards to the real implementation
//! through the resolved backend, samples a monotonic clock around the
//! forwarded call, and appends a [`CallRecord`] - the host program sees the
//! real return value, unchanged.
//!
//! State lives in one [`ShimContext`] per process, created on first
//! intercepted call and kept behind a mutex so append order survives even a
//! multi-threaded host (the reference usage is single-threaded per rank).
//!
//! Configuration is read once from the environment:
//! - `MPISONAR_MPI_LIB` - path of the real MPI library (default OpenMPI's)
//! - `MPISONAR_LOG_DIR` - directory for `rank_<N>_output.t` (default `.`)

use std::os::raw::{c_char, c_int, c_void};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;

use tracing_subscriber::EnvFilter;

use crate::logfile;
use crate::record::{CallRecord, Operation};
use crate::resolver::{DlBackend, MpiBackend, MpiComm, MpiDatatype};

/// Environment variable naming the real MPI shared library
pub const MPI_LIB_ENV: &str = "MPISONAR_MPI_LIB";
/// Environment variable naming the log output directory
pub const LOG_DIR_ENV: &str = "MPISONAR_LOG_DIR";
/// Library probed when `MPISONAR_MPI_LIB` is unset
pub const DEFAULT_MPI_LIB: &str = "/usr/lib64/openmpi/lib/libmpi.so";

/// Per-process instrumentation state
///
/// Owns the backend, the monotonic epoch, the rank learned at init, and the
/// append-only record sequence. Generic over [`MpiBackend`] so tests drive it
/// with a fake backend and never touch dynamic loading.
pub struct ShimContext<B: MpiBackend> {
    backend: B,
    epoch: Instant,
    rank: c_int,
    log_dir: PathBuf,
    records: Vec<CallRecord>,
}

impl<B: MpiBackend> ShimContext<B> {
    pub fn new(backend: B, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            epoch: Instant::now(),
            rank: 0,
            log_dir: log_dir.into(),
            records: Vec::new(),
        }
    }

    /// Forward `MPI_Init`, then learn this process's rank for log naming
    ///
    /// A failed rank query after a successful init is downgraded to a
    /// warning: the host program's semantics are unaffected, only the log
    /// filename falls back to rank 0.
    ///
    /// # Safety
    /// Same contract as [`MpiBackend::init`].
    pub unsafe fn init(&mut self, argc: *mut c_int, argv: *mut *mut *mut c_char) -> c_int {
        let rc = unsafe { self.backend.init(argc, argv) };
        match unsafe { self.backend.rank() } {
            Ok(rank) => self.rank = rank,
            Err(code) => {
                tracing::warn!(code, "MPI_Comm_rank failed; log will be named as rank 0");
            }
        }
        rc
    }

    /// Forward `MPI_Finalize`, then flush the accumulated records
    ///
    /// Log persistence is best-effort: a write failure forfeits this rank's
    /// timeline contribution but never crashes the host program.
    ///
    /// # Safety
    /// Same contract as [`MpiBackend::finalize`].
    pub unsafe fn finalize(&mut self) -> c_int {
        let rc = unsafe { self.backend.finalize() };
        if let Err(err) = logfile::write_log(&self.log_dir, self.rank, &self.records) {
            tracing::warn!(%err, rank = self.rank, "failed to persist call log");
            eprintln!(
                "mpisonar: warning: rank {} call log not written: {err}",
                self.rank
            );
        }
        rc
    }

    /// Forward `MPI_Send` with timing
    ///
    /// # Safety
    /// Same contract as [`MpiBackend::send`].
    pub unsafe fn send(
        &mut self,
        buf: *const c_void,
        count: c_int,
        datatype: MpiDatatype,
        dest: c_int,
        tag: c_int,
        comm: MpiComm,
    ) -> c_int {
        let begin = Instant::now();
        let rc = unsafe { self.backend.send(buf, count, datatype, dest, tag, comm) };
        self.push_record(Operation::Send, begin);
        rc
    }

    /// Forward `MPI_Recv` with timing
    ///
    /// # Safety
    /// Same contract as [`MpiBackend::recv`].
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn recv(
        &mut self,
        buf: *mut c_void,
        count: c_int,
        datatype: MpiDatatype,
        source: c_int,
        tag: c_int,
        comm: MpiComm,
        status: *mut c_void,
    ) -> c_int {
        let begin = Instant::now();
        let rc = unsafe {
            self.backend
                .recv(buf, count, datatype, source, tag, comm, status)
        };
        self.push_record(Operation::Recv, begin);
        rc
    }

    /// Records accumulated so far, in call order
    pub fn records(&self) -> &[CallRecord] {
        &self.records
    }

    /// Rank learned at init (0 before init)
    pub fn rank(&self) -> c_int {
        self.rank
    }

    fn push_record(&mut self, op: Operation, begin: Instant) {
        // Duration includes clock resolution and forwarding overhead by
        // contract; the pre-call sample anchors the start offset.
        let duration_us = begin.elapsed().as_micros() as f64;
        let start_us = begin.duration_since(self.epoch).as_micros() as f64;
        self.records.push(CallRecord::new(op, start_us, duration_us));
    }
}

static SHIM: OnceLock<Mutex<ShimContext<DlBackend>>> = OnceLock::new();

/// Best-effort stderr subscriber so shim warnings are visible under RUST_LOG
fn init_shim_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn global() -> &'static Mutex<ShimContext<DlBackend>> {
    SHIM.get_or_init(|| {
        init_shim_tracing();
        let lib =
            std::env::var(MPI_LIB_ENV).unwrap_or_else(|_| DEFAULT_MPI_LIB.to_string());
        let log_dir = std::env::var(LOG_DIR_ENV).unwrap_or_else(|_| ".".to_string());
        match DlBackend::open(&lib) {
            Ok(backend) => Mutex::new(ShimContext::new(backend, log_dir)),
            Err(err) => {
                // Forwarding through an unresolved pointer would corrupt the
                // host program; abort is the only safe response.
                eprintln!("mpisonar: fatal: cannot resolve MPI entry points in '{lib}': {err}");
                std::process::abort();
            }
        }
    })
}

fn lock() -> MutexGuard<'static, ShimContext<DlBackend>> {
    global().lock().unwrap_or_else(PoisonError::into_inner)
}

/// Intercepted `MPI_Init`
///
/// # Safety
/// Called by the host program with its real init arguments.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn MPI_Init(argc: *mut c_int, argv: *mut *mut *mut c_char) -> c_int {
    unsafe { lock().init(argc, argv) }
}

/// Intercepted `MPI_Finalize`
///
/// # Safety
/// Called at most once by the host program, after init.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn MPI_Finalize() -> c_int {
    unsafe { lock().finalize() }
}

/// Intercepted `MPI_Send`
///
/// # Safety
/// Arguments are forwarded verbatim under MPI's own contract.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn MPI_Send(
    buf: *const c_void,
    count: c_int,
    datatype: MpiDatatype,
    dest: c_int,
    tag: c_int,
    comm: MpiComm,
) -> c_int {
    unsafe { lock().send(buf, count, datatype, dest, tag, comm) }
}

/// Intercepted `MPI_Recv`
///
/// # Safety
/// Arguments are forwarded verbatim under MPI's own contract.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn MPI_Recv(
    buf: *mut c_void,
    count: c_int,
    datatype: MpiDatatype,
    source: c_int,
    tag: c_int,
    comm: MpiComm,
    status: *mut c_void,
) -> c_int {
    unsafe { lock().recv(buf, count, datatype, source, tag, comm, status) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    /// Backend that counts forwarded calls and returns canned results
    struct FakeBackend {
        rank: c_int,
        send_result: c_int,
        recv_result: c_int,
    }

    impl Default for FakeBackend {
        fn default() -> Self {
            Self {
                rank: 3,
                send_result: 0,
                recv_result: 0,
            }
        }
    }

    impl MpiBackend for FakeBackend {
        unsafe fn init(&self, _: *mut c_int, _: *mut *mut *mut c_char) -> c_int {
            0
        }
        unsafe fn finalize(&self) -> c_int {
            0
        }
        unsafe fn send(
            &self,
            _: *const c_void,
            _: c_int,
            _: MpiDatatype,
            _: c_int,
            _: c_int,
            _: MpiComm,
        ) -> c_int {
            self.send_result
        }
        unsafe fn recv(
            &self,
            _: *mut c_void,
            _: c_int,
            _: MpiDatatype,
            _: c_int,
            _: c_int,
            _: MpiComm,
            _: *mut c_void,
        ) -> c_int {
            self.recv_result
        }
        unsafe fn rank(&self) -> Result<c_int, c_int> {
            Ok(self.rank)
        }
    }

    fn null_send(ctx: &mut ShimContext<FakeBackend>) -> c_int {
        unsafe { ctx.send(ptr::null(), 0, ptr::null_mut(), 1, 0, ptr::null_mut()) }
    }

    fn null_recv(ctx: &mut ShimContext<FakeBackend>) -> c_int {
        unsafe {
            ctx.recv(
                ptr::null_mut(),
                0,
                ptr::null_mut(),
                0,
                0,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        }
    }

    #[test]
    fn test_init_captures_rank() {
        let mut ctx = ShimContext::new(FakeBackend::default(), ".");
        assert_eq!(ctx.rank(), 0);
        let rc = unsafe { ctx.init(ptr::null_mut(), ptr::null_mut()) };
        assert_eq!(rc, 0);
        assert_eq!(ctx.rank(), 3);
    }

    #[test]
    fn test_one_record_per_call_in_order() {
        let mut ctx = ShimContext::new(FakeBackend::default(), ".");
        null_send(&mut ctx);
        null_recv(&mut ctx);
        null_send(&mut ctx);

        let records = ctx.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].op, Operation::Send);
        assert_eq!(records[1].op, Operation::Recv);
        assert_eq!(records[2].op, Operation::Send);
    }

    #[test]
    fn test_record_times_are_nonnegative_and_monotonic() {
        let mut ctx = ShimContext::new(FakeBackend::default(), ".");
        null_send(&mut ctx);
        null_send(&mut ctx);

        let records = ctx.records();
        for rec in records {
            assert!(rec.start_us >= 0.0);
            assert!(rec.duration_us >= 0.0);
        }
        assert!(records[0].start_us <= records[1].start_us);
    }

    #[test]
    fn test_forwarded_result_returned_unchanged() {
        let backend = FakeBackend {
            send_result: -7,
            recv_result: 42,
            ..FakeBackend::default()
        };
        let mut ctx = ShimContext::new(backend, ".");
        assert_eq!(null_send(&mut ctx), -7);
        assert_eq!(null_recv(&mut ctx), 42);
    }
}
