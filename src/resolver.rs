//! Resolution of the real MPI entry points inside a dynamically loaded library
//!
//! The shim cannot link against MPI directly (it replaces the very symbols it
//! needs), so the real `MPI_Init`/`MPI_Finalize`/`MPI_Send`/`MPI_Recv` are
//! located by name with `dlopen`/`dlsym` once per process. Resolution failure
//! is a typed [`ResolutionError`]; forwarding through an unresolved pointer is
//! never attempted.
//!
//! [`MpiBackend`] is the seam between the shim and the loaded library: unit
//! tests substitute a fake backend and never touch real dynamic loading.

use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_void};

use thiserror::Error;

/// Opaque `MPI_Comm` handle (a pointer in OpenMPI's ABI)
pub type MpiComm = *mut c_void;
/// Opaque `MPI_Datatype` handle
pub type MpiDatatype = *mut c_void;

pub type InitFn = unsafe extern "C" fn(*mut c_int, *mut *mut *mut c_char) -> c_int;
pub type FinalizeFn = unsafe extern "C" fn() -> c_int;
pub type SendFn =
    unsafe extern "C" fn(*const c_void, c_int, MpiDatatype, c_int, c_int, MpiComm) -> c_int;
pub type RecvFn = unsafe extern "C" fn(
    *mut c_void,
    c_int,
    MpiDatatype,
    c_int,
    c_int,
    MpiComm,
    *mut c_void,
) -> c_int;
pub type CommRankFn = unsafe extern "C" fn(MpiComm, *mut c_int) -> c_int;

/// `MPI_SUCCESS` in every MPI ABI
pub const MPI_SUCCESS: c_int = 0;

/// Name of the OpenMPI world-communicator object resolved for rank queries
const WORLD_COMM_SYMBOL: &str = "ompi_mpi_comm_world";

/// Library open or symbol lookup failure
///
/// Fatal for the instrumented process: the shim must abort rather than
/// silently no-op a send/recv, which would corrupt host program semantics.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("cannot open MPI library '{path}': {reason}")]
    LibraryOpen { path: String, reason: String },

    #[error("cannot resolve symbol '{name}': {reason}")]
    SymbolMissing { name: String, reason: String },
}

/// The shim's view of the underlying MPI implementation
///
/// All methods are unsafe: arguments are raw pointers owned by the host
/// program and forwarded verbatim.
pub trait MpiBackend: Send {
    /// Forward `MPI_Init`
    ///
    /// # Safety
    /// `argc`/`argv` must be the host program's init arguments (or null where
    /// the MPI implementation permits it).
    unsafe fn init(&self, argc: *mut c_int, argv: *mut *mut *mut c_char) -> c_int;

    /// Forward `MPI_Finalize`
    ///
    /// # Safety
    /// Must follow a successful init, at most once, per MPI's own contract.
    unsafe fn finalize(&self) -> c_int;

    /// Forward `MPI_Send`
    ///
    /// # Safety
    /// `buf` must point to `count` elements of `datatype` readable for the
    /// duration of the call.
    unsafe fn send(
        &self,
        buf: *const c_void,
        count: c_int,
        datatype: MpiDatatype,
        dest: c_int,
        tag: c_int,
        comm: MpiComm,
    ) -> c_int;

    /// Forward `MPI_Recv`
    ///
    /// # Safety
    /// `buf` must be writable for `count` elements of `datatype`; `status`
    /// must be a valid `MPI_Status` pointer or the implementation's
    /// ignore-status sentinel.
    #[allow(clippy::too_many_arguments)]
    unsafe fn recv(
        &self,
        buf: *mut c_void,
        count: c_int,
        datatype: MpiDatatype,
        source: c_int,
        tag: c_int,
        comm: MpiComm,
        status: *mut c_void,
    ) -> c_int;

    /// Query the calling process's rank in the world communicator
    ///
    /// Returns `Err` with the MPI error code on failure.
    ///
    /// # Safety
    /// Must follow a successful init.
    unsafe fn rank(&self) -> Result<c_int, c_int>;
}

/// Owned `dlopen` handle, closed on drop
struct LibHandle(*mut c_void);

// The handle is process-scoped and only ever used behind the shim's mutex.
unsafe impl Send for LibHandle {}

impl Drop for LibHandle {
    fn drop(&mut self) {
        // Safety: handle came from a successful dlopen and is closed once.
        unsafe {
            libc::dlclose(self.0);
        }
    }
}

/// Real backend: function pointers resolved from a loaded MPI library
pub struct DlBackend {
    init: InitFn,
    finalize: FinalizeFn,
    send: SendFn,
    recv: RecvFn,
    comm_rank: CommRankFn,
    world: MpiComm,
    _handle: LibHandle,
}

// `world` points into the loaded library, which lives as long as `_handle`.
unsafe impl Send for DlBackend {}

impl DlBackend {
    /// Open `path` and resolve every entry point the shim forwards to
    ///
    /// Resolution happens exactly once per process; the returned backend owns
    /// the library handle for the process lifetime.
    pub fn open(path: &str) -> Result<Self, ResolutionError> {
        let c_path = CString::new(path).map_err(|e| ResolutionError::LibraryOpen {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        // Safety: c_path is a valid NUL-terminated string.
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_LAZY) };
        if handle.is_null() {
            return Err(ResolutionError::LibraryOpen {
                path: path.to_string(),
                reason: last_dl_error(),
            });
        }
        let handle = LibHandle(handle);

        // Safety: transmuting dlsym results to the documented MPI signatures.
        unsafe {
            let init: InitFn = std::mem::transmute(resolve(&handle, "MPI_Init")?);
            let finalize: FinalizeFn = std::mem::transmute(resolve(&handle, "MPI_Finalize")?);
            let send: SendFn = std::mem::transmute(resolve(&handle, "MPI_Send")?);
            let recv: RecvFn = std::mem::transmute(resolve(&handle, "MPI_Recv")?);
            let comm_rank: CommRankFn = std::mem::transmute(resolve(&handle, "MPI_Comm_rank")?);
            // MPI_COMM_WORLD is the address of the exported communicator object.
            let world: MpiComm = resolve(&handle, WORLD_COMM_SYMBOL)?;

            Ok(Self {
                init,
                finalize,
                send,
                recv,
                comm_rank,
                world,
                _handle: handle,
            })
        }
    }
}

impl MpiBackend for DlBackend {
    unsafe fn init(&self, argc: *mut c_int, argv: *mut *mut *mut c_char) -> c_int {
        unsafe { (self.init)(argc, argv) }
    }

    unsafe fn finalize(&self) -> c_int {
        unsafe { (self.finalize)() }
    }

    unsafe fn send(
        &self,
        buf: *const c_void,
        count: c_int,
        datatype: MpiDatatype,
        dest: c_int,
        tag: c_int,
        comm: MpiComm,
    ) -> c_int {
        unsafe { (self.send)(buf, count, datatype, dest, tag, comm) }
    }

    unsafe fn recv(
        &self,
        buf: *mut c_void,
        count: c_int,
        datatype: MpiDatatype,
        source: c_int,
        tag: c_int,
        comm: MpiComm,
        status: *mut c_void,
    ) -> c_int {
        unsafe { (self.recv)(buf, count, datatype, source, tag, comm, status) }
    }

    unsafe fn rank(&self) -> Result<c_int, c_int> {
        let mut rank: c_int = 0;
        let rc = unsafe { (self.comm_rank)(self.world, &mut rank) };
        if rc == MPI_SUCCESS {
            Ok(rank)
        } else {
            Err(rc)
        }
    }
}

/// Resolve one symbol, distinguishing "absent" from a genuine NULL address
fn resolve(handle: &LibHandle, name: &str) -> Result<*mut c_void, ResolutionError> {
    let c_name = CString::new(name).map_err(|e| ResolutionError::SymbolMissing {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    // Clear any stale error state before the lookup.
    // Safety: dlerror/dlsym on a live handle.
    unsafe {
        libc::dlerror();
        let addr = libc::dlsym(handle.0, c_name.as_ptr());
        let err = libc::dlerror();
        if !err.is_null() {
            return Err(ResolutionError::SymbolMissing {
                name: name.to_string(),
                reason: c_str_to_string(err),
            });
        }
        if addr.is_null() {
            return Err(ResolutionError::SymbolMissing {
                name: name.to_string(),
                reason: "symbol resolved to NULL".to_string(),
            });
        }
        Ok(addr)
    }
}

fn last_dl_error() -> String {
    // Safety: dlerror returns a static thread-local buffer or NULL.
    unsafe {
        let err = libc::dlerror();
        if err.is_null() {
            "unknown dlopen error".to_string()
        } else {
            c_str_to_string(err)
        }
    }
}

fn c_str_to_string(ptr: *const c_char) -> String {
    // Safety: caller guarantees ptr is a valid NUL-terminated string.
    unsafe { std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned() }
}
