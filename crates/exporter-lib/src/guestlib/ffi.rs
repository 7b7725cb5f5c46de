//! FFI bindings for vmGuestLib.
//!
//! The library ships with open-vm-tools and VMware Tools. It is loaded at
//! runtime via dlopen so the exporter still starts (and reports
//! `vmwareguest_isguest 0`) on hosts where it is not installed.

use super::{GuestSession, RefreshOutcome, Stat, StatWidth};
use crate::error::{status, GuestLibError, Result};
use libloading::{Library, Symbol};
use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Opaque `VMGuestLibHandle`
type Handle = *mut c_void;

type OpenHandle = unsafe extern "C" fn(handle: *mut Handle) -> c_int;
type CloseHandle = unsafe extern "C" fn(handle: Handle) -> c_int;
type UpdateInfo = unsafe extern "C" fn(handle: Handle) -> c_int;
type GetSessionId = unsafe extern "C" fn(handle: Handle, id: *mut u64) -> c_int;
type GetErrorText = unsafe extern "C" fn(error: c_int) -> *const c_char;
type GetU32 = unsafe extern "C" fn(handle: Handle, out: *mut u32) -> c_int;
type GetU64 = unsafe extern "C" fn(handle: Handle, out: *mut u64) -> c_int;

/// Install locations probed when no explicit path is configured.
const CANDIDATES: &[&str] = &[
    // VMware Tools (tarball installer)
    "/usr/lib/vmware-tools/lib64/libvmGuestLib.so/libvmGuestLib.so",
    "/usr/lib/vmware-tools/lib32/libvmGuestLib.so/libvmGuestLib.so",
    // open-vm-tools
    "/usr/lib/x86_64-linux-gnu/libvmGuestLib.so.0",
    "/usr/lib/aarch64-linux-gnu/libvmGuestLib.so.0",
    "/usr/lib64/libvmGuestLib.so.0",
    "/usr/lib/libvmGuestLib.so.0",
    "/usr/local/lib/libvmGuestLib.so.0",
];

/// Soname handed to the dynamic loader when no candidate path exists.
const SONAME: &str = "libvmGuestLib.so.0";

#[derive(Clone, Copy)]
enum Getter {
    U32(GetU32),
    U64(GetU64),
}

/// Safe wrapper around a loaded vmGuestLib.
pub struct VmGuestLib {
    _library: Arc<Library>,
    path: PathBuf,
    open_handle: OpenHandle,
    close_handle: CloseHandle,
    update_info: UpdateInfo,
    get_session_id: GetSessionId,
    get_error_text: GetErrorText,
    /// Indexed by `Stat as usize`
    getters: Vec<Getter>,
}

impl VmGuestLib {
    /// Load vmGuestLib from `path`, or from the standard install locations.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let library_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::find_library(),
        };
        info!(path = %library_path.display(), "Loading vmGuestLib");

        // Safety: vmGuestLib has no load-time initializers beyond the C runtime
        let library = unsafe {
            Library::new(&library_path).map_err(|e| {
                if path.is_none() && library_path == Path::new(SONAME) {
                    GuestLibError::LibraryNotFound {
                        searched: CANDIDATES.iter().map(PathBuf::from).collect(),
                    }
                } else {
                    GuestLibError::Load {
                        path: library_path.clone(),
                        reason: e.to_string(),
                    }
                }
            })?
        };
        let library = Arc::new(library);

        // Safety: signatures match vmGuestLib.h
        unsafe {
            let open_handle: OpenHandle =
                *Self::symbol::<OpenHandle>(&library, "VMGuestLib_OpenHandle")?;
            let close_handle: CloseHandle =
                *Self::symbol::<CloseHandle>(&library, "VMGuestLib_CloseHandle")?;
            let update_info: UpdateInfo =
                *Self::symbol::<UpdateInfo>(&library, "VMGuestLib_UpdateInfo")?;
            let get_session_id: GetSessionId =
                *Self::symbol::<GetSessionId>(&library, "VMGuestLib_GetSessionId")?;
            let get_error_text: GetErrorText =
                *Self::symbol::<GetErrorText>(&library, "VMGuestLib_GetErrorText")?;

            let mut getters = Vec::with_capacity(Stat::ALL.len());
            for stat in Stat::ALL {
                let getter = match stat.width() {
                    StatWidth::U32 => {
                        Getter::U32(*Self::symbol::<GetU32>(&library, stat.symbol())?)
                    }
                    StatWidth::U64 => {
                        Getter::U64(*Self::symbol::<GetU64>(&library, stat.symbol())?)
                    }
                };
                getters.push(getter);
            }

            Ok(Self {
                _library: library,
                path: library_path,
                open_handle,
                close_handle,
                update_info,
                get_session_id,
                get_error_text,
                getters,
            })
        }
    }

    /// Path the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn find_library() -> PathBuf {
        for path in CANDIDATES {
            let path = PathBuf::from(path);
            if path.exists() {
                debug!(path = %path.display(), "Found vmGuestLib");
                return path;
            }
        }
        // Let the dynamic loader search LD_LIBRARY_PATH and ld.so.cache
        PathBuf::from(SONAME)
    }

    unsafe fn symbol<'a, T>(library: &'a Library, name: &'static str) -> Result<Symbol<'a, T>> {
        library.get(name.as_bytes()).map_err(|e| GuestLibError::Symbol {
            symbol: name,
            reason: e.to_string(),
        })
    }

    fn check(&self, ret: c_int, call: &'static str) -> Result<()> {
        let code = ret as u32;
        if code == status::SUCCESS {
            return Ok(());
        }
        Err(GuestLibError::Native {
            call,
            code,
            message: self.error_text(ret),
        })
    }

    fn error_text(&self, ret: c_int) -> String {
        // Safety: returns a pointer to a static string or null
        let text = unsafe { (self.get_error_text)(ret) };
        if text.is_null() {
            return status::describe(ret as u32).to_string();
        }
        // Safety: non-null pointers are NUL-terminated static strings
        unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
    }
}

// Function pointers into an immutable, never-unloaded library.
unsafe impl Send for VmGuestLib {}
unsafe impl Sync for VmGuestLib {}

/// An open vmGuestLib handle.
pub struct GuestLibSession {
    lib: Arc<VmGuestLib>,
    handle: Handle,
    session_id: u64,
}

impl GuestLibSession {
    /// Open a handle and take the first statistics snapshot.
    pub fn open(lib: Arc<VmGuestLib>) -> Result<Self> {
        let mut handle: Handle = std::ptr::null_mut();
        // Safety: out-parameter is a valid pointer to a handle slot
        let ret = unsafe { (lib.open_handle)(&mut handle) };
        lib.check(ret, "VMGuestLib_OpenHandle")?;

        let mut session = Self {
            lib,
            handle,
            session_id: 0,
        };
        session.update()?;
        session.session_id = session.current_session_id()?;
        debug!(session_id = session.session_id, "Opened guest-info session");

        Ok(session)
    }

    /// Host-assigned id of the current session
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    fn update(&self) -> Result<()> {
        // Safety: handle was produced by OpenHandle and is not yet closed
        let ret = unsafe { (self.lib.update_info)(self.handle) };
        self.lib.check(ret, "VMGuestLib_UpdateInfo")
    }

    fn current_session_id(&self) -> Result<u64> {
        let mut id = 0u64;
        // Safety: valid handle and out-pointer
        let ret = unsafe { (self.lib.get_session_id)(self.handle, &mut id) };
        self.lib.check(ret, "VMGuestLib_GetSessionId")?;
        Ok(id)
    }
}

impl GuestSession for GuestLibSession {
    fn refresh(&mut self) -> Result<RefreshOutcome> {
        self.update()?;
        let id = self.current_session_id()?;
        if id != self.session_id {
            debug!(old = self.session_id, new = id, "Guest-info session changed");
            self.session_id = id;
            return Ok(RefreshOutcome::SessionChanged);
        }
        Ok(RefreshOutcome::Unchanged)
    }

    fn read(&self, stat: Stat) -> Result<u64> {
        // Safety: valid handle and out-pointers sized to the native width
        match self.lib.getters[stat as usize] {
            Getter::U32(get) => {
                let mut out = 0u32;
                let ret = unsafe { get(self.handle, &mut out) };
                self.lib.check(ret, stat.symbol())?;
                Ok(u64::from(out))
            }
            Getter::U64(get) => {
                let mut out = 0u64;
                let ret = unsafe { get(self.handle, &mut out) };
                self.lib.check(ret, stat.symbol())?;
                Ok(out)
            }
        }
    }
}

impl Drop for GuestLibSession {
    fn drop(&mut self) {
        // Safety: handle is closed exactly once
        let ret = unsafe { (self.lib.close_handle)(self.handle) };
        if let Err(e) = self.lib.check(ret, "VMGuestLib_CloseHandle") {
            debug!(error = %e, "Failed to close guest-info handle");
        }
    }
}

// The handle is only touched through &mut self or under the collector's lock.
unsafe impl Send for GuestLibSession {}

/// Load the library and open a session in one step.
pub fn open_default_session(path: Option<&Path>) -> Result<Box<dyn GuestSession>> {
    let lib = Arc::new(VmGuestLib::load(path)?);
    let session = GuestLibSession::open(lib)?;
    Ok(Box::new(session))
}
