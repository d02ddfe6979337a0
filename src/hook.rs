//! Handles finding a hooking library, and provides types for using the library to hook engine
//! code.

use cached::proc_macro::cached;
use dlopen::symbor::Library;
use eyre::{eyre, Context, Result};
use libc::c_void;
use once_cell::sync::OnceCell;

/// The signature of `MSHookFunction` and compatible functions from other hooking libraries.
type RawHookFn =
    unsafe extern "C" fn(target: *mut c_void, replacement: *mut c_void, original: *mut *mut c_void);

fn get_single_symbol<T: Copy>(path: &str, sym_name: &str) -> Result<T> {
    let lib = Library::open(path).wrap_err("Failed to open hooking library")?;
    let symbol =
        unsafe { lib.symbol::<T>(sym_name) }.wrap_err("Unable to find symbol in library")?;

    // The library handle is dropped here, so it must stay loaded by some other means. Hooking
    // libraries are always injected before we are.
    Ok(*symbol)
}

#[cached(result = true)]
fn get_raw_hook_fn(library: String) -> Result<usize> {
    get_single_symbol::<usize>(&library, "MSHookFunction")
        .wrap_err_with(|| format!("'{library}' does not export MSHookFunction"))
}

/// Something which can redirect native functions.
pub trait HookBackend: Send + Sync {
    /// Redirects every call to the function at `target` into `replacement`. The returned address
    /// is a trampoline which runs the original implementation without passing through
    /// `replacement` again.
    fn install(&self, target: usize, replacement: usize) -> Result<usize>;
}

/// Hooks through a Substrate-compatible library loaded at runtime.
pub struct SubstrateBackend {
    library: String,
}

impl SubstrateBackend {
    pub fn new(library: impl Into<String>) -> SubstrateBackend {
        SubstrateBackend {
            library: library.into(),
        }
    }
}

impl HookBackend for SubstrateBackend {
    fn install(&self, target: usize, replacement: usize) -> Result<usize> {
        let raw = get_raw_hook_fn(self.library.clone())?;
        let hook_fn: RawHookFn = unsafe { std::mem::transmute(raw) };

        let mut original: *mut c_void = std::ptr::null_mut();

        unsafe {
            hook_fn(target as *mut c_void, replacement as *mut c_void, &mut original);
        }

        if original.is_null() {
            return Err(eyre!("hooking {target:#x} did not produce a trampoline"));
        }

        Ok(original as usize)
    }
}

/// A hook on a single native function, holding the pointer to the original implementation once
/// the hook has been installed.
pub struct Hook<FnType> {
    original_fn: OnceCell<FnType>,
}

impl<FnType: Copy> Hook<FnType> {
    /// Creates a new hook. This does not install the hook.
    pub const fn new() -> Hook<FnType> {
        Hook {
            original_fn: OnceCell::new(),
        }
    }

    /// Replaces the implementation of the function at `target` with `replacement`. The original
    /// function pointer can be obtained by calling `original()`. A hook can only be installed
    /// once.
    pub fn install(
        &self,
        backend: &dyn HookBackend,
        target: usize,
        replacement: FnType,
    ) -> Result<()> {
        if std::mem::size_of::<FnType>() != std::mem::size_of::<usize>() {
            return Err(eyre!("hooks can only be created for function pointers"));
        }

        if self.original_fn.get().is_some() {
            return Err(eyre!("hook for {target:#x} is already installed"));
        }

        let replacement: usize = unsafe { std::mem::transmute_copy(&replacement) };
        let original = backend
            .install(target, replacement)
            .wrap_err_with(|| format!("failed to hook {target:#x}"))?;

        let original: FnType = unsafe { std::mem::transmute_copy(&original) };

        self.original_fn
            .set(original)
            .map_err(|_| eyre!("hook for {target:#x} was installed concurrently"))
    }

    /// Returns a pointer to the original implementation of the hooked function, or `None` if the
    /// hook has not been installed.
    pub fn original(&self) -> Option<FnType> {
        self.original_fn.get().copied()
    }

    pub fn is_installed(&self) -> bool {
        self.original_fn.get().is_some()
    }
}
