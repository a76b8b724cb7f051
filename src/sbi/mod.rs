//! SBI ecall dispatch: routes an `(extid, funcid)` pair to whichever
//! registered [`SbiExtension`] claims the id, matching the registry
//! model the reference firmware's `sbi_ecall.c` uses (a flat list of
//! extension descriptors, walked linearly, checked with `probe` before
//! `handle` is called).
//!
//! Extensions are registered once, on the cold-boot HART, before any
//! other HART can issue an ecall; the registry is never mutated again.

pub mod base;
pub mod hsm;
pub mod ipi;
pub mod legacy_console;
pub mod mpxy;
pub mod rfence;
pub mod srst;
pub mod timer;

use heapless::Vec;
use spin::Once;

use crate::error::SbiError;

pub const MAX_EXTENSIONS: usize = 16;

/// Result slot an extension fills in before returning success; only
/// meaningful when the handler returns `Ok`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SbiRet {
    pub value: usize,
}

/// One registered SBI extension. Implementations are small, stateless
/// (or backed by the module-level statics they wrap, e.g. [`crate::hsm`])
/// structs; the registry stores `&'static dyn SbiExtension` so no heap
/// allocation is needed to hold them.
pub trait SbiExtension: Sync {
    /// Inclusive extension-id range this implementation claims.
    fn extid_range(&self) -> (usize, usize);

    /// Whether `fid` is implemented within this extension's claimed
    /// range; backs the Base extension's `probe_extension` call.
    fn probe(&self, fid: usize) -> bool;

    /// Services one ecall. `args` holds `a0..a5` as handed to the trap
    /// dispatcher; `ret` receives the value placed in `a1` on success.
    fn handle(&self, fid: usize, args: &[usize; 6], ret: &mut SbiRet) -> Result<(), SbiError>;
}

struct Registry {
    extensions: Vec<&'static dyn SbiExtension, MAX_EXTENSIONS>,
}

static REGISTRY: Once<Registry> = Once::new();

/// Builds and installs the extension registry. Must run exactly once,
/// on the cold-boot HART, before any HART is released to issue ecalls.
pub fn register_builtin_extensions() {
    REGISTRY.call_once(|| {
        let mut extensions: Vec<&'static dyn SbiExtension, MAX_EXTENSIONS> = Vec::new();
        let _ = extensions.push(&base::BASE);
        let _ = extensions.push(&legacy_console::PUTCHAR);
        let _ = extensions.push(&legacy_console::GETCHAR);
        let _ = extensions.push(&timer::TIMER);
        let _ = extensions.push(&ipi::IPI);
        let _ = extensions.push(&rfence::RFENCE);
        let _ = extensions.push(&hsm::HSM);
        let _ = extensions.push(&srst::SRST);
        let _ = extensions.push(&mpxy::MPXY);
        Registry { extensions }
    });
}

fn registry() -> &'static Registry {
    REGISTRY.get().expect("sbi::register_builtin_extensions must run before the first ecall")
}

/// Whether any registered extension claims `extid` at all, independent
/// of any particular function within it. Backs the Base extension's
/// "probe extension" call when `fid` isn't relevant to the question.
pub fn extension_present(extid: usize) -> bool {
    registry().extensions.iter().any(|ext| {
        let (lo, hi) = ext.extid_range();
        extid >= lo && extid <= hi
    })
}

/// Entry point called from [`crate::trap::dispatch_ecall`]. Returns
/// `(error_code, value)` exactly as placed in `a0`/`a1`.
pub fn dispatch(extid: usize, funcid: usize, args: &[usize; 6]) -> (usize, usize) {
    for ext in registry().extensions.iter() {
        let (lo, hi) = ext.extid_range();
        if extid < lo || extid > hi {
            continue;
        }
        if !ext.probe(funcid) {
            return (SbiError::NotSupported.code() as usize, 0);
        }
        let mut ret = SbiRet::default();
        return match ext.handle(funcid, args, &mut ret) {
            Ok(()) => (SbiError::Success.code() as usize, ret.value),
            Err(e) => (e.code() as usize, 0),
        };
    }
    (SbiError::NotSupported.code() as usize, 0)
}
