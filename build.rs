/* Points the linker at `linker.ld` for the firmware binary. No FFI, no
 * bindgen: this crate's SBI/trap/domain logic is native Rust, not a
 * wrapper over a C library.
 *
 * Author: Giuseppe Capasso <capassog97@gmail.com>
 */
fn main() {
    println!("cargo:rustc-link-arg=-Tlinker.ld");
    println!("cargo:rustc-link-arg=-static");
    println!("cargo:rerun-if-changed=linker.ld");
}
