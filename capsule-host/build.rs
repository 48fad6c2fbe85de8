//! Build script for capsule-host.
//!
//! Native units resolve the `capsule_unit_*` host functions from the
//! executable that loads them, so its dynamic symbols must be exported.

fn main() {
    println!("cargo:rustc-link-arg-tests=-rdynamic");
}
