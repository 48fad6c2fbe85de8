//! Build script for capsule-runtime.
//!
//! Test binaries are linked with `-rdynamic` so native units can resolve
//! the `capsule_unit_*` host functions from them. When a C compiler is
//! available the native unit fixture is built into `OUT_DIR` and its path
//! exported as `CAPSULE_NATIVE_FIXTURE`.

use std::env;
use std::path::PathBuf;

const FIXTURE_SOURCE: &str = "tests/fixtures/native_unit.c";

fn main() {
    println!("cargo:rerun-if-changed={}", FIXTURE_SOURCE);
    println!("cargo:rustc-link-arg-tests=-rdynamic");
    build_native_fixture();
}

fn build_native_fixture() {
    let Some(out_dir) = env::var_os("OUT_DIR").map(PathBuf::from) else {
        return;
    };
    let output = out_dir.join("native_unit.so");

    let compiler = match cc::Build::new().try_get_compiler() {
        Ok(compiler) => compiler,
        Err(e) => {
            println!("cargo:warning=no C compiler ({}); native fixture tests will be skipped", e);
            return;
        }
    };

    let status = compiler
        .to_command()
        .args(["-shared", "-fPIC", "-o"])
        .arg(&output)
        .arg(FIXTURE_SOURCE)
        .status();
    match status {
        Ok(s) if s.success() => {
            println!("cargo:rustc-env=CAPSULE_NATIVE_FIXTURE={}", output.display());
        }
        _ => println!(
            "cargo:warning=failed to build {}; native fixture tests will be skipped",
            FIXTURE_SOURCE
        ),
    }
}
