// Compiles the demo shaders to SPIR-V with the Slang compiler.
//
// The reflection JSON is committed next to the source; the `.spv` is not.
// Without `slangc` (on PATH or via the SLANGC variable) the build continues
// and the demo reports a missing shader at startup.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADERS: &[&str] = &["textured"];

fn main() {
    let shader_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../shaders");
    println!("cargo:rerun-if-env-changed=SLANGC");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var_os("SKIP_SHADERS").is_some() {
        return;
    }

    let slangc = env::var_os("SLANGC")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("slangc"));

    for name in SHADERS {
        let source = shader_dir.join(format!("{name}.slang"));
        let output = shader_dir.join(format!("{name}.spv"));
        let reflection = shader_dir.join(format!("{name}.spv.json"));
        println!("cargo:rerun-if-changed={}", source.display());

        if is_up_to_date(&source, &output) {
            continue;
        }

        let status = Command::new(&slangc)
            .arg(&source)
            .args(["-target", "spirv", "-profile", "spirv_1_6"])
            .arg("-fvk-use-entrypoint-name")
            .arg("-matrix-layout-column-major")
            .arg("-o")
            .arg(&output)
            .arg("-reflection-json")
            .arg(&reflection)
            .status();

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => println!(
                "cargo:warning=slangc failed on {} ({})",
                source.display(),
                status
            ),
            Err(e) => {
                println!(
                    "cargo:warning=slangc not available ({e}), {} not compiled",
                    source.display()
                );
                return;
            }
        }
    }
}

fn is_up_to_date(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| path.metadata().and_then(|m| m.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(src), Some(out)) => out >= src,
        _ => false,
    }
}
