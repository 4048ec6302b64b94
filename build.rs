// build.rs

fn main() {
    println!("cargo:rerun-if-env-changed=PUREDOOM_LIB_DIR");

    // Only the `puredoom` feature links native code; the default build drives
    // the built-in test card engine and needs nothing from the system.
    if std::env::var_os("CARGO_FEATURE_PUREDOOM").is_none() {
        return;
    }

    // --- Link against PureDOOM ---
    // Try pkg-config first. If the library ships without a .pc file, fall back
    // to a static archive located through PUREDOOM_LIB_DIR.
    match pkg_config::probe_library("puredoom") {
        Ok(_) => {
            eprintln!("pkg-config found puredoom. Linking configured automatically.");
        }
        Err(e) => {
            eprintln!(
                "pkg-config failed for library 'puredoom' ({}). Falling back to manual linking.",
                e
            );

            if let Ok(dir) = std::env::var("PUREDOOM_LIB_DIR") {
                println!("cargo:rustc-link-search=native={}", dir);
            } else {
                println!("cargo:rustc-link-search=/usr/local/lib");
                println!("cargo:rustc-link-search=/usr/lib");
            }
            println!("cargo:rustc-link-lib=static=puredoom");

            eprintln!(
                "Manual linking flags applied. Build libpuredoom.a from PureDOOM.h with DOOM_IMPLEMENTATION defined."
            );
        }
    }
}
