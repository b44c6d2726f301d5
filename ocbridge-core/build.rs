//! Build script
//!
//! With the `libopenconnect` feature, generates bindings for the system
//! `openconnect.h`, compiles the progress shim and links libopenconnect.
//! Without it there is nothing to do.

fn main() {
    #[cfg(feature = "libopenconnect")]
    libopenconnect::build();
}

#[cfg(feature = "libopenconnect")]
mod libopenconnect {
    use std::env;
    use std::path::PathBuf;

    pub fn build() {
        println!("cargo:rerun-if-changed=csrc/wrapper.h");
        println!("cargo:rerun-if-changed=csrc/progress_shim.c");

        cc::Build::new()
            .file("csrc/progress_shim.c")
            .warnings(true)
            .compile("ocbridge_progress_shim");

        println!("cargo:rustc-link-lib=openconnect");

        let bindings = bindgen::Builder::default()
            .header("csrc/wrapper.h")
            .allowlist_function("openconnect_.*")
            .allowlist_type("oc_.*")
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            .generate()
            .expect("Unable to generate libopenconnect bindings");

        let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
        bindings
            .write_to_file(out_dir.join("bindings.rs"))
            .expect("Couldn't write libopenconnect bindings");
    }
}
