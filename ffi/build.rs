use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src");

    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into());
    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => return,
    };

    let header = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("PAYPOST_H")
        .with_documentation(true)
        .generate();

    match header {
        Ok(bindings) => {
            bindings.write_to_file(out_dir.join("paypost.h"));
        }
        Err(e) => println!("cargo:warning=header not generated: {e}"),
    }
}
