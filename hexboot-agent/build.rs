// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

use std::env;
use std::fs;
use std::path::PathBuf;

const LINKER_SCRIPT: &str = "agent_rp2040.x";

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    let script = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"))
        .join("..")
        .join("linker_scripts")
        .join(LINKER_SCRIPT);

    let memory = fs::read_to_string(&script)
        .unwrap_or_else(|e| panic!("cannot read {}: {}", script.display(), e));
    fs::write(out_dir.join("memory.x"), memory).expect("cannot write memory.x");

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg=-Tlink.x");
    println!("cargo:rustc-link-arg=-Tdefmt.x");
    println!("cargo:rerun-if-changed={}", script.display());
    println!("cargo:rerun-if-changed=build.rs");
}
