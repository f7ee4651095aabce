//! Build script for proto compilation.
//!
//! Generates the server side of the `hemmer.provider.v1` protocol from
//! `proto/provider.proto`. The generated module is pulled in by
//! `src/generated.rs` via `tonic::include_proto!`.
//!
//! Requires `protoc` on `PATH`, or the `PROTOC` environment variable
//! pointing at a `protoc` binary (`apt install protobuf-compiler`,
//! `brew install protobuf`).

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&["proto/provider.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/provider.proto");

    Ok(())
}
