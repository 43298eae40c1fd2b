/// Builds the gRPC client and server code for the `objwire.proto` definition
/// using `tonic-prost-build`.
///
/// # Byte Field Optimization
///
/// The `content` field of `ObjectResponse` is marked with `.bytes(...)` so it
/// is generated as `bytes::Bytes` instead of `Vec<u8>`. The server hands out
/// reference-counted views of one in-memory snapshot, so every response shares
/// the same allocation and building a response never copies the payload.
///
/// # Files and Paths
///
/// - Proto file: `proto/objwire.proto`
/// - Includes: `proto/`
/// - Descriptor set: `$OUT_DIR/objwire_descriptor.bin` (used for server
///   reflection)
///
/// # Panics
///
/// Panics if code generation fails.
use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("objwire_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config
        .bytes([".objwire.ObjectResponse.content"])
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/objwire.proto"], &["proto"])
        .unwrap();

    println!("cargo:rerun-if-changed=proto/objwire.proto");
}
