fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = std::env::var("OUT_DIR")?;

    // protoc is not expected on PATH, use the vendored binary and its
    // bundled well-known types.
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    let wkt_include = protoc_bin_vendored::include_path()?;

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(format!("{}/api_descriptor.bin", out_dir))
        .compile_protos(
            &[
                "../../../api/proto/common/common.proto",
                "../../../api/proto/api/user.proto",
                "../../../api/proto/api/application.proto",
                "../../../api/proto/api/internal.proto",
            ],
            &[std::path::PathBuf::from("../../../api/proto"), wkt_include],
        )?;

    println!("cargo:rerun-if-changed=../../../api/proto");
    Ok(())
}
