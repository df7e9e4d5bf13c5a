fn main() -> Result<(), Box<dyn std::error::Error>> {
    // no system protoc needed
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    tonic_build::configure()
        .build_server(false)
        .compile_protos(&["proto/grpc.proto"], &["proto"])?;
    Ok(())
}
