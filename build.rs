fn main() -> Result<(), Box<dyn std::error::Error>> {
    prost_build::compile_protos(&["proto/remote_write.proto"], &["proto/"])?;
    println!("cargo:rerun-if-changed=proto/remote_write.proto");
    Ok(())
}
