pub mod constants;

/// Hex MD5 digest, the checksum format the service reports for bodies.
pub fn md5_hex(data: &str) -> String {
    format!("{:x}", md5::compute(data.as_bytes()))
}
