use rand::Rng;
use std::fmt::Write;

/// 128 random bits, hex encoded.
pub fn new_instance_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();

    let mut id = String::with_capacity(32);
    for byte in bytes.iter() {
        let _ = write!(id, "{:02x}", byte);
    }
    id
}
