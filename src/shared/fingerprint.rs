use getrandom::getrandom;
use sha2::{Digest, Sha256};

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RECORD_SUFFIX_SPACE: u32 = 36 * 36 * 36 * 36;

pub fn invocation_fingerprint(user_id: &str, command_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0]);
    hasher.update(command_text.as_bytes());
    let digest = hasher.finalize();
    to_hex(&digest)
}

pub fn compact_record_id(prefix: &str, now: i64) -> Result<String, String> {
    let timestamp = u64::try_from(now)
        .map_err(|_| "record id requires a non-negative timestamp".to_string())?;
    let mut bytes = [0_u8; 4];
    getrandom(&mut bytes)
        .map_err(|err| format!("failed to generate record id randomness: {err}"))?;
    let sample = u32::from_le_bytes(bytes) % RECORD_SUFFIX_SPACE;
    let ts = base36_encode_u64(timestamp);
    let suffix = base36_encode_fixed_u32(sample, 4);
    Ok(format!("{prefix}-{ts}-{suffix}"))
}

pub fn audit_record_id(now: i64) -> Result<String, String> {
    compact_record_id("aud", now)
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    const HEX: &[u8; 16] = b"0123456789abcdef";
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

fn base36_encode_u64(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while value > 0 {
        chars.push(BASE36_ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    chars.into_iter().rev().collect()
}

fn base36_encode_fixed_u32(mut value: u32, width: usize) -> String {
    let mut chars = vec!['0'; width];
    for idx in (0..width).rev() {
        chars[idx] = BASE36_ALPHABET[(value % 36) as usize] as char;
        value /= 36;
    }
    chars.into_iter().collect()
}
