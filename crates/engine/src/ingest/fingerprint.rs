//! Dedup fingerprints
//!
//! xxh3_64 over:
//!
//! ```text
//! version u32 LE | context_type bytes | 0xFF | round(x * levels) as i32 LE ...
//! ```
//!
//! Quantizing first makes near-identical vectors collide on purpose. The
//! version tag lets the scheme change without old fingerprints matching
//! new ones.

use byteorder::{LittleEndian, WriteBytesExt};
use xxhash_rust::xxh3::xxh3_64;

/// Separator between the context type and the quantized components
const CONTEXT_SEPARATOR: u8 = 0xFF;

/// Computes fingerprints for one quantization scheme
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    version: u32,
    levels: u32,
}

impl Fingerprinter {
    /// Fingerprinter for a scheme version and quantization step count
    pub fn new(version: u32, levels: u32) -> Self {
        Fingerprinter {
            version,
            levels: levels.max(1),
        }
    }

    /// Scheme version tag
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Fingerprint a vector in its context
    pub fn fingerprint(&self, vector: &[f32], context_type: &str) -> u64 {
        let mut buf: Vec<u8> = Vec::with_capacity(4 + context_type.len() + 1 + vector.len() * 4);
        // Writes into a Vec cannot fail
        let _ = buf.write_u32::<LittleEndian>(self.version);
        buf.extend_from_slice(context_type.as_bytes());
        buf.push(CONTEXT_SEPARATOR);
        let scale = self.levels as f64;
        for &x in vector {
            // `as` saturates, so out-of-range components still hash stably
            let q = (x as f64 * scale).round() as i32;
            let _ = buf.write_i32::<LittleEndian>(q);
        }
        xxh3_64(&buf)
    }
}
