//! Probabilistic sender index carried by blocks.
//!
//! The bit array lives in one of two states: raw bits for mutation and
//! membership checks, or a zlib+base64 string for storage and transport.
//! Mutation inflates on demand; serialization always emits the compressed
//! form. Bit positions come from MurmurHash3 x86 32-bit with the hash
//! function index as the seed.

use std::fmt;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default bit-array length.
pub const DEFAULT_SIZE_BITS: usize = 1 << 20;
/// Default number of hash functions.
pub const DEFAULT_HASH_COUNT: u32 = 5;

/// Construction parameters. `hash_count` should approximate
/// `size_bits * ln 2 / expected_items`.
#[derive(Clone, Copy, Debug)]
pub struct BloomConfig {
    pub size_bits: usize,
    pub hash_count: u32,
    /// Start in compressed storage; the first mutation inflates.
    pub compressed_storage: bool,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            size_bits: DEFAULT_SIZE_BITS,
            hash_count: DEFAULT_HASH_COUNT,
            compressed_storage: false,
        }
    }
}

#[derive(Clone, Debug)]
enum Bits {
    Raw(Vec<u8>),
    Compressed(String),
}

/// Fixed-size Bloom filter with compressible storage.
///
/// False positives are possible; false negatives are not.
#[derive(Clone, Debug)]
pub struct BloomFilter {
    size: usize,
    hash_count: u32,
    bits: Bits,
}

impl BloomFilter {
    /// Filter with raw zeroed bits.
    pub fn new(size_bits: usize, hash_count: u32) -> Self {
        Self {
            size: size_bits,
            hash_count,
            bits: Bits::Raw(vec![0u8; size_bits.div_ceil(8)]),
        }
    }

    pub fn with_config(config: BloomConfig) -> Self {
        if config.compressed_storage {
            Self {
                size: config.size_bits,
                hash_count: config.hash_count,
                bits: Bits::Compressed(String::new()),
            }
        } else {
            Self::new(config.size_bits, config.hash_count)
        }
    }

    pub fn size_bits(&self) -> usize {
        self.size
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.bits, Bits::Compressed(_))
    }

    /// Set the `hash_count` bit positions for `item`.
    pub fn insert(&mut self, item: &str) {
        let (size, hash_count) = (self.size, self.hash_count);
        let bits = self.ensure_raw();
        for seed in 0..hash_count {
            let index = murmur3_x86_32(item.as_bytes(), seed) as usize % size;
            if let Some(byte) = bits.get_mut(index / 8) {
                *byte |= 1 << (index % 8);
            }
        }
    }

    /// True when every bit position for `item` is set. Compressed storage is
    /// inflated transiently, without changing the storage mode.
    pub fn contains(&self, item: &str) -> bool {
        match &self.bits {
            Bits::Raw(bits) => self.contains_in(bits, item),
            Bits::Compressed(encoded) => {
                let bits = inflate(encoded).unwrap_or_else(|| self.zeroed());
                self.contains_in(&bits, item)
            }
        }
    }

    fn contains_in(&self, bits: &[u8], item: &str) -> bool {
        (0..self.hash_count).all(|seed| {
            let index = murmur3_x86_32(item.as_bytes(), seed) as usize % self.size;
            bits.get(index / 8)
                .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
        })
    }

    /// Deflate the bit array and free the raw form.
    pub fn compress(&mut self) {
        if let Bits::Raw(bits) = &self.bits {
            self.bits = Bits::Compressed(deflate(bits));
        }
    }

    /// Inflate back to raw bits.
    pub fn decompress(&mut self) {
        self.ensure_raw();
    }

    /// Inflate to raw bits; undecodable compressed content falls back to a
    /// zeroed array of the configured width.
    fn ensure_raw(&mut self) -> &mut Vec<u8> {
        if let Bits::Compressed(encoded) = &self.bits {
            let mut bits = inflate(encoded).unwrap_or_else(|| self.zeroed());
            bits.resize(self.size.div_ceil(8), 0);
            self.bits = Bits::Raw(bits);
        }
        match &mut self.bits {
            Bits::Raw(bits) => bits,
            Bits::Compressed(_) => unreachable!("ensure_raw leaves raw bits in place"),
        }
    }

    fn zeroed(&self) -> Vec<u8> {
        vec![0u8; self.size.div_ceil(8)]
    }

    /// Number of set bits; compressed storage is inflated transiently.
    pub fn set_bit_count(&self) -> usize {
        let count = |bits: &[u8]| bits.iter().map(|byte| byte.count_ones() as usize).sum();
        match &self.bits {
            Bits::Raw(bits) => count(bits),
            Bits::Compressed(encoded) => count(&inflate(encoded).unwrap_or_default()),
        }
    }

    /// Fraction of bits set.
    pub fn density(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        self.set_bit_count() as f64 / self.size as f64
    }

    /// Raw byte length over compressed byte length; deflates transiently
    /// when the filter holds raw bits.
    pub fn compression_ratio(&self) -> f64 {
        let raw_len = self.size.div_ceil(8);
        let compressed_len = match &self.bits {
            Bits::Compressed(encoded) => encoded.len(),
            Bits::Raw(bits) => deflate(bits).len(),
        };
        if compressed_len == 0 {
            return f64::INFINITY;
        }
        raw_len as f64 / compressed_len as f64
    }

    /// Bit-array statistics snapshot.
    pub fn stats(&self) -> BloomStats {
        let set_bits = self.set_bit_count();
        BloomStats {
            total_bits: self.size,
            set_bits,
            unset_bits: self.size - set_bits,
            density: self.density(),
            compression_ratio: self.compression_ratio(),
            compressed_storage: self.is_compressed(),
        }
    }

    /// Wire record; always carries the compressed form.
    pub fn to_wire(&self) -> BloomWire {
        let compressed_bit_array = match &self.bits {
            Bits::Compressed(encoded) => encoded.clone(),
            Bits::Raw(bits) => deflate(bits),
        };
        BloomWire {
            size: self.size,
            hash_count: self.hash_count,
            compressed_bit_array,
            compressed: true,
        }
    }

    /// Restore from the wire record; inflation is deferred until the first
    /// mutation.
    pub fn from_wire(wire: BloomWire) -> Self {
        Self {
            size: wire.size,
            hash_count: wire.hash_count,
            bits: Bits::Compressed(wire.compressed_bit_array),
        }
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::with_config(BloomConfig::default())
    }
}

impl fmt::Display for BloomFilter {
    /// Parameter form used by the canonical block header.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BloomFilter(size={}, hash_count={})",
            self.size, self.hash_count
        )
    }
}

impl Serialize for BloomFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BloomFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_wire(BloomWire::deserialize(deserializer)?))
    }
}

/// Serialized filter: `{size, hash_count, compressed_bit_array, compressed}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BloomWire {
    pub size: usize,
    pub hash_count: u32,
    pub compressed_bit_array: String,
    pub compressed: bool,
}

/// Bit-array statistics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloomStats {
    pub total_bits: usize,
    pub set_bits: usize,
    pub unset_bits: usize,
    pub density: f64,
    pub compression_ratio: f64,
    pub compressed_storage: bool,
}

fn deflate(bits: &[u8]) -> String {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bits)
        .expect("writing to an in-memory encoder cannot fail");
    let compressed = encoder
        .finish()
        .expect("finishing an in-memory encoder cannot fail");
    base64::encode(compressed)
}

fn inflate(encoded: &str) -> Option<Vec<u8>> {
    let compressed = base64::decode(encoded).ok()?;
    let mut decoder = ZlibDecoder::new(compressed.as_slice());
    let mut bits = Vec::new();
    decoder.read_to_end(&mut bits).ok()?;
    Some(bits)
}

/// MurmurHash3 x86 32-bit.
pub fn murmur3_x86_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in chunks.by_ref() {
        let mut k = u32::from_le_bytes(chunk.try_into().expect("chunk is four bytes"));
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k: u32 = 0;
        for (i, &byte) in tail.iter().enumerate() {
            k ^= u32::from(byte) << (8 * i);
        }
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
