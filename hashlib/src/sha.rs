//! SHA-256 (FIPS 180-4) and the MGF1 arbitrary-length hash built on it

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// SHA-256 digest length in bytes.
pub const SHA256_DIGEST_LEN: usize = 32;

/// SHA-256 message block length in bytes.
pub const SHA256_BLOCK_LEN: usize = 64;

const SHA256_K: [u32; 64] = [
    0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5,
    0x3956c25b, 0x59f111f1, 0x923f82a4, 0xab1c5ed5,
    0xd807aa98, 0x12835b01, 0x243185be, 0x550c7dc3,
    0x72be5d74, 0x80deb1fe, 0x9bdc06a7, 0xc19bf174,
    0xe49b69c1, 0xefbe4786, 0x0fc19dc6, 0x240ca1cc,
    0x2de92c6f, 0x4a7484aa, 0x5cb0a9dc, 0x76f988da,
    0x983e5152, 0xa831c66d, 0xb00327c8, 0xbf597fc7,
    0xc6e00bf3, 0xd5a79147, 0x06ca6351, 0x14292967,
    0x27b70a85, 0x2e1b2138, 0x4d2c6dfc, 0x53380d13,
    0x650a7354, 0x766a0abb, 0x81c2c92e, 0x92722c85,
    0xa2bfe8a1, 0xa81a664b, 0xc24b8b70, 0xc76c51a3,
    0xd192e819, 0xd6990624, 0xf40e3585, 0x106aa070,
    0x19a4c116, 0x1e376c08, 0x2748774c, 0x34b0bcb5,
    0x391c0cb3, 0x4ed8aa4a, 0x5b9cca4f, 0x682e6ff3,
    0x748f82ee, 0x78a5636f, 0x84c87814, 0x8cc70208,
    0x90befffa, 0xa4506ceb, 0xbef9a3f7, 0xc67178f2,
];

const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a,
    0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

/// SHA-256 hash → 32-byte digest.
pub fn sha256(data: &[u8]) -> [u8; SHA256_DIGEST_LEN] {
    let mut ctx = Sha256::new();
    ctx.update(data);
    ctx.finalize()
}

/// Incremental SHA-256 state.
///
/// `update` may be called any number of times; `finalize` consumes the
/// context, so a finished stream cannot be fed again without a fresh `new`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Sha256 {
    data: [u8; SHA256_BLOCK_LEN],
    datalen: usize,
    bitlen: u64,
    state: [u32; 8],
}

impl Default for Sha256 {
    fn default() -> Self {
        Self::new()
    }
}

impl Sha256 {
    pub const fn new() -> Self {
        Self { data: [0; SHA256_BLOCK_LEN], datalen: 0, bitlen: 0, state: SHA256_IV }
    }

    /// Return the context to its initial state, wiping buffered input.
    pub fn reset(&mut self) {
        self.zeroize();
        self.state = SHA256_IV;
    }

    pub fn update(&mut self, data: &[u8]) {
        self.bitlen = self.bitlen.wrapping_add((data.len() as u64).wrapping_mul(8));
        let mut off = 0;
        if self.datalen > 0 {
            let take = (SHA256_BLOCK_LEN - self.datalen).min(data.len());
            self.data[self.datalen..self.datalen + take].copy_from_slice(&data[..take]);
            self.datalen += take;
            off = take;
            if self.datalen == SHA256_BLOCK_LEN {
                let block = self.data;
                sha256_compress(&mut self.state, &block);
                self.datalen = 0;
            }
        }
        while off + SHA256_BLOCK_LEN <= data.len() {
            sha256_compress(&mut self.state, &data[off..off + SHA256_BLOCK_LEN]);
            off += SHA256_BLOCK_LEN;
        }
        if off < data.len() {
            let rem = data.len() - off;
            self.data[..rem].copy_from_slice(&data[off..]);
            self.datalen = rem;
        }
    }

    /// Apply length padding and return the big-endian digest.
    pub fn finalize(mut self) -> [u8; SHA256_DIGEST_LEN] {
        let mut out = [0u8; SHA256_DIGEST_LEN];
        self.finish(&mut out);
        out
    }

    /// As [`finalize`](Self::finalize), writing into a caller buffer.
    pub fn finalize_into(mut self, digest: &mut [u8; SHA256_DIGEST_LEN]) {
        self.finish(digest);
    }

    fn finish(&mut self, digest: &mut [u8; SHA256_DIGEST_LEN]) {
        let bitlen = self.bitlen;
        let mut i = self.datalen;
        self.data[i] = 0x80;
        i += 1;
        if i > 56 {
            self.data[i..].fill(0);
            let block = self.data;
            sha256_compress(&mut self.state, &block);
            i = 0;
        }
        self.data[i..56].fill(0);
        self.data[56..].copy_from_slice(&bitlen.to_be_bytes());
        let block = self.data;
        sha256_compress(&mut self.state, &block);

        for (chunk, word) in digest.chunks_exact_mut(4).zip(self.state.iter()) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
    }
}

fn sha256_compress(h: &mut [u32; 8], block: &[u8]) {
    let mut w = Zeroizing::new([0u32; 64]);
    for i in 0..16 {
        w[i] = u32::from_be_bytes([
            block[i * 4], block[i * 4 + 1],
            block[i * 4 + 2], block[i * 4 + 3],
        ]);
    }
    for i in 16..64 {
        let s0 = w[i - 15].rotate_right(7) ^ w[i - 15].rotate_right(18) ^ (w[i - 15] >> 3);
        let s1 = w[i - 2].rotate_right(17) ^ w[i - 2].rotate_right(19) ^ (w[i - 2] >> 10);
        w[i] = w[i - 16].wrapping_add(s0).wrapping_add(w[i - 7]).wrapping_add(s1);
    }

    let [mut a, mut b, mut c, mut d, mut e, mut f, mut g, mut hh] = *h;
    for i in 0..64 {
        let s1 = e.rotate_right(6) ^ e.rotate_right(11) ^ e.rotate_right(25);
        let ch = (e & f) ^ ((!e) & g);
        let t1 = hh.wrapping_add(s1).wrapping_add(ch)
            .wrapping_add(SHA256_K[i]).wrapping_add(w[i]);
        let s0 = a.rotate_right(2) ^ a.rotate_right(13) ^ a.rotate_right(22);
        let maj = (a & b) ^ (a & c) ^ (b & c);
        let t2 = s0.wrapping_add(maj);

        hh = g; g = f; f = e; e = d.wrapping_add(t1);
        d = c;  c = b; b = a; a = t1.wrapping_add(t2);
    }

    h[0] = h[0].wrapping_add(a); h[1] = h[1].wrapping_add(b);
    h[2] = h[2].wrapping_add(c); h[3] = h[3].wrapping_add(d);
    h[4] = h[4].wrapping_add(e); h[5] = h[5].wrapping_add(f);
    h[6] = h[6].wrapping_add(g); h[7] = h[7].wrapping_add(hh);
}

// ── MGF1 ────────────────────────────────────────────────────

/// Arbitrary-length hash: `SHA-256(seed || ctr_be32)` for ctr = 0, 1, ..
/// concatenated and truncated to `out.len()` bytes.
pub fn mgf1(seed: &[u8], out: &mut [u8]) {
    out.fill(0);
    mgf1_xor(seed, out);
}

/// XOR the MGF1 stream of `seed` into `target`.
///
/// Equivalent to `mgf1` into a scratch buffer followed by a XOR, without the
/// scratch buffer.
pub fn mgf1_xor(seed: &[u8], target: &mut [u8]) {
    for (counter, chunk) in target.chunks_mut(SHA256_DIGEST_LEN).enumerate() {
        let mut ctx = Sha256::new();
        ctx.update(seed);
        ctx.update(&(counter as u32).to_be_bytes());
        let mask = Zeroizing::new(ctx.finalize());
        for (t, m) in chunk.iter_mut().zip(mask.iter()) {
            *t ^= m;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            sha256(b"").to_vec(),
            hex("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn test_sha256_abc() {
        assert_eq!(
            sha256(b"abc").to_vec(),
            hex("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_sha256_two_blocks() {
        let msg = b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq";
        assert_eq!(
            sha256(msg).to_vec(),
            hex("248d6a61d20638b8e5c026930c3e6039a33ce45964ff2167f6ecedd419db06c1")
        );
    }

    #[test]
    fn test_sha256_million_a_streamed() {
        let chunk = [b'a'; 1000];
        let mut ctx = Sha256::new();
        for _ in 0..1000 {
            ctx.update(&chunk);
        }
        assert_eq!(
            ctx.finalize().to_vec(),
            hex("cdc76e5c9914fb9281a1c7e284d73e67f1809a48a497200e046d39ccc7112cd0")
        );
    }

    #[test]
    fn test_streaming_split_points_match_one_shot() {
        let data: Vec<u8> = (0..200u32).map(|i| (i * 7 + 3) as u8).collect();
        let expected = sha256(&data);
        for split in [0, 1, 55, 56, 63, 64, 65, 127, 128, 199, 200] {
            let mut ctx = Sha256::new();
            ctx.update(&data[..split]);
            ctx.update(&data[split..]);
            assert_eq!(ctx.finalize(), expected, "split at {}", split);
        }
    }

    #[test]
    fn test_reset_restarts_stream() {
        let mut ctx = Sha256::new();
        ctx.update(b"garbage that should vanish");
        ctx.reset();
        ctx.update(b"abc");
        let mut digest = [0u8; SHA256_DIGEST_LEN];
        ctx.finalize_into(&mut digest);
        assert_eq!(digest, sha256(b"abc"));
    }

    #[test]
    fn test_mgf1_known_output() {
        let mut out = [0u8; 40];
        mgf1(b"seed", &mut out);
        assert_eq!(
            out.to_vec(),
            hex("336f28a022193939585a1b4edc989f870917f3a5f6ddd16e4fb357084a6bdfc273a649427664d03b")
        );
    }

    #[test]
    fn test_mgf1_prefix_stable() {
        let mut short = [0u8; 10];
        let mut long = [0u8; 100];
        mgf1(b"prefix", &mut short);
        mgf1(b"prefix", &mut long);
        assert_eq!(&long[..10], &short[..]);
    }

    #[test]
    fn test_mgf1_xor_twice_is_identity() {
        let original: Vec<u8> = (0..77u8).collect();
        let mut buf = original.clone();
        mgf1_xor(b"k", &mut buf);
        assert_ne!(buf, original);
        mgf1_xor(b"k", &mut buf);
        assert_eq!(buf, original);
    }
}
