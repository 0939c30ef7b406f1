// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use sha1::{Digest, Sha1};

/// The original two-word password hash shared by the 3.2x scramble and
/// the 4.1.0 hybrid scramble. Spaces and tabs in the password do not
/// contribute to the hash.
fn hash_password(password: &[u8]) -> (u32, u32) {
    let mut nr = 1_345_345_333u64;
    let mut add = 7u64;
    let mut nr2 = 0x1234_5671u64;

    for &b in password {
        if b == b' ' || b == b'\t' {
            continue;
        }
        let c = b as u64;
        nr ^= ((nr & 63).wrapping_add(add))
            .wrapping_mul(c)
            .wrapping_add(nr << 8);
        nr2 = nr2.wrapping_add((nr2 << 8) ^ nr);
        add = add.wrapping_add(c);
    }

    ((nr & 0x7FFF_FFFF) as u32, (nr2 & 0x7FFF_FFFF) as u32)
}

/// The multiplicative congruential generator that drives the legacy
/// scramble. Both sides seed it identically and draw the same sequence.
struct Rand323 {
    seed1: u64,
    seed2: u64,
    max_value: u64,
}

impl Rand323 {
    fn init(seed1: u32, seed2: u32) -> Rand323 {
        let max_value = 0x3FFF_FFFFu64;
        Rand323 {
            seed1: seed1 as u64 % max_value,
            seed2: seed2 as u64 % max_value,
            max_value,
        }
    }

    fn next(&mut self) -> f64 {
        self.seed1 = (self.seed1 * 3 + self.seed2) % self.max_value;
        self.seed2 = (self.seed1 + self.seed2 + 33) % self.max_value;
        self.seed1 as f64 / self.max_value as f64
    }
}

/// Legacy scramble spoken by pre-4.1 servers. One output byte per seed
/// byte, each in the printable range, with a final whitening byte XORed
/// over the whole thing. An empty password yields an empty reply.
pub fn scramble_323(seed: &[u8], password: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let hp = hash_password(password);
    let hs = hash_password(seed);
    let mut rand = Rand323::init(hp.0 ^ hs.0, hp.1 ^ hs.1);

    let mut out: Vec<u8> = seed
        .iter()
        .map(|_| (rand.next() * 31.0) as u8 + 64)
        .collect();
    let extra = (rand.next() * 31.0) as u8;
    for b in out.iter_mut() {
        *b ^= extra;
    }
    out
}

/// Hybrid scramble spoken only by 4.1.0 servers: the two hash words are
/// rendered as sixteen hex digits, the first eight digits are run through
/// SHA1, XORed against the seed, and the result is fed back through the
/// legacy scramble.
pub fn scramble_410(seed: &[u8], password: &[u8]) -> Option<Vec<u8>> {
    if password.is_empty() {
        return None;
    }

    let (h0, h1) = hash_password(password);
    let binpass = format!("{:08x}{:08x}", h0, h1).into_bytes();
    let digest = Sha1::digest(&binpass[..8]);

    let mixed: Vec<u8> = seed
        .iter()
        .enumerate()
        .map(|(i, &s)| digest[i % digest.len()] ^ s)
        .collect();

    Some(scramble_323(&mixed, password))
}

/// Native SHA1 scramble used since 4.1.1:
/// `SHA1(password) XOR SHA1(seed + SHA1(SHA1(password)))`.
pub fn scramble_native(seed: &[u8], password: &[u8]) -> Option<[u8; 20]> {
    if password.is_empty() {
        return None;
    }

    fn sha1_1(bytes: &[u8]) -> [u8; 20] {
        Sha1::digest(bytes).into()
    }

    fn sha1_2(bytes1: &[u8], bytes2: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(bytes1);
        hasher.update(bytes2);
        hasher.finalize().into()
    }

    fn xor<T, U>(mut left: T, right: U) -> T
    where
        T: AsMut<[u8]>,
        U: AsRef<[u8]>,
    {
        left.as_mut()
            .iter_mut()
            .zip(right.as_ref().iter())
            .for_each(|(l, r)| *l ^= r);
        left
    }

    Some(xor(
        sha1_1(password),
        sha1_2(seed, &sha1_1(&sha1_1(password))),
    ))
}

#[cfg(test)]
mod test {
    use super::{hash_password, scramble_323, scramble_410, scramble_native};

    #[test]
    fn should_hash_password_into_two_words() {
        assert_eq!(hash_password(b"secret"), (1116039156, 144262148));
    }

    #[test]
    fn should_compute_scramble_323() {
        assert_eq!(
            scramble_323(b"abcdefgh", b"secret"),
            vec![0x54, 0x4c, 0x54, 0x56, 0x51, 0x4f, 0x54, 0x5d],
        );
        assert_eq!(
            scramble_323(b"01234567890123456789", b"pass word"),
            vec![
                0x44, 0x53, 0x56, 0x59, 0x46, 0x50, 0x5a, 0x5b, 0x4d, 0x52, 0x52, 0x50, 0x45,
                0x58, 0x46, 0x5e, 0x43, 0x45, 0x57, 0x5d,
            ],
        );
        assert!(scramble_323(b"abcdefgh", b"").is_empty());
    }

    #[test]
    fn should_compute_scramble_410() {
        assert_eq!(
            scramble_410(b"abcdefgh", b"secret"),
            Some(vec![0x4a, 0x40, 0x54, 0x54, 0x56, 0x44, 0x42, 0x52]),
        );
        assert_eq!(
            scramble_410(b"01234567890123456789", b"secret"),
            Some(vec![
                0x52, 0x58, 0x51, 0x53, 0x59, 0x54, 0x59, 0x45, 0x4d, 0x54, 0x40, 0x47, 0x50,
                0x4d, 0x53, 0x4e, 0x45, 0x5d, 0x45, 0x47,
            ]),
        );
        assert_eq!(scramble_410(b"abcdefgh", b""), None);
    }

    #[test]
    fn should_compute_scramble_native() {
        let scr = [
            0x4e, 0x52, 0x33, 0x48, 0x50, 0x3a, 0x71, 0x49, 0x59, 0x61, 0x5f, 0x39, 0x3d, 0x64,
            0x62, 0x3f, 0x53, 0x64, 0x7b, 0x60,
        ];
        let password = [0x47, 0x21, 0x69, 0x64, 0x65, 0x72, 0x32, 0x37];
        let output1 = scramble_native(&scr, &password);
        let output2: [u8; 20] = [
            0x09, 0xcf, 0xf8, 0x85, 0x5e, 0x9e, 0x70, 0x53, 0x40, 0xff, 0x22, 0x70, 0xd8, 0xfb,
            0x9f, 0xad, 0xba, 0x90, 0x6b, 0x70,
        ];
        assert_eq!(output1, Some(output2));

        assert_eq!(
            scramble_native(b"01234567890123456789", b"secret"),
            Some([
                0x7a, 0xbe, 0x1a, 0x87, 0x76, 0xb5, 0x9e, 0x93, 0x10, 0x59, 0x45, 0x1f, 0x81,
                0xe5, 0x96, 0xa6, 0x0d, 0xbb, 0xf7, 0xa8,
            ]),
        );
        assert_eq!(scramble_native(b"01234567890123456789", b""), None);
    }
}
