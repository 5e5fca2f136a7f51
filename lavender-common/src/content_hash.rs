use std::{fmt, io::Read, str::FromStr};

use ::md5::{Digest, Md5 as Md5Hasher};

use crate::error::{CommonError, CommonResult};

/// 16 byte md5 digest identifying the content of a published resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Md5([u8; 16]);

impl Md5 {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Md5(bytes)
    }

    pub fn digest(data: &[u8]) -> Self {
        Md5(Md5Hasher::digest(data).into())
    }

    /// Hashes everything `reader` yields.
    pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = Md5Hasher::new();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(Md5(hasher.finalize().into()))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> CommonResult<Self> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| CommonError::InvalidMd5(s.to_string()))?;
        Ok(Md5(bytes))
    }

    /// The top four bytes read big-endian as a signed integer. This is the key
    /// space of the consistent hash ring.
    pub fn ring_key(&self) -> i32 {
        i32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl FromStr for Md5 {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Md5::from_hex(s)
    }
}

impl fmt::Display for Md5 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Md5 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Md5({})", self.to_hex())
    }
}
