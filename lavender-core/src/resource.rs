use std::{
    fs::File,
    io::{BufReader, Read},
    path::PathBuf,
};

use bytes::Bytes;
use lavender_common::Md5;

use crate::error::{CoreError, CoreResult};

/// Where the bytes of a [`Resource`] come from.
#[derive(Debug, Clone)]
pub enum ResourceData {
    File(PathBuf),
    Bytes(Bytes),
}

impl ResourceData {
    pub fn open(&self) -> CoreResult<Box<dyn Read + '_>> {
        match self {
            ResourceData::File(path) => {
                let file = File::open(path).map_err(CoreError::io(path))?;
                Ok(Box::new(BufReader::new(file)))
            }
            ResourceData::Bytes(bytes) => Ok(Box::new(&bytes[..])),
        }
    }

    pub fn md5(&self) -> CoreResult<Md5> {
        match self {
            ResourceData::Bytes(bytes) => Ok(Md5::digest(bytes)),
            ResourceData::File(path) => {
                Md5::digest_reader(self.open()?).map_err(CoreError::io(path))
            }
        }
    }
}

/// One publishable file as seen by a module.
///
/// `path` is relative to the module root and uses `/` separators.
/// `content_id` changes whenever the content may have changed; it is cheap to
/// obtain, unlike the md5.
#[derive(Debug, Clone)]
pub struct Resource {
    pub path: String,
    pub content_id: String,
    pub size: Option<u64>,
    pub data: ResourceData,
}
