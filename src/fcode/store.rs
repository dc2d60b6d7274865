//! Pod 归档存储
//!
//! `FStore` 是 pod 读取的唯一 I/O 边界；读取是阻塞的、无副作用的，可重复调用。

use indexmap::IndexMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use super::errors::{FcodeError, FcodeResult};

/// 归档条目来源
pub trait FStore: Send + Sync {
    /// 读取条目，不存在时返回 `None`
    fn read(
        &self,
        name: &str,
    ) -> FcodeResult<Option<Vec<u8>>>;

    /// 全部条目名
    fn names(&self) -> Vec<String>;

    /// 读取必需条目
    fn read_required(
        &self,
        name: &str,
    ) -> FcodeResult<Vec<u8>> {
        self.read(name)?
            .ok_or_else(|| FcodeError::MissingEntry(name.to_string()))
    }
}

/// 内存存储
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    entries: IndexMap<String, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        data: Vec<u8>,
    ) {
        self.entries.insert(name.into(), data);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 打包为 zip（deflate 压缩）
    pub fn to_zip(&self) -> FcodeResult<Vec<u8>> {
        write_zip(self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice())))
    }
}

impl FStore for MemStore {
    fn read(
        &self,
        name: &str,
    ) -> FcodeResult<Option<Vec<u8>>> {
        Ok(self.entries.get(name).cloned())
    }

    fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

// ============================================================================
// Zip
// ============================================================================

const SIG_LOCAL: u32 = 0x0403_4B50;
const SIG_CENTRAL: u32 = 0x0201_4B50;
const SIG_END: u32 = 0x0605_4B50;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

#[derive(Debug, Clone, Copy)]
struct ZipEntry {
    method: u16,
    compressed_size: usize,
    size: usize,
    local_offset: usize,
}

/// Zip 归档存储（只支持 stored / deflate）
#[derive(Debug, Clone)]
pub struct ZipStore {
    data: Vec<u8>,
    entries: IndexMap<String, ZipEntry>,
}

fn le16(
    data: &[u8],
    at: usize,
) -> FcodeResult<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(FcodeError::Truncated { what: "zip", at })
}

fn le32(
    data: &[u8],
    at: usize,
) -> FcodeResult<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(FcodeError::Truncated { what: "zip", at })
}

impl ZipStore {
    /// 打开磁盘上的 pod 文件
    pub fn open(path: &Path) -> FcodeResult<Self> {
        let data = fs::read(path)?;
        Self::from_bytes(data)
    }

    /// 从内存字节解析中央目录
    pub fn from_bytes(data: Vec<u8>) -> FcodeResult<Self> {
        let end = Self::find_end(&data)?;
        let count = le16(&data, end + 10)? as usize;
        let mut at = le32(&data, end + 16)? as usize;

        let mut entries = IndexMap::with_capacity(count);
        for _ in 0..count {
            if le32(&data, at)? != SIG_CENTRAL {
                return Err(FcodeError::Zip(format!("bad central header at {}", at)));
            }
            let method = le16(&data, at + 10)?;
            let compressed_size = le32(&data, at + 20)? as usize;
            let size = le32(&data, at + 24)? as usize;
            let name_len = le16(&data, at + 28)? as usize;
            let extra_len = le16(&data, at + 30)? as usize;
            let comment_len = le16(&data, at + 32)? as usize;
            let local_offset = le32(&data, at + 42)? as usize;
            let name_bytes = data
                .get(at + 46..at + 46 + name_len)
                .ok_or(FcodeError::Truncated { what: "zip", at })?;
            let name = String::from_utf8_lossy(name_bytes).into_owned();
            entries.insert(
                name,
                ZipEntry {
                    method,
                    compressed_size,
                    size,
                    local_offset,
                },
            );
            at += 46 + name_len + extra_len + comment_len;
        }

        Ok(Self { data, entries })
    }

    fn find_end(data: &[u8]) -> FcodeResult<usize> {
        if data.len() < 22 {
            return Err(FcodeError::Zip("archive too small".to_string()));
        }
        let mut at = data.len() - 22;
        loop {
            if le32(data, at)? == SIG_END {
                return Ok(at);
            }
            if at == 0 {
                return Err(FcodeError::Zip("end of central directory not found".to_string()));
            }
            at -= 1;
        }
    }

    fn extract(
        &self,
        name: &str,
        entry: &ZipEntry,
    ) -> FcodeResult<Vec<u8>> {
        let at = entry.local_offset;
        if le32(&self.data, at)? != SIG_LOCAL {
            return Err(FcodeError::Zip(format!("bad local header for {}", name)));
        }
        let name_len = le16(&self.data, at + 26)? as usize;
        let extra_len = le16(&self.data, at + 28)? as usize;
        let start = at + 30 + name_len + extra_len;
        let raw = self
            .data
            .get(start..start + entry.compressed_size)
            .ok_or(FcodeError::Truncated { what: "zip", at: start })?;

        match entry.method {
            METHOD_STORED => Ok(raw.to_vec()),
            METHOD_DEFLATED => {
                let mut out = Vec::with_capacity(entry.size);
                flate2::read::DeflateDecoder::new(raw).read_to_end(&mut out)?;
                if out.len() != entry.size {
                    return Err(FcodeError::Zip(format!(
                        "{}: inflated {} bytes, expected {}",
                        name,
                        out.len(),
                        entry.size
                    )));
                }
                Ok(out)
            }
            other => Err(FcodeError::Zip(format!(
                "{}: unsupported compression method {}",
                name, other
            ))),
        }
    }
}

impl FStore for ZipStore {
    fn read(
        &self,
        name: &str,
    ) -> FcodeResult<Option<Vec<u8>>> {
        match self.entries.get(name) {
            Some(entry) => self.extract(name, entry).map(Some),
            None => Ok(None),
        }
    }

    fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// 写出一个 deflate 压缩的 zip 归档
pub fn write_zip<'a>(entries: impl Iterator<Item = (&'a str, &'a [u8])>) -> FcodeResult<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();
    let mut central: Vec<u8> = Vec::new();
    let mut count: u16 = 0;

    for (name, data) in entries {
        let mut crc = flate2::Crc::new();
        crc.update(data);
        let mut enc = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data)?;
        let packed = enc.finish()?;
        let offset = out.len() as u32;

        // local header
        out.extend_from_slice(&SIG_LOCAL.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&METHOD_DEFLATED.to_le_bytes());
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(&crc.sum().to_le_bytes());
        out.extend_from_slice(&(packed.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&packed);

        // central header
        central.extend_from_slice(&SIG_CENTRAL.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&METHOD_DEFLATED.to_le_bytes());
        central.extend_from_slice(&[0, 0, 0, 0]);
        central.extend_from_slice(&crc.sum().to_le_bytes());
        central.extend_from_slice(&(packed.len() as u32).to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&[0; 12]);
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
        count += 1;
    }

    let central_offset = out.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(&SIG_END.to_le_bytes());
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&central_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    Ok(out)
}
