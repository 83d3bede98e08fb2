//! Binary index file format.
//!
//! Little-endian throughout:
//!
//! ```text
//! magic    8 bytes  "FXRAGIDX"
//! version  u32
//! model    u32 len, len bytes UTF-8 (embedding model name)
//! mode     u8       0 = exact, 1 = clustered
//! dims     u32
//! count    u64
//! [clustered only]
//!   nprobe    u32
//!   clusters  u32
//!   centroids clusters * dims * f32
//!   lists     clusters * (u64 len, len * u64 position)
//! vectors  count * dims * f32
//! sha256   32 bytes over everything above
//! ```
//!
//! Written through a temp file and rename, so a reader sees either the old
//! file or the new one. Any structural problem on read is
//! [`IndexError::Corrupt`].

use sha2::{Digest, Sha256};
use std::path::Path;

use super::{Clusters, VectorIndex};
use crate::error::IndexError;
use crate::persist::write_atomic;

const MAGIC: &[u8; 8] = b"FXRAGIDX";
const VERSION: u32 = 2;
/// Model names longer than this are treated as corruption.
const MAX_MODEL_NAME: usize = 1024;
const CHECKSUM_LEN: usize = 32;

pub fn save(index: &VectorIndex, path: &Path) -> Result<(), IndexError> {
    write_atomic(path, &encode(index))?;
    Ok(())
}

pub fn load(path: &Path) -> Result<VectorIndex, IndexError> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}

pub fn encode(index: &VectorIndex) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + index.vectors.len() * index.dims * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(index.model.len() as u32).to_le_bytes());
    out.extend_from_slice(index.model.as_bytes());
    out.push(u8::from(index.clusters.is_some()));
    out.extend_from_slice(&(index.dims as u32).to_le_bytes());
    out.extend_from_slice(&(index.vectors.len() as u64).to_le_bytes());

    if let Some(c) = &index.clusters {
        out.extend_from_slice(&(c.nprobe as u32).to_le_bytes());
        out.extend_from_slice(&(c.centroids.len() as u32).to_le_bytes());
        for centroid in &c.centroids {
            write_floats(&mut out, centroid);
        }
        for list in &c.lists {
            out.extend_from_slice(&(list.len() as u64).to_le_bytes());
            for &position in list {
                out.extend_from_slice(&(position as u64).to_le_bytes());
            }
        }
    }
    for v in &index.vectors {
        write_floats(&mut out, v);
    }

    let digest = Sha256::digest(&out);
    out.extend_from_slice(&digest);
    out
}

pub fn decode(bytes: &[u8]) -> Result<VectorIndex, IndexError> {
    if bytes.len() < MAGIC.len() + CHECKSUM_LEN {
        return Err(corrupt("file too short"));
    }
    let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if Sha256::digest(body).as_slice() != checksum {
        return Err(corrupt("checksum mismatch"));
    }

    let mut r = Reader { buf: body, pos: 0 };
    if r.take(MAGIC.len())? != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let version = r.u32()?;
    if version != VERSION {
        return Err(corrupt(&format!("unsupported version {}", version)));
    }
    let model_len = r.u32()? as usize;
    if model_len > MAX_MODEL_NAME {
        return Err(corrupt("model name too long"));
    }
    let model = std::str::from_utf8(r.take(model_len)?)
        .map_err(|_| corrupt("model name is not UTF-8"))?
        .to_string();
    let mode = r.u8()?;
    let dims = r.u32()? as usize;
    let count = r.u64()? as usize;
    if dims == 0 {
        return Err(corrupt("zero dimension"));
    }

    let clusters = match mode {
        0 => None,
        1 => {
            let nprobe = r.u32()? as usize;
            let k = r.u32()? as usize;
            if k == 0 {
                return Err(corrupt("clustered index without centroids"));
            }
            let centroids = (0..k).map(|_| r.floats(dims)).collect::<Result<Vec<_>, _>>()?;
            let mut lists = Vec::with_capacity(k);
            let mut listed = 0usize;
            for _ in 0..k {
                let len = r.u64()? as usize;
                let mut list = Vec::with_capacity(len.min(count));
                for _ in 0..len {
                    let position = r.u64()? as usize;
                    if position >= count {
                        return Err(corrupt("list position out of range"));
                    }
                    list.push(position);
                }
                listed += len;
                lists.push(list);
            }
            if listed != count {
                return Err(corrupt("inverted lists do not cover every vector"));
            }
            Some(Clusters {
                centroids,
                lists,
                nprobe: nprobe.max(1),
            })
        }
        other => return Err(corrupt(&format!("unknown mode {}", other))),
    };

    let vectors = (0..count).map(|_| r.floats(dims)).collect::<Result<Vec<_>, _>>()?;
    if r.pos != body.len() {
        return Err(corrupt("trailing bytes"));
    }

    Ok(VectorIndex {
        dims,
        model,
        vectors,
        clusters,
        trained: true,
    })
}

fn corrupt(msg: &str) -> IndexError {
    IndexError::Corrupt(msg.to_string())
}

fn write_floats(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], IndexError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| corrupt("unexpected end of file"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, IndexError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, IndexError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, IndexError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    fn floats(&mut self, n: usize) -> Result<Vec<f32>, IndexError> {
        let len = n
            .checked_mul(4)
            .ok_or_else(|| corrupt("dimension overflow"))?;
        Ok(self
            .take(len)?
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::index::IndexBuilder;
    use tempfile::TempDir;

    fn clustered_index() -> VectorIndex {
        let mut index = unnamed_clustered_index();
        index.set_model("bge-small-en-v1.5");
        index
    }

    fn unnamed_clustered_index() -> VectorIndex {
        let vectors: Vec<Vec<f32>> = (0..10)
            .map(|i| {
                let t = i as f32 * 0.6;
                vec![t.cos(), t.sin()]
            })
            .collect();
        IndexBuilder::new(
            IndexConfig {
                clustered_threshold: 1,
                max_clusters: 3,
                ..IndexConfig::default()
            },
            4,
            1,
        )
        .build_from_embeddings(vectors)
        .unwrap()
    }

    #[test]
    fn saved_index_searches_identically() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("indexes/vectors.idx");
        let index = clustered_index();
        save(&index, &path).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(
            loaded.search(&[0.0, 1.0], 4).unwrap(),
            index.search(&[0.0, 1.0], 4).unwrap()
        );
    }

    #[test]
    fn model_name_survives_a_roundtrip() {
        let loaded = decode(&encode(&clustered_index())).unwrap();
        assert_eq!(loaded.model(), "bge-small-en-v1.5");
        assert_eq!(decode(&encode(&unnamed_clustered_index())).unwrap().model(), "");
    }

    #[test]
    fn older_format_version_is_rejected() {
        let mut body = encode(&clustered_index());
        body.truncate(body.len() - CHECKSUM_LEN);
        body[8..12].copy_from_slice(&1u32.to_le_bytes());
        let digest = Sha256::digest(&body);
        body.extend_from_slice(&digest);
        assert!(matches!(decode(&body), Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn flipped_byte_is_detected() {
        let mut bytes = encode(&clustered_index());
        bytes[20] ^= 0xff;
        assert!(matches!(decode(&bytes), Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let bytes = encode(&clustered_index());
        assert!(matches!(decode(&bytes[..10]), Err(IndexError::Corrupt(_))));
        assert!(matches!(decode(&bytes[..bytes.len() - 1]), Err(IndexError::Corrupt(_))));
    }
}
