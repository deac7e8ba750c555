use std::collections::BTreeMap;

use casket_types::{BlockId, BlockType, BlockUri, HashKind};

use crate::error::{BlockError, BlockResult};

/// Key-value sidecar block, optionally pointing at a target block.
///
/// The canonical body is headerless text: the first line is the hex target
/// id (possibly empty), each following line is `key=value` with keys unique
/// and sorted. `=` must not appear in keys.
#[derive(Debug, Clone)]
pub struct MetaBlock {
    target: Option<BlockId>,
    metadata: BTreeMap<String, String>,
    uri: Option<BlockUri>,
    hash: HashKind,
}

impl MetaBlock {
    pub fn new(hash: HashKind) -> Self {
        Self {
            target: None,
            metadata: BTreeMap::new(),
            uri: None,
            hash,
        }
    }

    /// Point this block at a target block.
    pub fn set_target_id(&mut self, id: BlockId) {
        self.target = Some(id);
    }

    pub fn target_id(&self) -> Option<BlockId> {
        self.target
    }

    /// Merge key-value pairs into the metadata. Keys must not contain `=`.
    pub fn set_metadata<I, K, V>(&mut self, entries: I) -> BlockResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in entries {
            let key = k.into();
            if key.contains('=') || key.contains('\n') {
                return Err(BlockError::InvalidBlock);
            }
            self.metadata.insert(key, v.into());
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn uri(&self) -> Option<&BlockUri> {
        self.uri.as_ref()
    }

    pub fn hash_kind(&self) -> HashKind {
        self.hash
    }

    pub fn size(&self) -> u64 {
        self.encode_body().len() as u64
    }

    /// Content id: `H(type ‖ body)`. The body itself carries no type tag;
    /// the index entry's tag identifies meta blocks in storage.
    pub fn id(&self) -> BlockId {
        self.hash.block_id(BlockType::Meta, &self.encode_body())
    }

    /// Canonical body: `hex(target)\nkey=value\n…`, keys ascending.
    pub fn encode_body(&self) -> Vec<u8> {
        let mut lines = Vec::with_capacity(1 + self.metadata.len());
        lines.push(match self.target {
            Some(id) => id.to_hex(),
            None => String::new(),
        });
        for (k, v) in &self.metadata {
            lines.push(format!("{k}={v}"));
        }
        lines.join("\n").into_bytes()
    }

    /// Decode a canonical body. An empty first line means no target.
    pub fn decode_body(hash: HashKind, body: &[u8]) -> BlockResult<Self> {
        let text = std::str::from_utf8(body).map_err(|_| BlockError::InvalidBlock)?;
        let mut lines = text.split('\n');

        let mut meta = Self::new(hash);
        if let Some(first) = lines.next() {
            if !first.is_empty() {
                meta.target = Some(BlockId::from_hex(first)?);
            }
        }
        for line in lines {
            let (k, v) = line.split_once('=').ok_or(BlockError::InvalidBlock)?;
            meta.metadata.insert(k.to_string(), v.to_string());
        }
        Ok(meta)
    }
}
