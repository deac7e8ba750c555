use std::collections::BTreeMap;

use casket_types::{BlockId, BlockType, BlockUri, HashKind};

use crate::error::{BlockError, BlockResult};

/// Directory flag bit carried in a tree entry's mode.
pub const MODE_DIR: u32 = 1 << 31;

/// Permission bits applied to new file and directory entries.
const MODE_PERM: u32 = 0o777;

/// A single named entry in a tree block, pointing at another block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Entry name. May contain spaces, never a newline.
    pub name: String,
    /// Content id of the referenced block.
    pub address: BlockId,
    /// Kind of the referenced block.
    pub node_type: BlockType,
    /// File-mode bits, including the directory flag.
    pub mode: u32,
}

impl TreeNode {
    /// Entry for a file, pointing at its index block.
    pub fn file(name: impl Into<String>, address: BlockId) -> Self {
        Self {
            name: name.into(),
            address,
            node_type: BlockType::Index,
            mode: MODE_PERM,
        }
    }

    /// Entry for a directory, pointing at its tree block.
    pub fn dir(name: impl Into<String>, address: BlockId) -> Self {
        Self {
            name: name.into(),
            address,
            node_type: BlockType::Tree,
            mode: MODE_DIR | MODE_PERM,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & MODE_DIR != 0
    }

    /// One line of the tree body: `mode SP type SP hex(address) SP name`.
    pub fn encode_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.mode,
            self.node_type,
            self.address.to_hex(),
            self.name
        )
    }

    /// Parse one line of a tree body. The name is everything after the
    /// third space, so names may themselves contain spaces.
    pub fn decode_line(line: &str) -> BlockResult<Self> {
        let mut parts = line.splitn(4, ' ');
        let (mode, typ, addr, name) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(m), Some(t), Some(a), Some(n)) => (m, t, a, n),
            _ => return Err(BlockError::InvalidBlock),
        };

        let mode: u32 = mode.parse().map_err(|_| BlockError::InvalidBlock)?;
        let node_type = BlockType::from_name(typ)?;
        let address = BlockId::from_hex(addr)?;

        Ok(Self {
            name: name.to_string(),
            address,
            node_type,
            mode,
        })
    }
}

/// Block containing named references to other blocks, like a directory.
///
/// Entries are kept sorted by name so the encoding, and therefore the id,
/// is canonical.
#[derive(Debug, Clone)]
pub struct TreeBlock {
    nodes: BTreeMap<String, TreeNode>,
    uri: Option<BlockUri>,
    hash: HashKind,
}

impl TreeBlock {
    pub fn new(hash: HashKind) -> Self {
        Self {
            nodes: BTreeMap::new(),
            uri: None,
            hash,
        }
    }

    /// Add entries, overwriting any existing entry with the same name.
    pub fn add_nodes<I>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = TreeNode>,
    {
        for node in nodes {
            self.nodes.insert(node.name.clone(), node);
        }
    }

    pub fn get_by_name(&self, name: &str) -> Option<&TreeNode> {
        self.nodes.get(name)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Walk entries in lexicographic name order; the callback's first
    /// error short-circuits.
    pub fn iter<F>(&self, mut f: F) -> BlockResult<()>
    where
        F: FnMut(&TreeNode) -> BlockResult<()>,
    {
        for node in self.nodes.values() {
            f(node)?;
        }
        Ok(())
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

    /// Content id over the canonical encoding: `H(type ‖ body)`.
    pub fn id(&self) -> BlockId {
        self.hash.block_id(BlockType::Tree, &self.encode_body())
    }

    /// Canonical body: entry lines joined by `\n`, sorted by name. An
    /// empty tree encodes to an empty body.
    pub fn encode_body(&self) -> Vec<u8> {
        let lines: Vec<String> = self.nodes.values().map(TreeNode::encode_line).collect();
        lines.join("\n").into_bytes()
    }

    /// Decode a canonical body.
    pub fn decode_body(hash: HashKind, body: &[u8]) -> BlockResult<Self> {
        let mut tree = Self::new(hash);
        if body.is_empty() {
            return Ok(tree);
        }
        let text = std::str::from_utf8(body).map_err(|_| BlockError::InvalidBlock)?;
        for line in text.split('\n') {
            let node = TreeNode::decode_line(line)?;
            tree.nodes.insert(node.name.clone(), node);
        }
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &[u8]) -> BlockId {
        HashKind::Sha256.block_id(BlockType::Data, s)
    }

    #[test]
    fn iter_yields_name_order() {
        let mut tree = TreeBlock::new(HashKind::Sha256);
        tree.add_nodes([
            TreeNode::file("zeta", addr(b"z")),
            TreeNode::dir("alpha", addr(b"a")),
            TreeNode::file("midway point", addr(b"m")),
            TreeNode::dir("beta", addr(b"b")),
        ]);

        let mut names = Vec::new();
        tree.iter(|n| {
            names.push(n.name.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(names, vec!["alpha", "beta", "midway point", "zeta"]);
    }

    #[test]
    fn encode_decode_is_identity() {
        let shared = addr(b"foo");
        let mut tree = TreeBlock::new(HashKind::Sha256);
        tree.add_nodes([
            TreeNode::dir("dir-one", shared),
            TreeNode::dir("dir-two", shared),
            TreeNode::file("file-one", shared),
            TreeNode::file("file-two", shared),
        ]);

        let body = tree.encode_body();
        let decoded = TreeBlock::decode_body(HashKind::Sha256, &body).unwrap();
        assert_eq!(decoded.node_count(), 4);
        assert_eq!(decoded.encode_body(), body);
        assert_eq!(decoded.id(), tree.id());
    }

    #[test]
    fn names_with_spaces_survive() {
        let mut tree = TreeBlock::new(HashKind::Sha256);
        tree.add_nodes([TreeNode::file("a name with spaces.txt", addr(b"x"))]);

        let decoded = TreeBlock::decode_body(HashKind::Sha256, &tree.encode_body()).unwrap();
        let node = decoded.get_by_name("a name with spaces.txt").unwrap();
        assert_eq!(node.address, addr(b"x"));
    }

    #[test]
    fn add_overwrites_by_name() {
        let mut tree = TreeBlock::new(HashKind::Sha256);
        tree.add_nodes([TreeNode::file("dup", addr(b"old"))]);
        tree.add_nodes([TreeNode::file("dup", addr(b"new"))]);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.get_by_name("dup").unwrap().address, addr(b"new"));
    }

    #[test]
    fn dir_flag_is_encoded_in_mode() {
        let dir = TreeNode::dir("d", addr(b"d"));
        let file = TreeNode::file("f", addr(b"f"));
        assert!(dir.is_dir());
        assert!(!file.is_dir());

        let line = dir.encode_line();
        let parsed = TreeNode::decode_line(&line).unwrap();
        assert!(parsed.is_dir());
        assert_eq!(parsed.mode, dir.mode);
    }

    #[test]
    fn decode_rejects_malformed_line() {
        assert!(TreeNode::decode_line("no").is_err());
        assert!(TreeNode::decode_line("x index abcd name").is_err()); // bad mode
        assert!(TreeNode::decode_line("511 bogus abcd name").is_err()); // bad type
        assert!(TreeNode::decode_line("511 index zz name").is_err()); // bad hex
    }

    #[test]
    fn empty_tree_encodes_empty_body() {
        let tree = TreeBlock::new(HashKind::Sha256);
        assert!(tree.encode_body().is_empty());
        assert_eq!(tree.size(), 0);
        let decoded = TreeBlock::decode_body(HashKind::Sha256, &[]).unwrap();
        assert_eq!(decoded.node_count(), 0);
        assert_eq!(decoded.id(), tree.id());
    }

    #[test]
    fn mutation_changes_id() {
        let mut tree = TreeBlock::new(HashKind::Sha256);
        let before = tree.id();
        tree.add_nodes([TreeNode::file("f", addr(b"f"))]);
        assert_ne!(tree.id(), before);
    }
}
