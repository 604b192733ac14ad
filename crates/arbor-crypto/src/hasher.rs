use arbor_types::ContentHash;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"arbor-node-v1"`) that is
/// prepended to every hash computation. A node record and a version record
/// with identical bytes therefore produce different hashes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for node records.
    pub const NODE: Self = Self {
        domain: "arbor-node-v1",
    };
    /// Hasher for trie nodes of a tree's node index.
    pub const TRIE: Self = Self {
        domain: "arbor-trie-v1",
    };
    /// Hasher for tree records.
    pub const TREE: Self = Self {
        domain: "arbor-tree-v1",
    };
    /// Hasher for version records.
    pub const VERSION: Self = Self {
        domain: "arbor-version-v1",
    };
    /// Hasher for out-of-line operation lists.
    pub const OPERATIONS: Self = Self {
        domain: "arbor-ops-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ContentHash::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected hash.
    pub fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(ContentHasher::NODE.hash(data), ContentHasher::NODE.hash(data));
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        let node = ContentHasher::NODE.hash(data);
        let tree = ContentHasher::TREE.hash(data);
        let version = ContentHasher::VERSION.hash(data);
        assert_ne!(node, tree);
        assert_ne!(node, version);
        assert_ne!(tree, version);
    }

    #[test]
    fn verify_correct_and_tampered_data() {
        let id = ContentHasher::VERSION.hash(b"original");
        assert!(ContentHasher::VERSION.verify(b"original", &id));
        assert!(!ContentHasher::VERSION.verify(b"tampered", &id));
    }

    #[test]
    fn domain_separated_differs_from_plain_hash() {
        assert_ne!(
            ContentHasher::NODE.hash(b"data"),
            ContentHash::from_bytes(b"data")
        );
    }

    #[test]
    fn custom_domain() {
        let hasher = ContentHasher::new("my-custom-domain-v1");
        assert_eq!(hasher.domain(), "my-custom-domain-v1");
        assert_ne!(hasher.hash(b"data"), ContentHasher::NODE.hash(b"data"));
    }
}
