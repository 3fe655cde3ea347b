//! The governed identity document.
//!
//! A document is a threshold, a set of named device keys, and a free-form
//! string storage map. Committed documents are never edited in place: the
//! next candidate is always built from [`Document::clone_for_edit`].

use crate::core::{Hash256, Result};
use crate::identity::crypto::sha3_256;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Separator between segments of a storage key (`ssh:<device>:<host>`).
pub const KEY_SEPARATOR: &str = ":";

/// Storage prefix for SSH public keys.
pub const SSH_PREFIX: &str = "ssh";

/// Ed25519 public key of a device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DevicePublicKey([u8; 32]);

impl DevicePublicKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

impl std::fmt::Display for DevicePublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl std::fmt::Debug for DevicePublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DevicePublicKey({})", self.to_base64())
    }
}

/// Identity document.
///
/// Equality and hashing cover `threshold`, `devices` and `storage`. The
/// `parent` link records which committed document this one was derived from
/// and is not part of the content.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    /// Minimum accept votes needed to replace this document
    pub threshold: u32,
    /// Registered devices by name
    pub devices: BTreeMap<String, DevicePublicKey>,
    /// Arbitrary key/value data
    pub storage: BTreeMap<String, String>,
    /// Content hash of the document this one was derived from
    pub parent: Option<Hash256>,
}

impl Document {
    /// First document of an identity: one device, empty storage.
    pub fn genesis(threshold: u32, device_name: &str, key: DevicePublicKey) -> Self {
        let mut devices = BTreeMap::new();
        devices.insert(device_name.to_string(), key);
        Self {
            threshold,
            devices,
            storage: BTreeMap::new(),
            parent: None,
        }
    }

    /// Deep copy used as the base of the next candidate, linked to `self`.
    pub fn clone_for_edit(&self) -> Self {
        Self {
            threshold: self.threshold,
            devices: self.devices.clone(),
            storage: self.storage.clone(),
            parent: Some(self.hash()),
        }
    }

    /// Canonical encoding of the content. Maps are ordered, so two documents
    /// with the same content always encode to the same bytes.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&(
            self.threshold,
            &self.devices,
            &self.storage,
        ))?)
    }

    /// SHA3-256 over the canonical encoding.
    pub fn hash(&self) -> Hash256 {
        // bincode cannot fail on integers, strings and fixed arrays
        let bytes = self.canonical_bytes().unwrap_or_default();
        sha3_256(&bytes)
    }

    pub fn has_device(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    pub fn device_key(&self, name: &str) -> Option<&DevicePublicKey> {
        self.devices.get(name)
    }

    pub fn add_device(&mut self, name: &str, key: DevicePublicKey) {
        self.devices.insert(name.to_string(), key);
    }

    /// Remove a device together with every `ssh:<name>:*` entry it owns.
    /// Returns false if the device was not registered.
    pub fn revoke_device(&mut self, name: &str) -> bool {
        if self.devices.remove(name).is_none() {
            return false;
        }
        for host in self.suffix_column(&[SSH_PREFIX, name]) {
            self.storage.remove(&join_keys(&[SSH_PREFIX, name, &host]));
        }
        true
    }

    /// Value stored under the keys joined with `:`.
    pub fn value(&self, keys: &[&str]) -> Option<&str> {
        self.storage.get(&join_keys(keys)).map(String::as_str)
    }

    /// Sorted, unique segment that follows the given prefix in storage keys.
    ///
    /// With `ssh:laptop:example.org` stored, `suffix_column(&["ssh"])`
    /// yields `laptop` and `suffix_column(&["ssh", "laptop"])` yields
    /// `example.org`.
    pub fn suffix_column(&self, keys: &[&str]) -> Vec<String> {
        let mut start = join_keys(keys);
        if !start.is_empty() {
            start.push_str(KEY_SEPARATOR);
        }
        let column: BTreeSet<String> = self
            .storage
            .keys()
            .filter_map(|k| k.strip_prefix(start.as_str()))
            .filter_map(|rest| rest.split(KEY_SEPARATOR).next())
            .map(str::to_string)
            .collect();
        column.into_iter().collect()
    }

    /// Sorted, unique single segment between `prefix` and `suffix`.
    ///
    /// `intermediate_column("ssh", "example.org")` lists every device that
    /// holds a key for `example.org`.
    pub fn intermediate_column(&self, prefix: &str, suffix: &str) -> Vec<String> {
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}{}", prefix, KEY_SEPARATOR)
        };
        let suffix = if suffix.is_empty() {
            String::new()
        } else {
            format!("{}{}", KEY_SEPARATOR, suffix)
        };
        let column: BTreeSet<String> = self
            .storage
            .keys()
            .filter_map(|k| k.strip_prefix(prefix.as_str()))
            .filter_map(|rest| rest.strip_suffix(suffix.as_str()))
            .filter(|middle| !middle.contains(KEY_SEPARATOR))
            .map(str::to_string)
            .collect();
        column.into_iter().collect()
    }

    /// Changes that turn `self` into `other`.
    pub fn diff(&self, other: &Document) -> DocumentDiff {
        let mut diff = DocumentDiff::default();

        if self.threshold != other.threshold {
            diff.threshold = Some((self.threshold, other.threshold));
        }

        for (name, key) in &other.devices {
            match self.devices.get(name) {
                None => diff.added_devices.push(name.clone()),
                Some(old) if old != key => diff.rotated_devices.push(name.clone()),
                Some(_) => {}
            }
        }
        diff.removed_devices = self
            .devices
            .keys()
            .filter(|name| !other.devices.contains_key(*name))
            .cloned()
            .collect();

        for (key, value) in &other.storage {
            match self.storage.get(key) {
                None => diff.added_storage.push(key.clone()),
                Some(old) if old != value => diff.changed_storage.push(key.clone()),
                Some(_) => {}
            }
        }
        diff.removed_storage = self
            .storage
            .keys()
            .filter(|key| !other.storage.contains_key(*key))
            .cloned()
            .collect();

        diff
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.threshold == other.threshold
            && self.devices == other.devices
            && self.storage == other.storage
    }
}

impl Eq for Document {}

impl std::hash::Hash for Document {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.threshold.hash(state);
        self.devices.hash(state);
        self.storage.hash(state);
    }
}

/// Difference between two documents, keys in sorted order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDiff {
    /// `(old, new)` threshold if it changed
    pub threshold: Option<(u32, u32)>,
    pub added_devices: Vec<String>,
    pub removed_devices: Vec<String>,
    /// Devices whose public key changed
    pub rotated_devices: Vec<String>,
    pub added_storage: Vec<String>,
    pub removed_storage: Vec<String>,
    pub changed_storage: Vec<String>,
}

impl DocumentDiff {
    pub fn is_empty(&self) -> bool {
        self.threshold.is_none()
            && self.added_devices.is_empty()
            && self.removed_devices.is_empty()
            && self.rotated_devices.is_empty()
            && self.added_storage.is_empty()
            && self.removed_storage.is_empty()
            && self.changed_storage.is_empty()
    }
}

/// Join storage key segments with `:`.
pub fn join_keys(keys: &[&str]) -> String {
    keys.join(KEY_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::crypto::DeviceKeyPair;

    fn key() -> DevicePublicKey {
        DeviceKeyPair::generate().public_key()
    }

    fn ssh_document() -> Document {
        let mut doc = Document::genesis(2, "laptop", key());
        doc.add_device("phone", key());
        doc.storage
            .insert("ssh:laptop:example.org".into(), "ssh-ed25519 AAA".into());
        doc.storage
            .insert("ssh:laptop:build.local".into(), "ssh-ed25519 BBB".into());
        doc.storage
            .insert("ssh:phone:example.org".into(), "ssh-ed25519 CCC".into());
        doc.storage.insert("web".into(), "https://x".into());
        doc
    }

    #[test]
    fn test_genesis() {
        let k = key();
        let doc = Document::genesis(2, "one", k);
        assert_eq!(doc.threshold, 2);
        assert_eq!(doc.devices.len(), 1);
        assert_eq!(doc.device_key("one"), Some(&k));
        assert!(doc.storage.is_empty());
        assert!(doc.parent.is_none());
    }

    #[test]
    fn test_clone_for_edit_is_independent() {
        let base = Document::genesis(1, "one", key());
        let mut next = base.clone_for_edit();
        next.add_device("two", key());
        next.storage.insert("k".into(), "v".into());

        assert_eq!(base.devices.len(), 1);
        assert!(base.storage.is_empty());
        assert_eq!(next.parent, Some(base.hash()));
    }

    #[test]
    fn test_equality_ignores_parent() {
        let base = Document::genesis(1, "one", key());
        let copy = base.clone_for_edit();
        assert_eq!(base, copy);
        assert_eq!(base.hash(), copy.hash());
    }

    #[test]
    fn test_hash_covers_content() {
        let base = Document::genesis(1, "one", key());
        let mut raised = base.clone_for_edit();
        raised.threshold = 2;
        let mut stored = base.clone_for_edit();
        stored.storage.insert("k".into(), "v".into());

        assert_ne!(base.hash(), raised.hash());
        assert_ne!(base.hash(), stored.hash());
        assert_ne!(raised.hash(), stored.hash());
    }

    #[test]
    fn test_hash_insertion_order_independent() {
        let k1 = key();
        let k2 = key();
        let mut a = Document::genesis(1, "one", k1);
        a.add_device("two", k2);
        let mut b = Document::genesis(1, "two", k2);
        b.add_device("one", k1);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_value() {
        let doc = ssh_document();
        assert_eq!(
            doc.value(&["ssh", "laptop", "example.org"]),
            Some("ssh-ed25519 AAA")
        );
        assert_eq!(doc.value(&["web"]), Some("https://x"));
        assert_eq!(doc.value(&["ssh", "tablet", "example.org"]), None);
    }

    #[test]
    fn test_suffix_column() {
        let doc = ssh_document();
        assert_eq!(doc.suffix_column(&["ssh"]), vec!["laptop", "phone"]);
        assert_eq!(
            doc.suffix_column(&["ssh", "laptop"]),
            vec!["build.local", "example.org"]
        );
        assert_eq!(doc.suffix_column(&[]), vec!["ssh", "web"]);
    }

    #[test]
    fn test_intermediate_column() {
        let doc = ssh_document();
        assert_eq!(
            doc.intermediate_column("ssh", "example.org"),
            vec!["laptop", "phone"]
        );
        assert_eq!(doc.intermediate_column("ssh", "build.local"), vec!["laptop"]);
        assert!(doc.intermediate_column("ssh", "nowhere").is_empty());
    }

    #[test]
    fn test_revoke_device_drops_ssh_keys() {
        let mut doc = ssh_document();
        assert!(doc.revoke_device("laptop"));
        assert!(!doc.has_device("laptop"));
        assert!(doc.suffix_column(&["ssh", "laptop"]).is_empty());
        assert_eq!(doc.value(&["ssh", "phone", "example.org"]), Some("ssh-ed25519 CCC"));
        assert!(!doc.revoke_device("laptop"));
    }

    #[test]
    fn test_diff() {
        let base = ssh_document();
        let mut next = base.clone_for_edit();
        next.threshold = 1;
        next.revoke_device("phone");
        next.add_device("tablet", key());
        next.storage.insert("web".into(), "https://y".into());
        next.storage.insert("mail".into(), "a@b".into());

        let diff = base.diff(&next);
        assert_eq!(diff.threshold, Some((2, 1)));
        assert_eq!(diff.added_devices, vec!["tablet"]);
        assert_eq!(diff.removed_devices, vec!["phone"]);
        assert_eq!(diff.added_storage, vec!["mail"]);
        assert_eq!(diff.removed_storage, vec!["ssh:phone:example.org"]);
        assert_eq!(diff.changed_storage, vec!["web"]);
        assert!(base.diff(&base.clone_for_edit()).is_empty());
    }
}
