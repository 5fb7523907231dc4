//! Certificate and key pairing by name.

use std::collections::BTreeMap;

/// One named TLS entry. Either half may arrive first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateEntry {
    pub cert: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
}

impl CertificateEntry {
    pub fn is_complete(&self) -> bool {
        self.cert.is_some() && self.key.is_some()
    }

    fn is_empty(&self) -> bool {
        self.cert.is_none() && self.key.is_none()
    }
}

/// A deployable pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePair {
    pub name: String,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

/// Certificate entries merged by name.
#[derive(Debug, Clone, Default)]
pub struct CertificateTable {
    entries: BTreeMap<String, CertificateEntry>,
}

impl CertificateTable {
    /// Set (or clear) the certificate half of `name`, leaving the key untouched.
    /// Returns true if the entry changed.
    pub fn set_cert(&mut self, name: &str, cert: Option<Vec<u8>>) -> bool {
        self.update(name, |entry| &mut entry.cert, cert)
    }

    /// Set (or clear) the key half of `name`, leaving the certificate untouched.
    pub fn set_key(&mut self, name: &str, key: Option<Vec<u8>>) -> bool {
        self.update(name, |entry| &mut entry.key, key)
    }

    /// Replace every certificate half at once. Names missing from `certs` lose
    /// their certificate; keys are preserved.
    pub fn replace_certs(&mut self, certs: BTreeMap<String, Vec<u8>>) -> bool {
        self.replace(certs, |entry| &mut entry.cert)
    }

    /// Replace every key half at once. Names missing from `keys` lose their
    /// key; certificates are preserved.
    pub fn replace_keys(&mut self, keys: BTreeMap<String, Vec<u8>>) -> bool {
        self.replace(keys, |entry| &mut entry.key)
    }

    pub fn get(&self, name: &str) -> Option<&CertificateEntry> {
        self.entries.get(name)
    }

    /// Complete pairs in name order.
    pub fn complete_pairs(&self) -> Vec<CertificatePair> {
        self.entries
            .iter()
            .filter_map(|(name, entry)| match (&entry.cert, &entry.key) {
                (Some(cert), Some(key)) => Some(CertificatePair {
                    name: name.clone(),
                    cert: cert.clone(),
                    key: key.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn update<F>(&mut self, name: &str, half: F, value: Option<Vec<u8>>) -> bool
    where
        F: Fn(&mut CertificateEntry) -> &mut Option<Vec<u8>>,
    {
        let entry = self.entries.entry(name.to_string()).or_default();
        let slot = half(entry);
        let changed = *slot != value;
        *slot = value;
        if entry.is_empty() {
            self.entries.remove(name);
        }
        changed
    }

    fn replace<F>(&mut self, mut incoming: BTreeMap<String, Vec<u8>>, half: F) -> bool
    where
        F: Fn(&mut CertificateEntry) -> &mut Option<Vec<u8>>,
    {
        let mut changed = false;
        for (name, entry) in self.entries.iter_mut() {
            let value = incoming.remove(name);
            let slot = half(entry);
            if *slot != value {
                *slot = value;
                changed = true;
            }
        }
        for (name, value) in incoming {
            let mut entry = CertificateEntry::default();
            *half(&mut entry) = Some(value);
            self.entries.insert(name, entry);
            changed = true;
        }
        self.entries.retain(|_, entry| !entry.is_empty());
        changed
    }
}
