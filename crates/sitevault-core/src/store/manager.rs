//! In-memory record store for one account

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use indexmap::IndexMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::types::{fields_from_json, is_reserved_code, SiteEntry, SiteField, SITE_CODE_LEN};
use crate::config::VaultConfig;
use crate::crypto::{AesGcmEngine, CryptoEngine, SecretBytes, DEFAULT_ITERATIONS};
use crate::error::{Result, VaultError};

/// Record store: site code -> site entry
pub struct CredentialStore {
    /// Site entries, reserved codes included
    sites: IndexMap<String, SiteEntry>,
    /// Engine used for encrypted sites
    engine: Arc<dyn CryptoEngine>,
    /// Work factor passed to the engine
    iterations: u32,
}

impl CredentialStore {
    /// Create an empty store backed by the default engine
    pub fn new() -> Self {
        Self::with_engine(Arc::new(AesGcmEngine::new()), DEFAULT_ITERATIONS)
    }

    /// Create an empty store with a custom engine and work factor
    pub fn with_engine(engine: Arc<dyn CryptoEngine>, iterations: u32) -> Self {
        Self {
            sites: IndexMap::new(),
            engine,
            iterations,
        }
    }

    /// Create an empty store using the configured work factor
    pub fn from_config(config: &VaultConfig) -> Self {
        Self::with_engine(Arc::new(AesGcmEngine::new()), config.encryption_iterations)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Replace the store contents with the deserialized `data`.
    ///
    /// Empty input yields an empty store. The buffer is wiped once parsed,
    /// and the store is left untouched when parsing fails.
    pub fn load(&mut self, data: SecretBytes) -> Result<()> {
        if data.is_empty() {
            self.sites.clear();
            debug!("Loaded empty record store");
            return Ok(());
        }

        let sites: IndexMap<String, SiteEntry> = serde_json::from_slice(data.expose())
            .map_err(|e| VaultError::Format(format!("Corrupt record store: {}", e)))?;
        self.sites = sites;

        debug!("Loaded {} site entries ({} bytes)", self.sites.len(), data.len());
        Ok(())
    }

    /// Serialize the store; an empty store becomes a zero-length buffer
    pub fn dump(&self) -> Result<SecretBytes> {
        if self.sites.is_empty() {
            return Ok(SecretBytes::default());
        }

        let bytes = serde_json::to_vec(&self.sites)
            .map_err(|e| VaultError::Format(format!("Cannot serialize record store: {}", e)))?;

        debug!("Dumped {} site entries ({} bytes)", self.sites.len(), bytes.len());
        Ok(SecretBytes::new(bytes))
    }

    /// All site codes, reserved codes excluded
    pub fn list_site_codes(&self) -> Vec<String> {
        self.sites
            .keys()
            .filter(|code| !is_reserved_code(code))
            .cloned()
            .collect()
    }

    pub fn has_site(&self, code: &str) -> bool {
        !is_reserved_code(code) && self.sites.contains_key(code)
    }

    /// Draw a fresh alphanumeric code unused by any entry or reserved code
    pub fn generate_site_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(SITE_CODE_LEN)
                .map(char::from)
                .collect();

            if !self.sites.contains_key(&code) && !is_reserved_code(&code) {
                return code;
            }
        }
    }

    pub fn get_name(&self, code: &str) -> Result<&str> {
        Ok(&self.entry(code)?.name)
    }

    pub fn set_name(&mut self, code: &str, name: impl Into<String>) -> Result<()> {
        self.entry_mut(code)?.name = name.into();
        Ok(())
    }

    /// Number of field pairs stored for a site
    pub fn get_record_count(&self, code: &str) -> Result<usize> {
        Ok(self.entry(code)?.data.len())
    }

    pub fn is_encrypted(&self, code: &str) -> Result<bool> {
        Ok(self.entry(code)?.encrypted)
    }

    /// Flip the encryption flag of a site.
    ///
    /// Stored data is not transformed: call [`CredentialStore::set_data`]
    /// afterwards so the values match the flag.
    pub fn set_encryption_flag(&mut self, code: &str, encrypted: bool) -> Result<()> {
        self.entry_mut(code)?.encrypted = encrypted;
        debug!("Site {} encryption flag set to {}", code, encrypted);
        Ok(())
    }

    /// Return the plaintext field pairs of a site.
    ///
    /// Encrypted sites require `key`. The key is consumed: it is wiped when
    /// this call returns, on success or failure, and the first field that
    /// fails to decrypt aborts the whole call.
    pub fn get_data(
        &self,
        code: &str,
        key: Option<SecretBytes>,
    ) -> Result<Zeroizing<Vec<SiteField>>> {
        let entry = self.entry(code)?;

        if !entry.encrypted {
            return Ok(Zeroizing::new(entry.data.clone()));
        }

        let key = key.ok_or_else(|| VaultError::KeyRequired(code.to_string()))?;
        let cipher = FieldCipher::new(self.engine.as_ref(), key, self.iterations);

        let mut plain = Zeroizing::new(Vec::with_capacity(entry.data.len()));
        for field in &entry.data {
            plain.push(cipher.open(field)?);
        }

        debug!("Decrypted {} fields of site {}", plain.len(), code);
        Ok(plain)
    }

    /// Replace the field pairs of a site.
    ///
    /// Encrypted sites require `key`; every value is encrypted under a copy
    /// of it and stored as base64. The key and the plaintext `data` are
    /// consumed and wiped on return.
    pub fn set_data(
        &mut self,
        code: &str,
        data: Vec<SiteField>,
        key: Option<SecretBytes>,
    ) -> Result<()> {
        let data = Zeroizing::new(data);
        let encrypted = self.entry(code)?.encrypted;

        let stored = if encrypted {
            let key = key.ok_or_else(|| VaultError::KeyRequired(code.to_string()))?;
            let cipher = FieldCipher::new(self.engine.as_ref(), key, self.iterations);
            data.iter()
                .map(|field| cipher.seal(field))
                .collect::<Result<Vec<_>>>()?
        } else {
            data.to_vec()
        };

        debug!("Stored {} fields for site {}", stored.len(), code);
        self.entry_mut(code)?.data = stored;
        Ok(())
    }

    /// [`CredentialStore::set_data`] for untyped `[["type", "value"], ...]` input.
    ///
    /// The shape is validated before the site or its encryption flag is
    /// looked at.
    pub fn set_data_json(&mut self, code: &str, data: &Value, key: Option<SecretBytes>) -> Result<()> {
        let fields = fields_from_json(data)?;
        self.set_data(code, fields, key)
    }

    /// Add an empty, unencrypted site
    pub fn add_site(&mut self, code: &str, name: impl Into<String>) -> Result<()> {
        if code.is_empty() {
            return Err(VaultError::Validation("Site code must not be empty".to_string()));
        }
        if is_reserved_code(code) {
            return Err(VaultError::Validation(format!("Site code {} is reserved", code)));
        }
        if self.sites.contains_key(code) {
            return Err(VaultError::Conflict(format!("Site {}", code)));
        }

        self.sites.insert(code.to_string(), SiteEntry::default());
        self.set_name(code, name)?;

        info!("Added site {}", code);
        Ok(())
    }

    pub fn remove_site(&mut self, code: &str) -> Result<()> {
        self.entry(code)?;
        self.sites.shift_remove(code);

        info!("Removed site {}", code);
        Ok(())
    }

    fn entry(&self, code: &str) -> Result<&SiteEntry> {
        if is_reserved_code(code) {
            return Err(VaultError::NotFound(format!("Site {}", code)));
        }
        self.sites
            .get(code)
            .ok_or_else(|| VaultError::NotFound(format!("Site {}", code)))
    }

    fn entry_mut(&mut self, code: &str) -> Result<&mut SiteEntry> {
        if is_reserved_code(code) {
            return Err(VaultError::NotFound(format!("Site {}", code)));
        }
        self.sites
            .get_mut(code)
            .ok_or_else(|| VaultError::NotFound(format!("Site {}", code)))
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&mut self, code: &str, entry: SiteEntry) {
        self.sites.insert(code.to_string(), entry);
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("sites", &self.sites.len())
            .field("iterations", &self.iterations)
            .finish()
    }
}

/// Owns a caller key for one store call; the key is wiped when this drops.
struct FieldCipher<'a> {
    engine: &'a dyn CryptoEngine,
    key: SecretBytes,
    iterations: u32,
}

impl<'a> FieldCipher<'a> {
    fn new(engine: &'a dyn CryptoEngine, key: SecretBytes, iterations: u32) -> Self {
        Self {
            engine,
            key,
            iterations,
        }
    }

    fn seal(&self, field: &SiteField) -> Result<SiteField> {
        let ciphertext = self
            .engine
            .encrypt(field.value().as_bytes(), self.key.clone(), self.iterations)
            .map_err(|e| match e {
                err @ VaultError::Encryption(_) => err,
                other => VaultError::Encryption(other.to_string()),
            })?;
        Ok(field.with_value(STANDARD.encode(ciphertext)))
    }

    fn open(&self, field: &SiteField) -> Result<SiteField> {
        let ciphertext = STANDARD.decode(field.value()).map_err(|e| {
            VaultError::Format(format!("Field {} is not base64: {}", field.field_type(), e))
        })?;

        let plaintext = self
            .engine
            .decrypt(&ciphertext, self.key.clone(), self.iterations)?;
        let value = String::from_utf8(plaintext.expose().to_vec()).map_err(|_| {
            VaultError::Decryption(format!("Field {} is not valid UTF-8", field.field_type()))
        })?;

        Ok(field.with_value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ITERATIONS: u32 = 1_000;

    fn test_store() -> CredentialStore {
        CredentialStore::with_engine(Arc::new(AesGcmEngine::new()), ITERATIONS)
    }

    fn key(value: &str) -> Option<SecretBytes> {
        Some(SecretBytes::from(value))
    }

    fn sample_fields() -> Vec<SiteField> {
        vec![
            SiteField::new("login", "alice@example.com"),
            SiteField::new("password", "correct horse battery staple"),
        ]
    }

    /// Counts engine calls so tests can see where a loop stopped
    #[derive(Default)]
    struct CountingEngine {
        inner: AesGcmEngine,
        decrypts: AtomicUsize,
    }

    impl CryptoEngine for CountingEngine {
        fn derive_key(&self, password: &SecretBytes, pin: &SecretBytes) -> Result<SecretBytes> {
            self.inner.derive_key(password, pin)
        }

        fn encrypt(&self, plaintext: &[u8], key: SecretBytes, iterations: u32) -> Result<Vec<u8>> {
            self.inner.encrypt(plaintext, key, iterations)
        }

        fn decrypt(&self, ciphertext: &[u8], key: SecretBytes, iterations: u32) -> Result<SecretBytes> {
            self.decrypts.fetch_add(1, Ordering::SeqCst);
            self.inner.decrypt(ciphertext, key, iterations)
        }
    }

    #[test]
    fn test_from_config_uses_configured_iterations() {
        let mut config = VaultConfig::with_root(std::path::Path::new("/tmp/sitevault"));
        config.encryption_iterations = 2_000;

        let store = CredentialStore::from_config(&config);
        assert_eq!(store.iterations(), 2_000);
        assert_eq!(CredentialStore::new().iterations(), DEFAULT_ITERATIONS);
    }

    #[test]
    fn test_empty_load_and_dump() {
        let mut store = test_store();
        store.load(SecretBytes::default()).unwrap();

        assert!(store.list_site_codes().is_empty());
        assert!(store.dump().unwrap().is_empty());
    }

    #[test]
    fn test_load_corrupt_bytes_is_format_error() {
        let mut store = test_store();
        store.add_site("keepme0001", "Keep").unwrap();

        let result = store.load(SecretBytes::from("{not json"));
        assert!(matches!(result, Err(VaultError::Format(_))));

        // Failed load leaves the previous contents in place
        assert!(store.has_site("keepme0001"));
    }

    #[test]
    fn test_load_rejects_asymmetric_fields() {
        let mut store = test_store();
        let raw = r#"{"abc":{"name":"A","encrypted":false,"data":[["login","a","extra"]]}}"#;

        let result = store.load(SecretBytes::from(raw));
        assert!(matches!(result, Err(VaultError::Format(_))));
    }

    #[test]
    fn test_dump_load_roundtrip() {
        let mut store = test_store();
        store.add_site("amzn01xxxx", "Amazon").unwrap();
        store.set_data("amzn01xxxx", sample_fields(), None).unwrap();
        store.add_site("bank000001", "Bank").unwrap();
        store.set_encryption_flag("bank000001", true).unwrap();
        store.set_data("bank000001", sample_fields(), key("k")).unwrap();

        let mut restored = test_store();
        restored.load(store.dump().unwrap()).unwrap();

        assert_eq!(restored.list_site_codes(), store.list_site_codes());
        assert_eq!(restored.get_name("amzn01xxxx").unwrap(), "Amazon");
        assert!(restored.is_encrypted("bank000001").unwrap());
        assert_eq!(*restored.get_data("amzn01xxxx", None).unwrap(), sample_fields());
        assert_eq!(*restored.get_data("bank000001", key("k")).unwrap(), sample_fields());
    }

    #[test]
    fn test_serialized_field_names() {
        let mut store = test_store();
        store.add_site("amzn01xxxx", "Amazon").unwrap();
        store
            .set_data("amzn01xxxx", vec![SiteField::new("login", "alice")], None)
            .unwrap();

        let dumped = store.dump().unwrap();
        let value: Value = serde_json::from_slice(dumped.expose()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "amzn01xxxx": {"name": "Amazon", "encrypted": false, "data": [["login", "alice"]]}
            })
        );
    }

    #[test]
    fn test_add_get_set_name() {
        let mut store = test_store();
        store.add_site("amzn01xxxx", "Amazon").unwrap();
        store.set_name("amzn01xxxx", "Amazon.com").unwrap();

        assert_eq!(store.get_name("amzn01xxxx").unwrap(), "Amazon.com");
        assert!(!store.is_encrypted("amzn01xxxx").unwrap());
        assert_eq!(store.get_record_count("amzn01xxxx").unwrap(), 0);
    }

    #[test]
    fn test_add_existing_site_conflicts() {
        let mut store = test_store();
        store.add_site("amzn01xxxx", "Amazon").unwrap();

        let result = store.add_site("amzn01xxxx", "Other");
        assert!(matches!(result, Err(VaultError::Conflict(_))));
    }

    #[test]
    fn test_add_reserved_or_empty_code_rejected() {
        let mut store = test_store();

        assert!(matches!(store.add_site("__meta__", "x"), Err(VaultError::Validation(_))));
        assert!(matches!(store.add_site("", "x"), Err(VaultError::Validation(_))));
    }

    #[test]
    fn test_missing_site_is_not_found() {
        let mut store = test_store();

        assert!(matches!(store.get_name("nope"), Err(VaultError::NotFound(_))));
        assert!(matches!(store.set_name("nope", "x"), Err(VaultError::NotFound(_))));
        assert!(matches!(store.get_record_count("nope"), Err(VaultError::NotFound(_))));
        assert!(matches!(store.is_encrypted("nope"), Err(VaultError::NotFound(_))));
        assert!(matches!(
            store.set_encryption_flag("nope", true),
            Err(VaultError::NotFound(_))
        ));
        assert!(matches!(store.get_data("nope", None), Err(VaultError::NotFound(_))));
        assert!(matches!(store.remove_site("nope"), Err(VaultError::NotFound(_))));
    }

    #[test]
    fn test_remove_site() {
        let mut store = test_store();
        store.add_site("amzn01xxxx", "Amazon").unwrap();
        store.remove_site("amzn01xxxx").unwrap();

        assert!(!store.has_site("amzn01xxxx"));
        assert!(store.list_site_codes().is_empty());
    }

    #[test]
    fn test_reserved_codes_hidden() {
        let mut store = test_store();
        store.insert_raw("__meta__", SiteEntry::default());
        store.add_site("amzn01xxxx", "Amazon").unwrap();

        assert_eq!(store.list_site_codes(), vec!["amzn01xxxx".to_string()]);
        assert!(!store.has_site("__meta__"));
        assert!(matches!(store.get_name("__meta__"), Err(VaultError::NotFound(_))));
    }

    #[test]
    fn test_reserved_codes_hidden_after_load() {
        let mut store = test_store();
        let raw = r#"{"__version__":{"name":"","encrypted":false,"data":[]},
                      "abc":{"name":"A","encrypted":false,"data":[]}}"#;
        store.load(SecretBytes::from(raw)).unwrap();

        assert_eq!(store.list_site_codes(), vec!["abc".to_string()]);

        // Bookkeeping entries still survive a round trip
        let dumped = store.dump().unwrap();
        let value: Value = serde_json::from_slice(dumped.expose()).unwrap();
        assert!(value.get("__version__").is_some());
    }

    #[test]
    fn test_generate_site_code_unique() {
        let mut store = test_store();

        for _ in 0..200 {
            let code = store.generate_site_code();
            assert_eq!(code.len(), SITE_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
            assert!(!store.has_site(&code));
            assert!(!is_reserved_code(&code));
            store.add_site(&code, "").unwrap();
        }

        assert_eq!(store.list_site_codes().len(), 200);
    }

    #[test]
    fn test_plain_data_stored_verbatim() {
        let mut store = test_store();
        store.add_site("amzn01xxxx", "Amazon").unwrap();
        store.set_data("amzn01xxxx", sample_fields(), None).unwrap();

        assert_eq!(store.get_record_count("amzn01xxxx").unwrap(), 2);
        assert_eq!(*store.get_data("amzn01xxxx", None).unwrap(), sample_fields());
    }

    #[test]
    fn test_encrypted_roundtrip() {
        let mut store = test_store();
        store.add_site("bank000001", "Bank").unwrap();
        store.set_encryption_flag("bank000001", true).unwrap();
        store.set_data("bank000001", sample_fields(), key("user-key")).unwrap();

        let data = store.get_data("bank000001", key("user-key")).unwrap();
        assert_eq!(*data, sample_fields());
    }

    #[test]
    fn test_encrypted_values_stored_as_base64_ciphertext() {
        let mut store = test_store();
        store.add_site("bank000001", "Bank").unwrap();
        store.set_encryption_flag("bank000001", true).unwrap();
        store.set_data("bank000001", sample_fields(), key("user-key")).unwrap();

        store.set_encryption_flag("bank000001", false).unwrap();
        let raw = store.get_data("bank000001", None).unwrap();

        for (stored, original) in raw.iter().zip(sample_fields()) {
            assert_eq!(stored.field_type(), original.field_type());
            assert_ne!(stored.value(), original.value());
            assert!(STANDARD.decode(stored.value()).is_ok());
        }
    }

    #[test]
    fn test_encrypted_without_key_requires_key() {
        let mut store = test_store();
        store.add_site("bank000001", "Bank").unwrap();
        store.set_encryption_flag("bank000001", true).unwrap();

        assert!(matches!(
            store.set_data("bank000001", sample_fields(), None),
            Err(VaultError::KeyRequired(_))
        ));
        assert!(matches!(
            store.get_data("bank000001", None),
            Err(VaultError::KeyRequired(_))
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let mut store = test_store();
        store.add_site("bank000001", "Bank").unwrap();
        store.set_encryption_flag("bank000001", true).unwrap();
        store.set_data("bank000001", sample_fields(), key("right")).unwrap();

        let result = store.get_data("bank000001", key("wrong"));
        assert!(matches!(result, Err(VaultError::WrongKey)));
    }

    #[test]
    fn test_decrypt_stops_at_first_failure() {
        let engine = Arc::new(CountingEngine::default());
        let mut store = CredentialStore::with_engine(engine.clone(), ITERATIONS);

        let bad = engine.encrypt(b"other", SecretBytes::from("other"), ITERATIONS).unwrap();
        let good = engine.encrypt(b"pw", SecretBytes::from("k"), ITERATIONS).unwrap();
        store.insert_raw(
            "mixed00001",
            SiteEntry {
                name: "Mixed".to_string(),
                encrypted: true,
                data: vec![
                    SiteField::new("a", STANDARD.encode(bad)),
                    SiteField::new("b", STANDARD.encode(good)),
                ],
            },
        );

        let result = store.get_data("mixed00001", key("k"));
        assert!(matches!(result, Err(VaultError::WrongKey)));
        assert_eq!(engine.decrypts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_malformed_json_data_rejected_before_encryption() {
        let mut store = test_store();
        store.add_site("plain00001", "Plain").unwrap();
        store.add_site("bank000001", "Bank").unwrap();
        store.set_encryption_flag("bank000001", true).unwrap();

        let malformed = serde_json::json!([["login", "alice", "extra"]]);

        assert!(matches!(
            store.set_data_json("plain00001", &malformed, None),
            Err(VaultError::Validation(_))
        ));
        // Validation wins over the missing key
        assert!(matches!(
            store.set_data_json("bank000001", &malformed, None),
            Err(VaultError::Validation(_))
        ));
    }

    #[test]
    fn test_set_data_json() {
        let mut store = test_store();
        store.add_site("plain00001", "Plain").unwrap();

        let data = serde_json::json!([["login", "alice"], ["password", "pw"]]);
        store.set_data_json("plain00001", &data, None).unwrap();

        assert_eq!(store.get_record_count("plain00001").unwrap(), 2);
    }

    #[test]
    fn test_toggle_flag_does_not_transform_data() {
        let mut store = test_store();
        store.add_site("amzn01xxxx", "Amazon").unwrap();
        store.set_data("amzn01xxxx", sample_fields(), None).unwrap();

        store.set_encryption_flag("amzn01xxxx", true).unwrap();
        assert!(store.is_encrypted("amzn01xxxx").unwrap());

        // Plaintext values are not base64 ciphertext, so decryption fails
        assert!(store.get_data("amzn01xxxx", key("k")).is_err());

        store.set_encryption_flag("amzn01xxxx", false).unwrap();
        assert_eq!(*store.get_data("amzn01xxxx", None).unwrap(), sample_fields());
    }
}
