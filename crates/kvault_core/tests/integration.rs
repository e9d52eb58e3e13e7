//! End-to-end tests across the whole engine: persistence across reopen,
//! debounce timing, crash-safety, and the secure/external/sub-key paths
//! working together.

use kvault_core::{
    Config, Encrypter, Fault, KeySpec, Value, Vault, VaultError, VaultResult,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Reversible toy encrypter: XOR with a fixed byte, hex-encoded.
struct XorEncrypter;

impl Encrypter for XorEncrypter {
    fn encrypt(&self, plaintext: &str) -> VaultResult<String> {
        Ok(plaintext
            .bytes()
            .map(|b| format!("{:02x}", b ^ 0x5a))
            .collect())
    }

    fn decrypt(&self, ciphertext: &str) -> VaultResult<String> {
        if ciphertext.len() % 2 != 0 {
            return Err(VaultError::crypto("odd ciphertext length"));
        }
        let bytes: Result<Vec<u8>, _> = (0..ciphertext.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&ciphertext[i..i + 2], 16).map(|b| b ^ 0x5a))
            .collect();
        let bytes = bytes.map_err(|e| VaultError::crypto(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| VaultError::crypto(e.to_string()))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn open(root: &Path) -> Vault {
    init_tracing();
    Vault::builder(root)
        .encrypter(Arc::new(XorEncrypter))
        .open()
        .await
        .unwrap()
}

#[tokio::test]
async fn values_survive_reopen() {
    let dir = tempdir().unwrap();

    let internal = KeySpec::new("settings");
    let external = KeySpec::new("attachment").external(true);
    let secure = KeySpec::new("token").secure(true);

    {
        let vault = open(dir.path()).await;
        vault
            .write(&internal, Value::Str("dark-mode".into()))
            .await
            .unwrap();
        vault
            .write(&external, Value::Bytes(vec![9u8; 4096]))
            .await
            .unwrap();
        vault
            .write(&secure, Value::Str("s3cret".into()))
            .await
            .unwrap();
        vault.close().await;
    }

    let vault = open(dir.path()).await;
    assert_eq!(
        vault.read(&internal).await.unwrap(),
        Some(Value::Str("dark-mode".into()))
    );
    assert_eq!(
        vault.read(&external).await.unwrap(),
        Some(Value::Bytes(vec![9u8; 4096]))
    );
    assert_eq!(
        vault.read(&secure).await.unwrap(),
        Some(Value::Str("s3cret".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn rapid_writes_flush_once_with_final_state() {
    let dir = tempdir().unwrap();
    let vault = Vault::builder(dir.path())
        .debounce(Duration::from_millis(150))
        .open()
        .await
        .unwrap();
    let key = KeySpec::new("counter");

    for i in 0..10 {
        vault.write(&key, Value::Int(i)).await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
    }
    assert_eq!(vault.flush_count(), 0);

    tokio::time::advance(Duration::from_millis(300)).await;
    while vault.flush_count() < 1 {
        tokio::task::yield_now().await;
    }
    assert_eq!(vault.flush_count(), 1);

    // The one flush carried the final value
    drop(vault);
    let reopened = Vault::open(dir.path()).await.unwrap();
    assert_eq!(
        reopened.read(&key).await.unwrap(),
        Some(Value::Int(9))
    );
}

#[tokio::test]
async fn reads_see_writes_before_any_flush() {
    let dir = tempdir().unwrap();
    let vault = Vault::builder(dir.path())
        .debounce(Duration::from_secs(3600))
        .open()
        .await
        .unwrap();
    let key = KeySpec::new("immediate");

    vault.write(&key, Value::Bool(true)).await.unwrap();
    assert_eq!(vault.read(&key).await.unwrap(), Some(Value::Bool(true)));
    assert_eq!(vault.flush_count(), 0);
}

#[tokio::test]
async fn corrupt_consolidated_file_degrades_to_empty() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("main.vault"), b"not a vault file at all").unwrap();

    let seen: Arc<Mutex<Vec<Fault>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let vault = Vault::builder(dir.path())
        .error_sink(Arc::new(move |f: &Fault| seen_clone.lock().push(f.clone())))
        .open()
        .await
        .unwrap();

    assert!(vault.keys().await.unwrap().is_empty());
    assert!(!seen.lock().is_empty());

    // The store is fully usable afterwards
    let key = KeySpec::new("fresh");
    vault.write(&key, Value::Int(1)).await.unwrap();
    assert_eq!(vault.read(&key).await.unwrap(), Some(Value::Int(1)));
}

#[tokio::test]
async fn same_key_external_writes_keep_submission_order() {
    let dir = tempdir().unwrap();
    let vault = open(dir.path()).await;
    let key = KeySpec::new("contended").external(true);

    let w1 = vault.write(&key, Value::Int(1));
    let w2 = vault.write(&key, Value::Int(2));
    let w3 = vault.write(&key, Value::Int(3));
    let (r1, r2, r3) = tokio::join!(w1, w2, w3);
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();

    assert_eq!(vault.read(&key).await.unwrap(), Some(Value::Int(3)));
}

#[tokio::test]
async fn removable_sweep_spares_everything_else() {
    let dir = tempdir().unwrap();
    let vault = open(dir.path()).await;

    for i in 0..8 {
        let removable = i % 2 == 0;
        let external = i >= 4;
        let key = KeySpec::new(format!("k{i}"))
            .removable(removable)
            .external(external);
        vault.write(&key, Value::Int(i)).await.unwrap();
    }

    vault.clear_removable().await.unwrap();

    let keys = vault.keys().await.unwrap();
    assert_eq!(keys, vec!["k1", "k3", "k5", "k7"]);
}

#[tokio::test]
async fn sub_key_sets_merge_across_instances() {
    let dir = tempdir().unwrap();
    {
        let vault = open(dir.path()).await;
        vault.subkeys().register("inbox", "a").await.unwrap();
        vault.subkeys().register("inbox", "b").await.unwrap();
        vault.close().await;
    }
    {
        let vault = open(dir.path()).await;
        vault.subkeys().register("inbox", "b").await.unwrap();
        vault.subkeys().register("inbox", "c").await.unwrap();
        vault.close().await;
    }

    let vault = open(dir.path()).await;
    assert_eq!(
        vault.subkeys().names("inbox").await.unwrap(),
        vec!["a", "b", "c"]
    );
}

#[tokio::test]
async fn default_config_uses_spec_layout() {
    let dir = tempdir().unwrap();
    let vault = open(dir.path()).await;

    vault
        .write(&KeySpec::new("k"), Value::Int(1))
        .await
        .unwrap();
    vault
        .write(&KeySpec::new("e").external(true), Value::Int(2))
        .await
        .unwrap();
    vault.close().await;

    assert!(dir.path().join("main.vault").is_file());
    assert!(dir.path().join("external").is_dir());
    assert_eq!(
        Config::default().store_file,
        kvault_core::DEFAULT_STORE_FILE
    );
}

#[tokio::test]
async fn on_disk_bytes_are_obfuscated() {
    let dir = tempdir().unwrap();
    let vault = open(dir.path()).await;

    vault
        .write(
            &KeySpec::new("greeting"),
            Value::Str("plainly readable".into()),
        )
        .await
        .unwrap();
    vault.close().await;

    let bytes = std::fs::read(dir.path().join("main.vault")).unwrap();
    let haystack = String::from_utf8_lossy(&bytes);
    assert!(!haystack.contains("plainly readable"));
    assert!(!haystack.contains("greeting"));
}
