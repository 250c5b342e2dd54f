use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use keystash::vault::{KdfParams, KEY_LEN};
use keystash::{
    EntryKind, EnvelopeCodec, ErrorKind, FileBackend, KeyStoreCodec, KeyStoreHandle,
    KeyStoreManager, MemoryBackend, NewKeyStore, PassphraseKeyProvider, StaticKeyProvider,
    StorageBackend,
};
use secrecy::{ExposeSecret, SecretString};
use tempfile::TempDir;

fn secret(s: &str) -> SecretString {
    SecretString::new(s.to_string())
}

fn static_keys() -> Arc<StaticKeyProvider> {
    Arc::new(StaticKeyProvider::new(1, [0x5a; KEY_LEN]))
}

fn memory_manager() -> KeyStoreManager<MemoryBackend, EnvelopeCodec> {
    KeyStoreManager::open(
        MemoryBackend::new(),
        static_keys(),
        EnvelopeCodec,
        Duration::from_secs(5),
    )
    .unwrap()
}

fn handle_with(alias: &str, data: &[u8]) -> KeyStoreHandle {
    KeyStoreHandle::new().with_entry(alias, EntryKind::PrivateKey, data)
}

fn add<B: StorageBackend>(
    manager: &KeyStoreManager<B, EnvelopeCodec>,
    tenant: u32,
    name: &str,
    password: &str,
    handle: &KeyStoreHandle,
) {
    let content = EnvelopeCodec.encode(handle, &secret(password)).unwrap();
    manager
        .add_keystore(
            tenant,
            NewKeyStore {
                name,
                content: &content,
                provider: "SUN",
                store_type: "KSJSON",
                store_password: &secret(password),
                private_key_password: &secret("pk"),
            },
        )
        .unwrap();
}

#[test]
fn tenant_five_scenario() {
    let manager = memory_manager();
    add(&manager, 5, "ts1", "p1", &handle_with("server", b"v1"));

    let password = manager.get_keystore_password("ts1", 5).unwrap();
    assert_eq!(password.expose_secret(), "p1");

    let t1 = manager.get_keystore_last_modified("ts1", 5).unwrap();
    manager
        .update_keystore("ts1", &handle_with("server", b"v2"), 5)
        .unwrap();
    let t2 = manager.get_keystore_last_modified("ts1", 5).unwrap();
    assert!(t2 > t1);
}

#[test]
fn last_modified_strictly_increases_over_many_updates() {
    let manager = memory_manager();
    add(&manager, 1, "ks", "pw", &handle_with("a", b"0"));

    let mut previous = manager.get_keystore_stamp("ks", 1).unwrap();
    for i in 0..50u8 {
        manager
            .update_keystore("ks", &handle_with("a", &[i]), 1)
            .unwrap();
        let current = manager.get_keystore_stamp("ks", 1).unwrap();
        assert!(current.modified > previous.modified);
        assert_eq!(current.revision, previous.revision + 1);
        previous = current;
    }
}

#[test]
fn concurrent_updates_are_serialized() {
    let manager = Arc::new(memory_manager());
    add(&*manager, 1, "shared", "pw", &handle_with("seed", b"seed"));

    let writers = 8;
    let barrier = Arc::new(Barrier::new(writers));
    let submitted: Vec<KeyStoreHandle> = (0..writers)
        .map(|i| {
            KeyStoreHandle::new()
                .with_entry("key", EntryKind::PrivateKey, format!("key-{i}").as_bytes())
                .with_entry("cert", EntryKind::Certificate, format!("cert-{i}").as_bytes())
        })
        .collect();

    let threads: Vec<_> = submitted
        .iter()
        .cloned()
        .map(|handle| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.update_keystore("shared", &handle, 1).unwrap()
            })
        })
        .collect();

    let mut revisions: Vec<u64> = threads.into_iter().map(|t| t.join().unwrap().revision).collect();
    revisions.sort_unstable();
    assert_eq!(revisions, (2..2 + writers as u64).collect::<Vec<_>>());

    let final_state = manager.get_keystore("shared", 1).unwrap();
    assert!(
        submitted.contains(&final_state),
        "final state must equal exactly one submitted update"
    );
}

#[test]
fn concurrent_tenants_do_not_interfere() {
    let manager = Arc::new(memory_manager());
    let threads: Vec<_> = (0..6u32)
        .map(|tenant| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for n in 0..5 {
                    add(
                        &*manager,
                        tenant,
                        &format!("store-{n}"),
                        "pw",
                        &handle_with("k", &[n as u8]),
                    );
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    for tenant in 0..6u32 {
        let names: Vec<String> = manager
            .list_keystores(tenant)
            .unwrap()
            .into_iter()
            .map(|md| md.name)
            .collect();
        assert_eq!(names, vec!["store-0", "store-1", "store-2", "store-3", "store-4"]);
    }
}

#[test]
fn records_survive_reopen_on_disk() {
    let dir = TempDir::new().unwrap();
    let params = KdfParams {
        m_cost: 8192,
        t_cost: 1,
        p_cost: 1,
    };
    let salt: Vec<u8> = (0u8..32).collect();
    let keys = |pass: &str| {
        Arc::new(PassphraseKeyProvider::new(&secret(pass), &salt, &params, 1).unwrap())
    };

    let stamp = {
        let manager = KeyStoreManager::open(
            FileBackend::open(dir.path()).unwrap(),
            keys("master"),
            EnvelopeCodec,
            Duration::from_secs(5),
        )
        .unwrap();
        add(&manager, 2, "persisted", "p1", &handle_with("server", b"der"));
        manager.get_keystore_stamp("persisted", 2).unwrap()
    };

    let manager = KeyStoreManager::open(
        FileBackend::open(dir.path()).unwrap(),
        keys("master"),
        EnvelopeCodec,
        Duration::from_secs(5),
    )
    .unwrap();
    assert_eq!(manager.get_keystore_stamp("persisted", 2).unwrap(), stamp);
    assert_eq!(
        manager.get_keystore("persisted", 2).unwrap(),
        handle_with("server", b"der")
    );

    let wrong = KeyStoreManager::open(
        FileBackend::open(dir.path()).unwrap(),
        keys("not-the-master"),
        EnvelopeCodec,
        Duration::from_secs(5),
    )
    .unwrap();
    assert_eq!(
        wrong.get_keystore_password("persisted", 2).unwrap_err().kind(),
        ErrorKind::Crypto
    );
    // Metadata stays readable without the master key.
    assert_eq!(wrong.list_keystores(2).unwrap().len(), 1);
}

#[test]
fn list_never_contains_secret_material() {
    let manager = memory_manager();
    add(&manager, 9, "ks", "listing-password", &handle_with("a", b"x"));

    let listed = manager.list_keystores(9).unwrap();
    let rendered = format!("{listed:?}");
    assert!(!rendered.contains("listing-password"));
    assert!(!rendered.contains("password"));
}
