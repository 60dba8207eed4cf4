use std::env;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crossbeam::channel::Sender;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::{AppError, AppResult};

use super::backup::StoreEvent;
use super::template::{timestamp, FingerprintTemplate, UserProfile, UserSummary};

pub const DEFAULT_STORE_DIR: &str = "/var/lib/ridgeprint/templates";
pub const STORE_DIR_ENV: &str = "RIDGEPRINT_STORE_DIR";

/// Keyed template persistence. Each call touches a single record atomically.
pub trait TemplateStore {
    fn lookup(&self, user_id: &str) -> AppResult<Option<FingerprintTemplate>>;
    /// Fails with [`AppError::DuplicateUser`] when the id is taken.
    fn insert(&self, template: &FingerprintTemplate) -> AppResult<()>;
    /// Fails with [`AppError::UserNotFound`] when the id is unknown.
    fn update_identity(&self, user_id: &str, username: &str, phone: &str) -> AppResult<()>;
    /// Fails with [`AppError::UserNotFound`] when the id is unknown.
    fn delete(&self, user_id: &str) -> AppResult<()>;
    /// All users sorted by id.
    fn list(&self) -> AppResult<Vec<UserSummary>>;
}

pub fn show_user<S: TemplateStore + ?Sized>(store: &S, user_id: &str) -> AppResult<UserProfile> {
    store
        .lookup(user_id)?
        .map(|template| template.profile())
        .ok_or_else(|| AppError::UserNotFound {
            user_id: user_id.to_string(),
        })
}

/// Longest encoded file stem; leaves room for `.json` within the usual
/// 255-byte file name limit.
const MAX_FILE_STEM: usize = 250;

/// Any non-empty text is a user id as long as its encoded file name fits.
pub fn validate_user_id(user_id: &str) -> AppResult<()> {
    if user_id.is_empty() {
        return Err(AppError::InvalidUser {
            user_id: user_id.to_string(),
            message: "user id cannot be empty".into(),
        });
    }

    if encode_user_id(user_id).len() > MAX_FILE_STEM {
        return Err(AppError::InvalidUser {
            user_id: user_id.to_string(),
            message: format!("encoded file name exceeds {MAX_FILE_STEM} bytes"),
        });
    }

    Ok(())
}

/// File stem for `user_id`. ASCII letters, digits, `-` and `_` are kept;
/// every other byte becomes `%XX`, so distinct ids never share a file and no
/// id can name a path outside the store.
pub fn encode_user_id(user_id: &str) -> String {
    let mut encoded = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

pub trait StoreDirResolver {
    fn resolve(&self, override_dir: Option<&Path>) -> PathBuf;
}

/// Explicit override, then `$RIDGEPRINT_STORE_DIR`, then `fallback`.
#[derive(Debug, Clone)]
pub struct EnvStoreDirResolver {
    fallback: PathBuf,
}

impl EnvStoreDirResolver {
    pub fn with_fallback(fallback: impl Into<PathBuf>) -> Self {
        Self {
            fallback: fallback.into(),
        }
    }
}

impl Default for EnvStoreDirResolver {
    fn default() -> Self {
        Self::with_fallback(DEFAULT_STORE_DIR)
    }
}

impl StoreDirResolver for EnvStoreDirResolver {
    fn resolve(&self, override_dir: Option<&Path>) -> PathBuf {
        if let Some(dir) = override_dir {
            dir.to_path_buf()
        } else if let Some(env_value) = env::var_os(STORE_DIR_ENV).filter(|v| !v.is_empty()) {
            PathBuf::from(env_value)
        } else {
            self.fallback.clone()
        }
    }
}

/// One pretty-printed JSON file per user under `root`, named after the
/// encoded user id (see [`encode_user_id`]).
#[derive(Debug, Clone)]
pub struct FilesystemTemplateStore {
    root: PathBuf,
    events: Option<Sender<StoreEvent>>,
}

impl FilesystemTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            events: None,
        }
    }

    /// Emits a [`StoreEvent`] after every successful write.
    pub fn with_events(mut self, sender: Sender<StoreEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn template_path(&self, user_id: &str) -> AppResult<PathBuf> {
        validate_user_id(user_id)?;
        Ok(self.root.join(format!("{}.json", encode_user_id(user_id))))
    }

    /// Every stored template sorted by user id. A missing root is empty.
    pub fn load_all(&self) -> AppResult<Vec<FingerprintTemplate>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(AppError::StoreRead {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut templates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| AppError::StoreRead {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(template) = read_template(&path)? {
                templates.push(template);
            }
        }
        templates.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(templates)
    }

    fn emit(&self, event: StoreEvent) {
        if let Some(sender) = &self.events {
            if sender.send(event).is_err() {
                debug!("store event dropped: no backup worker listening");
            }
        }
    }
}

impl TemplateStore for FilesystemTemplateStore {
    fn lookup(&self, user_id: &str) -> AppResult<Option<FingerprintTemplate>> {
        read_template(&self.template_path(user_id)?)
    }

    fn insert(&self, template: &FingerprintTemplate) -> AppResult<()> {
        let path = self.template_path(&template.user_id)?;
        let duplicate = || AppError::DuplicateUser {
            user_id: template.user_id.clone(),
        };
        if path.exists() {
            return Err(duplicate());
        }
        match write_json_atomic(&path, template, WriteMode::CreateNew) {
            Err(AppError::StoreWrite { source, .. })
                if source.kind() == io::ErrorKind::AlreadyExists =>
            {
                return Err(duplicate())
            }
            other => other?,
        }
        debug!(user_id = %template.user_id, path = %path.display(), "template written");
        self.emit(StoreEvent::TemplateWritten {
            user_id: template.user_id.clone(),
        });
        Ok(())
    }

    fn update_identity(&self, user_id: &str, username: &str, phone: &str) -> AppResult<()> {
        let path = self.template_path(user_id)?;
        let mut template = read_template(&path)?.ok_or_else(|| AppError::UserNotFound {
            user_id: user_id.to_string(),
        })?;
        template.username = username.to_string();
        template.phone = phone.to_string();
        template.updated_at = Some(timestamp());
        write_json_atomic(&path, &template, WriteMode::Replace)?;
        self.emit(StoreEvent::IdentityUpdated {
            user_id: user_id.to_string(),
        });
        Ok(())
    }

    fn delete(&self, user_id: &str) -> AppResult<()> {
        let path = self.template_path(user_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(AppError::UserNotFound {
                    user_id: user_id.to_string(),
                })
            }
            Err(source) => return Err(AppError::StoreWrite { path, source }),
        }
        self.emit(StoreEvent::TemplateDeleted {
            user_id: user_id.to_string(),
        });
        Ok(())
    }

    fn list(&self) -> AppResult<Vec<UserSummary>> {
        Ok(self
            .load_all()?
            .iter()
            .map(FingerprintTemplate::summary)
            .collect())
    }
}

pub fn read_template(path: &Path) -> AppResult<Option<FingerprintTemplate>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(AppError::StoreRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|err| AppError::InvalidTemplate {
            path: path.to_path_buf(),
            message: format!("invalid template contents: {err}"),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// Fail with `AlreadyExists` instead of replacing an existing file.
    CreateNew,
    Replace,
}

/// Serializes `value` to a temp file beside `path`, syncs it, then moves it
/// into place with owner-only permissions.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    mode: WriteMode,
) -> AppResult<()> {
    let write_err = |source: io::Error| AppError::StoreWrite {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|source| AppError::StoreWrite {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    {
        let file = tmp.as_file_mut();
        {
            let mut writer = BufWriter::new(&mut *file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.write_all(b"\n").map_err(write_err)?;
            writer.flush().map_err(write_err)?;
        }
        file.sync_all().map_err(write_err)?;
    }

    let file = match mode {
        WriteMode::CreateNew => tmp.persist_noclobber(path),
        WriteMode::Replace => tmp.persist(path),
    }
    .map_err(|err| write_err(err.error))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata().map_err(write_err)?.permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms).map_err(write_err)?;
    }
    #[cfg(not(unix))]
    drop(file);

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use super::*;

    /// Store double keeping templates in a map; records every insert.
    #[derive(Default)]
    pub(crate) struct InMemoryStore {
        pub(crate) templates: RefCell<BTreeMap<String, FingerprintTemplate>>,
        pub(crate) inserts: RefCell<Vec<String>>,
    }

    impl TemplateStore for InMemoryStore {
        fn lookup(&self, user_id: &str) -> AppResult<Option<FingerprintTemplate>> {
            Ok(self.templates.borrow().get(user_id).cloned())
        }

        fn insert(&self, template: &FingerprintTemplate) -> AppResult<()> {
            let mut templates = self.templates.borrow_mut();
            if templates.contains_key(&template.user_id) {
                return Err(AppError::DuplicateUser {
                    user_id: template.user_id.clone(),
                });
            }
            templates.insert(template.user_id.clone(), template.clone());
            self.inserts.borrow_mut().push(template.user_id.clone());
            Ok(())
        }

        fn update_identity(&self, user_id: &str, username: &str, phone: &str) -> AppResult<()> {
            let mut templates = self.templates.borrow_mut();
            let template = templates.get_mut(user_id).ok_or_else(|| AppError::UserNotFound {
                user_id: user_id.to_string(),
            })?;
            template.username = username.to_string();
            template.phone = phone.to_string();
            Ok(())
        }

        fn delete(&self, user_id: &str) -> AppResult<()> {
            self.templates
                .borrow_mut()
                .remove(user_id)
                .map(|_| ())
                .ok_or_else(|| AppError::UserNotFound {
                    user_id: user_id.to_string(),
                })
        }

        fn list(&self) -> AppResult<Vec<UserSummary>> {
            Ok(self
                .templates
                .borrow()
                .values()
                .map(FingerprintTemplate::summary)
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::minutiae::MinutiaPoint;
    use crossbeam::channel::unbounded;
    use tempfile::TempDir;

    fn template(user_id: &str, username: &str) -> FingerprintTemplate {
        FingerprintTemplate::new(
            user_id,
            username,
            "555-0100",
            vec![[0x5Au8; 32], [0xA5u8; 32]],
            vec![MinutiaPoint::new(10, 12), MinutiaPoint::new(40, 41)],
        )
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(tmp.path().join("templates"));
        let original = template("alice", "Alice");
        store.insert(&original).unwrap();

        assert_eq!(store.lookup("alice").unwrap(), Some(original));
        assert_eq!(store.lookup("bob").unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn template_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(tmp.path());
        store.insert(&template("alice", "Alice")).unwrap();
        let mode = fs::metadata(tmp.path().join("alice.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn second_insert_is_a_duplicate_and_keeps_original() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(tmp.path());
        store.insert(&template("alice", "Alice")).unwrap();

        match store.insert(&template("alice", "Mallory")) {
            Err(AppError::DuplicateUser { user_id }) => assert_eq!(user_id, "alice"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(store.lookup("alice").unwrap().unwrap().username, "Alice");
    }

    #[test]
    fn update_identity_changes_only_profile_fields() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(tmp.path());
        let original = template("alice", "Alice");
        store.insert(&original).unwrap();

        store.update_identity("alice", "Alice B", "555-0199").unwrap();
        let updated = store.lookup("alice").unwrap().unwrap();
        assert_eq!(updated.username, "Alice B");
        assert_eq!(updated.phone, "555-0199");
        assert_eq!(updated.descriptors, original.descriptors);
        assert_eq!(updated.minutiae, original.minutiae);
        assert!(updated.updated_at.is_some());
    }

    #[test]
    fn update_and_delete_unknown_user_fail() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(tmp.path());
        assert!(matches!(
            store.update_identity("ghost", "x", "y"),
            Err(AppError::UserNotFound { .. })
        ));
        assert!(matches!(
            store.delete("ghost"),
            Err(AppError::UserNotFound { .. })
        ));
    }

    #[test]
    fn list_is_sorted_and_skips_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(tmp.path());
        store.insert(&template("zoe", "Zoe")).unwrap();
        store.insert(&template("adam", "Adam")).unwrap();
        fs::write(tmp.path().join("notes.txt"), "not a template").unwrap();

        let users = store.list().unwrap();
        let ids: Vec<_> = users.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(ids, vec!["adam", "zoe"]);
    }

    #[test]
    fn missing_root_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(tmp.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn corrupt_template_is_reported() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("alice.json"), "{ nope").unwrap();
        let store = FilesystemTemplateStore::new(tmp.path());
        assert!(matches!(
            store.lookup("alice"),
            Err(AppError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn free_text_user_ids_stay_inside_the_store() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("templates");
        let store = FilesystemTemplateStore::new(&root);
        store.insert(&template("a@b.com", "Mail")).unwrap();
        store.insert(&template("../etc/passwd", "Dots")).unwrap();

        assert!(root.join("a%40b%2Ecom.json").exists());
        assert!(root.join("%2E%2E%2Fetc%2Fpasswd.json").exists());
        assert!(!tmp.path().join("etc").exists());
        assert_eq!(store.lookup("a@b.com").unwrap().unwrap().username, "Mail");

        let ids: Vec<_> = store.list().unwrap().into_iter().map(|u| u.user_id).collect();
        assert_eq!(ids, vec!["../etc/passwd", "a@b.com"]);
    }

    #[test]
    fn encoding_keeps_safe_ids_readable() {
        assert_eq!(encode_user_id("alice_01-x"), "alice_01-x");
        assert_eq!(encode_user_id("é"), "%C3%A9");
        assert_ne!(encode_user_id("a%40"), encode_user_id("a@"));
    }

    #[test]
    fn empty_and_oversized_ids_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(tmp.path());
        assert!(matches!(store.lookup(""), Err(AppError::InvalidUser { .. })));
        assert!(matches!(
            store.lookup(&"/".repeat(100)),
            Err(AppError::InvalidUser { .. })
        ));
    }

    #[test]
    fn writes_emit_store_events() {
        let tmp = TempDir::new().unwrap();
        let (sender, receiver) = unbounded();
        let store = FilesystemTemplateStore::new(tmp.path()).with_events(sender);
        store.insert(&template("alice", "Alice")).unwrap();
        store.update_identity("alice", "Al", "1").unwrap();
        store.delete("alice").unwrap();
        assert!(store.insert(&template("bob", "Bob")).is_ok());
        assert!(store.delete("ghost").is_err());

        let events: Vec<_> = receiver.try_iter().collect();
        assert_eq!(
            events,
            vec![
                StoreEvent::TemplateWritten {
                    user_id: "alice".into()
                },
                StoreEvent::IdentityUpdated {
                    user_id: "alice".into()
                },
                StoreEvent::TemplateDeleted {
                    user_id: "alice".into()
                },
                StoreEvent::TemplateWritten {
                    user_id: "bob".into()
                },
            ]
        );
    }

    #[test]
    fn show_user_returns_profile() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(tmp.path());
        store.insert(&template("alice", "Alice")).unwrap();
        let profile = show_user(&store, "alice").unwrap();
        assert_eq!(profile.phone, "555-0100");
        assert!(matches!(
            show_user(&store, "bob"),
            Err(AppError::UserNotFound { .. })
        ));
    }

    #[test]
    fn resolver_prefers_override() {
        let override_dir = PathBuf::from("/tmp/override-store");
        assert_eq!(
            EnvStoreDirResolver::default().resolve(Some(&override_dir)),
            override_dir
        );
    }
}
