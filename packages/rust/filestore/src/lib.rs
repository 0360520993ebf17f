//! Directory-backed module store.
//!
//! The [`FileStore`] serves containers from JSON "module files" laid out
//! under a root directory: container `/Project/Reqs/SRS` lives at
//! `<root>/Project/Reqs/SRS.module.json`.
//!
//! **Access rules:**
//! - Files are only ever read; the store never writes.
//! - A sibling `<file>.lock` marks the module as exclusively held by another
//!   session, and opening it fails with [`OpenFailure::Locked`].

mod format;

use std::path::{Path, PathBuf};

use tracing::debug;

use modexport_shared::{
    ContainerAccessor, FlatRecord, ModExportError, OpenFailure, Result, default_container_name,
};

use crate::format::ModuleFile;

/// Extension of module files.
pub const MODULE_EXTENSION: &str = "module.json";

/// Read-only accessor over a directory of module files.
pub struct FileStore {
    root: PathBuf,
    open_handles: usize,
}

/// One loaded module file.
#[derive(Debug)]
pub struct ModuleHandle {
    path: String,
    name: String,
    records: Vec<FlatRecord>,
}

impl FileStore {
    /// Serve modules from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open_handles: 0,
        }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of modules currently open.
    pub fn open_handles(&self) -> usize {
        self.open_handles
    }

    /// Resolve a container path to its module file.
    ///
    /// Only the canonical spelling (`/A/B`, exactly one leading slash, no
    /// empty or dot segments) is accepted, so every module file has a single
    /// container path.
    pub fn module_file(&self, path: &str) -> Result<PathBuf> {
        let invalid = || ModExportError::container_open(path, OpenFailure::InvalidPath);
        let relative = path.strip_prefix('/').ok_or_else(invalid)?;
        let malformed = relative.is_empty()
            || relative.contains('\0')
            || relative
                .split('/')
                .any(|segment| segment.is_empty() || segment == "." || segment == "..");
        if malformed {
            return Err(invalid());
        }

        Ok(self.root.join(format!("{relative}.{MODULE_EXTENSION}")))
    }
}

impl ContainerAccessor for FileStore {
    type Handle = ModuleHandle;

    fn open(&mut self, path: &str) -> Result<ModuleHandle> {
        let file = self.module_file(path)?;

        if !file.is_file() {
            return Err(ModExportError::container_open(path, OpenFailure::NotFound));
        }
        if lock_file(&file).exists() {
            return Err(ModExportError::container_open(path, OpenFailure::Locked));
        }

        let content = std::fs::read_to_string(&file).map_err(|e| {
            ModExportError::container_open(path, OpenFailure::Unreadable(e.to_string()))
        })?;
        let module: ModuleFile = serde_json::from_str(&content).map_err(|e| {
            ModExportError::container_open(path, OpenFailure::Unreadable(e.to_string()))
        })?;

        let name = module
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_container_name(path));
        let records = module.into_records();

        self.open_handles += 1;
        debug!(%path, file = %file.display(), records = records.len(), "module opened");

        Ok(ModuleHandle {
            path: path.to_string(),
            name,
            records,
        })
    }

    fn name(&self, handle: &ModuleHandle) -> String {
        handle.name.clone()
    }

    fn items(&self, handle: &ModuleHandle) -> Result<Vec<FlatRecord>> {
        Ok(handle.records.clone())
    }

    fn close(&mut self, handle: ModuleHandle) {
        self.open_handles = self.open_handles.saturating_sub(1);
        debug!(path = %handle.path, "module closed");
    }
}

fn lock_file(module_file: &Path) -> PathBuf {
    let mut name = module_file.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modexport_shared::{AttributeKind, LinkDirection, RawValue};
    use uuid::Uuid;

    fn temp_store() -> (PathBuf, FileStore) {
        let dir = std::env::temp_dir().join(format!("modexport-store-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = FileStore::new(&dir);
        (dir, store)
    }

    fn write_module(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let file = dir.join(format!("{rel}.{MODULE_EXTENSION}"));
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, content).unwrap();
        file
    }

    #[test]
    fn resolves_paths_under_root() {
        let store = FileStore::new("/srv/modules");
        assert_eq!(store.root(), Path::new("/srv/modules"));
        let file = store.module_file("/Project/Reqs/SRS").unwrap();
        assert_eq!(file, PathBuf::from("/srv/modules/Project/Reqs/SRS.module.json"));
    }

    #[test]
    fn rejects_invalid_paths() {
        let store = FileStore::new("/srv/modules");
        for bad in [
            "",
            "/",
            "/Project/../etc/passwd",
            "/Project/",
            "/a/./b",
            "/a//b",
            "Project/SRS",
            "//Project/SRS",
        ] {
            let err = store.module_file(bad).unwrap_err();
            assert!(
                matches!(err, ModExportError::ContainerOpen { reason: OpenFailure::InvalidPath, .. }),
                "{bad:?} should be invalid"
            );
        }
    }

    #[test]
    fn opens_and_reads_module() {
        let (dir, mut store) = temp_store();
        write_module(
            &dir,
            "Project/SRS",
            r#"{
                "name": "Software Requirements",
                "objects": [
                    { "id": "SRS-1", "level": 1,
                      "attributes": [
                        { "name": "Object Heading", "kind": "text", "value": "Intro" },
                        { "name": "Reviewed", "kind": "boolean", "value": { "noValue": true } },
                        { "name": "Picture", "kind": "ole", "value": "AAEC" }
                      ],
                      "links": [
                        { "type": "satisfies", "direction": "outgoing",
                          "targets": [ { "module": "/Project/URS", "object": "URS-1" } ] }
                      ] },
                    { "id": "SRS-2", "level": 2 }
                ]
            }"#,
        );

        let handle = store.open("/Project/SRS").unwrap();
        assert_eq!(store.open_handles(), 1);
        assert_eq!(store.name(&handle), "Software Requirements");

        let records = store.items(&handle).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].attributes[0].value, RawValue::Text("Intro".into()));
        assert_eq!(records[0].attributes[1].value, RawValue::NoValue);
        assert_eq!(
            records[0].attributes[2].kind,
            AttributeKind::Opaque("ole".into())
        );
        assert_eq!(records[0].relationships[0].direction, LinkDirection::Outgoing);
        assert_eq!(records[1].level, 2);
        assert!(records[1].attributes.is_empty());

        store.close(handle);
        assert_eq!(store.open_handles(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn name_defaults_to_last_segment() {
        let (dir, mut store) = temp_store();
        write_module(&dir, "Project/URS", r#"{ "objects": [] }"#);
        let handle = store.open("/Project/URS").unwrap();
        assert_eq!(store.name(&handle), "URS");
        store.close(handle);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn open_failures_are_classified() {
        let (dir, mut store) = temp_store();
        let locked = write_module(&dir, "Locked", r#"{ "objects": [] }"#);
        std::fs::write(lock_file(&locked), "session 42").unwrap();
        write_module(&dir, "Corrupt", "{ not json");

        let reason = |res: Result<ModuleHandle>| match res {
            Err(ModExportError::ContainerOpen { reason, .. }) => reason,
            other => panic!("expected open failure, got {other:?}"),
        };

        assert_eq!(reason(store.open("/Missing")), OpenFailure::NotFound);
        assert_eq!(reason(store.open("/Locked")), OpenFailure::Locked);
        assert!(matches!(reason(store.open("/Corrupt")), OpenFailure::Unreadable(_)));
        assert_eq!(store.open_handles(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
