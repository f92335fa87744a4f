//! In-memory collaborators for driving the pipeline without btrfs, rsync or root.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use tempfile::TempDir;

use snapback::engine::{ContainerState, SnapshotEngine};
use snapback::profile::{ProfileResolver, PROFILES_DIR};
use snapback::run::{Collaborators, RunController};
use snapback::sanity::SystemProbe;
use snapback::transfer::{TransferRequest, TransferTool};

pub const STORAGE: &str = "/pool";
pub const KEY: &str = "/keys/backup@web1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Subvolume { readonly: bool },
    /// Exists but is not a subvolume
    Plain,
}

/// Subvolume tree keyed by absolute path
#[derive(Default)]
pub struct FakeEngine {
    pub nodes: RefCell<BTreeMap<PathBuf, Node>>,
    pub fail_create: RefCell<HashSet<PathBuf>>,
    pub fail_clear: RefCell<HashSet<PathBuf>>,
    pub fail_delete: RefCell<HashSet<PathBuf>>,
    pub fail_snapshot: Cell<bool>,
    pub fail_list: Cell<bool>,
    pub created: RefCell<Vec<PathBuf>>,
}

impl FakeEngine {
    pub fn with_storage_root() -> Self {
        let engine = Self::default();
        engine.add(Path::new(STORAGE), Node::Plain);
        engine
    }

    pub fn add(&self, path: &Path, node: Node) {
        self.nodes.borrow_mut().insert(path.to_path_buf(), node);
    }

    pub fn add_snapshot(&self, container: &Path, name: &str) {
        self.add(&container.join(name), Node::Subvolume { readonly: true });
    }

    pub fn children(&self, container: &Path) -> Vec<String> {
        self.nodes
            .borrow()
            .keys()
            .filter(|p| p.parent() == Some(container))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect()
    }

    pub fn snapshot_names(&self, container: &Path) -> Vec<String> {
        self.children(container)
            .into_iter()
            .filter(|n| n.starts_with("Long_") || n.starts_with("Short_"))
            .collect()
    }

    pub fn node(&self, path: &Path) -> Option<Node> {
        self.nodes.borrow().get(path).cloned()
    }
}

impl SnapshotEngine for FakeEngine {
    fn create_container(&self, path: &Path) -> Result<()> {
        if self.fail_create.borrow().contains(path) {
            bail!("ERROR: cannot create subvolume");
        }
        if self.node(path).is_some() {
            bail!("exists");
        }
        self.add(path, Node::Subvolume { readonly: false });
        self.created.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    fn inspect(&self, path: &Path) -> Result<ContainerState> {
        Ok(match self.node(path) {
            None => ContainerState::Missing,
            Some(Node::Subvolume { .. }) => ContainerState::Valid,
            Some(Node::Plain) => ContainerState::Invalid,
        })
    }

    fn create_readonly_snapshot(&self, source: &Path, dest: &Path) -> Result<()> {
        if self.fail_snapshot.get() {
            bail!("ERROR: cannot snapshot");
        }
        match self.node(source) {
            Some(Node::Subvolume { .. }) => {}
            _ => bail!("source {} is not a subvolume", source.display()),
        }
        if self.node(dest).is_some() {
            bail!("target {} exists", dest.display());
        }
        self.add(dest, Node::Subvolume { readonly: true });
        Ok(())
    }

    fn clear_readonly(&self, path: &Path) -> Result<()> {
        if self.fail_clear.borrow().contains(path) {
            bail!("property set failed");
        }
        match self.nodes.borrow_mut().get_mut(path) {
            Some(Node::Subvolume { readonly }) => {
                *readonly = false;
                Ok(())
            }
            _ => Err(anyhow!("{} is not a subvolume", path.display())),
        }
    }

    fn delete(&self, path: &Path) -> Result<()> {
        if self.fail_delete.borrow().contains(path) {
            bail!("delete failed");
        }
        match self.node(path) {
            Some(Node::Subvolume { readonly: false }) => {
                self.nodes.borrow_mut().remove(path);
                Ok(())
            }
            Some(Node::Subvolume { readonly: true }) => bail!("read-only subvolume"),
            _ => bail!("{} is not a subvolume", path.display()),
        }
    }

    fn list_entries(&self, container: &Path) -> Result<Vec<String>> {
        if self.fail_list.get() {
            bail!("listing failed");
        }
        if self.node(container).is_none() {
            bail!("{} does not exist", container.display());
        }
        Ok(self.children(container))
    }
}

/// Returns a scripted exit code per remote operand, default 0
#[derive(Default)]
pub struct FakeTransfer {
    pub results: RefCell<HashMap<String, std::result::Result<Option<i32>, String>>>,
    pub requests: RefCell<Vec<TransferRequest>>,
}

impl FakeTransfer {
    pub fn script(&self, remote: &str, code: i32) {
        self.results.borrow_mut().insert(remote.to_string(), Ok(Some(code)));
    }

    pub fn script_spawn_error(&self, remote: &str) {
        self.results
            .borrow_mut()
            .insert(remote.to_string(), Err("No such file or directory".to_string()));
    }

    pub fn remotes(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|r| r.remote.clone()).collect()
    }
}

impl TransferTool for FakeTransfer {
    fn transfer(&self, request: &TransferRequest) -> Result<Option<i32>> {
        self.requests.borrow_mut().push(request.clone());
        match self.results.borrow().get(&request.remote) {
            Some(Ok(code)) => Ok(*code),
            Some(Err(msg)) => Err(anyhow!(msg.clone())),
            None => Ok(Some(0)),
        }
    }
}

pub struct FakeProbe {
    pub uid: u32,
    pub owner: u32,
    pub fs_type: String,
    pub existing: HashSet<PathBuf>,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self {
            uid: 1000,
            owner: 1000,
            fs_type: "btrfs".to_string(),
            existing: [PathBuf::from(KEY)].into_iter().collect(),
        }
    }
}

impl SystemProbe for FakeProbe {
    fn current_uid(&self) -> u32 {
        self.uid
    }

    fn owner_uid(&self, _path: &Path) -> Result<u32> {
        Ok(self.owner)
    }

    fn filesystem_type(&self, _path: &Path) -> Result<String> {
        Ok(self.fs_type.clone())
    }

    fn exists(&self, path: &Path) -> bool {
        self.existing.contains(path)
    }
}

/// Base directory with one profile, plus fake collaborators
pub struct Fixture {
    pub base: TempDir,
    pub engine: FakeEngine,
    pub transfer: FakeTransfer,
    pub probe: FakeProbe,
}

impl Fixture {
    /// Profile `web` with the given extra config lines
    pub fn new(extra: &str) -> Self {
        let fixture = Self {
            base: TempDir::new().expect("tempdir"),
            engine: FakeEngine::with_storage_root(),
            transfer: FakeTransfer::default(),
            probe: FakeProbe::default(),
        };
        let log_dir = fixture.base.path().join("log/web");
        fixture.write_profile(
            "web",
            &format!(
                "SERVER=web1\nUSER=backup\nSTORAGE={}\nSSH_KEY={}\nLOG_DIR={}\n{}",
                STORAGE,
                KEY,
                log_dir.display(),
                extra
            ),
        );
        fixture
    }

    pub fn write_profile(&self, name: &str, content: &str) {
        let dir = self.base.path().join(PROFILES_DIR);
        fs::create_dir_all(&dir).expect("profiles dir");
        fs::write(dir.join(format!("{}.conf", name)), content).expect("profile file");
    }

    pub fn container(&self) -> PathBuf {
        Path::new(STORAGE).join("web")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base.path().join("log/web")
    }

    /// Give the profile an existing container and staging subvolume
    pub fn with_existing_container(self) -> Self {
        let container = self.container();
        self.engine.add(&container, Node::Subvolume { readonly: false });
        self.engine.add(&container.join("current"), Node::Subvolume { readonly: false });
        self
    }

    pub fn controller(&self) -> RunController<'_> {
        RunController::new(
            ProfileResolver::new(self.base.path()),
            Collaborators { engine: &self.engine, transfer: &self.transfer, probe: &self.probe },
        )
    }
}
