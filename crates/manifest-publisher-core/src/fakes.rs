//! In-memory fakes for the pipeline's trait seams (testing only)
//!
//! Provides `MemoryGitStore`, `ScriptedRenderer`, `RecordingRegistry` and
//! `StaticArchiveSource` that satisfy the trait contracts without a git
//! host, a helm binary or network access.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::archive::ArchiveSource;
use crate::domain::{
    ArchiveError, CommitInfo, Environment, GitError, ObjectSha, RenderError, RepoId, TreeEntry,
};
use crate::git_store::{GitObjectStore, GitResult};
use crate::registry::{ArtifactRegistration, ArtifactRegistry, NotificationError};
use crate::render::{ChartRenderer, RenderRequest};

// ---------------------------------------------------------------------------
// MemoryGitStore
// ---------------------------------------------------------------------------

/// Number of calls per git operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create_blob: usize,
    pub get_ref: usize,
    pub get_commit: usize,
    pub create_tree: usize,
    pub create_commit: usize,
    pub update_ref: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.create_blob
            + self.get_ref
            + self.get_commit
            + self.create_tree
            + self.create_commit
            + self.update_ref
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCommit {
    pub tree: ObjectSha,
    pub parents: Vec<ObjectSha>,
    pub message: String,
}

#[derive(Debug, Default)]
struct GitState {
    blobs: HashMap<ObjectSha, Vec<u8>>,
    trees: HashMap<ObjectSha, BTreeMap<String, ObjectSha>>,
    commits: HashMap<ObjectSha, StoredCommit>,
    refs: HashMap<String, ObjectSha>,
    statuses: VecDeque<u16>,
    ref_failures: VecDeque<GitError>,
    concurrent_pushes: bool,
    foreign_pushes: usize,
    blob_failure: Option<GitError>,
    blob_failures: HashMap<Vec<u8>, GitError>,
    blob_delays: HashMap<Vec<u8>, u64>,
    commit_seq: u64,
    calls: CallCounts,
}

fn object_sha(kind: &str, body: &[u8]) -> ObjectSha {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(body);
    ObjectSha::parse(&hex::encode(hasher.finalize())).expect("sha256 hex is a valid object sha")
}

impl GitState {
    fn put_blob(&mut self, content: &[u8]) -> ObjectSha {
        let sha = object_sha("blob", content);
        self.blobs.insert(sha.clone(), content.to_vec());
        sha
    }

    fn put_tree(&mut self, files: BTreeMap<String, ObjectSha>) -> ObjectSha {
        let body: Vec<u8> = files
            .iter()
            .flat_map(|(path, sha)| format!("{path} {sha}\n").into_bytes())
            .collect();
        let sha = object_sha("tree", &body);
        self.trees.insert(sha.clone(), files);
        sha
    }

    fn put_commit(&mut self, tree: ObjectSha, parents: Vec<ObjectSha>, message: &str) -> ObjectSha {
        self.commit_seq += 1;
        let parent_list: Vec<&str> = parents.iter().map(ObjectSha::as_str).collect();
        let body = format!(
            "tree {tree}\nparents {}\nseq {}\n\n{message}",
            parent_list.join(" "),
            self.commit_seq
        );
        let sha = object_sha("commit", body.as_bytes());
        self.commits.insert(
            sha.clone(),
            StoredCommit {
                tree,
                parents,
                message: message.to_string(),
            },
        );
        sha
    }

    /// Commit `files` on top of `reference` and move the ref there.
    fn push(&mut self, reference: &str, files: &[(String, ObjectSha)], message: &str) {
        let head = self.refs.get(reference).cloned();
        let mut tree = head
            .as_ref()
            .and_then(|h| self.commits.get(h))
            .and_then(|c| self.trees.get(&c.tree))
            .cloned()
            .unwrap_or_default();
        tree.extend(files.iter().cloned());
        let tree_sha = self.put_tree(tree);
        let commit = self.put_commit(tree_sha, head.into_iter().collect(), message);
        self.refs.insert(reference.to_string(), commit);
    }
}

/// In-memory git object store with content-addressed blobs and trees.
///
/// Starts with one empty commit on `heads/main`. Ref updates answer `200`
/// unless statuses were scripted; a `200` that is not a fast-forward is
/// answered with `422` like the real API.
#[derive(Debug)]
pub struct MemoryGitStore {
    state: Mutex<GitState>,
}

impl Default for MemoryGitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGitStore {
    pub const DEFAULT_REF: &'static str = "heads/main";

    pub fn new() -> Self {
        let mut state = GitState::default();
        let tree = state.put_tree(BTreeMap::new());
        let root = state.put_commit(tree, Vec::new(), "initial commit");
        state.refs.insert(Self::DEFAULT_REF.to_string(), root);
        Self {
            state: Mutex::new(state),
        }
    }

    /// Seed a file on the default branch.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let blob = state.put_blob(content.as_bytes());
            state.push(
                Self::DEFAULT_REF,
                &[(path.to_string(), blob)],
                &format!("add {path}"),
            );
        }
        self
    }

    /// Answer the next ref updates with these statuses, in order.
    pub fn with_ref_update_statuses(self, statuses: Vec<u16>) -> Self {
        self.state.lock().unwrap().statuses = statuses.into();
        self
    }

    /// Fail the next ref update without any response.
    pub fn with_ref_update_failure(self, error: GitError) -> Self {
        self.state.lock().unwrap().ref_failures.push_back(error);
        self
    }

    /// Simulate another writer: every rejected ref update is preceded by a
    /// foreign commit on the same ref.
    pub fn with_concurrent_pushes(self) -> Self {
        self.state.lock().unwrap().concurrent_pushes = true;
        self
    }

    pub fn fail_blobs_with(self, error: GitError) -> Self {
        self.state.lock().unwrap().blob_failure = Some(error);
        self
    }

    /// Fail only uploads of exactly `content`.
    pub fn fail_blob(self, content: &str, error: GitError) -> Self {
        self.state
            .lock()
            .unwrap()
            .blob_failures
            .insert(content.as_bytes().to_vec(), error);
        self
    }

    /// Delay uploads of exactly `content` by `millis` before storing them.
    pub fn with_blob_delay(self, content: &str, millis: u64) -> Self {
        self.state
            .lock()
            .unwrap()
            .blob_delays
            .insert(content.as_bytes().to_vec(), millis);
        self
    }

    pub fn head(&self, reference: &str) -> Option<ObjectSha> {
        self.state.lock().unwrap().refs.get(reference).cloned()
    }

    pub fn put_blob(&self, content: &[u8]) -> ObjectSha {
        self.state.lock().unwrap().put_blob(content)
    }

    pub fn blob_content(&self, sha: &ObjectSha) -> Option<Vec<u8>> {
        self.state.lock().unwrap().blobs.get(sha).cloned()
    }

    /// Whether any stored blob holds exactly `content`.
    pub fn contains_content(&self, content: &[u8]) -> bool {
        self.state
            .lock()
            .unwrap()
            .blobs
            .values()
            .any(|blob| blob == content)
    }

    pub fn tree_files(&self, sha: &ObjectSha) -> Option<BTreeMap<String, ObjectSha>> {
        self.state.lock().unwrap().trees.get(sha).cloned()
    }

    pub fn commit(&self, sha: &ObjectSha) -> Option<StoredCommit> {
        self.state.lock().unwrap().commits.get(sha).cloned()
    }

    /// Files reachable from the current head of `reference`.
    pub fn files_at(&self, reference: &str) -> Option<BTreeMap<String, ObjectSha>> {
        let state = self.state.lock().unwrap();
        let head = state.refs.get(reference)?;
        let commit = state.commits.get(head)?;
        state.trees.get(&commit.tree).cloned()
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl GitObjectStore for MemoryGitStore {
    async fn create_blob(&self, _repo: &RepoId, content_base64: &str) -> GitResult<ObjectSha> {
        let (delay, content) = {
            let mut state = self.state.lock().unwrap();
            state.calls.create_blob += 1;
            if let Some(err) = &state.blob_failure {
                return Err(err.clone());
            }
            let content = base64::engine::general_purpose::STANDARD
                .decode(content_base64)
                .map_err(|e| GitError::Status {
                    operation: "create_blob".to_string(),
                    status: 422,
                    message: e.to_string(),
                })?;
            if let Some(err) = state.blob_failures.get(&content) {
                return Err(err.clone());
            }
            let delay = state.blob_delays.get(&content).copied();
            (delay, content)
        };

        if let Some(millis) = delay {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
        Ok(self.state.lock().unwrap().put_blob(&content))
    }

    async fn get_ref(&self, _repo: &RepoId, reference: &str) -> GitResult<ObjectSha> {
        let mut state = self.state.lock().unwrap();
        state.calls.get_ref += 1;
        state
            .refs
            .get(reference)
            .cloned()
            .ok_or_else(|| GitError::NotFound(reference.to_string()))
    }

    async fn get_commit(&self, _repo: &RepoId, sha: &ObjectSha) -> GitResult<CommitInfo> {
        let mut state = self.state.lock().unwrap();
        state.calls.get_commit += 1;
        let commit = state
            .commits
            .get(sha)
            .ok_or_else(|| GitError::NotFound(sha.to_string()))?;
        Ok(CommitInfo {
            sha: sha.clone(),
            tree_sha: commit.tree.clone(),
        })
    }

    async fn create_tree(
        &self,
        _repo: &RepoId,
        base_tree: &ObjectSha,
        entries: &[TreeEntry],
    ) -> GitResult<ObjectSha> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_tree += 1;
        let mut files = state
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| GitError::NotFound(base_tree.to_string()))?;
        for entry in entries {
            if !state.blobs.contains_key(&entry.sha) {
                return Err(GitError::NotFound(entry.sha.to_string()));
            }
            files.insert(entry.path.clone(), entry.sha.clone());
        }
        Ok(state.put_tree(files))
    }

    async fn create_commit(
        &self,
        _repo: &RepoId,
        message: &str,
        tree: &ObjectSha,
        parents: &[ObjectSha],
    ) -> GitResult<ObjectSha> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_commit += 1;
        if !state.trees.contains_key(tree) {
            return Err(GitError::NotFound(tree.to_string()));
        }
        Ok(state.put_commit(tree.clone(), parents.to_vec(), message))
    }

    async fn update_ref(&self, _repo: &RepoId, reference: &str, sha: &ObjectSha) -> GitResult<u16> {
        let mut state = self.state.lock().unwrap();
        state.calls.update_ref += 1;
        if let Some(err) = state.ref_failures.pop_front() {
            return Err(err);
        }

        let head = state
            .refs
            .get(reference)
            .cloned()
            .ok_or_else(|| GitError::NotFound(reference.to_string()))?;
        let scripted = state.statuses.pop_front().unwrap_or(200);
        if scripted != 200 {
            if state.concurrent_pushes {
                state.foreign_pushes += 1;
                let n = state.foreign_pushes;
                let blob = state.put_blob(format!("push {n}\n").as_bytes());
                state.push(
                    reference,
                    &[(format!("other/deploy-{n}.yaml"), blob)],
                    &format!("foreign push {n}"),
                );
            }
            return Ok(scripted);
        }

        let fast_forward = state
            .commits
            .get(sha)
            .is_some_and(|c| c.parents.contains(&head));
        if !fast_forward {
            return Ok(422);
        }
        state.refs.insert(reference.to_string(), sha.clone());
        Ok(200)
    }
}

// ---------------------------------------------------------------------------
// ScriptedRenderer
// ---------------------------------------------------------------------------

/// Renderer that answers `# {release} {namespace}` for every template call.
///
/// The environment of a call is taken from the namespace suffix.
#[derive(Debug, Default)]
pub struct ScriptedRenderer {
    delays: HashMap<Environment, u64>,
    failing: HashSet<Environment>,
    fail_dependency_update: bool,
    template_calls: Mutex<Vec<RenderRequest>>,
    completed: Mutex<Vec<String>>,
    dependency_calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every render of `environment` by `millis`.
    pub fn with_delay(mut self, environment: Environment, millis: u64) -> Self {
        self.delays.insert(environment, millis);
        self
    }

    /// Fail every render of `environment` with a non-zero exit.
    pub fn failing(mut self, environment: Environment) -> Self {
        self.failing.insert(environment);
        self
    }

    pub fn failing_dependency_update(mut self) -> Self {
        self.fail_dependency_update = true;
        self
    }

    pub fn template_calls(&self) -> Vec<RenderRequest> {
        self.template_calls.lock().unwrap().clone()
    }

    /// Namespaces whose render ran to completion.
    pub fn completed_renders(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn dependency_calls(&self) -> Vec<PathBuf> {
        self.dependency_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChartRenderer for ScriptedRenderer {
    async fn dependency_update(&self, chart: &Path) -> Result<(), RenderError> {
        self.dependency_calls
            .lock()
            .unwrap()
            .push(chart.to_path_buf());
        if self.fail_dependency_update {
            return Err(RenderError::NonZeroExit {
                command: format!("helm dependency update {}", chart.display()),
                code: 1,
                stderr: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    async fn template(&self, request: &RenderRequest) -> Result<String, RenderError> {
        self.template_calls.lock().unwrap().push(request.clone());

        let environment = request
            .namespace
            .rsplit('-')
            .next()
            .and_then(|suffix| suffix.parse::<Environment>().ok());
        if let Some(environment) = environment {
            if let Some(millis) = self.delays.get(&environment) {
                tokio::time::sleep(Duration::from_millis(*millis)).await;
            }
            if self.failing.contains(&environment) {
                return Err(RenderError::NonZeroExit {
                    command: format!("helm template {}", request.release_name),
                    code: 1,
                    stderr: "scripted failure".to_string(),
                });
            }
        }

        self.completed
            .lock()
            .unwrap()
            .push(request.namespace.clone());
        Ok(format!("# {} {}", request.release_name, request.namespace))
    }
}

// ---------------------------------------------------------------------------
// RecordingRegistry
// ---------------------------------------------------------------------------

/// Registry that records every registration it receives.
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    failure: Option<NotificationError>,
    registrations: Mutex<Vec<ArtifactRegistration>>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record, then reject every registration with `error`.
    pub fn failing(error: NotificationError) -> Self {
        Self {
            failure: Some(error),
            registrations: Mutex::new(Vec::new()),
        }
    }

    pub fn registrations(&self) -> Vec<ArtifactRegistration> {
        self.registrations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactRegistry for RecordingRegistry {
    async fn register(&self, registration: &ArtifactRegistration) -> Result<(), NotificationError> {
        self.registrations
            .lock()
            .unwrap()
            .push(registration.clone());
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticArchiveSource
// ---------------------------------------------------------------------------

/// Archive source serving the same bytes for every URL.
#[derive(Debug, Default)]
pub struct StaticArchiveSource {
    bytes: Option<Vec<u8>>,
    fetches: Mutex<Vec<String>>,
}

impl StaticArchiveSource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Some(bytes),
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// Source whose downloads always fail.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArchiveSource for StaticArchiveSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ArchiveError> {
        self.fetches.lock().unwrap().push(url.to_string());
        self.bytes
            .clone()
            .ok_or_else(|| ArchiveError::Fetch(format!("{url}: unavailable")))
    }
}

/// Build a zip archive in memory from `(path, content)` pairs.
pub fn zip_tree(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (path, content) in files {
        writer.start_file(*path, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
