//! In-memory stand-ins for the subprocess spawner and the cluster API.

use crate::cluster::{ClusterClient, ResourceKind};
use crate::runner::{CommandResult, Spawner};
use crate::ImageError;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum MockReply {
    Exit(CommandResult),
    SpawnFailure,
}

impl MockReply {
    pub fn exit(code: i32, stdout: &str, stderr: &str) -> Self {
        MockReply::Exit(CommandResult {
            stdout: stdout.to_owned(),
            stderr: stderr.to_owned(),
            exit_code: Some(code),
            signal: None,
        })
    }

    pub fn stdout(stdout: &str) -> Self {
        Self::exit(0, stdout, "")
    }
}

/// Records every invocation and answers from a list of canned replies.
///
/// A reply registered with [`MockSpawner::on`] is used for any invocation whose
/// arguments contain the given token; later registrations win. Unmatched
/// invocations exit 0 with empty output.
#[derive(Default)]
pub struct MockSpawner {
    replies: Mutex<Vec<(String, MockReply)>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl MockSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, token: &str, reply: MockReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push((token.to_owned(), reply));
        }
    }

    /// Each call as `[program, args...]`.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, token: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.iter().skip(1).any(|a| a == token))
            .count()
    }
}

#[async_trait]
impl Spawner for MockSpawner {
    async fn spawn(&self, program: &Path, args: &[String]) -> std::io::Result<CommandResult> {
        let mut call = vec![program.display().to_string()];
        call.extend(args.iter().cloned());
        self.calls
            .lock()
            .map_err(|e| std::io::Error::other(format!("mutex poisoned: {e}")))?
            .push(call);

        let reply = self
            .replies
            .lock()
            .map_err(|e| std::io::Error::other(format!("mutex poisoned: {e}")))?
            .iter()
            .rev()
            .find(|(token, _)| args.iter().any(|a| a == token))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(MockReply::Exit(result)) => Ok(result),
            Some(MockReply::SpawnFailure) => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: not found", program.display()),
            )),
            None => Ok(CommandResult {
                exit_code: Some(0),
                ..CommandResult::default()
            }),
        }
    }
}

/// Cluster API double keyed by `(kind, namespace, name)`.
#[derive(Default)]
pub struct MockCluster {
    objects: Mutex<BTreeSet<(ResourceKind, String, String)>>,
    failing_deletes: Mutex<BTreeSet<String>>,
    failing_lists: Mutex<BTreeSet<ResourceKind>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: ResourceKind, namespace: &str, name: &str) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert((kind, namespace.to_owned(), name.to_owned()));
        }
    }

    pub fn fail_delete(&self, name: &str) {
        if let Ok(mut failing) = self.failing_deletes.lock() {
            failing.insert(name.to_owned());
        }
    }

    pub fn fail_list(&self, kind: ResourceKind) {
        if let Ok(mut failing) = self.failing_lists.lock() {
            failing.insert(kind);
        }
    }

    pub fn contains(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        self.objects
            .lock()
            .map(|o| o.contains(&(kind, namespace.to_owned(), name.to_owned())))
            .unwrap_or(false)
    }

    fn lock_err(e: impl std::fmt::Display) -> ImageError {
        ImageError::Cluster(format!("mutex poisoned: {e}"))
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        _label_selector: &str,
    ) -> Result<Vec<String>, ImageError> {
        if self.failing_lists.lock().map_err(Self::lock_err)?.contains(&kind) {
            return Err(ImageError::Cluster(format!("cannot list {kind}")));
        }
        let objects = self.objects.lock().map_err(Self::lock_err)?;
        Ok(objects
            .iter()
            .filter(|(k, ns, _)| *k == kind && ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect())
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ImageError> {
        if self.failing_deletes.lock().map_err(Self::lock_err)?.contains(name) {
            return Err(ImageError::Cluster(format!(
                "forbidden: cannot delete {kind} {namespace}/{name}"
            )));
        }
        self.objects
            .lock()
            .map_err(Self::lock_err)?
            .remove(&(kind, namespace.to_owned(), name.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_spawner_records_and_replies() {
        let spawner = MockSpawner::new();
        spawner.on("images", MockReply::stdout("line\n"));

        let result = spawner
            .spawn(Path::new("nerdctl"), &["images".to_owned()])
            .await
            .unwrap();
        assert_eq!(result.stdout, "line\n");

        let result = spawner
            .spawn(Path::new("nerdctl"), &["pull".to_owned()])
            .await
            .unwrap();
        assert!(result.success());

        assert_eq!(spawner.calls().len(), 2);
        assert_eq!(spawner.call_count("images"), 1);
        assert_eq!(spawner.calls()[1], vec!["nerdctl", "pull"]);
    }

    #[tokio::test]
    async fn later_registration_wins() {
        let spawner = MockSpawner::new();
        spawner.on("images", MockReply::stdout("first"));
        spawner.on("images", MockReply::stdout("second"));
        let result = spawner
            .spawn(Path::new("nerdctl"), &["images".to_owned()])
            .await
            .unwrap();
        assert_eq!(result.stdout, "second");
    }

    #[tokio::test]
    async fn mock_cluster_lifecycle() {
        let cluster = MockCluster::new();
        cluster.insert(ResourceKind::Service, "ns", "a");
        cluster.insert(ResourceKind::DaemonSet, "ns", "a");

        let services = cluster.list(ResourceKind::Service, "ns", "x=y").await.unwrap();
        assert_eq!(services, vec!["a"]);

        cluster.delete(ResourceKind::Service, "ns", "a").await.unwrap();
        assert!(!cluster.contains(ResourceKind::Service, "ns", "a"));
        assert!(cluster.contains(ResourceKind::DaemonSet, "ns", "a"));
    }
}
