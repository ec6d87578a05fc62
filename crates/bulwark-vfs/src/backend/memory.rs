use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Backend, BackendError, BackendResult, FileStat, Location};

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Vec<u8>,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
    },
    Dir {
        created: DateTime<Utc>,
    },
}

impl Node {
    fn stat(&self) -> FileStat {
        match self {
            Self::File { data, created, modified } => FileStat {
                size: u64::try_from(data.len()).unwrap_or(u64::MAX),
                created_at: *created,
                modified_at: *modified,
                is_directory: false,
            },
            Self::Dir { created } => FileStat {
                size: 0,
                created_at: *created,
                modified_at: *created,
                is_directory: true,
            },
        }
    }
}

/// An origin-isolated filesystem held entirely in memory.
///
/// Every instance is its own private store: two backends never observe each
/// other's files. An optional quota bounds the total bytes of file content.
#[derive(Debug)]
pub struct MemoryBackend {
    nodes: RwLock<BTreeMap<String, Node>>,
    quota: Option<u64>,
    created: DateTime<Utc>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// An empty, unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            quota: None,
            created: Utc::now(),
        }
    }

    /// An empty store that holds at most `bytes` of file content.
    #[must_use]
    pub fn with_quota(bytes: u64) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::new()
        }
    }

    /// Total bytes of file content currently stored.
    pub async fn used_bytes(&self) -> u64 {
        let nodes = self.nodes.read().await;
        used(&nodes)
    }
}

fn used(nodes: &BTreeMap<String, Node>) -> u64 {
    nodes
        .values()
        .map(|n| match n {
            Node::File { data, .. } => u64::try_from(data.len()).unwrap_or(u64::MAX),
            Node::Dir { .. } => 0,
        })
        .fold(0u64, u64::saturating_add)
}

/// Ancestors of `path`, shallowest first, excluding `/` and `path` itself.
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(|(idx, _)| &path[..idx])
        .filter(|p| !p.is_empty())
}

/// Prefix that every descendant key of `path` starts with.
fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_owned()
    } else {
        format!("{path}/")
    }
}

fn ensure_parents(nodes: &mut BTreeMap<String, Node>, path: &str, now: DateTime<Utc>) -> BackendResult<()> {
    for ancestor in ancestors(path) {
        match nodes.get(ancestor) {
            Some(Node::File { .. }) => return Err(BackendError::NotADirectory),
            Some(Node::Dir { .. }) => {},
            None => {
                nodes.insert(ancestor.to_owned(), Node::Dir { created: now });
            },
        }
    }
    Ok(())
}

#[async_trait]
impl Backend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, loc: &Location) -> BackendResult<Vec<u8>> {
        let nodes = self.nodes.read().await;
        match nodes.get(&loc.path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Dir { .. }) => Err(BackendError::IsADirectory),
            None if loc.path == "/" => Err(BackendError::IsADirectory),
            None => Err(BackendError::NotFound),
        }
    }

    async fn write(&self, loc: &Location, data: &[u8]) -> BackendResult<()> {
        let mut nodes = self.nodes.write().await;
        let now = Utc::now();
        let created = match nodes.get(&loc.path) {
            Some(Node::Dir { .. }) => return Err(BackendError::IsADirectory),
            Some(Node::File { created, .. }) => *created,
            None if loc.path == "/" => return Err(BackendError::IsADirectory),
            None => now,
        };

        if let Some(limit) = self.quota {
            let existing = match nodes.get(&loc.path) {
                Some(Node::File { data, .. }) => u64::try_from(data.len()).unwrap_or(u64::MAX),
                _ => 0,
            };
            let incoming = u64::try_from(data.len()).unwrap_or(u64::MAX);
            let after = used(&nodes).saturating_sub(existing).saturating_add(incoming);
            if after > limit {
                return Err(BackendError::QuotaExceeded {
                    used: used(&nodes),
                    limit,
                });
            }
        }

        ensure_parents(&mut nodes, &loc.path, now)?;
        nodes.insert(
            loc.path.clone(),
            Node::File {
                data: data.to_vec(),
                created,
                modified: now,
            },
        );
        Ok(())
    }

    async fn delete(&self, loc: &Location) -> BackendResult<()> {
        let mut nodes = self.nodes.write().await;
        if loc.path != "/" && !nodes.contains_key(&loc.path) {
            return Err(BackendError::NotFound);
        }
        let prefix = child_prefix(&loc.path);
        nodes.retain(|key, _| key != &loc.path && !key.starts_with(&prefix));
        Ok(())
    }

    async fn exists(&self, loc: &Location) -> BackendResult<bool> {
        let nodes = self.nodes.read().await;
        Ok(loc.path == "/" || nodes.contains_key(&loc.path))
    }

    async fn list(&self, loc: &Location) -> BackendResult<Vec<String>> {
        let nodes = self.nodes.read().await;
        match nodes.get(&loc.path) {
            Some(Node::File { .. }) => return Err(BackendError::NotADirectory),
            None if loc.path != "/" => return Err(BackendError::NotFound),
            _ => {},
        }
        let prefix = child_prefix(&loc.path);
        let names = nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = key.get(prefix.len()..)?;
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_owned())
            })
            .collect();
        Ok(names)
    }

    async fn stat(&self, loc: &Location) -> BackendResult<FileStat> {
        let nodes = self.nodes.read().await;
        match nodes.get(&loc.path) {
            Some(node) => Ok(node.stat()),
            None if loc.path == "/" => Ok(Node::Dir { created: self.created }.stat()),
            None => Err(BackendError::NotFound),
        }
    }

    async fn mkdir(&self, loc: &Location) -> BackendResult<()> {
        let mut nodes = self.nodes.write().await;
        match nodes.get(&loc.path) {
            Some(Node::File { .. }) => return Err(BackendError::AlreadyExists),
            Some(Node::Dir { .. }) => return Ok(()),
            None if loc.path == "/" => return Ok(()),
            None => {},
        }
        let now = Utc::now();
        ensure_parents(&mut nodes, &loc.path, now)?;
        nodes.insert(loc.path.clone(), Node::Dir { created: now });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(path: &str) -> Location {
        Location::new("/", path)
    }

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("/a/b/c").collect::<Vec<_>>(), vec!["/a", "/a/b"]);
        assert_eq!(ancestors("/a").count(), 0);
    }

    #[tokio::test]
    async fn test_write_read_creates_parents() {
        let fs = MemoryBackend::new();
        fs.write(&at("/p/a/b.txt"), b"hello").await.unwrap();
        assert_eq!(fs.read(&at("/p/a/b.txt")).await.unwrap(), b"hello");
        assert!(fs.stat(&at("/p/a")).await.unwrap().is_directory);
        assert_eq!(fs.list(&at("/p")).await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_created() {
        let fs = MemoryBackend::new();
        fs.write(&at("/f"), b"1").await.unwrap();
        let first = fs.stat(&at("/f")).await.unwrap();
        fs.write(&at("/f"), b"22").await.unwrap();
        let second = fs.stat(&at("/f")).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.size, 2);
    }

    #[tokio::test]
    async fn test_file_as_parent_rejected() {
        let fs = MemoryBackend::new();
        fs.write(&at("/f"), b"x").await.unwrap();
        assert!(matches!(
            fs.write(&at("/f/g"), b"y").await,
            Err(BackendError::NotADirectory)
        ));
        assert!(matches!(fs.mkdir(&at("/f")).await, Err(BackendError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_delete_is_recursive_and_prefix_safe() {
        let fs = MemoryBackend::new();
        fs.write(&at("/a/x"), b"1").await.unwrap();
        fs.write(&at("/ab/y"), b"2").await.unwrap();
        fs.delete(&at("/a")).await.unwrap();
        assert!(!fs.exists(&at("/a/x")).await.unwrap());
        assert!(fs.exists(&at("/ab/y")).await.unwrap());
        assert!(matches!(fs.delete(&at("/a")).await, Err(BackendError::NotFound)));
    }

    #[tokio::test]
    async fn test_quota_enforced() {
        let fs = MemoryBackend::with_quota(4);
        fs.write(&at("/a"), b"abc").await.unwrap();
        assert!(matches!(
            fs.write(&at("/b"), b"de").await,
            Err(BackendError::QuotaExceeded { limit: 4, .. })
        ));
        fs.write(&at("/a"), b"abcd").await.unwrap();
        assert_eq!(fs.used_bytes().await, 4);
    }

    #[tokio::test]
    async fn test_instances_isolated() {
        let one = MemoryBackend::new();
        let two = MemoryBackend::new();
        one.write(&at("/shared.txt"), b"x").await.unwrap();
        assert!(!two.exists(&at("/shared.txt")).await.unwrap());
    }
}
