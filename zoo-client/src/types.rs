//! Records returned by coordination operations

/// A path that now exists along with all its ancestors
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mkdirp {
    pub path: String,
}

/// A freshly created node
///
/// For sequential modes `path` carries the suffix the service assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CreatedNode {
    pub path: String,
}

/// Final segment of a node path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub id: String,
}

impl NodeId {
    /// Extract the last `/`-separated segment of `path`.
    ///
    /// `"/a/b/c"` gives `"c"`, `"/"` gives the empty id.
    pub fn of(path: &str) -> Self {
        Self {
            id: path.rsplit('/').next().unwrap_or_default().to_string(),
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Children of `root`, sorted lexicographically
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildList {
    pub root: String,
    pub paths: Vec<String>,
}

impl ChildList {
    pub fn new(root: impl Into<String>, mut paths: Vec<String>) -> Self {
        paths.sort();
        Self {
            root: root.into(),
            paths,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// A node that was observed going away
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeletionObserved {
    pub path: String,
}
