//! In-memory tree of a storage backend's directories and files.
//!
//! [`walk`] lists each directory exactly once and keeps the result, so
//! later traversals and renders never go back to the backend for listings.
//! Every node records its full backend path and its path relative to the
//! walk root when it is built, which is all a parent link would be used for.

use std::fmt::Write as _;

use futures::future::{BoxFuture, FutureExt};
use tracing::warn;

use super::backend::{join_path, StorageBackend};
use crate::error::StorageError;

/// Placeholder rendered when a storage listing cannot be produced.
pub const FAILED_TO_READ_STORAGE: &str = "failed to read storage";

/// Pseudo-entry some backends report for the directory being listed.
const SELF_REFERENCE: &str = ".";

const INDENT: &str = "    ";

/// A file leaf in a storage tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFile {
    name: String,
    path: String,
    relative: String,
}

impl StorageFile {
    /// File name, i.e. the path relative to the parent directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path on the backend.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path relative to the walk root.
    pub fn relative_path(&self) -> &str {
        &self.relative
    }
}

/// A directory in a storage tree. Owns its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDirectory {
    name: String,
    path: String,
    relative: String,
    children: Vec<StorageNode>,
}

/// Either kind of node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageNode {
    Directory(StorageDirectory),
    File(StorageFile),
}

/// A borrowed view of a node, as yielded by tree traversals.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Directory(&'a StorageDirectory),
    File(&'a StorageFile),
}

impl StorageNode {
    /// Borrows this node as a [`NodeRef`].
    pub fn as_ref(&self) -> NodeRef<'_> {
        match self {
            StorageNode::Directory(directory) => NodeRef::Directory(directory),
            StorageNode::File(file) => NodeRef::File(file),
        }
    }
}

impl<'a> NodeRef<'a> {
    /// Short display name: the path relative to the parent.
    pub fn name(&self) -> &'a str {
        match self {
            NodeRef::Directory(directory) => &directory.name,
            NodeRef::File(file) => &file.name,
        }
    }

    /// Full path on the backend.
    pub fn path(&self) -> &'a str {
        match self {
            NodeRef::Directory(directory) => &directory.path,
            NodeRef::File(file) => &file.path,
        }
    }

    /// Path relative to the walk root (empty for the root itself).
    pub fn relative_path(&self) -> &'a str {
        match self {
            NodeRef::Directory(directory) => &directory.relative,
            NodeRef::File(file) => &file.relative,
        }
    }
}

/// Pre-order traversal yielding each node with its depth below the start.
pub struct PreOrder<'a> {
    stack: Vec<(NodeRef<'a>, usize)>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = (NodeRef<'a>, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, depth) = self.stack.pop()?;
        if let NodeRef::Directory(directory) = node {
            for child in directory.children.iter().rev() {
                self.stack.push((child.as_ref(), depth + 1));
            }
        }
        Some((node, depth))
    }
}

impl StorageDirectory {
    /// Directory name, i.e. the path relative to the parent. The root
    /// carries the base path it was walked from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path on the backend.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path relative to the walk root (empty for the root itself).
    pub fn relative_path(&self) -> &str {
        &self.relative
    }

    /// Direct children, subdirectories first.
    pub fn children(&self) -> &[StorageNode] {
        &self.children
    }

    /// Files directly inside this directory.
    pub fn files(&self) -> impl Iterator<Item = &StorageFile> {
        self.children.iter().filter_map(|child| match child {
            StorageNode::File(file) => Some(file),
            StorageNode::Directory(_) => None,
        })
    }

    /// Every node below and including this directory, in pre-order.
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            stack: vec![(NodeRef::Directory(self), 0)],
        }
    }

    /// All directories in pre-order, optionally starting with this one.
    pub fn directory_descendants(
        &self,
        include_self: bool,
    ) -> impl Iterator<Item = &StorageDirectory> {
        self.iter()
            .skip(usize::from(!include_self))
            .filter_map(|(node, _)| match node {
                NodeRef::Directory(directory) => Some(directory),
                NodeRef::File(_) => None,
            })
    }

    /// All files in pre-order.
    pub fn file_descendants(&self) -> impl Iterator<Item = &StorageFile> {
        self.iter().filter_map(|(node, _)| match node {
            NodeRef::File(file) => Some(file),
            NodeRef::Directory(_) => None,
        })
    }

    /// Plain-text view: one line per node, indented by depth.
    pub fn render(&self) -> String {
        self.iter()
            .map(|(node, depth)| format!("{}{}", INDENT.repeat(depth), node.name()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// HTML view: files link to their backend URL, directories are plain labels.
    pub fn render_html(&self, backend: &dyn StorageBackend) -> Result<String, StorageError> {
        let mut html = String::from("<div class=\"storage-tree\">\n");

        for (node, depth) in self.iter() {
            let label = escape_html(node.name());
            let body = match node {
                NodeRef::Directory(_) => label,
                NodeRef::File(file) => format!(
                    "<a href=\"{}\">{}</a>",
                    escape_html(&backend.url(file.path())?),
                    label
                ),
            };
            // Writing into a String cannot fail.
            let _ = writeln!(
                html,
                "<div style=\"padding-left: {}em\">{}</div>",
                depth * 2,
                body
            );
        }

        html.push_str("</div>");
        Ok(html)
    }
}

/// Builds the tree below `base` with one `list_children` call per directory.
///
/// `"."` self-reference entries reported by the backend are skipped.
/// Sibling order follows the backend and should not be relied on.
pub fn walk<'a>(
    base: &'a str,
    backend: &'a dyn StorageBackend,
) -> BoxFuture<'a, Result<StorageDirectory, StorageError>> {
    walk_directory(base.to_string(), base.to_string(), String::new(), backend)
}

fn walk_directory(
    name: String,
    path: String,
    relative: String,
    backend: &dyn StorageBackend,
) -> BoxFuture<'_, Result<StorageDirectory, StorageError>> {
    async move {
        let listing = backend.list_children(&path).await?;
        let mut children = Vec::with_capacity(listing.directories.len() + listing.files.len());

        for subdirectory in listing.directories {
            if subdirectory == SELF_REFERENCE || subdirectory.is_empty() {
                continue;
            }
            let child = walk_directory(
                subdirectory.clone(),
                join_path(&path, &subdirectory),
                join_path(&relative, &subdirectory),
                backend,
            )
            .await?;
            children.push(StorageNode::Directory(child));
        }

        for filename in listing.files {
            children.push(StorageNode::File(StorageFile {
                path: join_path(&path, &filename),
                relative: join_path(&relative, &filename),
                name: filename,
            }));
        }

        Ok(StorageDirectory {
            name,
            path,
            relative,
            children,
        })
    }
    .boxed()
}

/// Walks `base` and renders it as text, or the failure placeholder.
pub async fn render_listing(base: &str, backend: &dyn StorageBackend) -> String {
    match walk(base, backend).await {
        Ok(tree) => tree.render(),
        Err(e) => {
            warn!("Could not read storage at '{}': {}", base, e);
            FAILED_TO_READ_STORAGE.to_string()
        }
    }
}

/// Walks `base` and renders it as HTML, or the failure placeholder.
pub async fn render_listing_html(base: &str, backend: &dyn StorageBackend) -> String {
    let rendered = match walk(base, backend).await {
        Ok(tree) => tree.render_html(backend),
        Err(e) => Err(e),
    };

    rendered.unwrap_or_else(|e| {
        warn!("Could not render storage at '{}': {}", base, e);
        format!("<p>{}</p>", FAILED_TO_READ_STORAGE)
    })
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}
