//! Lazy traversal of a remote directory tree

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use store_core::{DirEntry, Result};
use tracing::debug;

use crate::layout::join;
use crate::session::RemoteSession;

/// One visited directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Path of the directory that was listed
    pub dir: String,

    /// Paths of the child directories queued for a later visit
    pub subdirs: Vec<String>,

    /// Non-directory entries of `dir`
    pub files: Vec<DirEntry>,
}

/// Walk the tree below `base`, one directory per stream item
///
/// Uses an explicit work list, so tree depth does not grow the call stack.
/// Visit order is unspecified. Every call starts a fresh walk.
pub fn walk(
    session: Arc<dyn RemoteSession>,
    base: String,
) -> BoxStream<'static, Result<WalkEntry>> {
    walk_pruned(session, base, |_: &str| true)
}

/// Like [`walk`], but only descends into child directories for which
/// `descend` returns true
///
/// `base` itself is always listed.
pub fn walk_pruned<F>(
    session: Arc<dyn RemoteSession>,
    base: String,
    descend: F,
) -> BoxStream<'static, Result<WalkEntry>>
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    let descend = Arc::new(descend);
    stream::try_unfold((session, vec![base]), move |(session, to_visit)| {
        visit_next(session, to_visit, descend.clone())
    })
    .boxed()
}

type WalkState = (Arc<dyn RemoteSession>, Vec<String>);

async fn visit_next<F>(
    session: Arc<dyn RemoteSession>,
    mut to_visit: Vec<String>,
    descend: Arc<F>,
) -> Result<Option<(WalkEntry, WalkState)>>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    let Some(dir) = to_visit.pop() else {
        return Ok(None);
    };

    let mut subdirs = Vec::new();
    let mut files = Vec::new();
    for entry in session.list_entries(&dir).await? {
        if !entry.is_dir {
            files.push(entry);
            continue;
        }
        let path = join(&dir, &entry.name);
        if descend(&path) {
            subdirs.push(path);
        } else {
            debug!(%path, "Skipping directory");
        }
    }
    to_visit.extend(subdirs.iter().cloned());
    debug!(%dir, files = files.len(), pending = to_visit.len(), "Walked directory");

    let item = WalkEntry {
        dir,
        subdirs,
        files,
    };
    Ok(Some((item, (session, to_visit))))
}
