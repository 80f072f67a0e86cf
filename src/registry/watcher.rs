use crate::registry::ResourceRegistry;
use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Debounce window for file system events.
const DEBOUNCE_MS: u64 = 400;

/// Reload `registry` whenever its mapping file changes.
///
/// The watcher monitors the **parent directory** to handle write-to-temp-then-rename
/// updates. Only events naming the mapping file trigger a reload; a reload that
/// fails to parse keeps the previous snapshot.
pub fn start_watching(registry: Arc<ResourceRegistry>) -> Result<JoinHandle<()>> {
    let path = registry.path().to_path_buf();
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("cannot create mapping dir {}", parent.display()))?;
    let filename = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("mapping path has no filename"))?
        .to_os_string();

    // Bridge notify's callback thread to a tokio mpsc so we can await events
    let (bridge_tx, mut bridge_rx) = tokio::sync::mpsc::channel(64);
    let mut watcher: RecommendedWatcher = Watcher::new(
        move |res| {
            let _ = bridge_tx.blocking_send(res);
        },
        notify::Config::default(),
    )
    .context("failed to create file watcher")?;
    watcher
        .watch(&parent, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch directory: {}", parent.display()))?;

    let handle = tokio::spawn(async move {
        // Keep watcher alive for the duration of the task
        let _watcher = watcher;

        loop {
            let event = match bridge_rx.recv().await {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    warn!("mapping watcher error: {}", e);
                    continue;
                }
                None => {
                    debug!("mapping watcher channel closed, stopping");
                    break;
                }
            };

            if !matches!(
                event.kind,
                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
            ) {
                continue;
            }
            let is_our_file = event
                .paths
                .iter()
                .any(|p| p.file_name().is_some_and(|f| f == filename));
            if !is_our_file {
                continue;
            }

            tokio::time::sleep(tokio::time::Duration::from_millis(DEBOUNCE_MS)).await;
            while bridge_rx.try_recv().is_ok() {}

            if let Err(e) = registry.reload() {
                warn!("mapping reload failed (keeping previous mappings): {}", e);
            }
        }
    });

    info!("mapping watcher started for {}", path.display());
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn picks_up_file_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mappings.json");
        std::fs::write(&path, "[]").unwrap();
        let registry = Arc::new(ResourceRegistry::load(&path).unwrap());
        let handle = start_watching(Arc::clone(&registry)).unwrap();

        std::fs::write(
            &path,
            r#"[{"externalId": "C1", "ownerGroup": "g1", "isPrivileged": false}]"#,
        )
        .unwrap();

        let mut seen = false;
        for _ in 0..50 {
            if registry.find_by_external_id("C1").is_some() {
                seen = true;
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
        handle.abort();
        assert!(seen, "watcher did not reload the mapping file");
    }

    #[test]
    fn rejects_path_without_filename() {
        let registry = Arc::new(ResourceRegistry::from_mappings(vec![]));
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = rt.block_on(async { start_watching(registry) });
        assert!(result.is_err());
    }
}
