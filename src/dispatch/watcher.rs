use super::DispatcherChain;
use crate::auth::{AuthorizationGate, CallerIdentity};
use crate::ipc::{self, Mailbox};
use crate::utils::is_valid_group_name;
use anyhow::{Context, Result};
use futures_util::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Host-side poller for every group's `tasks/` directory.
pub struct HostWatcher {
    chain: Arc<DispatcherChain>,
    gate: AuthorizationGate,
    scan_interval: Duration,
}

impl HostWatcher {
    pub fn new(
        chain: Arc<DispatcherChain>,
        gate: AuthorizationGate,
        scan_interval: Duration,
    ) -> Self {
        Self {
            chain,
            gate,
            scan_interval: scan_interval.max(Duration::from_millis(10)),
        }
    }

    fn mailbox(&self) -> &Mailbox {
        self.chain.mailbox()
    }

    /// Scan until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let root = self.mailbox().ipc_root();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create {}", root.display()))?;
        info!("host watcher scanning {} every {:?}", root.display(), self.scan_interval);

        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.scan_once().await {
                warn!("mailbox scan failed: {:#}", e);
            }
            tokio::select! {
                () = tokio::time::sleep(self.scan_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("host watcher stopped");
        Ok(())
    }

    /// One pass over all groups. Returns the number of request files consumed.
    pub async fn scan_once(&self) -> Result<usize> {
        let root = self.mailbox().ipc_root();
        let mut entries = match tokio::fs::read_dir(&root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e).with_context(|| format!("Failed to list {}", root.display())),
        };

        let mut groups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_valid_group_name(&name) && entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                groups.push(name);
            }
        }

        let counts = join_all(groups.iter().map(|g| self.process_group(g))).await;
        Ok(counts.into_iter().sum())
    }

    async fn process_group(&self, group: &str) -> usize {
        let tasks_dir = self.mailbox().tasks_dir(group);
        let pending = match ipc::list_pending(&tasks_dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!("cannot list requests for {}: {:#}", group, e);
                return 0;
            }
        };
        if pending.is_empty() {
            return 0;
        }

        let caller = self.gate.identify(group);
        let mut consumed = 0;
        for path in pending {
            self.process_file(&caller, &path).await;
            consumed += 1;
        }
        consumed
    }

    async fn process_file(&self, caller: &CallerIdentity, path: &Path) {
        let request = match ipc::read_request(path).await {
            Ok(request) => request,
            Err(e) => {
                error!("unreadable request from {}: {:#}", caller.group, e);
                self.quarantine(&caller.group, path).await;
                return;
            }
        };

        if request.source_group != caller.group || request.is_privileged != caller.is_privileged {
            warn!(
                "request {} claims {}/privileged={} but arrived via {}/privileged={}; using the latter",
                path.display(),
                request.source_group,
                request.is_privileged,
                caller.group,
                caller.is_privileged
            );
        }

        match self.chain.handle(&request, caller).await {
            Ok(true) => {}
            Ok(false) => warn!(
                "no dispatcher for request type {:?} from {}",
                request.kind, caller.group
            ),
            Err(e) => error!("{} request from {} failed: {:#}", request.kind, caller.group, e),
        }

        if let Err(e) = tokio::fs::remove_file(path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("failed to remove handled request {}: {}", path.display(), e);
        }
    }

    async fn quarantine(&self, group: &str, path: &Path) {
        let errors_dir = self.mailbox().errors_dir();
        let Some(file_name) = path.file_name() else {
            return;
        };
        let dest = errors_dir.join(format!("{}-{}", group, file_name.to_string_lossy()));
        let moved = async {
            tokio::fs::create_dir_all(&errors_dir).await?;
            tokio::fs::rename(path, &dest).await
        }
        .await;
        match moved {
            Ok(()) => debug!("quarantined {} as {}", path.display(), dest.display()),
            Err(e) => {
                warn!("failed to quarantine {}: {}; deleting", path.display(), e);
                let _ = tokio::fs::remove_file(path).await;
            }
        }
    }
}
