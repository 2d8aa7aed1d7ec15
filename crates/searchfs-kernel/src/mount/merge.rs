//! First-match-wins merging of live cells.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{join_all, select_all};
use tokio::sync::watch;

use super::{Mount, ReadDirOptions};
use crate::host::DirEntry;
use crate::live::{publish, Cell, LiveFile};
use crate::location::Resolution;

/// The merged value once every input has produced one.
///
/// Priority is input order: the first present location wins. `None` while
/// any input is still pending.
pub(crate) fn first_present(inputs: &[LiveFile]) -> Option<Resolution> {
    let mut winner = None;
    for input in inputs {
        let value = input.current()?;
        if winner.is_none() {
            winner = value;
        }
    }
    Some(winner)
}

/// Drive `tx` from `inputs` until every input has ended.
///
/// Publishes only when all inputs have a value, so a low-priority input that
/// answers first can never shadow a higher-priority one that is still
/// pending. An empty input list resolves to absent.
pub(crate) async fn merge_into(tx: &watch::Sender<Cell>, inputs: &mut [LiveFile]) {
    let mut open = vec![true; inputs.len()];

    loop {
        if let Some(value) = first_present(inputs) {
            publish(tx, value);
        }

        let waiters: Vec<_> = inputs
            .iter_mut()
            .zip(open.iter())
            .enumerate()
            .filter(|(_, (_, is_open))| **is_open)
            .map(|(i, (input, _))| {
                Box::pin(async move { (i, input.receiver_mut().changed().await.is_ok()) })
            })
            .collect();

        if waiters.is_empty() {
            // Every input is final, and so is the merged value
            return;
        }

        let ((i, still_open), _, _) = select_all(waiters).await;
        if !still_open {
            open[i] = false;
        }
    }
}

/// List `path` in every mount and merge by name, first mount wins.
///
/// Mounts that fail to list are skipped.
pub(crate) async fn union_listings(
    mounts: &[Arc<Mount>],
    path: &str,
    opts: &ReadDirOptions,
) -> Vec<DirEntry> {
    let listings = join_all(mounts.iter().map(|m| m.read_directory(path, opts))).await;

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for listing in listings {
        match listing {
            Ok(entries) => merged.extend(
                entries
                    .into_iter()
                    .filter(|entry| seen.insert(entry.name.clone())),
            ),
            Err(e) => tracing::debug!(path, error = %e, "skipping child listing"),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::PathTable;
    use crate::location::Location;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn host(p: &str) -> Resolution {
        Some(Location::Host(PathBuf::from(p)))
    }

    /// A live cell fed by the returned channel.
    fn controlled(table: &PathTable, key: &str) -> (mpsc::UnboundedSender<Resolution>, LiveFile) {
        let (feed, mut rx) = mpsc::unbounded_channel::<Resolution>();
        let live = table.subscribe(key.to_string(), move |tx| async move {
            while let Some(value) = rx.recv().await {
                publish(&tx, value);
            }
            std::future::pending::<()>().await;
        });
        (feed, live)
    }

    fn merged(inputs: Vec<LiveFile>) -> LiveFile {
        // The stream outlives the table; only the row cleanup is skipped
        let table = PathTable::default();
        table.subscribe("merged".to_string(), move |tx| async move {
            let mut inputs = inputs;
            merge_into(&tx, &mut inputs).await;
        })
    }

    #[test]
    fn test_first_present_waits_for_all() {
        assert_eq!(first_present(&[]), Some(None));
        assert_eq!(
            first_present(&[LiveFile::fixed(None), LiveFile::fixed(host("/b"))]),
            Some(host("/b"))
        );
        assert_eq!(
            first_present(&[LiveFile::fixed(host("/a")), LiveFile::fixed(host("/b"))]),
            Some(host("/a"))
        );
    }

    #[tokio::test]
    async fn test_empty_inputs_resolve_absent() {
        let mut live = merged(Vec::new());
        assert_eq!(live.resolved().await, None);
    }

    #[tokio::test]
    async fn test_low_priority_cannot_win_early() {
        let table = PathTable::default();
        let (high, high_live) = controlled(&table, "high");
        let (low, low_live) = controlled(&table, "low");
        let mut live = merged(vec![high_live, low_live]);

        low.send(host("/low")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(live.current(), None, "must wait for the high-priority input");

        high.send(host("/high")).unwrap();
        let value = tokio::time::timeout(Duration::from_secs(5), live.wait_for(|v| v.is_some()))
            .await
            .unwrap();
        assert_eq!(value, Some(host("/high")));
    }

    #[tokio::test]
    async fn test_falls_through_and_recovers() {
        let table = PathTable::default();
        let (high, high_live) = controlled(&table, "high");
        let mut live = merged(vec![high_live, LiveFile::fixed(host("/archive"))]);

        high.send(None).unwrap();
        let value = tokio::time::timeout(Duration::from_secs(5), live.wait_for(|v| v.is_some()))
            .await
            .unwrap();
        assert_eq!(value, Some(host("/archive")));

        high.send(host("/folder")).unwrap();
        let value = tokio::time::timeout(
            Duration::from_secs(5),
            live.wait_for(|v| *v == host("/folder")),
        )
        .await
        .unwrap();
        assert_eq!(value, Some(host("/folder")));

        high.send(None).unwrap();
        let value = tokio::time::timeout(
            Duration::from_secs(5),
            live.wait_for(|v| *v == host("/archive")),
        )
        .await
        .unwrap();
        assert_eq!(value, Some(host("/archive")));
    }

    #[tokio::test]
    async fn test_all_fixed_inputs_finish() {
        let mut live = merged(vec![LiveFile::fixed(None), LiveFile::fixed(None)]);
        assert_eq!(live.resolved().await, None);
        assert_eq!(live.changed().await, None);
    }
}
