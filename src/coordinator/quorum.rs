//! Quorum fan-out for replica reads and writes
//!
//! Each operation dispatches one task per target node. Tasks report on a channel
//! sized to the number of targets, so a report never blocks even after the
//! operation has returned. The operation waits on a single select over
//! {next result, effective deadline, cancellation} and returns as soon as the
//! threshold is met. Stragglers are not aborted: whatever they report after that
//! point is only logged and counted.

use crate::common::{
    dedup_versions, Error, QuorumError, QuorumFailure, QuorumOp, Result, VersionedRecord,
    METRICS,
};
use crate::coordinator::node_client::NodeClient;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Caller-side limits for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// External deadline; combined with the coordinator's own maximum
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl RequestOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: CancellationToken::new(),
        }
    }
}

pub struct QuorumCoordinator {
    client: Arc<dyn NodeClient>,
    max_duration: Duration,
}

impl QuorumCoordinator {
    pub fn new(client: Arc<dyn NodeClient>, max_duration: Duration) -> Self {
        Self {
            client,
            max_duration,
        }
    }

    /// The earlier of the caller's deadline and now + the internal maximum.
    pub fn effective_deadline(&self, external: Option<Instant>) -> Instant {
        let internal = Instant::now() + self.max_duration;
        match external {
            Some(deadline) => deadline.min(internal),
            None => internal,
        }
    }

    /// Replicate `version` to `replicas` and wait for `w - 1` acknowledgements.
    ///
    /// The coordinator's own durable write is the first acknowledgement, so
    /// `replicas` must not include it.
    pub async fn write_quorum(
        &self,
        replicas: &[String],
        key: &str,
        version: &VersionedRecord,
        w: usize,
        opts: &RequestOptions,
    ) -> Result<()> {
        let started = Instant::now();
        let needed = w.saturating_sub(1);
        let deadline = self.effective_deadline(opts.deadline);
        let version = Arc::new(version.clone());
        let key_owned = key.to_string();

        let result = self
            .fan_out(QuorumOp::Write, key, replicas, needed, deadline, &opts.cancel, |client, node| {
                let key = key_owned.clone();
                let version = version.clone();
                async move { client.write(&node, &key, &version).await }
            })
            .await;
        METRICS.quorum_write_latency.observe(started.elapsed());

        match result {
            Ok(acks) => {
                METRICS.quorum_writes_ok.inc();
                tracing::debug!(
                    key = %key,
                    acks = acks.len() + 1,
                    w,
                    "Write quorum satisfied"
                );
                Ok(())
            }
            Err(e) => {
                METRICS.quorum_writes_failed.inc();
                Err(e)
            }
        }
    }

    /// Read `key` from every node and return once `r` of them have answered.
    ///
    /// A node that holds nothing for the key still counts as an answer.
    /// Versions are tagged with the node they came from and deduplicated.
    pub async fn read_quorum(
        &self,
        nodes: &[String],
        key: &str,
        r: usize,
        opts: &RequestOptions,
    ) -> Result<Vec<VersionedRecord>> {
        let started = Instant::now();
        let deadline = self.effective_deadline(opts.deadline);
        let key_owned = key.to_string();

        let result = self
            .fan_out(QuorumOp::Read, key, nodes, r, deadline, &opts.cancel, |client, node| {
                let key = key_owned.clone();
                async move {
                    match client.read(&node, &key).await {
                        Ok(versions) => Ok(versions
                            .into_iter()
                            .map(|v| v.with_origin(node.clone()))
                            .collect()),
                        Err(Error::NotFound(_)) => Ok(Vec::new()),
                        Err(e) => Err(e),
                    }
                }
            })
            .await;
        METRICS.quorum_read_latency.observe(started.elapsed());

        match result {
            Ok(responses) => {
                METRICS.quorum_reads_ok.inc();
                let all: Vec<VersionedRecord> = responses
                    .into_iter()
                    .flat_map(|(_, versions)| versions)
                    .collect();
                Ok(dedup_versions(all))
            }
            Err(e) => {
                METRICS.quorum_reads_failed.inc();
                Err(e)
            }
        }
    }

    /// Dispatch `call` once per target and collect `needed` successes.
    #[allow(clippy::too_many_arguments)]
    async fn fan_out<T, F, Fut>(
        &self,
        op: QuorumOp,
        key: &str,
        targets: &[String],
        needed: usize,
        deadline: Instant,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<Vec<(String, T)>>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn NodeClient>, String) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let fail = |kind: QuorumFailure, got: usize, failed: Vec<(String, String)>| {
            match kind {
                QuorumFailure::Timeout => METRICS.quorum_timeouts.inc(),
                QuorumFailure::Cancelled => METRICS.quorum_cancellations.inc(),
                QuorumFailure::InsufficientAcks => {}
            }
            let err = QuorumError {
                op,
                kind,
                key: key.to_string(),
                needed,
                got,
                failed,
            };
            tracing::warn!("{}", err);
            Error::Quorum(err)
        };

        if targets.is_empty() {
            if needed == 0 {
                return Ok(Vec::new());
            }
            return Err(fail(QuorumFailure::InsufficientAcks, 0, Vec::new()));
        }

        let (tx, mut rx) = mpsc::channel::<(String, Result<T>)>(targets.len());

        for node in targets {
            let tx = tx.clone();
            let node = node.clone();
            let fut = call(self.client.clone(), node.clone());
            let key = key.to_string();
            tokio::spawn(async move {
                let result = fut.await;
                if let Err(TrySendError::Closed((node, result))) = tx.try_send((node, result)) {
                    // The operation already returned
                    METRICS.late_replica_results.inc();
                    match result {
                        Ok(_) => tracing::debug!(
                            node = %node, key = %key, op = %op, "Late replica success ignored"
                        ),
                        Err(e) => {
                            METRICS.late_replica_failures.inc();
                            tracing::warn!(
                                node = %node, key = %key, op = %op, error = %e,
                                "Late replica failure"
                            );
                        }
                    }
                }
            });
        }
        drop(tx);

        // Nothing to wait for; the dispatched calls finish in the background
        if needed == 0 {
            return Ok(Vec::new());
        }

        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        let mut successes = Vec::with_capacity(needed);
        let mut failed = Vec::new();
        let mut pending = targets.len();

        while successes.len() < needed {
            if pending == 0 {
                return Err(fail(QuorumFailure::InsufficientAcks, successes.len(), failed));
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return Err(fail(QuorumFailure::Cancelled, successes.len(), failed));
                }
                _ = &mut sleep => {
                    return Err(fail(QuorumFailure::Timeout, successes.len(), failed));
                }
                report = rx.recv() => match report {
                    Some((node, Ok(value))) => {
                        pending -= 1;
                        successes.push((node, value));
                    }
                    Some((node, Err(e))) => {
                        pending -= 1;
                        tracing::debug!(node = %node, key = %key, op = %op, error = %e, "Replica call failed");
                        failed.push((node, e.to_string()));
                    }
                    // Every task is gone without reporting (panicked)
                    None => {
                        return Err(fail(QuorumFailure::InsufficientAcks, successes.len(), failed));
                    }
                },
            }
        }

        Ok(successes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::VectorClock;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Per-node scripted behaviour: delay, then succeed or fail.
    #[derive(Clone, Copy)]
    enum Script {
        Ok(u64),
        Fail(u64),
        Hang,
    }

    #[derive(Default)]
    struct ScriptedClient {
        scripts: HashMap<String, Script>,
        data: Mutex<HashMap<String, Vec<VersionedRecord>>>,
        writes: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(scripts: &[(&str, Script)]) -> Self {
            Self {
                scripts: scripts.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
                ..Default::default()
            }
        }

        async fn behave(&self, node: &str) -> Result<()> {
            match self.scripts.get(node).copied().unwrap_or(Script::Ok(0)) {
                Script::Ok(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(())
                }
                Script::Fail(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Err(Error::Transport {
                        node: node.to_string(),
                        reason: "connection refused".into(),
                    })
                }
                Script::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
            }
        }
    }

    #[async_trait]
    impl NodeClient for ScriptedClient {
        async fn write(&self, node: &str, _key: &str, version: &VersionedRecord) -> Result<()> {
            self.behave(node).await?;
            self.writes.lock().unwrap().push(node.to_string());
            self.data
                .lock()
                .unwrap()
                .entry(node.to_string())
                .or_default()
                .push(version.clone());
            Ok(())
        }

        async fn read(&self, node: &str, key: &str) -> Result<Vec<VersionedRecord>> {
            self.behave(node).await?;
            match self.data.lock().unwrap().get(node) {
                Some(v) => Ok(v.clone()),
                None => Err(Error::NotFound(key.to_string())),
            }
        }
    }

    fn nodes(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn version() -> VersionedRecord {
        VersionedRecord::new("bar", [("A", 1)].into_iter().collect::<VectorClock>())
    }

    fn coordinator(client: ScriptedClient, max: Duration) -> (QuorumCoordinator, Arc<ScriptedClient>) {
        let client = Arc::new(client);
        (QuorumCoordinator::new(client.clone(), max), client)
    }

    fn quorum_kind(err: Error) -> QuorumFailure {
        match err {
            Error::Quorum(q) => q.kind,
            other => panic!("expected quorum error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_succeeds_with_w_minus_one_acks() {
        let (qc, _) = coordinator(
            ScriptedClient::new(&[("B", Script::Ok(0)), ("C", Script::Fail(0))]),
            Duration::from_secs(1),
        );
        qc.write_quorum(&nodes(&["B", "C"]), "foo", &version(), 2, &RequestOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_fails_when_all_replicas_fail() {
        let (qc, _) = coordinator(
            ScriptedClient::new(&[("B", Script::Fail(0)), ("C", Script::Fail(5))]),
            Duration::from_secs(1),
        );
        let err = qc
            .write_quorum(&nodes(&["B", "C"]), "foo", &version(), 2, &RequestOptions::default())
            .await
            .unwrap_err();
        match err {
            Error::Quorum(q) => {
                assert_eq!(q.kind, QuorumFailure::InsufficientAcks);
                assert_eq!(q.needed, 1);
                assert_eq!(q.got, 0);
                let mut failed = q.failed_nodes();
                failed.sort();
                assert_eq!(failed, vec!["B", "C"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_w1_replicates_in_background() {
        let (qc, client) = coordinator(
            ScriptedClient::new(&[("B", Script::Hang), ("C", Script::Ok(20))]),
            Duration::from_millis(10),
        );
        qc.write_quorum(&nodes(&["B", "C"]), "foo", &version(), 1, &RequestOptions::default())
            .await
            .unwrap();
        assert!(client.writes.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*client.writes.lock().unwrap(), vec!["C".to_string()]);
    }

    #[tokio::test]
    async fn test_write_times_out() {
        let (qc, _) = coordinator(
            ScriptedClient::new(&[("B", Script::Hang), ("C", Script::Hang)]),
            Duration::from_millis(30),
        );
        let err = qc
            .write_quorum(&nodes(&["B", "C"]), "foo", &version(), 2, &RequestOptions::default())
            .await
            .unwrap_err();
        assert_eq!(quorum_kind(err), QuorumFailure::Timeout);
    }

    #[tokio::test]
    async fn test_shorter_external_deadline_governs() {
        let (qc, _) = coordinator(
            ScriptedClient::new(&[("B", Script::Hang)]),
            Duration::from_secs(30),
        );
        let start = Instant::now();
        let err = qc
            .write_quorum(
                &nodes(&["B"]),
                "foo",
                &version(),
                2,
                &RequestOptions::with_timeout(Duration::from_millis(20)),
            )
            .await
            .unwrap_err();
        assert_eq!(quorum_kind(err), QuorumFailure::Timeout);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_effective_deadline_is_minimum() {
        let (qc, _) = coordinator(ScriptedClient::default(), Duration::from_secs(10));
        let soon = Instant::now() + Duration::from_millis(5);
        assert_eq!(qc.effective_deadline(Some(soon)), soon);
        let later = Instant::now() + Duration::from_secs(60);
        assert!(qc.effective_deadline(Some(later)) < later);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_wait() {
        let (qc, _) = coordinator(
            ScriptedClient::new(&[("B", Script::Hang)]),
            Duration::from_secs(30),
        );
        let opts = RequestOptions::default();
        opts.cancel.cancel();
        let err = qc
            .write_quorum(&nodes(&["B"]), "foo", &version(), 2, &opts)
            .await
            .unwrap_err();
        assert_eq!(quorum_kind(err), QuorumFailure::Cancelled);
    }

    #[tokio::test]
    async fn test_write_returns_before_stragglers() {
        let (qc, client) = coordinator(
            ScriptedClient::new(&[("B", Script::Ok(0)), ("C", Script::Ok(200))]),
            Duration::from_secs(5),
        );
        qc.write_quorum(&nodes(&["B", "C"]), "foo", &version(), 2, &RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(*client.writes.lock().unwrap(), vec!["B"]);

        // The straggler still completes in the background
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(client.writes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_read_counts_not_found_as_answer() {
        let (qc, client) = coordinator(ScriptedClient::default(), Duration::from_secs(1));
        client
            .data
            .lock()
            .unwrap()
            .insert("B".into(), vec![version()]);

        let versions = qc
            .read_quorum(&nodes(&["A", "B", "C"]), "foo", 3, &RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].origin_node.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_read_dedups_identical_versions() {
        let (qc, client) = coordinator(ScriptedClient::default(), Duration::from_secs(1));
        let v = version();
        {
            let mut data = client.data.lock().unwrap();
            for node in ["A", "B", "C"] {
                data.insert(node.into(), vec![v.clone()]);
            }
        }
        let versions = qc
            .read_quorum(&nodes(&["A", "B", "C"]), "foo", 3, &RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
        assert!(versions[0].origin_node.is_some());
    }

    #[tokio::test]
    async fn test_read_fails_below_r() {
        let (qc, _) = coordinator(
            ScriptedClient::new(&[
                ("A", Script::Ok(0)),
                ("B", Script::Fail(0)),
                ("C", Script::Fail(0)),
            ]),
            Duration::from_secs(1),
        );
        let err = qc
            .read_quorum(&nodes(&["A", "B", "C"]), "foo", 2, &RequestOptions::default())
            .await
            .unwrap_err();
        assert_eq!(quorum_kind(err), QuorumFailure::InsufficientAcks);
    }

    #[tokio::test]
    async fn test_read_with_no_targets_fails() {
        let (qc, _) = coordinator(ScriptedClient::default(), Duration::from_secs(1));
        let err = qc
            .read_quorum(&[], "foo", 1, &RequestOptions::default())
            .await
            .unwrap_err();
        assert_eq!(quorum_kind(err), QuorumFailure::InsufficientAcks);
    }
}
