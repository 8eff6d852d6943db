//! Upload engine — resolves each local record to a VNDB id and pushes its
//! status to the user's list on a bounded worker pool.
//!
//! Workers run the per-record pipeline (resolve → build payload → submit)
//! concurrently; a single collector loop owns the durable cursor and the
//! failure log, so state writes are serialized by construction even though
//! records complete out of order.

pub mod cursor;
pub mod error;
pub mod failures;
pub mod progress;

use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::record::{FailureRecord, LocalRecord, UpdatePayload};
use crate::resolve::TitleResolver;
use crate::vndb::{VndbClient, VndbError};

use cursor::CursorTracker;
use failures::FailureLog;
use progress::ProgressStore;

/// Subset of application config consumed by the engine. Decoupled from CLI
/// and config-file parsing so the engine can be tested on its own.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding the input data; the cursor and failure log live
    /// next to it.
    pub data_dir: PathBuf,
    pub concurrency: usize,
    /// Fetch the remote list once up front and skip records already on it.
    pub skip_existing: bool,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

/// Counts for the end-of-run summary.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncStats {
    pub uploaded: u64,
    pub already_listed: u64,
    pub unresolved: u64,
    pub failed: u64,
    /// Durable cursor position after the run.
    pub cursor: usize,
    pub interrupted: bool,
}

/// Terminal state of one record's trip through the engine.
enum Outcome {
    Uploaded(String),
    AlreadyListed(String),
    Unresolved,
    Failed(String),
}

pub struct SyncEngine {
    client: Arc<VndbClient>,
    config: SyncConfig,
    progress: ProgressStore,
    failures: FailureLog,
}

impl SyncEngine {
    pub fn new(client: Arc<VndbClient>, config: SyncConfig) -> Self {
        let progress = ProgressStore::new(&config.data_dir);
        let failures = FailureLog::new(&config.data_dir);
        Self {
            client,
            config,
            progress,
            failures,
        }
    }

    pub fn failure_log_path(&self) -> &Path {
        self.failures.path()
    }

    /// Process every record at or after the persisted cursor.
    ///
    /// The cursor is advanced per the commit-watermark discipline of
    /// [`CursorTracker`]: it follows accepted records in input order and
    /// stops at the first one that terminally failed, so a resumed run
    /// re-covers everything that was not confirmed.
    pub async fn run(
        &self,
        records: &[LocalRecord],
        shutdown: CancellationToken,
    ) -> anyhow::Result<SyncStats> {
        let start = self.progress.load();
        let mut stats = SyncStats {
            cursor: start,
            ..Default::default()
        };

        if start >= records.len() {
            tracing::info!(
                cursor = start,
                total = records.len(),
                "cursor is already past the input, nothing to upload"
            );
            return Ok(stats);
        }

        tracing::info!(
            total = records.len(),
            cursor = start,
            concurrency = self.config.concurrency,
            "starting upload pass"
        );

        if self.config.dry_run {
            for (index, record) in records.iter().enumerate().skip(start) {
                tracing::info!("[DRY RUN] would sync #{}: {}", index, record.title);
            }
            return Ok(stats);
        }

        let listed = if self.config.skip_existing {
            self.fetch_listed_ids().await
        } else {
            HashSet::new()
        };

        let pb = create_progress_bar(
            self.config.no_progress_bar,
            (records.len() - start) as u64,
        );

        let mut tracker = CursorTracker::new(start);
        let client = self.client.as_ref();
        let listed = &listed;

        // Cancellation stops intake only; records already in flight drain
        // normally so their outcomes still reach the cursor and the log.
        let mut outcomes = stream::iter(records.iter().enumerate().skip(start))
            .take_while(|_| std::future::ready(!shutdown.is_cancelled()))
            .map(|(index, record)| async move {
                let outcome = process_record(client, listed, record).await;
                (index, record, outcome)
            })
            .buffer_unordered(self.config.concurrency);

        while let Some((index, record, outcome)) = outcomes.next().await {
            pb.set_message(record.title.clone());
            let accepted = match outcome {
                Outcome::Uploaded(id) => {
                    pb.suspend(|| {
                        tracing::info!(index, id = %id, title = %record.title, "uploaded")
                    });
                    stats.uploaded += 1;
                    true
                }
                Outcome::AlreadyListed(id) => {
                    pb.suspend(|| {
                        tracing::debug!(index, id = %id, title = %record.title, "already on the list, skipped")
                    });
                    stats.already_listed += 1;
                    true
                }
                Outcome::Unresolved => {
                    pb.suspend(|| {
                        tracing::warn!(index, title = %record.title, "no VNDB entry found")
                    });
                    self.failures.append(FailureRecord::unresolved(record))?;
                    stats.unresolved += 1;
                    false
                }
                Outcome::Failed(reason) => {
                    pb.suspend(|| {
                        tracing::error!(index, title = %record.title, %reason, "upload failed")
                    });
                    self.failures
                        .append(FailureRecord::upload_failed(record, &reason))?;
                    stats.failed += 1;
                    false
                }
            };

            if let Some(next_index) = tracker.complete(index, accepted) {
                self.progress.save(next_index)?;
            }
            pb.inc(1);
        }
        drop(outcomes);
        pb.finish_and_clear();

        stats.cursor = tracker.position();
        stats.interrupted = shutdown.is_cancelled();
        if stats.interrupted {
            tracing::info!(cursor = stats.cursor, "upload pass interrupted, resumable");
        }
        if tracker.is_pinned() {
            tracing::warn!(
                cursor = stats.cursor,
                "cursor pinned at the first failed record; a rerun retries it"
            );
        }
        Ok(stats)
    }

    /// Ids already on the user's remote list. Purely an optimization to
    /// avoid redundant writes — any failure degrades to an empty set.
    async fn fetch_listed_ids(&self) -> HashSet<String> {
        let result = async {
            let user_id = self.client.auth_info().await?;
            let entries = self.client.user_list(&user_id, false).await?;
            Ok::<_, VndbError>(entries.into_iter().map(|e| e.id).collect::<HashSet<_>>())
        }
        .await;

        match result {
            Ok(ids) => {
                tracing::info!(count = ids.len(), "fetched remote list for duplicate skipping");
                ids
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not fetch remote list, continuing without skipping");
                HashSet::new()
            }
        }
    }
}

/// One record through the full state machine. All errors end in a terminal
/// outcome here; nothing transient leaks to the collector.
async fn process_record(
    client: &VndbClient,
    listed: &HashSet<String>,
    record: &LocalRecord,
) -> Outcome {
    let resolver = TitleResolver::new(client);
    let resolved = match resolver
        .resolve(&record.title, record.title_alt.as_deref())
        .await
    {
        Ok(resolved) => resolved,
        Err(e) => return Outcome::Failed(format!("resolution failed: {}", e)),
    };
    let Some(vn_id) = resolved else {
        return Outcome::Unresolved;
    };

    if listed.contains(&vn_id) {
        return Outcome::AlreadyListed(vn_id);
    }

    let payload = UpdatePayload::from_record(record, vn_id.clone());
    match client.patch_user_entry(&payload).await {
        Ok(()) => Outcome::Uploaded(vn_id),
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

/// Download the user's list with titles and write it as a JSON export.
pub async fn export_remote_list(client: &VndbClient, output: &Path) -> anyhow::Result<usize> {
    let user_id = client.auth_info().await?;
    let entries = client.user_list(&user_id, true).await?;

    let data: Vec<_> = entries
        .iter()
        .map(|entry| json!({"id": entry.id, "title": entry.title}))
        .collect();
    let body = serde_json::to_string_pretty(&json!({ "data": data }))?;
    std::fs::write(output, body)
        .with_context(|| format!("failed to write {}", output.display()))?;

    tracing::info!(count = entries.len(), path = %output.display(), "wrote list export");
    Ok(entries.len())
}

/// Progress bar for the upload loop; hidden when disabled or when stdout is
/// not a TTY so piped output stays clean.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("valid template")
        .progress_chars("=> "),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Label;
    use crate::vndb::testing::{reply_json, reply_status, test_client, ScriptedTransport, SentRequest};
    use crate::vndb::TransportError;
    use reqwest::Method;

    fn record(title: &str, labels: Vec<Label>, rating: Option<u8>) -> LocalRecord {
        LocalRecord {
            title: title.to_string(),
            title_alt: None,
            labels,
            rating,
            completed_on: None,
        }
    }

    fn engine_config(dir: &Path, skip_existing: bool) -> SyncConfig {
        SyncConfig {
            data_dir: dir.to_path_buf(),
            concurrency: 3,
            skip_existing,
            dry_run: false,
            no_progress_bar: true,
        }
    }

    fn term_of(request: &SentRequest) -> String {
        request.body.as_ref().map(|b| b["filters"][2].as_str().unwrap_or_default().to_string()).unwrap_or_default()
    }

    /// Transport scripted for the two-record happy path: "Foo Game" hits on
    /// the first exact search, "Ba[]r!" only via its trailing truncation.
    fn happy_path_transport() -> Arc<ScriptedTransport> {
        ScriptedTransport::new(|request, _| match request.url.as_str() {
            "authinfo" => reply_json(json!({"id": "u1"})),
            "ulist" => reply_json(json!({"results": [], "more": false})),
            "vn" => match term_of(request).as_str() {
                "Foo Game" => reply_json(json!({"results": [{"id": "v17", "title": "Foo Game"}]})),
                "r" => reply_json(json!({"results": [{"id": "v42", "title": "r"}]})),
                _ => reply_json(json!({"results": []})),
            },
            "release" => reply_json(json!({"results": []})),
            path if path.starts_with("ulist/") => reply_status(200, "{}"),
            other => panic!("unexpected request to {}", other),
        })
    }

    fn two_records() -> Vec<LocalRecord> {
        vec![
            record("Foo Game", vec![Label::Playing], None),
            record("Ba[]r!", vec![Label::Finished], Some(9)),
        ]
    }

    #[tokio::test]
    async fn test_end_to_end_two_records() {
        let dir = tempfile::tempdir().unwrap();
        let transport = happy_path_transport();
        let engine = SyncEngine::new(
            Arc::new(test_client(transport.clone())),
            engine_config(dir.path(), true),
        );

        let stats = engine
            .run(&two_records(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.uploaded, 2);
        assert_eq!(stats.unresolved, 0);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.cursor, 2);
        assert!(!stats.interrupted);

        // Durable state: cursor at 2, failure log empty.
        assert_eq!(ProgressStore::new(dir.path()).load(), 2);
        assert!(FailureLog::new(dir.path()).entries().is_empty());

        // The second record's update carries the converted vote.
        let patches: Vec<SentRequest> = transport
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::PATCH)
            .collect();
        assert_eq!(patches.len(), 2);
        let bar = patches.iter().find(|r| r.url.ends_with("ulist/v42")).unwrap();
        let body = bar.body.as_ref().unwrap();
        assert_eq!(body["labels_set"], json!([2]));
        assert_eq!(body["vote"], json!(90));
        assert!(body.get("finished").is_none());
    }

    #[tokio::test]
    async fn test_unresolved_record_logged_and_pins_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(|request, _| match request.url.as_str() {
            "vn" | "release" => reply_json(json!({"results": []})),
            _ => reply_json(json!({"results": [], "more": false})),
        });
        let engine = SyncEngine::new(
            Arc::new(test_client(transport)),
            engine_config(dir.path(), false),
        );

        let records = vec![record("Nowhere To Be Found", vec![Label::Wishlist], None)];
        let stats = engine.run(&records, CancellationToken::new()).await.unwrap();

        assert_eq!(stats.unresolved, 1);
        assert_eq!(stats.cursor, 0);

        let failures = FailureLog::new(dir.path()).entries();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].reason.contains("unresolved"));
        // The cursor never advanced past the failed record.
        assert_eq!(ProgressStore::new(dir.path()).load(), 0);
    }

    #[tokio::test]
    async fn test_failure_pins_cursor_but_later_records_still_upload() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(|request, _| match request.url.as_str() {
            "vn" => match term_of(request).as_str() {
                "Good Game" => reply_json(json!({"results": [{"id": "v5", "title": "Good Game"}]})),
                _ => reply_json(json!({"results": []})),
            },
            "release" => reply_json(json!({"results": []})),
            path if path.starts_with("ulist/") => reply_status(200, "{}"),
            other => panic!("unexpected request to {}", other),
        });
        let engine = SyncEngine::new(
            Arc::new(test_client(transport)),
            engine_config(dir.path(), false),
        );

        let records = vec![
            record("Nowhere To Be Found", vec![Label::Playing], None),
            record("Good Game", vec![Label::Playing], None),
        ];
        let stats = engine.run(&records, CancellationToken::new()).await.unwrap();

        assert_eq!(stats.unresolved, 1);
        assert_eq!(stats.uploaded, 1);
        // Watermark pinned at the failed index despite the later success.
        assert_eq!(stats.cursor, 0);
        assert_eq!(ProgressStore::new(dir.path()).load(), 0);
    }

    #[tokio::test]
    async fn test_pre_filter_skips_already_listed_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(|request, _| match request.url.as_str() {
            "authinfo" => reply_json(json!({"id": "u1"})),
            "ulist" => reply_json(json!({"results": [{"id": "v17"}], "more": false})),
            "vn" => reply_json(json!({"results": [{"id": "v17", "title": "Foo Game"}]})),
            other => panic!("unexpected request to {}", other),
        });
        let engine = SyncEngine::new(
            Arc::new(test_client(transport.clone())),
            engine_config(dir.path(), true),
        );

        let records = vec![record("Foo Game", vec![Label::Playing], None)];
        let stats = engine.run(&records, CancellationToken::new()).await.unwrap();

        assert_eq!(stats.already_listed, 1);
        assert_eq!(stats.uploaded, 0);
        assert_eq!(stats.cursor, 1);
        assert!(transport.requests().iter().all(|r| r.method != Method::PATCH));
    }

    #[tokio::test]
    async fn test_resume_starts_at_persisted_cursor() {
        let dir = tempfile::tempdir().unwrap();
        ProgressStore::new(dir.path()).save(1).unwrap();

        let transport = happy_path_transport();
        let engine = SyncEngine::new(
            Arc::new(test_client(transport.clone())),
            engine_config(dir.path(), false),
        );

        let stats = engine
            .run(&two_records(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.uploaded, 1);
        assert_eq!(stats.cursor, 2);
        // Nothing ever searched for the first record.
        assert!(transport.requests().iter().all(|r| term_of(r) != "Foo Game"));
    }

    #[tokio::test]
    async fn test_rerun_with_finished_cursor_makes_no_requests() {
        let dir = tempfile::tempdir().unwrap();
        ProgressStore::new(dir.path()).save(2).unwrap();

        let transport = happy_path_transport();
        let engine = SyncEngine::new(
            Arc::new(test_client(transport.clone())),
            engine_config(dir.path(), true),
        );

        let stats = engine
            .run(&two_records(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.uploaded, 0);
        assert_eq!(stats.cursor, 2);
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_submission_rejection_recorded_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(|request, _| match request.url.as_str() {
            "vn" => reply_json(json!({"results": [{"id": "v9", "title": "Foo"}]})),
            path if path.starts_with("ulist/") => reply_status(400, "invalid vote"),
            other => panic!("unexpected request to {}", other),
        });
        let engine = SyncEngine::new(
            Arc::new(test_client(transport)),
            engine_config(dir.path(), false),
        );

        let records = vec![record("Foo", vec![Label::Playing], None)];
        let stats = engine.run(&records, CancellationToken::new()).await.unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cursor, 0);
        let failures = FailureLog::new(dir.path()).entries();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].reason.contains("400"));
    }

    #[tokio::test]
    async fn test_hard_client_error_becomes_failure_record() {
        let dir = tempfile::tempdir().unwrap();
        // Every search times out until the bounded budget is gone.
        let transport = ScriptedTransport::new(|_, _| {
            Err(TransportError::Other("operation timed out".to_string()))
        });
        let engine = SyncEngine::new(
            Arc::new(test_client(transport)),
            engine_config(dir.path(), false),
        );

        let records = vec![record("Foo", vec![Label::Playing], None)];
        let stats = engine.run(&records, CancellationToken::new()).await.unwrap();

        assert_eq!(stats.failed, 1);
        let failures = FailureLog::new(dir.path()).entries();
        assert!(failures[0].reason.contains("resolution failed"));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_intake() {
        let dir = tempfile::tempdir().unwrap();
        let transport = happy_path_transport();
        let engine = SyncEngine::new(
            Arc::new(test_client(transport.clone())),
            engine_config(dir.path(), false),
        );

        let token = CancellationToken::new();
        token.cancel();
        let stats = engine.run(&two_records(), token).await.unwrap();

        assert!(stats.interrupted);
        assert_eq!(stats.uploaded, 0);
        assert_eq!(transport.count(), 0);
        assert_eq!(ProgressStore::new(dir.path()).load(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let transport = happy_path_transport();
        let mut config = engine_config(dir.path(), true);
        config.dry_run = true;
        let engine = SyncEngine::new(Arc::new(test_client(transport.clone())), config);

        let stats = engine
            .run(&two_records(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.uploaded, 0);
        assert_eq!(transport.count(), 0);
        assert!(!dir.path().join(progress::PROGRESS_FILE).exists());
    }

    #[tokio::test]
    async fn test_pre_filter_fetch_failure_degrades_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(|request, _| match request.url.as_str() {
            // authinfo is down for good; the engine must go on without the
            // skip set.
            "authinfo" => reply_status(503, "down"),
            "vn" => reply_json(json!({"results": [{"id": "v3", "title": "Foo"}]})),
            path if path.starts_with("ulist/") => reply_status(200, "{}"),
            other => panic!("unexpected request to {}", other),
        });
        let engine = SyncEngine::new(
            Arc::new(test_client(transport)),
            engine_config(dir.path(), true),
        );

        let records = vec![record("Foo", vec![Label::Playing], None)];
        let stats = engine.run(&records, CancellationToken::new()).await.unwrap();

        assert_eq!(stats.uploaded, 1);
        assert_eq!(stats.cursor, 1);
    }

    #[tokio::test]
    async fn test_export_remote_list_writes_data_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(|request, _| match request.url.as_str() {
            "authinfo" => reply_json(json!({"id": "u1"})),
            "ulist" => reply_json(json!({
                "results": [{"id": "v1", "vn": {"title": "One"}}],
                "more": false,
            })),
            other => panic!("unexpected request to {}", other),
        });
        let client = test_client(transport);

        let output = dir.path().join("vndb_list.json");
        let count = export_remote_list(&client, &output).await.unwrap();
        assert_eq!(count, 1);

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(value["data"][0]["id"], "v1");
        assert_eq!(value["data"][0]["title"], "One");
    }
}
