//! Executes [`Effect`]s off the UI loop and posts the outcomes back as [`AppEvent`]s.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error};

use crate::app::{AppEvent, Effect};
use crate::deletion::{self, Manager};
use crate::export::{self, export_dir_name};
use crate::query::{QueryEngine, QueryResult};
use crate::search::{SearchMode, SearchPage, SearchRequest};

pub struct Runtime {
    engine: Arc<dyn QueryEngine>,
    tx: UnboundedSender<AppEvent>,
    /// Holds `attachments/` and `deletions/`
    data_dir: PathBuf,
    export_dir: PathBuf,
}

impl Runtime {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        tx: UnboundedSender<AppEvent>,
        data_dir: PathBuf,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            engine,
            tx,
            data_dir,
            export_dir,
        }
    }

    /// Spawns the work for `effect`. Must be called inside a tokio runtime.
    /// Returns false for [`Effect::Quit`].
    pub fn execute(&self, effect: Effect) -> bool {
        match effect {
            Effect::LoadAggregates {
                request_id,
                dimension,
                filter,
                options,
            } => self.blocking(move |engine| {
                let result = match &filter {
                    Some(filter) => engine.sub_aggregate(filter, dimension, &options),
                    None => engine.aggregate(dimension, &options),
                };
                AppEvent::AggregatesLoaded { request_id, result }
            }),
            Effect::LoadMessages {
                request_id,
                filter,
                query,
            } => self.blocking(move |engine| AppEvent::MessagesLoaded {
                request_id,
                result: engine.list_messages(&filter, &query),
            }),
            Effect::LoadThread {
                request_id,
                filter,
                query,
            } => self.blocking(move |engine| AppEvent::ThreadLoaded {
                request_id,
                result: engine.list_messages(&filter, &query),
            }),
            Effect::LoadDetail {
                request_id,
                message_id,
            } => self.blocking(move |engine| AppEvent::DetailLoaded {
                request_id,
                result: engine.get_message(message_id),
            }),
            Effect::Search {
                request_id,
                request,
            } => self.blocking(move |engine| AppEvent::SearchLoaded {
                request_id,
                append: request.append,
                result: run_search(engine, &request),
            }),
            Effect::SearchTick {
                delay,
                query,
                token,
            } => self.after(delay, AppEvent::SearchTick { query, token }),
            Effect::ExpireFlash { delay, generation } => {
                self.after(delay, AppEvent::FlashExpired { generation })
            }
            Effect::LoadStats(options) => {
                self.blocking(move |engine| AppEvent::StatsLoaded(engine.total_stats(&options)))
            }
            Effect::LoadAccounts => {
                self.blocking(|engine| AppEvent::AccountsLoaded(engine.list_accounts()))
            }
            Effect::BuildManifest(request) => self.blocking(move |engine| {
                AppEvent::ManifestBuilt(deletion::stage(engine, &request))
            }),
            Effect::SaveManifest(manifest) => {
                let manager = Manager::new(self.data_dir.join("deletions"));
                self.blocking(move |_| {
                    let result = manager
                        .save(&manifest)
                        .map(|path| {
                            debug!("manifest written to {:?}", path);
                            (manifest.id.clone(), manifest.message_count())
                        });
                    AppEvent::ManifestSaved(result)
                })
            }
            Effect::ExportAttachments {
                subject,
                message_id,
                attachments,
            } => {
                let attachments_dir = self.data_dir.join("attachments");
                let out_dir = self.export_dir.join(export_dir_name(&subject, message_id));
                self.blocking(move |_| {
                    AppEvent::ExportFinished(export::export_attachments(
                        &attachments_dir,
                        &out_dir,
                        &attachments,
                    ))
                })
            }
            Effect::Quit => return false,
        }
        true
    }

    /// Runs `job` on the blocking pool and sends its event
    fn blocking<F>(&self, job: F)
    where
        F: FnOnce(&dyn QueryEngine) -> AppEvent + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || job(engine.as_ref())).await {
                Ok(event) => {
                    // The receiver is gone only when the app is shutting down
                    let _ = tx.send(event);
                }
                Err(e) => error!("background task failed: {e}"),
            }
        });
    }

    fn after(&self, delay: std::time::Duration, event: AppEvent) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }
}

/// Runs one page of a search.
///
/// Fast searches report an exact total. Deep searches can't count cheaply,
/// so a full page reports -1 (more may follow) and a short page closes the
/// total at `offset + len`.
pub fn run_search(engine: &dyn QueryEngine, request: &SearchRequest) -> QueryResult<SearchPage> {
    match request.mode {
        SearchMode::Fast => {
            let messages = engine.search_fast(
                &request.query,
                &request.filter,
                request.limit,
                request.offset,
            )?;
            let total = engine.search_fast_count(&request.query, &request.filter)?;
            Ok(SearchPage { messages, total })
        }
        SearchMode::Deep => {
            let messages = engine.search(&request.query, request.limit, request.offset)?;
            let total = if messages.len() >= request.limit {
                -1
            } else {
                (request.offset + messages.len()) as i64
            };
            Ok(SearchPage { messages, total })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DrillFilter;
    use crate::query::{
        AggregateOptions, AggregateRow, MessageSummary, MockQueryEngine, ViewDimension,
    };
    use mockall::predicate::*;
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    fn summaries(n: usize) -> Vec<MessageSummary> {
        (0..n)
            .map(|i| MessageSummary {
                id: i as i64,
                ..MessageSummary::default()
            })
            .collect()
    }

    fn request(mode: SearchMode, limit: usize, offset: usize) -> SearchRequest {
        SearchRequest {
            query: "invoice".to_string(),
            mode,
            filter: DrillFilter::default(),
            limit,
            offset,
            append: offset > 0,
        }
    }

    #[test]
    fn test_fast_search_reports_exact_count() {
        let mut engine = MockQueryEngine::new();
        engine
            .expect_search_fast()
            .with(eq("invoice"), always(), eq(10), eq(0))
            .returning(|_, _, _, _| Ok(summaries(10)));
        engine
            .expect_search_fast_count()
            .returning(|_, _| Ok(42));

        let page = run_search(&engine, &request(SearchMode::Fast, 10, 0)).unwrap();
        assert_eq!(page.messages.len(), 10);
        assert_eq!(page.total, 42);
    }

    #[test]
    fn test_deep_search_full_page_has_unknown_total() {
        let mut engine = MockQueryEngine::new();
        engine
            .expect_search()
            .returning(|_, _, _| Ok(summaries(10)));

        let page = run_search(&engine, &request(SearchMode::Deep, 10, 20)).unwrap();
        assert_eq!(page.total, -1);
    }

    #[test]
    fn test_deep_search_short_page_closes_total() {
        let mut engine = MockQueryEngine::new();
        engine
            .expect_search()
            .with(eq("invoice"), eq(10), eq(20))
            .returning(|_, _, _| Ok(summaries(4)));

        let page = run_search(&engine, &request(SearchMode::Deep, 10, 20)).unwrap();
        assert_eq!(page.total, 24);
    }

    #[test]
    fn test_deep_search_ignores_drill_filter() {
        let mut engine = MockQueryEngine::new();
        engine.expect_search_fast().never();
        engine.expect_search().times(1).returning(|_, _, _| Ok(vec![]));

        let mut req = request(SearchMode::Deep, 10, 0);
        req.filter.sender = Some("alice@example.com".into());
        let page = run_search(&engine, &req).unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_execute_routes_sub_aggregate_and_posts_event() {
        let mut engine = MockQueryEngine::new();
        engine.expect_aggregate().never();
        engine
            .expect_sub_aggregate()
            .with(always(), eq(ViewDimension::Recipients), always())
            .returning(|_, _, _| {
                Ok(vec![AggregateRow {
                    key: "bob@example.com".into(),
                    count: 2,
                    ..AggregateRow::default()
                }])
            });

        let (tx, mut rx) = unbounded_channel();
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(
            Arc::new(engine),
            tx,
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
        );

        assert!(runtime.execute(Effect::LoadAggregates {
            request_id: 7,
            dimension: ViewDimension::Recipients,
            filter: Some(DrillFilter::default()),
            options: AggregateOptions::default(),
        }));

        match rx.recv().await {
            Some(AppEvent::AggregatesLoaded { request_id, result }) => {
                assert_eq!(request_id, 7);
                assert_eq!(result.unwrap()[0].key, "bob@example.com");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timers_deliver_tokens() {
        let (tx, mut rx) = unbounded_channel();
        let runtime = Runtime::new(
            Arc::new(MockQueryEngine::new()),
            tx,
            PathBuf::new(),
            PathBuf::new(),
        );
        runtime.execute(Effect::SearchTick {
            delay: Duration::from_millis(1),
            query: "a".into(),
            token: 3,
        });
        match rx.recv().await {
            Some(AppEvent::SearchTick { query, token }) => {
                assert_eq!(query, "a");
                assert_eq!(token, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_save_manifest_writes_pending_file() {
        let (tx, mut rx) = unbounded_channel();
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(
            Arc::new(MockQueryEngine::new()),
            tx,
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
        );
        let manifest = crate::deletion::ManifestBuilder::new()
            .description("Senders-alice")
            .gmail_ids(vec!["g1".into(), "g2".into()])
            .build();
        let id = manifest.id.clone();

        runtime.execute(Effect::SaveManifest(manifest));
        match rx.recv().await {
            Some(AppEvent::ManifestSaved(Ok((saved_id, count)))) => {
                assert_eq!(saved_id, id);
                assert_eq!(count, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(
            dir.path()
                .join("deletions/pending")
                .join(format!("{id}.json"))
                .exists()
        );
    }

    #[test]
    fn test_quit_stops_execution() {
        let (tx, _rx) = unbounded_channel();
        let runtime = Runtime::new(
            Arc::new(MockQueryEngine::new()),
            tx,
            PathBuf::new(),
            PathBuf::new(),
        );
        assert!(!runtime.execute(Effect::Quit));
    }
}
