//! Runs one plan inside a request-scoped transaction, in sync or async mode.

use crate::error::AppError;
use crate::service::{RawResult, SessionSource};
use crate::sql::QueryPlan;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Whether suspension points yield the task or block the worker thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Async,
    Sync,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Async => "async",
            ExecutionMode::Sync => "sync",
        }
    }

    /// Drive one suspension point. Sync blocks the current worker via
    /// `block_in_place`; a current-thread runtime cannot do that and awaits.
    pub async fn drive<F: Future>(self, fut: F) -> F::Output {
        match self {
            ExecutionMode::Async => fut.await,
            ExecutionMode::Sync => match Handle::try_current() {
                Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                    tokio::task::block_in_place(|| handle.block_on(fut))
                }
                _ => fut.await,
            },
        }
    }
}

#[derive(Clone)]
pub struct Executor {
    sessions: Arc<dyn SessionSource>,
    mode: ExecutionMode,
    autocommit: bool,
}

impl Executor {
    pub fn new(sessions: Arc<dyn SessionSource>, mode: ExecutionMode, autocommit: bool) -> Self {
        Executor { sessions, mode, autocommit }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// open → begin → execute → parse → commit. Any error after begin,
    /// parse errors included, rolls back before it propagates.
    pub async fn run<T, P>(&self, plan: &QueryPlan, parse: P) -> Result<T, AppError>
    where
        P: FnOnce(RawResult) -> Result<T, AppError>,
    {
        let mode = self.mode;
        tracing::debug!(plan = %plan, mode = mode.as_str(), "execute");
        let mut session = mode.drive(self.sessions.open()).await?;

        if self.autocommit {
            let raw = mode.drive(session.execute(plan)).await?;
            return parse(raw);
        }

        mode.drive(session.begin()).await?;
        let outcome = match mode.drive(session.execute(plan)).await {
            Ok(raw) => parse(raw),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(value) => {
                mode.drive(session.commit()).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = mode.drive(session.rollback()).await {
                    tracing::error!(error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TableConfig, TableDescriptor};
    use crate::service::{MemoryStore, Session};
    use crate::sql::{AssignValue, Assignment, PlanOp};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Executes for real, then never finishes committing.
    struct StallingCommit(MemoryStore);

    struct StallingSession(Box<dyn Session>);

    #[async_trait]
    impl SessionSource for StallingCommit {
        async fn open(&self) -> Result<Box<dyn Session>, AppError> {
            Ok(Box::new(StallingSession(self.0.open().await?)))
        }
    }

    #[async_trait]
    impl Session for StallingSession {
        async fn begin(&mut self) -> Result<(), AppError> {
            self.0.begin().await
        }

        async fn execute(&mut self, plan: &QueryPlan) -> Result<RawResult, AppError> {
            self.0.execute(plan).await
        }

        async fn commit(&mut self) -> Result<(), AppError> {
            std::future::pending().await
        }

        async fn rollback(&mut self) -> Result<(), AppError> {
            self.0.rollback().await
        }
    }

    fn insert(table: &Arc<TableDescriptor>, code: &str) -> QueryPlan {
        let mut plan = QueryPlan::new(PlanOp::Insert, table.clone());
        plan.rows = vec![vec![Assignment { column: "code".into(), value: AssignValue::Value(json!(code)) }]];
        plan
    }

    fn table() -> Arc<TableDescriptor> {
        let t: TableConfig = serde_json::from_value(json!({
            "name": "items",
            "primary_key": "id",
            "columns": [{"name": "id", "type": "serial"}, {"name": "code", "type": "text"}]
        }))
        .unwrap();
        Arc::new(TableDescriptor::from_config(&t).unwrap())
    }

    #[tokio::test]
    async fn parse_error_rolls_back() {
        let store = MemoryStore::new();
        let t = table();
        let exec = Executor::new(Arc::new(store.clone()), ExecutionMode::Async, false);
        let err = exec
            .run(&insert(&t, "a"), |_| Err::<(), _>(AppError::NotFound("gone".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.rows(&t).await.is_empty());
        exec.run(&insert(&t, "b"), |raw| Ok(raw.rows_affected)).await.unwrap();
        assert_eq!(store.rows(&t).await.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_run_leaves_the_store_unchanged() {
        let store = MemoryStore::new();
        let t = table();
        let exec = Executor::new(Arc::new(StallingCommit(store.clone())), ExecutionMode::Async, false);
        let plan = insert(&t, "a");
        let res = tokio::time::timeout(Duration::from_millis(50), exec.run(&plan, |raw| Ok(raw.rows_affected))).await;
        assert!(res.is_err());
        assert_eq!(store.statements_executed(), 1);
        assert!(store.rows(&t).await.is_empty());

        // an aborted request task rolls back the same way
        let exec = Arc::new(Executor::new(Arc::new(StallingCommit(store.clone())), ExecutionMode::Async, false));
        let task = {
            let exec = exec.clone();
            let plan = insert(&t, "b");
            tokio::spawn(async move { exec.run(&plan, |raw| Ok(raw.rows_affected)).await })
        };
        while store.statements_executed() < 2 {
            tokio::task::yield_now().await;
        }
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(store.rows(&t).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sync_mode_blocks_the_worker() {
        let store = MemoryStore::new();
        let t = table();
        let exec = Executor::new(Arc::new(store.clone()), ExecutionMode::Sync, false);
        let n = exec.run(&insert(&t, "a"), |raw| Ok(raw.rows_affected)).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.rows(&t).await.len(), 1);
    }

    #[tokio::test]
    async fn sync_mode_on_current_thread_awaits() {
        let store = MemoryStore::new();
        let t = table();
        let exec = Executor::new(Arc::new(store.clone()), ExecutionMode::Sync, true);
        let err = exec
            .run(&insert(&t, "a"), |_| Err::<(), _>(AppError::NotFound("gone".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        // autocommit: the statement committed on its own
        assert_eq!(store.rows(&t).await.len(), 1);
    }
}
