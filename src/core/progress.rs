//! 研究进度：供 UI / CLI 展示的快照
//!
//! 快照存放在 watch 通道中，每次更新在 send_modify 内整体替换，读者看到的总是一致的快照。
//! 并发分支的更新会交错覆盖 current_depth / current_breadth，只是尽力而为的提示，从不参与控制流。

use serde::Serialize;
use tokio::sync::watch;

/// 进度快照
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current_depth: usize,
    pub total_depth: usize,
    pub current_breadth: usize,
    pub total_breadth: usize,
    pub total_queries: usize,
    pub completed_queries: usize,
    pub current_query: Option<String>,
}

/// 部分更新：只替换为 Some 的字段
#[derive(Clone, Debug, Default)]
pub struct ProgressUpdate {
    pub current_depth: Option<usize>,
    pub total_depth: Option<usize>,
    pub current_breadth: Option<usize>,
    pub total_breadth: Option<usize>,
    pub total_queries: Option<usize>,
    pub completed_queries: Option<usize>,
    pub current_query: Option<String>,
}

impl Progress {
    /// 合并部分更新
    pub fn merge(&mut self, update: ProgressUpdate) {
        if let Some(v) = update.current_depth {
            self.current_depth = v;
        }
        if let Some(v) = update.total_depth {
            self.total_depth = v;
        }
        if let Some(v) = update.current_breadth {
            self.current_breadth = v;
        }
        if let Some(v) = update.total_breadth {
            self.total_breadth = v;
        }
        if let Some(v) = update.total_queries {
            self.total_queries = v;
        }
        if let Some(v) = update.completed_queries {
            self.completed_queries = v;
        }
        if update.current_query.is_some() {
            self.current_query = update.current_query;
        }
    }
}

/// 进度发布端；Clone 后共享同一个快照
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    tx: watch::Sender<Progress>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Progress::default());
        Self { tx }
    }

    /// 订阅进度快照
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.tx.subscribe()
    }

    /// 当前快照（拷贝）
    pub fn snapshot(&self) -> Progress {
        self.tx.borrow().clone()
    }

    /// 整体替换快照（新一次研究开始时清空上一次的残留）
    pub fn replace(&self, progress: Progress) {
        self.tx.send_replace(progress);
    }

    pub fn update(&self, update: ProgressUpdate) {
        self.tx.send_modify(|p| p.merge(update));
    }

    /// 完成一个查询：completed_queries 在同一次替换内自增，其余字段按 update 合并
    pub fn complete_query(&self, update: ProgressUpdate) {
        self.tx.send_modify(|p| {
            p.merge(update);
            p.completed_queries += 1;
        });
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_only_replaces_set_fields() {
        let mut p = Progress {
            current_depth: 2,
            total_depth: 2,
            current_breadth: 4,
            total_breadth: 4,
            ..Default::default()
        };
        p.merge(ProgressUpdate {
            total_queries: Some(4),
            current_query: Some("rust async".into()),
            ..Default::default()
        });
        assert_eq!(p.current_depth, 2);
        assert_eq!(p.total_breadth, 4);
        assert_eq!(p.total_queries, 4);
        assert_eq!(p.current_query.as_deref(), Some("rust async"));

        p.merge(ProgressUpdate::default());
        assert_eq!(p.current_query.as_deref(), Some("rust async"));
    }

    #[tokio::test]
    async fn test_subscriber_sees_updates() {
        let tracker = ProgressTracker::new();
        let mut rx = tracker.subscribe();

        tracker.update(ProgressUpdate {
            total_depth: Some(3),
            ..Default::default()
        });
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().total_depth, 3);

        tracker.complete_query(ProgressUpdate {
            current_depth: Some(0),
            ..Default::default()
        });
        tracker.complete_query(ProgressUpdate::default());
        rx.changed().await.unwrap();
        let snap = rx.borrow().clone();
        assert_eq!(snap.completed_queries, 2);
        assert_eq!(snap.current_depth, 0);
        assert_eq!(tracker.snapshot(), snap);
    }

    #[test]
    fn test_replace_clears_previous_run() {
        let tracker = ProgressTracker::new();
        tracker.complete_query(ProgressUpdate {
            total_queries: Some(2),
            current_query: Some("old query".into()),
            ..Default::default()
        });
        tracker.replace(Progress {
            total_depth: 1,
            ..Default::default()
        });
        let snap = tracker.snapshot();
        assert_eq!(snap.current_query, None);
        assert_eq!(snap.completed_queries, 0);
        assert_eq!(snap.total_queries, 0);
        assert_eq!(snap.total_depth, 1);
    }
}
