//! 研究中止：Ctrl+C / SIGTERM / 整体截止时间
//!
//! 持有一个 CancellationToken，由 Researcher 穿过每一层递归和每一次外部调用；
//! token 触发后在途调用立即以 ResearchError::Cancelled 结束。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// 中止原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// 用户按下 Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
    /// 超过整体截止时间
    Deadline(Duration),
}

/// 研究中止控制器
#[derive(Clone, Debug, Default)]
pub struct AbortHandle {
    token: CancellationToken,
    reason: Arc<Mutex<Option<AbortReason>>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 传给 Researcher 的 token
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发中止；只记录第一次的原因
    pub fn abort(&self, reason: AbortReason) {
        if let Ok(mut slot) = self.reason.lock() {
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }

    /// 超过 deadline 后自动中止
    pub fn abort_after(&self, deadline: Duration) {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => {
                    tracing::warn!(secs = deadline.as_secs(), "Research deadline reached, aborting");
                    handle.abort(AbortReason::Deadline(deadline));
                }
                _ = handle.token.cancelled() => {}
            }
        });
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(&self) {
        let handle = self.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, aborting research...");
                handle.abort(AbortReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let handle = self.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, aborting research...");
                    handle.abort(AbortReason::Signal);
                }
            });
        }
    }
}
