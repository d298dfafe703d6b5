//! 세션: 어태치, 모니터링, 디태치를 한 번에 수행
//!
//! ```text
//! FilterRuleSet::load ──▶ AttachmentManager::attach ──▶ Monitor::run ──▶ AttachmentHandle::detach
//!   (ConfigError)           (AttachError)                 (취소까지)       (DetachError)
//! ```
//!
//! 설정/어태치 에러는 모니터 루프 진입 전에 반환됩니다.
//! 디태치 에러는 루프 종료 후 반환되며, 그때 훅은 실제로 어태치 상태로 남아 있습니다.
//! 루프 도중 패닉이 나면 핸들의 `Drop`이 디태치를 시도합니다.
//! 디태치 재시도 대기는 블로킹이므로 blocking 풀에서 실행합니다.

use std::sync::Arc;
use std::time::Duration;

use ifstat_core::error::{DetachError, IfstatError};
use ifstat_core::types::FilterRule;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::attach::AttachmentManager;
use crate::counters::CounterSnapshot;
use crate::monitor::Monitor;
use crate::platform::AttachFlags;
use crate::rules::FilterRuleSet;

/// 세션 종료 보고
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// 인터페이스 이름
    pub interface: String,
    /// 출력한 스냅샷 수
    pub snapshots: u64,
    /// 마지막 스냅샷
    pub last: Option<CounterSnapshot>,
}

/// 인터페이스에 훅을 어태치하고 취소될 때까지 카운터를 `sink`로 전달한 뒤 디태치합니다.
///
/// `sink`는 스냅샷과 함께 로드된 룰 집합을 받습니다 (출력 레이블용).
pub async fn run<F>(
    manager: &AttachmentManager,
    interface: &str,
    rules: Vec<FilterRule>,
    flags: AttachFlags,
    interval: Duration,
    cancel: CancellationToken,
    mut sink: F,
) -> Result<SessionReport, IfstatError>
where
    F: FnMut(&FilterRuleSet, &CounterSnapshot),
{
    let rule_set = Arc::new(FilterRuleSet::load(rules)?);
    let handle = manager.attach(interface, Arc::clone(&rule_set), flags)?;

    info!(
        interface,
        interval_ms = interval.as_millis() as u64,
        "monitoring counters"
    );

    let monitor = Monitor::new(handle.counters(), interval, cancel).interface(interface);
    let mut last = None;
    let snapshots = monitor
        .run(|snapshot| {
            sink(&rule_set, snapshot);
            last = Some(snapshot.clone());
        })
        .await;

    let detached = tokio::task::spawn_blocking(move || {
        let mut handle = handle;
        let result = handle.detach();
        (handle, result)
    })
    .await;
    match detached {
        Ok((_handle, result)) => result?,
        Err(e) => {
            return Err(DetachError::Platform {
                interface: interface.to_owned(),
                reason: format!("detach task failed: {e}"),
            }
            .into());
        }
    }

    Ok(SessionReport {
        interface: interface.to_owned(),
        snapshots,
        last,
    })
}

#[cfg(test)]
mod tests {
    use ifstat_core::error::{AttachError, ConfigError};

    use super::*;
    use crate::attach::DETACH_ATTEMPTS;
    use crate::platform::{HookPlatform, SoftwarePlatform};

    fn manager() -> (Arc<SoftwarePlatform>, AttachmentManager) {
        let platform = Arc::new(SoftwarePlatform::new(["eth0"]));
        (platform.clone(), AttachmentManager::new(platform))
    }

    #[tokio::test(start_paused = true)]
    async fn session_detaches_after_cancel() {
        let (platform, manager) = manager();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            canceller.cancel();
        });

        let report = run(
            &manager,
            "eth0",
            vec![FilterRule::any()],
            AttachFlags::default(),
            Duration::from_secs(1),
            token,
            |_, _| {},
        )
        .await
        .unwrap();

        assert_eq!(report.snapshots, 2);
        assert_eq!(report.last.unwrap().len(), 1);
        assert!(!platform.is_attached("eth0"));
    }

    #[tokio::test]
    async fn invalid_rules_abort_before_attach() {
        let (platform, manager) = manager();
        let rules = vec![FilterRule::any().dst_port(80).protocol(1)];
        let err = run(
            &manager,
            "eth0",
            rules,
            AttachFlags::default(),
            Duration::from_secs(1),
            CancellationToken::new(),
            |_, _| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IfstatError::Config(ConfigError::InvalidValue { .. })));
        assert!(!platform.is_attached("eth0"));
    }

    #[tokio::test]
    async fn missing_interface_is_attach_error() {
        let (_platform, manager) = manager();
        let err = run(
            &manager,
            "eth7",
            vec![FilterRule::any()],
            AttachFlags::default(),
            Duration::from_secs(1),
            CancellationToken::new(),
            |_, _| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            IfstatError::Attach(AttachError::InterfaceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn detach_failure_is_returned_after_loop() {
        let (platform, manager) = manager();
        platform.fail_next_detaches(DETACH_ATTEMPTS);
        let token = CancellationToken::new();
        token.cancel();
        let err = run(
            &manager,
            "eth0",
            vec![FilterRule::any()],
            AttachFlags::default(),
            Duration::from_secs(1),
            token,
            |_, _| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IfstatError::Detach(DetachError::Failed { .. })));
        // 실패를 보고했으면 훅은 그대로 남아 있어야 함
        assert!(platform.is_attached("eth0"));
        assert!(manager.is_bound("eth0"));
    }

    #[tokio::test]
    async fn detach_retry_runs_off_the_runtime_thread() {
        let (platform, manager) = manager();
        platform.fail_next_detaches(1);
        let token = CancellationToken::new();
        token.cancel();

        // 재시도 대기 동안에도 같은 런타임의 다른 태스크가 진행되어야 함
        let ticker = tokio::spawn(async {
            let mut ticks = 0u32;
            while ticks < 5 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticks += 1;
            }
            std::time::Instant::now()
        });

        let started = std::time::Instant::now();
        let report = run(
            &manager,
            "eth0",
            vec![FilterRule::any()],
            AttachFlags::default(),
            Duration::from_secs(1),
            token,
            |_, _| {},
        )
        .await
        .unwrap();
        let finished = std::time::Instant::now();
        let ticked_at = ticker.await.unwrap();

        assert_eq!(report.snapshots, 0);
        assert!(!platform.is_attached("eth0"));
        assert!(finished.duration_since(started) >= crate::attach::DETACH_RETRY_DELAY);
        assert!(ticked_at < finished, "ticker was starved by the detach retry");
    }
}
