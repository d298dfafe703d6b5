//! 어태치 매니저: 인터페이스 바인딩 수명 관리
//!
//! [`AttachmentManager`]는 인터페이스당 하나의 바인딩만 허용하고
//! 같은 인터페이스에 대한 동시 어태치를 직렬화합니다.
//! [`AttachmentHandle`]은 바인딩을 소유하며, 명시적 [`detach`](AttachmentHandle::detach)
//! 또는 `Drop` 시 훅을 해제합니다.
//!
//! # 사용 예시
//! ```ignore
//! let manager = AttachmentManager::new(Arc::new(XdpPlatform::new(path)));
//! let mut handle = manager.attach("eth0", rules, AttachFlags::default())?;
//! // ... handle.counters() 폴링 ...
//! handle.detach()?;
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ifstat_core::error::{AttachError, DetachError};
use ifstat_core::metrics as m;
use tracing::{error, info, warn};

use crate::platform::{AttachFlags, Counters, HookPlatform};
use crate::rules::FilterRuleSet;

/// 디태치 재시도 전 대기 시간
pub const DETACH_RETRY_DELAY: Duration = Duration::from_millis(100);

/// 디태치 최대 시도 횟수 (최초 1회 + 재시도 1회)
pub const DETACH_ATTEMPTS: u32 = 2;

type Registry = Arc<Mutex<HashSet<String>>>;

/// 인터페이스 바인딩 관리자
pub struct AttachmentManager {
    platform: Arc<dyn HookPlatform>,
    bound: Registry,
}

impl AttachmentManager {
    /// 플랫폼으로 매니저를 생성합니다.
    pub fn new(platform: Arc<dyn HookPlatform>) -> Self {
        Self {
            platform,
            bound: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 사용 중인 플랫폼
    pub fn platform(&self) -> &Arc<dyn HookPlatform> {
        &self.platform
    }

    /// 인터페이스가 이 매니저를 통해 바인딩되어 있는지 확인합니다.
    pub fn is_bound(&self, interface: &str) -> bool {
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(interface)
    }

    /// 룰 집합과 함께 인그레스 훅을 인터페이스에 어태치합니다.
    ///
    /// 레지스트리 락을 플랫폼 호출 동안 유지하므로 같은 인터페이스에 대한
    /// 동시 어태치 중 하나만 성공하고 나머지는 `AlreadyAttached`로 실패합니다.
    ///
    /// # 에러
    /// - `AlreadyAttached`: 이미 바인딩된 인터페이스
    /// - 그 외: 플랫폼이 반환한 에러 (카운터 테이블은 생성되지 않음)
    pub fn attach(
        &self,
        interface: &str,
        rules: Arc<FilterRuleSet>,
        flags: AttachFlags,
    ) -> Result<AttachmentHandle, AttachError> {
        let mut bound = self.bound.lock().unwrap_or_else(PoisonError::into_inner);
        if bound.contains(interface) {
            return Err(AttachError::AlreadyAttached {
                interface: interface.to_owned(),
            });
        }

        let counters = self.platform.attach(interface, &rules, flags)?;
        bound.insert(interface.to_owned());
        drop(bound);

        metrics::gauge!(m::HOOK_ATTACHED, m::LABEL_INTERFACE => interface.to_owned()).set(1.0);
        info!(
            interface,
            platform = self.platform.name(),
            mode = %flags.mode,
            rules = rules.len(),
            "ingress hook attached"
        );

        Ok(AttachmentHandle {
            interface: interface.to_owned(),
            flags,
            rules,
            counters,
            platform: Arc::clone(&self.platform),
            bound: Arc::clone(&self.bound),
            attached: true,
            detach_failed: false,
        })
    }
}

/// 살아 있는 인터페이스 바인딩
///
/// 디태치는 멱등적입니다. 두 번째 호출과 이후 `Drop`은 아무 일도 하지 않습니다.
/// 명시적 디태치가 `Failed`를 반환한 핸들은 `Drop`에서 재시도하지 않고
/// 남은 훅을 보고만 합니다. 호출자가 받은 실패와 실제 상태가 일치해야 합니다.
pub struct AttachmentHandle {
    interface: String,
    flags: AttachFlags,
    rules: Arc<FilterRuleSet>,
    counters: Counters,
    platform: Arc<dyn HookPlatform>,
    bound: Registry,
    attached: bool,
    detach_failed: bool,
}

impl AttachmentHandle {
    /// 바인딩된 인터페이스 이름
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// 어태치 플래그
    pub fn flags(&self) -> AttachFlags {
        self.flags
    }

    /// 로드된 룰 집합
    pub fn rules(&self) -> &Arc<FilterRuleSet> {
        &self.rules
    }

    /// 이 바인딩의 카운터 저장소
    pub fn counters(&self) -> Counters {
        Arc::clone(&self.counters)
    }

    /// 아직 어태치 상태인지 확인합니다.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// 훅을 디태치합니다.
    ///
    /// 실패 시 [`DETACH_RETRY_DELAY`] 후 한 번 재시도합니다.
    /// 재시도 후에도 실패하면 핸들은 어태치 상태로 남고 `Failed`를 반환합니다.
    /// 재시도 대기는 호출 스레드를 블로킹하므로 async 컨텍스트에서는
    /// `spawn_blocking`으로 호출해야 합니다.
    pub fn detach(&mut self) -> Result<(), DetachError> {
        if !self.attached {
            return Ok(());
        }

        let mut last_reason = String::new();
        for attempt in 1..=DETACH_ATTEMPTS {
            match self.platform.detach(&self.interface, self.flags) {
                Ok(()) => {
                    self.mark_detached();
                    info!(interface = %self.interface, attempt, "ingress hook detached");
                    return Ok(());
                }
                Err(e) => {
                    warn!(interface = %self.interface, attempt, error = %e, "detach attempt failed");
                    last_reason = e.to_string();
                    if attempt < DETACH_ATTEMPTS {
                        std::thread::sleep(DETACH_RETRY_DELAY);
                    }
                }
            }
        }

        error!(
            interface = %self.interface,
            attempts = DETACH_ATTEMPTS,
            "ingress hook is still attached"
        );
        self.detach_failed = true;
        Err(DetachError::Failed {
            interface: self.interface.clone(),
            attempts: DETACH_ATTEMPTS,
            reason: last_reason,
        })
    }

    fn mark_detached(&mut self) {
        self.attached = false;
        self.detach_failed = false;
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.interface);
        metrics::gauge!(m::HOOK_ATTACHED, m::LABEL_INTERFACE => self.interface.clone()).set(0.0);
    }
}

impl std::fmt::Debug for AttachmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentHandle")
            .field("interface", &self.interface)
            .field("flags", &self.flags)
            .field("platform", &self.platform.name())
            .field("attached", &self.attached)
            .field("detach_failed", &self.detach_failed)
            .finish()
    }
}

impl Drop for AttachmentHandle {
    fn drop(&mut self) {
        if !self.attached {
            return;
        }
        if self.detach_failed {
            error!(
                interface = %self.interface,
                "hook leaked after failed detach; clear it with `ip link set dev {} xdp off`",
                self.interface
            );
            return;
        }
        warn!(interface = %self.interface, "handle dropped while attached, detaching");
        if let Err(e) = self.detach() {
            error!(
                interface = %self.interface,
                error = %e,
                "hook leaked; clear it with `ip link set dev {} xdp off`",
                self.interface
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use ifstat_core::types::FilterRule;

    use super::*;
    use crate::counters::CounterSource;
    use crate::platform::SoftwarePlatform;

    fn rules() -> Arc<FilterRuleSet> {
        Arc::new(FilterRuleSet::load(vec![FilterRule::any()]).unwrap())
    }

    fn setup() -> (Arc<SoftwarePlatform>, AttachmentManager) {
        let platform = Arc::new(SoftwarePlatform::new(["eth0", "eth1"]));
        let manager = AttachmentManager::new(platform.clone());
        (platform, manager)
    }

    #[test]
    fn attach_then_detach() {
        let (platform, manager) = setup();
        let mut handle = manager.attach("eth0", rules(), AttachFlags::default()).unwrap();
        assert!(platform.is_attached("eth0"));
        assert!(manager.is_bound("eth0"));
        handle.detach().unwrap();
        assert!(!platform.is_attached("eth0"));
        assert!(!manager.is_bound("eth0"));
        assert!(!handle.is_attached());
    }

    #[test]
    fn second_attach_is_rejected() {
        let (_platform, manager) = setup();
        let _handle = manager.attach("eth0", rules(), AttachFlags::default()).unwrap();
        let err = manager
            .attach("eth0", rules(), AttachFlags::default())
            .unwrap_err();
        assert!(matches!(err, AttachError::AlreadyAttached { .. }));
        assert!(manager.attach("eth1", rules(), AttachFlags::default()).is_ok());
    }

    #[test]
    fn failed_attach_does_not_bind() {
        let (_platform, manager) = setup();
        assert!(manager.attach("wlan7", rules(), AttachFlags::default()).is_err());
        assert!(!manager.is_bound("wlan7"));
    }

    #[test]
    fn detach_is_idempotent() {
        let (platform, manager) = setup();
        let mut handle = manager.attach("eth0", rules(), AttachFlags::default()).unwrap();
        handle.detach().unwrap();
        handle.detach().unwrap();
        assert!(!platform.is_attached("eth0"));
    }

    #[test]
    fn detach_retries_once() {
        let (platform, manager) = setup();
        let mut handle = manager.attach("eth0", rules(), AttachFlags::default()).unwrap();
        platform.fail_next_detaches(1);
        handle.detach().unwrap();
        assert!(!platform.is_attached("eth0"));
    }

    #[test]
    fn persistent_detach_failure_is_reported() {
        let (platform, manager) = setup();
        let mut handle = manager.attach("eth0", rules(), AttachFlags::default()).unwrap();
        platform.fail_next_detaches(DETACH_ATTEMPTS);
        let err = handle.detach().unwrap_err();
        assert!(matches!(err, DetachError::Failed { attempts: DETACH_ATTEMPTS, .. }));
        assert!(handle.is_attached());
        assert!(manager.is_bound("eth0"));
        // 장애 해소 후 재시도 가능
        handle.detach().unwrap();
        assert!(!manager.is_bound("eth0"));
    }

    #[test]
    fn drop_after_failed_detach_leaves_hook() {
        let (platform, manager) = setup();
        let mut handle = manager.attach("eth0", rules(), AttachFlags::default()).unwrap();
        platform.fail_next_detaches(DETACH_ATTEMPTS);
        assert!(handle.detach().is_err());
        drop(handle);
        // 보고된 실패 이후에는 Drop이 훅을 건드리지 않음
        assert!(platform.is_attached("eth0"));
        assert!(manager.is_bound("eth0"));
    }

    #[test]
    fn drop_detaches() {
        let (platform, manager) = setup();
        {
            let _handle = manager.attach("eth0", rules(), AttachFlags::default()).unwrap();
            assert!(platform.is_attached("eth0"));
        }
        assert!(!platform.is_attached("eth0"));
        assert!(!manager.is_bound("eth0"));
    }

    #[test]
    fn drop_during_panic_detaches() {
        let (platform, manager) = setup();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _handle = manager.attach("eth0", rules(), AttachFlags::default()).unwrap();
            panic!("monitor crashed");
        }));
        assert!(result.is_err());
        assert!(!platform.is_attached("eth0"));
    }

    #[test]
    fn concurrent_attach_has_single_winner() {
        let (platform, manager) = setup();
        let manager = Arc::new(manager);
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    manager.attach("eth0", rules(), AttachFlags::default())
                })
            })
            .collect();
        let results: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| matches!(
            e,
            AttachError::AlreadyAttached { .. }
        )));
        assert!(platform.is_attached("eth0"));
        drop(results);
        assert!(!platform.is_attached("eth0"));
    }

    #[test]
    fn reattach_yields_fresh_counters() {
        let (platform, manager) = setup();
        let frame = [0u8; 64];
        let mut handle = manager.attach("eth0", rules(), AttachFlags::default()).unwrap();
        platform.deliver("eth0", &frame);
        assert_eq!(handle.counters().read().unwrap().hits()[&0], 1);
        handle.detach().unwrap();

        let handle = manager.attach("eth0", rules(), AttachFlags::default()).unwrap();
        assert_eq!(handle.counters().read().unwrap().hits()[&0], 0);
    }
}
