//! 소프트웨어 훅 플랫폼
//!
//! XDP를 사용할 수 없는 호스트와 테스트에서 사용하는 프로세스 내 구현입니다.
//! 어태치하면 [`IngressHook`]이 생성되고, [`SoftwarePlatform::deliver`]로
//! 주입된 프레임이 해당 훅을 통과합니다.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use ifstat_core::error::{AttachError, DetachError};
use tracing::debug;

use super::{AttachFlags, Counters, HookPlatform};
use crate::hook::{Disposition, IngressHook};
use crate::rules::FilterRuleSet;

/// 프로세스 내 훅 플랫폼
///
/// # 장애 주입
/// - [`occupy`](Self::occupy): 다른 프로그램이 훅을 점유한 상태
/// - [`fail_next_detaches`](Self::fail_next_detaches): 다음 N번의 디태치 실패
#[derive(Debug, Default)]
pub struct SoftwarePlatform {
    interfaces: HashSet<String>,
    hooks: RwLock<HashMap<String, IngressHook>>,
    occupied: RwLock<HashSet<String>>,
    detach_failures: AtomicU32,
}

impl SoftwarePlatform {
    /// 지정한 인터페이스들이 존재하는 플랫폼을 생성합니다.
    pub fn new<I, S>(interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            interfaces: interfaces.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// 인터페이스 훅을 외부 프로그램이 점유한 것으로 표시합니다.
    pub fn occupy(&self, interface: &str) {
        self.occupied
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(interface.to_owned());
    }

    /// 다음 `count`번의 디태치 호출을 실패시킵니다.
    pub fn fail_next_detaches(&self, count: u32) {
        self.detach_failures.store(count, Ordering::SeqCst);
    }

    /// 인터페이스에 프레임 한 개를 전달합니다.
    ///
    /// 훅이 어태치되지 않았으면 `None`(정상 경로로 전달, 카운트 없음)을 반환합니다.
    pub fn deliver(&self, interface: &str, frame: &[u8]) -> Option<Disposition> {
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
        hooks.get(interface).map(|hook| hook.handle(frame))
    }

    /// 인터페이스에 어태치된 훅을 반환합니다.
    pub fn hook(&self, interface: &str) -> Option<IngressHook> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(interface)
            .cloned()
    }

    fn take_detach_failure(&self) -> bool {
        self.detach_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl HookPlatform for SoftwarePlatform {
    fn name(&self) -> &'static str {
        "software"
    }

    fn attach(
        &self,
        interface: &str,
        rules: &Arc<FilterRuleSet>,
        flags: AttachFlags,
    ) -> Result<Counters, AttachError> {
        if !self.interfaces.contains(interface) {
            return Err(AttachError::InterfaceNotFound {
                interface: interface.to_owned(),
            });
        }

        let occupied = self
            .occupied
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(interface);
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        if occupied || hooks.contains_key(interface) {
            return Err(AttachError::HookOccupied {
                interface: interface.to_owned(),
                reason: "another program is attached".to_owned(),
            });
        }

        let hook = IngressHook::with_fresh_table(Arc::clone(rules));
        let counters: Counters = hook.counters().clone();
        hooks.insert(interface.to_owned(), hook);
        debug!(interface, mode = %flags.mode, "software hook attached");
        Ok(counters)
    }

    fn detach(&self, interface: &str, _flags: AttachFlags) -> Result<(), DetachError> {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        if !hooks.contains_key(interface) {
            return Ok(());
        }
        if self.take_detach_failure() {
            return Err(DetachError::Platform {
                interface: interface.to_owned(),
                reason: "device busy".to_owned(),
            });
        }
        hooks.remove(interface);
        debug!(interface, "software hook detached");
        Ok(())
    }

    fn is_attached(&self, interface: &str) -> bool {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(interface)
    }
}
