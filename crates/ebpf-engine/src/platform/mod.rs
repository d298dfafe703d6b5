//! 훅 플랫폼: 인터페이스 어태치/디태치 API
//!
//! [`HookPlatform`]은 인그레스 훅을 실제 인터페이스에 바인딩하는 플랫폼 기능을 추상화합니다.
//!
//! # 구현
//! - [`XdpPlatform`]: Linux XDP (aya). BPF 오브젝트를 로드하고 `FILTERS` 맵에 룰을 기록한 뒤
//!   `ifstat_xdp` 프로그램을 어태치합니다. 비-Linux에서는 `Unsupported`를 반환합니다.
//! - [`SoftwarePlatform`]: 프로세스 내 훅. 고정된 인터페이스 목록에 대해
//!   [`SoftwarePlatform::deliver`]로 주입된 프레임을 처리합니다.

use std::sync::Arc;

use ifstat_core::error::{AttachError, DetachError};
use ifstat_core::types::XdpMode;

use crate::counters::CounterSource;
use crate::rules::FilterRuleSet;

mod software;
mod xdp;

pub use software::SoftwarePlatform;
pub use xdp::XdpPlatform;

/// 어태치된 훅의 카운터 저장소 핸들
pub type Counters = Arc<dyn CounterSource>;

/// 어태치 플래그
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachFlags {
    /// XDP 어태치 모드
    pub mode: XdpMode,
}

impl AttachFlags {
    /// 지정한 모드의 플래그를 생성합니다.
    pub fn new(mode: XdpMode) -> Self {
        Self { mode }
    }
}

/// 플랫폼 훅 어태치 API
///
/// 구현체는 인터페이스당 최대 하나의 훅만 유지해야 합니다.
/// 호출 직렬화는 [`AttachmentManager`](crate::attach::AttachmentManager)가 담당합니다.
pub trait HookPlatform: Send + Sync {
    /// 플랫폼 이름 (로그용)
    fn name(&self) -> &'static str;

    /// 룰 집합을 훅 저장소에 기록하고 인터페이스에 훅을 어태치합니다.
    ///
    /// 성공 시 새로 생성된 (0으로 초기화된) 카운터 저장소를 반환합니다.
    fn attach(
        &self,
        interface: &str,
        rules: &Arc<FilterRuleSet>,
        flags: AttachFlags,
    ) -> Result<Counters, AttachError>;

    /// 인터페이스에서 훅을 디태치합니다.
    ///
    /// 어태치되지 않은 인터페이스에 대해서는 `Ok(())`를 반환해야 합니다.
    fn detach(&self, interface: &str, flags: AttachFlags) -> Result<(), DetachError>;

    /// 인터페이스에 이 플랫폼의 훅이 어태치되어 있는지 확인합니다.
    fn is_attached(&self, interface: &str) -> bool;
}
