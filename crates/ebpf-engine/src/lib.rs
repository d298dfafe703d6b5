//! ifstat XDP 인그레스 패킷 분류/카운트 엔진
//!
//! 수신 패킷을 순서가 있는 필터 룰 집합으로 분류하고, 첫 번째로 매칭된 룰의
//! 카운터를 증가시킵니다. 패킷은 항상 통과시킵니다.
//!
//! # 모듈 구성
//! - [`rules`]: 룰 검증 및 커널 표현 인코딩 (FilterRuleSet)
//! - [`classifier`]: 순수 분류 함수 (낮은 인덱스 우선)
//! - [`counters`]: 룰별 원자적 카운터, 스냅샷 (CounterTable)
//! - [`hook`]: 패킷별 파싱/분류/기록 (IngressHook)
//! - [`platform`]: HookPlatform trait + XDP(aya) / 소프트웨어 구현
//! - [`attach`]: 인터페이스 바인딩 수명 관리 (AttachmentManager)
//! - [`monitor`]: 취소 가능한 주기 폴링 (Monitor)
//! - [`session`]: 어태치 → 모니터 → 디태치 드라이버
//! - [`frame`]: 이더넷 프레임 빌더
//!
//! # 공유 타입
//! 커널/유저스페이스 공유 타입은 [`ifstat_ebpf_common`] 크레이트에 정의되어 있습니다.

pub mod attach;
pub mod classifier;
pub mod counters;
pub mod frame;
pub mod hook;
pub mod monitor;
pub mod platform;
pub mod rules;
pub mod session;

// --- 주요 타입 re-export ---

// 룰/분류
pub use classifier::{MatchResult, classify};
pub use ifstat_core::types::FilterRule;
pub use rules::FilterRuleSet;

// 카운터
pub use counters::{CounterSnapshot, CounterSource, CounterTable, RuleCounters};

// 훅/플랫폼
pub use hook::{Disposition, IngressHook};
pub use platform::{AttachFlags, Counters, HookPlatform, SoftwarePlatform, XdpPlatform};

// 어태치/모니터
pub use attach::{AttachmentHandle, AttachmentManager, DETACH_RETRY_DELAY};
pub use monitor::Monitor;
pub use session::SessionReport;

// 공유 타입 (커널/유저스페이스 공통)
pub use ifstat_ebpf_common;
pub use ifstat_ebpf_common::PacketFields;
