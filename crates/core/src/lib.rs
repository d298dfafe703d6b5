//! ifstat 공통 크레이트
//!
//! 에러 타입, 설정 로딩, 필터 룰 도메인 타입, 메트릭 이름을 정의합니다.
//! 엔진(`ifstat-ebpf-engine`)과 CLI가 이 크레이트를 공유합니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    AttachError, ConfigError, CounterReadError, DetachError, IfstatError, StaleIndexWarning,
};

// 설정
pub use config::IfstatConfig;

// 도메인 타입
pub use types::{FilterRule, XdpMode};
