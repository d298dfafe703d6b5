//! 에러 타입: 도메인별 에러 정의

/// ifstat 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum IfstatError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 훅 어태치 에러
    #[error("attach error: {0}")]
    Attach(#[from] AttachError),

    /// 훅 디태치 에러
    #[error("detach error: {0}")]
    Detach(#[from] DetachError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
///
/// 어태치 이전에 보고되며 항상 치명적입니다.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 훅 어태치 에러
///
/// 발생 시 모니터 루프에 진입하지 않고 종료합니다.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    /// 인터페이스가 존재하지 않음
    #[error("interface '{interface}' does not exist")]
    InterfaceNotFound { interface: String },

    /// 권한 부족 (CAP_NET_ADMIN / CAP_BPF 필요)
    #[error("insufficient privilege to attach to '{interface}': {reason}")]
    PermissionDenied { interface: String, reason: String },

    /// 인터페이스에 이미 다른 프로그램이 어태치됨
    #[error("hook on '{interface}' is occupied: {reason}")]
    HookOccupied { interface: String, reason: String },

    /// 동일 매니저에서 이미 어태치된 인터페이스
    #[error("interface '{interface}' is already attached")]
    AlreadyAttached { interface: String },

    /// 플랫폼이 훅 메커니즘을 지원하지 않음
    #[error("hook mechanism unavailable: {0}")]
    Unsupported(String),

    /// 프로그램 로드 실패
    #[error("program load failed: {0}")]
    ProgramLoad(String),

    /// 룰 테이블을 훅 저장소에 쓰지 못함
    #[error("rule table load failed: {0}")]
    RuleLoad(String),
}

/// 훅 디태치 에러
///
/// 디태치 실패는 프로세스 수명 이후에도 인터페이스에 영향을 주므로
/// 호출자는 반드시 운영자에게 보고해야 합니다.
#[derive(Debug, thiserror::Error)]
pub enum DetachError {
    /// 플랫폼 디태치 호출 실패 (단일 시도)
    #[error("detach from '{interface}' failed: {reason}")]
    Platform { interface: String, reason: String },

    /// 재시도 후에도 디태치 실패
    #[error("detach from '{interface}' failed after {attempts} attempts: {reason}")]
    Failed {
        interface: String,
        attempts: u32,
        reason: String,
    },
}

impl DetachError {
    /// 에러가 발생한 인터페이스 이름을 반환합니다.
    pub fn interface(&self) -> &str {
        match self {
            Self::Platform { interface, .. } | Self::Failed { interface, .. } => interface,
        }
    }
}

/// 카운터 테이블이 모르는 룰 인덱스
///
/// 핫 패스에서는 반환되지 않고 로그만 남깁니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stale rule index {index} (table has {capacity} slots)")]
pub struct StaleIndexWarning {
    /// 요청된 인덱스
    pub index: usize,
    /// 테이블 슬롯 수
    pub capacity: usize,
}

/// 카운터 저장소 읽기 실패
///
/// 모니터는 이 에러를 로그로 남기고 해당 폴링을 건너뜁니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("counter read failed: {reason}")]
pub struct CounterReadError {
    /// 실패 사유
    pub reason: String,
}

impl CounterReadError {
    /// 사유 문자열로 에러를 생성합니다.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
