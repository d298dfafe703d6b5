//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ifstat_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use ifstat_core::metrics as m;
//!
//! metrics::counter!(m::RULE_PACKETS_TOTAL, m::LABEL_RULE => "0").absolute(42);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 룰 인덱스 레이블 키
pub const LABEL_RULE: &str = "rule";

/// 인터페이스 레이블 키
pub const LABEL_INTERFACE: &str = "interface";

/// 프레임 크기 버킷 레이블 키
pub const LABEL_BUCKET: &str = "bucket";

// ─── 룰 카운터 메트릭 ───────────────────────────────────────────────

/// 룰별 매칭 패킷 수 (counter, label: rule)
pub const RULE_PACKETS_TOTAL: &str = "ifstat_rule_packets_total";

/// 룰별 매칭 바이트 수 (counter, label: rule)
pub const RULE_BYTES_TOTAL: &str = "ifstat_rule_bytes_total";

/// 룰별 프레임 크기 분포 (counter, label: rule, bucket)
pub const RULE_SIZE_BUCKET_PACKETS_TOTAL: &str = "ifstat_rule_size_bucket_packets_total";

// ─── 훅 상태 메트릭 ────────────────────────────────────────────────

/// 현재 어태치된 훅 수 (gauge, label: interface)
pub const HOOK_ATTACHED: &str = "ifstat_hook_attached";

/// 무시된 stale 인덱스 증가 요청 수 (counter)
pub const STALE_INDEX_TOTAL: &str = "ifstat_stale_index_total";

/// 수행된 모니터 폴링 수 (counter)
pub const MONITOR_POLLS_TOTAL: &str = "ifstat_monitor_polls_total";

/// 실패한 모니터 폴링 수 (counter)
pub const MONITOR_POLL_ERRORS_TOTAL: &str = "ifstat_monitor_poll_errors_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다. 레코더가 없어도 패닉하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(RULE_PACKETS_TOTAL, "Packets matched per filter rule");
    describe_counter!(RULE_BYTES_TOTAL, "Bytes matched per filter rule");
    describe_counter!(
        RULE_SIZE_BUCKET_PACKETS_TOTAL,
        "Matched packets per filter rule and frame size bucket"
    );
    describe_gauge!(HOOK_ATTACHED, "Whether the ingress hook is attached (1/0)");
    describe_counter!(
        STALE_INDEX_TOTAL,
        "Counter increments ignored because the rule index was unknown"
    );
    describe_counter!(MONITOR_POLLS_TOTAL, "Counter table polls performed");
    describe_counter!(
        MONITOR_POLL_ERRORS_TOTAL,
        "Counter table polls that failed to read a snapshot"
    );
}
