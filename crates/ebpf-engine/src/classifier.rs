//! 분류기: 패킷 필드와 룰 집합 매칭
//!
//! 커널 프로그램과 같은 [`ifstat_ebpf_common::classify`]를 사용하므로
//! 유저스페이스 결과와 XDP 결과가 항상 일치합니다.

use ifstat_ebpf_common::PacketFields;

use crate::rules::FilterRuleSet;

/// 분류 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchResult {
    /// 매칭된 룰 인덱스 (가장 낮은 인덱스)
    Matched(usize),
    /// 매칭 룰 없음 (통과, 카운트하지 않음)
    NoMatch,
}

impl MatchResult {
    /// 매칭된 룰 인덱스를 반환합니다.
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Matched(index) => Some(index),
            Self::NoMatch => None,
        }
    }
}

/// 패킷 필드를 룰 집합에 대해 분류합니다.
///
/// 활성 룰을 순서대로 검사하여 비-와일드카드 필드가 모두 가용하고 일치하는
/// 첫 번째 룰을 반환합니다. 부수 효과가 없습니다.
#[inline]
pub fn classify(packet: &PacketFields, rules: &FilterRuleSet) -> MatchResult {
    match ifstat_ebpf_common::classify(packet, rules.raw_rules()) {
        Some(index) => MatchResult::Matched(index),
        None => MatchResult::NoMatch,
    }
}
