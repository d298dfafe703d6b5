//! 인그레스 훅: 패킷별 분류 및 카운트
//!
//! 플랫폼이 수신 패킷마다 [`IngressHook::handle`]을 호출합니다.
//! 할당/블로킹/I/O 없이 헤더 파싱, 분류, 카운터 기록만 수행하고
//! 항상 [`Disposition::Pass`]를 반환합니다.
//!
//! XDP 플랫폼에서는 같은 경로를 커널 프로그램(`ifstat-ebpf`)이 수행합니다.

use std::sync::Arc;

use ifstat_ebpf_common::parse_headers;

use crate::classifier::{MatchResult, classify};
use crate::counters::CounterTable;
use crate::rules::FilterRuleSet;

/// 패킷 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 정상 네트워크 스택으로 전달
    Pass,
}

/// 인그레스 훅
///
/// 룰 집합은 읽기 전용, 카운터 테이블은 원자적 슬롯이므로
/// 여러 워커가 동시에 `handle`을 호출해도 안전합니다.
#[derive(Debug, Clone)]
pub struct IngressHook {
    rules: Arc<FilterRuleSet>,
    counters: Arc<CounterTable>,
}

impl IngressHook {
    /// 룰 집합과 카운터 테이블로 훅을 생성합니다.
    pub fn new(rules: Arc<FilterRuleSet>, counters: Arc<CounterTable>) -> Self {
        Self { rules, counters }
    }

    /// 새 0 카운터 테이블과 함께 훅을 생성합니다.
    pub fn with_fresh_table(rules: Arc<FilterRuleSet>) -> Self {
        let counters = Arc::new(CounterTable::new(rules.len()));
        Self::new(rules, counters)
    }

    /// 패킷 한 개를 처리합니다.
    #[inline]
    pub fn handle(&self, frame: &[u8]) -> Disposition {
        let packet = parse_headers(frame);
        if let MatchResult::Matched(index) = classify(&packet, &self.rules) {
            self.counters.record(index, packet.len);
        }
        Disposition::Pass
    }

    /// 카운터 테이블을 반환합니다.
    pub fn counters(&self) -> &Arc<CounterTable> {
        &self.counters
    }

    /// 룰 집합을 반환합니다.
    pub fn rules(&self) -> &Arc<FilterRuleSet> {
        &self.rules
    }
}
