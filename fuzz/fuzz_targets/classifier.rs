#![no_main]

use std::net::Ipv4Addr;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ifstat_core::types::FilterRule;
use ifstat_ebpf_engine::ifstat_ebpf_common::{MAX_FILTERS, parse_headers};
use ifstat_ebpf_engine::{FilterRuleSet, IngressHook, MatchResult, classify};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 룰 목록 (최대 MAX_FILTERS개로 제한)
    rules: Vec<FuzzRule>,
    /// 분류 대상 프레임
    frame: Vec<u8>,
}

#[derive(Arbitrary, Debug)]
struct FuzzRule {
    src_ip: Option<u32>,
    dst_ip: Option<u32>,
    src_port: Option<u16>,
    dst_port: Option<u16>,
    protocol: Option<u8>,
    enabled: bool,
}

impl FuzzRule {
    fn to_rule(&self) -> FilterRule {
        let mut rule = FilterRule::any().enabled(self.enabled);
        rule.src_ip = self.src_ip.map(Ipv4Addr::from);
        rule.dst_ip = self.dst_ip.map(Ipv4Addr::from);
        rule.src_port = self.src_port;
        rule.dst_port = self.dst_port;
        rule.protocol = self.protocol;
        rule
    }
}

fuzz_target!(|input: FuzzInput| {
    let rules: Vec<FilterRule> = input
        .rules
        .iter()
        .take(MAX_FILTERS)
        .map(FuzzRule::to_rule)
        .collect();

    // 포트 + 비 TCP/UDP 조합은 로드 단계에서 거부됨
    let Ok(rule_set) = FilterRuleSet::load(rules) else {
        return;
    };

    let fields = parse_headers(input.frame.as_slice());
    let result = classify(&fields, &rule_set);

    // 결정적이어야 함
    assert_eq!(result, classify(&fields, &rule_set));

    // 매칭된 인덱스는 활성 룰이며, 그보다 앞선 활성 룰은 매칭되지 않아야 함
    if let MatchResult::Matched(index) = result {
        assert!(index < rule_set.len());
        let raw = rule_set.raw_rules();
        assert!(raw[index].matches(&fields));
        for earlier in &raw[..index] {
            assert!(earlier.enabled == 0 || !earlier.matches(&fields));
        }
    }

    // 훅은 어떤 입력에도 기록 후 통과
    let hook = IngressHook::with_fresh_table(std::sync::Arc::new(rule_set));
    hook.handle(&input.frame);
    let total = hook.counters().snapshot().total_packets();
    assert_eq!(total, u64::from(matches!(result, MatchResult::Matched(_))));
});
