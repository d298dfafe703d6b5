//! 필터 룰 집합: 검증 및 커널 표현 변환
//!
//! [`FilterRuleSet`]은 설정에서 읽은 [`FilterRule`] 목록을 검증하고
//! 고정 크기 [`RawFilterRule`] 테이블로 인코딩합니다.
//! 로드 이후에는 불변이며 `Arc`로 공유됩니다.
//!
//! # 인코딩
//! ```text
//! FilterRule { dst_port: Some(80), protocol: Some(6), .. }
//!     → RawFilterRule { dst_port: 80, protocol: 6, fields: DST_PORT | PROTOCOL, enabled: 1 }
//! ```

use std::net::Ipv4Addr;

use ifstat_core::error::ConfigError;
use ifstat_core::types::{FilterRule, IPPROTO_TCP, IPPROTO_UDP};
use ifstat_ebpf_common::{
    FIELD_DST_IP, FIELD_DST_PORT, FIELD_PROTOCOL, FIELD_SRC_IP, FIELD_SRC_PORT, MAX_FILTERS,
    RawFilterRule,
};

/// 검증된 불변 필터 룰 집합
///
/// 룰 순서는 설정 순서를 그대로 유지합니다 (낮은 인덱스 우선 매칭).
#[derive(Debug, Clone)]
pub struct FilterRuleSet {
    rules: Vec<FilterRule>,
    raw: [RawFilterRule; MAX_FILTERS],
}

impl FilterRuleSet {
    /// 룰 목록을 검증하여 룰 집합을 생성합니다.
    ///
    /// # 에러
    /// - 룰 수가 [`MAX_FILTERS`]를 초과하는 경우
    /// - 포트 필터가 TCP/UDP 이외의 프로토콜과 결합된 경우 (절대 매칭 불가)
    pub fn load(rules: Vec<FilterRule>) -> Result<Self, ConfigError> {
        if rules.len() > MAX_FILTERS {
            return Err(ConfigError::InvalidValue {
                field: "filters".to_owned(),
                reason: format!(
                    "{} rules configured, table capacity is {MAX_FILTERS}",
                    rules.len()
                ),
            });
        }

        let mut raw = [RawFilterRule::disabled(); MAX_FILTERS];
        for (index, rule) in rules.iter().enumerate() {
            validate_rule(index, rule)?;
            raw[index] = encode(rule);
        }

        Ok(Self { rules, raw })
    }

    /// 룰 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 룰이 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 인덱스로 룰을 조회합니다.
    pub fn get(&self, index: usize) -> Option<&FilterRule> {
        self.rules.get(index)
    }

    /// 설정 순서대로 룰을 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = &FilterRule> {
        self.rules.iter()
    }

    /// 로드된 룰에 해당하는 커널 표현 슬라이스입니다.
    pub fn raw_rules(&self) -> &[RawFilterRule] {
        &self.raw[..self.rules.len()]
    }

    /// 커널 `FILTERS` 맵에 기록할 전체 테이블을 반환합니다 (빈 슬롯은 비활성).
    pub fn to_raw(&self) -> [RawFilterRule; MAX_FILTERS] {
        self.raw
    }

    /// 출력용 룰 이름을 반환합니다 (설명이 없으면 룰 표현식).
    pub fn label(&self, index: usize) -> Option<String> {
        self.rules.get(index).map(|rule| {
            if rule.description.is_empty() {
                rule.to_string()
            } else {
                rule.description.clone()
            }
        })
    }
}

fn validate_rule(index: usize, rule: &FilterRule) -> Result<(), ConfigError> {
    if let Some(proto) = rule.protocol {
        if rule.has_port_filter() && proto != IPPROTO_TCP && proto != IPPROTO_UDP {
            return Err(ConfigError::InvalidValue {
                field: format!("filters[{index}].protocol"),
                reason: format!(
                    "port filter requires protocol {IPPROTO_TCP} (tcp) or {IPPROTO_UDP} (udp), got {proto}"
                ),
            });
        }
    }
    Ok(())
}

/// 단일 룰을 커널 표현으로 인코딩합니다.
pub fn encode(rule: &FilterRule) -> RawFilterRule {
    let mut raw = RawFilterRule::disabled();
    raw.enabled = u8::from(rule.enabled);

    if let Some(ip) = rule.src_ip {
        raw.src_ip = ip_to_host(ip);
        raw.fields |= FIELD_SRC_IP;
    }
    if let Some(ip) = rule.dst_ip {
        raw.dst_ip = ip_to_host(ip);
        raw.fields |= FIELD_DST_IP;
    }
    if let Some(port) = rule.src_port {
        raw.src_port = port;
        raw.fields |= FIELD_SRC_PORT;
    }
    if let Some(port) = rule.dst_port {
        raw.dst_port = port;
        raw.fields |= FIELD_DST_PORT;
    }
    if let Some(proto) = rule.protocol {
        raw.protocol = proto;
        raw.fields |= FIELD_PROTOCOL;
    }
    raw
}

#[inline]
fn ip_to_host(ip: Ipv4Addr) -> u32 {
    u32::from(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_preserves_order() {
        let set = FilterRuleSet::load(vec![
            FilterRule::any().dst_port(80).description("http"),
            FilterRule::any().dst_port(53).description("dns"),
        ])
        .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0).unwrap().description, "http");
        assert_eq!(set.get(1).unwrap().description, "dns");
        assert_eq!(set.raw_rules().len(), 2);
    }

    #[test]
    fn load_rejects_over_capacity() {
        let rules = vec![FilterRule::any(); MAX_FILTERS + 1];
        let err = FilterRuleSet::load(rules).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "filters"));
    }

    #[test]
    fn load_accepts_full_table() {
        let set = FilterRuleSet::load(vec![FilterRule::any(); MAX_FILTERS]).unwrap();
        assert_eq!(set.len(), MAX_FILTERS);
        assert!(set.to_raw().iter().all(|r| r.enabled == 1));
    }

    #[test]
    fn load_rejects_port_with_icmp() {
        let err = FilterRuleSet::load(vec![FilterRule::any().dst_port(80).protocol(1)]).unwrap_err();
        assert!(err.to_string().contains("filters[0].protocol"));
    }

    #[test]
    fn load_accepts_port_without_protocol() {
        assert!(FilterRuleSet::load(vec![FilterRule::any().src_port(1234)]).is_ok());
    }

    #[test]
    fn empty_set_is_allowed() {
        let set = FilterRuleSet::load(Vec::new()).unwrap();
        assert!(set.is_empty());
        assert!(set.to_raw().iter().all(|r| r.enabled == 0));
    }

    #[test]
    fn encode_sets_presence_bits() {
        let raw = encode(
            &FilterRule::any()
                .dst_ip(Ipv4Addr::new(10, 0, 0, 1))
                .dst_port(443)
                .protocol(IPPROTO_TCP),
        );
        assert_eq!(raw.fields, FIELD_DST_IP | FIELD_DST_PORT | FIELD_PROTOCOL);
        assert_eq!(raw.dst_ip, 0x0a00_0001);
        assert_eq!(raw.dst_port, 443);
        assert_eq!(raw.enabled, 1);
    }

    #[test]
    fn encode_keeps_all_ones_values_matchable() {
        let raw = encode(
            &FilterRule::any()
                .src_ip(Ipv4Addr::BROADCAST)
                .src_port(u16::MAX),
        );
        assert_eq!(raw.fields, FIELD_SRC_IP | FIELD_SRC_PORT);
        assert_eq!(raw.src_ip, u32::MAX);
    }

    #[test]
    fn encode_disabled_rule() {
        let raw = encode(&FilterRule::any().enabled(false));
        assert_eq!(raw.enabled, 0);
    }

    #[test]
    fn label_falls_back_to_expression() {
        let set = FilterRuleSet::load(vec![
            FilterRule::any().description("web"),
            FilterRule::any().dst_port(22),
        ])
        .unwrap();
        assert_eq!(set.label(0).as_deref(), Some("web"));
        assert_eq!(set.label(1).as_deref(), Some("*:* -> *:22 proto=*"));
        assert_eq!(set.label(2), None);
    }
}
