//! 설정 관리: ifstat.toml 파싱 및 런타임 설정
//!
//! [`IfstatConfig`]는 CLI와 엔진이 사용하는 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IFSTAT_MONITOR_INTERVAL_MS=500` 형식)
//! 3. 설정 파일 (`ifstat.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ifstat_core::error::IfstatError> {
//! use ifstat_core::config::IfstatConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IfstatConfig::load("ifstat.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IfstatConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IfstatError};
use crate::types::{FilterRule, XdpMode};

/// 환경변수 필터 오버라이드(`IFSTAT_FILTER{N}_*`)를 검사할 슬롯 수
pub const ENV_FILTER_SLOTS: usize = 16;

/// ifstat 통합 설정
///
/// `ifstat.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IfstatConfig {
    /// 일반 설정 (로깅)
    #[serde(default)]
    pub general: GeneralConfig,
    /// XDP 어태치 설정
    #[serde(default)]
    pub xdp: XdpConfig,
    /// 모니터 폴링 설정
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 필터 룰 목록 (순서가 곧 우선순위)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterRule>,
}

impl IfstatConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IfstatError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본값에 환경변수 오버라이드만 적용합니다 (설정 파일 없이 실행할 때).
    pub fn from_env() -> Result<Self, IfstatError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IfstatError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IfstatError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IfstatError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IfstatError> {
        toml::from_str(toml_str).map_err(|e| {
            IfstatError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 실제로 로드할 필터 룰을 반환합니다.
    ///
    /// `[[filters]]`가 비어 있으면 모든 패킷을 세는 와일드카드 룰 하나를 사용합니다.
    pub fn effective_filters(&self) -> Vec<FilterRule> {
        if self.filters.is_empty() {
            vec![FilterRule::any().description("all")]
        } else {
            self.filters.clone()
        }
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IFSTAT_{SECTION}_{FIELD}`
    /// 예: `IFSTAT_XDP_MODE=native`
    ///
    /// 필터는 `IFSTAT_FILTER{N}_{ENABLED,SRC_IP,DST_IP,SRC_PORT,DST_PORT,IPPROTO}`
    /// 형식이며 `any`, `*`, `-1` 값은 와일드카드입니다.
    ///
    /// 섹션 값의 파싱 실패는 경고 후 무시하지만, 필터 값의 파싱 실패는
    /// `ConfigError::InvalidValue`로 반환합니다. 잘못된 필터 값을 무시하면
    /// 모든 패킷을 세는 와일드카드 룰이 남기 때문입니다.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // General
        override_string(&mut self.general.log_level, "IFSTAT_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IFSTAT_GENERAL_LOG_FORMAT");

        // XDP
        override_parsed(&mut self.xdp.mode, "IFSTAT_XDP_MODE");
        override_string(&mut self.xdp.program_path, "IFSTAT_XDP_PROGRAM_PATH");

        // Monitor
        override_parsed(&mut self.monitor.interval_ms, "IFSTAT_MONITOR_INTERVAL_MS");

        // Metrics
        override_parsed(&mut self.metrics.enabled, "IFSTAT_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "IFSTAT_METRICS_LISTEN_ADDR");
        override_parsed(&mut self.metrics.port, "IFSTAT_METRICS_PORT");

        // Filters
        for slot in 0..ENV_FILTER_SLOTS {
            self.apply_filter_env_override(slot)?;
        }
        Ok(())
    }

    fn apply_filter_env_override(&mut self, slot: usize) -> Result<(), ConfigError> {
        let prefix = format!("IFSTAT_FILTER{slot}_");
        let present = ["ENABLED", "SRC_IP", "DST_IP", "SRC_PORT", "DST_PORT", "IPPROTO"]
            .iter()
            .any(|field| std::env::var(format!("{prefix}{field}")).is_ok());
        if !present {
            return Ok(());
        }

        // 앞쪽 빈 슬롯은 비활성 룰로 채워 인덱스를 보존
        while self.filters.len() <= slot {
            self.filters.push(FilterRule::any().enabled(false));
        }

        // 모든 값을 먼저 파싱한 뒤 슬롯을 갱신
        let mut rule = self.filters[slot].clone();
        rule.enabled = true;
        override_flag(&mut rule.enabled, &format!("{prefix}ENABLED"))?;
        override_wildcard::<Ipv4Addr>(&mut rule.src_ip, &format!("{prefix}SRC_IP"))?;
        override_wildcard::<Ipv4Addr>(&mut rule.dst_ip, &format!("{prefix}DST_IP"))?;
        override_wildcard::<u16>(&mut rule.src_port, &format!("{prefix}SRC_PORT"))?;
        override_wildcard::<u16>(&mut rule.dst_port, &format!("{prefix}DST_PORT"))?;
        override_wildcard::<u8>(&mut rule.protocol, &format!("{prefix}IPPROTO"))?;
        self.filters[slot] = rule;
        Ok(())
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 필터 룰 자체의 검증(용량, 포트/프로토콜 조합)은 엔진의 룰셋 로드 단계에서 수행합니다.
    pub fn validate(&self) -> Result<(), IfstatError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.xdp.program_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "xdp.program_path".to_owned(),
                reason: "program path must not be empty".to_owned(),
            }
            .into());
        }

        if self.monitor.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "monitor.interval_ms".to_owned(),
                reason: "interval must be greater than zero".to_owned(),
            }
            .into());
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "metrics.port".to_owned(),
                reason: "port must be greater than zero when metrics are enabled".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// XDP 어태치 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XdpConfig {
    /// XDP 모드 (skb, native, hw)
    pub mode: XdpMode,
    /// 컴파일된 BPF 오브젝트 경로
    pub program_path: String,
}

impl Default for XdpConfig {
    fn default() -> Self {
        Self {
            mode: XdpMode::Skb,
            program_path: "target/bpfel-unknown-none/release/ifstat-ebpf".to_owned(),
        }
    }
}

/// 모니터 폴링 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 폴링 간격 (밀리초)
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: FromStr>(target: &mut T, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_flag(target: &mut bool, env_key: &str) -> Result<(), ConfigError> {
    if let Ok(val) = std::env::var(env_key) {
        match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: env_key.to_owned(),
                    reason: format!("'{val}' is not a boolean flag"),
                });
            }
        }
    }
    Ok(())
}

fn override_wildcard<T>(target: &mut Option<T>, env_key: &str) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(val) = std::env::var(env_key) {
        let trimmed = val.trim();
        if is_wildcard(trimmed) {
            *target = None;
            return Ok(());
        }
        let parsed = trimmed
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                field: env_key.to_owned(),
                reason: format!("'{val}': {e}"),
            })?;
        *target = Some(parsed);
    }
    Ok(())
}

fn is_wildcard(val: &str) -> bool {
    val.eq_ignore_ascii_case("any") || val == "*" || val == "-1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = IfstatConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.xdp.mode, XdpMode::Skb);
        assert_eq!(config.monitor.interval_ms, 1000);
        assert!(!config.metrics.enabled);
        assert!(config.filters.is_empty());
    }

    #[test]
    fn default_config_passes_validation() {
        IfstatConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_filters_fall_back_to_wildcard_rule() {
        let config = IfstatConfig::default();
        let filters = config.effective_filters();
        assert_eq!(filters.len(), 1);
        assert!(filters[0].enabled);
        assert!(filters[0].dst_port.is_none());
    }

    #[test]
    fn parse_filters_keep_order() {
        let toml = r#"
[[filters]]
dst_port = 80
protocol = 6

[[filters]]
src_ip = "10.0.0.1"
enabled = false
"#;
        let config = IfstatConfig::parse(toml).unwrap();
        assert_eq!(config.filters.len(), 2);
        assert_eq!(config.filters[0].dst_port, Some(80));
        assert_eq!(config.filters[1].src_ip, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!config.filters[1].enabled);
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let err = IfstatConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            IfstatError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn parse_rejects_unknown_xdp_mode() {
        let err = IfstatConfig::parse("[xdp]\nmode = \"turbo\"").unwrap_err();
        assert!(matches!(
            err,
            IfstatError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = IfstatConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = IfstatConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = IfstatConfig::default();
        config.monitor.interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("interval_ms"));
    }

    #[test]
    fn validate_rejects_empty_program_path() {
        let mut config = IfstatConfig::default();
        config.xdp.program_path = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("program_path"));
    }

    #[test]
    fn wildcard_tokens() {
        assert!(is_wildcard("any"));
        assert!(is_wildcard("ANY"));
        assert!(is_wildcard("*"));
        assert!(is_wildcard("-1"));
        assert!(!is_wildcard("80"));
    }

    #[test]
    #[serial]
    fn env_override_parsed_valid() {
        let mut val = 1000u64;
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("TEST_IFSTAT_U64", "250") };
        override_parsed(&mut val, "TEST_IFSTAT_U64");
        assert_eq!(val, 250);
        unsafe { std::env::remove_var("TEST_IFSTAT_U64") };
    }

    #[test]
    #[serial]
    fn env_override_parsed_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("TEST_IFSTAT_BOOL_BAD", "not-a-bool") };
        override_parsed(&mut val, "TEST_IFSTAT_BOOL_BAD");
        assert!(!val);
        unsafe { std::env::remove_var("TEST_IFSTAT_BOOL_BAD") };
    }

    #[test]
    #[serial]
    fn env_override_wildcard_clears_field() {
        let mut val = Some(80u16);
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("TEST_IFSTAT_PORT", "-1") };
        override_wildcard(&mut val, "TEST_IFSTAT_PORT").unwrap();
        assert_eq!(val, None);
        unsafe { std::env::remove_var("TEST_IFSTAT_PORT") };
    }

    #[test]
    #[serial]
    fn env_filter_slot_creates_padding_rules() {
        let mut config = IfstatConfig::default();
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("IFSTAT_FILTER1_DST_PORT", "443") };
        config.apply_env_overrides().unwrap();
        unsafe { std::env::remove_var("IFSTAT_FILTER1_DST_PORT") };

        assert_eq!(config.filters.len(), 2);
        assert!(!config.filters[0].enabled, "slot 0 is padding");
        assert!(config.filters[1].enabled);
        assert_eq!(config.filters[1].dst_port, Some(443));
    }

    #[test]
    #[serial]
    fn env_filter_enabled_accepts_numeric_flag() {
        let mut config = IfstatConfig::default();
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("IFSTAT_FILTER0_ENABLED", "0") };
        config.apply_env_overrides().unwrap();
        unsafe { std::env::remove_var("IFSTAT_FILTER0_ENABLED") };

        assert_eq!(config.filters.len(), 1);
        assert!(!config.filters[0].enabled);
    }

    #[test]
    #[serial]
    fn env_filter_protocol_out_of_range_is_rejected() {
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("IFSTAT_FILTER0_IPPROTO", "300") };
        let result = IfstatConfig::from_env();
        unsafe { std::env::remove_var("IFSTAT_FILTER0_IPPROTO") };

        match result {
            Err(IfstatError::Config(ConfigError::InvalidValue { field, .. })) => {
                assert_eq!(field, "IFSTAT_FILTER0_IPPROTO");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn env_filter_port_out_of_range_is_rejected() {
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("IFSTAT_FILTER0_DST_PORT", "70000") };
        let result = IfstatConfig::from_env();
        unsafe { std::env::remove_var("IFSTAT_FILTER0_DST_PORT") };

        match result {
            Err(IfstatError::Config(ConfigError::InvalidValue { field, .. })) => {
                assert_eq!(field, "IFSTAT_FILTER0_DST_PORT");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn env_filter_bad_value_leaves_rules_untouched() {
        let mut config = IfstatConfig::default();
        config.filters.push(FilterRule::any().dst_port(22).protocol(6));
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe {
            std::env::set_var("IFSTAT_FILTER0_SRC_IP", "10.0.0.300");
            std::env::set_var("IFSTAT_FILTER0_ENABLED", "maybe");
        }
        let err = config.apply_env_overrides().unwrap_err();
        unsafe {
            std::env::remove_var("IFSTAT_FILTER0_SRC_IP");
            std::env::remove_var("IFSTAT_FILTER0_ENABLED");
        }

        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert_eq!(config.filters[0].dst_port, Some(22));
        assert!(config.filters[0].src_ip.is_none());
    }

    #[test]
    fn config_serialize_roundtrip() {
        let mut config = IfstatConfig::default();
        config.filters.push(FilterRule::any().dst_port(53).protocol(17));
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = IfstatConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed.filters, config.filters);
        assert_eq!(parsed.monitor.interval_ms, config.monitor.interval_ms);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = IfstatConfig::from_file("/nonexistent/path/ifstat.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IfstatError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
