//! 도메인 타입: 필터 룰과 XDP 모드
//!
//! 설정 파일의 `[[filters]]` 항목과 `[xdp]` 섹션이 이 타입으로 역직렬화됩니다.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// TCP 프로토콜 번호
pub const IPPROTO_TCP: u8 = 6;
/// UDP 프로토콜 번호
pub const IPPROTO_UDP: u8 = 17;

/// 필터 룰
///
/// IP/포트/프로토콜 조합으로 카운트 대상을 지정합니다.
/// `None` 필드는 "모든 값"을 의미합니다 (와일드카드).
/// 활성화된 필드는 모두 일치해야 룰이 매칭됩니다 (AND).
///
/// # 설정 예시 (TOML)
/// ```toml
/// [[filters]]
/// dst_port = 80
/// protocol = 6
/// description = "http"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterRule {
    /// 활성화 여부 (비활성 룰은 절대 매칭되지 않음)
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 출발지 IPv4 (None이면 모든 주소)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ip: Option<Ipv4Addr>,
    /// 목적지 IPv4 (None이면 모든 주소)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_ip: Option<Ipv4Addr>,
    /// 출발지 포트 (None이면 모든 포트)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_port: Option<u16>,
    /// 목적지 포트 (None이면 모든 포트)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<u16>,
    /// IP 프로토콜 번호 (None이면 모든 프로토콜, 6=TCP, 17=UDP)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<u8>,
    /// 출력용 설명
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

fn default_enabled() -> bool {
    true
}

impl FilterRule {
    /// 모든 필드가 와일드카드인 활성 룰을 생성합니다.
    pub fn any() -> Self {
        Self {
            enabled: true,
            src_ip: None,
            dst_ip: None,
            src_port: None,
            dst_port: None,
            protocol: None,
            description: String::new(),
        }
    }

    /// 출발지 IP를 지정합니다.
    pub fn src_ip(mut self, ip: Ipv4Addr) -> Self {
        self.src_ip = Some(ip);
        self
    }

    /// 목적지 IP를 지정합니다.
    pub fn dst_ip(mut self, ip: Ipv4Addr) -> Self {
        self.dst_ip = Some(ip);
        self
    }

    /// 출발지 포트를 지정합니다.
    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = Some(port);
        self
    }

    /// 목적지 포트를 지정합니다.
    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = Some(port);
        self
    }

    /// 프로토콜을 지정합니다.
    pub fn protocol(mut self, proto: u8) -> Self {
        self.protocol = Some(proto);
        self
    }

    /// 설명을 지정합니다.
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    /// 활성화 여부를 지정합니다.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 포트 필드가 하나라도 지정되어 있는지 확인합니다.
    pub fn has_port_filter(&self) -> bool {
        self.src_port.is_some() || self.dst_port.is_some()
    }
}

impl Default for FilterRule {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "*".to_owned(), ToString::to_string)
        }
        write!(
            f,
            "{}:{} -> {}:{} proto={}{}",
            field(&self.src_ip),
            field(&self.src_port),
            field(&self.dst_ip),
            field(&self.dst_port),
            field(&self.protocol),
            if self.enabled { "" } else { " (disabled)" },
        )
    }
}

/// XDP 어태치 모드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XdpMode {
    /// 제네릭 모드 (모든 드라이버, veth/macvlan 포함)
    #[default]
    Skb,
    /// 드라이버 네이티브 모드
    Native,
    /// NIC 하드웨어 오프로드
    Hw,
}

impl XdpMode {
    /// 설정 파일 표기를 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skb => "skb",
            Self::Native => "native",
            Self::Hw => "hw",
        }
    }
}

impl fmt::Display for XdpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for XdpMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skb" | "generic" => Ok(Self::Skb),
            "native" | "driver" | "drv" => Ok(Self::Native),
            "hw" | "offload" => Ok(Self::Hw),
            other => Err(format!("unknown xdp mode '{other}', expected skb, native or hw")),
        }
    }
}
