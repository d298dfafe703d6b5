//! eBPF 커널/유저스페이스 공유 타입 및 분류 로직
//!
//! 이 크레이트는 `#![no_std]` 환경에서 사용 가능한 공통 타입과 순수 함수를 정의합니다.
//! XDP 프로그램과 유저스페이스 엔진이 같은 헤더 파서와 분류기를 사용하므로
//! 두 경로의 매칭 결과가 항상 동일합니다.
//!
//! # 맵 구성
//! - **Array** (`FILTERS`): 필터 룰 테이블: 어태치 전에 유저스페이스가 기록, 이후 읽기 전용
//! - **PerCpuArray** (`COUNTERS`): 룰별 카운터 슬롯: CPU별 독립 카운터, 락 프리
//!
//! # 카운터 레이아웃
//! 룰 하나당 [`SLOTS_PER_RULE`]개의 `u64` 슬롯을 사용합니다.
//! ```text
//! index = rule * SLOTS_PER_RULE + slot
//! slot 0..=6  프레임 크기 버킷 (≤64, 65-127, 128-255, 256-511, 512-1023, 1024-1512, ≥1513)
//! slot 7      누적 바이트
//! slot 8      매칭 패킷 수
//! ```

#![cfg_attr(not(test), no_std)]

// =============================================================================
// 맵/프로그램 이름 상수
// =============================================================================

/// XDP 프로그램 이름
pub const PROGRAM_NAME: &str = "ifstat_xdp";
/// 필터 룰 Array 맵 이름
pub const MAP_FILTERS: &str = "FILTERS";
/// 카운터 PerCpuArray 맵 이름
pub const MAP_COUNTERS: &str = "COUNTERS";

// =============================================================================
// 테이블 용량
// =============================================================================

/// 필터 룰 테이블 최대 엔트리 수
pub const MAX_FILTERS: usize = 16;

/// 크기 버킷 수
pub const SIZE_BUCKETS: usize = 7;
/// 누적 바이트 슬롯
pub const SLOT_BYTES: usize = 7;
/// 매칭 패킷 수 슬롯
pub const SLOT_PACKETS: usize = 8;
/// 룰당 카운터 슬롯 수
pub const SLOTS_PER_RULE: usize = 9;
/// COUNTERS 맵 전체 엔트리 수
pub const COUNTER_ENTRIES: usize = MAX_FILTERS * SLOTS_PER_RULE;

/// 크기 버킷 상한 (포함). 마지막 버킷은 상한 없음.
pub const SIZE_BUCKET_UPPER: [u32; SIZE_BUCKETS - 1] = [64, 127, 255, 511, 1023, 1512];

// =============================================================================
// 프로토콜 / 이더넷 상수
// =============================================================================

/// TCP 프로토콜 번호
pub const PROTO_TCP: u8 = 6;
/// UDP 프로토콜 번호
pub const PROTO_UDP: u8 = 17;

/// 이더넷 헤더 길이
pub const ETH_HDR_LEN: usize = 14;
/// 802.1Q/802.1ad 태그 길이
pub const VLAN_HDR_LEN: usize = 4;
/// IPv4 최소 헤더 길이
pub const IPV4_MIN_HDR_LEN: usize = 20;
/// TCP 최소 헤더 길이
pub const TCP_MIN_HDR_LEN: usize = 20;
/// UDP 헤더 길이
pub const UDP_HDR_LEN: usize = 8;

/// IPv4 EtherType
pub const ETH_P_IP: u16 = 0x0800;
/// 802.1Q VLAN EtherType
pub const ETH_P_8021Q: u16 = 0x8100;
/// 802.1ad QinQ EtherType
pub const ETH_P_8021AD: u16 = 0x88A8;

// =============================================================================
// 필드 비트 (룰의 와일드카드 마스크 + 패킷의 가용 필드 마스크)
// =============================================================================

/// 출발지 IP
pub const FIELD_SRC_IP: u8 = 1 << 0;
/// 목적지 IP
pub const FIELD_DST_IP: u8 = 1 << 1;
/// 출발지 포트
pub const FIELD_SRC_PORT: u8 = 1 << 2;
/// 목적지 포트
pub const FIELD_DST_PORT: u8 = 1 << 3;
/// IP 프로토콜
pub const FIELD_PROTOCOL: u8 = 1 << 4;

// =============================================================================
// 공유 데이터 구조
// =============================================================================

/// 필터 룰의 커널 표현
///
/// `Array<RawFilterRule>` 맵에서 사용됩니다.
/// `fields` 비트가 꺼진 필드는 와일드카드이며 값은 무시됩니다.
/// 모든 값은 호스트 바이트 오더입니다.
///
/// # 메모리 레이아웃 (16 바이트, 4바이트 정렬)
/// ```text
/// offset  field       size
/// 0       src_ip      4
/// 4       dst_ip      4
/// 8       src_port    2
/// 10      dst_port    2
/// 12      protocol    1
/// 13      fields      1
/// 14      enabled     1
/// 15      _pad        1
/// ```
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(any(feature = "user", test), derive(Debug))]
pub struct RawFilterRule {
    /// 출발지 IPv4
    pub src_ip: u32,
    /// 목적지 IPv4
    pub dst_ip: u32,
    /// 출발지 포트
    pub src_port: u16,
    /// 목적지 포트
    pub dst_port: u16,
    /// IP 프로토콜 번호
    pub protocol: u8,
    /// 비교할 필드 비트 (FIELD_*)
    pub fields: u8,
    /// 활성화 여부 (0 또는 1)
    pub enabled: u8,
    /// 정렬 패딩
    pub _pad: u8,
}

// SAFETY: RawFilterRule은 #[repr(C)]이며 모든 필드가 Plain Old Data입니다.
// 패딩이 명시적으로 정의되어 있습니다.
#[cfg(feature = "user")]
unsafe impl aya::Pod for RawFilterRule {}

impl RawFilterRule {
    /// 비활성 룰 (빈 슬롯)
    pub const fn disabled() -> Self {
        Self {
            src_ip: 0,
            dst_ip: 0,
            src_port: 0,
            dst_port: 0,
            protocol: 0,
            fields: 0,
            enabled: 0,
            _pad: 0,
        }
    }

    /// 룰이 패킷과 매칭되는지 확인합니다.
    ///
    /// 비활성 룰은 항상 `false`입니다. 룰이 요구하는 필드가 패킷에 없으면
    /// 매칭되지 않습니다.
    #[inline(always)]
    pub fn matches(&self, pkt: &PacketFields) -> bool {
        if self.enabled == 0 {
            return false;
        }
        // 룰이 요구하는 필드가 모두 가용해야 함
        if self.fields & pkt.available != self.fields {
            return false;
        }
        if self.fields & FIELD_SRC_IP != 0 && pkt.src_ip != self.src_ip {
            return false;
        }
        if self.fields & FIELD_DST_IP != 0 && pkt.dst_ip != self.dst_ip {
            return false;
        }
        if self.fields & FIELD_SRC_PORT != 0 && pkt.src_port != self.src_port {
            return false;
        }
        if self.fields & FIELD_DST_PORT != 0 && pkt.dst_port != self.dst_port {
            return false;
        }
        if self.fields & FIELD_PROTOCOL != 0 && pkt.protocol != self.protocol {
            return false;
        }
        true
    }
}

/// 파싱된 패킷 헤더 필드
///
/// `available` 비트가 꺼진 필드는 헤더가 없거나 잘려서 읽지 못한 값입니다.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(any(feature = "user", test), derive(Debug))]
pub struct PacketFields {
    /// 출발지 IPv4 (호스트 바이트 오더)
    pub src_ip: u32,
    /// 목적지 IPv4 (호스트 바이트 오더)
    pub dst_ip: u32,
    /// 출발지 포트
    pub src_port: u16,
    /// 목적지 포트
    pub dst_port: u16,
    /// IP 프로토콜 번호
    pub protocol: u8,
    /// 가용 필드 비트 (FIELD_*)
    pub available: u8,
    /// 프레임 전체 길이 (바이트)
    pub len: u32,
}

impl PacketFields {
    /// 가용 필드가 없는 빈 결과를 생성합니다.
    pub const fn empty(len: u32) -> Self {
        Self {
            src_ip: 0,
            dst_ip: 0,
            src_port: 0,
            dst_port: 0,
            protocol: 0,
            available: 0,
            len,
        }
    }

    /// 해당 필드가 가용한지 확인합니다.
    #[inline(always)]
    pub fn has(&self, field: u8) -> bool {
        self.available & field == field
    }
}

// =============================================================================
// 헤더 파서
// =============================================================================

/// 경계 검사가 포함된 패킷 바이트 접근
///
/// 유저스페이스는 `[u8]`로, XDP 프로그램은 `XdpContext` 래퍼로 구현합니다.
/// 범위를 벗어나면 `None`을 반환해야 합니다.
pub trait PacketReader {
    /// 프레임 길이
    fn frame_len(&self) -> usize;
    /// `offset`의 1바이트
    fn load_u8(&self, offset: usize) -> Option<u8>;
    /// `offset`의 빅엔디언 u16
    fn load_u16_be(&self, offset: usize) -> Option<u16>;
    /// `offset`의 빅엔디언 u32
    fn load_u32_be(&self, offset: usize) -> Option<u32>;
}

impl PacketReader for [u8] {
    fn frame_len(&self) -> usize {
        self.len()
    }

    fn load_u8(&self, offset: usize) -> Option<u8> {
        self.get(offset).copied()
    }

    fn load_u16_be(&self, offset: usize) -> Option<u16> {
        let end = offset.checked_add(2)?;
        let b = self.get(offset..end)?;
        Some(u16::from_be_bytes([b[0], b[1]]))
    }

    fn load_u32_be(&self, offset: usize) -> Option<u32> {
        let end = offset.checked_add(4)?;
        let b = self.get(offset..end)?;
        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// 이더넷/IPv4/TCP·UDP 헤더에서 분류에 필요한 필드만 추출합니다.
///
/// - VLAN 태그는 한 단계까지 벗겨냅니다.
/// - IPv4가 아니거나 IP 헤더가 잘린 경우 가용 필드가 없습니다.
/// - 포트는 TCP/UDP이고 첫 번째 프래그먼트이며 L4 헤더가 온전할 때만 가용합니다.
#[inline(always)]
pub fn parse_headers<R: PacketReader + ?Sized>(reader: &R) -> PacketFields {
    let len = reader.frame_len();
    let mut fields = PacketFields::empty(len as u32);
    let _ = parse_into(reader, len, &mut fields);
    fields
}

#[inline(always)]
fn parse_into<R: PacketReader + ?Sized>(
    reader: &R,
    len: usize,
    fields: &mut PacketFields,
) -> Option<()> {
    let mut ether_type = reader.load_u16_be(12)?;
    let mut l3 = ETH_HDR_LEN;
    if ether_type == ETH_P_8021Q || ether_type == ETH_P_8021AD {
        ether_type = reader.load_u16_be(ETH_HDR_LEN + 2)?;
        l3 += VLAN_HDR_LEN;
    }
    if ether_type != ETH_P_IP {
        return None;
    }

    let version_ihl = reader.load_u8(l3)?;
    if version_ihl >> 4 != 4 {
        return None;
    }
    let ihl = ((version_ihl & 0x0f) as usize) * 4;
    if ihl < IPV4_MIN_HDR_LEN || l3 + ihl > len {
        return None;
    }

    let frag = reader.load_u16_be(l3 + 6)?;
    let protocol = reader.load_u8(l3 + 9)?;
    let src_ip = reader.load_u32_be(l3 + 12)?;
    let dst_ip = reader.load_u32_be(l3 + 16)?;

    fields.protocol = protocol;
    fields.src_ip = src_ip;
    fields.dst_ip = dst_ip;
    fields.available = FIELD_PROTOCOL | FIELD_SRC_IP | FIELD_DST_IP;

    // 후속 프래그먼트에는 L4 헤더가 없음
    if frag & 0x1fff != 0 {
        return Some(());
    }

    let l4 = l3 + ihl;
    let l4_len = match protocol {
        PROTO_TCP => TCP_MIN_HDR_LEN,
        PROTO_UDP => UDP_HDR_LEN,
        _ => return Some(()),
    };
    if l4 + l4_len > len {
        return Some(());
    }

    fields.src_port = reader.load_u16_be(l4)?;
    fields.dst_port = reader.load_u16_be(l4 + 2)?;
    fields.available |= FIELD_SRC_PORT | FIELD_DST_PORT;
    Some(())
}

// =============================================================================
// 분류기
// =============================================================================

/// 첫 번째로 매칭되는 룰의 인덱스를 반환합니다 (낮은 인덱스 우선).
///
/// 부수 효과가 없는 순수 함수입니다.
#[inline(always)]
pub fn classify(pkt: &PacketFields, rules: &[RawFilterRule]) -> Option<usize> {
    rules.iter().position(|rule| rule.matches(pkt))
}

/// 프레임 길이에 해당하는 크기 버킷 슬롯을 반환합니다.
#[inline(always)]
pub fn size_bucket(len: u32) -> usize {
    let mut bucket = 0;
    while bucket < SIZE_BUCKET_UPPER.len() {
        if len <= SIZE_BUCKET_UPPER[bucket] {
            return bucket;
        }
        bucket += 1;
    }
    SIZE_BUCKETS - 1
}

/// 룰/슬롯 쌍을 COUNTERS 맵 인덱스로 변환합니다.
#[inline(always)]
pub const fn counter_index(rule: usize, slot: usize) -> u32 {
    (rule * SLOTS_PER_RULE + slot) as u32
}
