//! 이더넷 프레임 생성기
//!
//! 소프트웨어 플랫폼에 패킷을 주입하거나 분류기를 벤치마크할 때
//! 올바른 Ethernet/IPv4/TCP·UDP 프레임을 만듭니다.

use std::net::Ipv4Addr;

use ifstat_ebpf_common::{
    ETH_P_8021Q, ETH_P_IP, IPV4_MIN_HDR_LEN, PROTO_TCP, PROTO_UDP, TCP_MIN_HDR_LEN, UDP_HDR_LEN,
};

/// 테스트/주입용 프레임 빌더
///
/// # 사용 예시
/// ```
/// use std::net::Ipv4Addr;
/// use ifstat_ebpf_engine::frame::FrameBuilder;
///
/// let frame = FrameBuilder::tcp(Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1), 40000, 80)
///     .payload(100)
///     .build();
/// assert_eq!(frame.len(), 14 + 20 + 20 + 100);
/// ```
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    ether_type: u16,
    vlan: Option<u16>,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    protocol: u8,
    src_port: u16,
    dst_port: u16,
    payload: usize,
}

impl FrameBuilder {
    /// TCP 세그먼트를 담은 프레임
    pub fn tcp(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, src_port: u16, dst_port: u16) -> Self {
        Self::ip(src_ip, dst_ip, PROTO_TCP).ports(src_port, dst_port)
    }

    /// UDP 데이터그램을 담은 프레임
    pub fn udp(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, src_port: u16, dst_port: u16) -> Self {
        Self::ip(src_ip, dst_ip, PROTO_UDP).ports(src_port, dst_port)
    }

    /// 임의 프로토콜의 IPv4 패킷 프레임
    pub fn ip(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, protocol: u8) -> Self {
        Self {
            ether_type: ETH_P_IP,
            vlan: None,
            src_ip,
            dst_ip,
            protocol,
            src_port: 0,
            dst_port: 0,
            payload: 0,
        }
    }

    /// EtherType을 지정합니다 (IPv4 이외의 프레임 생성용).
    pub fn ether_type(mut self, ether_type: u16) -> Self {
        self.ether_type = ether_type;
        self
    }

    /// 802.1Q 태그를 추가합니다.
    pub fn vlan(mut self, id: u16) -> Self {
        self.vlan = Some(id & 0x0fff);
        self
    }

    /// 포트를 지정합니다.
    pub fn ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }

    /// L4 헤더 뒤 페이로드 길이를 지정합니다.
    pub fn payload(mut self, len: usize) -> Self {
        self.payload = len;
        self
    }

    /// 프레임 바이트를 생성합니다.
    pub fn build(&self) -> Vec<u8> {
        let l4_len = match self.protocol {
            PROTO_TCP => TCP_MIN_HDR_LEN,
            PROTO_UDP => UDP_HDR_LEN,
            _ => 0,
        };

        let mut frame = Vec::with_capacity(18 + IPV4_MIN_HDR_LEN + l4_len + self.payload);
        // dst/src MAC
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01, 0x02, 0, 0, 0, 0, 0x02]);
        if let Some(id) = self.vlan {
            frame.extend_from_slice(&ETH_P_8021Q.to_be_bytes());
            frame.extend_from_slice(&id.to_be_bytes());
        }
        frame.extend_from_slice(&self.ether_type.to_be_bytes());

        let total_len = (IPV4_MIN_HDR_LEN + l4_len + self.payload).min(usize::from(u16::MAX)) as u16;
        frame.push(0x45);
        frame.push(0);
        frame.extend_from_slice(&total_len.to_be_bytes());
        frame.extend_from_slice(&[0, 0, 0x40, 0]); // id, DF
        frame.push(64);
        frame.push(self.protocol);
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&self.src_ip.octets());
        frame.extend_from_slice(&self.dst_ip.octets());

        if l4_len > 0 {
            frame.extend_from_slice(&self.src_port.to_be_bytes());
            frame.extend_from_slice(&self.dst_port.to_be_bytes());
            if self.protocol == PROTO_TCP {
                frame.extend_from_slice(&[0; 8]);
                frame.push(0x50);
                frame.push(0x02);
                frame.extend_from_slice(&[0; 6]);
            } else {
                let udp_len = (UDP_HDR_LEN + self.payload).min(usize::from(u16::MAX)) as u16;
                frame.extend_from_slice(&udp_len.to_be_bytes());
                frame.extend_from_slice(&[0, 0]);
            }
        }

        frame.resize(frame.len() + self.payload, 0);
        frame
    }
}
