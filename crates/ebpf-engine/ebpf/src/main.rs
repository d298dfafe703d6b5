#![no_std]
#![no_main]

use core::mem;

use aya_ebpf::{
    bindings::xdp_action,
    macros::{map, xdp},
    maps::{Array, PerCpuArray},
    programs::XdpContext,
};
use aya_log_ebpf::debug;
use ifstat_ebpf_common::{
    COUNTER_ENTRIES, MAX_FILTERS, PacketReader, RawFilterRule, SLOT_BYTES, SLOT_PACKETS,
    counter_index, parse_headers, size_bucket,
};

/// 필터 룰 테이블 (유저스페이스가 어태치 전에 기록)
#[map(name = "FILTERS")]
static FILTERS: Array<RawFilterRule> = Array::with_max_entries(MAX_FILTERS as u32, 0);

/// 룰별 카운터 슬롯 (CPU별)
#[map(name = "COUNTERS")]
static COUNTERS: PerCpuArray<u64> = PerCpuArray::with_max_entries(COUNTER_ENTRIES as u32, 0);

/// 인그레스 패킷 분류/카운트 프로그램
///
/// 모든 패킷을 통과시키며 첫 번째로 매칭되는 룰의 카운터만 증가시킵니다.
#[xdp]
pub fn ifstat_xdp(ctx: XdpContext) -> u32 {
    match try_ifstat_xdp(&ctx) {
        Ok(ret) => ret,
        Err(_) => xdp_action::XDP_PASS,
    }
}

fn try_ifstat_xdp(ctx: &XdpContext) -> Result<u32, u32> {
    let reader = XdpReader(ctx);
    let pkt = parse_headers(&reader);

    let mut rule = 0;
    while rule < MAX_FILTERS {
        if let Some(raw) = FILTERS.get(rule as u32) {
            if raw.matches(&pkt) {
                bump(ctx, rule, size_bucket(pkt.len), 1);
                bump(ctx, rule, SLOT_BYTES, pkt.len as u64);
                bump(ctx, rule, SLOT_PACKETS, 1);
                break;
            }
        }
        rule += 1;
    }

    Ok(xdp_action::XDP_PASS)
}

#[inline(always)]
fn bump(ctx: &XdpContext, rule: usize, slot: usize, delta: u64) {
    match COUNTERS.get_ptr_mut(counter_index(rule, slot)) {
        // SAFETY: per-CPU 슬롯이므로 같은 CPU에서 동시에 접근하지 않음
        Some(ptr) => unsafe { *ptr += delta },
        None => debug!(ctx, "counter slot {} missing for rule {}", slot, rule),
    }
}

/// `XdpContext`에 대한 경계 검사 바이트 리더
struct XdpReader<'a>(&'a XdpContext);

impl XdpReader<'_> {
    #[inline(always)]
    fn ptr_at<T>(&self, offset: usize) -> Option<*const T> {
        let start = self.0.data();
        let end = self.0.data_end();
        if start + offset + mem::size_of::<T>() > end {
            return None;
        }
        Some((start + offset) as *const T)
    }
}

impl PacketReader for XdpReader<'_> {
    #[inline(always)]
    fn frame_len(&self) -> usize {
        self.0.data_end() - self.0.data()
    }

    #[inline(always)]
    fn load_u8(&self, offset: usize) -> Option<u8> {
        // SAFETY: ptr_at이 data_end 경계를 검사함
        self.ptr_at::<u8>(offset).map(|p| unsafe { *p })
    }

    #[inline(always)]
    fn load_u16_be(&self, offset: usize) -> Option<u16> {
        // SAFETY: ptr_at이 data_end 경계를 검사함
        self.ptr_at::<u16>(offset)
            .map(|p| u16::from_be(unsafe { p.read_unaligned() }))
    }

    #[inline(always)]
    fn load_u32_be(&self, offset: usize) -> Option<u32> {
        // SAFETY: ptr_at이 data_end 경계를 검사함
        self.ptr_at::<u32>(offset)
            .map(|p| u32::from_be(unsafe { p.read_unaligned() }))
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
