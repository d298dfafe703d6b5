//! 카운터 테이블: 룰별 원자적 히트 카운터
//!
//! [`CounterTable`]은 슬롯마다 독립된 `AtomicU64`를 사용합니다.
//! 증가 연산은 테이블 전체 락 없이 수행되므로 스냅샷 읽기와 직렬화되지 않습니다.
//!
//! # 데이터 흐름
//! ```text
//! IngressHook ──record()──▶ CounterTable ──snapshot()──▶ CounterSnapshot ──▶ Monitor
//!   (per packet)            (AtomicU64 slots)            (BTreeMap)
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ifstat_core::error::{CounterReadError, StaleIndexWarning};
use ifstat_core::metrics as m;
use ifstat_ebpf_common::{SIZE_BUCKETS, size_bucket};
use serde::Serialize;
use tracing::warn;

/// 크기 버킷 레이블 (출력/메트릭용)
pub const SIZE_BUCKET_LABELS: [&str; SIZE_BUCKETS] = [
    "0-64", "65-127", "128-255", "256-511", "512-1023", "1024-1512", "1513+",
];

/// 카운터 스냅샷을 제공하는 저장소
///
/// 유저스페이스 [`CounterTable`]과 커널 per-CPU 맵이 구현합니다.
pub trait CounterSource: Send + Sync {
    /// 현재 카운터의 시점 스냅샷을 읽습니다.
    fn read(&self) -> Result<CounterSnapshot, CounterReadError>;
}

/// 단일 룰의 카운터 값
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuleCounters {
    /// 매칭 패킷 수
    pub packets: u64,
    /// 매칭 바이트 수
    pub bytes: u64,
    /// 프레임 크기 분포
    pub size_buckets: [u64; SIZE_BUCKETS],
}

/// 카운터 테이블의 시점 스냅샷
///
/// 로드된 모든 룰 인덱스를 포함합니다 (매칭이 없던 룰은 0).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    rules: BTreeMap<usize, RuleCounters>,
}

impl CounterSnapshot {
    /// 룰 카운터를 추가합니다.
    pub fn insert(&mut self, index: usize, counters: RuleCounters) {
        self.rules.insert(index, counters);
    }

    /// `{rule_index: hit_count}` 매핑을 반환합니다.
    pub fn hits(&self) -> BTreeMap<usize, u64> {
        self.rules
            .iter()
            .map(|(index, counters)| (*index, counters.packets))
            .collect()
    }

    /// 인덱스로 룰 카운터를 조회합니다.
    pub fn get(&self, index: usize) -> Option<&RuleCounters> {
        self.rules.get(&index)
    }

    /// 인덱스 순으로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &RuleCounters)> {
        self.rules.iter().map(|(index, counters)| (*index, counters))
    }

    /// 룰 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 모든 룰의 매칭 패킷 합계
    pub fn total_packets(&self) -> u64 {
        self.rules.values().map(|c| c.packets).sum()
    }
}

#[derive(Debug, Default)]
struct Slot {
    packets: AtomicU64,
    bytes: AtomicU64,
    size_buckets: [AtomicU64; SIZE_BUCKETS],
}

impl Slot {
    fn load(&self) -> RuleCounters {
        let mut counters = RuleCounters {
            packets: self.packets.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            size_buckets: [0; SIZE_BUCKETS],
        };
        for (dst, src) in counters.size_buckets.iter_mut().zip(&self.size_buckets) {
            *dst = src.load(Ordering::Relaxed);
        }
        counters
    }
}

/// 룰 인덱스별 원자적 카운터 테이블
///
/// 어태치마다 새로 생성되며 0에서 시작합니다. 값은 감소하지 않습니다.
#[derive(Debug)]
pub struct CounterTable {
    slots: Box<[Slot]>,
    stale: AtomicU64,
}

impl CounterTable {
    /// `slots`개의 0으로 초기화된 카운터를 생성합니다.
    pub fn new(slots: usize) -> Self {
        Self {
            slots: (0..slots).map(|_| Slot::default()).collect(),
            stale: AtomicU64::new(0),
        }
    }

    /// 슬롯 수를 반환합니다.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 히트 카운터를 1 증가시킵니다.
    ///
    /// 범위를 벗어난 인덱스는 경고를 남기고 무시합니다.
    #[inline]
    pub fn increment(&self, index: usize) {
        if let Some(slot) = self.slot(index) {
            slot.packets.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 패킷 한 개를 기록합니다 (히트, 바이트, 크기 버킷).
    #[inline]
    pub fn record(&self, index: usize, frame_len: u32) {
        if let Some(slot) = self.slot(index) {
            slot.size_buckets[size_bucket(frame_len)].fetch_add(1, Ordering::Relaxed);
            slot.bytes.fetch_add(u64::from(frame_len), Ordering::Relaxed);
            slot.packets.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 현재 값을 읽습니다. 증가 연산을 막지 않습니다.
    pub fn snapshot(&self) -> CounterSnapshot {
        let mut snapshot = CounterSnapshot::default();
        for (index, slot) in self.slots.iter().enumerate() {
            snapshot.insert(index, slot.load());
        }
        snapshot
    }

    /// 무시된 stale 인덱스 증가 요청 수
    pub fn stale_increments(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    #[inline]
    fn slot(&self, index: usize) -> Option<&Slot> {
        let slot = self.slots.get(index);
        if slot.is_none() {
            self.note_stale(index);
        }
        slot
    }

    #[cold]
    fn note_stale(&self, index: usize) {
        let seen = self.stale.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::counter!(m::STALE_INDEX_TOTAL).increment(1);
        // 1, 2, 4, 8 ... 번째에만 로그
        if seen.is_power_of_two() {
            let warning = StaleIndexWarning {
                index,
                capacity: self.slots.len(),
            };
            warn!(%warning, ignored = seen, "counter increment skipped");
        }
    }
}

impl CounterSource for CounterTable {
    fn read(&self) -> Result<CounterSnapshot, CounterReadError> {
        Ok(self.snapshot())
    }
}
