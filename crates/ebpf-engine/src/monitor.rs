//! 모니터: 주기적 카운터 폴링
//!
//! [`Monitor`]는 `interval`마다 카운터 스냅샷을 하나씩 내놓는 지연 시퀀스입니다.
//! 대기는 [`CancellationToken`]으로 즉시 중단되며, 취소된 이후에는 항상 `None`을 반환합니다.
//! 다시 시작하려면 새 모니터를 생성해야 합니다.
//!
//! # 사용 예시
//! ```ignore
//! let mut monitor = Monitor::new(handle.counters(), Duration::from_secs(1), token.clone());
//! while let Some(snapshot) = monitor.next().await {
//!     println!("{:?}", snapshot.hits());
//! }
//! ```

use std::time::Duration;

use ifstat_core::metrics as m;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::counters::{CounterSnapshot, SIZE_BUCKET_LABELS};
use crate::platform::Counters;

/// 카운터 폴링 루프
pub struct Monitor {
    source: Counters,
    interval: Duration,
    cancel: CancellationToken,
    interface: Option<String>,
    finished: bool,
}

impl Monitor {
    /// 카운터 저장소, 폴링 간격, 취소 토큰으로 모니터를 생성합니다.
    pub fn new(source: Counters, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            source,
            interval,
            cancel,
            interface: None,
            finished: false,
        }
    }

    /// 메트릭 레이블에 사용할 인터페이스 이름을 지정합니다.
    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.interface = Some(name.into());
        self
    }

    /// 폴링 간격
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 종료 여부
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 다음 스냅샷을 기다립니다.
    ///
    /// `interval`만큼 대기한 뒤 스냅샷을 읽습니다. 읽기 실패는 로그를 남기고
    /// 다음 주기로 넘어갑니다. 대기 중 취소되면 `None`을 반환합니다.
    pub async fn next(&mut self) -> Option<CounterSnapshot> {
        loop {
            if self.finished || self.cancel.is_cancelled() {
                self.finished = true;
                return None;
            }

            let cancelled = tokio::select! {
                biased;
                () = self.cancel.cancelled() => true,
                () = tokio::time::sleep(self.interval) => false,
            };
            if cancelled {
                debug!("monitor cancelled");
                self.finished = true;
                return None;
            }

            metrics::counter!(m::MONITOR_POLLS_TOTAL).increment(1);
            match self.source.read() {
                Ok(snapshot) => {
                    self.publish(&snapshot);
                    return Some(snapshot);
                }
                Err(e) => {
                    metrics::counter!(m::MONITOR_POLL_ERRORS_TOTAL).increment(1);
                    warn!(error = %e, "counter poll failed, skipping");
                }
            }
        }
    }

    /// 취소될 때까지 스냅샷을 `sink`에 전달합니다.
    ///
    /// 전달한 스냅샷 수를 반환합니다.
    pub async fn run<F>(mut self, mut sink: F) -> u64
    where
        F: FnMut(&CounterSnapshot),
    {
        let mut emitted = 0;
        while let Some(snapshot) = self.next().await {
            sink(&snapshot);
            emitted += 1;
        }
        debug!(emitted, "monitor stopped");
        emitted
    }

    fn publish(&self, snapshot: &CounterSnapshot) {
        let interface = self.interface.clone().unwrap_or_default();
        for (index, counters) in snapshot.iter() {
            let rule = index.to_string();
            metrics::counter!(
                m::RULE_PACKETS_TOTAL,
                m::LABEL_RULE => rule.clone(),
                m::LABEL_INTERFACE => interface.clone()
            )
            .absolute(counters.packets);
            metrics::counter!(
                m::RULE_BYTES_TOTAL,
                m::LABEL_RULE => rule.clone(),
                m::LABEL_INTERFACE => interface.clone()
            )
            .absolute(counters.bytes);
            for (label, value) in SIZE_BUCKET_LABELS.iter().zip(counters.size_buckets) {
                metrics::counter!(
                    m::RULE_SIZE_BUCKET_PACKETS_TOTAL,
                    m::LABEL_RULE => rule.clone(),
                    m::LABEL_INTERFACE => interface.clone(),
                    m::LABEL_BUCKET => *label
                )
                .absolute(value);
            }
        }
    }
}
