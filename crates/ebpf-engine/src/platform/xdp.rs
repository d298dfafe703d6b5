//! XDP 훅 플랫폼 (aya)
//!
//! # 어태치 순서
//! 1. 인터페이스 존재 확인 (`/sys/class/net/<if>`)
//! 2. BPF 오브젝트 로드 (`Ebpf::load_file`) + aya-log 초기화
//! 3. `FILTERS` Array 맵에 룰 테이블 기록
//! 4. `ifstat_xdp` 프로그램 로드 및 XDP 어태치
//! 5. `COUNTERS` PerCpuArray 맵을 카운터 저장소로 반환
//!
//! # Linux 전용
//! 비-Linux 타겟에서는 모든 어태치가 `AttachError::Unsupported`로 실패합니다.

use std::path::{Path, PathBuf};

#[cfg(target_os = "linux")]
pub use linux::XdpPlatform;

#[cfg(not(target_os = "linux"))]
pub use stub::XdpPlatform;

/// 인터페이스 이름 최대 길이 (IFNAMSIZ - 1)
const IFNAME_MAX: usize = 15;

/// 커널 인터페이스 이름 규칙을 만족하는지 확인합니다.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn is_valid_ifname(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= IFNAME_MAX
        && name != "."
        && name != ".."
        && !name.contains(['/', ':'])
        && !name.chars().any(char::is_whitespace)
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn default_sysfs_net() -> PathBuf {
    PathBuf::from("/sys/class/net")
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn interface_exists(sysfs_net: &Path, name: &str) -> bool {
    is_valid_ifname(name) && sysfs_net.join(name).exists()
}

#[cfg(target_os = "linux")]
mod linux {
    use std::collections::HashMap;
    use std::error::Error as StdError;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex, PoisonError};

    use aya::Ebpf;
    use aya::maps::{Array, MapData, PerCpuArray};
    use aya::programs::xdp::XdpLinkId;
    use aya::programs::{ProgramError, Xdp, XdpFlags};
    use aya_log::EbpfLogger;
    use ifstat_core::error::{AttachError, CounterReadError, DetachError};
    use ifstat_core::types::XdpMode;
    use ifstat_ebpf_common::{
        MAP_COUNTERS, MAP_FILTERS, PROGRAM_NAME, RawFilterRule, SIZE_BUCKETS, SLOT_BYTES,
        SLOT_PACKETS, counter_index,
    };
    use tracing::{debug, info, warn};

    use super::super::{AttachFlags, Counters, HookPlatform};
    use super::{default_sysfs_net, interface_exists};
    use crate::counters::{CounterSnapshot, CounterSource, RuleCounters};
    use crate::rules::FilterRuleSet;

    const EBUSY: i32 = 16;
    const EEXIST: i32 = 17;
    const EOPNOTSUPP: i32 = 95;

    struct Loaded {
        bpf: Ebpf,
        /// 디태치 실패 후에는 aya가 링크를 이미 해제했으므로 `None`
        link: Option<XdpLinkId>,
    }

    /// Linux XDP 플랫폼
    pub struct XdpPlatform {
        program_path: PathBuf,
        sysfs_net: PathBuf,
        loaded: Mutex<HashMap<String, Loaded>>,
    }

    impl std::fmt::Debug for XdpPlatform {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("XdpPlatform")
                .field("program_path", &self.program_path)
                .finish_non_exhaustive()
        }
    }

    impl XdpPlatform {
        /// BPF 오브젝트 경로로 플랫폼을 생성합니다.
        pub fn new(program_path: impl Into<PathBuf>) -> Self {
            Self {
                program_path: program_path.into(),
                sysfs_net: default_sysfs_net(),
                loaded: Mutex::new(HashMap::new()),
            }
        }

        /// BPF 오브젝트 경로
        pub fn program_path(&self) -> &Path {
            &self.program_path
        }

        fn load(&self, interface: &str) -> Result<Ebpf, AttachError> {
            if !self.program_path.exists() {
                return Err(AttachError::ProgramLoad(format!(
                    "BPF object not found at {} (run `cargo run -p xtask -- build-ebpf --release`)",
                    self.program_path.display()
                )));
            }
            let mut bpf = Ebpf::load_file(&self.program_path).map_err(|e| {
                if is_permission_error(&e) {
                    AttachError::PermissionDenied {
                        interface: interface.to_owned(),
                        reason: e.to_string(),
                    }
                } else {
                    AttachError::ProgramLoad(e.to_string())
                }
            })?;

            if let Err(e) = EbpfLogger::init(&mut bpf) {
                warn!(error = %e, "failed to initialize eBPF logger");
            }
            Ok(bpf)
        }

        fn write_rules(bpf: &mut Ebpf, rules: &FilterRuleSet) -> Result<(), AttachError> {
            let map = bpf
                .map_mut(MAP_FILTERS)
                .ok_or_else(|| AttachError::RuleLoad(format!("map {MAP_FILTERS} not found")))?;
            let mut filters = Array::<_, RawFilterRule>::try_from(map)
                .map_err(|e| AttachError::RuleLoad(format!("{MAP_FILTERS}: {e}")))?;
            for (index, raw) in rules.to_raw().iter().enumerate() {
                filters
                    .set(index as u32, *raw, 0)
                    .map_err(|e| AttachError::RuleLoad(format!("{MAP_FILTERS}[{index}]: {e}")))?;
            }
            debug!(rules = rules.len(), "filter table written");
            Ok(())
        }

        fn attach_program(
            bpf: &mut Ebpf,
            interface: &str,
            mode: XdpMode,
        ) -> Result<XdpLinkId, AttachError> {
            let program: &mut Xdp = bpf
                .program_mut(PROGRAM_NAME)
                .ok_or_else(|| AttachError::ProgramLoad(format!("program {PROGRAM_NAME} not found")))?
                .try_into()
                .map_err(|e: ProgramError| AttachError::ProgramLoad(e.to_string()))?;
            program
                .load()
                .map_err(|e| classify_program_error(interface, e, AttachError::ProgramLoad))?;
            program
                .attach(interface, xdp_flags(mode))
                .map_err(|e| {
                    classify_program_error(interface, e, |reason| AttachError::HookOccupied {
                        interface: interface.to_owned(),
                        reason,
                    })
                })
        }
    }

    impl HookPlatform for XdpPlatform {
        fn name(&self) -> &'static str {
            "xdp"
        }

        fn attach(
            &self,
            interface: &str,
            rules: &Arc<FilterRuleSet>,
            flags: AttachFlags,
        ) -> Result<Counters, AttachError> {
            if !interface_exists(&self.sysfs_net, interface) {
                return Err(AttachError::InterfaceNotFound {
                    interface: interface.to_owned(),
                });
            }

            let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
            if loaded.contains_key(interface) {
                return Err(AttachError::HookOccupied {
                    interface: interface.to_owned(),
                    reason: "ifstat program already loaded on this interface".to_owned(),
                });
            }

            let mut bpf = self.load(interface)?;
            Self::write_rules(&mut bpf, rules)?;
            let link = Self::attach_program(&mut bpf, interface, flags.mode)?;

            // 여기서 실패하면 bpf drop과 함께 링크도 해제됨
            let map = bpf
                .take_map(MAP_COUNTERS)
                .ok_or_else(|| AttachError::ProgramLoad(format!("map {MAP_COUNTERS} not found")))?;
            let counters = PerCpuArray::<MapData, u64>::try_from(map)
                .map_err(|e| AttachError::ProgramLoad(format!("{MAP_COUNTERS}: {e}")))?;

            info!(
                interface,
                mode = %flags.mode,
                program = %self.program_path.display(),
                "XDP program attached"
            );

            loaded.insert(
                interface.to_owned(),
                Loaded {
                    bpf,
                    link: Some(link),
                },
            );

            Ok(Arc::new(PerCpuCounters {
                map: Mutex::new(counters),
                rules: rules.len(),
            }))
        }

        fn detach(&self, interface: &str, _flags: AttachFlags) -> Result<(), DetachError> {
            let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(entry) = loaded.get_mut(interface) else {
                return Ok(());
            };

            let Some(link) = entry.link.take() else {
                return Err(DetachError::Platform {
                    interface: interface.to_owned(),
                    reason: "link state lost after an earlier failed detach".to_owned(),
                });
            };

            let result = entry
                .bpf
                .program_mut(PROGRAM_NAME)
                .ok_or_else(|| format!("program {PROGRAM_NAME} not found"))
                .and_then(|p| {
                    <&mut Xdp>::try_from(p).map_err(|e: ProgramError| e.to_string())
                })
                .and_then(|program| program.detach(link).map_err(|e| e.to_string()));

            match result {
                Ok(()) => {
                    loaded.remove(interface);
                    info!(interface, "XDP program detached");
                    Ok(())
                }
                Err(reason) => Err(DetachError::Platform {
                    interface: interface.to_owned(),
                    reason,
                }),
            }
        }

        fn is_attached(&self, interface: &str) -> bool {
            self.loaded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(interface)
        }
    }

    /// 커널 per-CPU 카운터 맵
    struct PerCpuCounters {
        map: Mutex<PerCpuArray<MapData, u64>>,
        rules: usize,
    }

    impl CounterSource for PerCpuCounters {
        fn read(&self) -> Result<CounterSnapshot, CounterReadError> {
            let map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
            let mut snapshot = CounterSnapshot::default();
            for rule in 0..self.rules {
                let slot = |slot: usize| -> Result<u64, CounterReadError> {
                    let values = map
                        .get(&counter_index(rule, slot), 0)
                        .map_err(|e| CounterReadError::new(format!("{MAP_COUNTERS}: {e}")))?;
                    Ok(sum_per_cpu(values.iter().copied()))
                };
                let mut counters = RuleCounters {
                    packets: slot(SLOT_PACKETS)?,
                    bytes: slot(SLOT_BYTES)?,
                    size_buckets: [0; SIZE_BUCKETS],
                };
                for (bucket, value) in counters.size_buckets.iter_mut().enumerate() {
                    *value = slot(bucket)?;
                }
                snapshot.insert(rule, counters);
            }
            Ok(snapshot)
        }
    }

    /// CPU별 값을 합산합니다.
    pub(super) fn sum_per_cpu(values: impl IntoIterator<Item = u64>) -> u64 {
        values.into_iter().fold(0u64, u64::wrapping_add)
    }

    fn xdp_flags(mode: XdpMode) -> XdpFlags {
        match mode {
            XdpMode::Skb => XdpFlags::SKB_MODE,
            XdpMode::Native => XdpFlags::DRV_MODE,
            XdpMode::Hw => XdpFlags::HW_MODE,
        }
    }

    /// aya 에러를 어태치 에러로 분류합니다.
    fn classify_program_error(
        interface: &str,
        err: ProgramError,
        fallback: impl FnOnce(String) -> AttachError,
    ) -> AttachError {
        if let ProgramError::UnknownInterface { .. } = err {
            return AttachError::InterfaceNotFound {
                interface: interface.to_owned(),
            };
        }
        if is_permission_error(&err) {
            return AttachError::PermissionDenied {
                interface: interface.to_owned(),
                reason: err.to_string(),
            };
        }
        match io_source(&err).and_then(io::Error::raw_os_error) {
            Some(EOPNOTSUPP) => AttachError::Unsupported(format!("{interface}: {err}")),
            Some(EBUSY | EEXIST) => AttachError::HookOccupied {
                interface: interface.to_owned(),
                reason: err.to_string(),
            },
            _ => fallback(err.to_string()),
        }
    }

    fn is_permission_error(err: &(dyn StdError + 'static)) -> bool {
        io_source(err).is_some_and(|io| io.kind() == io::ErrorKind::PermissionDenied)
    }

    /// 에러 체인에서 첫 번째 `io::Error`를 찾습니다.
    fn io_source<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
        let mut current = Some(err);
        while let Some(e) = current {
            if let Some(io) = e.downcast_ref::<io::Error>() {
                return Some(io);
            }
            current = e.source();
        }
        None
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        /// `eth0`만 존재하는 가짜 sysfs를 사용하는 플랫폼
        fn platform_with_fake_sysfs(dir: &tempfile::TempDir) -> XdpPlatform {
            std::fs::create_dir(dir.path().join("eth0")).unwrap();
            XdpPlatform {
                program_path: PathBuf::from("/nonexistent/ifstat-ebpf"),
                sysfs_net: dir.path().to_path_buf(),
                loaded: Mutex::new(HashMap::new()),
            }
        }

        #[test]
        fn sum_per_cpu_wraps() {
            assert_eq!(sum_per_cpu([1, 2, 3]), 6);
            assert_eq!(sum_per_cpu([u64::MAX, 2]), 1);
        }

        #[test]
        fn unknown_interface_error_maps_to_not_found() {
            let err = classify_program_error(
                "nope0",
                ProgramError::UnknownInterface {
                    name: "nope0".to_owned(),
                },
                AttachError::ProgramLoad,
            );
            assert!(matches!(err, AttachError::InterfaceNotFound { .. }));
        }

        #[test]
        fn io_source_finds_nested_error() {
            let err = io::Error::from(io::ErrorKind::PermissionDenied);
            assert!(is_permission_error(&err));
        }

        #[test]
        fn attach_missing_interface_does_not_load() {
            let dir = tempfile::tempdir().unwrap();
            let platform = platform_with_fake_sysfs(&dir);
            let rules = Arc::new(FilterRuleSet::load(Vec::new()).unwrap());
            let err = platform
                .attach("no-such-if0", &rules, AttachFlags::default())
                .err()
                .unwrap();
            assert!(matches!(err, AttachError::InterfaceNotFound { .. }));
            assert!(!platform.is_attached("no-such-if0"));
        }

        #[test]
        fn attach_missing_object_is_program_load_error() {
            let dir = tempfile::tempdir().unwrap();
            let platform = platform_with_fake_sysfs(&dir);
            let rules = Arc::new(FilterRuleSet::load(Vec::new()).unwrap());
            let err = platform
                .attach("eth0", &rules, AttachFlags::default())
                .err()
                .unwrap();
            assert!(matches!(err, AttachError::ProgramLoad(ref m) if m.contains("xtask")));
            assert!(!platform.is_attached("eth0"));
        }

        #[test]
        fn detach_unknown_interface_is_noop() {
            let platform = XdpPlatform::new("/nonexistent/ifstat-ebpf");
            assert!(platform.detach("lo", AttachFlags::default()).is_ok());
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod stub {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use ifstat_core::error::{AttachError, DetachError};

    use super::super::{AttachFlags, Counters, HookPlatform};
    use crate::rules::FilterRuleSet;

    /// XDP 플랫폼 (비-Linux 스텁)
    #[derive(Debug)]
    pub struct XdpPlatform {
        program_path: PathBuf,
    }

    impl XdpPlatform {
        /// BPF 오브젝트 경로로 플랫폼을 생성합니다.
        pub fn new(program_path: impl Into<PathBuf>) -> Self {
            Self {
                program_path: program_path.into(),
            }
        }

        /// BPF 오브젝트 경로
        pub fn program_path(&self) -> &Path {
            &self.program_path
        }
    }

    impl HookPlatform for XdpPlatform {
        fn name(&self) -> &'static str {
            "xdp"
        }

        fn attach(
            &self,
            _interface: &str,
            _rules: &Arc<FilterRuleSet>,
            _flags: AttachFlags,
        ) -> Result<Counters, AttachError> {
            Err(AttachError::Unsupported(
                "XDP is only supported on Linux".to_owned(),
            ))
        }

        fn detach(&self, _interface: &str, _flags: AttachFlags) -> Result<(), DetachError> {
            Ok(())
        }

        fn is_attached(&self, _interface: &str) -> bool {
            false
        }
    }
}
