#![no_main]

use libfuzzer_sys::fuzz_target;

use ifstat_ebpf_engine::ifstat_ebpf_common::{
    FIELD_DST_PORT, FIELD_PROTOCOL, FIELD_SRC_IP, FIELD_SRC_PORT, parse_headers,
};

// 임의의 바이트열로 헤더 파서를 퍼징합니다.
// 패닉 없이 종료해야 하며, 필드 가용성 비트는 서로 모순되지 않아야 합니다.
fuzz_target!(|data: &[u8]| {
    let fields = parse_headers(data);

    assert_eq!(fields.len as usize, data.len());

    // 포트는 IPv4 헤더를 읽은 뒤에만 채워짐
    if fields.has(FIELD_SRC_PORT) || fields.has(FIELD_DST_PORT) {
        assert!(fields.has(FIELD_SRC_IP));
        assert!(fields.has(FIELD_PROTOCOL));
    }
});
