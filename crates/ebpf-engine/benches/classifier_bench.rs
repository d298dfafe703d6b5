//! 분류기 벤치마크
//!
//! 헤더 파싱, 룰 수에 따른 분류 스케일링, 훅 전체 경로 성능을 측정합니다.

use std::net::Ipv4Addr;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ifstat_core::types::{IPPROTO_TCP, IPPROTO_UDP};
use ifstat_ebpf_engine::frame::FrameBuilder;
use ifstat_ebpf_engine::ifstat_ebpf_common::{MAX_FILTERS, parse_headers};
use ifstat_ebpf_engine::{FilterRule, FilterRuleSet, IngressHook, classify};

const SRC: Ipv4Addr = Ipv4Addr::new(10, 1, 2, 3);
const DST: Ipv4Addr = Ipv4Addr::new(10, 3, 2, 1);

/// 마지막 룰만 매칭되는 룰 집합
fn worst_case_rules(count: usize) -> FilterRuleSet {
    let mut rules: Vec<FilterRule> = (0..count.saturating_sub(1))
        .map(|i| {
            FilterRule::any()
                .dst_port(10_000 + i as u16)
                .protocol(IPPROTO_TCP)
        })
        .collect();
    rules.push(FilterRule::any().dst_port(443).protocol(IPPROTO_TCP));
    FilterRuleSet::load(rules).unwrap()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_headers");
    let tcp = FrameBuilder::tcp(SRC, DST, 40000, 443).payload(64).build();
    let vlan = FrameBuilder::udp(SRC, DST, 5353, 53).vlan(100).build();
    let truncated = tcp[..30].to_vec();

    group.throughput(Throughput::Elements(1));
    group.bench_function("tcp", |b| b.iter(|| parse_headers(black_box(tcp.as_slice()))));
    group.bench_function("udp_vlan", |b| b.iter(|| parse_headers(black_box(vlan.as_slice()))));
    group.bench_function("truncated", |b| {
        b.iter(|| parse_headers(black_box(truncated.as_slice())))
    });
    group.finish();
}

fn bench_classify_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify_scaling");
    let frame = FrameBuilder::tcp(SRC, DST, 40000, 443).build();
    let fields = parse_headers(frame.as_slice());

    for count in [1, 4, 8, MAX_FILTERS] {
        let rules = worst_case_rules(count);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), &rules, |b, rules| {
            b.iter(|| classify(black_box(&fields), rules))
        });
    }
    group.finish();
}

fn bench_hook(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingress_hook");
    let rules = Arc::new(
        FilterRuleSet::load(vec![
            FilterRule::any().dst_port(80).protocol(IPPROTO_TCP),
            FilterRule::any().dst_port(53).protocol(IPPROTO_UDP),
            FilterRule::any(),
        ])
        .unwrap(),
    );
    let hook = IngressHook::with_fresh_table(rules);
    let frames = [
        FrameBuilder::tcp(SRC, DST, 40000, 80).payload(1400).build(),
        FrameBuilder::udp(SRC, DST, 40000, 53).payload(60).build(),
        FrameBuilder::ip(SRC, DST, 1).payload(56).build(),
    ];

    group.throughput(Throughput::Elements(frames.len() as u64));
    group.bench_function("mixed_frames", |b| {
        b.iter(|| {
            for frame in &frames {
                black_box(hook.handle(black_box(frame)));
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_parse, bench_classify_scaling, bench_hook);
criterion_main!(benches);
