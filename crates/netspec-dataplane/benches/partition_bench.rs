use criterion::{black_box, criterion_group, criterion_main, Criterion};
use netspec_dataplane::fec::PrefixTrie;
use netspec_model::prefix::Ipv4Prefix;

/// A deterministic spread of rule prefixes of mixed lengths.
fn rule_prefixes(count: u32) -> Vec<Ipv4Prefix> {
    let mut prefixes = vec![Ipv4Prefix::DEFAULT];
    for i in 0..count {
        let length = 8 + (i % 17) as u8;
        let network = (i.wrapping_mul(2_654_435_761)) & (u32::MAX << (32 - u32::from(length)));
        if let Ok(prefix) = Ipv4Prefix::new(network, length) {
            prefixes.push(prefix);
        }
    }
    prefixes
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("fec_partition");

    for size in [64, 512, 2048] {
        let prefixes = rule_prefixes(size);
        group.bench_function(format!("{size}_rules"), |b| {
            b.iter(|| {
                let mut trie = PrefixTrie::new();
                for prefix in &prefixes {
                    trie.insert(prefix);
                }
                black_box(trie.partition().unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_partition);
criterion_main!(benches);
