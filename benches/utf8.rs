use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wasm_boundary::utf8::{self, Strategy, Utf8Policy};

const SIZE: usize = 64 * 1024;

fn ascii() -> Vec<u8> {
    (0..SIZE).map(|i| b'a' + (i % 26) as u8).collect()
}

/// Mixed-width text, roughly one non-ASCII character in four.
fn mixed() -> Vec<u8> {
    let alphabet: Vec<char> = "abcdefé€😀".chars().collect();
    let mut rng = StdRng::seed_from_u64(7);
    let mut text = String::with_capacity(SIZE);
    while text.len() < SIZE - 4 {
        text.push(alphabet[rng.gen_range(0..alphabet.len())]);
    }
    text.into_bytes()
}

/// Identifier-sized inputs, as found in name sections.
fn short_names() -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(11);
    (0..1024)
        .map(|i| {
            let len = rng.gen_range(4..40);
            format!("func_{i}_{}", "x".repeat(len)).into_bytes()
        })
        .collect()
}

fn benchmark_utf8(c: &mut Criterion) {
    let inputs = [("ascii", ascii()), ("mixed", mixed())];

    let mut group = c.benchmark_group("utf8_validate");
    for (name, bytes) in &inputs {
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        for strategy in Strategy::ALL {
            group.bench_with_input(BenchmarkId::new(format!("{strategy:?}"), name), bytes, |b, bytes| {
                b.iter(|| utf8::validate_with(strategy, Utf8Policy::Rfc3629, black_box(bytes)))
            });
        }
    }
    group.finish();

    let names = short_names();
    let mut group = c.benchmark_group("utf8_names");
    for strategy in Strategy::ALL {
        group.bench_function(format!("{strategy:?}"), |b| {
            b.iter(|| {
                for name in &names {
                    let _ = utf8::validate_with(strategy, Utf8Policy::Rfc3629ZeroIllegal, black_box(name));
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_utf8);
criterion_main!(benches);
