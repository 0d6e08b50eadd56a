//! Value codec throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use relay_modbus::{command_to_registers, extract_from_registers, Value, ValueType};

fn bench_extract(c: &mut Criterion) {
    let registers: Vec<u16> = (0..125).collect();

    c.bench_function("extract_uint16", |b| {
        b.iter(|| {
            for i in 0..125 {
                black_box(
                    extract_from_registers(black_box(&registers), i, ValueType::Uint16).unwrap(),
                );
            }
        })
    });

    c.bench_function("extract_float32", |b| {
        b.iter(|| {
            for i in 0..62 {
                black_box(
                    extract_from_registers(black_box(&registers), i, ValueType::Float32).unwrap(),
                );
            }
        })
    });

    c.bench_function("extract_float64_swap", |b| {
        b.iter(|| {
            for i in 0..31 {
                black_box(
                    extract_from_registers(black_box(&registers), i, ValueType::Float64Swap)
                        .unwrap(),
                );
            }
        })
    });

    c.bench_function("extract_bit", |b| {
        b.iter(|| {
            for i in 0..2000 {
                black_box(extract_from_registers(black_box(&registers), i, ValueType::Bit).unwrap());
            }
        })
    });
}

fn bench_encode(c: &mut Criterion) {
    c.bench_function("encode_float32", |b| {
        b.iter(|| {
            black_box(command_to_registers(black_box(Value::F32(123.456)), ValueType::Float32))
                .unwrap()
        })
    });

    c.bench_function("encode_uint64_swap", |b| {
        b.iter(|| {
            black_box(command_to_registers(
                black_box(Value::U64(0xDEADBEEFCAFEBABE)),
                ValueType::Uint64Swap,
            ))
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_extract, bench_encode);
criterion_main!(benches);
