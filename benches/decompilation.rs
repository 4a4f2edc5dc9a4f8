//! Criterion benchmarks for decompilation and interpretation.
//!
//! Run with: `cargo bench --bench decompilation`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use conv_bytecode::{assemble, ConversationImage, DataType};
use conv_decompiler::{DecompileOptions, Decompiler, RenderOptions};
use conv_vm::{NullHost, StackMachine};

/// A conversation with `cases` menu cases in one switch, each calling its own helper.
fn switch_conversation(cases: u16) -> String {
    let mut source = String::from("PUSHBP\nSPTOBP\nPUSHI 1\nADDSP\n");
    for case in 1..=cases {
        source.push_str(&format!(
            "case{case}:\nPUSHI_EFF 1\nFETCHM\nPUSHI {case}\nTSTEQ\nBEQ case{}\nCALL helper{case}\nJMP join\n",
            case + 1
        ));
    }
    source.push_str(&format!("case{}:\njoin:\nBPTOSP\nPOPBP\nRET\n", cases + 1));
    for case in 1..=cases {
        source.push_str(&format!(
            "helper{case}:\nPUSHBP\nSPTOBP\nPUSHI 0\nADDSP\nPUSHI 1\nSAY_OP\nBPTOSP\nPOPBP\nRET\n"
        ));
    }
    source
}

/// A counting loop that runs `iterations` times.
fn counting_loop(iterations: u16) -> String {
    format!(
        "PUSHBP\nSPTOBP\nPUSHI 1\nADDSP\n\
         loop:\nPUSHI_EFF 1\nFETCHM\nPUSHI {iterations}\nTSTLT\nBEQ out\n\
         PUSHI_EFF 1\nPUSHI_EFF 1\nFETCHM\nPUSHI 1\nOPADD\nSTO\nJMP loop\n\
         out:\nBPTOSP\nPOPBP\nRET\n"
    )
}

fn image(source: &str) -> ConversationImage {
    let code = assemble(source).unwrap();
    ConversationImage::from_code(code).with_function(0, "babl_menu", DataType::Int)
}

fn strings() -> Vec<String> {
    vec![String::new(), "Hello.".to_string()]
}

fn bench_decompile(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompile");

    for cases in [4u16, 32, 128] {
        let image = image(&switch_conversation(cases));
        group.throughput(Throughput::Elements(image.code.len() as u64));
        group.bench_with_input(BenchmarkId::new("switch", cases), &image, |b, image| {
            b.iter(|| {
                let mut decompiler = Decompiler::new(image, strings(), DecompileOptions::default());
                decompiler.decompile().unwrap();
                decompiler.render_decompiled(&RenderOptions::default())
            })
        });
    }

    group.finish();
}

fn bench_disassemble(c: &mut Criterion) {
    let image = image(&switch_conversation(128));
    c.bench_function("disassemble/switch_128", |b| {
        b.iter(|| {
            let mut decompiler = Decompiler::new(&image, strings(), DecompileOptions::default());
            decompiler.disassemble().unwrap();
            decompiler.render_disassembly(&RenderOptions::default())
        })
    });
}

fn bench_interpreter(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpreter");

    for iterations in [100u16, 10_000] {
        let image = image(&counting_loop(iterations));
        group.bench_with_input(BenchmarkId::new("loop", iterations), &image, |b, image| {
            b.iter(|| {
                let mut machine = StackMachine::new(image.clone(), Box::new(NullHost));
                machine.init(&[]).unwrap();
                machine.run(usize::MAX).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decompile, bench_disassemble, bench_interpreter);
criterion_main!(benches);
