//! Dispatch-loop throughput: a counted loop that boxes on every
//! iteration, which is the allocation profile typical bytecode shows.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use javelin_runtime::MemberFlags;
use javelin_vm::opcode::*;
use javelin_vm::testkit::{boot, invoke_with_ints, Asm, ClassBuilder, MethodDef};

fn bench_countdown(c: &mut Criterion) {
    let (_vm, mut t) = boot();

    let mut a = Asm::new();
    let top = a.label();
    let done = a.label();
    a.bind(top);
    a.op(ILOAD_0);
    a.branch(IFLE, done);
    a.op(ILOAD_0).op(ICONST_1).op(ISUB).op(ISTORE_0);
    a.branch(GOTO, top);
    a.bind(done);
    a.op(ILOAD_0).op(IRETURN);

    ClassBuilder::new("bench/Loop")
        .method(
            MethodDef::new("down", "(I)I")
                .flags(MemberFlags::PUBLIC | MemberFlags::STATIC)
                .params(1)
                .code(a.finish()),
        )
        .build(&mut t);

    c.bench_function("countdown_10k", |b| {
        b.iter(|| {
            let r = invoke_with_ints(&mut t, "bench/Loop", "down", &[black_box(10_000)]);
            assert_eq!(r.int_value(), 0);
        })
    });
}

fn bench_call_return(c: &mut Criterion) {
    let (_vm, mut t) = boot();

    let mut leaf = Asm::new();
    leaf.op(ILOAD_0).op(ICONST_1).op(IADD).op(IRETURN);

    let mut pool = javelin_vm::testkit::PoolBuilder::new();
    let leaf_ref = pool.member("bench/Calls", "leaf", "(I)I");
    let mut outer = Asm::new();
    // 16 chained calls per invocation.
    outer.op(ILOAD_0);
    for _ in 0..16 {
        outer.op(INVOKESTATIC).u16(leaf_ref);
    }
    outer.op(IRETURN);

    ClassBuilder::new("bench/Calls")
        .method(
            MethodDef::new("leaf", "(I)I")
                .flags(MemberFlags::PUBLIC | MemberFlags::STATIC)
                .params(1)
                .code(leaf.finish()),
        )
        .method(
            MethodDef::new("chain", "(I)I")
                .flags(MemberFlags::PUBLIC | MemberFlags::STATIC)
                .params(1)
                .pool(pool)
                .code(outer.finish()),
        )
        .build(&mut t);

    c.bench_function("call_chain_16", |b| {
        b.iter(|| {
            let r = invoke_with_ints(&mut t, "bench/Calls", "chain", &[black_box(0)]);
            assert_eq!(r.int_value(), 16);
        })
    });
}

criterion_group!(benches, bench_countdown, bench_call_return);
criterion_main!(benches);
