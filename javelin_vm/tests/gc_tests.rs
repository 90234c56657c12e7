//! Collection behavior under allocation pressure: root coverage,
//! nursery recycling, write-barrier liveness.

use javelin_heap::CollectionKind;
use javelin_runtime::Kind;
use javelin_vm::machine::BootClass;
use javelin_vm::objects::{make_instance, make_int};
use javelin_vm::protect;
use javelin_vm::testkit::{boot, boot_with_config, invoke_with_ints, ClassBuilder};
use javelin_vm::testkit::{Asm, MethodDef};
use javelin_vm::MachineConfig;
use javelin_runtime::MemberFlags;

#[test]
fn test_retained_half_survives_pressure() {
    // Stack sized to hold the retained half of the allocations below.
    let (vm, mut t) = boot_with_config(MachineConfig {
        nursery_size: 16 * 1024,
        stack_size: 4 * 1024,
    });
    let nursery = t.nursery_size();

    // Allocate more than a nursery's worth of boxes, retaining every
    // other one on the operand stack (a root).
    let total = 2 * (nursery / 16) + 1;
    let mut retained = 0usize;
    for i in 0..total {
        let boxed = make_int(&mut t, i as i32);
        if i % 2 == 0 {
            t.push(boxed);
            retained += 1;
        }
    }

    assert!(vm.heap.minor_collections() >= 1, "pressure forced no collection");
    assert!(t.heap_index() <= nursery);

    // Every retained box survived with its value, relocated or not.
    for slot in (0..retained).rev() {
        let boxed = t.pop();
        assert_eq!(boxed.kind(), Kind::Int);
        assert_eq!(boxed.int_value(), (slot * 2) as i32);
    }
}

#[test]
fn test_protected_local_is_updated() {
    let (vm, mut t) = boot();

    let mut local = make_int(&mut t, 77);
    protect!(&mut t, local);
    let before = local;

    vm.machine.request_collect(&mut t, CollectionKind::Minor);

    // The collector evacuated the nursery box and rewrote the protected
    // slot in place.
    assert_ne!(local, before, "slot should be rewritten to the new address");
    assert!(vm.heap.contains(local));
    assert_eq!(local.int_value(), 77);
}

#[test]
fn test_unrooted_allocation_is_discarded() {
    let (vm, mut t) = boot();
    // Tenure the boot graph first so the measurement below sees only
    // this test's allocations.
    vm.machine.request_collect(&mut t, CollectionKind::Minor);
    let used_before = vm.heap.used();

    let _dead = make_int(&mut t, 1);
    let mut live = make_int(&mut t, 2);
    protect!(&mut t, live);

    vm.machine.request_collect(&mut t, CollectionKind::Minor);

    // Only the protected box was evacuated.
    assert_eq!(vm.heap.used() - used_before, 16);
    assert_eq!(live.int_value(), 2);
    assert_eq!(t.heap_index(), 0, "nursery reset by the scan");
}

#[test]
fn test_class_map_roots_survive_major_collection() {
    let (vm, mut t) = boot();
    let mut a = Asm::new();
    a.op(javelin_vm::opcode::ILOAD_0)
        .op(javelin_vm::opcode::ICONST_1)
        .op(javelin_vm::opcode::IADD)
        .op(javelin_vm::opcode::IRETURN);
    ClassBuilder::new("fixtures/Succ")
        .method(
            MethodDef::new("succ", "(I)I")
                .flags(MemberFlags::PUBLIC | MemberFlags::STATIC)
                .params(1)
                .code(a.finish()),
        )
        .build(&mut t);

    vm.machine.request_collect(&mut t, CollectionKind::Major);
    vm.machine.request_collect(&mut t, CollectionKind::Major);
    assert_eq!(vm.heap.major_collections(), 2);

    // Classes, methods, and code all moved; resolution and execution
    // still work because every path starts from a scanned root.
    assert_eq!(invoke_with_ints(&mut t, "fixtures/Succ", "succ", &[9]).int_value(), 10);
}

#[test]
fn test_write_barrier_keeps_tenured_to_young_edge() {
    let (vm, mut t) = boot();
    let throwable = vm.boot_class(BootClass::Throwable);

    // Tenure a holder by collecting while it is protected.
    let mut holder = make_instance(&mut t, throwable);
    protect!(&mut t, holder);
    vm.machine.request_collect(&mut t, CollectionKind::Minor);
    assert!(vm.heap.contains(holder));

    // Store a nursery box into the tenured instance; the barrier must
    // remember the slot.
    let young = make_int(&mut t, 123);
    t.set(holder.instance_field_slot(0), young);
    assert!(!vm.heap.contains(holder.instance_field(0)));

    // The box is reachable only through the tenured slot.
    vm.machine.request_collect(&mut t, CollectionKind::Minor);
    let field = holder.instance_field(0);
    assert!(vm.heap.contains(field));
    assert_eq!(field.int_value(), 123);
}

#[test]
fn test_gc_during_interpretation() {
    // A bytecode loop that boxes on every iteration, sized to force many
    // nursery cycles mid-run.
    let (vm, mut t) = boot_with_config(MachineConfig {
        nursery_size: 16 * 1024,
        stack_size: 4 * 1024,
    });

    let mut a = Asm::new();
    let top = a.label();
    let done = a.label();
    a.bind(top);
    a.op(javelin_vm::opcode::ILOAD_0);
    a.branch(javelin_vm::opcode::IFLE, done);
    a.op(javelin_vm::opcode::ILOAD_0)
        .op(javelin_vm::opcode::ICONST_1)
        .op(javelin_vm::opcode::ISUB)
        .op(javelin_vm::opcode::ISTORE_0);
    a.branch(javelin_vm::opcode::GOTO, top);
    a.bind(done);
    a.op(javelin_vm::opcode::ILOAD_0).op(javelin_vm::opcode::IRETURN);

    ClassBuilder::new("fixtures/Churn")
        .method(
            MethodDef::new("down", "(I)I")
                .flags(MemberFlags::PUBLIC | MemberFlags::STATIC)
                .params(1)
                .code(a.finish()),
        )
        .build(&mut t);

    let result = invoke_with_ints(&mut t, "fixtures/Churn", "down", &[20_000]);
    assert!(!t.has_exception());
    assert_eq!(result.int_value(), 0);
    assert!(
        vm.heap.minor_collections() >= 10,
        "expected sustained collection pressure, saw {}",
        vm.heap.minor_collections()
    );
}
