//! Test fixtures: machine bootstrap, a class builder, and a bytecode
//! assembler.
//!
//! Nothing here is part of the execution engine; integration tests and
//! benches build classes programmatically instead of going through a
//! class-file parser. Builders pin their intermediate references on the
//! owning thread's operand stack, so fixture construction stays safe
//! under collection pressure.

use std::ops::Deref;
use std::sync::Arc;

use javelin_heap::{Heap, RootsIterator, SemispaceHeap};
use javelin_platform::Monitor;
use javelin_runtime::{ClassFlags, Kind, MemberFlags, ObjRef};
use rustc_hash::FxHashMap;

use crate::config::MachineConfig;
use crate::machine::{BootClass, ClassFinder, ClassParser, EmptyFinder, Machine, NoParser};
use crate::objects::{
    make_byte_array, make_code, make_field, make_int, make_long, make_method, make_pair,
    make_raw_object_array, make_string,
};
use crate::opcode;
use crate::resolve;
use crate::thread::{Thread, ThreadState};

// =============================================================================
// Machine bootstrap
// =============================================================================

/// A booted machine plus direct access to its semispace backend.
pub struct TestVm {
    /// The machine under test.
    pub machine: Arc<Machine>,
    /// The backend, for survivor and collection-count assertions.
    pub heap: Arc<SemispaceHeap>,
}

impl Deref for TestVm {
    type Target = Machine;

    fn deref(&self) -> &Machine {
        &self.machine
    }
}

/// Delegating handle so the machine and the test share one backend.
struct SharedHeap(Arc<SemispaceHeap>);

impl Heap for SharedHeap {
    fn collect(&self, kind: javelin_heap::CollectionKind, roots: &mut dyn RootsIterator) {
        self.0.collect(kind, roots)
    }

    fn check(&self, slot: *mut ObjRef, heap_lock: &Monitor<()>) {
        self.0.check(slot, heap_lock)
    }
}

/// Boot a machine with default sizing and no class loading.
pub fn boot() -> (TestVm, Box<Thread>) {
    boot_with_config(MachineConfig::default())
}

/// Boot a machine with the given config and no class loading.
pub fn boot_with_config(config: MachineConfig) -> (TestVm, Box<Thread>) {
    boot_full(config, Box::new(EmptyFinder), Box::new(NoParser))
}

/// Boot a machine with a demand-load seam.
pub fn boot_with_loader(
    config: MachineConfig,
    finder: Box<dyn ClassFinder>,
    parser: Box<dyn ClassParser>,
) -> (TestVm, Box<Thread>) {
    boot_full(config, finder, parser)
}

fn boot_full(
    config: MachineConfig,
    finder: Box<dyn ClassFinder>,
    parser: Box<dyn ClassParser>,
) -> (TestVm, Box<Thread>) {
    let heap = Arc::new(SemispaceHeap::new(8 * 1024 * 1024));
    let machine = Machine::new(config, Box::new(SharedHeap(heap.clone())), finder, parser);
    let mut t = Thread::new(&machine);
    t.enter(ThreadState::Active);
    machine.boot(&mut t);
    (TestVm { machine, heap }, t)
}

// =============================================================================
// Pinning scope
// =============================================================================

/// Roots intermediate references on the thread's operand stack.
///
/// Slots stay valid across collections (the stack prefix is scanned and
/// rewritten); the scope restores the cursor on drop.
pub struct Scope {
    thread: *mut Thread,
    base: usize,
}

/// A pinned reference, readable through its [`Scope`].
#[derive(Clone, Copy)]
pub struct Slot(usize);

impl Scope {
    /// Open a scope on `t`.
    pub fn new(t: &mut Thread) -> Scope {
        Scope {
            base: t.sp(),
            thread: t as *mut Thread,
        }
    }

    /// Pin a reference, returning its slot.
    pub fn pin(&self, value: ObjRef) -> Slot {
        // Safety: the scope never outlives its thread (test-local use).
        unsafe {
            let t = &mut *self.thread;
            let slot = Slot(t.sp());
            t.push(value);
            slot
        }
    }

    /// Current value of a pinned slot.
    pub fn get(&self, slot: Slot) -> ObjRef {
        unsafe { (*self.thread).stack_at(slot.0) }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        unsafe {
            (*self.thread).set_sp(self.base);
        }
    }
}

// =============================================================================
// Lookup helpers
// =============================================================================

/// Resolve `name` through the class map.
pub fn resolve(t: &mut Thread, name: &str) -> ObjRef {
    let bytes = make_byte_array(t, name.as_bytes());
    resolve::resolve_class(t, bytes)
}

/// Intern `class` in the class map under its own name.
pub fn intern_class(t: &mut Thread, class: ObjRef) {
    let machine = t.machine().clone();
    let _guard = machine.class_lock.acquire();
    let mut name = class.class_name();
    crate::protect!(t, name);
    let hash = resolve::hash(unsafe { name.byte_array_bytes() });
    resolve::hash_map_insert(t, machine.class_map(), hash, name, class);
}

/// Find a method of `class` by name, scanning the method table.
pub fn method_named(class: ObjRef, name: &str) -> ObjRef {
    let table = class.class_method_table();
    for i in 0..table.array_length() {
        let m = table.object_array_get(i);
        if unsafe { m.method_name().byte_array_bytes() } == name.as_bytes() {
            return m;
        }
    }
    panic!("no method {} on class", name);
}

/// Find a field of `class` by name.
pub fn field_named(class: ObjRef, name: &str) -> ObjRef {
    let table = class.class_field_table();
    for i in 0..table.array_length() {
        let f = table.object_array_get(i);
        if unsafe { f.field_name().byte_array_bytes() } == name.as_bytes() {
            return f;
        }
    }
    panic!("no field {} on class", name);
}

/// Resolve `class_name` fresh and invoke its method `method` with `args`.
///
/// Looking everything up by name keeps the harness safe against
/// collections moving fixture objects between calls.
pub fn invoke_named(
    t: &mut Thread,
    class_name: &str,
    method: &str,
    args: &[ObjRef],
) -> ObjRef {
    let class = resolve(t, class_name);
    assert!(class.is_some(), "unresolvable fixture class {}", class_name);
    let m = method_named(class, method);
    crate::interp::invoke(t, m, args)
}

/// Resolve and invoke with freshly boxed int arguments.
///
/// The boxes are created after resolution and pushed straight onto the
/// operand stack, so they stay rooted even if boxing collects.
pub fn invoke_with_ints(
    t: &mut Thread,
    class_name: &str,
    method: &str,
    ints: &[i32],
) -> ObjRef {
    let class = resolve(t, class_name);
    assert!(class.is_some(), "unresolvable fixture class {}", class_name);
    let scope = Scope::new(t);
    let m = scope.pin(method_named(class, method));
    for &v in ints {
        let boxed = make_int(t, v);
        t.push(boxed);
    }
    crate::interp::invoke_pushed(t, scope.get(m), ints.len())
}

/// Install an uncaught-exception handler method on the thread's
/// heap-side thread object.
pub fn install_uncaught_handler(t: &mut Thread, mut method: ObjRef) {
    crate::protect!(t, method);
    let machine = t.machine().clone();
    let thread_class = machine.boot_class(BootClass::Thread);
    let obj = crate::objects::make_instance(t, thread_class);
    t.set(
        obj.instance_field_slot(crate::machine::THREAD_HANDLER),
        method,
    );
    t.set_thread_obj(obj);
}

// =============================================================================
// Bytecode assembler
// =============================================================================

/// Forward-reference label for the assembler.
#[derive(Clone, Copy)]
pub struct Label(usize);

/// A small bytecode assembler with label back-patching.
///
/// Branch offsets are emitted relative to the branch opcode, as the
/// interpreter expects.
#[derive(Default)]
pub struct Asm {
    code: Vec<u8>,
    labels: Vec<Option<u32>>,
    fixups: Vec<(usize, usize, usize)>,
}

impl Asm {
    /// Fresh assembler.
    pub fn new() -> Asm {
        Asm::default()
    }

    /// Emit a bare opcode.
    pub fn op(&mut self, op: u8) -> &mut Self {
        self.code.push(op);
        self
    }

    /// Emit a one-byte operand.
    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.code.push(v);
        self
    }

    /// Emit a big-endian two-byte operand.
    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.code.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Allocate an unbound label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current position.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len() as u32);
        self
    }

    /// Current code offset.
    pub fn here(&self) -> u32 {
        self.code.len() as u32
    }

    /// Emit a 16-bit-offset branch to `label`.
    pub fn branch(&mut self, op: u8, label: Label) -> &mut Self {
        let opcode_pos = self.code.len();
        self.code.push(op);
        let operand_pos = self.code.len();
        self.code.extend_from_slice(&[0, 0]);
        self.fixups.push((opcode_pos, operand_pos, label.0));
        self
    }

    /// Resolve fixups and return the code bytes.
    pub fn finish(mut self) -> Vec<u8> {
        for (opcode_pos, operand_pos, label) in self.fixups.drain(..) {
            let target = self.labels[label].expect("unbound label");
            let offset = target as i64 - opcode_pos as i64;
            let offset = i16::try_from(offset).expect("branch offset out of range");
            self.code[operand_pos..operand_pos + 2].copy_from_slice(&offset.to_be_bytes());
        }
        self.code
    }
}

// =============================================================================
// Pool builder
// =============================================================================

/// One constant-pool entry recipe.
pub enum PoolEntry {
    /// Unresolved class name, resolved on first use.
    ClassName(String),
    /// Unresolved member reference.
    Member {
        /// Declaring class name.
        class: String,
        /// Member name.
        name: String,
        /// Type descriptor.
        spec: String,
    },
    /// Boxed int constant (for `ldc`).
    Int(i32),
    /// Boxed long constant (for `ldc2_w`).
    Long(i64),
    /// String constant.
    Str(String),
}

/// Builds per-code constant pools. Index 0 stays empty so handler entries
/// can use catch-type 0 as the catch-all marker.
#[derive(Default)]
pub struct PoolBuilder {
    entries: Vec<PoolEntry>,
}

impl PoolBuilder {
    /// Fresh pool with index 0 reserved.
    pub fn new() -> PoolBuilder {
        PoolBuilder::default()
    }

    fn push(&mut self, e: PoolEntry) -> u16 {
        self.entries.push(e);
        self.entries.len() as u16
    }

    /// Add a lazily resolved class entry.
    pub fn class(&mut self, name: &str) -> u16 {
        self.push(PoolEntry::ClassName(name.to_owned()))
    }

    /// Add a lazily resolved member entry.
    pub fn member(&mut self, class: &str, name: &str, spec: &str) -> u16 {
        self.push(PoolEntry::Member {
            class: class.to_owned(),
            name: name.to_owned(),
            spec: spec.to_owned(),
        })
    }

    /// Add a boxed int constant.
    pub fn int(&mut self, v: i32) -> u16 {
        self.push(PoolEntry::Int(v))
    }

    /// Add a boxed long constant.
    pub fn long(&mut self, v: i64) -> u16 {
        self.push(PoolEntry::Long(v))
    }

    /// Add a string constant.
    pub fn string(&mut self, s: &str) -> u16 {
        self.push(PoolEntry::Str(s.to_owned()))
    }

    fn build(&self, t: &mut Thread) -> ObjRef {
        let scope = Scope::new(t);
        let pool = scope.pin(make_raw_object_array(t, self.entries.len() + 1));
        for (i, entry) in self.entries.iter().enumerate() {
            let value = match entry {
                PoolEntry::ClassName(name) => make_byte_array(t, name.as_bytes()),
                PoolEntry::Member { class, name, spec } => {
                    let scope = Scope::new(t);
                    let c = scope.pin(make_byte_array(t, class.as_bytes()));
                    let n = scope.pin(make_byte_array(t, name.as_bytes()));
                    let s = scope.pin(make_byte_array(t, spec.as_bytes()));
                    crate::objects::make_reference(
                        t,
                        scope.get(c),
                        scope.get(n),
                        scope.get(s),
                    )
                }
                PoolEntry::Int(v) => make_int(t, *v),
                PoolEntry::Long(v) => make_long(t, *v),
                PoolEntry::Str(s) => make_string(t, s),
            };
            t.set(scope.get(pool).object_array_slot(i + 1), value);
        }
        scope.get(pool)
    }
}

// =============================================================================
// Class builder
// =============================================================================

/// Exception-handler recipe: `(start, end, handler, catch_type)`.
pub type HandlerDef = (u32, u32, u32, u32);

/// One method recipe.
pub struct MethodDef {
    name: String,
    spec: String,
    flags: MemberFlags,
    param_count: u32,
    max_stack: u32,
    max_locals: u32,
    code: Vec<u8>,
    pool: PoolBuilder,
    handlers: Vec<HandlerDef>,
}

impl MethodDef {
    /// A method recipe with defaults sized for small test bodies.
    pub fn new(name: &str, spec: &str) -> MethodDef {
        MethodDef {
            name: name.to_owned(),
            spec: spec.to_owned(),
            flags: MemberFlags::PUBLIC,
            param_count: 0,
            max_stack: 8,
            max_locals: 8,
            code: vec![opcode::RETURN],
            pool: PoolBuilder::new(),
            handlers: Vec::new(),
        }
    }

    /// Set access flags.
    pub fn flags(mut self, flags: MemberFlags) -> MethodDef {
        self.flags = flags;
        self
    }

    /// Set the parameter slot count (receiver included for instance
    /// methods).
    pub fn params(mut self, count: u32) -> MethodDef {
        self.param_count = count;
        self
    }

    /// Set frame limits.
    pub fn limits(mut self, max_stack: u32, max_locals: u32) -> MethodDef {
        self.max_stack = max_stack;
        self.max_locals = max_locals;
        self
    }

    /// Set the code body.
    pub fn code(mut self, code: Vec<u8>) -> MethodDef {
        self.code = code;
        self
    }

    /// Set the constant pool.
    pub fn pool(mut self, pool: PoolBuilder) -> MethodDef {
        self.pool = pool;
        self
    }

    /// Append an exception handler.
    pub fn handler(mut self, h: HandlerDef) -> MethodDef {
        self.handlers.push(h);
        self
    }

    fn build(&self, t: &mut Thread, class: ObjRef, offset: u32) -> ObjRef {
        let scope = Scope::new(t);
        let class = scope.pin(class);
        let body = scope.pin(make_byte_array(t, &self.code));
        let pool = scope.pin(self.pool.build(t));
        let handlers = if self.handlers.is_empty() {
            ObjRef::null()
        } else {
            let table = make_prim_array_i32(t, &flatten_handlers(&self.handlers));
            table
        };
        let handlers = scope.pin(handlers);
        let code = scope.pin(make_code(
            t,
            scope.get(body),
            scope.get(pool),
            scope.get(handlers),
            self.max_stack,
            self.max_locals,
        ));
        let name = scope.pin(make_byte_array(t, self.name.as_bytes()));
        let spec = scope.pin(make_byte_array(t, self.spec.as_bytes()));
        make_method(
            t,
            scope.get(class),
            scope.get(name),
            scope.get(spec),
            scope.get(code),
            self.param_count,
            offset,
            self.flags,
        )
    }
}

fn flatten_handlers(handlers: &[HandlerDef]) -> Vec<i32> {
    let mut out = Vec::with_capacity(handlers.len() * 4);
    for &(start, end, handler, catch_type) in handlers {
        out.extend_from_slice(&[start as i32, end as i32, handler as i32, catch_type as i32]);
    }
    out
}

fn make_prim_array_i32(t: &mut Thread, values: &[i32]) -> ObjRef {
    let a = crate::objects::make_prim_array(t, Kind::IntArray, values.len());
    for (i, &v) in values.iter().enumerate() {
        a.int_array_set(i, v);
    }
    a
}

/// Builds and interns a class.
pub struct ClassBuilder {
    name: String,
    super_name: Option<String>,
    flags: ClassFlags,
    instance_fields: Vec<(String, String)>,
    static_fields: Vec<(String, String)>,
    methods: Vec<MethodDef>,
    initializers: Vec<MethodDef>,
    interfaces: Vec<String>,
}

impl ClassBuilder {
    /// A class extending `java/lang/Object` by default.
    pub fn new(name: &str) -> ClassBuilder {
        ClassBuilder {
            name: name.to_owned(),
            super_name: Some("java/lang/Object".to_owned()),
            flags: ClassFlags::PUBLIC | ClassFlags::SUPER,
            instance_fields: Vec::new(),
            static_fields: Vec::new(),
            methods: Vec::new(),
            initializers: Vec::new(),
            interfaces: Vec::new(),
        }
    }

    /// Override the superclass (`None` only for root-like fixtures).
    pub fn extends(mut self, name: &str) -> ClassBuilder {
        self.super_name = Some(name.to_owned());
        self
    }

    /// Replace the access flags.
    pub fn flags(mut self, flags: ClassFlags) -> ClassBuilder {
        self.flags = flags;
        self
    }

    /// Declare an instance field.
    pub fn field(mut self, name: &str, spec: &str) -> ClassBuilder {
        self.instance_fields.push((name.to_owned(), spec.to_owned()));
        self
    }

    /// Declare a static field.
    pub fn static_field(mut self, name: &str, spec: &str) -> ClassBuilder {
        self.static_fields.push((name.to_owned(), spec.to_owned()));
        self
    }

    /// Add a method.
    pub fn method(mut self, def: MethodDef) -> ClassBuilder {
        self.methods.push(def);
        self
    }

    /// Append a pending class initializer, run before first use.
    pub fn initializer(mut self, def: MethodDef) -> ClassBuilder {
        self.initializers.push(def);
        self
    }

    /// Implement `interface_name`; the method vector is matched from this
    /// class's methods by name and descriptor.
    pub fn implements(mut self, interface_name: &str) -> ClassBuilder {
        self.interfaces.push(interface_name.to_owned());
        self
    }

    /// Materialize the class and intern it in the class map.
    pub fn build(self, t: &mut Thread) -> ObjRef {
        self.build_inner(t, true)
    }

    /// Materialize without interning, for demand-load recipes (the
    /// resolver interns the parse result itself).
    pub fn build_unregistered(self, t: &mut Thread) -> ObjRef {
        self.build_inner(t, false)
    }

    fn build_inner(self, t: &mut Thread, register: bool) -> ObjRef {
        let scope = Scope::new(t);

        let super_class = match &self.super_name {
            Some(name) => {
                let c = resolve(t, name);
                assert!(c.is_some(), "unresolved superclass {}", name);
                c
            }
            None => ObjRef::null(),
        };
        let super_class = scope.pin(super_class);

        let inherited = if scope.get(super_class).is_some() {
            scope.get(super_class).class_fixed_count()
        } else {
            0
        };
        let fixed_count = inherited + self.instance_fields.len() as u32;

        let class = scope.pin(crate::objects::make_class(
            t,
            self.name.as_bytes(),
            scope.get(super_class),
            self.flags,
            fixed_count,
        ));

        // Field table: inherited records first, own fields after, with
        // instance offsets continuing the superclass layout.
        let super_fields = if scope.get(super_class).is_some() {
            scope.get(super_class).class_field_table().array_length()
        } else {
            0
        };
        let field_count = super_fields + self.instance_fields.len() + self.static_fields.len();
        let field_table = scope.pin(make_raw_object_array(t, field_count));
        for i in 0..super_fields {
            let inherited_field = scope.get(super_class).class_field_table().object_array_get(i);
            t.set(
                scope.get(field_table).object_array_slot(i),
                inherited_field,
            );
        }
        for (i, (name, spec)) in self.instance_fields.iter().enumerate() {
            let f = build_field(
                t,
                &scope,
                class,
                name,
                spec,
                inherited + i as u32,
                MemberFlags::PUBLIC,
            );
            t.set(
                scope.get(field_table).object_array_slot(super_fields + i),
                f,
            );
        }
        for (i, (name, spec)) in self.static_fields.iter().enumerate() {
            let f = build_field(
                t,
                &scope,
                class,
                name,
                spec,
                i as u32,
                MemberFlags::PUBLIC | MemberFlags::STATIC,
            );
            let index = super_fields + self.instance_fields.len() + i;
            t.set(scope.get(field_table).object_array_slot(index), f);
        }

        // Method table: the superclass vtable with overrides in place and
        // new methods appended.
        let super_methods = if scope.get(super_class).is_some() {
            scope.get(super_class).class_method_table().array_length()
        } else {
            0
        };
        let mut own_offsets: Vec<Option<u32>> = vec![None; self.methods.len()];
        let mut appended = 0u32;
        for (i, def) in self.methods.iter().enumerate() {
            let mut found = None;
            for j in 0..super_methods {
                let m = scope.get(super_class).class_method_table().object_array_get(j);
                let name_matches =
                    unsafe { m.method_name().byte_array_bytes() } == def.name.as_bytes();
                let spec_matches =
                    unsafe { m.method_spec().byte_array_bytes() } == def.spec.as_bytes();
                if name_matches && spec_matches {
                    found = Some(j as u32);
                    break;
                }
            }
            own_offsets[i] = Some(found.unwrap_or_else(|| {
                let offset = super_methods as u32 + appended;
                appended += 1;
                offset
            }));
        }

        let table_len = super_methods + appended as usize;
        let method_table = scope.pin(make_raw_object_array(t, table_len));
        for j in 0..super_methods {
            let m = scope.get(super_class).class_method_table().object_array_get(j);
            t.set(scope.get(method_table).object_array_slot(j), m);
        }
        for (i, def) in self.methods.iter().enumerate() {
            let offset = own_offsets[i].unwrap();
            let m = def.build(t, scope.get(class), offset);
            t.set(
                scope.get(method_table).object_array_slot(offset as usize),
                m,
            );
        }

        // Interface table: flat (interface, method vector) pairs; vectors
        // are indexed by the interface method's offset and filled with
        // this class's matching methods.
        let iface_table = scope.pin(make_raw_object_array(t, self.interfaces.len() * 2));
        for (i, iface_name) in self.interfaces.iter().enumerate() {
            let iface = resolve(t, iface_name);
            assert!(iface.is_some(), "unresolved interface {}", iface_name);
            let iface = scope.pin(iface);

            let iface_method_count = scope.get(iface).class_method_table().array_length();
            let vector = scope.pin(make_raw_object_array(t, iface_method_count));
            for j in 0..iface_method_count {
                let im = scope.get(iface).class_method_table().object_array_get(j);
                let name = unsafe { im.method_name().byte_array_bytes() }.to_vec();
                let spec = unsafe { im.method_spec().byte_array_bytes() }.to_vec();
                for k in 0..scope.get(method_table).array_length() {
                    let m = scope.get(method_table).object_array_get(k);
                    let matches = unsafe { m.method_name().byte_array_bytes() } == &name[..]
                        && unsafe { m.method_spec().byte_array_bytes() } == &spec[..];
                    if matches {
                        t.set(scope.get(vector).object_array_slot(j), m);
                        break;
                    }
                }
            }
            t.set(
                scope.get(iface_table).object_array_slot(i * 2),
                scope.get(iface),
            );
            t.set(
                scope.get(iface_table).object_array_slot(i * 2 + 1),
                scope.get(vector),
            );
        }

        // Static slots and pending initializers.
        let statics = scope.pin(make_raw_object_array(t, self.static_fields.len()));
        let mut init_list = scope.pin(ObjRef::null());
        for def in self.initializers.iter().rev() {
            let m = def.build(t, scope.get(class), u32::MAX);
            let m = scope.pin(m);
            let pair = make_pair(t, scope.get(m), scope.get(init_list));
            init_list = scope.pin(pair);
        }

        // The class may have been tenured mid-build; these stores go
        // through the barrier.
        let class_ref = scope.get(class);
        t.set(class_ref.class_field_table_slot(), scope.get(field_table));
        t.set(class_ref.class_method_table_slot(), scope.get(method_table));
        t.set(class_ref.class_interface_table_slot(), scope.get(iface_table));
        t.set(class_ref.class_static_table_slot(), scope.get(statics));
        t.set(class_ref.class_initializers_slot(), scope.get(init_list));

        if register {
            intern_class(t, scope.get(class));
        }
        scope.get(class)
    }
}

fn build_field(
    t: &mut Thread,
    scope: &Scope,
    class: Slot,
    name: &str,
    spec: &str,
    offset: u32,
    flags: MemberFlags,
) -> ObjRef {
    let inner = Scope::new(t);
    let n = inner.pin(make_byte_array(t, name.as_bytes()));
    let s = inner.pin(make_byte_array(t, spec.as_bytes()));
    make_field(
        t,
        scope.get(class),
        inner.get(n),
        inner.get(s),
        offset,
        flags,
    )
}

// =============================================================================
// Demand-load fixtures
// =============================================================================

/// Recipe that builds a class when the resolver demand-loads it.
pub type ClassRecipe = Box<dyn Fn(&mut Thread) -> ObjRef + Send + Sync>;

/// Finder/parser pair backed by recipes, for exercising the demand-load
/// path without a class-file parser. `find` returns the class name
/// itself as the "class bytes"; `parse` runs the recipe registered for
/// those bytes.
#[derive(Default)]
pub struct FixtureLoader {
    recipes: FxHashMap<Vec<u8>, ClassRecipe>,
}

impl FixtureLoader {
    /// Empty loader.
    pub fn new() -> FixtureLoader {
        FixtureLoader::default()
    }

    /// Register a recipe for `name`.
    pub fn class(mut self, name: &str, recipe: ClassRecipe) -> FixtureLoader {
        self.recipes.insert(name.as_bytes().to_vec(), recipe);
        self
    }

    /// Split into the machine's finder and parser halves.
    pub fn into_parts(self) -> (Box<dyn ClassFinder>, Box<dyn ClassParser>) {
        let shared = Arc::new(self.recipes);
        (
            Box::new(FixtureFinder(shared.clone())),
            Box::new(FixtureParser(shared)),
        )
    }
}

struct FixtureFinder(Arc<FxHashMap<Vec<u8>, ClassRecipe>>);

impl ClassFinder for FixtureFinder {
    fn find(&self, name: &[u8]) -> Option<Vec<u8>> {
        self.0.contains_key(name).then(|| name.to_vec())
    }
}

struct FixtureParser(Arc<FxHashMap<Vec<u8>, ClassRecipe>>);

impl ClassParser for FixtureParser {
    fn parse(&self, t: &mut Thread, bytes: &[u8]) -> ObjRef {
        match self.0.get(bytes) {
            Some(recipe) => recipe(t),
            None => ObjRef::null(),
        }
    }
}

// =============================================================================
// Canned fixtures used by unit tests
// =============================================================================

/// A pool whose slot 1 is an unresolved class-name entry.
pub fn pool_with_class_name(t: &mut Thread, name: &str) -> ObjRef {
    let scope = Scope::new(t);
    let pool = scope.pin(make_raw_object_array(t, 2));
    let bytes = make_byte_array(t, name.as_bytes());
    t.set(scope.get(pool).object_array_slot(1), bytes);
    scope.get(pool)
}

/// A class with `count` pending trivial initializers.
pub fn class_with_initializers(t: &mut Thread, count: usize) -> ObjRef {
    let mut builder = ClassBuilder::new(&format!("fixtures/Init{}", count));
    for _ in 0..count {
        builder = builder.initializer(MethodDef::new("<clinit>", "()V"));
    }
    builder.build(t)
}
