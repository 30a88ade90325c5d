//! The heap: one explicit context owning every object and the collector.
//!
//! All allocation, barrier and collector entry points take `&mut Heap`.
//! There is no ambient state, so several heaps can coexist.
//!
//! # Rooting
//!
//! A [`GcRef`] held only by Rust code is not a root. Objects survive a
//! collector step only if they are reachable from the main thread's stack,
//! the globals table, the registry or a per-type metatable. Allocation never
//! runs the collector by itself: callers anchor fresh objects and then call
//! [`Heap::check_gc`].

use std::mem::size_of;

use crate::alloc::Accounting;
use crate::arena::Arena;
use crate::config::GcConfig;
use crate::error::Result;
use crate::gc::{GcState, Phase};
use crate::header::{Color, White};
use crate::metrics::GcMetrics;
use crate::object::{
    Closure, ClosureKind, Finalizer, GcObject, LuaString, ObjectBody, Proto, Thread, Upvalue,
    Userdata,
};
use crate::string::{hash_bytes, StringTable};
use crate::table::Table;
use crate::value::{GcRef, StrRef, TypeTag, Value};

/// An independent garbage-collected heap.
#[derive(Debug)]
pub struct Heap {
    pub(crate) objects: Arena,
    pub(crate) strings: StringTable,
    pub(crate) gc: GcState,
    pub(crate) accounting: Accounting,
    pub(crate) main_thread: GcRef,
    pub(crate) registry: GcRef,
    pub(crate) globals: GcRef,
    pub(crate) type_metatables: [Option<GcRef>; TypeTag::COUNT],
    pub(crate) mode_key: StrRef,
}

// Create a non-string object and put it on the root list.
fn link(
    objects: &mut Arena,
    accounting: &mut Accounting,
    gc: &mut GcState,
    body: ObjectBody,
) -> Result<GcRef> {
    let object = GcObject::new(gc.current_white, body);
    accounting.charge(object.size())?;
    let r = objects.insert(object);
    gc.root_list.push(r);
    Ok(r)
}

fn intern_in(
    objects: &mut Arena,
    strings: &mut StringTable,
    accounting: &mut Accounting,
    gc: &GcState,
    bytes: &[u8],
) -> Result<StrRef> {
    let hash = hash_bytes(bytes);
    if let Some(s) = strings.find(objects, bytes, hash) {
        let header = &mut objects.get_mut(s.gc()).header;
        // Not yet reached by the string sweep: flipping it back is enough.
        if header.is_dead(gc.current_white) {
            header.change_white();
        }
        return Ok(s);
    }
    let object = GcObject::new(
        gc.current_white,
        ObjectBody::String(LuaString {
            bytes: bytes.into(),
            hash,
        }),
    );
    accounting.charge(object.size())?;
    let s = StrRef::new(objects.insert(object), hash);
    strings.insert(s);
    // Resizing would move strings across the bucket cursor mid-sweep.
    if strings.wants_grow() && gc.phase != Phase::SweepStrings {
        strings.resize(strings.bucket_count() * 2);
    }
    Ok(s)
}

impl Heap {
    /// Create a heap with its main thread, registry, globals table and the
    /// fixed strings the collector itself needs.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the bootstrap
    /// objects do not fit in `config.memory_limit`.
    pub fn new(config: GcConfig) -> Result<Self> {
        let mut objects = Arena::new();
        let mut strings = StringTable::new();
        let mut accounting = Accounting::new(config.memory_limit);
        let mut gc = GcState::new(config);

        let main_thread = link(
            &mut objects,
            &mut accounting,
            &mut gc,
            ObjectBody::Thread(Thread::default()),
        )?;
        let registry = link(
            &mut objects,
            &mut accounting,
            &mut gc,
            ObjectBody::Table(Table::default()),
        )?;
        let globals = link(
            &mut objects,
            &mut accounting,
            &mut gc,
            ObjectBody::Table(Table::default()),
        )?;
        let mode_key = intern_in(&mut objects, &mut strings, &mut accounting, &gc, b"__mode")?;
        objects.get_mut(mode_key.gc()).header.fix();

        accounting.threshold = 4 * accounting.total;
        accounting.estimate = accounting.total;

        Ok(Self {
            objects,
            strings,
            gc,
            accounting,
            main_thread,
            registry,
            globals,
            type_metatables: [None; TypeTag::COUNT],
            mode_key,
        })
    }

    pub(crate) fn allocate(&mut self, body: ObjectBody) -> Result<GcRef> {
        link(&mut self.objects, &mut self.accounting, &mut self.gc, body)
    }

    pub(crate) fn table_ref(&self, t: GcRef) -> &Table {
        let object = self.objects.get(t);
        match object.as_table() {
            Some(table) => table,
            None => panic!("{t:?} is a {}, not a table", object.kind()),
        }
    }

    pub(crate) fn table_mut(&mut self, t: GcRef) -> &mut Table {
        let object = self.objects.get_mut(t);
        let kind = object.kind();
        match object.as_table_mut() {
            Some(table) => table,
            None => panic!("{t:?} is a {kind}, not a table"),
        }
    }

    fn userdata_mut(&mut self, u: GcRef) -> &mut Userdata {
        match &mut self.objects.get_mut(u).body {
            ObjectBody::Userdata(ud) => ud,
            _ => panic!("{u:?} is not a userdata"),
        }
    }

    fn userdata(&self, u: GcRef) -> &Userdata {
        match &self.objects.get(u).body {
            ObjectBody::Userdata(ud) => ud,
            _ => panic!("{u:?} is not a userdata"),
        }
    }

    fn thread_mut(&mut self, th: GcRef) -> &mut Thread {
        match &mut self.objects.get_mut(th).body {
            ObjectBody::Thread(t) => t,
            _ => panic!("{th:?} is not a thread"),
        }
    }

    // --- roots ---

    /// The main execution context. Its stack is a root.
    #[must_use]
    pub const fn main_thread(&self) -> GcRef {
        self.main_thread
    }

    /// The registry table, a root.
    #[must_use]
    pub const fn registry(&self) -> GcRef {
        self.registry
    }

    /// The globals table, a root.
    #[must_use]
    pub const fn globals(&self) -> GcRef {
        self.globals
    }

    // --- strings ---

    /// Intern `bytes`, returning the one handle for this content.
    ///
    /// A string that was found dead but not yet swept is revived in place,
    /// so it keeps its handle.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn intern(&mut self, bytes: &[u8]) -> Result<StrRef> {
        intern_in(
            &mut self.objects,
            &mut self.strings,
            &mut self.accounting,
            &self.gc,
            bytes,
        )
    }

    /// Content of an interned string.
    #[must_use]
    pub fn str_bytes(&self, s: StrRef) -> &[u8] {
        match self.objects.get(s.gc()).as_string() {
            Some(ls) => &ls.bytes,
            None => panic!("{s:?} is not a string"),
        }
    }

    /// Make `s` permanent: it is never collected.
    pub fn fix_string(&mut self, s: StrRef) {
        self.objects.get_mut(s.gc()).header.fix();
    }

    /// Number of interned strings, including dead ones not yet swept.
    #[must_use]
    pub const fn string_count(&self) -> usize {
        self.strings.len()
    }

    /// Current bucket count of the intern table.
    #[must_use]
    pub fn string_table_size(&self) -> usize {
        self.strings.bucket_count()
    }

    // --- tables ---

    /// A new empty table sized for `narray` array and `nhash` hash entries.
    ///
    /// # Errors
    ///
    /// [`Error::TableOverflow`](crate::Error::TableOverflow) or
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn new_table(&mut self, narray: usize, nhash: usize) -> Result<GcRef> {
        let table = Table::new(narray, nhash)?;
        self.allocate(ObjectBody::Table(table))
    }

    /// Raw read of `t[key]`.
    #[must_use]
    pub fn table_get(&self, t: GcRef, key: &Value) -> Value {
        self.table_ref(t).get(key)
    }

    /// Raw write of `t[key] = value`, with the backward barrier.
    ///
    /// # Errors
    ///
    /// [`Error::NilIndex`](crate::Error::NilIndex) and
    /// [`Error::NanIndex`](crate::Error::NanIndex) before any change;
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory) or
    /// [`Error::TableOverflow`](crate::Error::TableOverflow) if a needed
    /// rehash fails.
    pub fn table_set(&mut self, t: GcRef, key: Value, value: Value) -> Result<()> {
        let table = match self.objects.get_mut(t).as_table_mut() {
            Some(table) => table,
            None => panic!("{t:?} is not a table"),
        };
        table.set(key, value, &mut self.accounting)?;
        self.barrier_back(t, &key);
        self.barrier_back(t, &value);
        Ok(())
    }

    /// Shorthand for a string-keyed [`Heap::table_set`].
    ///
    /// # Errors
    ///
    /// As for [`Heap::table_set`], plus interning failures.
    pub fn table_set_str(&mut self, t: GcRef, key: &str, value: Value) -> Result<()> {
        let k = self.intern(key.as_bytes())?;
        self.table_set(t, Value::String(k), value)
    }

    /// Shorthand for a string-keyed [`Heap::table_get`]. A key that was
    /// never interned cannot be present.
    #[must_use]
    pub fn table_get_str(&self, t: GcRef, key: &str) -> Value {
        let bytes = key.as_bytes();
        self.strings
            .find(&self.objects, bytes, hash_bytes(bytes))
            .map_or(Value::Nil, |s| self.table_ref(t).get_str(s))
    }

    /// Traversal step: the entry after `key`, or `None` at the end.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidNextKey`](crate::Error::InvalidNextKey).
    pub fn table_next(&self, t: GcRef, key: &Value) -> Result<Option<(Value, Value)>> {
        self.table_ref(t).next(key)
    }

    /// A border of `t`.
    #[must_use]
    pub fn table_length(&self, t: GcRef) -> usize {
        self.table_ref(t).length()
    }

    /// Resize the array part of `t` to `nasize`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory) or
    /// [`Error::TableOverflow`](crate::Error::TableOverflow).
    pub fn table_resize_array(&mut self, t: GcRef, nasize: usize) -> Result<()> {
        let table = match self.objects.get_mut(t).as_table_mut() {
            Some(table) => table,
            None => panic!("{t:?} is not a table"),
        };
        table.resize_array(nasize, &mut self.accounting)
    }

    /// Read-only view of a table, for introspection.
    #[must_use]
    pub fn table(&self, t: GcRef) -> &Table {
        self.table_ref(t)
    }

    // --- metatables ---

    /// Set the metatable of `target`. Tables and userdata carry their own;
    /// every other type shares one per type.
    pub fn set_metatable(&mut self, target: &Value, mt: Option<GcRef>) {
        let mt_value = mt.map_or(Value::Nil, Value::Table);
        match *target {
            Value::Table(t) => {
                self.table_mut(t).metatable = mt;
                self.barrier_back(t, &mt_value);
            }
            Value::Userdata(u) => {
                self.userdata_mut(u).metatable = mt;
                self.barrier_forward_value(u, &mt_value);
            }
            other => self.type_metatables[other.type_tag().index()] = mt,
        }
    }

    /// Metatable of `target`, if any.
    #[must_use]
    pub fn metatable(&self, target: &Value) -> Option<GcRef> {
        match *target {
            Value::Table(t) => self.table_ref(t).metatable,
            Value::Userdata(u) => self.userdata(u).metatable,
            other => self.type_metatables[other.type_tag().index()],
        }
    }

    // --- userdata ---

    /// A new userdata owning `data`, with an optional environment table.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn new_userdata(&mut self, data: impl Into<Box<[u8]>>, env: Option<GcRef>) -> Result<GcRef> {
        self.allocate(ObjectBody::Userdata(Userdata {
            data: data.into(),
            metatable: None,
            env,
            finalizer: None,
        }))
    }

    /// Register the callback to run when `u` is found unreachable.
    ///
    /// It runs at most once. A userdata that was already separated for
    /// finalization does not run a finalizer registered afterwards.
    pub fn set_finalizer(&mut self, u: GcRef, finalizer: Finalizer) {
        self.userdata_mut(u).finalizer = Some(finalizer);
    }

    /// Payload of a userdata.
    #[must_use]
    pub fn userdata_data(&self, u: GcRef) -> &[u8] {
        &self.userdata(u).data
    }

    /// Mutable payload of a userdata. The payload holds no references, so
    /// no barrier is involved.
    pub fn userdata_data_mut(&mut self, u: GcRef) -> &mut [u8] {
        &mut self.userdata_mut(u).data
    }

    /// Environment table of a userdata.
    #[must_use]
    pub fn userdata_env(&self, u: GcRef) -> Option<GcRef> {
        self.userdata(u).env
    }

    /// Replace the environment of `u`, with the forward barrier.
    pub fn set_userdata_env(&mut self, u: GcRef, env: Option<GcRef>) {
        self.userdata_mut(u).env = env;
        self.barrier_forward_value(u, &env.map_or(Value::Nil, Value::Table));
    }

    // --- functions ---

    /// A new upvalue cell holding `value`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn new_upvalue(&mut self, value: Value) -> Result<GcRef> {
        self.allocate(ObjectBody::Upvalue(Upvalue { value }))
    }

    /// Current content of an upvalue cell.
    #[must_use]
    pub fn upvalue_get(&self, uv: GcRef) -> Value {
        match &self.objects.get(uv).body {
            ObjectBody::Upvalue(u) => u.value,
            _ => panic!("{uv:?} is not an upvalue"),
        }
    }

    /// Store into an upvalue cell, with the forward barrier.
    pub fn upvalue_set(&mut self, uv: GcRef, value: Value) {
        match &mut self.objects.get_mut(uv).body {
            ObjectBody::Upvalue(u) => u.value = value,
            _ => panic!("{uv:?} is not an upvalue"),
        }
        self.barrier_forward_value(uv, &value);
    }

    /// A new function prototype.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn new_proto(
        &mut self,
        source: Option<StrRef>,
        constants: Vec<Value>,
        protos: Vec<GcRef>,
    ) -> Result<GcRef> {
        self.allocate(ObjectBody::Proto(Proto {
            source,
            constants,
            protos,
        }))
    }

    /// A new bytecode closure over `proto` with the given upvalue cells.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn new_lua_closure(
        &mut self,
        proto: GcRef,
        upvalues: Vec<GcRef>,
        env: GcRef,
    ) -> Result<GcRef> {
        self.allocate(ObjectBody::Closure(Closure {
            env,
            kind: ClosureKind::Lua { proto, upvalues },
        }))
    }

    /// A new host closure. `entry` is opaque to the heap.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn new_native_closure(
        &mut self,
        entry: usize,
        upvalues: Vec<Value>,
        env: GcRef,
    ) -> Result<GcRef> {
        self.allocate(ObjectBody::Closure(Closure {
            env,
            kind: ClosureKind::Native { entry, upvalues },
        }))
    }

    /// Replace a closure's environment, with the forward barrier.
    pub fn set_closure_env(&mut self, f: GcRef, env: GcRef) {
        match &mut self.objects.get_mut(f).body {
            ObjectBody::Closure(c) => c.env = env,
            _ => panic!("{f:?} is not a function"),
        }
        self.barrier_forward_value(f, &Value::Table(env));
    }

    /// Environment of a closure.
    #[must_use]
    pub fn closure_env(&self, f: GcRef) -> GcRef {
        match &self.objects.get(f).body {
            ObjectBody::Closure(c) => c.env,
            _ => panic!("{f:?} is not a function"),
        }
    }

    // --- threads ---

    /// A new execution context with an empty stack.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn new_thread(&mut self) -> Result<GcRef> {
        self.allocate(ObjectBody::Thread(Thread::default()))
    }

    /// Push onto a thread's stack. Threads are rescanned in the atomic pass
    /// and are never black, so stack writes need no barrier.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn thread_push(&mut self, th: GcRef, value: Value) -> Result<()> {
        self.accounting.charge(size_of::<Value>())?;
        self.thread_mut(th).stack.push(value);
        Ok(())
    }

    /// Pop from a thread's stack.
    pub fn thread_pop(&mut self, th: GcRef) -> Option<Value> {
        let v = self.thread_mut(th).stack.pop();
        if v.is_some() {
            self.accounting.release(size_of::<Value>());
        }
        v
    }

    /// Stack of a thread, bottom first.
    #[must_use]
    pub fn thread_stack(&self, th: GcRef) -> &[Value] {
        match &self.objects.get(th).body {
            ObjectBody::Thread(t) => &t.stack,
            _ => panic!("{th:?} is not a thread"),
        }
    }

    /// Push onto the main thread's stack, rooting `value`.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn push(&mut self, value: Value) -> Result<()> {
        self.thread_push(self.main_thread, value)
    }

    /// Pop from the main thread's stack.
    pub fn pop(&mut self) -> Option<Value> {
        self.thread_pop(self.main_thread)
    }

    // --- introspection ---

    /// Current collector phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.gc.phase
    }

    /// The white that marks objects created in the current cycle.
    #[must_use]
    pub const fn current_white(&self) -> White {
        self.gc.current_white
    }

    /// Color of a live object.
    #[must_use]
    pub fn color(&self, r: GcRef) -> Color {
        self.objects.get(r).header.color()
    }

    /// Whether `r` still names an object. An object that is unreachable but
    /// not yet swept still counts.
    #[must_use]
    pub fn contains(&self, r: GcRef) -> bool {
        self.objects.contains(r)
    }

    /// Number of objects in the heap, strings included.
    #[must_use]
    pub const fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Bytes currently accounted to the heap.
    #[must_use]
    pub const fn total_bytes(&self) -> usize {
        self.accounting.total
    }

    /// Live-byte estimate from the last marking.
    #[must_use]
    pub const fn estimate(&self) -> usize {
        self.accounting.estimate
    }

    /// Byte count at which [`Heap::check_gc`] next steps.
    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.accounting.threshold
    }

    /// Userdata waiting for their finalizer.
    #[must_use]
    pub fn pending_finalizers(&self) -> usize {
        self.gc.pending_finalization.len()
    }

    /// Collector counters.
    #[must_use]
    pub const fn metrics(&self) -> &GcMetrics {
        &self.gc.metrics
    }

    /// Current tunables.
    #[must_use]
    pub const fn config(&self) -> &GcConfig {
        &self.gc.config
    }

    /// Set the pause percentage, returning the previous one.
    pub fn set_pause(&mut self, pause: u32) -> u32 {
        std::mem::replace(&mut self.gc.config.pause, pause)
    }

    /// Set the step multiplier, returning the previous one.
    pub fn set_step_multiplier(&mut self, step_multiplier: u32) -> u32 {
        std::mem::replace(&mut self.gc.config.step_multiplier, step_multiplier)
    }

    /// Change the memory limit. Bytes already charged are not checked.
    pub fn set_memory_limit(&mut self, limit: Option<usize>) {
        self.gc.config.memory_limit = limit;
        self.accounting.set_limit(limit);
    }
}
