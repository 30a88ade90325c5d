//! Marking: roots, gray-list propagation, and the atomic pass.

use crate::header::GcFlags;
use crate::heap::Heap;
use crate::object::{ClosureKind, ObjectBody};
use crate::table::Slot;
use crate::value::{GcRef, Value};

use super::Phase;

impl Heap {
    /// Shade a white object. Leaves are blackened on the spot; containers
    /// turn gray and wait on the gray list.
    pub(crate) fn mark_object(&mut self, r: GcRef) {
        let object = self.objects.get_mut(r);
        if !object.header.is_white() {
            return;
        }
        object.header.white_to_gray();
        match &object.body {
            ObjectBody::String(_) => object.header.gray_to_black(),
            ObjectBody::Userdata(u) => {
                let (mt, env) = (u.metatable, u.env);
                object.header.gray_to_black();
                for child in mt.into_iter().chain(env) {
                    self.mark_object(child);
                }
            }
            ObjectBody::Upvalue(u) => {
                let value = u.value;
                object.header.gray_to_black();
                self.mark_value(&value);
            }
            ObjectBody::Table(_)
            | ObjectBody::Closure(_)
            | ObjectBody::Proto(_)
            | ObjectBody::Thread(_) => self.gc.gray.push(r),
        }
    }

    pub(crate) fn mark_value(&mut self, v: &Value) {
        if let Some(r) = v.gc() {
            self.mark_object(r);
        }
    }

    fn mark_type_metatables(&mut self) {
        for mt in self.type_metatables.into_iter().flatten() {
            self.mark_object(mt);
        }
    }

    /// Start a cycle: reset the lists and gray the roots.
    pub(crate) fn mark_roots(&mut self) {
        self.gc.gray.clear();
        self.gc.gray_again.clear();
        self.gc.weak.clear();
        self.mark_object(self.main_thread);
        self.mark_object(self.globals);
        self.mark_object(self.registry);
        self.mark_type_metatables();
        self.gc.transition_to(Phase::Propagate);
    }

    /// Weakness requested by a table's metatable through `__mode`.
    fn weak_mode(&self, mt: Option<GcRef>) -> (bool, bool) {
        let Some(mt) = mt else {
            return (false, false);
        };
        match self.table_ref(mt).get_str(self.mode_key) {
            Value::String(s) => {
                let mode = self.str_bytes(s);
                (mode.contains(&b'k'), mode.contains(&b'v'))
            }
            _ => (false, false),
        }
    }

    /// Pop one gray object and shade its children. Returns the object's
    /// size as the amount of work done.
    pub(crate) fn propagate_mark(&mut self) -> usize {
        let Some(r) = self.gc.gray.pop() else {
            return 0;
        };
        debug_assert!(self.objects.get(r).header.is_gray());
        let mut children = std::mem::take(&mut self.gc.scratch);
        children.clear();

        let object = self.objects.get(r);
        let size = object.size();
        let mut stays_gray = false;
        match &object.body {
            ObjectBody::Table(t) => {
                let (weak_keys, weak_values) = self.weak_mode(t.metatable);
                children.extend(t.metatable);
                if weak_keys || weak_values {
                    stays_gray = true;
                    self.gc.weak.push(r);
                }
                if !(weak_keys && weak_values) {
                    for (_, key, value) in t.live_slots() {
                        if !weak_keys {
                            children.extend(key.gc());
                        }
                        if !weak_values {
                            children.extend(value.gc());
                        }
                    }
                }
                self.objects
                    .get_mut(r)
                    .header
                    .set_weakness(weak_keys, weak_values);
            }
            ObjectBody::Closure(c) => {
                children.push(c.env);
                match &c.kind {
                    ClosureKind::Lua { proto, upvalues } => {
                        children.push(*proto);
                        children.extend(upvalues.iter().copied());
                    }
                    ClosureKind::Native { upvalues, .. } => {
                        children.extend(upvalues.iter().filter_map(Value::gc));
                    }
                }
            }
            ObjectBody::Proto(p) => {
                children.extend(p.source.map(|s| s.gc()));
                children.extend(p.constants.iter().filter_map(Value::gc));
                children.extend(p.protos.iter().copied());
            }
            ObjectBody::Thread(th) => {
                children.extend(th.stack.iter().filter_map(Value::gc));
                // Stacks change without barriers; rescan in the atomic pass.
                stays_gray = true;
                self.gc.gray_again.push(r);
            }
            ObjectBody::String(_) | ObjectBody::Userdata(_) | ObjectBody::Upvalue(_) => {
                unreachable!("{} objects are never gray-listed", object.kind())
            }
        }
        if !stays_gray {
            self.objects.get_mut(r).header.gray_to_black();
        }
        for &child in &children {
            self.mark_object(child);
        }
        self.gc.scratch = children;
        size
    }

    /// Drain the gray list. Returns the total work done.
    pub(crate) fn propagate_all(&mut self) -> usize {
        let mut work = 0;
        while !self.gc.gray.is_empty() {
            work += self.propagate_mark();
        }
        work
    }

    /// Move unreachable userdata that still need finalizing to the pending
    /// list. With `all`, every userdata not yet finalized is moved. Returns
    /// the bytes moved.
    pub(crate) fn separate_userdata(&mut self, all: bool) -> usize {
        let mut moved = 0;
        let objects = &mut self.objects;
        let pending = &mut self.gc.pending_finalization;
        self.gc.root_list.retain(|&r| {
            let object = objects.get_mut(r);
            let ObjectBody::Userdata(u) = &object.body else {
                return true;
            };
            if !(all || object.header.is_white()) || object.header.is_finalized() {
                return true;
            }
            let has_finalizer = u.finalizer.is_some();
            object.header.set_finalized();
            if !has_finalizer {
                return true;
            }
            moved += object.size();
            pending.push_back(r);
            false
        });
        moved
    }

    /// Keep everything awaiting finalization alive for one more cycle.
    fn mark_pending_finalization(&mut self) {
        let white = self.gc.current_white;
        for i in 0..self.gc.pending_finalization.len() {
            let u = self.gc.pending_finalization[i];
            let header = &mut self.objects.get_mut(u).header;
            if !header.is_white() {
                header.make_white(white);
            }
            self.mark_object(u);
        }
    }

    // A weak entry dies if it refers to an unmarked collectable. Strings are
    // values, not identities, so they are marked instead of cleared.
    // Finalized userdata are cleared from values but kept as keys.
    fn is_cleared(&mut self, v: &Value, is_key: bool) -> bool {
        match *v {
            Value::String(s) => {
                self.mark_object(s.gc());
                false
            }
            Value::Table(r) | Value::Function(r) | Value::Thread(r) => {
                self.objects.get(r).header.is_white()
            }
            Value::Userdata(r) => {
                let header = self.objects.get(r).header;
                header.is_white() || (!is_key && header.is_finalized())
            }
            Value::Nil | Value::Boolean(_) | Value::Number(_) | Value::LightUserdata(_) => false,
        }
    }

    fn clear_weak_tables(&mut self) {
        let weak = std::mem::take(&mut self.gc.weak);
        let mut dead: Vec<Slot> = Vec::new();
        for &t in &weak {
            let flags = self.objects.get(t).header.flags();
            let weak_values = flags.contains(GcFlags::WEAK_VALUES);
            let entries: Vec<_> = self.table_ref(t).live_slots().collect();
            dead.clear();
            for (slot, key, value) in entries {
                let cleared = match slot {
                    Slot::Array(_) => weak_values && self.is_cleared(&value, false),
                    Slot::Node(_) => self.is_cleared(&key, true) || self.is_cleared(&value, false),
                };
                if cleared {
                    dead.push(slot);
                }
            }
            let table = self.table_mut(t);
            for &slot in &dead {
                table.clear_slot(slot);
            }
        }
        self.gc.weak = weak;
    }

    /// The non-interruptible end of marking. Finishes propagation, clears
    /// weak tables, separates finalizable userdata, flips the current white
    /// and starts the sweep.
    pub(crate) fn atomic(&mut self) {
        self.propagate_all();

        // Weak tables stayed gray; traverse them again.
        self.gc.gray = std::mem::take(&mut self.gc.weak);
        self.mark_object(self.main_thread);
        self.mark_type_metatables();
        self.propagate_all();

        // Objects that took a backward barrier, and every thread.
        self.gc.gray = std::mem::take(&mut self.gc.gray_again);
        self.propagate_all();

        let mut udsize = self.separate_userdata(false);
        let separated = self.gc.pending_finalization.len();
        self.mark_pending_finalization();
        udsize += self.propagate_all();

        self.clear_weak_tables();

        self.gc.current_white = self.gc.current_white.other();
        self.gc.sweep_string_cursor = 0;
        self.gc.sweep_cursor = self.gc.root_list.len();
        self.accounting.estimate = self.accounting.total.saturating_sub(udsize);

        #[cfg(feature = "tracing")]
        crate::gc::tracing::log_atomic(
            self.gc.gc_id,
            self.gc.weak.len(),
            separated,
            self.accounting.estimate,
        );
        #[cfg(not(feature = "tracing"))]
        let _ = separated;

        self.gc.transition_to(Phase::SweepStrings);
    }
}
