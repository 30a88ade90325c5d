//! Collectable object layouts.
//!
//! The heap stores every collectable as a [`GcObject`]: a [`GcHeader`] and
//! a typed body. The bodies are plain data; the collector reaches into them
//! through [`GcObject::for_each_child`] and the traversal code in
//! `gc::mark`, and the mutator through the accessors on
//! [`Heap`](crate::Heap).

use std::fmt;
use std::mem::size_of;

use crate::header::{GcHeader, White};
use crate::heap::Heap;
use crate::table::Table;
use crate::value::{GcRef, StrRef, Value};

/// Callback run once when an unreachable userdata is collected.
///
/// It receives the heap and the userdata handle. The userdata is still
/// alive while the callback runs and may be resurrected by storing it
/// somewhere reachable.
pub type Finalizer = Box<dyn FnOnce(&mut Heap, GcRef) + Send>;

/// Immutable interned byte string.
#[derive(Debug, Clone)]
pub struct LuaString {
    pub bytes: Box<[u8]>,
    pub hash: u32,
}

/// Function closure: an environment table plus a body.
#[derive(Debug, Clone)]
pub struct Closure {
    pub env: GcRef,
    pub kind: ClosureKind,
}

#[derive(Debug, Clone)]
pub enum ClosureKind {
    /// Bytecode function: a prototype plus upvalue cells.
    Lua { proto: GcRef, upvalues: Vec<GcRef> },
    /// Host function: an opaque entry point plus inline upvalues.
    Native { entry: usize, upvalues: Vec<Value> },
}

/// Opaque host payload with optional metatable, environment and finalizer.
pub struct Userdata {
    pub data: Box<[u8]>,
    pub metatable: Option<GcRef>,
    pub env: Option<GcRef>,
    pub finalizer: Option<Finalizer>,
}

impl fmt::Debug for Userdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Userdata")
            .field("len", &self.data.len())
            .field("metatable", &self.metatable)
            .field("env", &self.env)
            .field("has_finalizer", &self.finalizer.is_some())
            .finish()
    }
}

/// A closed-over variable cell shared between closures.
#[derive(Debug, Clone)]
pub struct Upvalue {
    pub value: Value,
}

/// Function prototype: the compiled, immutable part of a Lua closure.
#[derive(Debug, Clone, Default)]
pub struct Proto {
    pub source: Option<StrRef>,
    pub constants: Vec<Value>,
    pub protos: Vec<GcRef>,
}

/// Execution context. Only its value stack is modeled.
#[derive(Debug, Clone, Default)]
pub struct Thread {
    pub stack: Vec<Value>,
}

#[derive(Debug)]
pub enum ObjectBody {
    String(LuaString),
    Table(Table),
    Closure(Closure),
    Userdata(Userdata),
    Upvalue(Upvalue),
    Proto(Proto),
    Thread(Thread),
}

/// A heap entry: header plus body.
#[derive(Debug)]
pub struct GcObject {
    pub header: GcHeader,
    pub body: ObjectBody,
}

impl GcObject {
    #[must_use]
    pub const fn new(white: White, body: ObjectBody) -> Self {
        Self {
            header: GcHeader::new(white),
            body,
        }
    }

    /// Short kind name for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self.body {
            ObjectBody::String(_) => "string",
            ObjectBody::Table(_) => "table",
            ObjectBody::Closure(_) => "function",
            ObjectBody::Userdata(_) => "userdata",
            ObjectBody::Upvalue(_) => "upvalue",
            ObjectBody::Proto(_) => "proto",
            ObjectBody::Thread(_) => "thread",
        }
    }

    /// Bytes this object accounts for: the fixed entry plus its payload.
    #[must_use]
    pub fn size(&self) -> usize {
        size_of::<Self>() + self.body.payload_bytes()
    }

    #[must_use]
    pub const fn as_table(&self) -> Option<&Table> {
        match &self.body {
            ObjectBody::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut Table> {
        match &mut self.body {
            ObjectBody::Table(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_string(&self) -> Option<&LuaString> {
        match &self.body {
            ObjectBody::String(s) => Some(s),
            _ => None,
        }
    }

    /// Visit every object this one keeps alive.
    ///
    /// Table entries whose value is nil are skipped: their key only
    /// survives as an iteration marker and does not hold its referent.
    pub fn for_each_child(&self, mut f: impl FnMut(GcRef)) {
        match &self.body {
            ObjectBody::String(_) => {}
            ObjectBody::Table(t) => {
                t.metatable.into_iter().for_each(&mut f);
                visit_values(&mut f, t.array());
                for (k, v) in t.node_entries() {
                    if !v.is_nil() {
                        visit_values(&mut f, &[*k, *v]);
                    }
                }
            }
            ObjectBody::Closure(c) => {
                f(c.env);
                match &c.kind {
                    ClosureKind::Lua { proto, upvalues } => {
                        f(*proto);
                        upvalues.iter().copied().for_each(&mut f);
                    }
                    ClosureKind::Native { upvalues, .. } => visit_values(&mut f, upvalues),
                }
            }
            ObjectBody::Userdata(u) => u.metatable.into_iter().chain(u.env).for_each(f),
            ObjectBody::Upvalue(u) => visit_values(&mut f, &[u.value]),
            ObjectBody::Proto(p) => {
                p.source.map(StrRef::gc).into_iter().for_each(&mut f);
                visit_values(&mut f, &p.constants);
                p.protos.iter().copied().for_each(f);
            }
            ObjectBody::Thread(t) => visit_values(&mut f, &t.stack),
        }
    }
}

fn visit_values(f: &mut impl FnMut(GcRef), values: &[Value]) {
    values.iter().filter_map(Value::gc).for_each(f);
}

impl ObjectBody {
    fn payload_bytes(&self) -> usize {
        match self {
            Self::String(s) => s.bytes.len(),
            Self::Table(t) => t.storage_bytes(),
            Self::Closure(c) => match &c.kind {
                ClosureKind::Lua { upvalues, .. } => upvalues.len() * size_of::<GcRef>(),
                ClosureKind::Native { upvalues, .. } => upvalues.len() * size_of::<Value>(),
            },
            Self::Userdata(u) => u.data.len(),
            Self::Upvalue(_) => 0,
            Self::Proto(p) => {
                p.constants.len() * size_of::<Value>() + p.protos.len() * size_of::<GcRef>()
            }
            Self::Thread(t) => t.stack.len() * size_of::<Value>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_includes_payload() {
        let small = GcObject::new(
            White::Zero,
            ObjectBody::String(LuaString {
                bytes: Box::from(&b"ab"[..]),
                hash: 0,
            }),
        );
        let big = GcObject::new(
            White::Zero,
            ObjectBody::String(LuaString {
                bytes: vec![0u8; 100].into_boxed_slice(),
                hash: 0,
            }),
        );
        assert_eq!(big.size() - small.size(), 98);
    }

    #[test]
    fn closure_children() {
        let env = GcRef::new(1, 0);
        let proto = GcRef::new(2, 0);
        let up = GcRef::new(3, 0);
        let obj = GcObject::new(
            White::Zero,
            ObjectBody::Closure(Closure {
                env,
                kind: ClosureKind::Lua {
                    proto,
                    upvalues: vec![up],
                },
            }),
        );
        let mut seen = Vec::new();
        obj.for_each_child(|r| seen.push(r));
        assert_eq!(seen, vec![env, proto, up]);
    }
}
