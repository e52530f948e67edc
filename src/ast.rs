// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::descriptors::{MemberDesc, MethodDesc};
use crate::types::Type;
use crate::value::Value;
use crate::Rc;

use core::{cmp, fmt, ops::Deref};

/// Shared handle to an immutable tree node. Equality and ordering are by
/// node identity, not by structure.
pub struct NodeRef<T> {
    r: Rc<T>,
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self { r: self.r.clone() }
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.r.as_ref().fmt(f)
    }
}

impl<T: fmt::Display> fmt::Display for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.r.as_ref().fmt(f)
    }
}

impl<T> cmp::PartialEq for NodeRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::as_ptr(&self.r).eq(&Rc::as_ptr(&other.r))
    }
}

impl<T> cmp::Eq for NodeRef<T> {}

impl<T> cmp::Ord for NodeRef<T> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        Rc::as_ptr(&self.r).cmp(&Rc::as_ptr(&other.r))
    }
}

impl<T> cmp::PartialOrd for NodeRef<T> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Deref for NodeRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.r
    }
}

impl<T> AsRef<T> for NodeRef<T> {
    fn as_ref(&self) -> &T {
        self.deref()
    }
}

impl<T> NodeRef<T> {
    pub fn new(t: T) -> Self {
        Self { r: Rc::new(t) }
    }
}

pub type Ref<T> = NodeRef<T>;

/// Query expression tree. Every node carries its static type.
#[derive(Debug)]
pub enum Expr {
    Constant {
        value: Value,
        ty: Type,
    },

    Parameter {
        name: Rc<str>,
        ty: Type,
    },

    // `target` is None for static members.
    Member {
        target: Option<Ref<Expr>>,
        member: MemberDesc,
        ty: Type,
    },

    // `receiver` is None for static methods.
    Call {
        receiver: Option<Ref<Expr>>,
        method: MethodDesc,
        args: Vec<Ref<Expr>>,
        ty: Type,
    },
}

impl Expr {
    pub fn constant(value: Value, ty: Type) -> Ref<Expr> {
        Ref::new(Expr::Constant { value, ty })
    }

    /// Constant typed with the value's own runtime type.
    pub fn value(value: Value) -> Ref<Expr> {
        let ty = value.runtime_type();
        Self::constant(value, ty)
    }

    pub fn parameter(name: &str, ty: Type) -> Ref<Expr> {
        Ref::new(Expr::Parameter {
            name: name.into(),
            ty,
        })
    }

    pub fn member(target: Option<Ref<Expr>>, member: MemberDesc) -> Ref<Expr> {
        let ty = member.member_type.clone();
        Ref::new(Expr::Member { target, member, ty })
    }

    pub fn call(receiver: Option<Ref<Expr>>, method: MethodDesc, args: Vec<Ref<Expr>>) -> Ref<Expr> {
        let ty = method.return_type();
        Ref::new(Expr::Call {
            receiver,
            method,
            args,
            ty,
        })
    }

    pub fn static_call(method: MethodDesc, args: Vec<Ref<Expr>>) -> Ref<Expr> {
        Self::call(None, method, args)
    }

    pub fn ty(&self) -> &Type {
        match self {
            Expr::Constant { ty, .. }
            | Expr::Parameter { ty, .. }
            | Expr::Member { ty, .. }
            | Expr::Call { ty, .. } => ty,
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Expr::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.as_constant().is_some()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant { value, .. } => write!(f, "{value}"),
            Expr::Parameter { name, .. } => f.write_str(name),
            Expr::Member {
                target, member, ..
            } => match target {
                Some(t) => write!(f, "{t}.{}", member.name),
                None => f.write_str(&member.qualified_name()),
            },
            Expr::Call {
                receiver,
                method,
                args,
                ..
            } => {
                match receiver {
                    Some(r) => write!(f, "{r}.{}(", method.name())?,
                    None => write!(f, "{}(", method.qualified_name())?,
                }
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
