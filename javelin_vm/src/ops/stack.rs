//! Operand-stack shuffling.
//!
//! The category-2 rules (`pop2`, `dup2*`) key off whether the top values
//! are boxed longs; boxed ints, refs, and everything else count as one
//! word.

use javelin_runtime::{Kind, ObjRef};

use crate::interp::Flow;
use crate::thread::Thread;

/// True when the stack-width rules treat `o` as a two-word value.
#[inline]
fn is_wide(o: ObjRef) -> bool {
    o.is_some() && o.kind() == Kind::Long
}

pub(crate) fn pop(t: &mut Thread) -> Flow {
    t.pop();
    Flow::Continue
}

pub(crate) fn pop2(t: &mut Thread) -> Flow {
    let top = t.pop();
    if !is_wide(top) {
        t.pop();
    }
    Flow::Continue
}

pub(crate) fn dup(t: &mut Thread) -> Flow {
    let top = t.top();
    t.push(top);
    Flow::Continue
}

pub(crate) fn dup_x1(t: &mut Thread) -> Flow {
    let first = t.pop();
    let second = t.pop();
    t.push(first);
    t.push(second);
    t.push(first);
    Flow::Continue
}

pub(crate) fn dup_x2(t: &mut Thread) -> Flow {
    let first = t.pop();
    let second = t.pop();
    let third = t.pop();
    t.push(first);
    t.push(third);
    t.push(second);
    t.push(first);
    Flow::Continue
}

pub(crate) fn dup2(t: &mut Thread) -> Flow {
    let first = t.top();
    if is_wide(first) {
        t.push(first);
    } else {
        let second = t.peek(1);
        t.push(second);
        t.push(first);
    }
    Flow::Continue
}

pub(crate) fn dup2_x1(t: &mut Thread) -> Flow {
    let first = t.pop();
    let second = t.pop();
    if is_wide(first) {
        t.push(first);
        t.push(second);
        t.push(first);
    } else {
        let third = t.pop();
        t.push(second);
        t.push(first);
        t.push(third);
        t.push(second);
        t.push(first);
    }
    Flow::Continue
}

pub(crate) fn dup2_x2(t: &mut Thread) -> Flow {
    let first = t.pop();
    let second = t.pop();
    if is_wide(first) {
        if is_wide(second) {
            t.push(first);
            t.push(second);
            t.push(first);
        } else {
            let third = t.pop();
            t.push(first);
            t.push(third);
            t.push(second);
            t.push(first);
        }
    } else {
        let third = t.pop();
        if is_wide(third) {
            t.push(second);
            t.push(first);
            t.push(third);
            t.push(second);
            t.push(first);
        } else {
            let fourth = t.pop();
            t.push(second);
            t.push(first);
            t.push(fourth);
            t.push(third);
            t.push(second);
            t.push(first);
        }
    }
    Flow::Continue
}

pub(crate) fn swap(t: &mut Thread) -> Flow {
    let first = t.pop();
    let second = t.pop();
    t.push(first);
    t.push(second);
    Flow::Continue
}
