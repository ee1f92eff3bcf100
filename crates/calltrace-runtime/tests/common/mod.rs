//! Shared test utilities
//!
//! Builds the demonstration program used across the tracer tests and wires
//! a tracer writing into memory.

#![allow(dead_code)]

use calltrace_runtime::bytecode::Opcode;
use calltrace_runtime::function::{CallConvention, ClassBuilder, Signature};
use calltrace_runtime::{Tracer, Value, VM};
use std::cell::RefCell;
use std::rc::Rc;

// Re-export testing utilities
pub use pretty_assertions::{assert_eq, assert_ne};

pub const SOURCE: &str = "demo.src";

/// VM with an in-memory tracer installed
pub struct Traced {
    pub vm: VM,
    pub tracer: Rc<RefCell<Tracer<Vec<u8>>>>,
}

impl Traced {
    pub fn new() -> Self {
        Self::with_tracer(Tracer::new(Vec::new()))
    }

    pub fn with_tracer(tracer: Tracer<Vec<u8>>) -> Self {
        let tracer = Rc::new(RefCell::new(tracer));
        let mut vm = VM::new();
        vm.set_trace_hook(tracer.clone());
        Self { vm, tracer }
    }

    /// Everything written so far
    pub fn output(&self) -> String {
        String::from_utf8(self.tracer.borrow().writer().clone()).expect("trace output is UTF-8")
    }

    /// Written records parsed back into JSON
    pub fn records(&self) -> Vec<serde_json::Value> {
        self.output()
            .lines()
            .map(|line| serde_json::from_str(line).expect("each line is one JSON object"))
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.tracer.borrow().pending()
    }
}

/// Demonstration program
pub struct Demo {
    pub solofunc: Value,
    pub my_class: Value,
    pub safe_divide: Value,
    pub outer: Value,
    pub countdown: Value,
    pub counter: Value,
    pub legacy_divide: Value,
    pub legacy_add: Value,
    pub one_more: Value,
    pub reciprocal: Value,
    pub guarded_total: Value,
}

impl Demo {
    pub fn build() -> Self {
        Self {
            solofunc: solofunc(),
            my_class: my_class(),
            safe_divide: safe_divide(),
            outer: outer(),
            countdown: countdown(),
            counter: counter(),
            legacy_divide: legacy_divide(),
            legacy_add: legacy_add(),
            one_more: one_more(),
            reciprocal: reciprocal(),
            guarded_total: guarded_total(),
        }
    }

    /// Define every routine as a global so routines can call each other
    pub fn install(&self, vm: &mut VM) {
        vm.define_global("solofunc", self.solofunc.clone());
        vm.define_global("MyClass", self.my_class.clone());
        vm.define_global("safe_divide", self.safe_divide.clone());
        vm.define_global("outer", self.outer.clone());
        vm.define_global("countdown", self.countdown.clone());
        vm.define_global("counter", self.counter.clone());
        vm.define_global("one_more", self.one_more.clone());
        vm.define_global("reciprocal", self.reciprocal.clone());
        vm.define_global("guarded_total", self.guarded_total.clone());
    }
}

/// `def solofunc(arg='default'): pass`
fn solofunc() -> Value {
    let function = Signature::new("solofunc")
        .with_source(SOURCE, 3)
        .with_default("arg", Value::from("default"))
        .body()
        .line(4)
        .finish();
    Value::Function(function)
}

/// `MyClass` with instance, static and class-level routines
fn my_class() -> Value {
    let init = Signature::new("init")
        .with_source(SOURCE, 10)
        .with_convention(CallConvention::Instance)
        .with_param("value")
        .body()
        .line(11)
        .get_local("self")
        .get_local("value")
        .set_attr("value")
        .finish();

    let describe = Signature::new("describe")
        .with_source(SOURCE, 14)
        .with_convention(CallConvention::Instance)
        .body()
        .line(15)
        .get_local("self")
        .get_attr("value")
        .op(Opcode::Return)
        .finish();

    let static_helper = Signature::new("static_helper")
        .with_source(SOURCE, 18)
        .with_param("x")
        .body()
        .line(19)
        .get_local("x")
        .constant(Value::Number(2.0))
        .op(Opcode::Mul)
        .op(Opcode::Return)
        .finish();

    let build = Signature::new("build")
        .with_source(SOURCE, 22)
        .with_convention(CallConvention::Type)
        .with_param("value")
        .body()
        .line(23)
        .get_local("cls")
        .get_local("value")
        .call(1)
        .op(Opcode::Return)
        .finish();

    let divide = Signature::new("divide")
        .with_source(SOURCE, 26)
        .with_convention(CallConvention::Instance)
        .with_param("a")
        .with_param("b")
        .body()
        .line(27)
        .get_local("a")
        .get_local("b")
        .op(Opcode::Div)
        .op(Opcode::Return)
        .finish();

    let class = ClassBuilder::new("MyClass")
        .with_method(init)
        .with_method(describe)
        .with_method(static_helper)
        .with_method(build)
        .with_method(divide)
        .build();
    Value::Class(class)
}

/// Catches its own division error and returns normally
fn safe_divide() -> Value {
    let mut body = Signature::new("safe_divide")
        .with_source(SOURCE, 30)
        .with_param("a")
        .with_param("b")
        .body();
    body.line(31);
    let handler = body.jump(Opcode::PushHandler);
    body.line(32)
        .get_local("a")
        .get_local("b")
        .op(Opcode::Div)
        .op(Opcode::PopHandler)
        .op(Opcode::Return);
    body.patch_jump(handler)
        .line(34)
        .op(Opcode::Pop)
        .constant(Value::from("recovered"))
        .op(Opcode::Return);
    Value::Function(body.finish())
}

/// `outer()` calls `countdown(1)`, which recurses once: A -> B -> B
fn outer() -> Value {
    let function = Signature::new("outer")
        .with_source(SOURCE, 37)
        .body()
        .line(38)
        .get_global("countdown")
        .constant(Value::Number(1.0))
        .call(1)
        .op(Opcode::Return)
        .finish();
    Value::Function(function)
}

/// `countdown(n)`: recurse while `n > 0`, return `n`
fn countdown() -> Value {
    let mut body = Signature::new("countdown")
        .with_source(SOURCE, 41)
        .with_param("n")
        .body();
    body.line(42)
        .get_local("n")
        .constant(Value::Number(0.0))
        .op(Opcode::Greater);
    let skip = body.jump(Opcode::JumpIfFalse);
    body.line(43)
        .get_global("countdown")
        .get_local("n")
        .constant(Value::Number(1.0))
        .op(Opcode::Sub)
        .call(1)
        .op(Opcode::Pop);
    body.patch_jump(skip)
        .line(44)
        .get_local("n")
        .op(Opcode::Return);
    Value::Function(body.finish())
}

/// Generator yielding `limit` once, then returning `"done"`
fn counter() -> Value {
    let function = Signature::new("counter")
        .with_source(SOURCE, 47)
        .with_param("limit")
        .generator()
        .body()
        .line(48)
        .get_local("limit")
        .op(Opcode::Yield)
        .op(Opcode::Pop)
        .line(49)
        .constant(Value::from("done"))
        .op(Opcode::Return)
        .finish();
    Value::Function(function)
}

/// Uninstrumented routine: its exits are classified by instruction
fn legacy_divide() -> Value {
    let function = Signature::new("legacy_divide")
        .with_source(SOURCE, 52)
        .with_param("a")
        .with_param("b")
        .uninstrumented()
        .body()
        .line(53)
        .get_local("a")
        .get_local("b")
        .op(Opcode::Div)
        .op(Opcode::Return)
        .finish();
    Value::Function(function)
}

fn legacy_add() -> Value {
    let function = Signature::new("legacy_add")
        .with_source(SOURCE, 56)
        .with_param("a")
        .with_param("b")
        .uninstrumented()
        .body()
        .line(57)
        .get_local("a")
        .get_local("b")
        .op(Opcode::Add)
        .op(Opcode::Return)
        .finish();
    Value::Function(function)
}

/// `return 1 + countdown(0)`: the caller holds an operand across the call
fn one_more() -> Value {
    let function = Signature::new("one_more")
        .with_source(SOURCE, 60)
        .body()
        .line(61)
        .constant(Value::Number(1.0))
        .get_global("countdown")
        .constant(Value::Number(0.0))
        .call(1)
        .op(Opcode::Add)
        .op(Opcode::Return)
        .finish();
    Value::Function(function)
}

/// `return 1 / x`
fn reciprocal() -> Value {
    let function = Signature::new("reciprocal")
        .with_source(SOURCE, 64)
        .with_param("x")
        .body()
        .line(65)
        .constant(Value::Number(1.0))
        .get_local("x")
        .op(Opcode::Div)
        .op(Opcode::Return)
        .finish();
    Value::Function(function)
}

/// `10 + reciprocal(0)` inside a handler that recovers with `10 + 5`
fn guarded_total() -> Value {
    let mut body = Signature::new("guarded_total")
        .with_source(SOURCE, 68)
        .body();
    body.line(69).constant(Value::Number(10.0));
    let handler = body.jump(Opcode::PushHandler);
    body.line(70)
        .get_global("reciprocal")
        .constant(Value::Number(0.0))
        .call(1)
        .op(Opcode::PopHandler)
        .op(Opcode::Add)
        .op(Opcode::Return);
    body.patch_jump(handler)
        .line(72)
        .op(Opcode::Pop)
        .constant(Value::Number(5.0))
        .op(Opcode::Add)
        .op(Opcode::Return);
    Value::Function(body.finish())
}

pub fn number(n: f64) -> Value {
    Value::Number(n)
}
