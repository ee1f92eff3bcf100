//! Routine and class definitions
//!
//! Routines are assembled with a two-stage builder: a [`Signature`] declares
//! the name, source location, parameters and calling convention, then
//! [`Signature::body`] hands out a [`FunctionBuilder`] that emits bytecode.
//!
//! ```
//! use calltrace_runtime::bytecode::Opcode;
//! use calltrace_runtime::function::{CallConvention, Signature};
//!
//! let area = Signature::new("area")
//!     .with_source("shapes.src", 10)
//!     .with_convention(CallConvention::Instance)
//!     .with_param("scale")
//!     .body()
//!     .line(11)
//!     .get_local("self")
//!     .get_attr("width")
//!     .get_local("scale")
//!     .op(Opcode::Mul)
//!     .op(Opcode::Return)
//!     .finish();
//!
//! assert_eq!(area.arity(), 1);
//! assert_eq!(area.receiver_name(), Some("self"));
//! ```

use crate::bytecode::{Chunk, Opcode};
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Method run on a fresh instance when a class is called
pub const INIT_METHOD: &str = "init";

/// How a routine's receiver is bound
///
/// Declared when the routine is built; the tracer reads it instead of
/// guessing from binding names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallConvention {
    /// No receiver
    #[default]
    Free,
    /// Receiver is an instance
    Instance,
    /// Receiver is the class itself
    Type,
}

impl CallConvention {
    /// Whether local slot 0 holds a receiver
    pub fn has_receiver(self) -> bool {
        !matches!(self, CallConvention::Free)
    }

    /// Receiver binding name used when none is declared
    pub fn default_receiver_name(self) -> Option<&'static str> {
        match self {
            CallConvention::Free => None,
            CallConvention::Instance => Some("self"),
            CallConvention::Type => Some("cls"),
        }
    }
}

/// Declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    /// Bound when the caller does not supply the argument
    pub default: Option<Value>,
}

/// Compiled routine
#[derive(Debug)]
pub struct FunctionDef {
    pub name: String,
    pub source_file: String,
    /// Line of the routine's definition
    pub first_line: u32,
    pub params: Vec<Param>,
    /// Names of every local slot: receiver first, then parameters, then
    /// body locals in declaration order
    pub locals: Vec<String>,
    pub convention: CallConvention,
    pub is_generator: bool,
    /// Instrumented routines report their exit kind with the return event
    pub instrumented: bool,
    pub chunk: Chunk,
}

impl FunctionDef {
    /// Number of declared parameters (receiver excluded)
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Number of parameters without a default
    pub fn required_arity(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }

    /// Slot index of the first parameter
    pub fn first_param_slot(&self) -> usize {
        usize::from(self.convention.has_receiver())
    }

    /// Receiver binding name, if the convention binds one
    pub fn receiver_name(&self) -> Option<&str> {
        if self.convention.has_receiver() {
            self.locals.first().map(String::as_str)
        } else {
            None
        }
    }

    /// Slot index of a named local
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.locals.iter().position(|local| local == name)
    }
}

/// First builder stage: everything about a routine except its body
#[derive(Debug, Clone)]
pub struct Signature {
    name: String,
    source_file: String,
    first_line: u32,
    convention: CallConvention,
    receiver_name: Option<String>,
    params: Vec<Param>,
    is_generator: bool,
    instrumented: bool,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_file: "<unknown>".to_string(),
            first_line: 1,
            convention: CallConvention::Free,
            receiver_name: None,
            params: Vec::new(),
            is_generator: false,
            instrumented: true,
        }
    }

    /// Source file and definition line
    pub fn with_source(mut self, file: impl Into<String>, line: u32) -> Self {
        self.source_file = file.into();
        self.first_line = line;
        self
    }

    pub fn with_convention(mut self, convention: CallConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Override the receiver binding name (`self` / `cls` by default)
    pub fn with_receiver_name(mut self, name: impl Into<String>) -> Self {
        self.receiver_name = Some(name.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: None,
        });
        self
    }

    pub fn with_default(mut self, name: impl Into<String>, default: Value) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: Some(default),
        });
        self
    }

    /// Calling the routine creates a generator instead of running it
    pub fn generator(mut self) -> Self {
        self.is_generator = true;
        self
    }

    /// The engine will not report exit kinds for this routine
    pub fn uninstrumented(mut self) -> Self {
        self.instrumented = false;
        self
    }

    /// Start emitting the body
    pub fn body(self) -> FunctionBuilder {
        let mut locals = Vec::with_capacity(self.params.len() + 1);
        if self.convention.has_receiver() {
            let receiver = self
                .receiver_name
                .clone()
                .or_else(|| self.convention.default_receiver_name().map(str::to_string))
                .unwrap_or_default();
            locals.push(receiver);
        }
        locals.extend(self.params.iter().map(|p| p.name.clone()));

        let line = self.first_line;
        FunctionBuilder {
            signature: self,
            locals,
            chunk: Chunk::new(),
            line,
        }
    }
}

/// Second builder stage: bytecode emission
///
/// Every emitted instruction is attributed to the line set by
/// [`FunctionBuilder::line`]. Local names resolve to slots, declaring new
/// body locals on first use.
#[derive(Debug)]
pub struct FunctionBuilder {
    signature: Signature,
    locals: Vec<String>,
    chunk: Chunk,
    line: u32,
}

impl FunctionBuilder {
    /// Attribute following instructions to `line`
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    /// Emit an operand-less instruction
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.chunk.emit(opcode, self.line);
        self
    }

    /// Push a constant
    pub fn constant(&mut self, value: Value) -> &mut Self {
        let index = self.chunk.add_constant(value);
        self.chunk.emit(Opcode::Constant, self.line);
        self.chunk.emit_u16(index);
        self
    }

    pub fn get_local(&mut self, name: &str) -> &mut Self {
        let slot = self.slot(name);
        self.chunk.emit(Opcode::GetLocal, self.line);
        self.chunk.emit_u16(slot);
        self
    }

    pub fn set_local(&mut self, name: &str) -> &mut Self {
        let slot = self.slot(name);
        self.chunk.emit(Opcode::SetLocal, self.line);
        self.chunk.emit_u16(slot);
        self
    }

    pub fn get_global(&mut self, name: &str) -> &mut Self {
        self.named(Opcode::GetGlobal, name)
    }

    pub fn set_global(&mut self, name: &str) -> &mut Self {
        self.named(Opcode::SetGlobal, name)
    }

    pub fn get_attr(&mut self, name: &str) -> &mut Self {
        self.named(Opcode::GetAttr, name)
    }

    pub fn set_attr(&mut self, name: &str) -> &mut Self {
        self.named(Opcode::SetAttr, name)
    }

    pub fn call(&mut self, argc: u8) -> &mut Self {
        self.chunk.emit(Opcode::Call, self.line);
        self.chunk.emit_u8(argc);
        self
    }

    pub fn invoke(&mut self, method: &str, argc: u8) -> &mut Self {
        let index = self.chunk.add_constant(Value::from(method));
        self.chunk.emit(Opcode::Invoke, self.line);
        self.chunk.emit_u16(index);
        self.chunk.emit_u8(argc);
        self
    }

    /// Emit a forward jump; patch it with [`FunctionBuilder::patch_jump`]
    pub fn jump(&mut self, opcode: Opcode) -> usize {
        self.chunk.emit_jump(opcode, self.line)
    }

    pub fn patch_jump(&mut self, operand: usize) -> &mut Self {
        self.chunk.patch_jump(operand);
        self
    }

    /// Emit a backward jump to `loop_start`
    pub fn loop_to(&mut self, loop_start: usize) -> &mut Self {
        self.chunk.emit_loop(loop_start, self.line);
        self
    }

    /// Offset of the next instruction
    pub fn offset(&self) -> usize {
        self.chunk.current_offset()
    }

    /// Append the implicit `None; Return` epilogue and build the routine
    pub fn finish(&mut self) -> Rc<FunctionDef> {
        self.chunk.emit(Opcode::PushNone, self.line);
        self.chunk.emit(Opcode::Return, self.line);

        let signature = &self.signature;
        Rc::new(FunctionDef {
            name: signature.name.clone(),
            source_file: signature.source_file.clone(),
            first_line: signature.first_line,
            params: signature.params.clone(),
            locals: std::mem::take(&mut self.locals),
            convention: signature.convention,
            is_generator: signature.is_generator,
            instrumented: signature.instrumented,
            chunk: std::mem::take(&mut self.chunk),
        })
    }

    fn slot(&mut self, name: &str) -> u16 {
        let index = match self.locals.iter().position(|local| local == name) {
            Some(index) => index,
            None => {
                self.locals.push(name.to_string());
                self.locals.len() - 1
            }
        };
        assert!(
            index <= u16::MAX as usize,
            "{} exceeds {} local slots",
            self.signature.name,
            u16::MAX as usize + 1
        );
        index as u16
    }

    fn named(&mut self, opcode: Opcode, name: &str) -> &mut Self {
        let index = self.chunk.add_constant(Value::from(name));
        self.chunk.emit(opcode, self.line);
        self.chunk.emit_u16(index);
        self
    }
}

/// Class object: a name and its method table
#[derive(Debug)]
pub struct ClassDef {
    pub name: String,
    pub methods: HashMap<String, Rc<FunctionDef>>,
}

impl ClassDef {
    pub fn method(&self, name: &str) -> Option<&Rc<FunctionDef>> {
        self.methods.get(name)
    }
}

/// Builder for [`ClassDef`]
#[derive(Debug)]
pub struct ClassBuilder {
    name: String,
    methods: HashMap<String, Rc<FunctionDef>>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Register a method under its routine name
    pub fn with_method(mut self, method: Rc<FunctionDef>) -> Self {
        self.methods.insert(method.name.clone(), method);
        self
    }

    pub fn build(self) -> Rc<ClassDef> {
        Rc::new(ClassDef {
            name: self.name,
            methods: self.methods,
        })
    }
}
