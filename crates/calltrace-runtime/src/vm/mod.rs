//! Stack-based virtual machine
//!
//! Executes routine bytecode with a value stack and call frames.
//! - Locals live in frames, globals in a HashMap
//! - Exceptions raised by executing code unwind frame by frame to the
//!   nearest installed handler
//! - A single optional trace hook observes call, line, instruction,
//!   exception and return events

pub mod dispatch;
mod frame;
mod hook;

pub use frame::{CallFrame, FrameId};
pub use hook::{
    EventKind, EventMask, ExitKind, FrameView, TraceError, TraceEvent, TraceHook, TraceResult,
};

use crate::bytecode::Opcode;
use crate::function::{CallConvention, ClassDef, FunctionDef, INIT_METHOD};
use crate::value::{exceptions, Generator, GeneratorState, Instance, RuntimeError, Value};
pub(crate) use frame::FrameKind;
use frame::Handler;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

/// Why the dispatch loop stopped executing the current instruction
#[derive(Debug)]
enum Interrupt {
    /// The traced program raised an exception
    Raise(Value),
    /// The engine itself failed
    Fatal(RuntimeError),
}

impl From<RuntimeError> for Interrupt {
    fn from(error: RuntimeError) -> Self {
        Interrupt::Fatal(error)
    }
}

type Flow<T> = Result<T, Interrupt>;

/// Shared handle to an installed trace hook
pub type SharedHook = Rc<RefCell<dyn TraceHook>>;

/// Virtual machine state
pub struct VM {
    /// Value stack
    stack: Vec<Value>,
    /// Call frames, innermost last
    frames: Vec<CallFrame>,
    /// Global variables
    globals: HashMap<String, Value>,
    /// Installed trace hook
    hook: Option<SharedHook>,
    /// Event kinds the installed hook subscribed to
    interests: EventMask,
    /// Next frame identity to hand out
    next_frame_id: u64,
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl VM {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(256),
            frames: Vec::new(),
            globals: HashMap::new(),
            hook: None,
            interests: EventMask::NONE,
            next_frame_id: 1,
        }
    }

    /// Set a global variable
    pub fn define_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Number of active frames
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Install the trace hook, replacing any previous one
    ///
    /// The hook's interests are read once here. The caller keeps its own
    /// handle to inspect the hook between runs.
    pub fn set_trace_hook(&mut self, hook: SharedHook) {
        self.interests = hook.borrow().interests();
        self.hook = Some(hook);
    }

    /// Remove the installed hook, returning it
    pub fn clear_trace_hook(&mut self) -> Option<SharedHook> {
        self.interests = EventMask::NONE;
        self.hook.take()
    }

    pub fn trace_hook(&self) -> Option<&SharedHook> {
        self.hook.as_ref()
    }

    /// Call a function or class with arguments and run it to completion
    pub fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let callee = callee.clone();
        let args = args.to_vec();
        self.run_entry(move |vm| vm.call_value(callee, args))
    }

    /// Call a method on an instance or class
    pub fn invoke(
        &mut self,
        receiver: &Value,
        method: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let receiver = receiver.clone();
        let args = args.to_vec();
        self.run_entry(move |vm| vm.invoke_value(receiver, method, args))
    }

    /// Resume a generator until it yields or finishes
    pub fn resume(&mut self, generator: &Value) -> Result<Value, RuntimeError> {
        let generator = generator.clone();
        self.run_entry(move |vm| vm.next_value(generator))
    }

    /// Run an entry point to completion, restoring VM state on failure
    fn run_entry<F>(&mut self, enter: F) -> Result<Value, RuntimeError>
    where
        F: FnOnce(&mut Self) -> Flow<Option<Value>>,
    {
        let base_depth = self.frames.len();
        let stack_mark = self.stack.len();

        let result = match enter(self) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => self.execute(base_depth),
            Err(Interrupt::Raise(exception)) => self
                .unwind(exception, base_depth)
                .and_then(|()| self.execute(base_depth)),
            Err(Interrupt::Fatal(error)) => Err(error),
        };

        if result.is_err() {
            self.abandon(base_depth, stack_mark);
        }
        result
    }

    /// Drop frames above `base_depth` after a failed run
    fn abandon(&mut self, base_depth: usize, stack_mark: usize) {
        for frame in self.frames.drain(base_depth..) {
            if let Some(generator) = frame.generator {
                generator.exhaust();
            }
        }
        self.stack.truncate(stack_mark);
    }

    /// Main execution loop
    ///
    /// Runs until the frame at `base_depth` returns or yields.
    fn execute(&mut self, base_depth: usize) -> Result<Value, RuntimeError> {
        loop {
            match self.step(base_depth) {
                Ok(None) => {}
                Ok(Some(value)) => return Ok(value),
                Err(Interrupt::Raise(exception)) => self.unwind(exception, base_depth)?,
                Err(Interrupt::Fatal(error)) => return Err(error),
            }
        }
    }

    /// Execute one instruction of the innermost frame
    ///
    /// Returns the result once the frame at `base_depth` is left.
    fn step(&mut self, base_depth: usize) -> Flow<Option<Value>> {
        let (offset, byte) = {
            let frame = self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)?;
            let offset = frame.ip;
            let byte = *frame.function.chunk.code.get(offset).ok_or_else(|| {
                RuntimeError::TruncatedInstruction {
                    offset,
                    function: frame.function.name.clone(),
                }
            })?;
            frame.last_ip = offset;
            frame.ip += 1;
            (offset, byte)
        };

        let opcode = dispatch::decode_opcode(byte).ok_or_else(|| RuntimeError::UnknownOpcode {
            byte,
            offset,
            function: self.function_name(),
        })?;

        self.track_line(offset)?;
        if self.interests.contains(EventKind::Instruction) {
            self.fire(TraceEvent::Instruction { offset, opcode })?;
        }

        match opcode {
            // ===== Constants =====
            Opcode::Constant => {
                let index = self.read_u16()? as usize;
                let value = self.constant(index)?;
                self.push(value);
            }
            Opcode::PushNone => self.push(Value::None),
            Opcode::True => self.push(Value::Bool(true)),
            Opcode::False => self.push(Value::Bool(false)),

            // ===== Variables =====
            Opcode::GetLocal => {
                let slot = self.read_u16()? as usize;
                let frame = self.current_frame()?;
                let value = match frame.locals.get(slot) {
                    Some(Some(value)) => value.clone(),
                    Some(None) => {
                        return Err(Interrupt::Raise(exceptions::unbound_local(
                            frame.local_name(slot),
                        )))
                    }
                    None => return Err(self.invalid_local(slot).into()),
                };
                self.push(value);
            }
            Opcode::SetLocal => {
                let slot = self.read_u16()? as usize;
                let value = self.pop()?;
                let frame = self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)?;
                if slot >= frame.locals.len() {
                    return Err(self.invalid_local(slot).into());
                }
                frame.locals[slot] = Some(value);
            }
            Opcode::GetGlobal => {
                let name = self.read_name()?;
                let value = self.globals.get(name.as_ref()).cloned();
                match value {
                    Some(value) => self.push(value),
                    None => return Err(Interrupt::Raise(exceptions::name_error(&name))),
                }
            }
            Opcode::SetGlobal => {
                let name = self.read_name()?;
                let value = self.pop()?;
                self.globals.insert(name.to_string(), value);
            }

            // ===== Arithmetic =====
            Opcode::Add => {
                let b = self.pop()?;
                let a = self.pop()?;
                let result = match (&a, &b) {
                    (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
                    (Value::Str(x), Value::Str(y)) => Value::from(format!("{}{}", x, y)),
                    _ => return Err(Interrupt::Raise(unsupported_operands("+", &a, &b))),
                };
                self.push(result);
            }
            Opcode::Sub => self.binary_number("-", |x, y| Ok(x - y))?,
            Opcode::Mul => self.binary_number("*", |x, y| Ok(x * y))?,
            Opcode::Div => self.binary_number("/", |x, y| {
                if y == 0.0 {
                    Err(exceptions::zero_division("division by zero"))
                } else {
                    Ok(x / y)
                }
            })?,
            Opcode::Mod => self.binary_number("%", |x, y| {
                if y == 0.0 {
                    Err(exceptions::zero_division("modulo by zero"))
                } else {
                    Ok(x % y)
                }
            })?,
            Opcode::Negate => match self.pop()? {
                Value::Number(n) => self.push(Value::Number(-n)),
                other => {
                    return Err(Interrupt::Raise(exceptions::type_error(format!(
                        "bad operand type for unary -: '{}'",
                        other.type_name()
                    ))))
                }
            },

            // ===== Comparison =====
            Opcode::Equal => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a == b));
            }
            Opcode::NotEqual => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a != b));
            }
            Opcode::Less => self.compare("<", |o| o.is_lt())?,
            Opcode::LessEqual => self.compare("<=", |o| o.is_le())?,
            Opcode::Greater => self.compare(">", |o| o.is_gt())?,
            Opcode::GreaterEqual => self.compare(">=", |o| o.is_ge())?,

            // ===== Logical =====
            Opcode::Not => {
                let value = self.pop()?;
                self.push(Value::Bool(!value.is_truthy()));
            }

            // ===== Control flow =====
            Opcode::Jump => {
                let offset = self.read_i16()?;
                self.jump_relative(offset)?;
            }
            Opcode::JumpIfFalse => {
                let offset = self.read_i16()?;
                let condition = self.pop()?;
                if !condition.is_truthy() {
                    self.jump_relative(offset)?;
                }
            }
            Opcode::Loop => {
                let distance = self.read_u16()? as usize;
                let frame = self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)?;
                frame.ip = frame.ip.saturating_sub(distance);
            }

            // ===== Routines =====
            Opcode::Call => {
                let argc = self.read_u8()? as usize;
                let args = self.pop_args(argc)?;
                let callee = self.pop()?;
                if let Some(value) = self.call_value(callee, args)? {
                    self.push(value);
                }
            }
            Opcode::Invoke => {
                let name = self.read_name()?;
                let argc = self.read_u8()? as usize;
                let args = self.pop_args(argc)?;
                let receiver = self.pop()?;
                if let Some(value) = self.invoke_value(receiver, &name, args)? {
                    self.push(value);
                }
            }
            Opcode::Return => {
                let value = self.pop()?;
                let result = self.return_from_frame(value)?;
                if self.frames.len() <= base_depth {
                    return Ok(Some(result));
                }
                self.push(result);
            }
            Opcode::Yield => {
                let value = self.pop()?;
                self.yield_from_frame(&value)?;
                if self.frames.len() <= base_depth {
                    return Ok(Some(value));
                }
                self.push(value);
            }
            Opcode::Next => {
                let generator = self.pop()?;
                if let Some(value) = self.next_value(generator)? {
                    self.push(value);
                }
            }

            // ===== Objects =====
            Opcode::GetAttr => {
                let name = self.read_name()?;
                let object = self.pop()?;
                let value = get_attribute(&object, &name)?;
                self.push(value);
            }
            Opcode::SetAttr => {
                let name = self.read_name()?;
                let value = self.pop()?;
                let object = self.pop()?;
                match &object {
                    Value::Instance(instance) => {
                        instance.fields.borrow_mut().insert(name.to_string(), value);
                    }
                    other => {
                        return Err(Interrupt::Raise(exceptions::attribute_error(
                            other.type_name(),
                            &name,
                        )))
                    }
                }
            }

            // ===== Stack manipulation =====
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Dup => {
                let value = self.peek()?.clone();
                self.push(value);
            }

            // ===== Exceptions =====
            Opcode::Raise => {
                let value = self.pop()?;
                let exception = match value {
                    Value::Exception(exception) => Value::Exception(exception),
                    Value::Str(message) => Value::exception(exceptions::EXCEPTION, &*message),
                    other => exceptions::type_error(format!(
                        "exceptions must be exception values, not '{}'",
                        other.type_name()
                    )),
                };
                return Err(Interrupt::Raise(exception));
            }
            Opcode::PushHandler => {
                let offset = self.read_i16()?;
                let depth = self.stack.len();
                let frame = self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)?;
                let target = (frame.ip as isize + offset as isize).max(0) as usize;
                frame.handlers.push(Handler {
                    target,
                    stack_depth: depth.saturating_sub(frame.stack_base),
                });
            }
            Opcode::PopHandler => {
                let frame = self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)?;
                frame.handlers.pop();
            }
        }

        Ok(None)
    }

    // ===== Calls =====

    /// Call a callee value
    ///
    /// `Some` carries an immediate result; `None` means a frame was pushed
    /// and will deliver its result when it returns.
    fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Flow<Option<Value>> {
        match callee {
            Value::Function(function) => self.call_function(function, None, args, FrameKind::Plain),
            Value::Class(class) => self.construct(class, args),
            other => Err(Interrupt::Raise(exceptions::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            )))),
        }
    }

    /// Create an instance and run its initializer
    fn construct(&mut self, class: Rc<ClassDef>, args: Vec<Value>) -> Flow<Option<Value>> {
        let instance = Value::Instance(Rc::new(Instance::new(class.clone())));
        match class.method(INIT_METHOD) {
            Some(init) => {
                let init = init.clone();
                let kind = FrameKind::Constructor(instance.clone());
                self.call_function(init, Some(instance), args, kind)
            }
            None if args.is_empty() => Ok(Some(instance)),
            None => Err(Interrupt::Raise(exceptions::type_error(format!(
                "{}() takes no arguments",
                class.name
            )))),
        }
    }

    /// Resolve a method on a receiver and call it
    fn invoke_value(&mut self, receiver: Value, name: &str, args: Vec<Value>) -> Flow<Option<Value>> {
        let (class, is_instance) = match &receiver {
            Value::Instance(instance) => {
                let field = instance.fields.borrow().get(name).cloned();
                if let Some(field) = field {
                    return self.call_value(field, args);
                }
                (instance.class.clone(), true)
            }
            Value::Class(class) => (class.clone(), false),
            other => {
                return Err(Interrupt::Raise(exceptions::attribute_error(
                    other.type_name(),
                    name,
                )))
            }
        };

        let method = match class.method(name) {
            Some(method) => method.clone(),
            None => {
                return Err(Interrupt::Raise(exceptions::attribute_error(
                    receiver.type_name(),
                    name,
                )))
            }
        };

        // Instance methods looked up on the class are unbound: the first
        // argument becomes the receiver.
        let bound = match method.convention {
            CallConvention::Free => None,
            CallConvention::Instance if is_instance => Some(receiver),
            CallConvention::Instance => None,
            CallConvention::Type => Some(Value::Class(class)),
        };
        self.call_function(method, bound, args, FrameKind::Plain)
    }

    /// Bind arguments into a new frame and enter it
    ///
    /// Generator routines get a suspended frame instead.
    fn call_function(
        &mut self,
        function: Rc<FunctionDef>,
        receiver: Option<Value>,
        mut args: Vec<Value>,
        kind: FrameKind,
    ) -> Flow<Option<Value>> {
        let receiver = if function.convention.has_receiver() {
            match receiver {
                Some(receiver) => Some(receiver),
                None if !args.is_empty() => Some(args.remove(0)),
                None => {
                    return Err(Interrupt::Raise(exceptions::type_error(format!(
                        "{}() missing receiver",
                        function.name
                    ))))
                }
            }
        } else {
            None
        };

        if args.len() > function.arity() {
            return Err(Interrupt::Raise(exceptions::type_error(format!(
                "{}() takes {} positional arguments but {} were given",
                function.name,
                function.arity(),
                args.len()
            ))));
        }
        if let Some(missing) = function.params[args.len()..]
            .iter()
            .find(|param| param.default.is_none())
        {
            return Err(Interrupt::Raise(exceptions::type_error(format!(
                "{}() missing required argument: '{}'",
                function.name, missing.name
            ))));
        }

        // Receiver in slot 0 when present, parameters after it
        let mut locals = vec![None; function.locals.len()];
        let bindings = receiver.into_iter().chain(args);
        for (slot, value) in bindings.enumerate() {
            match locals.get_mut(slot) {
                Some(local) => *local = Some(value),
                None => {
                    return Err(RuntimeError::InvalidLocal {
                        index: slot,
                        function: function.name.clone(),
                    }
                    .into())
                }
            }
        }

        let id = self.allocate_frame_id();
        let mut frame = CallFrame::new(id, function.clone(), locals, kind);

        if function.is_generator {
            let generator = Generator::new(function, frame);
            return Ok(Some(Value::Generator(Rc::new(generator))));
        }

        // Callee and arguments are already popped; the caller's pending
        // operands stay below this base.
        frame.stack_base = self.stack.len();
        self.activate(frame)?;
        Ok(None)
    }

    /// Push a frame, fire its call event and bind defaults on first entry
    ///
    /// Defaults are bound after the call event, so the hook sees only the
    /// arguments the caller supplied.
    fn activate(&mut self, mut frame: CallFrame) -> Result<(), RuntimeError> {
        let first_entry = !frame.started;
        frame.started = true;
        trace!(frame = %frame.id, function = %frame.function.name, "enter");
        self.frames.push(frame);
        self.fire(TraceEvent::Call)?;

        if first_entry {
            if let Some(frame) = self.frames.last_mut() {
                let function = frame.function.clone();
                let first = function.first_param_slot();
                for (i, param) in function.params.iter().enumerate() {
                    if let (Some(slot), Some(default)) =
                        (frame.locals.get_mut(first + i), param.default.as_ref())
                    {
                        if slot.is_none() {
                            *slot = Some(default.clone());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Leave the innermost frame through `Return`
    fn return_from_frame(&mut self, value: Value) -> Flow<Value> {
        let exit = self.reported_exit(ExitKind::Returned);
        self.fire(TraceEvent::Return { value: &value, exit })?;

        let frame = self.frames.pop().ok_or(RuntimeError::NoActiveFrame)?;
        trace!(frame = %frame.id, function = %frame.function.name, "return");
        self.stack.truncate(frame.stack_base);
        if let Some(generator) = &frame.generator {
            generator.exhaust();
        }

        Ok(match frame.kind {
            FrameKind::Constructor(instance) => instance,
            FrameKind::Plain => value,
        })
    }

    /// Suspend the innermost generator frame at `Yield`
    fn yield_from_frame(&mut self, value: &Value) -> Flow<()> {
        let is_generator = self
            .frames
            .last()
            .map(|frame| frame.generator.is_some())
            .unwrap_or(false);
        if !is_generator {
            return Err(RuntimeError::YieldOutsideGenerator {
                function: self.function_name(),
            }
            .into());
        }

        let exit = self.reported_exit(ExitKind::Yielded);
        self.fire(TraceEvent::Return { value, exit })?;

        let mut frame = self.frames.pop().ok_or(RuntimeError::NoActiveFrame)?;
        trace!(frame = %frame.id, function = %frame.function.name, "yield");
        frame.saved_stack = self.stack.split_off(frame.stack_base.min(self.stack.len()));
        if let Some(generator) = frame.generator.take() {
            generator.suspend(frame);
        }
        Ok(())
    }

    /// Resume a generator
    fn next_value(&mut self, target: Value) -> Flow<Option<Value>> {
        let generator = match target {
            Value::Generator(generator) => generator,
            other => {
                return Err(Interrupt::Raise(exceptions::type_error(format!(
                    "'{}' object is not an iterator",
                    other.type_name()
                ))))
            }
        };

        match generator.take_state(GeneratorState::Running) {
            GeneratorState::Suspended(frame) => {
                let mut frame = *frame;
                let resumed = frame.started;
                frame.generator = Some(generator);
                frame.stack_base = self.stack.len();
                self.stack.append(&mut frame.saved_stack);
                if resumed {
                    // Value of the `Yield` expression inside the generator
                    self.stack.push(Value::None);
                }
                self.activate(frame)?;
                Ok(None)
            }
            GeneratorState::Running => Err(Interrupt::Raise(exceptions::value_error(
                "generator already executing",
            ))),
            GeneratorState::Exhausted => {
                generator.exhaust();
                Err(Interrupt::Raise(exceptions::stop_iteration()))
            }
        }
    }

    // ===== Exceptions =====

    /// Propagate an exception from the innermost frame
    ///
    /// Each frame sees an exception event. The first frame with a handler
    /// resumes at it; frames without one see a return event with a `None`
    /// value and are popped.
    fn unwind(&mut self, exception: Value, base_depth: usize) -> Result<(), RuntimeError> {
        loop {
            if self.frames.len() <= base_depth {
                return Err(RuntimeError::Uncaught(exception));
            }

            self.fire(TraceEvent::Exception(&exception))?;

            let Some(frame) = self.frames.last_mut() else {
                return Err(RuntimeError::Uncaught(exception));
            };
            if let Some(handler) = frame.handlers.pop() {
                frame.ip = handler.target;
                let depth = frame.stack_base + handler.stack_depth;
                self.stack.truncate(depth);
                self.stack.push(exception);
                return Ok(());
            }

            let exit = self.reported_exit(ExitKind::Unwound);
            self.fire(TraceEvent::Return {
                value: &Value::None,
                exit,
            })?;

            if let Some(frame) = self.frames.pop() {
                trace!(frame = %frame.id, function = %frame.function.name, exception = %exception, "unwind");
                self.stack.truncate(frame.stack_base);
                if let Some(generator) = frame.generator {
                    generator.exhaust();
                }
            }
        }
    }

    // ===== Tracing =====

    /// Deliver an event for the innermost frame to the installed hook
    fn fire(&self, event: TraceEvent<'_>) -> Result<(), RuntimeError> {
        let Some(hook) = &self.hook else {
            return Ok(());
        };
        if !self.interests.contains(event.kind()) {
            return Ok(());
        }
        let Some(frame) = self.frames.last() else {
            return Ok(());
        };

        let mut hook = hook.try_borrow_mut().map_err(|_| RuntimeError::HookBusy)?;
        hook.on_event(&FrameView::new(frame), event)?;
        Ok(())
    }

    /// Update the current line, firing a line event when it changes
    fn track_line(&mut self, offset: usize) -> Result<(), RuntimeError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let line = frame.function.chunk.line_at(offset);
        if line.is_none() || line == frame.line {
            return Ok(());
        }
        frame.line = line;

        match line {
            Some(line) if self.interests.contains(EventKind::Line) => {
                self.fire(TraceEvent::Line(line))
            }
            _ => Ok(()),
        }
    }

    /// Exit kind to report for the innermost frame
    fn reported_exit(&self, kind: ExitKind) -> Option<ExitKind> {
        self.frames
            .last()
            .filter(|frame| frame.function.instrumented)
            .map(|_| kind)
    }

    fn allocate_frame_id(&mut self) -> FrameId {
        let id = FrameId::new(self.next_frame_id);
        self.next_frame_id += 1;
        id
    }

    // ===== Stack and operand helpers =====

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        let base = self.frames.last().map(|f| f.stack_base).unwrap_or(0);
        if self.stack.len() > base {
            if let Some(value) = self.stack.pop() {
                return Ok(value);
            }
        }
        Err(RuntimeError::StackUnderflow {
            function: self.function_name(),
        })
    }

    fn peek(&self) -> Result<&Value, RuntimeError> {
        let base = self.frames.last().map(|f| f.stack_base).unwrap_or(0);
        match self.stack.last() {
            Some(value) if self.stack.len() > base => Ok(value),
            _ => Err(RuntimeError::StackUnderflow {
                function: self.function_name(),
            }),
        }
    }

    fn pop_args(&mut self, argc: usize) -> Result<Vec<Value>, RuntimeError> {
        let base = self.frames.last().map(|f| f.stack_base).unwrap_or(0);
        // One extra slot for the callee or receiver below the arguments
        if self.stack.len() < base + argc + 1 {
            return Err(RuntimeError::StackUnderflow {
                function: self.function_name(),
            });
        }
        Ok(self.stack.split_off(self.stack.len() - argc))
    }

    fn current_frame(&self) -> Result<&CallFrame, RuntimeError> {
        self.frames.last().ok_or(RuntimeError::NoActiveFrame)
    }

    fn function_name(&self) -> String {
        self.frames
            .last()
            .map(|f| f.function.name.clone())
            .unwrap_or_else(|| "<none>".to_string())
    }

    fn invalid_local(&self, index: usize) -> RuntimeError {
        RuntimeError::InvalidLocal {
            index,
            function: self.function_name(),
        }
    }

    fn read_u8(&mut self) -> Result<u8, RuntimeError> {
        let frame = self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)?;
        let byte = *frame.function.chunk.code.get(frame.ip).ok_or_else(|| {
            RuntimeError::TruncatedInstruction {
                offset: frame.ip,
                function: frame.function.name.clone(),
            }
        })?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, RuntimeError> {
        let frame = self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)?;
        let value = frame.function.chunk.read_u16(frame.ip).ok_or_else(|| {
            RuntimeError::TruncatedInstruction {
                offset: frame.ip,
                function: frame.function.name.clone(),
            }
        })?;
        frame.ip += 2;
        Ok(value)
    }

    fn read_i16(&mut self) -> Result<i16, RuntimeError> {
        Ok(self.read_u16()? as i16)
    }

    fn constant(&self, index: usize) -> Result<Value, RuntimeError> {
        let frame = self.current_frame()?;
        frame
            .function
            .chunk
            .constants
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::InvalidConstant {
                index,
                function: frame.function.name.clone(),
            })
    }

    /// Read a u16 operand naming a string constant
    fn read_name(&mut self) -> Result<Rc<str>, RuntimeError> {
        let index = self.read_u16()? as usize;
        match self.constant(index)? {
            Value::Str(name) => Ok(name),
            _ => Err(RuntimeError::InvalidConstant {
                index,
                function: self.function_name(),
            }),
        }
    }

    fn jump_relative(&mut self, offset: i16) -> Result<(), RuntimeError> {
        let frame = self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)?;
        frame.ip = (frame.ip as isize + offset as isize).max(0) as usize;
        Ok(())
    }

    fn binary_number<F>(&mut self, symbol: &str, op: F) -> Flow<()>
    where
        F: FnOnce(f64, f64) -> Result<f64, Value>,
    {
        let b = self.pop()?;
        let a = self.pop()?;
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => {
                let result = op(*x, *y).map_err(Interrupt::Raise)?;
                self.push(Value::Number(result));
                Ok(())
            }
            _ => Err(Interrupt::Raise(unsupported_operands(symbol, &a, &b))),
        }
    }

    fn compare<F>(&mut self, symbol: &str, test: F) -> Flow<()>
    where
        F: FnOnce(std::cmp::Ordering) -> bool,
    {
        let b = self.pop()?;
        let a = self.pop()?;
        let ordering = match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
            (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
            _ => {
                return Err(Interrupt::Raise(exceptions::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    symbol,
                    a.type_name(),
                    b.type_name()
                ))))
            }
        };
        // NaN compares false
        self.push(Value::Bool(ordering.map(test).unwrap_or(false)));
        Ok(())
    }
}

fn unsupported_operands(symbol: &str, a: &Value, b: &Value) -> Value {
    exceptions::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol,
        a.type_name(),
        b.type_name()
    ))
}

/// Attribute lookup: instance fields, then methods, then exception parts
fn get_attribute(object: &Value, name: &str) -> Flow<Value> {
    let found = match object {
        Value::Instance(instance) => {
            let field = instance.fields.borrow().get(name).cloned();
            field.or_else(|| instance.class.method(name).cloned().map(Value::Function))
        }
        Value::Class(class) => class.method(name).cloned().map(Value::Function),
        Value::Exception(exception) => match name {
            "kind" => Some(Value::from(exception.kind.as_str())),
            "message" => Some(Value::from(exception.message.as_str())),
            _ => None,
        },
        _ => None,
    };
    found.ok_or_else(|| Interrupt::Raise(exceptions::attribute_error(object.type_name(), name)))
}
