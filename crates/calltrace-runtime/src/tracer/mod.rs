//! Per-call tracer
//!
//! [`Tracer`] is a [`TraceHook`] that turns the VM's event stream into one
//! JSON record per invocation:
//!
//! - call: capture arguments, location and receiver class into a pending
//!   record keyed by frame identity
//! - exception: overwrite the pending record's exception
//! - return: classify the exit, finalize, emit, forget the frame
//!
//! Records are emitted in finalization order, which follows stack unwinding
//! rather than call order.
//!
//! ```
//! use calltrace_runtime::function::Signature;
//! use calltrace_runtime::tracer::Tracer;
//! use calltrace_runtime::{Value, VM};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let solofunc = Signature::new("solofunc")
//!     .with_source("demo.src", 3)
//!     .with_default("arg", Value::from("default"))
//!     .body()
//!     .finish();
//!
//! let tracer = Rc::new(RefCell::new(Tracer::new(Vec::new())));
//! let mut vm = VM::new();
//! vm.set_trace_hook(tracer.clone());
//! vm.call(&Value::Function(solofunc), &[]).unwrap();
//!
//! let out = String::from_utf8(tracer.borrow().writer().clone()).unwrap();
//! assert_eq!(
//!     out,
//!     "{\"name\":\"solofunc\",\"args\":{},\"class\":null,\"info\":\"demo.src 3 solofunc\",\"exception\":null,\"returns\":\"None\"}\n"
//! );
//! ```

pub mod classifier;
pub mod emitter;
pub mod record;
pub mod store;

pub use classifier::{classify_exit, resolve_outcome, ExitOutcome};
pub use emitter::{Emitter, TraceLine, UNKNOWN_EXCEPTION};
pub use record::{CallRecord, ExceptionDetail, RecordStatus};
pub use store::FrameStore;

use crate::value::Value;
use crate::vm::{EventMask, ExitKind, FrameView, TraceEvent, TraceHook, TraceResult};
use calltrace_config::{ClassifierPolicy, Config, OutputTarget, TraceMode};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use tracing::{debug, warn};

/// Event hook that emits one record per call
#[derive(Debug)]
pub struct Tracer<W: Write> {
    store: FrameStore,
    emitter: Emitter<W>,
    mode: TraceMode,
    policy: ClassifierPolicy,
}

impl<W: Write> Tracer<W> {
    /// Tracer writing to `writer` in trace mode with the cooperative
    /// classifier
    pub fn new(writer: W) -> Self {
        Self {
            store: FrameStore::new(),
            emitter: Emitter::new(writer),
            mode: TraceMode::default(),
            policy: ClassifierPolicy::default(),
        }
    }

    pub fn with_mode(mut self, mode: TraceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_classifier(mut self, policy: ClassifierPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_flush(mut self, flush: bool) -> Self {
        self.emitter = self.emitter.with_flush(flush);
        self
    }

    pub fn mode(&self) -> TraceMode {
        self.mode
    }

    /// Records still waiting for their return event
    pub fn pending(&self) -> usize {
        self.store.len()
    }

    /// Records written so far
    pub fn emitted(&self) -> u64 {
        self.emitter.emitted()
    }

    pub fn writer(&self) -> &W {
        self.emitter.writer()
    }

    pub fn into_writer(self) -> W {
        self.emitter.into_writer()
    }

    fn on_call(&mut self, frame: &FrameView<'_>) {
        let record = CallRecord::capture(frame);
        if self.store.insert(frame.id(), record).is_some() {
            debug!(frame = %frame.id(), "replaced stale record");
        }
    }

    fn on_exception(&mut self, frame: &FrameView<'_>, exception: &Value) {
        match self.store.get_mut(frame.id()) {
            Some(record) => record.record_exception(exception),
            None => debug!(frame = %frame.id(), "exception event without a record"),
        }
    }

    fn on_return(
        &mut self,
        frame: &FrameView<'_>,
        value: &Value,
        exit: Option<ExitKind>,
    ) -> TraceResult<()> {
        let Some(record) = self.store.get_mut(frame.id()) else {
            debug!(frame = %frame.id(), "return event without a record");
            return Ok(());
        };

        let outcome = resolve_outcome(frame, exit, self.policy);
        record.finalize(outcome, value);
        debug!(frame = %frame.id(), function = frame.name(), ?outcome, "finalized record");

        // The frame is forgotten even when the sink fails
        let result = self.emitter.emit(record);
        self.store.remove(frame.id());
        if let Err(error) = &result {
            warn!(%error, "failed to emit trace record");
        }
        result
    }
}

impl Tracer<Box<dyn Write>> {
    /// Tracer for a resolved configuration, opening its output sink
    pub fn from_config(config: &Config) -> io::Result<Self> {
        let writer: Box<dyn Write> = match config.output() {
            OutputTarget::Stdout => Box::new(io::stdout()),
            OutputTarget::Stderr => Box::new(io::stderr()),
            OutputTarget::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                Box::new(BufWriter::new(File::create(path)?))
            }
        };

        Ok(Tracer::new(writer)
            .with_mode(config.mode())
            .with_classifier(config.classifier())
            .with_flush(config.flush()))
    }
}

impl<W: Write> TraceHook for Tracer<W> {
    fn interests(&self) -> EventMask {
        match self.mode {
            TraceMode::Trace => EventMask::ALL,
            TraceMode::Profile => EventMask::CALL | EventMask::RETURN,
        }
    }

    fn on_event(&mut self, frame: &FrameView<'_>, event: TraceEvent<'_>) -> TraceResult<()> {
        match event {
            TraceEvent::Call => self.on_call(frame),
            TraceEvent::Exception(exception) => self.on_exception(frame, exception),
            TraceEvent::Return { value, exit } => return self.on_return(frame, value, exit),
            TraceEvent::Line(_) | TraceEvent::Instruction { .. } => {}
        }
        Ok(())
    }
}
