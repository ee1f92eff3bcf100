//! Event delivery from the VM to an installed hook

mod common;

use calltrace_runtime::vm::{EventMask, FrameView, TraceEvent, TraceHook, TraceResult};
use calltrace_runtime::{FrameId, Value, VM};
use common::{assert_eq, number, Demo};
use rstest::rstest;
use std::cell::RefCell;
use std::rc::Rc;

/// Hook that logs every delivered event as text
struct Recorder {
    mask: EventMask,
    events: Vec<String>,
    call_ids: Vec<FrameId>,
}

impl Recorder {
    fn install(vm: &mut VM, mask: EventMask) -> Rc<RefCell<Recorder>> {
        let recorder = Rc::new(RefCell::new(Recorder {
            mask,
            events: Vec::new(),
            call_ids: Vec::new(),
        }));
        vm.set_trace_hook(recorder.clone());
        recorder
    }
}

impl TraceHook for Recorder {
    fn interests(&self) -> EventMask {
        self.mask
    }

    fn on_event(&mut self, frame: &FrameView<'_>, event: TraceEvent<'_>) -> TraceResult<()> {
        let text = match event {
            TraceEvent::Call => {
                self.call_ids.push(frame.id());
                format!("call {}", frame.name())
            }
            TraceEvent::Line(line) => format!("line {}:{}", frame.name(), line),
            TraceEvent::Instruction { offset, opcode } => {
                format!("instruction {}:{}:{:?}", frame.name(), offset, opcode)
            }
            TraceEvent::Exception(exception) => format!("exception {}:{}", frame.name(), exception),
            TraceEvent::Return { value, exit } => {
                format!("return {}:{}:{:?}", frame.name(), value, exit)
            }
        };
        self.events.push(text);
        Ok(())
    }
}

#[test]
fn test_full_event_sequence() {
    let demo = Demo::build();
    let mut vm = VM::new();
    let recorder = Recorder::install(&mut vm, EventMask::ALL);

    vm.call(&demo.solofunc, &[]).unwrap();

    assert_eq!(
        recorder.borrow().events,
        vec![
            "call solofunc",
            "line solofunc:4",
            "instruction solofunc:0:PushNone",
            "instruction solofunc:1:Return",
            "return solofunc:None:Some(Returned)",
        ]
    );
}

#[rstest]
#[case::calls_and_returns(EventMask::CALL | EventMask::RETURN, vec!["call solofunc", "return solofunc:None:Some(Returned)"])]
#[case::lines_only(EventMask::LINE, vec!["line solofunc:4"])]
#[case::nothing(EventMask::NONE, vec![])]
fn test_interests_filter_events(#[case] mask: EventMask, #[case] expected: Vec<&str>) {
    let demo = Demo::build();
    let mut vm = VM::new();
    let recorder = Recorder::install(&mut vm, mask);

    vm.call(&demo.solofunc, &[]).unwrap();

    assert_eq!(recorder.borrow().events, expected);
}

#[test]
fn test_unwinding_fires_exception_then_return() {
    let demo = Demo::build();
    let mut vm = VM::new();
    let recorder = Recorder::install(&mut vm, EventMask::CALL | EventMask::EXCEPTION | EventMask::RETURN);

    let instance = vm.call(&demo.my_class, &[number(2.0)]).unwrap();
    recorder.borrow_mut().events.clear();
    let _ = vm.invoke(&instance, "divide", &[number(2.0), number(0.0)]);

    assert_eq!(
        recorder.borrow().events,
        vec![
            "call divide",
            "exception divide:ZeroDivisionError: division by zero",
            "return divide:None:Some(Unwound)",
        ]
    );
}

#[test]
fn test_uninstrumented_routines_report_no_exit_kind() {
    let demo = Demo::build();
    let mut vm = VM::new();
    let recorder = Recorder::install(&mut vm, EventMask::RETURN);

    vm.call(&demo.legacy_add, &[number(1.0), number(1.0)]).unwrap();

    assert_eq!(recorder.borrow().events, vec!["return legacy_add:2:None"]);
}

#[test]
fn test_generator_keeps_frame_identity_across_resumptions() {
    let demo = Demo::build();
    let mut vm = VM::new();
    let recorder = Recorder::install(&mut vm, EventMask::CALL | EventMask::RETURN);

    let generator = vm.call(&demo.counter, &[number(2.0)]).unwrap();
    assert!(recorder.borrow().events.is_empty());
    vm.resume(&generator).unwrap();
    vm.resume(&generator).unwrap();

    let recorder = recorder.borrow();
    assert_eq!(
        recorder.events,
        vec![
            "call counter",
            "return counter:2:Some(Yielded)",
            "call counter",
            "return counter:done:Some(Returned)",
        ]
    );
    assert_eq!(recorder.call_ids[0], recorder.call_ids[1]);
}

#[test]
fn test_nested_frames_get_distinct_identities() {
    let demo = Demo::build();
    let mut vm = VM::new();
    demo.install(&mut vm);
    let recorder = Recorder::install(&mut vm, EventMask::CALL);

    vm.call(&demo.outer, &[]).unwrap();
    vm.call(&demo.outer, &[]).unwrap();

    let mut ids = recorder.borrow().call_ids.clone();
    assert_eq!(ids.len(), 6);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 6);
}

#[test]
fn test_caught_exception_does_not_fire_return_until_exit() {
    let demo = Demo::build();
    let mut vm = VM::new();
    let recorder = Recorder::install(&mut vm, EventMask::EXCEPTION | EventMask::RETURN);

    let result = vm.call(&demo.safe_divide, &[number(1.0), number(0.0)]).unwrap();

    assert_eq!(result, Value::from("recovered"));
    assert_eq!(
        recorder.borrow().events,
        vec![
            "exception safe_divide:ZeroDivisionError: division by zero",
            "return safe_divide:recovered:Some(Returned)",
        ]
    );
}
