//! Behaviour tests over hand-assembled scenarios.

use std::cell::RefCell;
use std::rc::Rc;

use reallive::intmemref::{IntMemRef, INTL_LOCATION, STRK_LOCATION, STRS_LOCATION};
use reallive::testing::{
    build_archive, command_header, function, int_constant, int_reference, str_constant,
    str_reference, ScenarioBuilder,
};
use reallive::Archive;
use rlvm::modules::add_all_modules;
use rlvm::{
    EventSystem, LongOperation, MouseButton, RLMachine, TextSystem, TickResult,
};

// ----------------------------------------------------------------
// Host stubs
// ----------------------------------------------------------------

#[derive(Default)]
struct EventState {
    ticks: u32,
    ctrl: bool,
    cursor: (i32, i32),
    click: Option<MouseButton>,
}

#[derive(Clone, Default)]
struct TestEvents(Rc<RefCell<EventState>>);

impl EventSystem for TestEvents {
    fn ticks(&self) -> u32 {
        self.0.borrow().ticks
    }

    fn ctrl_pressed(&self) -> bool {
        self.0.borrow().ctrl
    }

    fn cursor_position(&self) -> (i32, i32) {
        self.0.borrow().cursor
    }

    fn take_click(&mut self) -> Option<MouseButton> {
        self.0.borrow_mut().click.take()
    }
}

#[derive(Default)]
struct TextState {
    shown: Vec<Vec<u8>>,
    ctrl_skip: bool,
    offered: Vec<Vec<u8>>,
    selection: Option<i32>,
}

#[derive(Clone, Default)]
struct TestText(Rc<RefCell<TextState>>);

impl TextSystem for TestText {
    fn show_text(&mut self, text: &[u8]) {
        self.0.borrow_mut().shown.push(text.to_vec());
    }

    fn ctrl_key_skip(&self) -> bool {
        self.0.borrow().ctrl_skip
    }

    fn selection_choice(&mut self, options: &[Vec<u8>]) -> Option<i32> {
        let mut state = self.0.borrow_mut();
        state.offered = options.to_vec();
        state.selection.take()
    }
}

struct Fixture {
    machine: RLMachine,
    events: TestEvents,
    text: TestText,
}

fn fixture(tag: &str, scenarios: &[(usize, Vec<u8>)]) -> Fixture {
    let dir = std::env::temp_dir().join(format!("rlvm-test-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("seen.txt");
    std::fs::write(&path, build_archive(scenarios)).unwrap();
    let archive = Archive::open(&path).unwrap();
    let _ = std::fs::remove_dir_all(&dir);

    let events = TestEvents::default();
    let text = TestText::default();
    let mut machine =
        RLMachine::new(archive, Box::new(events.clone()), Box::new(text.clone())).unwrap();
    add_all_modules(&mut machine);
    Fixture {
        machine,
        events,
        text,
    }
}

fn single(tag: &str, builder: &ScenarioBuilder) -> Fixture {
    fixture(tag, &[(0, builder.build())])
}

// ----------------------------------------------------------------
// Element builders
// ----------------------------------------------------------------

/// `setarray(intA[slot], value)` — one write through the Mem module.
fn setarray(slot: i32, value: i32) -> Vec<u8> {
    function(
        1,
        11,
        0,
        0,
        &[int_reference(0, slot), int_constant(value)],
    )
}

fn goto_cmd(target: u32) -> Vec<u8> {
    let mut cmd = command_header(0, 1, 0, 0, 0);
    cmd.extend(target.to_le_bytes());
    cmd
}

fn gosub_cmd(target: u32) -> Vec<u8> {
    let mut cmd = command_header(0, 1, 5, 0, 0);
    cmd.extend(target.to_le_bytes());
    cmd
}

fn goto_if_cmd(condition: &[u8], target: u32) -> Vec<u8> {
    let mut cmd = command_header(0, 1, 1, 1, 0);
    cmd.push(b'(');
    cmd.extend_from_slice(condition);
    cmd.push(b')');
    cmd.extend(target.to_le_bytes());
    cmd
}

fn int_a(slot: i32) -> IntMemRef {
    IntMemRef::new(0, 0, slot)
}

// ----------------------------------------------------------------
// Plain execution
// ----------------------------------------------------------------

#[test]
fn runs_to_the_end_and_halts() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&setarray(0, 41));
    builder.add(&setarray(1, 42));
    let mut f = single("run", &builder);

    f.machine.execute_until_halted();
    assert!(f.machine.halted());
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 41);
    assert_eq!(f.machine.int_value(int_a(1)).unwrap(), 42);
}

#[test]
fn expression_element_assigns_memory() {
    let mut builder = ScenarioBuilder::new();
    let mut expr = int_reference(0, 0);
    expr.extend([b'\\', 0x1e]);
    expr.extend(int_constant(42));
    builder.add(&expr);
    let mut f = single("expr", &builder);

    f.machine.execute_until_halted();
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 42);
}

#[test]
fn textout_routes_to_the_text_system() {
    let mut builder = ScenarioBuilder::new();
    builder.add(b"\"HELLO\"");
    let mut f = single("textout", &builder);

    f.machine.execute_until_halted();
    assert_eq!(f.text.0.borrow().shown, vec![b"HELLO".to_vec()]);
}

#[test]
fn line_markers_update_the_line_number() {
    let mut builder = ScenarioBuilder::new();
    builder.add_line(7);
    builder.add_line(1234);
    let mut f = single("line", &builder);

    f.machine.execute_until_halted();
    assert_eq!(f.machine.line_number(), 1234);
}

#[test]
fn kidoku_markers_are_recorded() {
    let mut builder = ScenarioBuilder::new();
    builder.add_kidoku(5);
    let mut f = single("kidoku", &builder);

    f.machine.execute_until_halted();
    assert!(f.machine.has_seen_kidoku(0, 0));
    assert!(!f.machine.has_seen_kidoku(0, 1));
}

// ----------------------------------------------------------------
// Flow control
// ----------------------------------------------------------------

#[test]
fn goto_skips_to_its_target() {
    let skipped = setarray(0, 111);
    let target = 12 + skipped.len() as u32;

    let mut builder = ScenarioBuilder::new();
    builder.add(&goto_cmd(target));
    builder.add(&skipped);
    builder.add(&setarray(1, 222));
    let mut f = single("goto", &builder);

    f.machine.execute_until_halted();
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 0);
    assert_eq!(f.machine.int_value(int_a(1)).unwrap(), 222);
}

#[test]
fn goto_if_jumps_only_when_the_condition_holds() {
    for (precondition, expect_skipped) in [(1, true), (0, false)] {
        let skipped = setarray(1, 111);
        let cond = int_reference(0, 0);
        let cmd = goto_if_cmd(&cond, 0); // target patched below
        let target = cmd.len() as u32 + skipped.len() as u32;
        let cmd = goto_if_cmd(&cond, target);

        let mut builder = ScenarioBuilder::new();
        builder.add(&cmd);
        builder.add(&skipped);
        builder.add_line(1);
        let mut f = single("gotoif", &builder);

        f.machine.set_int_value(int_a(0), precondition).unwrap();
        f.machine.execute_until_halted();
        let skipped_value = f.machine.int_value(int_a(1)).unwrap();
        if expect_skipped {
            assert_eq!(skipped_value, 0);
        } else {
            assert_eq!(skipped_value, 111);
        }
    }
}

#[test]
fn goto_targeting_a_metadata_element_executes_it_normally() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&goto_cmd(12)); // the line marker right behind this goto
    builder.add_line(55);
    builder.add(&setarray(0, 1));
    let mut f = single("gotometa", &builder);

    f.machine.execute_until_halted();
    assert_eq!(f.machine.line_number(), 55);
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 1);
}

#[test]
fn gosub_returns_to_the_call_site() {
    let in_sub = setarray(0, 1);
    let after_call = setarray(1, 2);
    let ret = function(0, 1, 10, 0, &[]);

    let off_after = 12 + after_call.len() as u32;
    let off_sub = off_after + 12; // skipping goto
    let off_end = off_sub + in_sub.len() as u32 + ret.len() as u32;

    let mut builder = ScenarioBuilder::new();
    builder.add(&gosub_cmd(off_sub));
    builder.add(&after_call);
    builder.add(&goto_cmd(off_end));
    builder.add(&in_sub);
    builder.add(&ret);
    builder.add_line(99);
    let mut f = single("gosub", &builder);

    f.machine.execute_until_halted();
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 1);
    assert_eq!(f.machine.int_value(int_a(1)).unwrap(), 2);
    assert_eq!(f.machine.stack_depth(), 1);
}

#[test]
fn gosub_with_passes_arguments_through_the_local_banks() {
    let ret = function(0, 1, 17, 0, &[int_constant(9)]); // ret_with 9

    let mut call = command_header(0, 1, 16, 2, 0);
    call.push(b'(');
    call.extend(int_constant(5));
    call.extend(str_constant(b"ARG"));
    call.push(b')');
    let off_sub = call.len() as u32 + 4 + 12; // past this call and the goto
    call.extend(off_sub.to_le_bytes());

    let off_end = off_sub + ret.len() as u32;

    let mut builder = ScenarioBuilder::new();
    builder.add(&call);
    builder.add(&goto_cmd(off_end));
    builder.add(&ret);
    builder.add_line(99);
    let mut f = single("gosubwith", &builder);

    f.machine.execute_until_halted();
    assert_eq!(
        f.machine.int_value(IntMemRef::new(INTL_LOCATION, 0, 0)).unwrap(),
        5
    );
    assert_eq!(
        f.machine.string_value(STRK_LOCATION, 0).unwrap(),
        b"ARG".to_vec()
    );
    assert_eq!(f.machine.store_register(), 9);
}

#[test]
fn mismatched_return_is_a_stack_fault() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&function(0, 1, 13, 0, &[])); // rtl with no farcall
    builder.add(&setarray(0, 1));
    let mut f = single("mismatch", &builder);

    f.machine.execute_until_halted();
    assert!(f.machine.halted());
    // Strict mode halts before the next element runs.
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 0);
}

#[test]
fn farcall_and_rtl_cross_scenarios() {
    let mut main = ScenarioBuilder::new();
    main.add(&function(0, 1, 12, 1, &[int_constant(1), int_constant(0)]));
    main.add(&setarray(1, 5));

    let mut callee = ScenarioBuilder::new();
    callee.add_entrypoint(0);
    callee.add(&setarray(0, 7));
    callee.add(&function(0, 1, 13, 0, &[]));

    let mut f = fixture("farcall", &[(0, main.build()), (1, callee.build())]);
    f.machine.execute_until_halted();
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 7);
    assert_eq!(f.machine.int_value(int_a(1)).unwrap(), 5);
    assert_eq!(f.machine.stack_depth(), 1);
}

#[test]
fn jump_repoints_the_current_frame() {
    let mut main = ScenarioBuilder::new();
    main.add(&function(0, 1, 11, 0, &[int_constant(1)]));
    main.add(&setarray(1, 1)); // never reached

    let mut other = ScenarioBuilder::new();
    other.add_entrypoint(0);
    other.add(&setarray(0, 3));

    let mut f = fixture("jump", &[(0, main.build()), (1, other.build())]);
    f.machine.execute_until_halted();
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 3);
    assert_eq!(f.machine.int_value(int_a(1)).unwrap(), 0);
    assert_eq!(f.machine.stack_depth(), 1);
}

// ----------------------------------------------------------------
// Error policy
// ----------------------------------------------------------------

#[test]
fn strict_mode_halts_at_the_element_after_the_fault() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&function(1, 99, 0, 0, &[])); // no such module
    let mut f = single("strict", &builder);

    assert!(f.machine.step());
    assert!(f.machine.halted());
    let (_, ip) = f.machine.position().unwrap();
    assert_eq!(ip.index(), 1);
}

#[test]
fn lenient_mode_advances_past_faults() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&function(1, 99, 0, 0, &[])); // no such module
    builder.add(&function(1, 11, 99, 0, &[])); // no such opcode
    builder.add(&setarray(0, 9));
    let mut f = single("lenient", &builder);

    f.machine.set_halt_on_exception(false);
    f.machine.execute_until_halted();
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 9);
}

#[test]
fn parameter_type_mismatch_is_recoverable() {
    let mut builder = ScenarioBuilder::new();
    // strcpy expects a string reference and a string.
    builder.add(&function(1, 10, 0, 0, &[int_constant(1), int_constant(2)]));
    builder.add(&setarray(0, 4));
    let mut f = single("paramtype", &builder);

    f.machine.set_halt_on_exception(false);
    f.machine.execute_until_halted();
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 4);
}

// ----------------------------------------------------------------
// Long operations
// ----------------------------------------------------------------

struct LoggedDone {
    name: &'static str,
    log: Rc<RefCell<Vec<&'static str>>>,
}

impl LongOperation for LoggedDone {
    fn tick(&mut self, _machine: &mut RLMachine) -> TickResult {
        self.log.borrow_mut().push(self.name);
        TickResult::Done
    }
}

struct PushesChildThenFinishes {
    log: Rc<RefCell<Vec<&'static str>>>,
    pushed: bool,
}

impl LongOperation for PushesChildThenFinishes {
    fn tick(&mut self, machine: &mut RLMachine) -> TickResult {
        if !self.pushed {
            self.pushed = true;
            self.log.borrow_mut().push("parent pushes child");
            machine.push_long_operation(Box::new(LoggedDone {
                name: "child done",
                log: Rc::clone(&self.log),
            }));
            TickResult::Continue
        } else {
            self.log.borrow_mut().push("parent done");
            TickResult::Done
        }
    }
}

#[test]
fn long_operations_nest_and_resume_in_order() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&setarray(0, 1));
    let mut f = single("longop", &builder);

    let log = Rc::new(RefCell::new(Vec::new()));
    f.machine.push_long_operation(Box::new(PushesChildThenFinishes {
        log: Rc::clone(&log),
        pushed: false,
    }));

    assert!(!f.machine.step()); // parent pushes child
    assert!(!f.machine.step()); // child runs to completion and pops
    assert!(!f.machine.step()); // parent resumes and completes
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 0);
    assert!(f.machine.step()); // bytecode advances by exactly one element
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 1);
    assert_eq!(
        *log.borrow(),
        vec!["parent pushes child", "child done", "parent done"]
    );
}

struct ClearsTheStack;

impl LongOperation for ClearsTheStack {
    fn tick(&mut self, machine: &mut RLMachine) -> TickResult {
        // The clearance retires this operation; returning Done here
        // would pop whatever the clearance installed instead.
        machine.clear_long_operations_off_back_of_stack();
        TickResult::Continue
    }
}

#[test]
fn stack_clearance_retires_the_running_operation() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&setarray(0, 1));
    let mut f = single("clearop", &builder);

    f.machine.push_long_operation(Box::new(ClearsTheStack));
    assert!(!f.machine.step());
    assert!(!f.machine.has_long_operations());
    f.machine.step();
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 1);
}

#[test]
fn wait_terminates_when_the_clock_passes_the_target() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&function(1, 4, 100, 0, &[int_constant(100)]));
    builder.add(&setarray(0, 1));
    let mut f = single("wait", &builder);

    assert!(!f.machine.step()); // installs the wait
    assert!(!f.machine.step()); // 0ms elapsed, still waiting
    assert!(f.machine.has_long_operations());

    f.events.0.borrow_mut().ticks = 150;
    assert!(!f.machine.step()); // target passed, wait pops
    assert!(!f.machine.has_long_operations());
    f.machine.execute_until_halted();
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 1);
}

#[test]
fn fast_forward_cuts_waits_short() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&function(1, 4, 100, 0, &[int_constant(100_000)]));
    builder.add_line(1);
    let mut f = single("ffwd", &builder);

    f.machine.set_fast_forward(true);
    f.machine.step();
    f.machine.step();
    assert!(!f.machine.has_long_operations());
}

#[test]
fn ctrl_skip_cuts_waits_short_when_enabled() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&function(1, 4, 100, 0, &[int_constant(100_000)]));
    builder.add_line(1);
    let mut f = single("ctrl", &builder);

    f.text.0.borrow_mut().ctrl_skip = true;
    f.events.0.borrow_mut().ctrl = true;
    f.machine.step();
    f.machine.step();
    assert!(!f.machine.has_long_operations());
}

#[test]
fn cancelable_wait_reports_the_click_in_the_store_register() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&function(1, 4, 101, 0, &[int_constant(100_000)]));
    builder.add_line(1);
    let mut f = single("waitc", &builder);

    f.machine.step();
    f.events.0.borrow_mut().click = Some(MouseButton::Left);
    f.machine.step();
    assert!(!f.machine.has_long_operations());
    assert_eq!(f.machine.store_register(), 1);
}

#[test]
fn wait_click_records_the_cursor_position() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&function(
        1,
        4,
        132,
        0,
        &[
            int_constant(100_000),
            int_reference(0, 0),
            int_reference(0, 1),
        ],
    ));
    builder.add_line(1);
    let mut f = single("waitclick", &builder);

    f.machine.step();
    {
        let mut events = f.events.0.borrow_mut();
        events.cursor = (320, 240);
        events.click = Some(MouseButton::Right);
    }
    f.machine.step();
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 320);
    assert_eq!(f.machine.int_value(int_a(1)).unwrap(), 240);
    assert_eq!(f.machine.store_register(), -1);
}

// ----------------------------------------------------------------
// Str module
// ----------------------------------------------------------------

#[test]
fn string_operations_round_trip_through_the_banks() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&function(
        1,
        10,
        0,
        0,
        &[str_reference(STRS_LOCATION, 0), str_constant(b"HELLO")],
    ));
    builder.add(&function(1, 10, 100, 0, &[str_reference(STRS_LOCATION, 0)]));
    builder.add(&function(1, 10, 2, 0, &[str_reference(STRS_LOCATION, 0)]));
    let mut f = single("strmod", &builder);

    f.machine.execute_until_halted();
    assert_eq!(
        f.machine.string_value(STRS_LOCATION, 0).unwrap(),
        b"HELLO".to_vec()
    );
    assert_eq!(f.text.0.borrow().shown, vec![b"HELLO".to_vec()]);
    assert_eq!(f.machine.store_register(), 5);
}

#[test]
fn select_offers_options_and_stores_the_choice() {
    let mut cmd = command_header(0, 2, 1, 2, 0);
    cmd.push(b'{');
    cmd.extend(str_constant(b"YES"));
    cmd.extend([b'\n', 0x01, 0x00]);
    cmd.extend(str_constant(b"NO"));
    cmd.extend([b'\n', 0x02, 0x00]);
    cmd.push(b'}');

    let mut builder = ScenarioBuilder::new();
    builder.add(&cmd);
    builder.add(&setarray(0, 1));
    let mut f = single("select", &builder);

    assert!(!f.machine.step()); // installs the selection
    assert!(!f.machine.step()); // no decision yet
    assert_eq!(
        f.text.0.borrow().offered,
        vec![b"YES".to_vec(), b"NO".to_vec()]
    );

    f.text.0.borrow_mut().selection = Some(1);
    assert!(!f.machine.step()); // decision arrives
    assert!(!f.machine.has_long_operations());
    assert_eq!(f.machine.store_register(), 1);

    f.machine.execute_until_halted();
    assert_eq!(f.machine.int_value(int_a(0)).unwrap(), 1);
}

#[test]
fn mem_sum_accumulates_an_inclusive_range() {
    let mut builder = ScenarioBuilder::new();
    builder.add(&function(
        1,
        11,
        0,
        0,
        &[
            int_reference(0, 10),
            int_constant(1),
            int_constant(2),
            int_constant(3),
        ],
    ));
    builder.add(&function(
        1,
        11,
        100,
        0,
        &[int_reference(0, 10), int_reference(0, 12)],
    ));
    let mut f = single("memsum", &builder);

    f.machine.execute_until_halted();
    assert_eq!(f.machine.store_register(), 6);
}
