//! The machine itself: call stack, scheduler and dispatch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bitflags::bitflags;
use tracing::{error, warn};

use reallive::{Archive, BytecodeElement, CommandElement, ElementHandle, MemoryServices};

use crate::error::{MachineError, Result};
use crate::long_operation::{LongOperation, TickResult};
use crate::memory::Memory;
use crate::module::{pack_module, RLModule};
use crate::stack_frame::{FrameKind, StackFrame};
use crate::system::{EventSystem, TextSystem};

bitflags! {
    /// Execution-mode switches.
    pub struct MachineFlags: u8 {
        /// Halt on any exception instead of logging and advancing.
        const HALT_ON_EXCEPTION = 0b0001;
        /// Fast-forward: waits terminate immediately.
        const FAST_FORWARD = 0b0010;
    }
}

/// The RealLive virtual machine.
pub struct RLMachine {
    archive: Archive,
    memory: Memory,
    call_stack: Vec<StackFrame>,
    long_operations: Vec<Box<dyn LongOperation>>,
    /// Bumped by every stack clearance so the scheduler can tell whether
    /// the operation it popped for a tick still belongs on the stack.
    long_op_epoch: u64,
    modules: HashMap<u32, Arc<RLModule>>,
    flags: MachineFlags,
    halted: bool,
    line_number: i32,
    kidoku_seen: HashSet<(i32, u16)>,
    events: Box<dyn EventSystem>,
    text: Box<dyn TextSystem>,
}

impl RLMachine {
    /// Builds a machine over an archive, positioned at the first element
    /// of the archive's first scenario.
    pub fn new(
        mut archive: Archive,
        events: Box<dyn EventSystem>,
        text: Box<dyn TextSystem>,
    ) -> Result<Self> {
        let first = archive.scenario_ids().next().ok_or_else(|| {
            reallive::Error::InvalidArchive("archive holds no scenarios".into())
        })?;
        let scenario = archive.scenario(first)?;
        let root = StackFrame::new(Arc::clone(&scenario), scenario.begin(), FrameKind::Root);

        Ok(Self {
            archive,
            memory: Memory::new(),
            call_stack: vec![root],
            long_operations: Vec::new(),
            long_op_epoch: 0,
            modules: HashMap::new(),
            flags: MachineFlags::HALT_ON_EXCEPTION,
            halted: false,
            line_number: 0,
            kidoku_seen: HashSet::new(),
            events,
            text,
        })
    }

    /// Registers a module. Registering two modules under one
    /// `(type, number)` pair is a programmer error and panics.
    pub fn attach_module(&mut self, module: RLModule) {
        let key = pack_module(module.module_type(), module.module_number());
        if let Some(previous) = self.modules.insert(key, Arc::new(module)) {
            panic!("duplicate module registration: `{}`", previous.name());
        }
    }

    // ----------------------------------------------------------------
    // Memory
    // ----------------------------------------------------------------

    /// The register file.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// The register file, mutably.
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Reads an integer memory cell.
    pub fn int_value(&self, r: reallive::IntMemRef) -> Result<i32> {
        Ok(self.memory.int_value(r)?)
    }

    /// Writes an integer memory cell.
    pub fn set_int_value(&mut self, r: reallive::IntMemRef, value: i32) -> Result<()> {
        Ok(self.memory.set_int_value(r, value)?)
    }

    /// Reads a string bank cell.
    pub fn string_value(&self, ty: u8, location: i32) -> Result<Vec<u8>> {
        Ok(self.memory.string_value(ty, location)?.to_vec())
    }

    /// Writes a string bank cell.
    pub fn set_string_value(&mut self, ty: u8, location: i32, value: &[u8]) -> Result<()> {
        Ok(self.memory.set_string_value(ty, location, value)?)
    }

    /// The store register.
    pub fn store_register(&self) -> i32 {
        self.memory.store_register()
    }

    /// Replaces the store register.
    pub fn set_store_register(&mut self, value: i32) {
        self.memory.set_store_register(value);
    }

    // ----------------------------------------------------------------
    // Flags, systems, bookkeeping
    // ----------------------------------------------------------------

    /// Whether the machine has halted.
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Halts the machine; no further instructions execute.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Switches between halting on exceptions and logging them while
    /// force-advancing the instruction pointer.
    pub fn set_halt_on_exception(&mut self, halt: bool) {
        self.flags.set(MachineFlags::HALT_ON_EXCEPTION, halt);
    }

    /// Whether fast-forward is active.
    pub fn fast_forward(&self) -> bool {
        self.flags.contains(MachineFlags::FAST_FORWARD)
    }

    /// Sets the fast-forward flag; waits terminate immediately while it
    /// is held.
    pub fn set_fast_forward(&mut self, active: bool) {
        self.flags.set(MachineFlags::FAST_FORWARD, active);
    }

    /// The most recent source line marker.
    pub fn line_number(&self) -> i32 {
        self.line_number
    }

    /// Whether the given kidoku marker of a scenario has been executed.
    pub fn has_seen_kidoku(&self, scenario: i32, kidoku: u16) -> bool {
        self.kidoku_seen.contains(&(scenario, kidoku))
    }

    /// The host event system.
    pub fn events(&self) -> &dyn EventSystem {
        self.events.as_ref()
    }

    /// The host event system, mutably.
    pub fn events_mut(&mut self) -> &mut dyn EventSystem {
        self.events.as_mut()
    }

    /// The host text system.
    pub fn text(&self) -> &dyn TextSystem {
        self.text.as_ref()
    }

    /// The host text system, mutably.
    pub fn text_mut(&mut self) -> &mut dyn TextSystem {
        self.text.as_mut()
    }

    /// Routes text to the host text system.
    pub fn show_text(&mut self, text: &[u8]) {
        self.text.show_text(text);
    }

    // ----------------------------------------------------------------
    // Call stack
    // ----------------------------------------------------------------

    fn current_frame(&self) -> Result<&StackFrame> {
        self.call_stack.last().ok_or(MachineError::EmptyStack)
    }

    fn current_frame_mut(&mut self) -> Result<&mut StackFrame> {
        self.call_stack.last_mut().ok_or(MachineError::EmptyStack)
    }

    /// Scenario id and instruction pointer of the executing frame.
    pub fn position(&self) -> Result<(i32, ElementHandle)> {
        let frame = self.current_frame()?;
        Ok((frame.scenario.id(), frame.ip))
    }

    /// Call-stack depth.
    pub fn stack_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Moves the executing frame one element forward, halting the
    /// machine if it runs off the scenario's end.
    pub fn advance_instruction_pointer(&mut self) {
        if let Ok(frame) = self.current_frame_mut() {
            frame.ip = frame.ip.next();
            if frame.ip.index() >= frame.scenario.script().len() {
                self.halted = true;
            }
        }
    }

    /// In-frame jump; no stack change.
    pub fn goto_location(&mut self, target: ElementHandle) -> Result<()> {
        self.current_frame_mut()?.ip = target;
        Ok(())
    }

    /// Permanently repoints the executing frame at an entry point of
    /// another (or the same) scenario.
    pub fn jump(&mut self, scenario: i32, entrypoint: i32) -> Result<()> {
        let scenario = self.archive.scenario(scenario)?;
        let ip = scenario.find_entrypoint(entrypoint)?;
        let frame = self.current_frame_mut()?;
        frame.scenario = scenario;
        frame.ip = ip;
        Ok(())
    }

    /// Pushes a far-call frame at an entry point of another scenario.
    pub fn farcall(&mut self, scenario: i32, entrypoint: i32) -> Result<()> {
        let scenario = self.archive.scenario(scenario)?;
        let ip = scenario.find_entrypoint(entrypoint)?;
        self.call_stack
            .push(StackFrame::new(scenario, ip, FrameKind::FarCall));
        Ok(())
    }

    /// Pops the frame pushed by the matching [`Self::farcall`].
    pub fn return_from_farcall(&mut self) -> Result<()> {
        if self.current_frame()?.kind != FrameKind::FarCall {
            return Err(MachineError::StackMismatch {
                operation: "return_from_farcall",
            });
        }
        self.call_stack.pop();
        Ok(())
    }

    /// Pushes a gosub frame at a location within the current scenario.
    pub fn gosub(&mut self, target: ElementHandle) -> Result<()> {
        let scenario = Arc::clone(&self.current_frame()?.scenario);
        self.call_stack
            .push(StackFrame::new(scenario, target, FrameKind::Gosub));
        Ok(())
    }

    /// Pops the frame pushed by the matching [`Self::gosub`].
    pub fn return_from_gosub(&mut self) -> Result<()> {
        if self.current_frame()?.kind != FrameKind::Gosub {
            return Err(MachineError::StackMismatch {
                operation: "return_from_gosub",
            });
        }
        self.call_stack.pop();
        Ok(())
    }

    // ----------------------------------------------------------------
    // Long operations
    // ----------------------------------------------------------------

    /// Installs a long operation; it takes over execution on the next
    /// tick.
    pub fn push_long_operation(&mut self, operation: Box<dyn LongOperation>) {
        self.long_operations.push(operation);
    }

    /// Drops every pending long operation. Load-game and
    /// return-to-menu paths call this before installing their own
    /// prelude.
    pub fn clear_long_operations_off_back_of_stack(&mut self) {
        self.long_operations.clear();
        self.long_op_epoch += 1;
    }

    /// Whether any long operation is pending.
    pub fn has_long_operations(&self) -> bool {
        !self.long_operations.is_empty()
    }

    // ----------------------------------------------------------------
    // Execution
    // ----------------------------------------------------------------

    /// Executes one scheduler tick: the top long operation if any is
    /// pending, otherwise one bytecode element. Returns whether the
    /// machine is halted.
    pub fn step(&mut self) -> bool {
        if self.halted {
            return true;
        }

        if let Some(mut operation) = self.long_operations.pop() {
            let depth = self.long_operations.len();
            let epoch = self.long_op_epoch;
            match operation.tick(self) {
                TickResult::Done => {}
                TickResult::Continue => {
                    // Unless the tick cleared the stack out from under
                    // us, the operation goes back beneath anything it
                    // pushed.
                    if self.long_op_epoch == epoch {
                        let at = depth.min(self.long_operations.len());
                        self.long_operations.insert(at, operation);
                    }
                }
            }
        } else {
            self.execute_next_instruction();
        }

        self.halted
    }

    /// Steps until the machine halts. Mostly useful in tests; a real
    /// host steps once per main-loop iteration.
    pub fn execute_until_halted(&mut self) {
        while !self.step() {}
    }

    fn execute_next_instruction(&mut self) {
        let (scenario, ip) = match self.current_frame() {
            Ok(frame) => (Arc::clone(&frame.scenario), frame.ip),
            Err(_) => {
                self.halted = true;
                return;
            }
        };
        let Some(element) = scenario.script().element(ip) else {
            self.halted = true;
            return;
        };

        let depth = self.call_stack.len();
        if let Err(err) = self.run_element(scenario.id(), element) {
            // Force the pointer forward if the element left it alone;
            // retrying a faulting element loops forever.
            let unchanged = self.call_stack.len() == depth
                && self.current_frame().map(|f| f.ip == ip).unwrap_or(false);
            if unchanged {
                self.advance_instruction_pointer();
            }
            if self.flags.contains(MachineFlags::HALT_ON_EXCEPTION) {
                error!(scenario = scenario.id(), line = self.line_number, %err, "halting on error");
                self.halted = true;
            } else {
                warn!(scenario = scenario.id(), line = self.line_number, %err, "continuing past error");
            }
        }
    }

    fn run_element(&mut self, scenario_id: i32, element: &BytecodeElement) -> Result<()> {
        match element {
            BytecodeElement::Comma | BytecodeElement::Entrypoint { .. } => {
                self.advance_instruction_pointer();
                Ok(())
            }
            BytecodeElement::Line { number } => {
                self.line_number = i32::from(*number);
                self.advance_instruction_pointer();
                Ok(())
            }
            BytecodeElement::Kidoku { value } => {
                self.kidoku_seen.insert((scenario_id, *value));
                self.advance_instruction_pointer();
                Ok(())
            }
            BytecodeElement::Textout(textout) => {
                let text = textout.text();
                self.text.show_text(&text);
                self.advance_instruction_pointer();
                Ok(())
            }
            BytecodeElement::Expression(expression) => {
                expression
                    .parsed_expression()?
                    .int_value(&mut self.memory)?;
                self.advance_instruction_pointer();
                Ok(())
            }
            BytecodeElement::Command(command) => self.execute_command(command),
        }
    }

    fn execute_command(&mut self, command: &CommandElement) -> Result<()> {
        let key = pack_module(command.modtype(), command.module());
        let module = self
            .modules
            .get(&key)
            .cloned()
            .ok_or(MachineError::UndefinedModule {
                modtype: command.modtype(),
                module: command.module(),
            })?;
        module.dispatch(self, command)
    }
}

impl MemoryServices for RLMachine {
    fn int_value(&self, r: reallive::IntMemRef) -> reallive::Result<i32> {
        self.memory.int_value(r)
    }

    fn set_int_value(&mut self, r: reallive::IntMemRef, value: i32) -> reallive::Result<()> {
        self.memory.set_int_value(r, value)
    }

    fn string_value(&self, ty: u8, location: i32) -> reallive::Result<&[u8]> {
        self.memory.string_value(ty, location)
    }

    fn set_string_value(&mut self, ty: u8, location: i32, value: &[u8]) -> reallive::Result<()> {
        self.memory.set_string_value(ty, location, value)
    }

    fn store_register_value(&self) -> i32 {
        self.memory.store_register()
    }

    fn set_store_register(&mut self, value: i32) {
        self.memory.set_store_register(value);
    }
}
