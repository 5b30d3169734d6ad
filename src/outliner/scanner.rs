//! Window scanner
//!
//! Greedily grows a window of instructions forward from a start index within
//! one block and reports every accepted window to a [`CandidateHandler`].
//! All three passes drive the same scanner; only the handler differs, so a
//! method scanned twice yields the same windows both times.
//!
//! # States
//!
//! ```text
//!            include                 reject / size limit / end of block
//!   ┌──────────────────┐          ┌───────────────────────────────────┐
//!   │                  ▼          │                                   ▼
//!   └────────────  Scanning ──────┘                                Closing
//!                    ▲   │ reject at window start                     │
//!                    │   ▼                                            │
//!                  Restarting ◀─────────── after window / discard ────┘
//! ```
//!
//! # Inclusion rules
//!
//! - Const and passthrough instructions ride along without counting toward
//!   the window size, but never start a window.
//! - An instruction producing a value is rejected while the active result
//!   still has uses left after this instruction.
//! - New arguments must fit the register budget and be of a supported type.
//!   A value already passed as an argument is only reused for a slot of the
//!   same parameter type.
//! - Invokes must be relocatable. A constructor is only included right
//!   after its own new-instance, and a used new-instance only together with
//!   its constructor.
//!
//! On closing, trailing const and passthrough instructions are trimmed and
//! windows below the minimum size are discarded.

use smallvec::SmallVec;
use tracing::trace;

use crate::config::OutlineOptions;
use crate::ir::{
    Block, BlockId, DefUse, DexType, InstrKind, Instruction, Method, NumericType, Operands,
    TypeElement, ValueId,
};

use super::classify::{classify, InstructionClass};
use super::error::OutlineResult;
use super::template::{declared_input_type, ArgumentSlot, Template};

/// Size and arity bounds for windows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowLimits {
    pub min_size: usize,
    pub max_size: usize,
    pub max_argument_registers: usize,
    pub allow_interface_arrays: bool,
}

impl WindowLimits {
    pub fn from_options(options: &OutlineOptions) -> Self {
        Self {
            min_size: options.min_size,
            max_size: options.max_size,
            max_argument_registers: options.max_argument_registers,
            allow_interface_arrays: options.interface_array_arguments_allowed(),
        }
    }
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self::from_options(&OutlineOptions::default())
    }
}

/// An accepted window `[start, end)` of one block
#[derive(Debug, Clone)]
pub struct Candidate {
    pub block: BlockId,
    pub start: usize,
    pub end: usize,
    pub template: Template,
    /// Live-in values passed to the outline, in argument order
    pub arguments: Vec<ValueId>,
    pub argument_registers: usize,
    /// Value the outline returns, if any
    pub return_value: Option<ValueId>,
    /// Number of template operations in the window
    pub operations: usize,
}

/// Receives accepted windows
pub trait CandidateHandler {
    fn on_candidate(&mut self, candidate: Candidate) -> OutlineResult<()>;
}

impl<F> CandidateHandler for F
where
    F: FnMut(Candidate) -> OutlineResult<()>,
{
    fn on_candidate(&mut self, candidate: Candidate) -> OutlineResult<()> {
        self(candidate)
    }
}

/// Scan every block of `method`
pub fn scan_method<H: CandidateHandler>(
    method: &Method,
    def_use: &DefUse,
    limits: &WindowLimits,
    handler: &mut H,
) -> OutlineResult<()> {
    for block in &method.blocks {
        WindowScanner::new(method, block, def_use, limits).run(handler)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Scanning,
    /// Close the window at the given exclusive end
    Closing(usize),
    /// Start a fresh window at the given index
    Restarting(usize),
}

struct WindowScanner<'a> {
    method: &'a Method,
    block: &'a Block,
    def_use: &'a DefUse,
    limits: &'a WindowLimits,

    start: usize,
    index: usize,
    operations: usize,
    arguments: Vec<ValueId>,
    argument_types: Vec<DexType>,
    argument_map: Vec<ArgumentSlot>,
    argument_registers: usize,
    /// Active result and the uses it has left
    return_value: Option<ValueId>,
    return_type: DexType,
    users_left: u32,
    /// Index of a new-instance still waiting for its constructor
    pending_new_instance: Option<usize>,
}

impl<'a> WindowScanner<'a> {
    fn new(method: &'a Method, block: &'a Block, def_use: &'a DefUse, limits: &'a WindowLimits) -> Self {
        Self {
            method,
            block,
            def_use,
            limits,
            start: 0,
            index: 0,
            operations: 0,
            arguments: Vec::new(),
            argument_types: Vec::new(),
            argument_map: Vec::new(),
            argument_registers: 0,
            return_value: None,
            return_type: DexType::void(),
            users_left: 0,
            pending_new_instance: None,
        }
    }

    fn run<H: CandidateHandler>(&mut self, handler: &mut H) -> OutlineResult<()> {
        let block = self.block;
        let instructions = &block.instructions;
        let mut state = ScanState::Scanning;
        loop {
            state = match state {
                ScanState::Scanning => match instructions.get(self.index) {
                    Some(instruction) => self.step(instruction),
                    None if self.index > self.start => ScanState::Closing(self.index),
                    None => return Ok(()),
                },
                ScanState::Closing(end) => self.close(end, handler)?,
                ScanState::Restarting(at) => {
                    self.reset(at);
                    ScanState::Scanning
                }
            };
        }
    }

    fn step(&mut self, instruction: &Instruction) -> ScanState {
        let class = classify(instruction);
        let include = match class {
            _ if class.is_transparent() && self.index == self.start => {
                return ScanState::Restarting(self.index + 1);
            }
            _ if class.is_transparent() => true,
            InstructionClass::Unsupported => false,
            _ => self.can_include(instruction, class),
        };

        if include {
            self.include(instruction, class);
            if self.operations >= self.limits.max_size {
                ScanState::Closing(self.index + 1)
            } else {
                self.index += 1;
                ScanState::Scanning
            }
        } else if self.index > self.start {
            ScanState::Closing(self.index)
        } else {
            ScanState::Restarting(self.index + 1)
        }
    }

    #[inline]
    fn aliased(&self, value: ValueId) -> ValueId {
        self.def_use.aliased(value)
    }

    #[inline]
    fn is_return_value(&self, value: ValueId) -> bool {
        self.return_value == Some(self.aliased(value))
    }

    /// Inputs with the active result moved to the left of commutative binops
    fn ordered_inputs(&self, instruction: &Instruction) -> Operands {
        let mut inputs = instruction.inputs.clone();
        if let InstrKind::Binop { kind, .. } = &instruction.kind {
            if kind.is_commutative()
                && inputs.len() == 2
                && self.is_return_value(inputs[1])
                && !self.is_return_value(inputs[0])
            {
                inputs.swap(0, 1);
            }
        }
        inputs
    }

    fn can_include(&self, instruction: &Instruction, class: InstructionClass) -> bool {
        let consumed = instruction
            .inputs
            .iter()
            .filter(|&&input| self.is_return_value(input))
            .count() as u32;
        let users_left_if_included = self.users_left.saturating_sub(consumed);
        if instruction.output.is_some() && users_left_if_included > 0 {
            return false;
        }

        let constructor = instruction
            .invoked_method()
            .is_some_and(|method| method.is_constructor());
        if let Some(pending) = self.pending_new_instance {
            let allocated = self.block.instructions[pending].output;
            let receiver = instruction.inputs.first().map(|&v| self.aliased(v));
            if !constructor || receiver.is_none() || receiver != allocated {
                return false;
            }
        }

        match (&instruction.kind, class) {
            (_, InstructionClass::NewObject) => return true,
            (_, InstructionClass::Arithmetic) => {}
            (InstrKind::Invoke { kind, relocatable, .. }, InstructionClass::Invoke) => {
                if !relocatable {
                    return false;
                }
                if constructor && (!kind.has_receiver() || self.pending_new_instance.is_none()) {
                    return false;
                }
            }
            _ => return false,
        }

        let mut registers = self.argument_registers;
        let mut fresh: SmallVec<[(ValueId, DexType); 4]> = SmallVec::new();
        for (slot, &input) in self.ordered_inputs(instruction).iter().enumerate() {
            let value = self.aliased(input);
            if Some(value) == self.return_value {
                continue;
            }
            let ty = self.method.value_type(value);
            let parameter = argument_type(ty, instruction, slot);
            // A reused argument keeps the type of its first slot
            let existing = match self.arguments.iter().position(|&a| a == value) {
                Some(index) => self.argument_types.get(index),
                None => fresh.iter().find(|(v, _)| *v == value).map(|(_, t)| t),
            };
            if let Some(existing) = existing {
                if *existing != parameter {
                    return false;
                }
                continue;
            }
            if !self.supported_argument_type(ty) {
                return false;
            }
            registers += ty.required_registers();
            fresh.push((value, parameter));
        }
        registers <= self.limits.max_argument_registers
    }

    /// Arrays of interfaces behave differently across runtimes and are only
    /// passed when explicitly allowed
    fn supported_argument_type(&self, ty: &TypeElement) -> bool {
        if !ty.is_array() || self.limits.allow_interface_arrays {
            return true;
        }
        match ty.base_type() {
            TypeElement::Primitive { .. } => true,
            TypeElement::Class { interfaces, .. } => interfaces.is_empty(),
            _ => false,
        }
    }

    fn include(&mut self, instruction: &Instruction, class: InstructionClass) {
        match class {
            InstructionClass::Const => return,
            InstructionClass::Passthrough => {
                self.include_passthrough(instruction);
                return;
            }
            _ => {}
        }
        self.operations += 1;

        let inputs = self.ordered_inputs(instruction);
        let previous = self.return_value;
        if previous.is_some() {
            for &input in &inputs {
                if self.is_return_value(input) {
                    self.users_left = self.users_left.saturating_sub(1);
                }
            }
            if self.users_left == 0 {
                self.clear_return_value();
            }
        }

        for (slot, &input) in inputs.iter().enumerate() {
            let value = self.aliased(input);
            if Some(value) == previous {
                self.argument_map.push(ArgumentSlot::Temporary);
                continue;
            }
            let index = match self.arguments.iter().position(|&a| a == value) {
                Some(index) => index,
                None => {
                    let ty = self.method.value_type(value);
                    self.argument_registers += ty.required_registers();
                    self.argument_types
                        .push(argument_type(ty, instruction, slot));
                    self.arguments.push(value);
                    self.arguments.len() - 1
                }
            };
            self.argument_map.push(ArgumentSlot::Argument(index as u32));
        }

        match (&instruction.kind, instruction.output) {
            (InstrKind::NewInstance { class }, Some(output)) => {
                if self.def_use.is_used(output) {
                    self.pending_new_instance = Some(self.index);
                }
                self.set_return_value(output, class.clone());
            }
            (InstrKind::Invoke { method, .. }, output) => {
                if method.is_constructor() {
                    self.pending_new_instance = None;
                }
                if let Some(output) = output {
                    self.set_return_value(output, method.proto.return_type.clone());
                }
            }
            (InstrKind::Binop { numeric, .. }, Some(output)) => {
                self.set_return_value(output, numeric.dex_type());
            }
            _ => {}
        }
    }

    /// A refinement of the active result hands its uses over to the result
    fn include_passthrough(&mut self, instruction: &Instruction) {
        let (Some(&input), Some(output)) = (instruction.inputs.first(), instruction.output) else {
            return;
        };
        if self.is_return_value(input) {
            self.users_left = self.users_left.saturating_sub(1) + self.def_use.uses(output);
            if self.users_left == 0 {
                self.clear_return_value();
            }
        }
    }

    fn set_return_value(&mut self, value: ValueId, ty: DexType) {
        self.users_left = self.def_use.uses(value);
        if self.users_left == 0 {
            self.clear_return_value();
        } else {
            self.return_value = Some(value);
            self.return_type = ty;
        }
    }

    fn clear_return_value(&mut self) {
        self.return_value = None;
        self.return_type = DexType::void();
        self.users_left = 0;
    }

    fn close<H: CandidateHandler>(&mut self, end_index: usize, handler: &mut H) -> OutlineResult<ScanState> {
        if let Some(pending) = self.pending_new_instance {
            trace!(
                block = self.block.id.0,
                start = self.start,
                pending,
                "dropping window with unconstructed instance"
            );
            let at = if pending == self.start { end_index } else { pending };
            return Ok(ScanState::Restarting(at));
        }

        let block = self.block;
        let instructions = &block.instructions;
        let mut end = end_index;
        while end > self.start && classify(&instructions[end - 1]).is_transparent() {
            end -= 1;
        }

        if self.operations < self.limits.min_size {
            return Ok(ScanState::Restarting(self.start + 1));
        }

        debug_assert!(self.argument_registers <= self.limits.max_argument_registers);
        let template = Template::from_window(
            &instructions[self.start..end],
            std::mem::take(&mut self.argument_types),
            std::mem::take(&mut self.argument_map),
            std::mem::replace(&mut self.return_type, DexType::void()),
        );
        trace!(
            method = %self.method.reference,
            block = self.block.id.0,
            start = self.start,
            end,
            operations = self.operations,
            "candidate"
        );
        handler.on_candidate(Candidate {
            block: self.block.id,
            start: self.start,
            end,
            template,
            arguments: std::mem::take(&mut self.arguments),
            argument_registers: self.argument_registers,
            return_value: self.return_value,
            operations: self.operations,
        })?;
        Ok(ScanState::Restarting(end_index))
    }

    fn reset(&mut self, at: usize) {
        self.start = at;
        self.index = at;
        self.operations = 0;
        self.arguments.clear();
        self.argument_types.clear();
        self.argument_map.clear();
        self.argument_registers = 0;
        self.clear_return_value();
        self.pending_new_instance = None;
    }
}

/// Outline parameter type for a value read by operand `slot` of `instruction`.
///
/// Object values with exactly one interface take the interface type. Null
/// and int-lattice values take the declared type of the operand, since the
/// lattice does not tell `boolean` from `int`.
fn argument_type(ty: &TypeElement, instruction: &Instruction, slot: usize) -> DexType {
    let declared = match &instruction.kind {
        InstrKind::Binop { numeric, .. } => return numeric.dex_type(),
        InstrKind::Invoke { kind, method, .. } => declared_input_type(*kind, method, slot),
        _ => None,
    };
    match ty {
        TypeElement::Class { class, interfaces } => {
            if *class == DexType::object() && interfaces.len() == 1 {
                interfaces[0].clone()
            } else {
                class.clone()
            }
        }
        TypeElement::Array { .. } => ty
            .to_dex_type()
            .or(declared)
            .unwrap_or_else(DexType::object),
        TypeElement::Null => declared.unwrap_or_else(DexType::object),
        TypeElement::Primitive {
            numeric: NumericType::Int,
        } => declared.unwrap_or_else(DexType::int),
        TypeElement::Primitive { numeric } => numeric.dex_type(),
    }
}
