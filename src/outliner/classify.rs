//! Instruction classification for outlining.

use crate::ir::{InstrKind, Instruction};

/// How the window scanner treats an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionClass {
    /// Add, sub, mul, div or rem
    Arithmetic,
    /// New-instance
    NewObject,
    /// Method invocation with a well-formed operand list
    Invoke,
    /// Literal load
    Const,
    /// Type refinement marker
    Passthrough,
    Unsupported,
}

impl InstructionClass {
    /// Const and passthrough instructions ride along in a window without
    /// counting toward its size
    #[inline]
    pub fn is_transparent(self) -> bool {
        matches!(self, InstructionClass::Const | InstructionClass::Passthrough)
    }

    /// Instructions that become template operations
    #[inline]
    pub fn is_operation(self) -> bool {
        matches!(
            self,
            InstructionClass::Arithmetic | InstructionClass::NewObject | InstructionClass::Invoke
        )
    }
}

pub fn classify(instruction: &Instruction) -> InstructionClass {
    match &instruction.kind {
        InstrKind::Const { .. } => InstructionClass::Const,
        InstrKind::Assume if instruction.inputs.len() == 1 && instruction.output.is_some() => {
            InstructionClass::Passthrough
        }
        InstrKind::Binop { kind, .. }
            if kind.is_arithmetic()
                && instruction.inputs.len() == 2
                && instruction.output.is_some() =>
        {
            InstructionClass::Arithmetic
        }
        InstrKind::NewInstance { .. } if instruction.output.is_some() => {
            InstructionClass::NewObject
        }
        InstrKind::Invoke { kind, method, .. } => {
            let expected = usize::from(kind.has_receiver()) + method.proto.parameters.len();
            let output_matches = instruction.output.is_none() || !method.proto.return_type.is_void();
            if instruction.inputs.len() == expected && output_matches {
                InstructionClass::Invoke
            } else {
                InstructionClass::Unsupported
            }
        }
        _ => InstructionClass::Unsupported,
    }
}
