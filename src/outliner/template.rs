//! Register-independent outline templates.
//!
//! A template is the structural key of a window: its operation sequence,
//! argument types, return type and an argument map wiring every operand
//! slot to either an outline argument or the single temporary produced
//! earlier in the window.
//!
//! ```text
//! invoke-virtual {v5, v6} StringBuilder.append(String)
//! invoke-virtual {v5, v9} StringBuilder.append(String)
//!
//! arguments:    v5, v6, v9
//! argument map: [0, 1, 0, 2]
//! ```
//!
//! Concrete value ids never participate in equality, hashing or ordering.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use itertools::Itertools;

use crate::ir::{BinopKind, DexType, InstrKind, Instruction, InvokeKind, MethodRef, NumericType, Proto};

use super::classify::classify;
use super::error::{OutlineError, OutlineResult};

/// Only this many leading operations feed the hash
pub const MAX_HASH_OPERATIONS: usize = 5;

/// One operation of a template
///
/// Variant order is the ordering between operation kinds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TemplateOperation {
    Binop {
        kind: BinopKind,
        numeric: NumericType,
    },
    Invoke {
        method: MethodRef,
        kind: InvokeKind,
        has_out_value: bool,
    },
    NewInstance {
        class: DexType,
    },
}

impl TemplateOperation {
    /// Operation for an arithmetic, new-instance or invoke instruction
    pub fn from_instruction(instruction: &Instruction) -> Option<Self> {
        match &instruction.kind {
            InstrKind::Binop { kind, numeric } if kind.is_arithmetic() => {
                Some(TemplateOperation::Binop {
                    kind: *kind,
                    numeric: *numeric,
                })
            }
            InstrKind::NewInstance { class } => Some(TemplateOperation::NewInstance {
                class: class.clone(),
            }),
            InstrKind::Invoke { kind, method, .. } => Some(TemplateOperation::Invoke {
                method: method.clone(),
                kind: *kind,
                has_out_value: instruction.output.is_some(),
            }),
            _ => None,
        }
    }

    /// Operand slots this operation reads
    pub fn number_of_inputs(&self) -> usize {
        match self {
            TemplateOperation::Binop { .. } => 2,
            TemplateOperation::NewInstance { .. } => 0,
            TemplateOperation::Invoke { method, kind, .. } => {
                usize::from(kind.has_receiver()) + method.proto.parameters.len()
            }
        }
    }

    pub fn has_out_value(&self) -> bool {
        match self {
            TemplateOperation::Binop { .. } | TemplateOperation::NewInstance { .. } => true,
            TemplateOperation::Invoke { has_out_value, .. } => *has_out_value,
        }
    }

    /// Declared type of operand slot `index`
    pub fn input_type(&self, index: usize) -> Option<DexType> {
        match self {
            TemplateOperation::Binop { numeric, .. } if index < 2 => Some(numeric.dex_type()),
            TemplateOperation::Invoke { method, kind, .. } => declared_input_type(*kind, method, index),
            _ => None,
        }
    }

    /// Type of the produced value
    pub fn output_type(&self) -> Option<DexType> {
        match self {
            TemplateOperation::Binop { numeric, .. } => Some(numeric.dex_type()),
            TemplateOperation::NewInstance { class } => Some(class.clone()),
            TemplateOperation::Invoke {
                method,
                has_out_value: true,
                ..
            } => Some(method.proto.return_type.clone()),
            TemplateOperation::Invoke { .. } => None,
        }
    }

    pub fn name(&self) -> String {
        match self {
            TemplateOperation::Binop { kind, numeric } => {
                format!("{}-{}", kind.name(), numeric.name())
            }
            TemplateOperation::Invoke { kind, .. } => format!("invoke-{}", kind.name()),
            TemplateOperation::NewInstance { .. } => "new-instance".to_string(),
        }
    }
}

/// Declared type of operand `index` of an invoke; the receiver takes the
/// holder type
pub(crate) fn declared_input_type(kind: InvokeKind, method: &MethodRef, index: usize) -> Option<DexType> {
    if kind.has_receiver() {
        if index == 0 {
            return Some(method.holder.clone());
        }
        method.proto.parameters.get(index - 1).cloned()
    } else {
        method.proto.parameters.get(index).cloned()
    }
}

/// Where an operand slot reads from
///
/// The temporary sorts before every argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArgumentSlot {
    /// The value produced by the preceding operation in the window
    Temporary,
    /// An outline argument
    Argument(u32),
}

impl fmt::Display for ArgumentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentSlot::Temporary => f.write_str("T"),
            ArgumentSlot::Argument(index) => write!(f, "{}", index),
        }
    }
}

/// Canonical, register-independent key of an outline
#[derive(Debug, Clone)]
pub struct Template {
    operations: Vec<TemplateOperation>,
    argument_types: Vec<DexType>,
    argument_map: Vec<ArgumentSlot>,
    return_type: DexType,
    signature: OnceLock<Proto>,
}

impl Template {
    pub fn new(
        operations: Vec<TemplateOperation>,
        argument_types: Vec<DexType>,
        argument_map: Vec<ArgumentSlot>,
        return_type: DexType,
    ) -> Self {
        debug_assert_eq!(
            argument_map.len(),
            operations.iter().map(TemplateOperation::number_of_inputs).sum::<usize>(),
            "argument map does not cover every operand slot"
        );
        Self {
            operations,
            argument_types,
            argument_map,
            return_type,
            signature: OnceLock::new(),
        }
    }

    /// Template of a window. Const and passthrough instructions contribute
    /// no operation.
    pub fn from_window(
        instructions: &[Instruction],
        argument_types: Vec<DexType>,
        argument_map: Vec<ArgumentSlot>,
        return_type: DexType,
    ) -> Self {
        let operations = instructions
            .iter()
            .filter(|instruction| classify(instruction).is_operation())
            .filter_map(TemplateOperation::from_instruction)
            .collect();
        Self::new(operations, argument_types, argument_map, return_type)
    }

    #[inline]
    pub fn operations(&self) -> &[TemplateOperation] {
        &self.operations
    }

    #[inline]
    pub fn argument_types(&self) -> &[DexType] {
        &self.argument_types
    }

    #[inline]
    pub fn argument_map(&self) -> &[ArgumentSlot] {
        &self.argument_map
    }

    #[inline]
    pub fn return_type(&self) -> &DexType {
        &self.return_type
    }

    #[inline]
    pub fn argument_count(&self) -> usize {
        self.argument_types.len()
    }

    /// Prototype of the outline method, derived once and cached
    pub fn signature(&self) -> OutlineResult<&Proto> {
        if let Some(proto) = self.signature.get() {
            return Ok(proto);
        }
        self.check_wiring()?;
        Ok(self.signature.get_or_init(|| {
            Proto::new(self.return_type.clone(), self.argument_types.clone())
        }))
    }

    fn mismatch(&self, reason: impl Into<String>) -> OutlineError {
        OutlineError::SignatureMismatch {
            template: self.to_string(),
            reason: reason.into(),
        }
    }

    fn check_wiring(&self) -> OutlineResult<()> {
        let slots: usize = self
            .operations
            .iter()
            .map(TemplateOperation::number_of_inputs)
            .sum();
        if slots != self.argument_map.len() {
            return Err(self.mismatch(format!(
                "{} operand slots but {} argument map entries",
                slots,
                self.argument_map.len()
            )));
        }
        if let Some(ty) = self.argument_types.iter().find(|ty| ty.is_void()) {
            return Err(self.mismatch(format!("argument of type {}", ty)));
        }

        let mut referenced = vec![false; self.argument_types.len()];
        let mut has_temporary = false;
        let mut slots = self.argument_map.iter();
        for operation in &self.operations {
            for slot in slots.by_ref().take(operation.number_of_inputs()) {
                match slot {
                    ArgumentSlot::Temporary if !has_temporary => {
                        return Err(self.mismatch(format!(
                            "{} reads the temporary before it is written",
                            operation.name()
                        )));
                    }
                    ArgumentSlot::Temporary => {}
                    ArgumentSlot::Argument(index) => match referenced.get_mut(*index as usize) {
                        Some(seen) => *seen = true,
                        None => {
                            return Err(self.mismatch(format!("argument {} out of range", index)))
                        }
                    },
                }
            }
            has_temporary |= operation.has_out_value();
        }
        if let Some(unused) = referenced.iter().position(|seen| !seen) {
            return Err(self.mismatch(format!("argument {} is never read", unused)));
        }
        if !self.return_type.is_void() && !has_temporary {
            return Err(self.mismatch("non-void outline without a produced value"));
        }
        Ok(())
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.operations == other.operations
            && self.argument_types == other.argument_types
            && self.argument_map == other.argument_map
            && self.return_type == other.return_type
    }
}

impl Eq for Template {}

impl Hash for Template {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.operations.len().hash(state);
        for operation in self.operations.iter().take(MAX_HASH_OPERATIONS) {
            operation.hash(state);
        }
    }
}

impl Ord for Template {
    /// Signature first, then operations, then wiring
    fn cmp(&self, other: &Self) -> Ordering {
        self.return_type
            .cmp(&other.return_type)
            .then_with(|| self.argument_types.cmp(&other.argument_types))
            .then_with(|| self.operations.len().cmp(&other.operations.len()))
            .then_with(|| self.operations.cmp(&other.operations))
            .then_with(|| self.argument_map.len().cmp(&other.argument_map.len()))
            .then_with(|| self.argument_map.cmp(&other.argument_map))
    }
}

impl PartialOrd for Template {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let temporary = self.argument_types.len();
        writeln!(
            f,
            "{} outline({})",
            self.return_type,
            self.argument_types.iter().join(", ")
        )?;
        let mut slots = self.argument_map.iter();
        for operation in &self.operations {
            write!(f, "  {:<20}", operation.name())?;
            if operation.has_out_value() {
                write!(f, "v{} <- ", temporary)?;
            }
            let inputs = slots
                .by_ref()
                .take(operation.number_of_inputs())
                .map(|slot| match slot {
                    ArgumentSlot::Temporary => format!("v{}", temporary),
                    ArgumentSlot::Argument(index) => format!("v{}", index),
                })
                .join(", ");
            f.write_str(&inputs)?;
            match operation {
                TemplateOperation::Invoke { method, .. } => writeln!(f, "; {}", method)?,
                TemplateOperation::NewInstance { class } => writeln!(f, "; {}", class)?,
                TemplateOperation::Binop { .. } => writeln!(f)?,
            }
        }
        if self.return_type.is_void() {
            writeln!(f, "  return-void")?;
        } else {
            writeln!(f, "  {:<20}v{}", "return", temporary)?;
        }
        write!(f, "  [{}]", self.argument_map.iter().join(", "))
    }
}
