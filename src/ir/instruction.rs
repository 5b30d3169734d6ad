//! Instructions of the straight-line IR.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::types::{DexType, MethodRef, NumericType};

/// SSA value index into a method's value arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueId(pub u32);

impl ValueId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Block index into a method's block arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Method index into a program's method table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodId(pub u32);

impl MethodId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Operand list; almost every instruction has at most four inputs
pub type Operands = SmallVec<[ValueId; 4]>;

/// Literal loaded by a `Const` instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstValue {
    Int(i64),
    String(String),
    Class(DexType),
    Null,
}

/// Binary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinopKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

impl BinopKind {
    /// Add, sub, mul, div and rem
    #[inline]
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinopKind::Add | BinopKind::Sub | BinopKind::Mul | BinopKind::Div | BinopKind::Rem
        )
    }

    #[inline]
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinopKind::Add | BinopKind::Mul | BinopKind::And | BinopKind::Or | BinopKind::Xor
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            BinopKind::Add => "add",
            BinopKind::Sub => "sub",
            BinopKind::Mul => "mul",
            BinopKind::Div => "div",
            BinopKind::Rem => "rem",
            BinopKind::And => "and",
            BinopKind::Or => "or",
            BinopKind::Xor => "xor",
            BinopKind::Shl => "shl",
            BinopKind::Shr => "shr",
            BinopKind::Ushr => "ushr",
        }
    }
}

/// Dispatch kind of an invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvokeKind {
    Static,
    Direct,
    Virtual,
    Interface,
    Super,
}

impl InvokeKind {
    /// Everything but static invokes passes the receiver as the first input
    #[inline]
    pub fn has_receiver(self) -> bool {
        !matches!(self, InvokeKind::Static)
    }

    pub fn name(self) -> &'static str {
        match self {
            InvokeKind::Static => "static",
            InvokeKind::Direct => "direct",
            InvokeKind::Virtual => "virtual",
            InvokeKind::Interface => "interface",
            InvokeKind::Super => "super",
        }
    }
}

/// Instruction shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum InstrKind {
    Argument {
        index: u32,
    },
    Const {
        value: ConstValue,
    },
    /// Type refinement marker; the output aliases the single input
    Assume,
    Binop {
        kind: BinopKind,
        numeric: NumericType,
    },
    NewInstance {
        class: DexType,
    },
    Invoke {
        kind: InvokeKind,
        method: MethodRef,
        /// Computed by inlining-constraint analysis: the call behaves the
        /// same from any enclosing method.
        #[serde(default)]
        relocatable: bool,
    },
    Return,
    Goto,
    If,
    Throw,
    /// Anything else the outliner does not model (field access, monitors, ...)
    Other {
        name: String,
    },
}

/// A single instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub kind: InstrKind,
    #[serde(default)]
    pub inputs: Operands,
    #[serde(default)]
    pub output: Option<ValueId>,
    /// Source position (line), if known
    #[serde(default)]
    pub position: Option<u32>,
}

impl Instruction {
    pub fn new(kind: InstrKind, inputs: Operands, output: Option<ValueId>) -> Self {
        Self {
            kind,
            inputs,
            output,
            position: None,
        }
    }

    pub fn with_position(mut self, position: Option<u32>) -> Self {
        self.position = position;
        self
    }

    /// Invoked method, for invokes
    pub fn invoked_method(&self) -> Option<&MethodRef> {
        match &self.kind {
            InstrKind::Invoke { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Mnemonic used by listings
    pub fn name(&self) -> String {
        match &self.kind {
            InstrKind::Argument { .. } => "argument".to_string(),
            InstrKind::Const { .. } => "const".to_string(),
            InstrKind::Assume => "assume".to_string(),
            InstrKind::Binop { kind, numeric } => format!("{}-{}", kind.name(), numeric.name()),
            InstrKind::NewInstance { .. } => "new-instance".to_string(),
            InstrKind::Invoke { kind, .. } => format!("invoke-{}", kind.name()),
            InstrKind::Return => "return".to_string(),
            InstrKind::Goto => "goto".to_string(),
            InstrKind::If => "if".to_string(),
            InstrKind::Throw => "throw".to_string(),
            InstrKind::Other { name } => name.clone(),
        }
    }
}
