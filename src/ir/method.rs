//! Blocks, methods and programs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

use super::instruction::{BlockId, InstrKind, Instruction, MethodId, ValueId};
use super::types::{DexType, MethodRef, TypeElement};

/// Exceptional successor of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchHandler {
    pub guard: DexType,
    pub target: BlockId,
}

/// A basic block: straight-line instructions plus its successors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub successors: Vec<BlockId>,
    #[serde(default)]
    pub catch_handlers: Vec<CatchHandler>,
}

impl Block {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            instructions: Vec::new(),
            successors: Vec::new(),
            catch_handlers: Vec::new(),
        }
    }

    #[inline]
    pub fn has_catch_handlers(&self) -> bool {
        !self.catch_handlers.is_empty()
    }
}

/// A method body in SSA form.
///
/// Values and blocks live in arenas indexed by `ValueId` and `BlockId`.
/// Blocks are only ever appended, so ids stay stable across rewrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub id: MethodId,
    pub reference: MethodRef,
    /// Lattice type of every value, indexed by `ValueId`
    #[serde(default)]
    pub values: Vec<TypeElement>,
    #[serde(default)]
    pub blocks: Vec<Block>,
    /// Synthesized outline bodies are never scanned again
    #[serde(default)]
    pub is_outline: bool,
}

impl Method {
    #[inline]
    pub fn value_type(&self, value: ValueId) -> &TypeElement {
        &self.values[value.index()]
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn add_value(&mut self, ty: TypeElement) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ty);
        id
    }

    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(id));
        id
    }

    /// Total number of instructions across all blocks
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    /// Snapshot of use counts and alias roots for the current body
    pub fn def_use(&self) -> DefUse {
        DefUse::compute(self)
    }

    /// Check that every value and block reference is in range
    pub fn validate(&self) -> Result<(), String> {
        for (index, block) in self.blocks.iter().enumerate() {
            if block.id.index() != index {
                return Err(format!(
                    "{}: block {} stored at index {}",
                    self.reference, block.id.0, index
                ));
            }
            let targets = block
                .successors
                .iter()
                .chain(block.catch_handlers.iter().map(|h| &h.target));
            for target in targets {
                if target.index() >= self.blocks.len() {
                    return Err(format!(
                        "{}: block {} targets missing block {}",
                        self.reference, block.id.0, target.0
                    ));
                }
            }
            for instruction in &block.instructions {
                for value in instruction.inputs.iter().chain(instruction.output.iter()) {
                    if value.index() >= self.values.len() {
                        return Err(format!(
                            "{}: {} references undefined value v{}",
                            self.reference,
                            instruction.name(),
                            value.0
                        ));
                    }
                }
                if matches!(instruction.kind, InstrKind::Assume) && instruction.inputs.len() != 1 {
                    return Err(format!("{}: assume takes exactly one input", self.reference));
                }
            }
        }
        Ok(())
    }
}

/// Use counts and alias roots of a method body.
///
/// Uses are counted per operand slot, so `add v1, v1` uses `v1` twice.
/// The alias root of a value follows `Assume` chains back to the value
/// that was refined.
#[derive(Debug, Clone)]
pub struct DefUse {
    uses: Vec<u32>,
    roots: Vec<ValueId>,
}

impl DefUse {
    pub fn compute(method: &Method) -> Self {
        let mut uses = vec![0u32; method.values.len()];
        let mut parents: Vec<ValueId> = (0..method.values.len() as u32).map(ValueId).collect();

        for instruction in method.instructions() {
            for input in &instruction.inputs {
                uses[input.index()] += 1;
            }
            if let (InstrKind::Assume, Some(output)) = (&instruction.kind, instruction.output) {
                if let Some(&input) = instruction.inputs.first() {
                    parents[output.index()] = input;
                }
            }
        }

        let roots = (0..parents.len())
            .map(|index| {
                let mut current = ValueId(index as u32);
                // SSA guarantees the chain is acyclic; the bound guards malformed input
                for _ in 0..parents.len() {
                    let parent = parents[current.index()];
                    if parent == current {
                        break;
                    }
                    current = parent;
                }
                current
            })
            .collect();

        Self { uses, roots }
    }

    /// Number of operand slots reading `value`
    #[inline]
    pub fn uses(&self, value: ValueId) -> u32 {
        self.uses.get(value.index()).copied().unwrap_or(0)
    }

    #[inline]
    pub fn is_used(&self, value: ValueId) -> bool {
        self.uses(value) > 0
    }

    /// Value `value` refines, or `value` itself
    #[inline]
    pub fn aliased(&self, value: ValueId) -> ValueId {
        self.roots.get(value.index()).copied().unwrap_or(value)
    }
}

/// The whole program: every method body, indexed by `MethodId`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub methods: Vec<Method>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a method, assigning it the next id
    pub fn add_method(&mut self, mut method: Method) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        method.id = id;
        self.methods.push(method);
        id
    }

    #[inline]
    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.index()]
    }

    /// Load a program from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_toml(&content)
    }

    /// Parse and validate a program from TOML source
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let program: Program = toml::from_str(content).map_err(|e| ConfigError::Parse {
            what: "program",
            message: e.to_string(),
        })?;
        program.validate().map_err(ConfigError::Invalid)?;
        Ok(program)
    }

    /// Check method ids and every method body
    pub fn validate(&self) -> Result<(), String> {
        for (index, method) in self.methods.iter().enumerate() {
            if method.id.index() != index {
                return Err(format!(
                    "{}: method id {} stored at index {}",
                    method.reference, method.id.0, index
                ));
            }
            method.validate()?;
        }
        Ok(())
    }
}
